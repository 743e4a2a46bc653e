//! Convergence decisions for a single mount point.
//!
//! Each action inspects the freshly probed [`CurrentState`], decides whether
//! the mount point already looks the way [`DesiredSpec`] asks, and otherwise
//! calls exactly one backend primitive. The one exception is `remount` on a
//! filesystem that cannot remount in place, which falls back to
//! unmount, settle, mount.
//!
//! The engine never re-probes mid-decision and never retries. Callers must
//! serialize actions per mount point.

use crate::errors::{ConvergeError, ConvergeResult};
use crate::report::{ChangeReporter, ConvergenceResult, LogReporter};
use mountie_hal::{Action, CurrentState, DesiredSpec, HalResult, MountBackend};
use std::time::Duration;

/// How long the remount fallback waits between unmount and mount for the
/// kernel to release the device.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(3);

type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Result of one decision before it is folded into a [`ConvergenceResult`].
#[derive(Debug)]
struct Step {
    changed: bool,
    description: String,
    primitives: Vec<Action>,
}

impl Step {
    fn noop(description: String) -> Self {
        Self {
            changed: false,
            description,
            primitives: Vec::new(),
        }
    }
}

pub struct ConvergenceEngine<B> {
    backend: B,
    settle: Duration,
    sleeper: Sleeper,
    reporter: Box<dyn ChangeReporter>,
}

impl<B: MountBackend> ConvergenceEngine<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            settle: DEFAULT_SETTLE,
            sleeper: Box::new(std::thread::sleep),
            reporter: Box::new(LogReporter),
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Replace the blocking sleep used for the remount fallback settle.
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn with_reporter(mut self, reporter: impl ChangeReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Run `action` against `current`, the state probed just before this call.
    ///
    /// With `dry_run` the decision is made exactly as for a real run and the
    /// result reports what would change, but no backend primitive runs.
    ///
    /// # Errors
    ///
    /// `InvalidSpec` if `spec` fails validation, otherwise whatever the
    /// backend primitive reported. Errors are never retried.
    pub fn converge(
        &self,
        action: Action,
        spec: &DesiredSpec,
        current: &CurrentState,
        dry_run: bool,
    ) -> ConvergeResult<ConvergenceResult> {
        spec.validate()
            .map_err(|e| ConvergeError::InvalidSpec(e.to_string()))?;

        let step = match action {
            Action::Mount => self.mount_step(spec, current, dry_run)?,
            Action::Umount => self.umount_step(spec, current, dry_run)?,
            Action::Remount => self.remount_step(spec, current, dry_run)?,
            Action::Enable => self.enable_step(spec, current, dry_run)?,
            Action::Disable => self.disable_step(spec, current, dry_run)?,
        };

        let result = ConvergenceResult {
            action,
            changed: step.changed,
            dry_run,
            description: step.description,
            steps: step.primitives,
        };
        self.reporter.report(&result);
        Ok(result)
    }

    pub fn mount(
        &self,
        spec: &DesiredSpec,
        current: &CurrentState,
        dry_run: bool,
    ) -> ConvergeResult<ConvergenceResult> {
        self.converge(Action::Mount, spec, current, dry_run)
    }

    pub fn umount(
        &self,
        spec: &DesiredSpec,
        current: &CurrentState,
        dry_run: bool,
    ) -> ConvergeResult<ConvergenceResult> {
        self.converge(Action::Umount, spec, current, dry_run)
    }

    pub fn remount(
        &self,
        spec: &DesiredSpec,
        current: &CurrentState,
        dry_run: bool,
    ) -> ConvergeResult<ConvergenceResult> {
        self.converge(Action::Remount, spec, current, dry_run)
    }

    pub fn enable(
        &self,
        spec: &DesiredSpec,
        current: &CurrentState,
        dry_run: bool,
    ) -> ConvergeResult<ConvergenceResult> {
        self.converge(Action::Enable, spec, current, dry_run)
    }

    pub fn disable(
        &self,
        spec: &DesiredSpec,
        current: &CurrentState,
        dry_run: bool,
    ) -> ConvergeResult<ConvergenceResult> {
        self.converge(Action::Disable, spec, current, dry_run)
    }

    fn mount_step(
        &self,
        spec: &DesiredSpec,
        current: &CurrentState,
        dry_run: bool,
    ) -> ConvergeResult<Step> {
        if current.is_mounted {
            return Ok(Step::noop(format!(
                "{} is already mounted",
                spec.mount_point.display()
            )));
        }
        let description = format!(
            "mount {} to {}",
            device_of(spec, current),
            spec.mount_point.display()
        );
        self.converge_by(Action::Mount, description, dry_run, || {
            self.backend.mount(spec)
        })
    }

    fn umount_step(
        &self,
        spec: &DesiredSpec,
        current: &CurrentState,
        dry_run: bool,
    ) -> ConvergeResult<Step> {
        if !current.is_mounted {
            return Ok(Step::noop(format!(
                "{} is already unmounted",
                spec.mount_point.display()
            )));
        }
        let description = format!("unmount {}", device_of(spec, current));
        self.converge_by(Action::Umount, description, dry_run, || {
            self.backend.umount(spec)
        })
    }

    fn remount_step(
        &self,
        spec: &DesiredSpec,
        current: &CurrentState,
        dry_run: bool,
    ) -> ConvergeResult<Step> {
        if !current.is_mounted {
            return Ok(Step::noop(format!(
                "{} is not mounted, nothing to remount",
                spec.mount_point.display()
            )));
        }

        if spec.supports_remount {
            let description = format!("remount {}", device_of(spec, current));
            return self.converge_by(Action::Remount, description, dry_run, || {
                self.backend.remount(spec)
            });
        }

        let unmounted = self.umount_step(spec, current, dry_run)?;
        // A dry run unmounted nothing, so it does not wait either.
        if unmounted.changed && !dry_run {
            log::debug!(
                "waiting {:?} for {} to settle before mounting again",
                self.settle,
                spec.mount_point.display()
            );
            (self.sleeper)(self.settle);
        }

        // What the unmount left behind; deliberately not re-probed.
        let after = CurrentState {
            is_mounted: false,
            device: None,
            ..current.clone()
        };
        let mounted = self.mount_step(spec, &after, dry_run)?;

        let mut primitives = unmounted.primitives;
        primitives.extend(mounted.primitives);
        Ok(Step {
            changed: unmounted.changed || mounted.changed,
            description: format!("{}; {}", unmounted.description, mounted.description),
            primitives,
        })
    }

    fn enable_step(
        &self,
        spec: &DesiredSpec,
        current: &CurrentState,
        dry_run: bool,
    ) -> ConvergeResult<Step> {
        if current.is_enabled_at_boot {
            let unchanged = self
                .backend
                .options_unchanged(spec)
                .map_err(|e| ConvergeError::from_hal(Action::Enable, e))?;
            if unchanged {
                return Ok(Step::noop(format!(
                    "{} is already enabled",
                    spec.mount_point.display()
                )));
            }
        }
        let description = format!("enable {}", device_of(spec, current));
        self.converge_by(Action::Enable, description, dry_run, || {
            self.backend.enable(spec)
        })
    }

    fn disable_step(
        &self,
        spec: &DesiredSpec,
        current: &CurrentState,
        dry_run: bool,
    ) -> ConvergeResult<Step> {
        if !current.is_enabled_at_boot {
            return Ok(Step::noop(format!(
                "{} is already disabled",
                spec.mount_point.display()
            )));
        }
        let description = format!("disable {}", device_of(spec, current));
        self.converge_by(Action::Disable, description, dry_run, || {
            self.backend.disable(spec)
        })
    }

    /// Run `op` unless this is a dry run; either way the step counts as a change.
    fn converge_by(
        &self,
        action: Action,
        description: String,
        dry_run: bool,
        op: impl FnOnce() -> HalResult<()>,
    ) -> ConvergeResult<Step> {
        if dry_run {
            log::debug!("DRY RUN: skipping {action} ({description})");
        } else {
            op().map_err(|e| ConvergeError::from_hal(action, e))?;
        }
        Ok(Step {
            changed: true,
            description,
            primitives: vec![action],
        })
    }
}

/// The device to name in descriptions: what is mounted, else what is wanted.
fn device_of<'a>(spec: &'a DesiredSpec, current: &'a CurrentState) -> &'a str {
    current.device.as_deref().unwrap_or(&spec.device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mountie_hal::{FakeHal, Operation};
    use std::sync::{Arc, Mutex};

    fn spec() -> DesiredSpec {
        DesiredSpec::new("/dev/sdb1", "/data").unwrap()
    }

    fn engine(hal: &FakeHal) -> ConvergenceEngine<FakeHal> {
        let recorder = hal.clone();
        ConvergenceEngine::new(hal.clone()).with_sleeper(move |d| recorder.record_settle(d))
    }

    #[test]
    fn mount_noop_when_already_mounted() {
        let hal = FakeHal::new();
        let result = engine(&hal)
            .mount(&spec(), &CurrentState::mounted("/dev/sdb1"), false)
            .unwrap();

        assert!(!result.changed);
        assert_eq!(result.description, "/data is already mounted");
        assert_eq!(hal.operation_count(), 0);
    }

    #[test]
    fn mount_names_current_device_over_desired() {
        let hal = FakeHal::new();
        let current = CurrentState {
            is_mounted: true,
            is_enabled_at_boot: false,
            device: Some("/dev/mapper/data".to_string()),
        };
        let result = engine(&hal).umount(&spec(), &current, false).unwrap();
        assert_eq!(result.description, "unmount /dev/mapper/data");
    }

    #[test]
    fn remount_fallback_settles_between_umount_and_mount() {
        let hal = FakeHal::new().with_mounted("/data", "/dev/sdb1");
        let spec = spec().with_supports_remount(false);

        let result = engine(&hal)
            .with_settle(Duration::from_millis(250))
            .remount(&spec, &CurrentState::mounted("/dev/sdb1"), false)
            .unwrap();

        assert!(result.changed);
        assert_eq!(result.action, Action::Remount);
        assert_eq!(result.steps, vec![Action::Umount, Action::Mount]);
        assert_eq!(
            result.description,
            "unmount /dev/sdb1; mount /dev/sdb1 to /data"
        );
        let ops = hal.operations();
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[0], Operation::Umount { .. }));
        assert_eq!(
            ops[1],
            Operation::Settle {
                duration: Duration::from_millis(250)
            }
        );
        assert!(matches!(ops[2], Operation::Mount { .. }));
    }

    #[test]
    fn direct_remount_never_settles() {
        let hal = FakeHal::new();
        let slept = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&slept);
        let result = ConvergenceEngine::new(hal.clone())
            .with_sleeper(move |_| *counter.lock().unwrap() += 1)
            .remount(&spec(), &CurrentState::mounted("/dev/sdb1"), false)
            .unwrap();

        assert!(result.changed);
        assert_eq!(hal.actions(), vec![Action::Remount]);
        assert_eq!(*slept.lock().unwrap(), 0);
    }

    #[test]
    fn enable_skips_options_query_when_not_enabled() {
        let hal = FakeHal::new();
        let result = engine(&hal)
            .enable(&spec(), &CurrentState::unmounted(), false)
            .unwrap();

        assert!(result.changed);
        assert_eq!(hal.options_queries(), 0);
        assert_eq!(hal.actions(), vec![Action::Enable]);
    }

    #[test]
    fn options_query_failure_propagates() {
        let hal = mountie_hal::UnsupportedHal::new("plan9");
        let err = ConvergenceEngine::new(hal)
            .enable(&spec(), &CurrentState::unmounted().enabled(true), false)
            .unwrap_err();
        assert!(matches!(
            err,
            ConvergeError::UnsupportedOperation {
                action: Action::Enable,
                ..
            }
        ));
    }

    #[test]
    fn invalid_spec_is_rejected_before_backend() {
        let hal = FakeHal::new();
        let mut bad = spec();
        bad.mount_point = Default::default();

        let err = engine(&hal)
            .mount(&bad, &CurrentState::unmounted(), false)
            .unwrap_err();
        assert!(matches!(err, ConvergeError::InvalidSpec(_)));
        assert_eq!(hal.operation_count(), 0);
    }

    #[test]
    fn remount_fallback_stops_when_umount_fails() {
        let hal = FakeHal::new().with_mounted("/data", "/dev/sdb1");
        hal.fail_with(Action::Umount, "target is busy");

        let err = engine(&hal)
            .remount(
                &spec().with_supports_remount(false),
                &CurrentState::mounted("/dev/sdb1"),
                false,
            )
            .unwrap_err();

        assert_eq!(err.action(), Some(Action::Umount));
        assert_eq!(hal.operation_count(), 0);
    }
}
