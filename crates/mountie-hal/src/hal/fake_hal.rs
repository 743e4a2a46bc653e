//! Fake HAL implementation for testing.
//!
//! This implementation records all operations without executing them,
//! allowing for CI-safe testing without root privileges or real devices.
//! It also simulates the live mount table and the persisted boot entries so
//! that probing after an operation observes its effect.

use super::{MountBackend, MountProbe};
use crate::fstab::options_equivalent;
use crate::{Action, CurrentState, DesiredSpec, HalError, HalResult};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Operation records for testing and verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Mount { device: String, target: PathBuf },
    Umount { target: PathBuf },
    Remount { target: PathBuf, options: Vec<String> },
    Enable { device: String, target: PathBuf },
    Disable { target: PathBuf },
    Settle { duration: Duration },
}

impl Operation {
    /// The primitive this record corresponds to, if any.
    pub fn action(&self) -> Option<Action> {
        match self {
            Operation::Mount { .. } => Some(Action::Mount),
            Operation::Umount { .. } => Some(Action::Umount),
            Operation::Remount { .. } => Some(Action::Remount),
            Operation::Enable { .. } => Some(Action::Enable),
            Operation::Disable { .. } => Some(Action::Disable),
            Operation::Settle { .. } => None,
        }
    }
}

/// Shared state for FakeHal operations.
#[derive(Debug, Clone, Default)]
struct FakeHalState {
    /// All operations that were recorded
    operations: Vec<Operation>,
    /// Currently mounted paths and the device behind each
    mounted: HashMap<PathBuf, String>,
    /// Persisted boot entries keyed by mount point
    persisted: HashMap<PathBuf, DesiredSpec>,
    /// Primitives that fail as if the OS rejected them
    failures: HashMap<Action, String>,
    /// Primitives this backend pretends not to support
    unsupported: HashSet<Action>,
    options_queries: usize,
}

/// Fake HAL implementation that records operations without executing them.
#[derive(Debug, Clone, Default)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
}

impl FakeHal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeHalState> {
        // A panic while holding the lock only happens inside a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pretend `device` is already mounted at `target`.
    pub fn with_mounted(self, target: impl Into<PathBuf>, device: impl Into<String>) -> Self {
        self.lock().mounted.insert(target.into(), device.into());
        self
    }

    /// Pretend a boot entry already exists, exactly as `spec` describes it.
    pub fn with_persisted(self, spec: &DesiredSpec) -> Self {
        self.lock()
            .persisted
            .insert(spec.mount_point.clone(), spec.clone());
        self
    }

    /// Make `action` fail with a command error carrying `message`.
    pub fn fail_with(&self, action: Action, message: impl Into<String>) {
        self.lock().failures.insert(action, message.into());
    }

    /// Make `action` report [`HalError::Unsupported`].
    pub fn unsupported(&self, action: Action) {
        self.lock().unsupported.insert(action);
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().operations.clone()
    }

    /// The primitives that ran, in order, without settle records.
    pub fn actions(&self) -> Vec<Action> {
        self.lock()
            .operations
            .iter()
            .filter_map(Operation::action)
            .collect()
    }

    /// Get the number of operations recorded.
    pub fn operation_count(&self) -> usize {
        self.lock().operations.len()
    }

    /// Check if a specific operation was recorded.
    pub fn has_operation(&self, check: impl Fn(&Operation) -> bool) -> bool {
        self.lock().operations.iter().any(check)
    }

    /// How many times `options_unchanged` was asked.
    pub fn options_queries(&self) -> usize {
        self.lock().options_queries
    }

    pub fn is_mounted(&self, target: &Path) -> bool {
        self.lock().mounted.contains_key(target)
    }

    pub fn is_persisted(&self, target: &Path) -> bool {
        self.lock().persisted.contains_key(target)
    }

    /// Record a settle wait; hand this to the engine as its sleeper.
    pub fn record_settle(&self, duration: Duration) {
        log::info!("FAKE HAL: settle {:?}", duration);
        self.record_operation(Operation::Settle { duration });
    }

    /// Clear all recorded operations and simulated state.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.operations.clear();
        state.mounted.clear();
        state.persisted.clear();
        state.options_queries = 0;
    }

    fn check(&self, action: Action) -> HalResult<()> {
        let state = self.lock();
        if state.unsupported.contains(&action) {
            return Err(HalError::unsupported("fake", action.as_str()));
        }
        if let Some(message) = state.failures.get(&action) {
            return Err(HalError::CommandFailed {
                program: action.as_str().to_string(),
                code: Some(32),
                stderr: message.clone(),
            });
        }
        Ok(())
    }

    fn record_operation(&self, op: Operation) {
        self.lock().operations.push(op);
    }
}

impl MountBackend for FakeHal {
    fn name(&self) -> &str {
        "fake"
    }

    fn mount(&self, spec: &DesiredSpec) -> HalResult<()> {
        self.check(Action::Mount)?;
        log::info!(
            "FAKE HAL: mount {} -> {}",
            spec.device,
            spec.mount_point.display()
        );
        self.record_operation(Operation::Mount {
            device: spec.device.clone(),
            target: spec.mount_point.clone(),
        });
        self.lock()
            .mounted
            .insert(spec.mount_point.clone(), spec.device.clone());
        Ok(())
    }

    fn umount(&self, spec: &DesiredSpec) -> HalResult<()> {
        self.check(Action::Umount)?;
        log::info!("FAKE HAL: umount {}", spec.mount_point.display());
        self.record_operation(Operation::Umount {
            target: spec.mount_point.clone(),
        });
        self.lock().mounted.remove(&spec.mount_point);
        Ok(())
    }

    fn remount(&self, spec: &DesiredSpec) -> HalResult<()> {
        self.check(Action::Remount)?;
        log::info!("FAKE HAL: remount {}", spec.mount_point.display());
        self.record_operation(Operation::Remount {
            target: spec.mount_point.clone(),
            options: spec.options.iter().cloned().collect(),
        });
        Ok(())
    }

    fn enable(&self, spec: &DesiredSpec) -> HalResult<()> {
        self.check(Action::Enable)?;
        log::info!("FAKE HAL: enable {}", spec.mount_point.display());
        self.record_operation(Operation::Enable {
            device: spec.device.clone(),
            target: spec.mount_point.clone(),
        });
        self.lock()
            .persisted
            .insert(spec.mount_point.clone(), spec.clone());
        Ok(())
    }

    fn disable(&self, spec: &DesiredSpec) -> HalResult<()> {
        self.check(Action::Disable)?;
        log::info!("FAKE HAL: disable {}", spec.mount_point.display());
        self.record_operation(Operation::Disable {
            target: spec.mount_point.clone(),
        });
        self.lock().persisted.remove(&spec.mount_point);
        Ok(())
    }

    fn options_unchanged(&self, spec: &DesiredSpec) -> HalResult<bool> {
        let mut state = self.lock();
        state.options_queries += 1;
        let persisted: Option<Vec<String>> = state
            .persisted
            .get(&spec.mount_point)
            .filter(|p| p.device == spec.device)
            .map(|p| p.options.iter().cloned().collect());
        Ok(persisted.is_some_and(|opts| options_equivalent(&opts, &spec.options)))
    }
}

impl MountProbe for FakeHal {
    fn current_state(&self, spec: &DesiredSpec) -> HalResult<CurrentState> {
        let state = self.lock();
        let device = state.mounted.get(&spec.mount_point).cloned();
        Ok(CurrentState {
            is_mounted: device.is_some(),
            is_enabled_at_boot: state.persisted.contains_key(&spec.mount_point),
            device,
        })
    }
}
