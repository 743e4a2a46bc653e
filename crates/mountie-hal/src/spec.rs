//! Desired and observed mount state.

use crate::{HalError, HalResult};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The five primitives a mount resource can converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    Mount,
    Umount,
    Remount,
    Enable,
    Disable,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Mount,
        Action::Umount,
        Action::Remount,
        Action::Enable,
        Action::Disable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Mount => "mount",
            Action::Umount => "umount",
            Action::Remount => "remount",
            Action::Enable => "enable",
            Action::Disable => "disable",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = HalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mount" => Ok(Action::Mount),
            "umount" | "unmount" => Ok(Action::Umount),
            "remount" => Ok(Action::Remount),
            "enable" => Ok(Action::Enable),
            "disable" => Ok(Action::Disable),
            other => Err(HalError::Parse(format!("unknown mount action: {other}"))),
        }
    }
}

/// What the caller wants a mount point to look like.
///
/// Built once per resource and never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredSpec {
    pub device: String,
    pub mount_point: PathBuf,
    pub fstype: Option<String>,
    pub options: BTreeSet<String>,
    pub dump: u32,
    pub pass: u32,
    pub supports_remount: bool,
    pub persist_at_boot: bool,
}

impl DesiredSpec {
    /// Create a spec with no options, remount support and no boot persistence.
    ///
    /// # Errors
    ///
    /// Returns `HalError::ValidationFailed` if `mount_point` is empty.
    pub fn new(device: impl Into<String>, mount_point: impl Into<PathBuf>) -> HalResult<Self> {
        let spec = Self {
            device: device.into(),
            mount_point: mount_point.into(),
            fstype: None,
            options: BTreeSet::new(),
            dump: 0,
            pass: 0,
            supports_remount: true,
            persist_at_boot: false,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn with_fstype(mut self, fstype: impl Into<String>) -> Self {
        self.fstype = Some(fstype.into());
        self
    }

    /// Accepts both individual options and comma-separated lists.
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.options = parse_options(options);
        self
    }

    pub fn with_dump_pass(mut self, dump: u32, pass: u32) -> Self {
        self.dump = dump;
        self.pass = pass;
        self
    }

    pub fn with_supports_remount(mut self, supports_remount: bool) -> Self {
        self.supports_remount = supports_remount;
        self
    }

    pub fn with_persist_at_boot(mut self, persist_at_boot: bool) -> Self {
        self.persist_at_boot = persist_at_boot;
        self
    }

    pub fn validate(&self) -> HalResult<()> {
        if self.mount_point.as_os_str().is_empty() {
            return Err(HalError::ValidationFailed(
                "mount point must not be empty".to_string(),
            ));
        }
        if self.options.iter().any(|o| o.contains(char::is_whitespace)) {
            return Err(HalError::ValidationFailed(format!(
                "mount options for {} must not contain whitespace",
                self.mount_point.display()
            )));
        }
        Ok(())
    }

    /// Options as a comma-separated list, or `None` when there are none.
    pub fn options_string(&self) -> Option<String> {
        if self.options.is_empty() {
            None
        } else {
            Some(self.options.iter().cloned().collect::<Vec<_>>().join(","))
        }
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }
}

/// Split option lists like `["rw,noatime", "nodev"]` into a normalized set.
pub fn parse_options<I, S>(options: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    options
        .into_iter()
        .flat_map(|o| {
            o.as_ref()
                .split(',')
                .map(|s| s.trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Observed state of a mount point, produced by a [`crate::MountProbe`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentState {
    pub is_mounted: bool,
    pub is_enabled_at_boot: bool,
    /// Device actually mounted at the mount point, if any.
    pub device: Option<String>,
}

impl CurrentState {
    pub fn unmounted() -> Self {
        Self::default()
    }

    pub fn mounted(device: impl Into<String>) -> Self {
        Self {
            is_mounted: true,
            is_enabled_at_boot: false,
            device: Some(device.into()),
        }
    }

    pub fn enabled(mut self, is_enabled_at_boot: bool) -> Self {
        self.is_enabled_at_boot = is_enabled_at_boot;
        self
    }
}
