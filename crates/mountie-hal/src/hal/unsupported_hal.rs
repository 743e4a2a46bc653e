//! Backend for platforms without mount support.

use super::{MountBackend, MountProbe};
use crate::{CurrentState, DesiredSpec, HalError, HalResult};

/// Refuses every primitive with [`HalError::Unsupported`].
#[derive(Debug, Clone)]
pub struct UnsupportedHal {
    platform: String,
}

impl UnsupportedHal {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }

    fn refuse<T>(&self, operation: &'static str) -> HalResult<T> {
        Err(HalError::unsupported(self.platform.clone(), operation))
    }
}

impl MountBackend for UnsupportedHal {
    fn name(&self) -> &str {
        &self.platform
    }

    fn mount(&self, _spec: &DesiredSpec) -> HalResult<()> {
        self.refuse("mount")
    }

    fn umount(&self, _spec: &DesiredSpec) -> HalResult<()> {
        self.refuse("umount")
    }

    fn remount(&self, _spec: &DesiredSpec) -> HalResult<()> {
        self.refuse("remount")
    }

    fn enable(&self, _spec: &DesiredSpec) -> HalResult<()> {
        self.refuse("enable")
    }

    fn disable(&self, _spec: &DesiredSpec) -> HalResult<()> {
        self.refuse("disable")
    }

    fn options_unchanged(&self, _spec: &DesiredSpec) -> HalResult<bool> {
        self.refuse("options comparison")
    }
}

impl MountProbe for UnsupportedHal {
    fn current_state(&self, _spec: &DesiredSpec) -> HalResult<CurrentState> {
        self.refuse("probe")
    }
}
