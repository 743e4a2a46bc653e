//! Mount state probing.

use crate::{CurrentState, DesiredSpec, HalResult};

/// Produces a fresh [`CurrentState`] for a mount point.
///
/// Callers probe before every action; results are never cached.
pub trait MountProbe {
    fn current_state(&self, spec: &DesiredSpec) -> HalResult<CurrentState>;
}

impl<T: MountProbe + ?Sized> MountProbe for &T {
    fn current_state(&self, spec: &DesiredSpec) -> HalResult<CurrentState> {
        (**self).current_state(spec)
    }
}
