//! Mount backend capability trait.

use crate::{DesiredSpec, HalResult};

/// The primitives a platform must provide to converge a mount point.
///
/// There are no default bodies. A backend that cannot perform an operation on
/// its platform returns [`crate::HalError::Unsupported`] instead of silently
/// doing nothing.
pub trait MountBackend {
    /// Short backend name used in error messages (e.g. `"linux"`).
    fn name(&self) -> &str;

    /// Mount `spec.device` at `spec.mount_point` with the desired options.
    fn mount(&self, spec: &DesiredSpec) -> HalResult<()>;

    /// Unmount whatever is mounted at `spec.mount_point`.
    fn umount(&self, spec: &DesiredSpec) -> HalResult<()>;

    /// Re-apply the desired options to a live mount in place.
    fn remount(&self, spec: &DesiredSpec) -> HalResult<()>;

    /// Write (or rewrite) the persisted boot-time entry for the mount point.
    fn enable(&self, spec: &DesiredSpec) -> HalResult<()>;

    /// Remove the persisted boot-time entry for the mount point.
    fn disable(&self, spec: &DesiredSpec) -> HalResult<()>;

    /// Whether the persisted entry already carries the desired options.
    ///
    /// Option equivalence is backend-defined (ordering, synonyms, `defaults`).
    fn options_unchanged(&self, spec: &DesiredSpec) -> HalResult<bool>;
}

impl<T: MountBackend + ?Sized> MountBackend for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn mount(&self, spec: &DesiredSpec) -> HalResult<()> {
        (**self).mount(spec)
    }

    fn umount(&self, spec: &DesiredSpec) -> HalResult<()> {
        (**self).umount(spec)
    }

    fn remount(&self, spec: &DesiredSpec) -> HalResult<()> {
        (**self).remount(spec)
    }

    fn enable(&self, spec: &DesiredSpec) -> HalResult<()> {
        (**self).enable(spec)
    }

    fn disable(&self, spec: &DesiredSpec) -> HalResult<()> {
        (**self).disable(spec)
    }

    fn options_unchanged(&self, spec: &DesiredSpec) -> HalResult<bool> {
        (**self).options_unchanged(spec)
    }
}
