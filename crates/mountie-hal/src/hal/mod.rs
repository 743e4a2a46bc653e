//! HAL trait definitions and implementations.
//!
//! This module defines the mount backend and probe traits and provides a real
//! (LinuxHal), a fake (FakeHal) and a refusing (UnsupportedHal) implementation.

pub mod fake_hal;
pub mod linux_hal;
pub mod mount_ops;
pub mod probe_ops;
pub mod unsupported_hal;

pub use fake_hal::{FakeHal, Operation};
pub use linux_hal::LinuxHal;
pub use mount_ops::MountBackend;
pub use probe_ops::MountProbe;
pub use unsupported_hal::UnsupportedHal;

/// A backend that can both inspect and mutate mount state.
pub trait SystemHal: MountBackend + MountProbe + Send + Sync {}

/// Automatically implement SystemHal for any type implementing all required traits.
impl<T> SystemHal for T where T: MountBackend + MountProbe + Send + Sync {}
