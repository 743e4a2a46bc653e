//! mountie Hardware Abstraction Layer (HAL).
//!
//! Everything that touches the live mount table or the boot-time mount table
//! lives behind the traits in [`hal`]. The convergence logic in `mountie-core`
//! only ever talks to a [`MountBackend`] and a [`MountProbe`].

pub mod error;
pub mod fstab;
pub mod hal;
pub mod procfs;
pub mod spec;

pub use error::{HalError, HalResult};
pub use hal::{
    FakeHal, LinuxHal, MountBackend, MountProbe, Operation, UnsupportedHal,
};
pub use spec::{Action, CurrentState, DesiredSpec};

/// Backend used when the caller does not pick one explicitly.
#[cfg(target_os = "linux")]
pub fn default_backend() -> LinuxHal {
    LinuxHal::new()
}

/// Backend used when the caller does not pick one explicitly.
#[cfg(not(target_os = "linux"))]
pub fn default_backend() -> UnsupportedHal {
    UnsupportedHal::new(std::env::consts::OS)
}
