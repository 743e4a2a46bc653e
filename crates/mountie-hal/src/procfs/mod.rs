//! Readers for kernel-provided mount tables.

pub mod mountinfo;
