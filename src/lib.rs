//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates. Host applications can depend on `filesync-workspace` and
//! enable `desktop-shims` (the default) to get the fully wired
//! [`FileSyncService`](core_service::FileSyncService) without listing each
//! crate themselves.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
