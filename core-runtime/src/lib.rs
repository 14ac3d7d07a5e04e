//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the file sync core:
//! - Logging and tracing infrastructure
//! - Configuration management and persisted sync settings
//! - Event bus system
//!
//! Every other core crate depends on this one for its configuration types,
//! logging conventions and the event broadcast channel.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, SyncSettings};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus};
