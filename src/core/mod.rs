//! Core types for the authorization core
//!
//! This module provides the fundamental types used throughout the crate:
//! - `GuardConfig` - Paths and tunables
//! - `ToolUseContext` - Per-call cancellation and turn identity
//! - `Clock` - Wall-clock source for TTLs
//! - `persist` - Whole-file JSON reads and atomic writes
//! - `GuardError` - Error types

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod persist;

pub use clock::{system_clock, Clock, ManualClock, SystemClock};
pub use config::GuardConfig;
pub use context::ToolUseContext;
pub use error::{GuardError, GuardResult};
