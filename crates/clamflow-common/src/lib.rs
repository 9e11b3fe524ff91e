//! # ClamFlow Common
//!
//! Shared error types, logging setup, and the worker configuration surface
//! for the ClamFlow offline worker.
//!
//! ## Features
//!
//! - Unified error type with a category label for structured logs
//! - Logging configuration and setup
//! - Deploy-time worker configuration (cache names, precache list, routing tables)

pub mod config;
pub mod error;
pub mod logging;

pub use config::{NotificationDefaults, WorkerConfig};
pub use error::{SwError, SwResult};
pub use logging::{init_logging, LogConfig, LogFormat};
