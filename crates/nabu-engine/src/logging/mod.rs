//! Logging utilities.
//!
//! Centralizes logger initialization. The backend itself only uses the `log`
//! facade, so hosts embedding it may install any logger they like instead.

mod init;

pub use init::{init_logging, LoggingConfig};
