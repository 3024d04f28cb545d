//! CI/CD failure prediction service.
//!
//! Serves a pre-trained binary classifier over HTTP. Predictions are made from
//! an uploaded pipeline definition (YAML) or from manually entered build
//! metrics. High-risk predictions can be escalated by email.

pub mod api;
pub mod config;
pub mod error;
pub mod ml;
pub mod notifications;

pub use error::{AppError, Result};
