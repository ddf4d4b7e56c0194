//! TaskBoard library
//!
//! Document model and persistence services for the TaskBoard tabbed task
//! tracker, exposed for the desktop host, tests and tooling.

pub mod app;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;

pub use app::{default_data_dir, AppState};
pub use error::{AppError, Result};
