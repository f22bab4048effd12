//! Configuration management for the kiln worker.
//!
//! Secrets and identifiers come from the process environment. Build and
//! upload settings come from an optional TOML file and can be overridden from
//! the environment as well.
//!
//! # Usage
//!
//! ```rust,no_run
//! use kiln_config::{WorkerConfig, WorkerSettings};
//!
//! let settings = WorkerSettings::default();
//! let config = WorkerConfig::from_env(settings).unwrap();
//! println!("Building project {}", config.project_id);
//! ```

pub mod error;
pub mod prelude;
pub mod settings;
pub mod worker_config;

pub use settings::WorkerSettings;
pub use worker_config::{BuildConfig, StorageConfig, UploadConfig, WorkerConfig};
