//! Process execution and output capture for the kiln worker.
//!
//! Spawns the build command, exposes its standard output and standard error
//! as two independent streams of lines, and reports the exit status through
//! a separate completion handle.
//!
//! # Usage
//!
//! ```rust,no_run
//! use kiln_io::runner::Runner;
//! use std::sync::{Arc, atomic::AtomicBool};
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = Runner::shell("npm install && npm run build").current_dir("/srv/app");
//!     let should_stop = Arc::new(AtomicBool::new(false));
//!
//!     let mut handle = runner.spawn(should_stop).unwrap();
//!     while let Some(line) = handle.stdout.recv().await {
//!         print!("{line}");
//!     }
//!     let exit_status = handle.exit.await.unwrap().unwrap();
//!     println!("Process ended: {exit_status}");
//! }
//! ```

pub mod lines;
pub mod process;
pub mod runner;
