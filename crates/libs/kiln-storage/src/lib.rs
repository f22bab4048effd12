//! Build artifact discovery and object storage for the kiln worker.
//!
//! [`target::collect_targets`] turns a build output directory into the list
//! of files to upload, each with its storage key suffix and content type.
//! [`store::ObjectStore`] is the put-object seam, implemented for S3 by
//! [`s3::S3Store`] and in memory by [`memory::MemoryStore`].

pub mod error;
pub mod memory;
pub mod prelude;
pub mod s3;
pub mod store;
pub mod target;

pub use store::{ObjectStore, StorageError};
pub use target::{UploadTarget, collect_targets, content_type_for, storage_key};
