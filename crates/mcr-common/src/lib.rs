//! MC-Review Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the MC-Review document
//! packaging workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`McrError`] and the crate-wide [`Result`] alias
//! - **Checksums**: Streaming file digests for archive integrity tracking
//! - **S3 URLs**: Bucket/key extraction for well-formed and legacy document URLs
//! - **Types**: Document references, revisions, and zip package artifacts
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use mcr_common::checksum::compute_file_checksum;
//! use mcr_common::s3_url::parse_bucket_and_key;
//! use mcr_common::types::ChecksumAlgorithm;
//!
//! fn inspect(url: &str, path: &str) -> mcr_common::Result<()> {
//!     let location = parse_bucket_and_key(url)?;
//!     let digest = compute_file_checksum(path, ChecksumAlgorithm::Sha256)?;
//!     tracing::info!(bucket = %location.bucket, key = %location.key, %digest, "Inspected");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod s3_url;
pub mod types;

// Re-export commonly used types
pub use error::{McrError, Result};
