//! MC-Review document packaging server
//!
//! Packages the documents of contract and rate revisions into zip archives,
//! stores them in S3 and records them in Postgres.
//!
//! # Overview
//!
//! - **Packaging** ([`zips`]): batched downloads into a private staging
//!   area, a store-only zip, SHA-256, upload and artifact record
//! - **Jobs** ([`jobs`]): backfill, regeneration and legacy key repair,
//!   runnable over HTTP ([`api`]) or from the `zip-jobs` CLI
//! - **Collaborators**: [`storage::ObjectStore`] (S3) and
//!   [`db::ZipPackageRepository`] (Postgres), both traits so the pipeline
//!   can be exercised without either
//!
//! # Example
//!
//! ```no_run
//! use mcr_server::{config::Config, jobs::{self, JobContext, MigrateQuery}};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let (ctx, _pool) = JobContext::connect(&config).await?;
//!     let report = jobs::migrate_document_zips(&ctx, MigrateQuery::default()).await?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod middleware;
pub mod storage;
pub mod zips;

pub use error::AppError;
