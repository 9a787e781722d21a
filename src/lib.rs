//!# Synology SPK builder for Teleport
//!
//! Builds an installable Synology DSM package (SPK) of the Teleport daemon for
//! a chosen DSM release and processor family, from the prebuilt upstream
//! release binaries.
//!
//! ## Features
//!
//! - Built-in catalog of DSM releases (6.0 to 7.2) and processor families,
//!   replaceable by a JSON catalog file
//! - Release download with an ETag-keyed cache
//! - DSM 6 (gzip) and DSM 7 (xz) payload archives, `INFO` manifest, control
//!   scripts and DSM 7 privilege config
//!
//! ## Usage example
//!
//! ```rust,no_run
//! use anyhow::Result;
//! use syno_spk_builder::config::BuildConfig;
//! use syno_spk_builder::pipeline::build_package;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<()> {
//!     let config = BuildConfig::builder()
//!         .dsm_version("7.2")
//!         .processor("geminilake")
//!         .output_dir("dist")
//!         .build()?;
//!
//!     let artifact = build_package(&config).await?;
//!     println!("built {}", artifact.path.display());
//!
//!     Ok(())
//! }
//! ```

pub mod assembler;
pub mod catalog;
pub mod config;
pub mod entities;
pub mod error;
pub mod fetcher;
pub mod guard;
pub mod pipeline;
pub mod resolver;
pub mod utils;
