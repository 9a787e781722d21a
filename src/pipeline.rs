use crate::assembler::{Assembler, PACKAGE_NAME};
use crate::catalog::Catalog;
use crate::config::BuildConfig;
use crate::entities::PackageArtifact;
use crate::error::SpkError::Packaging;
use crate::fetcher::Fetcher;
use crate::guard::ensure_privileged;
use crate::resolver::resolve;
use anyhow::{Context, Result};
use log::info;

/// Runs a complete build: guard, resolve, fetch, assemble
///
/// A catalog file set in the config is read only after the guard passed.
///
/// Stages run strictly one after another; the first failure ends the run and
/// no package is written.
///
/// # Errors
///
/// Returns an error carrying the [`crate::error::SpkError`] of the failing stage
pub async fn build_package(config: &BuildConfig) -> Result<PackageArtifact> {
    ensure_privileged(config.euid)?;

    let loaded;
    let catalog = match &config.catalog_file {
        Some(path) => {
            loaded = Catalog::load(path)?;
            &loaded
        }
        None => &config.catalog,
    };

    let request = resolve(
        catalog,
        config.dsm_version.as_deref(),
        config.processor.as_deref(),
    )?;
    info!(
        "building {PACKAGE_NAME} {} for DSM {} on {} ({})",
        config.teleport_version,
        request.version.version,
        request.processor.family,
        request.processor.arch
    );

    let staging = tempfile::Builder::new()
        .prefix("syno-build-")
        .tempdir()
        .map_err(|e| Packaging(format!("cannot create build directory: {e}")))?;
    info!("building in {}", staging.path().display());

    let fetcher = Fetcher::new(config);
    let payload = fetcher
        .fetch(&request, staging.path())
        .await
        .context("Failed to fetch Teleport release")?;

    let artifact = Assembler::new(&request, &config.teleport_version)
        .assemble(&payload, staging.path(), &config.output_dir)
        .context("Failed to assemble package")?;

    Ok(artifact)
}
