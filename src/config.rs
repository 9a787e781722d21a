use crate::catalog::Catalog;
use crate::error::SpkError::InvalidArgument;
use anyhow::Result;
use nix::unistd::{Uid, geteuid};
use std::path::PathBuf;

pub const DEFAULT_TELEPORT_VERSION: &str = "16.4.6";
pub const DEFAULT_RELEASE_URL: &str = "https://cdn.teleport.dev";
pub const DEFAULT_CACHE_PATH: &str = "/var/cache/syno-build";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Everything a single package build needs
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub catalog: Catalog,
    /// JSON catalog loaded in place of `catalog` once the privilege guard passed
    pub catalog_file: Option<PathBuf>,
    pub dsm_version: Option<String>,
    pub processor: Option<String>,
    pub teleport_version: String,
    /// Release host, without trailing slash
    pub release_url: String,
    /// Download cache directory, `None` disables caching
    pub cache_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub timeout_secs: u64,
    /// Effective uid the privilege guard checks
    pub euid: Uid,
}

impl BuildConfig {
    /// Creates a new [`BuildConfig`] with a builder pattern
    #[must_use]
    pub fn builder() -> BuildConfigBuilder {
        BuildConfigBuilder::default()
    }
}

/// Builder for [`BuildConfig`]
#[derive(Default)]
pub struct BuildConfigBuilder {
    catalog: Option<Catalog>,
    catalog_file: Option<PathBuf>,
    dsm_version: Option<String>,
    processor: Option<String>,
    teleport_version: Option<String>,
    release_url: Option<String>,
    cache_path: Option<PathBuf>,
    no_cache: bool,
    output_dir: Option<PathBuf>,
    timeout_secs: Option<u64>,
    euid: Option<Uid>,
}

impl BuildConfigBuilder {
    /// Replaces the built-in catalog
    #[must_use]
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Reads the catalog from a JSON file when the build starts
    #[must_use]
    pub fn catalog_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_file = Some(path.into());
        self
    }

    /// Sets the requested DSM version, latest when not set
    #[must_use]
    pub fn dsm_version(mut self, dsm_version: impl Into<String>) -> Self {
        self.dsm_version = Some(dsm_version.into());
        self
    }

    /// Sets the requested processor family
    #[must_use]
    pub fn processor(mut self, processor: impl Into<String>) -> Self {
        self.processor = Some(processor.into());
        self
    }

    #[must_use]
    pub fn teleport_version(mut self, version: impl Into<String>) -> Self {
        self.teleport_version = Some(version.into());
        self
    }

    /// Sets the host serving Teleport release tarballs
    #[must_use]
    pub fn release_url(mut self, url: impl Into<String>) -> Self {
        self.release_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Always download, never read or write the cache
    #[must_use]
    pub fn no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    #[must_use]
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Sets the request timeout in seconds
    #[must_use]
    pub fn timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Overrides the effective uid, the process' own by default
    #[must_use]
    pub fn euid(mut self, euid: Uid) -> Self {
        self.euid = Some(euid);
        self
    }

    /// Builds the [`BuildConfig`]
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Release URL doesn't start with "http://" or "https://"
    /// - Teleport version is empty
    /// - Timeout is zero
    pub fn build(self) -> Result<BuildConfig> {
        let release_url = self
            .release_url
            .unwrap_or_else(|| DEFAULT_RELEASE_URL.to_string());
        if !release_url.starts_with("http://") && !release_url.starts_with("https://") {
            return Err(InvalidArgument(format!(
                "release URL must start with http:// or https://, got: {release_url}"
            ))
            .into());
        }
        let release_url = release_url.trim_end_matches('/').to_string();

        let teleport_version = self
            .teleport_version
            .unwrap_or_else(|| DEFAULT_TELEPORT_VERSION.to_string())
            .trim()
            .trim_start_matches('v')
            .to_string();
        if teleport_version.is_empty() {
            return Err(InvalidArgument("Teleport version cannot be empty".into()).into());
        }

        let timeout_secs = self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(InvalidArgument("timeout must be at least one second".into()).into());
        }

        let cache_path = if self.no_cache {
            None
        } else {
            Some(
                self.cache_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH)),
            )
        };

        Ok(BuildConfig {
            catalog: self.catalog.unwrap_or_default(),
            catalog_file: self.catalog_file,
            dsm_version: self.dsm_version,
            processor: self.processor,
            teleport_version,
            release_url,
            cache_path,
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from(".")),
            timeout_secs,
            euid: self.euid.unwrap_or_else(geteuid),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpkError;

    #[test]
    fn test_defaults() {
        let config = BuildConfig::builder().build().unwrap();
        assert_eq!(DEFAULT_RELEASE_URL, config.release_url);
        assert_eq!(DEFAULT_TELEPORT_VERSION, config.teleport_version);
        assert_eq!(Some(PathBuf::from(DEFAULT_CACHE_PATH)), config.cache_path);
        assert_eq!(PathBuf::from("."), config.output_dir);
        assert_eq!(None, config.dsm_version);
        assert_eq!(None, config.processor);
    }

    #[test]
    fn test_no_cache_drops_cache_path() {
        let config = BuildConfig::builder()
            .cache_path("/tmp/cache")
            .no_cache(true)
            .build()
            .unwrap();
        assert_eq!(None, config.cache_path);
    }

    #[test]
    fn test_release_url_trailing_slash() {
        let config = BuildConfig::builder()
            .release_url("http://localhost:8080/")
            .build()
            .unwrap();
        assert_eq!("http://localhost:8080", config.release_url);
    }

    #[test]
    fn test_release_url_scheme() {
        let error = BuildConfig::builder()
            .release_url("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SpkError>(),
            Some(SpkError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_teleport_version_prefix() {
        let config = BuildConfig::builder()
            .teleport_version("v15.1.0")
            .build()
            .unwrap();
        assert_eq!("15.1.0", config.teleport_version);

        assert!(BuildConfig::builder().teleport_version(" ").build().is_err());
    }

    #[test]
    fn test_catalog_file_is_not_read_by_build() {
        let config = BuildConfig::builder()
            .catalog_file("/nonexistent/catalog.json")
            .build()
            .unwrap();
        assert_eq!(
            Some(PathBuf::from("/nonexistent/catalog.json")),
            config.catalog_file
        );
    }

    #[test]
    fn test_zero_timeout() {
        assert!(BuildConfig::builder().timeout(0).build().is_err());
    }
}
