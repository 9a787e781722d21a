use crate::error::SpkError::InvalidArgument;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

/// DSM releases known to the built-in catalog: (version, build number, inner archive format)
const DSM_VERSIONS: &[(&str, u32, ArchiveFormat)] = &[
    ("6.0", 7321, ArchiveFormat::Gzip),
    ("6.1", 15047, ArchiveFormat::Gzip),
    ("6.2", 23739, ArchiveFormat::Gzip),
    ("6.2.2", 24922, ArchiveFormat::Gzip),
    ("6.2.3", 25426, ArchiveFormat::Gzip),
    ("6.2.4", 25556, ArchiveFormat::Gzip),
    ("7.0", 41890, ArchiveFormat::Xz),
    ("7.1", 42661, ArchiveFormat::Xz),
    ("7.2", 64570, ArchiveFormat::Xz),
];

/// Synology processor families: (family, architecture, first DSM release shipping it)
const PROCESSORS: &[(&str, Architecture, &str)] = &[
    ("bromolow", Architecture::X86_64, "6.0"),
    ("avoton", Architecture::X86_64, "6.0"),
    ("alpine", Architecture::Armv7, "6.0"),
    ("braswell", Architecture::X86_64, "6.0"),
    ("apollolake", Architecture::X86_64, "6.1"),
    ("grantley", Architecture::X86_64, "6.0"),
    ("alpine4k", Architecture::Armv7, "6.0"),
    ("monaco", Architecture::Armv7, "6.0"),
    ("broadwell", Architecture::X86_64, "6.0"),
    ("broadwellntbap", Architecture::X86_64, "6.2"),
    ("kvmx64", Architecture::X86_64, "6.0"),
    ("kvmcloud", Architecture::X86_64, "7.0"),
    ("armada38x", Architecture::Armv7, "6.0"),
    ("denverton", Architecture::X86_64, "6.1"),
    ("rtd1296", Architecture::Armv8, "6.1"),
    ("broadwellnk", Architecture::X86_64, "6.2"),
    ("armada37xx", Architecture::Armv8, "6.2"),
    ("purley", Architecture::X86_64, "6.2"),
    ("geminilake", Architecture::X86_64, "6.2"),
    ("v1000", Architecture::X86_64, "6.2.2"),
    ("epyc7002", Architecture::X86_64, "7.0"),
    ("r1000", Architecture::X86_64, "7.0"),
    ("broadwellnkv2", Architecture::X86_64, "7.0"),
    ("rtd1619b", Architecture::Armv8, "7.1"),
];

/// Compression applied to the inner `package.tgz` payload archive
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Gzip,
    Xz,
}

/// CPU architecture a processor family runs
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Architecture {
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "armv7")]
    Armv7,
    #[serde(rename = "armv8")]
    Armv8,
}

impl Architecture {
    /// Synology's name for the architecture
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::X86_64 => "x86_64",
            Architecture::Armv7 => "armv7",
            Architecture::Armv8 => "armv8",
        }
    }

    /// Architecture suffix used in Teleport release file names
    #[must_use]
    pub fn release_arch(self) -> &'static str {
        match self {
            Architecture::X86_64 => "amd64",
            Architecture::Armv7 => "arm",
            Architecture::Armv8 => "arm64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A DSM release the builder can target
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SupportedVersion {
    /// Version string as passed on the command line, e.g. `7.2`
    pub version: String,
    /// DSM build number of the release
    pub api_level: u32,
    /// Compression required for the inner payload archive
    pub archive_format: ArchiveFormat,
}

impl SupportedVersion {
    /// Value for the `os_min_ver` key of the package manifest
    #[must_use]
    pub fn os_min_ver(&self) -> String {
        format!("{}-{}", self.version, self.api_level)
    }

    /// Whether this is a DSM 7 (or later) release
    #[must_use]
    pub fn is_dsm7(&self) -> bool {
        compare_versions(&self.version, "7.0") != Ordering::Less
    }
}

/// A Synology processor family (platform)
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SupportedProcessor {
    pub family: String,
    pub arch: Architecture,
    /// First DSM release available for this family
    pub since: String,
}

impl SupportedProcessor {
    /// Whether this family exists on the given DSM release
    #[must_use]
    pub fn is_available_on(&self, version: &SupportedVersion) -> bool {
        compare_versions(&version.version, &self.since) != Ordering::Less
    }
}

/// Immutable table of supported DSM versions and processor families
#[derive(Deserialize, Clone, Debug)]
pub struct Catalog {
    versions: Vec<SupportedVersion>,
    processors: Vec<SupportedProcessor>,
}

impl Catalog {
    /// The catalog compiled into the binary
    #[must_use]
    pub fn builtin() -> Self {
        let versions = DSM_VERSIONS
            .iter()
            .map(|&(version, api_level, archive_format)| SupportedVersion {
                version: version.to_string(),
                api_level,
                archive_format,
            })
            .collect();
        let processors = PROCESSORS
            .iter()
            .map(|&(family, arch, since)| SupportedProcessor {
                family: family.to_string(),
                arch,
                since: since.to_string(),
            })
            .collect();

        Self {
            versions,
            processors,
        }
    }

    /// Parses a catalog from its JSON representation
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The document is not valid catalog JSON
    /// - Either table is empty or contains duplicate names
    /// - A version string is not made of dot-separated numbers
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(json)
            .map_err(|e| InvalidArgument(format!("malformed catalog: {e}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Loads a catalog from a JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or fails [`Self::from_json`]
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| InvalidArgument(format!("cannot read catalog {}: {e}", path.display())))?;
        Self::from_json(&json).with_context(|| format!("Failed to load catalog {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if self.versions.is_empty() {
            return Err(InvalidArgument("catalog lists no DSM versions".into()).into());
        }
        if self.processors.is_empty() {
            return Err(InvalidArgument("catalog lists no processors".into()).into());
        }

        let mut seen = HashSet::new();
        for version in &self.versions {
            if parse_version(&version.version).is_none() {
                return Err(InvalidArgument(format!(
                    "catalog version '{}' is not a dotted number",
                    version.version
                ))
                .into());
            }
            if !seen.insert(version.version.as_str()) {
                return Err(
                    InvalidArgument(format!("duplicate catalog version '{}'", version.version))
                        .into(),
                );
            }
        }

        let mut seen = HashSet::new();
        for processor in &self.processors {
            if parse_version(&processor.since).is_none() {
                return Err(InvalidArgument(format!(
                    "processor '{}' has invalid first release '{}'",
                    processor.family, processor.since
                ))
                .into());
            }
            if !seen.insert(processor.family.as_str()) {
                return Err(InvalidArgument(format!(
                    "duplicate catalog processor '{}'",
                    processor.family
                ))
                .into());
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn versions(&self) -> &[SupportedVersion] {
        &self.versions
    }

    #[must_use]
    pub fn processors(&self) -> &[SupportedProcessor] {
        &self.processors
    }

    #[must_use]
    pub fn version(&self, version: &str) -> Option<&SupportedVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    #[must_use]
    pub fn processor(&self, family: &str) -> Option<&SupportedProcessor> {
        self.processors.iter().find(|p| p.family == family)
    }

    /// Highest DSM version in the catalog
    #[must_use]
    pub fn latest_version(&self) -> Option<&SupportedVersion> {
        self.versions
            .iter()
            .max_by(|a, b| compare_versions(&a.version, &b.version))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn parse_version(version: &str) -> Option<Vec<u32>> {
    version
        .split('.')
        .map(|part| part.parse::<u32>().ok())
        .collect()
}

/// Orders dotted version strings numerically, so `6.2.4 < 7.0` and `6.2 < 6.2.2`
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a = parse_version(a).unwrap_or_default();
    let b = parse_version(b).unwrap_or_default();
    a.cmp(&b)
}
