use crate::catalog::{SupportedProcessor, SupportedVersion};
use std::fmt::Write;
use std::path::PathBuf;

/// Resolved target of a single build
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildRequest {
    pub version: SupportedVersion,
    pub processor: SupportedProcessor,
}

impl BuildRequest {
    /// File name of the package built for this request
    #[must_use]
    pub fn spk_file_name(&self, package: &str, package_version: &str) -> String {
        format!(
            "{package}-{package_version}-{}-dsm{}.spk",
            self.processor.family, self.version.version
        )
    }
}

/// Package metadata written to the SPK `INFO` file
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageInfo {
    pub package: String,
    pub version: String,
    /// Processor family the package installs on
    pub arch: String,
    /// Minimum DSM release, `<version>-<build>`
    pub os_min_ver: String,
    pub description: String,
    pub displayname: String,
    pub maintainer: String,
    /// MD5 of `package.tgz`
    pub checksum: String,
    pub create_time: String,
    /// Extra keys that depend on the DSM generation (`startable`, `ctl_stop`, ...)
    pub extra: Vec<(String, String)>,
}

impl PackageInfo {
    /// Renders the manifest as `key="value"` lines
    #[must_use]
    pub fn render(&self) -> String {
        let mut info = String::new();
        for (key, value) in self.fields() {
            // Writing to a String can't fail
            let _ = writeln!(info, "{key}=\"{}\"", escape(value));
        }
        info
    }

    /// Parses `key="value"` lines back into a manifest
    ///
    /// Blank lines and `#` comments are skipped, unknown keys land in
    /// [`PackageInfo::extra`].
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut info = PackageInfo::default();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            let value = unescape(
                value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value),
            );
            match key.trim() {
                "package" => info.package = value,
                "version" => info.version = value,
                "arch" => info.arch = value,
                "os_min_ver" => info.os_min_ver = value,
                "description" => info.description = value,
                "displayname" => info.displayname = value,
                "maintainer" => info.maintainer = value,
                "checksum" => info.checksum = value,
                "create_time" => info.create_time = value,
                other => info.extra.push((other.to_string(), value)),
            }
        }
        info
    }

    fn fields(&self) -> Vec<(&str, &str)> {
        let mut fields = vec![
            ("package", self.package.as_str()),
            ("version", self.version.as_str()),
            ("os_min_ver", self.os_min_ver.as_str()),
            ("description", self.description.as_str()),
            ("arch", self.arch.as_str()),
            ("maintainer", self.maintainer.as_str()),
            ("displayname", self.displayname.as_str()),
            ("checksum", self.checksum.as_str()),
            ("create_time", self.create_time.as_str()),
        ];
        fields.extend(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        fields
    }

    /// Looks up a key in [`PackageInfo::extra`]
    #[must_use]
    pub fn extra_value(&self, key: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn unescape(value: &str) -> String {
    value.replace("\\\"", "\"").replace("\\\\", "\\")
}

/// The finished package on disk
#[derive(Debug)]
pub struct PackageArtifact {
    pub path: PathBuf,
    pub info: PackageInfo,
    /// Size in bytes
    pub size: u64,
}
