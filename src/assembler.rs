use crate::catalog::ArchiveFormat;
use crate::entities::{BuildRequest, PackageArtifact, PackageInfo};
use crate::error::SpkError::{self, Packaging};
use crate::utils::{format_create_time, format_size};
use anyhow::Result;
use chrono::Utc;
use flate2::Compression;
use flate2::write::GzEncoder;
use log::{debug, info};
use md5::{Digest, Md5};
use std::fmt;
use std::fs::{self, File, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tar::{Builder, HeaderMode};
use tempfile::NamedTempFile;
use xz2::write::XzEncoder;

pub const PACKAGE_NAME: &str = "teleport";
const DISPLAY_NAME: &str = "Teleport";
const DESCRIPTION: &str = "Identity-aware access to SSH servers, Kubernetes clusters, databases and web applications.";
const MAINTAINER: &str = "Gravitational";
const XZ_PRESET: u32 = 6;

const START_STOP_STATUS: &str = r#"#!/bin/sh
# {{package}} {{version}} for {{processor}}, DSM {{dsm_version}}
TELEPORT="${SYNOPKG_PKGDEST}/bin/teleport"
CONFIG="{{var_dir}}/teleport.yaml"
PID_FILE="{{var_dir}}/teleport.pid"
LOG_FILE="{{var_dir}}/teleport.log"

case "$1" in
    start)
        if [ ! -f "${CONFIG}" ]; then
            echo "${CONFIG} is missing" >> "${LOG_FILE}"
            exit 1
        fi
        "${TELEPORT}" start --config="${CONFIG}" --pid-file="${PID_FILE}" >> "${LOG_FILE}" 2>&1 &
        exit 0
        ;;
    stop)
        if [ -f "${PID_FILE}" ]; then
            kill "$(cat "${PID_FILE}")" 2>/dev/null
            rm -f "${PID_FILE}"
        fi
        exit 0
        ;;
    status)
        if [ -f "${PID_FILE}" ] && kill -0 "$(cat "${PID_FILE}")" 2>/dev/null; then
            exit 0
        fi
        exit 3
        ;;
    log)
        echo "${LOG_FILE}"
        exit 0
        ;;
    *)
        exit 1
        ;;
esac
"#;

const POSTINST: &str = r#"#!/bin/sh
mkdir -p "{{var_dir}}/data"
if [ ! -f "{{var_dir}}/teleport.yaml" ]; then
    "${SYNOPKG_PKGDEST}/bin/teleport" configure \
        --data-dir="{{var_dir}}/data" \
        --output="file://{{var_dir}}/teleport.yaml"
fi
exit 0
"#;

// DSM 6 replaces the package directory on upgrade, so state is parked in the upgrade folder
const PREUPGRADE_DSM6: &str = r#"#!/bin/sh
if [ -d "{{var_dir}}" ]; then
    cp -a "{{var_dir}}" "${SYNOPKG_TEMP_UPGRADE_FOLDER}/"
fi
exit 0
"#;

const POSTUPGRADE_DSM6: &str = r#"#!/bin/sh
if [ -d "${SYNOPKG_TEMP_UPGRADE_FOLDER}/var" ]; then
    cp -a "${SYNOPKG_TEMP_UPGRADE_FOLDER}/var/." "{{var_dir}}/"
fi
exit 0
"#;

const NOOP_SCRIPT: &str = "#!/bin/sh\nexit 0\n";

/// Lays out and archives an SPK for one [`BuildRequest`]
pub struct Assembler<'a> {
    request: &'a BuildRequest,
    package_version: &'a str,
}

impl<'a> Assembler<'a> {
    #[must_use]
    pub fn new(request: &'a BuildRequest, package_version: &'a str) -> Self {
        Self {
            request,
            package_version,
        }
    }

    /// File name of the resulting package
    #[must_use]
    pub fn file_name(&self) -> String {
        self.request.spk_file_name(PACKAGE_NAME, self.package_version)
    }

    /// Builds the package from `payload_dir` into `output_dir`
    ///
    /// Intermediate files go to `work_dir`. The package is written under a
    /// temporary name and moved into place once complete.
    ///
    /// # Errors
    ///
    /// Returns [`Packaging`] if:
    /// - The payload lacks the `teleport` binary
    /// - Any file or archive can't be written
    pub fn assemble(
        &self,
        payload_dir: &Path,
        work_dir: &Path,
        output_dir: &Path,
    ) -> Result<PackageArtifact> {
        let daemon = payload_dir.join("bin").join(PACKAGE_NAME);
        if !daemon.is_file() {
            return Err(Packaging(format!("staged payload is missing {}", daemon.display())).into());
        }

        let layout = work_dir.join("spk");
        let scripts_dir = layout.join("scripts");
        fs::create_dir_all(&scripts_dir).map_err(packaging(format!(
            "cannot create {}",
            scripts_dir.display()
        )))?;

        let package_tgz = layout.join("package.tgz");
        let format = self.request.version.archive_format;
        write_payload_archive(payload_dir, &package_tgz, format)?;
        let checksum = md5_file(&package_tgz)?;
        debug!("package.tgz ({format:?}) checksum {checksum}");

        let info = self.package_info(checksum);
        let info_path = layout.join("INFO");
        fs::write(&info_path, info.render())
            .map_err(packaging(format!("cannot write {}", info_path.display())))?;

        self.write_scripts(&scripts_dir)?;

        let conf_dir = if self.request.version.is_dsm7() {
            let conf_dir = layout.join("conf");
            write_privilege(&conf_dir)?;
            Some(conf_dir)
        } else {
            None
        };

        fs::create_dir_all(output_dir).map_err(packaging(format!(
            "cannot create {}",
            output_dir.display()
        )))?;
        let path = output_dir.join(self.file_name());
        write_spk(
            &path,
            &info_path,
            &package_tgz,
            &scripts_dir,
            conf_dir.as_deref(),
        )?;

        let size = fs::metadata(&path)
            .map_err(packaging(format!("cannot stat {}", path.display())))?
            .len();
        info!("wrote {} ({})", path.display(), format_size(size));

        Ok(PackageArtifact { path, info, size })
    }

    /// Manifest for this request
    #[must_use]
    pub fn package_info(&self, checksum: String) -> PackageInfo {
        let version = &self.request.version;
        let extra = if version.is_dsm7() {
            vec![("ctl_stop", "yes")]
        } else {
            vec![("startable", "yes")]
        };
        let extra = std::iter::once(("thirdparty", "yes"))
            .chain(extra)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        PackageInfo {
            package: PACKAGE_NAME.to_string(),
            version: self.package_version.to_string(),
            arch: self.request.processor.family.clone(),
            os_min_ver: version.os_min_ver(),
            description: DESCRIPTION.to_string(),
            displayname: DISPLAY_NAME.to_string(),
            maintainer: MAINTAINER.to_string(),
            checksum,
            create_time: format_create_time(Utc::now()),
            extra,
        }
    }

    fn write_scripts(&self, scripts_dir: &Path) -> Result<()> {
        let var_dir = if self.request.version.is_dsm7() {
            "${SYNOPKG_PKGVAR}"
        } else {
            "${SYNOPKG_PKGDEST}/var"
        };
        let values = [
            ("package", PACKAGE_NAME),
            ("version", self.package_version),
            ("processor", self.request.processor.family.as_str()),
            ("dsm_version", self.request.version.version.as_str()),
            ("var_dir", var_dir),
        ];

        let (preupgrade, postupgrade) = if self.request.version.is_dsm7() {
            (NOOP_SCRIPT, NOOP_SCRIPT)
        } else {
            (PREUPGRADE_DSM6, POSTUPGRADE_DSM6)
        };
        let scripts = [
            ("start-stop-status", START_STOP_STATUS),
            ("preinst", NOOP_SCRIPT),
            ("postinst", POSTINST),
            ("preuninst", NOOP_SCRIPT),
            ("postuninst", NOOP_SCRIPT),
            ("preupgrade", preupgrade),
            ("postupgrade", postupgrade),
        ];

        for (name, template) in scripts {
            let path = scripts_dir.join(name);
            fs::write(&path, render_template(template, &values))
                .map_err(packaging(format!("cannot write {}", path.display())))?;
            fs::set_permissions(&path, Permissions::from_mode(0o755))
                .map_err(packaging(format!("cannot chmod {}", path.display())))?;
        }

        Ok(())
    }
}

/// Replaces every `{{key}}` in `template`
#[must_use]
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |text, (key, value)| {
            text.replace(&format!("{{{{{key}}}}}"), value)
        })
}

fn packaging(what: impl fmt::Display) -> impl FnOnce(io::Error) -> SpkError {
    move |e| Packaging(format!("{what}: {e}"))
}

/// Tars `dir` into `writer` with root ownership and normalized modes
fn append_tree<W: Write>(writer: W, dir: &Path) -> io::Result<W> {
    let mut builder = Builder::new(writer);
    builder.mode(HeaderMode::Deterministic);
    builder.follow_symlinks(false);
    builder.append_dir_all(".", dir)?;
    builder.into_inner()
}

fn write_payload_archive(payload_dir: &Path, dest: &Path, format: ArchiveFormat) -> Result<()> {
    let file = File::create(dest).map_err(packaging(format!("cannot create {}", dest.display())))?;
    let failed = packaging(format!("cannot archive {}", payload_dir.display()));

    let result = match format {
        ArchiveFormat::Gzip => append_tree(GzEncoder::new(file, Compression::default()), payload_dir)
            .and_then(GzEncoder::finish)
            .map(drop),
        ArchiveFormat::Xz => append_tree(XzEncoder::new(file, XZ_PRESET), payload_dir)
            .and_then(XzEncoder::finish)
            .map(drop),
    };
    result.map_err(failed)?;

    Ok(())
}

fn write_privilege(conf_dir: &Path) -> Result<()> {
    fs::create_dir_all(conf_dir)
        .map_err(packaging(format!("cannot create {}", conf_dir.display())))?;

    let privilege = serde_json::json!({
        "defaults": {
            "run-as": "package"
        }
    });
    let path = conf_dir.join("privilege");
    let json = serde_json::to_string_pretty(&privilege)
        .map_err(|e| Packaging(format!("cannot encode {}: {e}", path.display())))?;
    fs::write(&path, json).map_err(packaging(format!("cannot write {}", path.display())))?;

    Ok(())
}

fn md5_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(packaging(format!("cannot open {}", path.display())))?;
    let mut hasher = Md5::new();
    io::copy(&mut file, &mut hasher)
        .map_err(packaging(format!("cannot read {}", path.display())))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Writes the outer, uncompressed SPK tar
fn write_spk(
    path: &Path,
    info: &Path,
    package_tgz: &Path,
    scripts_dir: &Path,
    conf_dir: Option<&Path>,
) -> Result<()> {
    let output_dir = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let temp = NamedTempFile::new_in(&output_dir).map_err(packaging(format!(
        "cannot create temporary file in {}",
        output_dir.display()
    )))?;

    append_spk_entries(temp.as_file(), info, package_tgz, scripts_dir, conf_dir)
        .map_err(packaging(format!("cannot write {}", path.display())))?;
    // NamedTempFile creates 0600 files
    temp.as_file()
        .set_permissions(Permissions::from_mode(0o644))
        .map_err(packaging(format!("cannot chmod {}", path.display())))?;

    temp.persist(path)
        .map_err(|e| Packaging(format!("cannot move package to {}: {}", path.display(), e.error)))?;
    Ok(())
}

fn append_spk_entries(
    file: &File,
    info: &Path,
    package_tgz: &Path,
    scripts_dir: &Path,
    conf_dir: Option<&Path>,
) -> io::Result<()> {
    let mut builder = Builder::new(file);
    builder.mode(HeaderMode::Deterministic);
    builder.append_path_with_name(info, "INFO")?;
    builder.append_path_with_name(package_tgz, "package.tgz")?;
    builder.append_dir_all("scripts", scripts_dir)?;
    if let Some(conf_dir) = conf_dir {
        builder.append_dir_all("conf", conf_dir)?;
    }
    builder.into_inner()?.flush()
}
