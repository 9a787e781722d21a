use crate::config::BuildConfig;
use crate::entities::BuildRequest;
use crate::error::SpkError::{Fetch, UnsupportedCombination};
use crate::utils::format_size;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use reqwest::header::ETAG;
use reqwest::{Client, Response};
use std::fs::{self, File, Permissions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Binaries taken from the Teleport release tarball
pub const RELEASE_BINARIES: &[&str] = &["teleport", "tctl", "tsh", "tbot"];

/// Downloads Teleport releases into a staging directory
pub struct Fetcher {
    client: Client,
    release_url: String,
    teleport_version: String,
    cache_path: Option<PathBuf>,
}

impl Fetcher {
    #[must_use]
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            client: Self::create_client(config.timeout_secs),
            release_url: config.release_url.clone(),
            teleport_version: config.teleport_version.clone(),
            cache_path: config.cache_path.clone(),
        }
    }

    /// Creates a configured HTTP client
    fn create_client(timeout: u64) -> Client {
        Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .unwrap_or_default()
    }

    /// URL of the release tarball matching the requested processor
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedCombination`] if the processor family does not
    /// exist on the requested DSM version
    pub fn release_url(&self, request: &BuildRequest) -> Result<String> {
        if !request.processor.is_available_on(&request.version) {
            return Err(UnsupportedCombination(format!(
                "processor '{}' is not available before DSM {}, requested DSM {}",
                request.processor.family, request.processor.since, request.version.version
            ))
            .into());
        }

        Ok(format!(
            "{}/teleport-v{}-linux-{}-bin.tar.gz",
            self.release_url,
            self.teleport_version,
            request.processor.arch.release_arch()
        ))
    }

    /// Retrieves the release for `request` and unpacks its binaries
    ///
    /// Returns the payload directory, `<staging>/payload`, with the binaries in
    /// its `bin` subdirectory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The (version, processor) pair is unsupported
    /// - The request fails, times out or returns a non-success status
    /// - The body is empty or shorter than advertised
    /// - The tarball can't be unpacked or holds no `teleport` binary
    pub async fn fetch(&self, request: &BuildRequest, staging: &Path) -> Result<PathBuf> {
        let url = self.release_url(request)?;
        let file_name = url.rsplit('/').next().unwrap_or("release.tar.gz");
        let archive_path = staging.join(file_name);

        match &self.cache_path {
            Some(cache_dir) => self.fetch_cached(&url, cache_dir, &archive_path).await?,
            None => {
                self.download(&url, &archive_path).await?;
            }
        }

        let payload_dir = staging.join("payload");
        let binaries = unpack_release(&archive_path, &payload_dir)
            .with_context(|| format!("Failed to unpack {file_name}"))?;
        debug!("Staged binaries: {}", binaries.join(", "));

        Ok(payload_dir)
    }

    /// Serves the file from the cache, downloading it into the cache first when missing
    async fn fetch_cached(&self, url: &str, cache_dir: &Path, dest: &Path) -> Result<()> {
        if !cache_dir.exists() {
            info!("Creating cache folder {}", cache_dir.display());
        }
        fs::create_dir_all(cache_dir).map_err(|e| {
            Fetch(format!(
                "cannot create cache folder {}: {e}",
                cache_dir.display()
            ))
        })?;

        let Some(key) = self.cache_key(url).await? else {
            warn!("{url} has no ETag, bypassing cache");
            self.download(url, dest).await?;
            return Ok(());
        };

        let cached = cache_dir.join(format!("{key}.tar.gz"));
        let name = base_name(url);
        if cached.is_file() {
            info!("found {name} in {}", cache_dir.display());
        } else {
            info!("{name} not found in cache, downloading");
            self.download(url, &cached).await?;
        }

        fs::copy(&cached, dest).map_err(|e| {
            Fetch(format!(
                "cannot copy {} to {}: {e}",
                cached.display(),
                dest.display()
            ))
        })?;
        Ok(())
    }

    /// ETag of the remote file, usable as a file name
    async fn cache_key(&self, url: &str) -> Result<Option<String>> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| Fetch(format!("HEAD {url}: {e}")))?;
        check_status(&response, "HEAD", url)?;

        let key = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(sanitize_etag)
            .filter(|key| !key.is_empty());
        debug!("Cache key for {url}: {key:?}");

        Ok(key)
    }

    /// Downloads `url` to `dest`, returning the number of bytes written
    ///
    /// The body is written to a `.part` file first and only renamed to `dest`
    /// once it is complete.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        debug!("Downloading {url} to {}", dest.display());

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Fetch(format!("GET {url}: {e}")))?;
        check_status(&response, "GET", url)?;

        let part = part_path(dest);
        let written = match write_body(&mut response, &part, url).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&part);
                return Err(e);
            }
        };

        fs::rename(&part, dest).map_err(|e| {
            Fetch(format!(
                "cannot move {} to {}: {e}",
                part.display(),
                dest.display()
            ))
        })?;

        info!("downloaded {} ({})", base_name(url), format_size(written));
        Ok(written)
    }
}

/// `dest` with ".part" appended to the whole file name
fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

fn check_status(response: &Response, method: &str, url: &str) -> Result<()> {
    let status = response.status();
    debug!("{method} {url}: {status}");
    if status.is_success() {
        Ok(())
    } else {
        Err(Fetch(format!(
            "{method} {url} failed with status: {} ({})",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        ))
        .into())
    }
}

async fn write_body(response: &mut Response, part: &Path, url: &str) -> Result<u64> {
    let expected = response.content_length();
    let mut file = File::create(part)
        .map_err(|e| Fetch(format!("cannot create {}: {e}", part.display())))?;

    let progress = download_progress(expected, base_name(url));
    let mut written = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| Fetch(format!("reading {url}: {e}")))?
    {
        file.write_all(&chunk)
            .map_err(|e| Fetch(format!("cannot write {}: {e}", part.display())))?;
        written += chunk.len() as u64;
        progress.inc(chunk.len() as u64);
    }
    progress.finish_and_clear();
    file.flush()
        .map_err(|e| Fetch(format!("cannot write {}: {e}", part.display())))?;

    if written == 0 {
        return Err(Fetch(format!("{url} returned an empty body")).into());
    }
    match expected {
        Some(expected) if expected != written => Err(Fetch(format!(
            "{url} is incomplete: received {written} of {expected} bytes"
        ))
        .into()),
        _ => Ok(written),
    }
}

fn download_progress(total: Option<u64>, name: &str) -> ProgressBar {
    let progress = match total {
        Some(total) => ProgressBar::new(total).with_style(
            ProgressStyle::with_template(
                "downloading {msg} {bytes}/{total_bytes} [{bar:30}] {bytes_per_sec}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        ),
        None => ProgressBar::new_spinner(),
    };
    progress.set_message(name.to_string());
    progress
}

fn base_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

fn sanitize_etag(etag: &str) -> String {
    etag.trim()
        .trim_start_matches("W/")
        .trim_matches('"')
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Extracts the known Teleport binaries from a release tarball into `<payload_dir>/bin`
///
/// # Errors
///
/// Returns [`Fetch`] if the archive can't be read or holds no `teleport` binary
pub fn unpack_release(archive: &Path, payload_dir: &Path) -> Result<Vec<String>> {
    let file = File::open(archive)
        .map_err(|e| Fetch(format!("cannot open {}: {e}", archive.display())))?;
    let mut tarball = tar::Archive::new(GzDecoder::new(file));

    let bin_dir = payload_dir.join("bin");
    fs::create_dir_all(&bin_dir)
        .map_err(|e| Fetch(format!("cannot create {}: {e}", bin_dir.display())))?;

    let corrupt = |e: std::io::Error| Fetch(format!("corrupt release archive: {e}"));
    let mut found = Vec::new();
    for entry in tarball.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry.path().map_err(corrupt)?.into_owned();
        // Binaries sit at the top of the tarball or directly under `teleport/`
        if path.components().count() > 2 {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !RELEASE_BINARIES.contains(&name) {
            continue;
        }

        let target = bin_dir.join(name);
        entry.unpack(&target).map_err(corrupt)?;
        fs::set_permissions(&target, Permissions::from_mode(0o755))
            .map_err(|e| Fetch(format!("cannot chmod {}: {e}", target.display())))?;
        found.push(name.to_string());
    }

    if !found.iter().any(|name| name == "teleport") {
        return Err(Fetch(format!(
            "{} contains no teleport binary",
            archive.display()
        ))
        .into());
    }

    Ok(found)
}
