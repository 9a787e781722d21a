#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ETAG: &str = "\"5d41402abc4b2a76b9719d911017c592\"";

/// Builds an in-memory Teleport-like release tarball
///
/// # Panics
///
/// Will panic if the archive can't be written
#[must_use = "This function returns the tarball bytes"]
pub fn release_tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, name, *data)
            .expect("Failed to append tarball entry");
    }
    builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .expect("Failed to finish tarball")
}

#[must_use]
pub fn default_release() -> Vec<u8> {
    release_tarball(&[
        ("teleport/teleport", b"teleport-binary"),
        ("teleport/tctl", b"tctl-binary"),
        ("teleport/tsh", b"tsh-binary"),
        ("teleport/README.md", b"readme"),
    ])
}

/// Path of the release tarball for a Teleport version and release architecture
#[must_use]
pub fn release_path(version: &str, arch: &str) -> String {
    format!("/teleport-v{version}-linux-{arch}-bin.tar.gz")
}

/// Mounts HEAD and GET mocks serving `body` at `release`
pub async fn mount_release(
    server: &MockServer,
    release: &str,
    body: Vec<u8>,
    expected_heads: u64,
    expected_gets: u64,
) {
    Mock::given(method("HEAD"))
        .and(path(release))
        .respond_with(ResponseTemplate::new(200).insert_header("etag", ETAG))
        .expect(expected_heads)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(release))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/gzip")
                .set_body_bytes(body),
        )
        .expect(expected_gets)
        .mount(server)
        .await;
}

/// All `.spk` files in `dir`
///
/// # Panics
///
/// Will panic if the directory can't be read
#[must_use]
pub fn spk_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    std::fs::read_dir(dir)
        .expect("Failed to read output directory")
        .map(|entry| entry.expect("Failed to read entry").path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "spk"))
        .collect()
}

/// Contents of an entry of the outer SPK tar
///
/// # Panics
///
/// Will panic if the package can't be read
#[must_use]
pub fn spk_entry(spk: &Path, name: &str) -> Option<Vec<u8>> {
    let mut archive = tar::Archive::new(File::open(spk).expect("Failed to open package"));
    for entry in archive.entries().expect("Failed to read package") {
        let mut entry = entry.expect("Failed to read package entry");
        let path = entry.path().expect("Invalid entry path").into_owned();
        if path.to_string_lossy().trim_start_matches("./") == name {
            let mut data = Vec::new();
            entry.read_to_end(&mut data).expect("Failed to read entry");
            return Some(data);
        }
    }
    None
}
