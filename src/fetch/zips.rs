use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::Path;
use tracing::{debug, warn};
use url::Url;
use zip::ZipArchive;

/// Outcome of a single archive request that reached the server.
#[derive(Debug)]
pub enum Download {
    /// Success status; the body is expected to be a ZIP.
    Archive(Vec<u8>),
    /// Any other status. The body carries no contract and is dropped.
    Unavailable(StatusCode),
}

/// GET `url` and hand back the body only on a success status.
/// Transport failures are returned as errors.
pub fn download_archive(client: &Client, url: &Url) -> Result<Download> {
    let resp = client
        .get(url.as_str())
        .send()
        .with_context(|| format!("GET {}", url))?;
    let status = resp.status();
    if !status.is_success() {
        return Ok(Download::Unavailable(status));
    }
    let bytes = resp
        .bytes()
        .with_context(|| format!("reading body from {}", url))?;
    debug!(%url, bytes = bytes.len(), "downloaded archive");
    Ok(Download::Archive(bytes.to_vec()))
}

/// Unpack every entry of the ZIP in `body` under `dest`, overwriting files
/// with the same name. Returns the number of files written.
pub fn extract_archive(body: &[u8], dest: &Path) -> Result<usize> {
    let mut archive = ZipArchive::new(Cursor::new(body)).context("opening ZIP archive")?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("reading ZIP entry #{}", i))?;
        let name = entry.name().to_string();

        // entries with absolute paths or `..` never leave `dest`
        let Some(rel) = entry.enclosed_name() else {
            warn!(entry = %name, "skipping entry outside the target directory");
            continue;
        };
        let out_path = dest.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .with_context(|| format!("creating {}", out_path.display()))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let mut out = File::create(&out_path)
            .with_context(|| format!("creating {}", out_path.display()))?;
        io::copy(&mut entry, &mut out).with_context(|| format!("extracting {}", name))?;
        written += 1;
    }

    Ok(written)
}
