//! Download of the raw archive when it is not already on disk.
//!
//! No checksum, no resume and no timeout: an interrupted transfer leaves a
//! partial file that only fails later, when the archive is decoded.

use crate::types::{DatasetResult, EdgeDatasetError};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

pub const NYUD_ARCHIVE_NAME: &str = "nyu_depth_v2_labeled.mat";
pub const NYUD_ARCHIVE_URL: &str =
    "https://horatio.cs.nyu.edu/mit/silberman/nyu_depth_v2/nyu_depth_v2_labeled.mat";
pub const CHUNK_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    AlreadyPresent,
    Downloaded { bytes: u64 },
}

fn download_err(url: &str, msg: impl std::fmt::Display) -> EdgeDatasetError {
    EdgeDatasetError::Download {
        url: url.to_string(),
        msg: msg.to_string(),
    }
}

fn client(url: &str) -> DatasetResult<reqwest::blocking::Client> {
    // The archive host serves an incomplete certificate chain.
    reqwest::blocking::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(None::<std::time::Duration>)
        .build()
        .map_err(|e| download_err(url, e))
}

fn get(client: &reqwest::blocking::Client, url: &str) -> DatasetResult<reqwest::blocking::Response> {
    let response = client.get(url).send().map_err(|e| download_err(url, e))?;
    if !response.status().is_success() {
        return Err(download_err(url, format!("HTTP {}", response.status())));
    }
    Ok(response)
}

/// Fill `buf` from `reader` until it is full or the stream ends.
fn read_chunk(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn chunk_progress(total_chunks: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_chunks);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} KB ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Make sure `target` exists, downloading it from `url` if absent.
pub fn ensure_local(target: &Path, url: &str) -> DatasetResult<FetchOutcome> {
    if target.exists() {
        tracing::debug!(path = %target.display(), "archive already present");
        return Ok(FetchOutcome::AlreadyPresent);
    }
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| EdgeDatasetError::io(parent, e))?;
    }

    let client = client(url)?;
    let expected = get(&client, url)?
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    let total_chunks = expected.div_ceil(CHUNK_SIZE as u64);
    tracing::info!(%url, bytes = expected, "downloading archive");

    let mut response = get(&client, url)?;
    let mut out = fs::File::create(target).map_err(|e| EdgeDatasetError::io(target, e))?;
    let pb = chunk_progress(total_chunks);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let n = read_chunk(&mut response, &mut buf).map_err(|e| download_err(url, e))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])
            .map_err(|e| EdgeDatasetError::io(target, e))?;
        written += n as u64;
        pb.inc(1);
    }
    out.flush().map_err(|e| EdgeDatasetError::io(target, e))?;
    pb.finish_and_clear();

    tracing::info!(path = %target.display(), bytes = written, "archive downloaded");
    Ok(FetchOutcome::Downloaded { bytes: written })
}
