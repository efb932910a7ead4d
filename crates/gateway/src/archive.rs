//! Archive Codec: serializes a session's steps into a portable ZIP, and
//! parses one back.
//!
//! The `zip` crate's call shape (`ZipWriter`/`FileOptions`/`ZipArchive`) is
//! grounded on the dependency choice in `MattFrayser-ArchDrop`'s manifest —
//! that repo ships an encrypted file-transfer tool in the same spirit as
//! this module's password envelope, but its retrieved source doesn't touch
//! the zip format itself (it streams raw chunks over HTTP), so the crate's
//! own documented API is followed directly here. The password envelope
//! wrapping the whole ZIP blob reuses [`crate::crypto::encrypt`] /
//! [`crate::crypto::decrypt`] unchanged.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::crypto::{self, CryptoError};
use crate::session::Step;
#[cfg(test)]
use crate::session::StepAction;

const ARCHIVE_VERSION: &str = "1.0.0";
const MAGIC_ZIP: [u8; 2] = [0x50, 0x4B];

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive is empty or not recognizable as a ZIP or encrypted envelope")]
    Unrecognized,
    #[error("a password is required to decrypt this archive")]
    PasswordRequired,
    #[error("failed to decrypt archive: {0}")]
    DecryptFailed(#[from] CryptoError),
    #[error("archive is not a valid ZIP: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("steps.json is missing or malformed: {0}")]
    InvalidSteps(serde_json::Error),
    #[error("archive has no steps")]
    EmptySteps,
    #[error("archive exceeds the maximum of {max} steps")]
    TooManySteps { max: usize },
    #[error("failed to write archive to disk: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub step_count: usize,
    #[serde(default)]
    pub encrypted: bool,
}

fn default_version() -> String {
    ARCHIVE_VERSION.to_owned()
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub title: String,
    pub password: Option<String>,
    pub include_screenshots: bool,
    pub created_at_ms: u64,
}

/// Build the ZIP (pre-encryption) for `steps`, rewriting each step's
/// screenshot path to `screenshots/<basename>` and bundling the referenced
/// files when `include_screenshots` is set.
fn build_zip(steps: &[Step], opts: &ExportOptions) -> Result<Vec<u8>, ArchiveError> {
    let mut rewritten = Vec::with_capacity(steps.len());
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    for step in steps {
        let mut step = step.clone();
        if let Some(path) = &step.screenshot_path {
            let basename = Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or("screenshot.jpg");
            let archive_path = format!("screenshots/{basename}");
            if opts.include_screenshots {
                if let Ok(bytes) = std::fs::read(path) {
                    files.push((archive_path.clone(), bytes));
                }
            }
            step.screenshot_path = Some(archive_path);
        }
        rewritten.push(step);
    }

    let manifest = Manifest {
        version: ARCHIVE_VERSION.to_owned(),
        title: opts.title.clone(),
        created_at: opts.created_at_ms,
        step_count: rewritten.len(),
        encrypted: opts.password.is_some(),
    };

    let buf = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(buf);
    let file_opts = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("manifest.json", file_opts)?;
    zip.write_all(&serde_json::to_vec_pretty(&manifest).map_err(ArchiveError::InvalidSteps)?)?;

    zip.start_file("steps.json", file_opts)?;
    zip.write_all(&serde_json::to_vec_pretty(&rewritten).map_err(ArchiveError::InvalidSteps)?)?;

    for (path, bytes) in files {
        zip.start_file(path, file_opts)?;
        zip.write_all(&bytes)?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

/// Export(session steps, options) → the final archive bytes, optionally
/// wrapped in the password envelope.
pub fn export(steps: &[Step], opts: &ExportOptions) -> Result<Vec<u8>, ArchiveError> {
    let zip_bytes = build_zip(steps, opts)?;
    match &opts.password {
        Some(password) => Ok(crypto::encrypt(&zip_bytes, password)?),
        None => Ok(zip_bytes),
    }
}

/// Outcome of attempting to read an archive's magic bytes: either it's a
/// plain ZIP, or the caller must supply a password.
enum Opened {
    Zip(Vec<u8>),
    NeedsPassword,
}

fn open_envelope(buffer: &[u8], password: Option<&str>) -> Result<Opened, ArchiveError> {
    if buffer.len() >= 2 && buffer[0..2] == MAGIC_ZIP {
        return Ok(Opened::Zip(buffer.to_vec()));
    }
    if buffer.is_empty() {
        return Err(ArchiveError::Unrecognized);
    }
    match password {
        Some(password) => Ok(Opened::Zip(crypto::decrypt(buffer, password)?)),
        None => Ok(Opened::NeedsPassword),
    }
}

pub struct Preview {
    pub manifest: Manifest,
    pub step_count: usize,
    pub encrypted: bool,
}

/// Preview(buffer, password?) — steps 1-3 of Import only: detect, decrypt,
/// parse the manifest and count steps. Never touches the session's step
/// store or the filesystem.
pub fn preview(buffer: &[u8], password: Option<&str>) -> Result<Preview, ArchiveError> {
    let zip_bytes = match open_envelope(buffer, password)? {
        Opened::Zip(bytes) => bytes,
        Opened::NeedsPassword => {
            return Ok(Preview {
                manifest: Manifest { version: default_version(), title: String::new(), created_at: 0, step_count: 0, encrypted: true },
                step_count: 0,
                encrypted: true,
            })
        }
    };

    let mut archive = ZipArchive::new(Cursor::new(zip_bytes))?;
    let manifest = read_manifest(&mut archive);
    let steps = read_steps(&mut archive)?;
    Ok(Preview { step_count: steps.len(), encrypted: password.is_some(), manifest })
}

fn read_manifest(archive: &mut ZipArchive<Cursor<Vec<u8>>>) -> Manifest {
    archive
        .by_name("manifest.json")
        .ok()
        .and_then(|mut file| {
            let mut buf = String::new();
            file.read_to_string(&mut buf).ok()?;
            serde_json::from_str(&buf).ok()
        })
        .unwrap_or(Manifest { version: default_version(), title: String::new(), created_at: 0, step_count: 0, encrypted: false })
}

fn read_steps(archive: &mut ZipArchive<Cursor<Vec<u8>>>) -> Result<Vec<Step>, ArchiveError> {
    let mut file = archive.by_name("steps.json")?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)?;
    serde_json::from_str(&buf).map_err(ArchiveError::InvalidSteps)
}

pub struct Imported {
    pub title: String,
    pub created_at: u64,
    pub steps: Vec<Step>,
}

/// Import(buffer, password?, workdir, max_steps) — full validation plus
/// screenshot extraction into `workdir`, rewriting each step's
/// `screenshot_path` to the new on-disk location.
pub fn import(buffer: &[u8], password: Option<&str>, workdir: &Path, max_steps: usize) -> Result<Imported, ArchiveError> {
    let zip_bytes = match open_envelope(buffer, password)? {
        Opened::Zip(bytes) => bytes,
        Opened::NeedsPassword => return Err(ArchiveError::PasswordRequired),
    };

    let mut archive = ZipArchive::new(Cursor::new(zip_bytes))?;
    let manifest = read_manifest(&mut archive);
    let mut steps = read_steps(&mut archive)?;

    if steps.is_empty() {
        return Err(ArchiveError::EmptySteps);
    }
    if steps.len() > max_steps {
        return Err(ArchiveError::TooManySteps { max: max_steps });
    }

    let screenshots = read_screenshots(&mut archive)?;
    std::fs::create_dir_all(workdir)?;

    for step in &mut steps {
        let Some(path) = step.screenshot_path.take() else { continue };
        let basename = Path::new(&path).file_name().and_then(|n| n.to_str()).unwrap_or("screenshot.jpg").to_owned();
        let candidates = [path.clone(), format!("screenshots/{basename}"), basename.clone()];
        let Some(bytes) = candidates.iter().find_map(|c| screenshots.get(c)) else { continue };

        let dest = workdir.join(&basename);
        std::fs::write(&dest, bytes)?;
        step.screenshot_path = Some(dest.to_string_lossy().into_owned());
    }

    step_reindex(&mut steps);
    Ok(Imported { title: manifest.title, created_at: manifest.created_at, steps })
}

fn read_screenshots(archive: &mut ZipArchive<Cursor<Vec<u8>>>) -> Result<HashMap<String, Vec<u8>>, ArchiveError> {
    let mut out = HashMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let name = file.name().to_owned();
        if !name.starts_with("screenshots/") || file.is_dir() {
            continue;
        }
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        out.insert(name, bytes);
    }
    Ok(out)
}

fn step_reindex(steps: &mut [Step]) {
    for (i, step) in steps.iter_mut().enumerate() {
        step.index = i;
    }
}

/// Only used by tests below — real callers always go through the full
/// [`Step`] action, but the fixtures need something concrete to round-trip.
#[cfg(test)]
fn sample_step(id: &str, to_url: &str) -> Step {
    Step {
        id: id.to_owned(),
        index: 0,
        action: StepAction::Navigate { from_url: None, to_url: to_url.to_owned(), trigger: crate::browser::NavigationTrigger::User },
        caption: format!("Navigate to {to_url}"),
        screenshot_path: None,
        created_at_ms: 0,
    }
}
