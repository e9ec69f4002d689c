//! Zip archive writing and hashing
//!
//! Documents are mostly PDF/DOCX and already compressed, so entries are
//! stored without compression. Both the archive writer and the hasher do
//! blocking file I/O and run on the blocking pool.

use mcr_common::checksum::compute_file_checksum;
use mcr_common::types::ChecksumAlgorithm;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{DownloadedFile, ZipError};

/// Write `files` into a store-only zip at `output_path`.
///
/// Entries appear in the order given and are named by display name. Repeated
/// names get a ` (n)` suffix before the extension.
#[instrument(skip(files), fields(files = files.len(), output = %output_path.display()))]
pub async fn build_zip(files: &[DownloadedFile], output_path: &Path) -> Result<(), ZipError> {
    let files = files.to_vec();
    let output_path = output_path.to_path_buf();
    tokio::task::spawn_blocking(move || write_archive(&files, &output_path)).await?
}

/// Lowercase hex SHA-256 of the file at `path`
pub async fn hash_file(path: &Path) -> Result<String, ZipError> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || compute_file_checksum(&path, ChecksumAlgorithm::Sha256))
        .await?
        .map_err(ZipError::Hash)
}

fn write_archive(files: &[DownloadedFile], output_path: &Path) -> Result<(), ZipError> {
    let mut writer = ZipWriter::new(BufWriter::new(File::create(output_path)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut names = EntryNames::default();

    for (index, file) in files.iter().enumerate() {
        let entry_name = names.claim(&file.display_name, index);
        debug!(entry = %entry_name, size = file.size, "Adding archive entry");

        writer.start_file(entry_name, options)?;
        let mut source = File::open(&file.path)?;
        std::io::copy(&mut source, &mut writer)?;
    }

    let mut out = writer.finish()?;
    out.flush()?;
    Ok(())
}

/// Hands out unique entry names
#[derive(Default)]
struct EntryNames {
    used: HashSet<String>,
}

impl EntryNames {
    fn claim(&mut self, display_name: &str, index: usize) -> String {
        let base = sanitize_entry_name(display_name, index);
        if self.used.insert(base.clone()) {
            return base;
        }

        let (stem, extension) = match base.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (base.as_str(), None),
        };

        (2u32..)
            .map(|n| match extension {
                Some(ext) => format!("{} ({}).{}", stem, n, ext),
                None => format!("{} ({})", stem, n),
            })
            .find(|candidate| self.used.insert(candidate.clone()))
            .unwrap_or(base)
    }
}

/// Path separators would create directories (or escape them) on extraction
fn sanitize_entry_name(display_name: &str, index: usize) -> String {
    let name: String = display_name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if name.is_empty() || name.chars().all(|c| c == '.') {
        format!("document-{}", index + 1)
    } else {
        name
    }
}
