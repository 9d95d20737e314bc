// mariadb-backup-s3/src/backup/archive.rs
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::Builder;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

/// Why the built-in archiver stopped.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archiving cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Writes a gzipped tar of everything below `source_dir` into
/// `archive_dest_path`, which must already exist (it is truncated).
///
/// Paths inside the archive are relative to `source_dir`. The cancellation
/// token is checked before every entry; this runs on a blocking thread and
/// has no other way to learn about an interrupt.
pub fn create_tar_gz_archive(
    source_dir: &Path,
    archive_dest_path: &Path,
    cancel: &CancellationToken,
) -> Result<(), ArchiveError> {
    if !source_dir.is_dir() {
        return Err(ArchiveError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source for archival is not a directory: {}", source_dir.display()),
        )));
    }

    let archive_file = File::create(archive_dest_path)?;
    let enc = GzEncoder::new(BufWriter::new(archive_file), Compression::default());
    let mut tar_builder = Builder::new(enc);
    tar_builder.follow_symlinks(false);

    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        if cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }

        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        let name = path
            .strip_prefix(source_dir)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // the root itself
        if name.as_os_str().is_empty() {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            tar_builder.append_dir(name, path)?;
        } else if file_type.is_file() || file_type.is_symlink() {
            tar_builder.append_path_with_name(path, name)?;
        }
    }

    let encoder = tar_builder.into_inner()?;
    let writer = encoder.finish()?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(())
}
