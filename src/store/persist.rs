//! On-disk layout of a persisted index.
//!
//! A persisted index is a directory holding exactly two artifacts:
//!
//! ```text
//! index_store/
//! ├── vectors.bin     bincode: format version, build id, dimension, vectors
//! └── metadata.json   JSON: format version, build id, model, kind, entries
//! ```
//!
//! Both carry the same build id, so a vector file from one build can never
//! be paired with the metadata of another. Writes go to a staging directory
//! beside the target and are swapped in by rename; readers observe either
//! the previous pair or the new one.
//!
//! An advisory lock on the sibling file `<dir>.lock` serializes writers
//! (exclusive) against readers (shared) across processes.

use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::IndexKind;
use crate::error::{CorruptIndexError, RagError, Result};
use crate::types::{Embedding, EntryMetadata};

/// File name of the vector artifact.
pub const VECTORS_FILE: &str = "vectors.bin";

/// File name of the metadata side-table artifact.
pub const METADATA_FILE: &str = "metadata.json";

/// Current on-disk format version for both artifacts.
pub const FORMAT_VERSION: u32 = 1;

const STAGING_PREFIX: &str = ".ragfolio-staging-";
const BACKUP_PREFIX: &str = ".ragfolio-backup-";

/// Contents of `vectors.bin`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct VectorsArtifact<'a> {
    pub format_version: u32,
    pub build_id: Uuid,
    pub dimension: usize,
    pub vectors: Cow<'a, [Embedding]>,
}

/// Contents of `metadata.json`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct MetadataArtifact<'a> {
    pub format_version: u32,
    pub build_id: Uuid,
    pub dimension: usize,
    pub embedding_model: String,
    pub index_kind: IndexKind,
    pub count: usize,
    pub entries: Cow<'a, [EntryMetadata]>,
}

/// Returns true only when both artifacts are present in `dir`.
///
/// A directory holding just one of them counts as absent.
pub fn artifacts_exist(dir: &Path) -> bool {
    dir.join(VECTORS_FILE).is_file() && dir.join(METADATA_FILE).is_file()
}

/// Held advisory lock on `<dir>.lock`; released on drop.
pub(crate) struct DirLock {
    file: File,
    path: PathBuf,
}

impl DirLock {
    /// Blocks until no reader or writer holds the lock.
    pub fn exclusive(dir: &Path) -> Result<Self> {
        let lock = Self::open(dir)?;
        lock.file.lock_exclusive()?;
        debug!(path = %lock.path.display(), "Acquired exclusive index lock");
        Ok(lock)
    }

    /// Blocks until no writer holds the lock.
    pub fn shared(dir: &Path) -> Result<Self> {
        let lock = Self::open(dir)?;
        FileExt::lock_shared(&lock.file)?;
        debug!(path = %lock.path.display(), "Acquired shared index lock");
        Ok(lock)
    }

    fn open(dir: &Path) -> Result<Self> {
        let name = dir.file_name().ok_or_else(|| {
            RagError::config(format!(
                "persist directory '{}' must end in a directory name",
                dir.display()
            ))
        })?;
        let mut lock_name = name.to_os_string();
        lock_name.push(".lock");
        let parent = parent_dir(dir);
        fs::create_dir_all(&parent)?;
        let path = parent.join(lock_name);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        Ok(Self { file, path })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release index lock");
        }
    }
}

/// Writes both artifacts and swaps them into `dir` as one unit.
///
/// Any previous contents of `dir` are replaced, not merged. The caller holds
/// the exclusive [`DirLock`].
pub(crate) fn write_artifacts(
    dir: &Path,
    vectors: &VectorsArtifact<'_>,
    metadata: &MetadataArtifact<'_>,
) -> Result<()> {
    let parent = parent_dir(dir);
    fs::create_dir_all(&parent)?;

    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(&parent)?;

    write_synced(&staging.path().join(VECTORS_FILE), |w| {
        bincode::serialize_into(w, vectors).map_err(io::Error::other)
    })?;
    write_synced(&staging.path().join(METADATA_FILE), |w| {
        serde_json::to_writer_pretty(w, metadata).map_err(io::Error::other)
    })?;
    sync_dir(staging.path());

    // Move the previous build aside rather than deleting it, so a failed
    // swap can put it back.
    let backup = if dir.exists() {
        let backup = parent.join(format!("{BACKUP_PREFIX}{}", vectors.build_id));
        fs::rename(dir, &backup)?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = fs::rename(staging.path(), dir) {
        if let Some(backup) = &backup {
            if let Err(restore) = fs::rename(backup, dir) {
                warn!(
                    backup = %backup.display(),
                    error = %restore,
                    "Failed to restore previous index after a failed swap"
                );
            }
        }
        return Err(e.into());
    }
    sync_dir(&parent);

    if let Some(backup) = backup {
        if let Err(e) = fs::remove_dir_all(&backup) {
            warn!(backup = %backup.display(), error = %e, "Failed to remove previous index");
        }
    }

    Ok(())
}

/// Reads and cross-checks both artifacts.
///
/// Embedder compatibility is checked by the caller.
pub(crate) fn read_artifacts(
    dir: &Path,
) -> std::result::Result<(VectorsArtifact<'static>, MetadataArtifact<'static>), CorruptIndexError>
{
    let vectors_path = dir.join(VECTORS_FILE);
    let metadata_path = dir.join(METADATA_FILE);
    for path in [&vectors_path, &metadata_path] {
        if !path.is_file() {
            return Err(CorruptIndexError::MissingArtifact(path.clone()));
        }
    }

    let bytes =
        fs::read(&vectors_path).map_err(|e| CorruptIndexError::decode(VECTORS_FILE, e))?;
    let vectors: VectorsArtifact<'static> =
        bincode::deserialize(&bytes).map_err(|e| CorruptIndexError::decode(VECTORS_FILE, e))?;

    let bytes =
        fs::read(&metadata_path).map_err(|e| CorruptIndexError::decode(METADATA_FILE, e))?;
    let metadata: MetadataArtifact<'static> = serde_json::from_slice(&bytes)
        .map_err(|e| CorruptIndexError::decode(METADATA_FILE, e))?;

    verify(&vectors, &metadata)?;
    Ok((vectors, metadata))
}

/// Structural consistency between the two artifacts.
fn verify(
    vectors: &VectorsArtifact<'_>,
    metadata: &MetadataArtifact<'_>,
) -> std::result::Result<(), CorruptIndexError> {
    for (artifact, found) in [
        (VECTORS_FILE, vectors.format_version),
        (METADATA_FILE, metadata.format_version),
    ] {
        if found != FORMAT_VERSION {
            return Err(CorruptIndexError::UnsupportedFormat {
                artifact: artifact.to_string(),
                found,
                expected: FORMAT_VERSION,
            });
        }
    }

    if vectors.build_id != metadata.build_id {
        return Err(CorruptIndexError::BuildMismatch {
            vectors: vectors.build_id.to_string(),
            metadata: metadata.build_id.to_string(),
        });
    }

    if vectors.vectors.len() != metadata.entries.len() {
        return Err(CorruptIndexError::CountMismatch {
            vectors: vectors.vectors.len(),
            metadata: metadata.entries.len(),
        });
    }
    if metadata.count != metadata.entries.len() {
        return Err(CorruptIndexError::decode(
            METADATA_FILE,
            format!(
                "declares {} entries but holds {}",
                metadata.count,
                metadata.entries.len()
            ),
        ));
    }

    if vectors.dimension != metadata.dimension {
        return Err(CorruptIndexError::decode(
            VECTORS_FILE,
            format!(
                "declares dimension {}, metadata declares {}",
                vectors.dimension, metadata.dimension
            ),
        ));
    }

    for (index, entry) in metadata.entries.iter().enumerate() {
        if entry.position.get() != index {
            return Err(CorruptIndexError::PositionMismatch {
                index,
                claimed: entry.position.get(),
            });
        }
    }

    for (position, vector) in vectors.vectors.iter().enumerate() {
        if vector.len() != vectors.dimension {
            return Err(CorruptIndexError::VectorLength {
                position,
                expected: vectors.dimension,
                got: vector.len(),
            });
        }
    }

    Ok(())
}

fn parent_dir(dir: &Path) -> PathBuf {
    match dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn write_synced(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<&File>) -> io::Result<()>,
) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(&file);
    write(&mut writer)?;
    writer.flush()?;
    drop(writer);
    file.sync_all()?;
    Ok(())
}

/// Flushes directory entries (renames) to disk. Best effort.
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!(dir = %dir.display(), error = %e, "Directory fsync failed");
    }
    #[cfg(not(unix))]
    let _ = dir;
}
