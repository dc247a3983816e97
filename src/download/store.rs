//! Media store: idempotent, date-prefixed writes into per-user folders.

use std::fs::FileTimes;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use tokio::fs;

use super::error::DownloadError;
use super::paths::{self, TargetFolder, LEGACY_CONVERSATIONS_DIR};
use crate::api::Transport;

const PART_SUFFIX: &str = ".part";

/// Result of a successful `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Written(PathBuf),
    /// A file containing the basename already exists in the folder.
    Duplicate,
    /// `--noextra` is set and the folder belongs to another user.
    Excluded,
}

pub struct MediaStore<'a> {
    root: PathBuf,
    transport: &'a dyn Transport,
    no_extra: bool,
}

impl<'a> MediaStore<'a> {
    pub fn new(root: impl Into<PathBuf>, transport: &'a dyn Transport, no_extra: bool) -> Self {
        Self {
            root: root.into(),
            transport,
            no_extra,
        }
    }

    pub fn folder_path(&self, folder: &TargetFolder) -> PathBuf {
        self.root.join(folder.relative_path())
    }

    /// Store the media at `url` as `<date>_<base_filename>` inside `folder`.
    ///
    /// Exclusion and the duplicate check both happen before the fetch, so a
    /// skipped item costs no bandwidth.
    pub async fn put(
        &self,
        url: &str,
        base_filename: &str,
        created_at: &DateTime<Utc>,
        folder: &TargetFolder,
    ) -> Result<PutOutcome, DownloadError> {
        if self.no_extra && !folder.is_primary() {
            return Ok(PutOutcome::Excluded);
        }
        // An empty basename would match every file in the folder.
        if base_filename.is_empty() {
            return Err(DownloadError::InvalidUrl(url.to_string()));
        }

        let dir = self.folder_path(folder);
        fs::create_dir_all(&dir).await?;

        if list_filenames(&dir)
            .await?
            .iter()
            .any(|name| name.contains(base_filename))
        {
            return Ok(PutOutcome::Duplicate);
        }

        let bytes = self.transport.get_bytes(url).await?;

        let final_path = dir.join(paths::stored_filename(created_at, base_filename));
        write_via_part(&final_path, &bytes).await?;

        let mtime_path = final_path.clone();
        let ts = created_at.timestamp();
        match tokio::task::spawn_blocking(move || set_file_mtime(&mtime_path, ts)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!("Could not set mtime on {}: {}", final_path.display(), e)
            }
            Err(e) => tracing::warn!("mtime task failed: {}", e),
        }

        Ok(PutOutcome::Written(final_path))
    }
}

/// Write `bytes` to `<final_path>.part`, then rename it into place. The
/// `.part` file is removed if either step fails.
async fn write_via_part(final_path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut part_path = final_path.as_os_str().to_owned();
    part_path.push(PART_SUFFIX);
    let part_path = PathBuf::from(part_path);

    let result = match fs::write(&part_path, bytes).await {
        Ok(()) => fs::rename(&part_path, final_path).await,
        Err(e) => Err(e),
    };
    if result.is_err() {
        let _ = fs::remove_file(&part_path).await;
    }
    result
}

/// Names of the files in `dir`, ignoring in-progress `.part` files.
/// A missing directory is treated as empty.
pub async fn list_filenames(dir: &Path) -> io::Result<Vec<String>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(PART_SUFFIX) {
            names.push(name);
        }
    }
    Ok(names)
}

/// User folders under the media root, sorted by name.
///
/// Containers such as `_extra` and `_conversations` start with `_` and are
/// not users.
pub async fn list_user_directories(root: &Path) -> io::Result<Vec<String>> {
    let mut users = Vec::new();
    let mut entries = fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('_') {
            users.push(name);
        }
    }
    users.sort();
    Ok(users)
}

/// Move `<root>/_conversations/<username>` into `<root>/<username>`.
///
/// When both exist the legacy folder is merged file by file; files already
/// present in the primary folder are left alone. Returns `true` if a legacy
/// folder was found.
pub async fn migrate_legacy_folder(root: &Path, username: &str) -> io::Result<bool> {
    let username = username.to_lowercase();
    let legacy = root.join(LEGACY_CONVERSATIONS_DIR).join(&username);
    if !fs::try_exists(&legacy).await? {
        return Ok(false);
    }

    let target = root.join(&username);
    if !fs::try_exists(&target).await? {
        fs::create_dir_all(root).await?;
        fs::rename(&legacy, &target).await?;
        tracing::info!(
            "Moved {} from {} to the main media folder",
            username,
            LEGACY_CONVERSATIONS_DIR
        );
        return Ok(true);
    }

    let mut moved = 0usize;
    let mut entries = fs::read_dir(&legacy).await?;
    while let Some(entry) = entries.next_entry().await? {
        let dest = target.join(entry.file_name());
        if fs::try_exists(&dest).await? {
            continue;
        }
        fs::rename(entry.path(), &dest).await?;
        moved += 1;
    }

    // Leftovers are files the primary folder already had.
    if let Err(e) = fs::remove_dir(&legacy).await {
        tracing::debug!("Keeping {}: {}", legacy.display(), e);
    }
    tracing::info!(
        "Merged {} files for {} from {} into the main media folder",
        moved,
        username,
        LEGACY_CONVERSATIONS_DIR
    );
    Ok(true)
}

/// Set the modification and access times of a file to the given Unix
/// timestamp, clamping pre-epoch dates to the epoch.
fn set_file_mtime(path: &Path, timestamp: i64) -> io::Result<()> {
    let time = if timestamp >= 0 {
        UNIX_EPOCH + Duration::from_secs(timestamp as u64)
    } else {
        UNIX_EPOCH
            .checked_sub(Duration::from_secs(timestamp.unsigned_abs()))
            .unwrap_or(SystemTime::UNIX_EPOCH)
    };
    let times = FileTimes::new().set_modified(time).set_accessed(time);
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_times(times)?;
    Ok(())
}
