use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::retry::{with_retry, RetryPolicy};

/// Default number of rolling backups retained per snapshot file, matching
/// the registry and policy store.
pub const DEFAULT_BACKUP_COUNT: u32 = 3;

fn backup_path(canonical: &Path, n: u32) -> PathBuf {
    let mut name = canonical.as_os_str().to_owned();
    name.push(format!(".bak.{n}"));
    PathBuf::from(name)
}

/// Rotate `<name>.bak.1 .. .bak.N`: N-1 -> N, ..., 1 -> 2, then copy the
/// current canonical file into `.bak.1`. Newest backup is always `.bak.1`.
/// A missing canonical file (first write ever) is not an error.
fn rotate_backups(canonical: &Path, backup_count: u32) -> std::io::Result<()> {
    if backup_count == 0 {
        return Ok(());
    }
    for n in (1..backup_count).rev() {
        let from = backup_path(canonical, n);
        let to = backup_path(canonical, n + 1);
        if from.exists() {
            fs::rename(&from, &to)?;
        }
    }
    if canonical.exists() {
        fs::copy(canonical, backup_path(canonical, 1))?;
    }
    Ok(())
}

/// Snapshot `bytes` to `path` with the write-tempfile / fsync / atomic-rename
/// discipline shared by the Principal Registry and Policy Store: rotate
/// backups, write to a sibling temp file, fsync, rename over the canonical
/// path. Retries on transient I/O per `policy`.
///
/// Grounded on the registry's `_persist`/`_create_backup` pair: create
/// backup first, then write-fsync-rename.
pub fn atomic_write_with_backups(
    path: &Path,
    bytes: &[u8],
    backup_count: u32,
    policy: RetryPolicy,
) -> Result<(), CoreError> {
    with_retry(policy, || {
        rotate_backups(path, backup_count).map_err(|e| CoreError::TransientIo(e.to_string()))?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let tmp_path = dir.join(format!(
            ".{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("snapshot")
        ));

        let mut file =
            File::create(&tmp_path).map_err(|e| CoreError::TransientIo(e.to_string()))?;
        file.write_all(bytes)
            .map_err(|e| CoreError::TransientIo(e.to_string()))?;
        file.sync_all()
            .map_err(|e| CoreError::TransientIo(e.to_string()))?;
        drop(file);

        fs::rename(&tmp_path, path).map_err(|e| CoreError::TransientIo(e.to_string()))?;
        Ok(())
    })
}

/// Read the canonical file's contents, returning `None` if it does not yet
/// exist (fresh store).
pub fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, CoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CoreError::TransientIo(e.to_string())),
    }
}
