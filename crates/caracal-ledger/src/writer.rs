use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use caracal_core::persist::DEFAULT_BACKUP_COUNT;
use caracal_core::retry::{with_retry, RetryPolicy};
use caracal_core::{now_unix, CoreError, Money, PrincipalId};
use fs2::FileExt;
use serde_json::Value;

use crate::error::LedgerError;
use crate::event::LedgerEvent;

const TAIL_SCAN_BYTES: u64 = 8192;

/// Owns the append-only event log file and the next-`event_id` counter.
/// Grounded on `caracal/core/ledger.py`'s `LedgerWriter`: backup-once,
/// lock-write-fsync-unlock per append, monotonic ids rehydrated from the
/// file's tail on startup.
pub struct LedgerWriter {
    path: PathBuf,
    backup_count: u32,
    next_event_id: Mutex<u64>,
    backup_created: AtomicBool,
}

impl LedgerWriter {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        Self::open_with_backups(path, DEFAULT_BACKUP_COUNT)
    }

    pub fn open_with_backups(path: impl Into<PathBuf>, backup_count: u32) -> Result<Self, LedgerError> {
        let path = path.into();
        let next_event_id = read_last_event_id(&path)?.map(|id| id + 1).unwrap_or(1);
        Ok(Self {
            path,
            backup_count,
            next_event_id: Mutex::new(next_event_id),
            backup_created: AtomicBool::new(false),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &self,
        principal_id: PrincipalId,
        resource_type: &str,
        quantity: Money,
        cost: Money,
        currency: &str,
        metadata: Option<Value>,
    ) -> Result<LedgerEvent, LedgerError> {
        if resource_type.is_empty() {
            return Err(LedgerError::InvalidEvent("resource_type must not be empty".into()));
        }
        if quantity.is_negative() {
            return Err(LedgerError::InvalidEvent("quantity must be non-negative".into()));
        }
        if cost.is_negative() {
            return Err(LedgerError::InvalidEvent("cost must be non-negative".into()));
        }

        if !self.backup_created.swap(true, Ordering::SeqCst) && self.path.exists() {
            caracal_core::persist::atomic_write_with_backups(
                &self.path,
                &std::fs::read(&self.path)?,
                self.backup_count,
                RetryPolicy::default(),
            )
            .map_err(LedgerError::Core)?;
        }

        let mut id_guard = self.next_event_id.lock().unwrap();
        let event_id = *id_guard;

        let event = LedgerEvent {
            event_id,
            principal_id,
            timestamp: now_unix(),
            resource_type: resource_type.to_string(),
            quantity,
            cost,
            currency: currency.to_string(),
            metadata,
        };

        let mut line = serde_json::to_vec(&event).map_err(|e| LedgerError::Core(CoreError::Serialization(e.to_string())))?;
        line.push(b'\n');

        let path = self.path.clone();
        with_retry(RetryPolicy::default(), move || append_locked(&path, &line)).map_err(LedgerError::Core)?;

        *id_guard = event_id + 1;
        tracing::info!(event_id, principal_id = %principal_id, resource_type, "ledger event appended");
        Ok(event)
    }
}

fn append_locked(path: &Path, line: &[u8]) -> Result<(), CoreError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| CoreError::TransientIo(e.to_string()))?;
    file.lock_exclusive().map_err(|e| CoreError::TransientIo(e.to_string()))?;
    let result = (|| {
        file.write_all(line).map_err(|e| CoreError::TransientIo(e.to_string()))?;
        file.flush().map_err(|e| CoreError::TransientIo(e.to_string()))?;
        file.sync_all().map_err(|e| CoreError::TransientIo(e.to_string()))
    })();
    let _ = fs2::FileExt::unlock(&file);
    result
}

/// Scan the last [`TAIL_SCAN_BYTES`] of the file for the last complete line
/// and parse its `event_id`, tolerating a truncated trailing line left by a
/// crashed write.
fn read_last_event_id(path: &Path) -> Result<Option<u64>, LedgerError> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LedgerError::Core(CoreError::TransientIo(e.to_string()))),
    };
    let len = file.metadata().map_err(|e| LedgerError::Core(CoreError::TransientIo(e.to_string())))?.len();
    let start = len.saturating_sub(TAIL_SCAN_BYTES);
    file.seek(SeekFrom::Start(start))
        .map_err(|e| LedgerError::Core(CoreError::TransientIo(e.to_string())))?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)
        .map_err(|e| LedgerError::Core(CoreError::TransientIo(e.to_string())))?;

    for line in buf.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(event) = serde_json::from_str::<LedgerEvent>(line) {
            return Ok(Some(event.event_id));
        }
        tracing::warn!("skipping malformed trailing ledger line while rehydrating event_id");
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[test]
    fn event_ids_are_monotonic() {
        let dir = tempdir().unwrap();
        let writer = LedgerWriter::open(dir.path().join("ledger.jsonl")).unwrap();
        let p = PrincipalId::new();
        let e1 = writer
            .append(p, "api_call", Money::from_decimal(dec!(1)), Money::from_decimal(dec!(0.01)), "USD", None)
            .unwrap();
        let e2 = writer
            .append(p, "api_call", Money::from_decimal(dec!(1)), Money::from_decimal(dec!(0.01)), "USD", None)
            .unwrap();
        assert_eq!(e1.event_id, 1);
        assert_eq!(e2.event_id, 2);
    }

    #[test]
    fn rejects_negative_amounts() {
        let dir = tempdir().unwrap();
        let writer = LedgerWriter::open(dir.path().join("ledger.jsonl")).unwrap();
        let p = PrincipalId::new();
        let result = writer.append(p, "api_call", Money::from_decimal(dec!(-1)), Money::from_decimal(dec!(0)), "USD", None);
        assert!(matches!(result, Err(LedgerError::InvalidEvent(_))));
    }

    #[test]
    fn rehydrates_event_id_on_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let p = PrincipalId::new();
        {
            let writer = LedgerWriter::open(&path).unwrap();
            writer
                .append(p, "api_call", Money::from_decimal(dec!(1)), Money::from_decimal(dec!(0.01)), "USD", None)
                .unwrap();
        }
        let writer2 = LedgerWriter::open(&path).unwrap();
        let e = writer2
            .append(p, "api_call", Money::from_decimal(dec!(1)), Money::from_decimal(dec!(0.01)), "USD", None)
            .unwrap();
        assert_eq!(e.event_id, 2);
    }

    #[test]
    fn tolerates_truncated_trailing_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let p = PrincipalId::new();
        {
            let writer = LedgerWriter::open(&path).unwrap();
            writer
                .append(p, "api_call", Money::from_decimal(dec!(1)), Money::from_decimal(dec!(0.01)), "USD", None)
                .unwrap();
        }
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"{\"event_id\": 2, \"truncated").unwrap();

        let writer2 = LedgerWriter::open(&path).unwrap();
        let e = writer2
            .append(p, "api_call", Money::from_decimal(dec!(1)), Money::from_decimal(dec!(0.01)), "USD", None)
            .unwrap();
        assert_eq!(e.event_id, 2);
    }
}
