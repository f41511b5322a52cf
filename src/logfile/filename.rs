//! Timestamped log file names
//!
//! Names follow `YYYY-MM-DD_HH-MM-SS[_<n>].<ext>` in local time. Several files
//! started within the same second are told apart by the lowest free suffix.

use crate::error::{LogFileError, Result};
use chrono::{Local, TimeZone};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

/// Number of candidate names tried per timestamp (suffix `0..=65535`)
pub const MAX_CANDIDATES: u32 = 1 << 16;

/// Format `time` as a local `YYYY-MM-DD_HH-MM-SS` stamp
///
/// Returns `None` for times before the Unix epoch or past the calendar range.
pub fn local_timestamp(time: SystemTime) -> Option<String> {
    let since_epoch = time.duration_since(UNIX_EPOCH).ok()?;
    let secs = i64::try_from(since_epoch.as_secs()).ok()?;
    let local = Local.timestamp_opt(secs, 0).single()?;
    Some(local.format("%Y-%m-%d_%H-%M-%S").to_string())
}

/// Candidate name number `n`; `0` is the undecorated stamp
pub fn candidate(stamp: &str, n: u32, extension: &str) -> String {
    if n == 0 {
        format!("{}.{}", stamp, extension)
    } else {
        format!("{}_{}.{}", stamp, n, extension)
    }
}

/// First path under `dir` for `time` that does not exist yet
pub fn next_available(dir: &Path, extension: &str, time: SystemTime) -> Result<PathBuf> {
    let stamp = local_timestamp(time).ok_or_else(|| {
        error!("error formatting log file name");
        LogFileError::InvalidTimestamp
    })?;
    first_free(dir, &stamp, extension, MAX_CANDIDATES)
}

fn first_free(dir: &Path, stamp: &str, extension: &str, limit: u32) -> Result<PathBuf> {
    for n in 0..limit {
        let path = dir.join(candidate(stamp, n, extension));
        if !path.exists() {
            return Ok(path);
        }
    }

    error!(dir = %dir.display(), "unable to create a log file without overriding another file");
    Err(LogFileError::NameExhausted { dir: dir.to_path_buf() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    #[test]
    fn test_timestamp_shape() {
        let stamp = local_timestamp(UNIX_EPOCH + Duration::from_secs(1_700_000_000)).unwrap();
        assert_eq!(stamp.len(), "YYYY-MM-DD_HH-MM-SS".len());
        let bytes = stamp.as_bytes();
        assert_eq!(bytes[4], b'-');
        assert_eq!(bytes[10], b'_');
        assert_eq!(bytes[13], b'-');
        assert!(stamp.starts_with("2023-11-1"));
    }

    #[test]
    fn test_timestamp_is_local_wall_clock() {
        let time = UNIX_EPOCH + Duration::from_secs(1_700_000_123);
        let local = chrono::DateTime::<Local>::from(time);
        assert_eq!(
            local_timestamp(time).unwrap(),
            local.format("%Y-%m-%d_%H-%M-%S").to_string()
        );
    }

    #[test]
    fn test_timestamp_out_of_range() {
        let before_epoch = UNIX_EPOCH - Duration::from_secs(1);
        assert_eq!(local_timestamp(before_epoch), None);

        let far_future = UNIX_EPOCH + Duration::from_secs(1 << 45);
        assert_eq!(local_timestamp(far_future), None);
    }

    #[test]
    fn test_candidates() {
        assert_eq!(candidate("2024-01-02_03-04-05", 0, "bin"), "2024-01-02_03-04-05.bin");
        assert_eq!(candidate("2024-01-02_03-04-05", 7, "bin"), "2024-01-02_03-04-05_7.bin");
    }

    #[test]
    fn test_lowest_free_suffix_wins() {
        let dir = tempfile::tempdir().unwrap();
        let stamp = "2024-01-02_03-04-05";
        File::create(dir.path().join(candidate(stamp, 0, "tlog"))).unwrap();
        File::create(dir.path().join(candidate(stamp, 2, "tlog"))).unwrap();

        let path = first_free(dir.path(), stamp, "tlog", MAX_CANDIDATES).unwrap();
        assert_eq!(path, dir.path().join("2024-01-02_03-04-05_1.tlog"));
    }

    #[test]
    fn test_other_extension_does_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let stamp = "2024-01-02_03-04-05";
        File::create(dir.path().join(candidate(stamp, 0, "bin"))).unwrap();

        let path = first_free(dir.path(), stamp, "tlog", MAX_CANDIDATES).unwrap();
        assert_eq!(path, dir.path().join("2024-01-02_03-04-05.tlog"));
    }

    #[test]
    fn test_exhausted_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let stamp = "2024-01-02_03-04-05";
        for n in 0..4 {
            File::create(dir.path().join(candidate(stamp, n, "bin"))).unwrap();
        }

        let err = first_free(dir.path(), stamp, "bin", 4).unwrap_err();
        assert!(matches!(err, LogFileError::NameExhausted { .. }));
    }
}
