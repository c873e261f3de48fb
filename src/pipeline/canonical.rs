//! Canonical metadata values shared by every determinism-sensitive stage.
//!
//! The normalizer writes these values, the archiver refuses trees that do
//! not carry them, and the verifier reports against them. They live in one
//! place so the stages can never silently diverge.

use chrono::{DateTime, TimeZone, Utc};

/// Fixed modification time applied to every bundle entry: 2020-01-01T00:00:00Z.
pub const CANONICAL_MTIME: i64 = 1_577_836_800;

/// Mode for non-executable files.
pub const CANONICAL_FILE_MODE: u32 = 0o644;

/// Mode for executable files.
pub const CANONICAL_EXEC_MODE: u32 = 0o755;

/// Mode for directories.
pub const CANONICAL_DIR_MODE: u32 = 0o755;

/// Fixed deflate level used by the archiver.
pub const ARCHIVE_COMPRESSION_LEVEL: i64 = 6;

/// The canonical instant as a chrono UTC datetime.
pub fn canonical_datetime() -> DateTime<Utc> {
    // CANONICAL_MTIME is a valid unix timestamp, so the lookup cannot be
    // ambiguous or out of range.
    match Utc.timestamp_opt(CANONICAL_MTIME, 0) {
        chrono::LocalResult::Single(dt) => dt,
        _ => DateTime::UNIX_EPOCH,
    }
}

/// The canonical instant as a zip (MS-DOS) datetime.
///
/// Zip timestamps have two-second resolution and a 1980 epoch; the canonical
/// instant sits on an even second well inside the representable range.
pub fn canonical_zip_datetime() -> zip::DateTime {
    zip::DateTime::from_date_and_time(2020, 1, 1, 0, 0, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_instants_agree() {
        let dt = canonical_datetime();
        assert_eq!(dt.timestamp(), CANONICAL_MTIME);

        let zdt = canonical_zip_datetime();
        assert_eq!(zdt.year(), 2020);
        assert_eq!(zdt.month(), 1);
        assert_eq!(zdt.day(), 1);
        assert_eq!(zdt.hour(), 0);
        assert_eq!(zdt.minute(), 0);
        assert_eq!(zdt.second(), 0);
    }

    #[test]
    fn modes_are_the_two_permitted_values() {
        assert_ne!(CANONICAL_FILE_MODE, CANONICAL_EXEC_MODE);
        assert_eq!(CANONICAL_DIR_MODE, CANONICAL_EXEC_MODE);
    }
}
