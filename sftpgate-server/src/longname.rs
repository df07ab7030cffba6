//! `ls -l`-style long names for directory listings.

use std::time::{Duration, SystemTime};

use chrono::{DateTime, Datelike, Timelike, Utc};
use sftpgate_vfs::FileInfo;

// Entries older than this show the year instead of the time, like ls(1).
const HALF_YEAR: Duration = Duration::from_secs(365 * 24 * 60 * 60 / 2);

/// Format one directory entry the way `ls -l` would.
///
/// Example from the openssh sftp server:
/// `crw-rw-rw-    1 root     wheel           0 Jul 31 20:52 ttyvd`
///
/// The VFS exposes no identity or link count, so nlink is always 1 and
/// owner/group are literally "user".
pub fn long_name(info: &FileInfo) -> String {
    long_name_at(info, SystemTime::now())
}

fn long_name_at(info: &FileInfo, now: SystemTime) -> String {
    let type_word = type_word(info.mode, info.is_dir);
    let modified: DateTime<Utc> = info.modified.into();

    let month = match modified.month() {
        1 => "Jan",
        2 => "Feb",
        3 => "Mar",
        4 => "Apr",
        5 => "May",
        6 => "Jun",
        7 => "Jul",
        8 => "Aug",
        9 => "Sep",
        10 => "Oct",
        11 => "Nov",
        _ => "Dec",
    };

    let is_old = now
        .duration_since(info.modified)
        .map(|age| age > HALF_YEAR)
        .unwrap_or(false);
    let year_or_time = if is_old {
        modified.year().to_string()
    } else {
        format!("{:02}:{:02}", modified.hour(), modified.minute())
    };

    format!(
        "{} {:>4} {:<8} {:<8} {:>8} {} {:>2} {:>5} {}",
        type_word,
        1,
        "user",
        "user",
        info.size,
        month,
        modified.day(),
        year_or_time,
        info.name,
    )
}

fn type_word(mode: u32, is_dir: bool) -> String {
    let mut word = String::with_capacity(10);
    word.push(if is_dir { 'd' } else { '-' });
    for shift in [6u32, 3, 0] {
        let bits = mode >> shift;
        word.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        word.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        word.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    word
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn info(name: &str, size: u64, mode: u32, is_dir: bool, mtime_secs: u64) -> FileInfo {
        FileInfo {
            name: name.into(),
            size,
            mode,
            modified: UNIX_EPOCH + Duration::from_secs(mtime_secs),
            is_dir,
        }
    }

    #[test]
    fn recent_file_shows_time() {
        // 2020-01-02T03:04:05Z
        let info = info("a.txt", 11, 0o644, false, 1_577_934_245);
        let now = UNIX_EPOCH + Duration::from_secs(1_577_934_245 + 3600);
        assert_eq!(
            long_name_at(&info, now),
            "-rw-r--r--    1 user     user           11 Jan  2 03:04 a.txt"
        );
    }

    #[test]
    fn old_file_shows_year() {
        let info = info("old.log", 4096, 0o600, false, 1_577_934_245);
        let now = UNIX_EPOCH + Duration::from_secs(1_577_934_245 + 365 * 24 * 3600);
        assert_eq!(
            long_name_at(&info, now),
            "-rw-------    1 user     user         4096 Jan  2  2020 old.log"
        );
    }

    #[test]
    fn directory_gets_type_char() {
        let info = info("src", 0, 0o755, true, 1_577_934_245);
        let now = UNIX_EPOCH + Duration::from_secs(1_577_934_245);
        let line = long_name_at(&info, now);
        assert!(line.starts_with("drwxr-xr-x"), "got: {line}");
        assert!(line.ends_with(" src"));
    }

    #[test]
    fn permission_triplets() {
        assert_eq!(type_word(0o777, false), "-rwxrwxrwx");
        assert_eq!(type_word(0o640, false), "-rw-r-----");
        assert_eq!(type_word(0o111, true), "d--x--x--x");
        assert_eq!(type_word(0, false), "----------");
    }
}
