use std::time::Duration;

use log::warn;

use crate::db::DatabaseError;

/// Attempts made for a status or flag write before giving up.
pub const RETRY_ATTEMPTS: u32 = 3;

/// Pause between attempts.
pub const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Runs `op`, retrying while it fails with SQLite BUSY/LOCKED.
///
/// Any other error returns immediately. After `attempts` contended tries the
/// last error is returned.
pub fn retry_on_contention<T, F>(
    label: &str,
    attempts: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, DatabaseError>
where
    F: FnMut() -> Result<T, DatabaseError>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Err(e) if e.is_contention() && attempt < attempts => {
                warn!(
                    "{}: database busy (attempt {}/{}), retrying in {:?}",
                    label, attempt, attempts, delay
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn busy() -> DatabaseError {
        DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ))
    }

    #[test]
    fn test_succeeds_after_contention() {
        let mut calls = 0;
        let result = retry_on_contention("flag", 3, Duration::from_millis(1), || {
            calls += 1;
            if calls < 3 {
                Err(busy())
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_gives_up_after_attempts() {
        let mut calls = 0;
        let result: Result<(), _> = retry_on_contention("flag", 3, Duration::from_millis(1), || {
            calls += 1;
            Err(busy())
        });
        assert!(result.unwrap_err().is_contention());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_other_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = retry_on_contention("flag", 3, Duration::from_millis(1), || {
            calls += 1;
            Err(DatabaseError::LockPoisoned)
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
