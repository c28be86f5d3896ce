//! Test utilities for AskMe
//!
//! This module provides common test utilities including temporary
//! directories, throwaway session stores, and assertion helpers.

use crate::storage::ChatStore;
use tempfile::TempDir;

/// Create a temporary directory for testing
///
/// # Returns
///
/// Returns a TempDir that will be cleaned up when dropped
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Open a session store in a fresh temporary directory
///
/// # Returns
///
/// Returns the initialized store and the directory guard; keep the guard
/// alive for as long as the store is used
pub async fn temp_store() -> (ChatStore, TempDir) {
    let dir = temp_dir();
    let store = ChatStore::open(dir.path().join("store"))
        .await
        .expect("Failed to open test store");
    (store, dir)
}

/// Assert that an error contains the expected message
///
/// # Arguments
///
/// * `result` - Result to check
/// * `expected` - Expected error message substring
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T>(result: crate::error::Result<T>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AskmeError;

    #[test]
    fn test_temp_dir_creation() {
        let dir = temp_dir();
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_temp_store_is_empty() {
        let (store, dir) = temp_store().await;
        assert!(store.path().starts_with(dir.path()));
        assert!(store.current_sessions().is_empty());
    }

    #[test]
    fn test_assert_error_contains_success() {
        let result: crate::error::Result<()> =
            Err(AskmeError::Config("test error message".to_string()).into());
        assert_error_contains(result, "test error");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        assert_error_contains(Ok(()), "error");
    }

    #[test]
    #[should_panic(expected = "does not contain")]
    fn test_assert_error_contains_wrong_message() {
        let result: crate::error::Result<()> =
            Err(AskmeError::Store("different error".to_string()).into());
        assert_error_contains(result, "not present");
    }
}
