//! Classroom Sync Library
//!
//! Mirrors course materials from a remote classroom service into a local,
//! deduplicated folder tree, with a searchable metadata store alongside.
//! Downloads run concurrently under a shared rate limit and report progress
//! while they run.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use constants::*;

    #[test]
    fn test_constants_accessible() {
        assert_eq!(DEFAULT_WORKER_COUNT, 4);
        assert_eq!(MAX_ATTEMPTS, 3);
        assert_eq!(ENV_ACCESS_TOKEN, "CLASSROOM_ACCESS_TOKEN");
        assert!(USER_AGENT.contains("Classroom-Sync"));
    }

    #[test]
    fn test_error_types() {
        let fetch_error = errors::FetchError::PermissionDenied {
            file_id: "f1".to_string(),
        };
        let app_error = AppError::Fetch(fetch_error);

        assert_eq!(app_error.category(), "fetch");
        assert!(!app_error.is_recoverable());
    }
}
