//! ID generation utilities for Replyr
//!
//! Provides functions for generating unique identifiers for records and run tasks.

use chrono::Utc;
use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Generate a unique prefixed ID
///
/// Format: `{prefix}-{timestamp_ms}-{random_hex}`
/// Example: `cmt-1738300800123-a1b2c3d4`
pub fn generate_id(prefix: &str) -> String {
    let random: u32 = rand::rng().random();
    format!("{}-{}-{:08x}", prefix, now_ms(), random)
}

/// Generate a comment ID
pub fn generate_comment_id() -> String {
    generate_id("cmt")
}

/// Generate a response ID
pub fn generate_response_id() -> String {
    generate_id("rsp")
}

/// Generate a run task ID (the task handle returned to callers)
pub fn generate_task_id() -> String {
    generate_id("task")
}

/// Generate a lease holder token for one pipeline invocation
pub fn generate_lease_holder() -> String {
    generate_id("run")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_generate_id_format() {
        let id = generate_id("cmt");
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "cmt");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_id_uniqueness() {
        let id1 = generate_comment_id();
        let id2 = generate_comment_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_prefixes() {
        assert!(generate_response_id().starts_with("rsp-"));
        assert!(generate_task_id().starts_with("task-"));
        assert!(generate_lease_holder().starts_with("run-"));
    }
}
