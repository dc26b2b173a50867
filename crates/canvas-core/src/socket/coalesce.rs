//! Duplicate suppression for tree update pushes.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

const PRUNE_THRESHOLD: usize = 256;

/// Drops repeats of the same `(workspace, operation, path)` push inside a window.
///
/// A suppressed repeat does not extend the window.
#[derive(Debug)]
pub struct UpdateDeduper {
    window: Duration,
    last_seen: HashMap<String, Instant>,
}

impl UpdateDeduper {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: HashMap::new(),
        }
    }

    pub fn key(workspace_id: &str, operation: &str, path: Option<&str>) -> String {
        format!("{}:{}:{}", workspace_id, operation, path.unwrap_or(""))
    }

    /// Returns false when the update is a duplicate.
    pub fn admit(&mut self, key: String, now: Instant) -> bool {
        if let Some(last) = self.last_seen.get(&key) {
            if now.saturating_duration_since(*last) < self.window {
                return false;
            }
        }

        if self.last_seen.len() >= PRUNE_THRESHOLD {
            let window = self.window;
            self.last_seen
                .retain(|_, seen| now.saturating_duration_since(*seen) < window);
        }
        self.last_seen.insert(key, now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_inside_the_window_are_dropped() {
        let mut dedupe = UpdateDeduper::new(Duration::from_millis(500));
        let t0 = Instant::now();
        let key = UpdateDeduper::key("universe", "insert", Some("/a"));

        assert!(dedupe.admit(key.clone(), t0));
        assert!(!dedupe.admit(key.clone(), t0 + Duration::from_millis(200)));
        assert!(!dedupe.admit(key.clone(), t0 + Duration::from_millis(499)));
        assert!(dedupe.admit(key, t0 + Duration::from_millis(500)));
    }

    #[test]
    fn distinct_keys_pass() {
        let mut dedupe = UpdateDeduper::new(Duration::from_millis(500));
        let t0 = Instant::now();

        assert!(dedupe.admit(UpdateDeduper::key("universe", "insert", Some("/a")), t0));
        assert!(dedupe.admit(UpdateDeduper::key("universe", "insert", Some("/b")), t0));
        assert!(dedupe.admit(UpdateDeduper::key("universe", "remove", Some("/a")), t0));
        assert!(dedupe.admit(UpdateDeduper::key("other", "insert", Some("/a")), t0));
        assert_eq!(UpdateDeduper::key("w", "move", None), "w:move:");
    }

    #[test]
    fn suppressed_repeat_does_not_extend_the_window() {
        let mut dedupe = UpdateDeduper::new(Duration::from_millis(500));
        let t0 = Instant::now();
        let key = UpdateDeduper::key("w", "insert", Some("/x"));

        assert!(dedupe.admit(key.clone(), t0));
        assert!(!dedupe.admit(key.clone(), t0 + Duration::from_millis(400)));
        assert!(dedupe.admit(key, t0 + Duration::from_millis(600)));
    }
}
