//! Fetch tickets ordering tree replacements across HTTP and socket sources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic ticket counter shared by everything that requests trees.
/// A ticket is taken when a request is issued, so a slow response can be
/// recognized as older than one issued after it.
#[derive(Debug, Clone)]
pub struct TicketSource {
    next: Arc<AtomicU64>,
}

impl Default for TicketSource {
    fn default() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl TicketSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_sequence() {
        let tickets = TicketSource::new();
        let other = tickets.clone();

        let first = tickets.next();
        let second = other.next();
        assert!(second > first);
        assert!(tickets.next() > second);
    }
}
