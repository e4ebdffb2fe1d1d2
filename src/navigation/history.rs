//! Per-identity navigation history
//!
//! This is the only record of where a user has been. It lives in a service
//! for the lifetime of the process, so it outlives every screen and surface.

use super::Identity;
use super::graph::Destination;
use crate::services::ServiceKey;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Directory key under which the host expects the history service
pub const HISTORY: ServiceKey<NavigationHistory> = ServiceKey::new("navigation.history");

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub destination: Destination,

    /// Process-wide visit order
    pub order: u64,

    pub visited_at: DateTime<Utc>,
}

pub struct NavigationHistory {
    stacks: Mutex<HashMap<Identity, Vec<HistoryEntry>>>,
    next_order: AtomicU64,
    capacity: Option<usize>,
}

impl NavigationHistory {
    /// Unbounded history
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// History keeping at most `capacity` entries per identity, oldest dropped first
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            stacks: Mutex::new(HashMap::new()),
            next_order: AtomicU64::new(0),
            capacity: capacity.filter(|c| *c > 0),
        }
    }

    /// Record a visit; returns its order index
    pub fn push(&self, identity: &Identity, destination: Destination) -> u64 {
        let order = self.next_order.fetch_add(1, Ordering::Relaxed);
        let mut stacks = self.stacks.lock().unwrap_or_else(PoisonError::into_inner);
        let stack = stacks.entry(identity.clone()).or_default();

        log::debug!("History[{}] push #{} {}", identity, order, destination);
        stack.push(HistoryEntry {
            destination,
            order,
            visited_at: Utc::now(),
        });

        if let Some(capacity) = self.capacity {
            if stack.len() > capacity {
                let excess = stack.len() - capacity;
                stack.drain(..excess);
            }
        }

        order
    }

    pub fn current(&self, identity: &Identity) -> Option<Destination> {
        self.stacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .and_then(|stack| stack.last())
            .map(|entry| entry.destination.clone())
    }

    /// Remove and return the most recent destination
    pub fn pop(&self, identity: &Identity) -> Option<Destination> {
        let mut stacks = self.stacks.lock().unwrap_or_else(PoisonError::into_inner);
        let stack = stacks.get_mut(identity)?;
        let entry = stack.pop()?;
        if stack.is_empty() {
            stacks.remove(identity);
        }

        log::debug!("History[{}] pop #{} {}", identity, entry.order, entry.destination);
        Some(entry.destination)
    }

    /// Entries oldest first
    pub fn entries(&self, identity: &Identity) -> Vec<HistoryEntry> {
        self.stacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
            .unwrap_or_default()
    }

    pub fn depth(&self, identity: &Identity) -> usize {
        self.stacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .map_or(0, Vec::len)
    }

    /// Forget an identity's history; returns how many entries were dropped
    pub fn clear(&self, identity: &Identity) -> usize {
        self.stacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identity)
            .map_or(0, |stack| stack.len())
    }

    pub fn identities(&self) -> Vec<Identity> {
        let mut identities: Vec<Identity> = self
            .stacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        identities.sort();
        identities
    }
}

impl Default for NavigationHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::NavParams;

    fn dest(route: &str) -> Destination {
        Destination::new(route, NavParams::new())
    }

    #[test]
    fn test_push_then_current() {
        let history = NavigationHistory::new();
        let alice = Identity::new("alice");

        for route in ["home", "feed", "settings"] {
            history.push(&alice, dest(route));
            assert_eq!(history.current(&alice), Some(dest(route)));
        }
    }

    #[test]
    fn test_pop_order_and_empty() {
        let history = NavigationHistory::new();
        let alice = Identity::new("alice");
        history.push(&alice, dest("home"));
        history.push(&alice, dest("feed"));

        assert_eq!(history.pop(&alice), Some(dest("feed")));
        assert_eq!(history.current(&alice), Some(dest("home")));
        assert_eq!(history.pop(&alice), Some(dest("home")));
        assert_eq!(history.pop(&alice), None);
        assert_eq!(history.current(&alice), None);
    }

    #[test]
    fn test_identities_are_isolated() {
        let history = NavigationHistory::new();
        let alice = Identity::new("alice");
        let bob = Identity::new("bob");

        history.push(&alice, dest("feed"));
        history.push(&bob, dest("settings"));
        history.pop(&bob);

        assert_eq!(history.current(&alice), Some(dest("feed")));
        assert_eq!(history.current(&bob), None);
        assert_eq!(history.identities(), vec![alice]);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let history = NavigationHistory::with_capacity(Some(2));
        let alice = Identity::new("alice");
        history.push(&alice, dest("a"));
        history.push(&alice, dest("b"));
        history.push(&alice, dest("c"));

        let routes: Vec<String> = history
            .entries(&alice)
            .into_iter()
            .map(|entry| entry.destination.route().to_string())
            .collect();
        assert_eq!(routes, vec!["b", "c"]);
    }

    #[test]
    fn test_order_is_monotonic_across_identities() {
        let history = NavigationHistory::new();
        let a = history.push(&Identity::new("alice"), dest("home"));
        let b = history.push(&Identity::new("bob"), dest("home"));
        let c = history.push(&Identity::new("alice"), dest("feed"));
        assert!(a < b && b < c);
    }

    #[test]
    fn test_clear() {
        let history = NavigationHistory::new();
        let alice = Identity::new("alice");
        history.push(&alice, dest("home"));
        history.push(&alice, dest("feed"));

        assert_eq!(history.depth(&alice), 2);
        assert_eq!(history.clear(&alice), 2);
        assert_eq!(history.depth(&alice), 0);
    }
}
