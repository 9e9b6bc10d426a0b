//! Sticky error latches
//!
//! A latch is `Quiet` or `Active`. Callers notify only when `raise` or `clear`
//! reports a transition, which keeps a persistent fault to one notification
//! and its recovery to one more.

use std::borrow::Borrow;
use std::collections::HashSet;
use std::hash::Hash;

/// Latch state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatchState {
    #[default]
    Quiet,
    Active,
}

/// Single sticky flag
#[derive(Debug, Clone, Default)]
pub struct Latch {
    state: LatchState,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate; true on the `Quiet` -> `Active` transition
    pub fn raise(&mut self) -> bool {
        let transitioned = self.state == LatchState::Quiet;
        self.state = LatchState::Active;
        transitioned
    }

    /// Deactivate; true on the `Active` -> `Quiet` transition
    pub fn clear(&mut self) -> bool {
        let transitioned = self.state == LatchState::Active;
        self.state = LatchState::Quiet;
        transitioned
    }

    /// Deactivate without reporting a recovery (daily reset)
    pub fn reset(&mut self) {
        self.state = LatchState::Quiet;
    }

    pub fn is_active(&self) -> bool {
        self.state == LatchState::Active
    }

    pub fn state(&self) -> LatchState {
        self.state
    }
}

/// One latch per key
#[derive(Debug, Clone)]
pub struct LatchSet<K> {
    active: HashSet<K>,
}

impl<K> Default for LatchSet<K> {
    fn default() -> Self {
        Self {
            active: HashSet::new(),
        }
    }
}

impl<K: Eq + Hash> LatchSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate `key`; true when it was quiet
    pub fn raise(&mut self, key: K) -> bool {
        self.active.insert(key)
    }

    /// Deactivate `key`; true when it was active
    pub fn clear<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.active.remove(key)
    }

    pub fn is_active<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.active.contains(key)
    }

    /// Deactivate every key without reporting recoveries
    pub fn reset(&mut self) {
        self.active.clear();
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.active.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latch_transitions() {
        let mut latch = Latch::new();
        assert!(!latch.clear());
        assert!(latch.raise());
        assert!(!latch.raise());
        assert!(latch.is_active());
        assert!(latch.clear());
        assert!(!latch.clear());

        latch.raise();
        latch.reset();
        assert_eq!(latch.state(), LatchState::Quiet);
    }

    #[test]
    fn test_latch_set_per_key() {
        let mut set: LatchSet<String> = LatchSet::new();
        assert!(set.raise("B".to_string()));
        assert!(!set.raise("B".to_string()));
        assert!(set.raise("1".to_string()));
        assert_eq!(set.active_count(), 2);

        assert!(set.clear("B"));
        assert!(!set.clear("B"));
        assert!(set.is_active("1"));

        set.reset();
        assert_eq!(set.active_count(), 0);
    }
}
