use crate::token::GroupToken;
use std::collections::VecDeque;

/// Newest-first ordering of one column's live groups.
///
/// Insertion always happens first; the cap is then enforced by popping from
/// the tail, so the live set is always the `max_groups` most recently created
/// tokens in creation order.
#[derive(Debug, Clone)]
pub struct GroupRegistry {
    max_groups: usize,
    order: VecDeque<GroupToken>,
}

impl GroupRegistry {
    pub fn new(max_groups: usize) -> Self {
        Self {
            max_groups,
            order: VecDeque::new(),
        }
    }

    pub fn max_groups(&self) -> usize {
        self.max_groups
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn newest_first(&self) -> impl DoubleEndedIterator<Item = GroupToken> + '_ {
        self.order.iter().copied()
    }

    /// Inserts `token` at the head and returns the tokens evicted to honor
    /// the cap, oldest first. Callers guarantee `token` is not already live.
    pub fn insert(&mut self, token: GroupToken) -> Vec<GroupToken> {
        self.order.push_front(token);
        self.enforce_cap()
    }

    /// Removes `token` if live. Returns whether anything was removed.
    pub fn remove(&mut self, token: GroupToken) -> bool {
        match self.order.iter().position(|live| *live == token) {
            Some(idx) => self.order.remove(idx).is_some(),
            None => false,
        }
    }

    /// Changes the cap; any excess is evicted immediately, oldest first.
    pub fn set_max_groups(&mut self, max_groups: usize) -> Vec<GroupToken> {
        self.max_groups = max_groups;
        self.enforce_cap()
    }

    fn enforce_cap(&mut self) -> Vec<GroupToken> {
        let mut evicted = Vec::new();
        while self.order.len() > self.max_groups {
            if let Some(oldest) = self.order.pop_back() {
                evicted.push(oldest);
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(value: u128) -> GroupToken {
        GroupToken::from_u128(value)
    }

    fn order(registry: &GroupRegistry) -> Vec<u128> {
        registry.newest_first().map(GroupToken::as_u128).collect()
    }

    #[test]
    fn third_insert_evicts_oldest_at_cap_two() {
        let mut registry = GroupRegistry::new(2);
        assert!(registry.insert(token(0xa)).is_empty());
        assert!(registry.insert(token(0xb)).is_empty());
        let evicted = registry.insert(token(0xc));
        assert_eq!(evicted, vec![token(0xa)]);
        assert_eq!(order(&registry), vec![0xc, 0xb]);
    }

    #[test]
    fn live_set_is_most_recent_tokens_after_every_insert() {
        let cap = 4;
        let mut registry = GroupRegistry::new(cap);
        for value in 1..=20u128 {
            registry.insert(token(value));
            assert!(registry.len() <= cap);
            let expected: Vec<u128> = (value.saturating_sub(cap as u128 - 1).max(1)..=value)
                .rev()
                .collect();
            assert_eq!(order(&registry), expected);
        }
    }

    #[test]
    fn lowering_cap_truncates_from_tail() {
        let mut registry = GroupRegistry::new(5);
        for value in 1..=5 {
            registry.insert(token(value));
        }
        let evicted = registry.set_max_groups(2);
        assert_eq!(evicted, vec![token(1), token(2), token(3)]);
        assert_eq!(order(&registry), vec![5, 4]);
    }

    #[test]
    fn remove_is_noop_for_absent_token() {
        let mut registry = GroupRegistry::new(3);
        registry.insert(token(1));
        registry.insert(token(2));
        assert!(registry.remove(token(1)));
        assert!(!registry.remove(token(1)));
        assert!(!registry.remove(token(9)));
        assert_eq!(order(&registry), vec![2]);
    }
}
