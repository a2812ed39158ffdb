//! Identity ⇄ conversation subscription index.
//!
//! Subscriptions are identity-scoped: they survive disconnects and are only
//! removed by an explicit unsubscribe. The forward (`identity → targets`) and
//! reverse (`target → identities`) maps are mutated together under a single
//! write lock; readers see either both halves of a change or neither.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use parley_core::{ConversationRef, IdentityId, PanelId, SessionId};

#[derive(Default)]
struct IndexState {
    forward: HashMap<IdentityId, HashSet<ConversationRef>>,
    reverse: HashMap<ConversationRef, HashSet<IdentityId>>,
}

impl IndexState {
    fn insert(&mut self, identity: &IdentityId, target: ConversationRef) -> bool {
        let added = self
            .forward
            .entry(identity.clone())
            .or_default()
            .insert(target.clone());
        if added {
            let _ = self
                .reverse
                .entry(target)
                .or_default()
                .insert(identity.clone());
        }
        added
    }

    fn remove(&mut self, identity: &IdentityId, target: &ConversationRef) -> bool {
        let Some(targets) = self.forward.get_mut(identity) else {
            return false;
        };
        if !targets.remove(target) {
            return false;
        }
        if targets.is_empty() {
            let _ = self.forward.remove(identity);
        }
        if let Some(identities) = self.reverse.get_mut(target) {
            let _ = identities.remove(identity);
            if identities.is_empty() {
                let _ = self.reverse.remove(target);
            }
        }
        true
    }

    #[cfg(debug_assertions)]
    fn assert_consistent(&self) {
        let forward: usize = self.forward.values().map(HashSet::len).sum();
        let reverse: usize = self.reverse.values().map(HashSet::len).sum();
        debug_assert_eq!(forward, reverse, "subscription maps diverged");
        for (identity, targets) in &self.forward {
            for target in targets {
                debug_assert!(
                    self.reverse.get(target).is_some_and(|ids| ids.contains(identity)),
                    "{identity} → {target} missing from reverse map"
                );
            }
        }
    }
}

/// Which identities want live events for which conversations.
#[derive(Default)]
pub struct SubscriptionIndex {
    state: RwLock<IndexState>,
}

impl SubscriptionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `identity` to `target`. Returns `false` if already subscribed.
    ///
    /// Targets are not validated; an unknown conversation simply never
    /// resolves until it exists.
    pub fn subscribe(&self, identity: &IdentityId, target: ConversationRef) -> bool {
        let mut state = self.state.write();
        let added = state.insert(identity, target);
        #[cfg(debug_assertions)]
        state.assert_consistent();
        added
    }

    /// Subscribe to every session in `snapshot`. Returns how many were new.
    ///
    /// This is a one-time expansion: sessions created later are not included.
    pub fn subscribe_wildcard_session(
        &self,
        identity: &IdentityId,
        snapshot: impl IntoIterator<Item = SessionId>,
    ) -> usize {
        self.subscribe_all(identity, snapshot.into_iter().map(ConversationRef::Session))
    }

    /// Subscribe to every panel in `snapshot`. Returns how many were new.
    ///
    /// This is a one-time expansion: panels created later are not included.
    pub fn subscribe_wildcard_panel(
        &self,
        identity: &IdentityId,
        snapshot: impl IntoIterator<Item = PanelId>,
    ) -> usize {
        self.subscribe_all(identity, snapshot.into_iter().map(ConversationRef::Panel))
    }

    fn subscribe_all(
        &self,
        identity: &IdentityId,
        targets: impl Iterator<Item = ConversationRef>,
    ) -> usize {
        let mut state = self.state.write();
        let added = targets.filter(|t| state.insert(identity, t.clone())).count();
        #[cfg(debug_assertions)]
        state.assert_consistent();
        added
    }

    /// Remove a subscription. Returns `false` (and does nothing) if absent.
    pub fn unsubscribe(&self, identity: &IdentityId, target: &ConversationRef) -> bool {
        let mut state = self.state.write();
        let removed = state.remove(identity, target);
        #[cfg(debug_assertions)]
        state.assert_consistent();
        removed
    }

    /// Identities subscribed to `target`.
    pub fn subscribers_of(&self, target: &ConversationRef) -> HashSet<IdentityId> {
        self.state
            .read()
            .reverse
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    /// Targets `identity` is subscribed to.
    pub fn subscriptions_of(&self, identity: &IdentityId) -> HashSet<ConversationRef> {
        self.state
            .read()
            .forward
            .get(identity)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether the pair exists.
    pub fn is_subscribed(&self, identity: &IdentityId, target: &ConversationRef) -> bool {
        self.state
            .read()
            .forward
            .get(identity)
            .is_some_and(|targets| targets.contains(target))
    }

    /// Total (identity, target) pairs.
    pub fn len(&self) -> usize {
        self.state.read().forward.values().map(HashSet::len).sum()
    }

    /// Whether no subscriptions exist.
    pub fn is_empty(&self) -> bool {
        self.state.read().forward.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;

    fn idn(s: &str) -> IdentityId {
        IdentityId::from_raw(s)
    }

    fn sess(s: &str) -> ConversationRef {
        ConversationRef::Session(SessionId::from_raw(s))
    }

    fn panel(s: &str) -> ConversationRef {
        ConversationRef::Panel(PanelId::from_raw(s))
    }

    #[test]
    fn subscribe_is_idempotent() {
        let index = SubscriptionIndex::new();
        assert!(index.subscribe(&idn("a"), sess("s1")));
        assert!(!index.subscribe(&idn("a"), sess("s1")));
        assert_eq!(index.len(), 1);
        assert_eq!(index.subscribers_of(&sess("s1")), HashSet::from([idn("a")]));
    }

    #[test]
    fn unsubscribe_never_subscribed_is_noop() {
        let index = SubscriptionIndex::new();
        assert!(!index.unsubscribe(&idn("a"), &sess("s1")));
        assert!(index.is_empty());

        let _ = index.subscribe(&idn("b"), sess("s1"));
        assert!(!index.unsubscribe(&idn("a"), &sess("s1")));
        assert_eq!(index.subscribers_of(&sess("s1")), HashSet::from([idn("b")]));
    }

    #[test]
    fn unsubscribe_prunes_empty_entries() {
        let index = SubscriptionIndex::new();
        let _ = index.subscribe(&idn("a"), panel("p1"));
        assert!(index.unsubscribe(&idn("a"), &panel("p1")));
        assert!(index.subscribers_of(&panel("p1")).is_empty());
        assert!(index.subscriptions_of(&idn("a")).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn sessions_and_panels_with_same_id_are_distinct() {
        let index = SubscriptionIndex::new();
        let _ = index.subscribe(&idn("a"), sess("x"));
        assert!(index.is_subscribed(&idn("a"), &sess("x")));
        assert!(!index.is_subscribed(&idn("a"), &panel("x")));
    }

    #[test]
    fn wildcard_expands_snapshot_once() {
        let index = SubscriptionIndex::new();
        let snapshot = vec![SessionId::from_raw("s1"), SessionId::from_raw("s2")];
        assert_eq!(index.subscribe_wildcard_session(&idn("i"), snapshot.clone()), 2);
        assert_eq!(index.subscribe_wildcard_session(&idn("i"), snapshot), 0);
        assert_eq!(
            index.subscriptions_of(&idn("i")),
            HashSet::from([sess("s1"), sess("s2")])
        );
    }

    #[test]
    fn wildcard_panel_expansion() {
        let index = SubscriptionIndex::new();
        let added = index.subscribe_wildcard_panel(&idn("i"), [PanelId::from_raw("p1")]);
        assert_eq!(added, 1);
        assert!(index.is_subscribed(&idn("i"), &panel("p1")));
    }

    #[test]
    fn unknown_targets_accepted() {
        let index = SubscriptionIndex::new();
        assert!(index.subscribe(&idn("a"), sess("does-not-exist-yet")));
    }

    #[test]
    fn concurrent_mutation_keeps_maps_in_lockstep() {
        let index = Arc::new(SubscriptionIndex::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    let me = idn(&format!("user{t}"));
                    for n in 0..300 {
                        let target = sess(&format!("s{}", n % 10));
                        let _ = index.subscribe(&me, target.clone());
                        if n % 3 == 0 {
                            let _ = index.unsubscribe(&me, &target);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let forward: usize = (0..8)
            .map(|t| index.subscriptions_of(&idn(&format!("user{t}"))).len())
            .sum();
        let reverse: usize = (0..10)
            .map(|n| index.subscribers_of(&sess(&format!("s{n}"))).len())
            .sum();
        assert_eq!(forward, reverse);
        assert_eq!(forward, index.len());
    }

    proptest! {
        #[test]
        fn subscribe_unsubscribe_roundtrip(
            existing in proptest::collection::vec((0u8..5, 0u8..5), 0..20),
            who in 0u8..6,
            what in 0u8..6,
        ) {
            let index = SubscriptionIndex::new();
            for (i, t) in &existing {
                let _ = index.subscribe(&idn(&format!("u{i}")), sess(&format!("s{t}")));
            }
            let me = idn(&format!("u{who}"));
            let target = sess(&format!("s{what}"));
            let before_subs = index.subscribers_of(&target);
            let before_targets = index.subscriptions_of(&me);
            let was_subscribed = index.is_subscribed(&me, &target);

            let _ = index.subscribe(&me, target.clone());
            if !was_subscribed {
                let _ = index.unsubscribe(&me, &target);
            }

            prop_assert_eq!(index.subscribers_of(&target), before_subs);
            prop_assert_eq!(index.subscriptions_of(&me), before_targets);
        }
    }
}
