//! Entity store: base values plus an optimistic overlay per key.
//!
//! The store keeps two layers per post:
//! - the *base* value, the last server-confirmed state (absent when the
//!   post has not been fetched or was deleted), and
//! - at most one *pending overlay*, the value proposed by an in-flight
//!   transaction (a tombstone for a pending delete).
//!
//! The effective value a reader sees is the overlay when present, else
//! the base. Mutating operations report the affected keys as a
//! [`ChangeSet`] that the caller routes to the live query engine.
//! Compound operations go through a single locked batch so no reader
//! observes a partially applied transaction. The store performs no I/O.

use crate::error::{CoreError, CoreResult};
use mirrordb_protocol::{Post, PostId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

/// A pending, uncommitted value layered over a key's base value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overlay {
    /// The key's proposed new value.
    Value(Post),
    /// The key is pending deletion.
    Tombstone,
}

impl Overlay {
    /// Returns the post this overlay exposes to readers, if any.
    #[must_use]
    pub fn effective(&self) -> Option<&Post> {
        match self {
            Overlay::Value(post) => Some(post),
            Overlay::Tombstone => None,
        }
    }
}

/// The set of keys affected by one store-mutation step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet(BTreeSet<PostId>);

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a change set containing a single key.
    #[must_use]
    pub fn single(id: PostId) -> Self {
        let mut set = BTreeSet::new();
        set.insert(id);
        Self(set)
    }

    /// Adds a key.
    pub fn insert(&mut self, id: PostId) {
        self.0.insert(id);
    }

    /// Merges another change set into this one.
    pub fn merge(&mut self, other: ChangeSet) {
        self.0.extend(other.0);
    }

    /// Returns true if the key is in the set.
    #[must_use]
    pub fn contains(&self, id: PostId) -> bool {
        self.0.contains(&id)
    }

    /// Returns true if no key is affected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of affected keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the affected keys.
    pub fn iter(&self) -> impl Iterator<Item = PostId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<PostId> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = PostId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One mutation step against the store, applied as part of a batch.
#[derive(Debug, Clone)]
pub(crate) enum StoreOp {
    /// Install a pending overlay (fails if one exists).
    ApplyOverlay(PostId, Overlay),
    /// Promote the overlay to base (tombstones remove the key).
    CommitOverlay(PostId),
    /// Drop the overlay, reverting readers to the base value.
    DiscardOverlay(PostId),
    /// Set (or remove, with `None`) the base value.
    ReplaceBase(PostId, Option<Post>),
}

impl StoreOp {
    fn key(&self) -> PostId {
        match self {
            StoreOp::ApplyOverlay(id, _)
            | StoreOp::CommitOverlay(id)
            | StoreOp::DiscardOverlay(id)
            | StoreOp::ReplaceBase(id, _) => *id,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Slot {
    base: Option<Post>,
    overlay: Option<Overlay>,
}

impl Slot {
    fn effective(&self) -> Option<&Post> {
        match &self.overlay {
            Some(overlay) => overlay.effective(),
            None => self.base.as_ref(),
        }
    }

    fn is_vacant(&self) -> bool {
        self.base.is_none() && self.overlay.is_none()
    }
}

/// Keyed mapping from post identifier to its layered value.
///
/// All mutation and read paths go through this contract; no caller
/// holds a reference into a slot's backing value.
#[derive(Debug, Default)]
pub struct EntityStore {
    slots: RwLock<BTreeMap<PostId, Slot>>,
}

impl EntityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the effective value for a key (overlay-aware).
    #[must_use]
    pub fn get(&self, id: PostId) -> Option<Post> {
        self.slots.read().get(&id).and_then(|s| s.effective().cloned())
    }

    /// Returns a snapshot of every effective value.
    ///
    /// The snapshot is keyed-order; result ordering is the query's
    /// concern, not the store's.
    #[must_use]
    pub fn list_effective(&self) -> Vec<Post> {
        self.slots
            .read()
            .values()
            .filter_map(|s| s.effective().cloned())
            .collect()
    }

    /// Returns true if the key has a pending overlay.
    #[must_use]
    pub fn has_overlay(&self, id: PostId) -> bool {
        self.slots
            .read()
            .get(&id)
            .is_some_and(|s| s.overlay.is_some())
    }

    /// Returns the number of pending overlays.
    #[must_use]
    pub fn overlay_count(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|s| s.overlay.is_some())
            .count()
    }

    /// Returns the number of keys with an effective value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|s| s.effective().is_some())
            .count()
    }

    /// Returns true if no key has an effective value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Installs the pending overlay for a key.
    ///
    /// Fails with [`CoreError::Conflict`] if an overlay already exists;
    /// mutations on the same key are serialized at the transaction
    /// level.
    pub fn apply_overlay(&self, id: PostId, overlay: Overlay) -> CoreResult<ChangeSet> {
        self.apply_batch(vec![StoreOp::ApplyOverlay(id, overlay)])
    }

    /// Promotes the overlay to base and clears it.
    ///
    /// A tombstone overlay removes the key entirely. Fails if the key
    /// has no pending overlay.
    pub fn commit_overlay(&self, id: PostId) -> CoreResult<ChangeSet> {
        self.apply_batch(vec![StoreOp::CommitOverlay(id)])
    }

    /// Clears the overlay, reverting readers to the base value.
    ///
    /// Infallible, and a no-op when the key has no overlay, so
    /// rollback is idempotent; the key is still reported as possibly
    /// changed.
    pub fn discard_overlay(&self, id: PostId) -> ChangeSet {
        let mut slots = self.slots.write();
        if let Some(slot) = slots.get_mut(&id) {
            slot.overlay = None;
            if slot.is_vacant() {
                slots.remove(&id);
            }
        }
        ChangeSet::single(id)
    }

    /// Sets the base value from the server's canonical response.
    ///
    /// `None` removes the base (the server no longer knows the key).
    /// A pending overlay for the key is preserved and keeps masking
    /// the base until its transaction resolves.
    pub fn replace_base(&self, id: PostId, value: Option<Post>) -> ChangeSet {
        let mut slots = self.slots.write();
        let slot = slots.entry(id).or_default();
        slot.base = value;
        if slot.is_vacant() {
            slots.remove(&id);
        }
        ChangeSet::single(id)
    }

    /// Rehydrates every base value from a full server listing.
    ///
    /// Bases absent from `posts` are removed; overlays are preserved.
    /// Returns the keys whose base actually changed.
    pub fn replace_all_bases(&self, posts: Vec<Post>) -> ChangeSet {
        let incoming: BTreeMap<PostId, Post> = posts.into_iter().map(|p| (p.id, p)).collect();
        let mut changes = ChangeSet::new();
        let mut slots = self.slots.write();

        // Drop bases the server no longer reports.
        slots.retain(|id, slot| {
            if slot.base.is_some() && !incoming.contains_key(id) {
                slot.base = None;
                changes.insert(*id);
            }
            !slot.is_vacant()
        });

        for (id, post) in incoming {
            let slot = slots.entry(id).or_default();
            if slot.base.as_ref() != Some(&post) {
                slot.base = Some(post);
                changes.insert(id);
            }
        }

        changes
    }

    /// Applies a sequence of operations under one lock acquisition.
    ///
    /// The batch is validated before anything is applied: if any
    /// `ApplyOverlay` targets a key that already carries an overlay
    /// (including one installed earlier in the same batch), or a
    /// `CommitOverlay` targets a key without one, the whole batch is
    /// rejected and the store is untouched.
    pub(crate) fn apply_batch(&self, ops: Vec<StoreOp>) -> CoreResult<ChangeSet> {
        let mut slots = self.slots.write();

        // Validation pass: all-or-nothing.
        let mut pending: BTreeSet<PostId> = slots
            .iter()
            .filter(|(_, s)| s.overlay.is_some())
            .map(|(id, _)| *id)
            .collect();
        for op in &ops {
            match op {
                StoreOp::ApplyOverlay(id, _) => {
                    if !pending.insert(*id) {
                        return Err(CoreError::Conflict { id: *id });
                    }
                }
                StoreOp::CommitOverlay(id) => {
                    if !pending.remove(id) {
                        return Err(CoreError::invalid_operation(format!(
                            "no pending overlay to commit for {id}"
                        )));
                    }
                }
                StoreOp::DiscardOverlay(id) => {
                    pending.remove(id);
                }
                StoreOp::ReplaceBase(..) => {}
            }
        }

        // Apply pass: infallible.
        let mut changes = ChangeSet::new();
        for op in ops {
            changes.insert(op.key());
            match op {
                StoreOp::ApplyOverlay(id, overlay) => {
                    slots.entry(id).or_default().overlay = Some(overlay);
                }
                StoreOp::CommitOverlay(id) => {
                    if let Some(slot) = slots.get_mut(&id) {
                        slot.base = match slot.overlay.take() {
                            Some(Overlay::Value(post)) => Some(post),
                            Some(Overlay::Tombstone) | None => None,
                        };
                    }
                }
                StoreOp::DiscardOverlay(id) => {
                    if let Some(slot) = slots.get_mut(&id) {
                        slot.overlay = None;
                    }
                }
                StoreOp::ReplaceBase(id, value) => {
                    slots.entry(id).or_default().base = value;
                }
            }
        }

        // Remove fully vacant slots.
        slots.retain(|_, slot| !slot.is_vacant());

        Ok(changes)
    }
}
