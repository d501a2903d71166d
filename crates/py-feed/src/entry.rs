//! # Optimistic entries
//!
//! Each loaded item is kept as the last authoritative copy plus the deltas
//! still awaiting remote confirmation. The visible item is the authoritative
//! copy with the pending deltas applied in order.

use py_core::{Comment, CommentId, Item, UserId};

/// A local change applied before the remote write confirms it.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingDelta {
    /// `liked` is the membership the user asked for.
    LikeToggled { user: UserId, liked: bool },
    CommentAdded(Comment),
    CommentRemoved(CommentId),
}

impl PendingDelta {
    fn apply_to(&self, item: &mut Item) {
        match self {
            PendingDelta::LikeToggled { user, liked } => item.set_liked(user, *liked),
            PendingDelta::CommentAdded(comment) => {
                if item.comment(&comment.id).is_none() {
                    item.comments.push(comment.clone());
                }
            }
            PendingDelta::CommentRemoved(id) => item.comments.retain(|c| &c.id != id),
        }
    }
}

/// Handle to one pending delta inside its entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeltaId(u64);

#[derive(Debug, Clone)]
pub struct FeedEntry {
    authoritative: Item,
    pending: Vec<(DeltaId, PendingDelta)>,
    visible: Item,
    next_delta: u64,
}

impl FeedEntry {
    pub fn new(item: Item) -> Self {
        Self {
            visible: item.clone(),
            authoritative: item,
            pending: Vec::new(),
            next_delta: 0,
        }
    }

    pub fn visible(&self) -> &Item {
        &self.visible
    }

    pub fn authoritative(&self) -> &Item {
        &self.authoritative
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn push(&mut self, delta: PendingDelta) -> DeltaId {
        let id = DeltaId(self.next_delta);
        self.next_delta += 1;
        delta.apply_to(&mut self.visible);
        self.pending.push((id, delta));
        id
    }

    /// Folds a confirmed delta into the authoritative copy.
    pub fn confirm(&mut self, id: DeltaId) {
        if let Some(delta) = self.take(id) {
            delta.apply_to(&mut self.authoritative);
            self.rederive();
        }
    }

    /// Like `confirm`, but trusts the membership the store reported.
    pub fn confirm_like(&mut self, id: DeltaId, liked: bool) {
        if let Some(PendingDelta::LikeToggled { user, .. }) = self.take(id) {
            self.authoritative.set_liked(&user, liked);
            self.rederive();
        }
    }

    /// Drops a failed delta; the visible item is re-derived without it.
    pub fn discard(&mut self, id: DeltaId) {
        if self.take(id).is_some() {
            self.rederive();
        }
    }

    /// Installs a freshly fetched authoritative copy, keeping pending deltas on top.
    pub fn refresh(&mut self, item: Item) {
        self.authoritative = item;
        self.rederive();
    }

    fn take(&mut self, id: DeltaId) -> Option<PendingDelta> {
        let pos = self.pending.iter().position(|(pending, _)| *pending == id)?;
        Some(self.pending.remove(pos).1)
    }

    fn rederive(&mut self) {
        let mut visible = self.authoritative.clone();
        for (_, delta) in &self.pending {
            delta.apply_to(&mut visible);
        }
        self.visible = visible;
    }
}
