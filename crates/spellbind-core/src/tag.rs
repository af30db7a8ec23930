//! Hierarchical gameplay tags with reference counting
//!
//! A tag is a dotted path such as `State.Debuff.Stun`. A tag *matches* a query
//! when it equals the query or is a descendant of it, so `State.Debuff.Stun`
//! matches `State.Debuff` and `State`, but not `State.Debuff.Root`.
//!
//! [`TagSet`] stores one count per tag so independent sources (two effects
//! granting the same stun, say) can add and remove the tag without stepping on
//! each other. The tag is present while its count is positive.

use crate::observer::{ListenerId, Observers};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A hierarchical dotted tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameplayTag(String);

impl GameplayTag {
    /// Create a new tag
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Get the tag as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether this tag equals `query` or is nested under it
    pub fn matches(&self, query: &GameplayTag) -> bool {
        match self.0.strip_prefix(query.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with('.'),
            None => false,
        }
    }

    /// Get the parent tag, if any
    pub fn parent(&self) -> Option<GameplayTag> {
        self.0
            .rsplit_once('.')
            .map(|(parent, _)| GameplayTag::new(parent))
    }
}

impl fmt::Display for GameplayTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GameplayTag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for GameplayTag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A small set of tags used for queries and definitions
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagContainer {
    tags: Vec<GameplayTag>,
}

impl TagContainer {
    /// Create an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag (ignored if already contained)
    pub fn add(&mut self, tag: impl Into<GameplayTag>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    /// Builder-style add
    pub fn with(mut self, tag: impl Into<GameplayTag>) -> Self {
        self.add(tag);
        self
    }

    /// Remove a tag, returning whether it was contained
    pub fn remove(&mut self, tag: &GameplayTag) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        self.tags.len() != before
    }

    /// Add every tag from another container
    pub fn extend(&mut self, other: &TagContainer) {
        for tag in other.iter() {
            self.add(tag.clone());
        }
    }

    /// Exact membership
    pub fn contains(&self, tag: &GameplayTag) -> bool {
        self.tags.contains(tag)
    }

    /// Check whether `tag` matches any query tag in this container
    pub fn matched_by(&self, tag: &GameplayTag) -> bool {
        self.tags.iter().any(|query| tag.matches(query))
    }

    /// Check whether any tag of `self` matches any query tag in `queries`
    pub fn matches_any(&self, queries: &TagContainer) -> bool {
        self.tags.iter().any(|tag| queries.matched_by(tag))
    }

    /// Iterate over the tags
    pub fn iter(&self) -> impl Iterator<Item = &GameplayTag> {
        self.tags.iter()
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Check if the container is empty
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl<T: Into<GameplayTag>> FromIterator<T> for TagContainer {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut container = TagContainer::new();
        for tag in iter {
            container.add(tag);
        }
        container
    }
}

/// Presence transition of a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagEventKind {
    /// Count went from zero to positive
    Added,
    /// Count went from positive to zero
    Removed,
}

/// Delivered to tag listeners once per presence transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEvent {
    pub tag: GameplayTag,
    pub kind: TagEventKind,
    /// Count after the change
    pub count: u32,
}

/// Replicated state of one tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDelta {
    pub tag: GameplayTag,
    pub count: u32,
    /// Per-tag monotonic version assigned by the authority
    pub version: u64,
}

/// Journal entry recorded for every count change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagChange {
    pub tag: GameplayTag,
    pub old_count: u32,
    pub new_count: u32,
    pub version: u64,
}

impl TagChange {
    /// The transition this change represents, if any
    pub fn transition(&self) -> Option<TagEventKind> {
        match (self.old_count, self.new_count) {
            (0, n) if n > 0 => Some(TagEventKind::Added),
            (o, 0) if o > 0 => Some(TagEventKind::Removed),
            _ => None,
        }
    }

    /// The replication delta for this change
    pub fn delta(&self) -> TagDelta {
        TagDelta {
            tag: self.tag.clone(),
            count: self.new_count,
            version: self.version,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TagEntry {
    count: u32,
    version: u64,
}

/// Reference-counted tags owned by one character
#[derive(Debug, Default)]
pub struct TagSet {
    entries: IndexMap<GameplayTag, TagEntry>,
    journal: Vec<TagChange>,
    observers: Observers<TagEvent>,
}

impl TagSet {
    /// Create an empty tag set
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a tag's count; returns true if the tag became present
    pub fn add_tag(&mut self, tag: impl Into<GameplayTag>, count: u32) -> bool {
        let tag = tag.into();
        let old = self.count(&tag);
        self.write(tag, old.saturating_add(count)) == Some(TagEventKind::Added)
    }

    /// Decrement a tag's count, floored at zero; returns true if the tag became absent
    pub fn remove_tag(&mut self, tag: &GameplayTag, count: u32) -> bool {
        let old = self.count(tag);
        if old == 0 {
            return false;
        }
        self.write(tag.clone(), old.saturating_sub(count)) == Some(TagEventKind::Removed)
    }

    /// Force a tag's count to an exact value
    pub fn set_count(&mut self, tag: impl Into<GameplayTag>, count: u32) {
        let tag = tag.into();
        self.write(tag, count);
    }

    /// Current count of a tag (zero when unknown)
    pub fn count(&self, tag: &GameplayTag) -> u32 {
        self.entries.get(tag).map(|e| e.count).unwrap_or(0)
    }

    /// Exact presence check
    pub fn has_tag(&self, tag: &GameplayTag) -> bool {
        self.count(tag) > 0
    }

    /// Check whether any present tag matches `query` hierarchically
    pub fn has_matching(&self, query: &GameplayTag) -> bool {
        self.present().any(|tag| tag.matches(query))
    }

    /// Check whether any present tag matches any query in the container
    pub fn has_any(&self, queries: &TagContainer) -> bool {
        self.first_match(queries).is_some()
    }

    /// Check whether every query in the container is matched by a present tag
    pub fn has_all(&self, queries: &TagContainer) -> bool {
        queries.iter().all(|query| self.has_matching(query))
    }

    /// First present tag matching any query in the container
    pub fn first_match(&self, queries: &TagContainer) -> Option<&GameplayTag> {
        self.present().find(|tag| queries.matched_by(tag))
    }

    /// Iterate over present tags
    pub fn present(&self) -> impl Iterator<Item = &GameplayTag> {
        self.entries
            .iter()
            .filter(|(_, e)| e.count > 0)
            .map(|(tag, _)| tag)
    }

    /// Register a presence/removal listener
    pub fn subscribe(&mut self, listener: impl FnMut(&TagEvent) + 'static) -> ListenerId {
        self.observers.subscribe(listener)
    }

    /// Unregister a listener
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Take the journal of count changes recorded since the last call
    pub fn take_journal(&mut self) -> Vec<TagChange> {
        std::mem::take(&mut self.journal)
    }

    /// Apply a delta received from the authority
    ///
    /// Returns `false` when the delta is stale (its version is not newer than
    /// the one already applied). Listeners fire on presence transitions.
    /// Replicated changes are not journaled.
    pub fn apply_replicated(&mut self, delta: &TagDelta) -> bool {
        let entry = self.entries.get(&delta.tag).copied().unwrap_or_default();
        if delta.version <= entry.version {
            return false;
        }
        self.entries.insert(
            delta.tag.clone(),
            TagEntry {
                count: delta.count,
                version: delta.version,
            },
        );
        self.notify_transition(&delta.tag, entry.count, delta.count);
        true
    }

    /// Full state of every tag ever touched, for resynchronization
    pub fn snapshot(&self) -> Vec<TagDelta> {
        self.entries
            .iter()
            .map(|(tag, e)| TagDelta {
                tag: tag.clone(),
                count: e.count,
                version: e.version,
            })
            .collect()
    }

    /// Rebuild a tag set from a snapshot
    pub fn from_snapshot(entries: &[TagDelta]) -> Self {
        let mut set = TagSet::new();
        set.restore(entries);
        set
    }

    /// Replace all counts with a snapshot, keeping listeners
    ///
    /// Listeners are told about every presence transition the restore causes.
    pub fn restore(&mut self, entries: &[TagDelta]) {
        let previous = std::mem::take(&mut self.entries);
        for delta in entries {
            self.entries.insert(
                delta.tag.clone(),
                TagEntry {
                    count: delta.count,
                    version: delta.version,
                },
            );
        }
        for (tag, old) in previous.iter() {
            let new_count = self.count(tag);
            self.notify_transition(tag, old.count, new_count);
        }
        for delta in entries {
            if !previous.contains_key(&delta.tag) {
                self.notify_transition(&delta.tag, 0, delta.count);
            }
        }
    }

    fn write(&mut self, tag: GameplayTag, new_count: u32) -> Option<TagEventKind> {
        let entry = self.entries.get(&tag).copied().unwrap_or_default();
        if entry.count == new_count {
            return None;
        }
        let version = entry.version + 1;
        self.store(tag, entry.count, new_count, version)
    }

    fn store(
        &mut self,
        tag: GameplayTag,
        old_count: u32,
        new_count: u32,
        version: u64,
    ) -> Option<TagEventKind> {
        self.entries.insert(
            tag.clone(),
            TagEntry {
                count: new_count,
                version,
            },
        );
        let change = TagChange {
            tag: tag.clone(),
            old_count,
            new_count,
            version,
        };
        let transition = change.transition();
        self.journal.push(change);
        self.notify_transition(&tag, old_count, new_count);
        transition
    }

    fn notify_transition(&mut self, tag: &GameplayTag, old_count: u32, new_count: u32) {
        let kind = match (old_count, new_count) {
            (0, n) if n > 0 => TagEventKind::Added,
            (o, 0) if o > 0 => TagEventKind::Removed,
            _ => return,
        };
        self.observers.notify(&TagEvent {
            tag: tag.clone(),
            kind,
            count: new_count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn tag(s: &str) -> GameplayTag {
        GameplayTag::new(s)
    }

    #[test]
    fn test_hierarchical_match() {
        let stun = tag("State.Debuff.Stun");
        assert!(stun.matches(&tag("State.Debuff.Stun")));
        assert!(stun.matches(&tag("State.Debuff")));
        assert!(stun.matches(&tag("State")));
        assert!(!stun.matches(&tag("State.Debuff.Root")));
        assert!(!stun.matches(&tag("State.Deb")));
        assert!(!tag("State").matches(&stun));
        assert_eq!(stun.parent(), Some(tag("State.Debuff")));
        assert_eq!(tag("State").parent(), None);
    }

    #[test]
    fn test_counts_never_go_negative() {
        let mut tags = TagSet::new();
        let stun = tag("State.Debuff.Stun");

        assert!(!tags.remove_tag(&stun, 1));
        assert_eq!(tags.count(&stun), 0);

        assert!(tags.add_tag(stun.clone(), 1));
        assert!(!tags.add_tag(stun.clone(), 2));
        assert_eq!(tags.count(&stun), 3);

        assert!(!tags.remove_tag(&stun, 1));
        assert!(tags.has_tag(&stun));
        assert!(tags.remove_tag(&stun, 10));
        assert_eq!(tags.count(&stun), 0);
        assert!(!tags.has_tag(&stun));
    }

    #[test]
    fn test_events_fire_once_per_transition() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut tags = TagSet::new();
        let sink = events.clone();
        tags.subscribe(move |e: &TagEvent| sink.borrow_mut().push(e.kind));

        let dead = tag("State.Dead");
        tags.add_tag(dead.clone(), 1);
        tags.add_tag(dead.clone(), 1);
        tags.remove_tag(&dead, 1);
        tags.remove_tag(&dead, 1);
        tags.remove_tag(&dead, 1);

        assert_eq!(
            *events.borrow(),
            vec![TagEventKind::Added, TagEventKind::Removed]
        );
    }

    #[test]
    fn test_has_any_is_hierarchical() {
        let mut tags = TagSet::new();
        tags.add_tag("State.Debuff.Stun", 1);

        let blocking: TagContainer = ["State.Dead", "State.Debuff"].into_iter().collect();
        assert!(tags.has_any(&blocking));
        assert_eq!(tags.first_match(&blocking), Some(&tag("State.Debuff.Stun")));

        let unrelated: TagContainer = ["State.Dead"].into_iter().collect();
        assert!(!tags.has_any(&unrelated));
        assert!(tags.has_all(&["State", "State.Debuff"].into_iter().collect()));
    }

    #[test]
    fn test_set_count_and_journal() {
        let mut tags = TagSet::new();
        let dead = tag("State.Dead");
        tags.set_count(dead.clone(), 0);
        assert!(tags.take_journal().is_empty());

        tags.add_tag(dead.clone(), 1);
        tags.set_count(dead.clone(), 0);
        let journal = tags.take_journal();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal[0].transition(), Some(TagEventKind::Added));
        assert_eq!(journal[1].transition(), Some(TagEventKind::Removed));
        assert_eq!(journal[1].version, 2);
    }

    #[test]
    fn test_replicated_deltas_reproduce_state() {
        let mut authority = TagSet::new();
        authority.add_tag("State.Debuff.Stun", 2);
        authority.remove_tag(&tag("State.Debuff.Stun"), 1);
        authority.add_tag("State.Dead", 1);

        let mut mirror = TagSet::new();
        for change in authority.take_journal() {
            assert!(mirror.apply_replicated(&change.delta()));
        }
        assert_eq!(mirror.snapshot(), authority.snapshot());

        let stale = TagDelta {
            tag: tag("State.Dead"),
            count: 0,
            version: 1,
        };
        assert!(!mirror.apply_replicated(&stale));
        assert!(mirror.has_tag(&tag("State.Dead")));
    }

    #[test]
    fn test_replicated_deltas_are_not_journaled() {
        let events = Rc::new(RefCell::new(0));
        let mut mirror = TagSet::new();
        let sink = events.clone();
        mirror.subscribe(move |_: &TagEvent| *sink.borrow_mut() += 1);

        for version in 1..=1000u64 {
            let delta = TagDelta {
                tag: tag("State.Debuff.Stun"),
                count: (version % 2) as u32,
                version,
            };
            assert!(mirror.apply_replicated(&delta));
        }

        assert!(mirror.take_journal().is_empty());
        assert_eq!(*events.borrow(), 1000);
        assert!(!mirror.has_tag(&tag("State.Debuff.Stun")));
    }

    #[test]
    fn test_restore_notifies_transitions() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut mirror = TagSet::new();
        mirror.add_tag("State.Debuff.Stun", 1);
        let sink = events.clone();
        mirror.subscribe(move |e: &TagEvent| sink.borrow_mut().push((e.tag.clone(), e.kind)));

        let snapshot = vec![TagDelta {
            tag: tag("State.Dead"),
            count: 1,
            version: 4,
        }];
        mirror.restore(&snapshot);

        assert!(!mirror.has_tag(&tag("State.Debuff.Stun")));
        assert!(mirror.has_tag(&tag("State.Dead")));
        assert_eq!(
            *events.borrow(),
            vec![
                (tag("State.Debuff.Stun"), TagEventKind::Removed),
                (tag("State.Dead"), TagEventKind::Added),
            ]
        );
    }
}
