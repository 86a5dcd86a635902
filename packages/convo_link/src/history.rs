//! Per-pane conversation history with backward pagination.
//!
//! Each pane is an ordered sequence of entries, non-decreasing by
//! `created_at`. Live entries are appended at the tail; older pages are
//! prepended at the head without reordering anything already loaded.
//! Entry ids are unique across all panes.

use std::collections::{HashSet, VecDeque};

use convo_wire::{ConversationEntry, PaneId};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pane {
    Main,
    Deadloop,
    Interactive,
}

impl Pane {
    /// Scan order; also the tie-break order for the pagination cursor.
    pub const ALL: [Pane; 3] = [Pane::Main, Pane::Deadloop, Pane::Interactive];

    pub fn pane_id(&self) -> Option<PaneId> {
        match self {
            Pane::Main => None,
            Pane::Deadloop => Some(PaneId::Deadloop),
            Pane::Interactive => Some(PaneId::Interactive),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Pane::Main => "main",
            Pane::Deadloop => "deadloop",
            Pane::Interactive => "interactive",
        }
    }

    fn index(&self) -> usize {
        match self {
            Pane::Main => 0,
            Pane::Deadloop => 1,
            Pane::Interactive => 2,
        }
    }
}

impl From<PaneId> for Pane {
    fn from(pane: PaneId) -> Self {
        match pane {
            PaneId::Deadloop => Pane::Deadloop,
            PaneId::Interactive => Pane::Interactive,
        }
    }
}

impl std::fmt::Display for Pane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
pub struct HistoryStore {
    panes: [VecDeque<ConversationEntry>; 3],
    ids: HashSet<String>,
    has_more: bool,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a live entry at the tail of `pane`.
    ///
    /// Returns `false` if an entry with the same id is already loaded. An
    /// entry older than the pane's newest is placed at the tail anyway with
    /// its timestamp raised to the tail's, keeping the pane ordered.
    pub fn append(&mut self, mut entry: ConversationEntry, pane: Pane) -> bool {
        if self.ids.contains(&entry.id) {
            return false;
        }
        let seq = &mut self.panes[pane.index()];
        if let Some(tail) = seq.back() {
            if entry.created_at < tail.created_at {
                entry.created_at = tail.created_at;
            }
        }
        entry.pane = pane.pane_id();
        self.ids.insert(entry.id.clone());
        seq.push_back(entry);
        true
    }

    /// Insert an older page at the head of `pane` and record the server's
    /// `has_more` flag. Returns the number of entries actually inserted.
    ///
    /// Ids already loaded are skipped, so retrying a page is harmless. The
    /// batch is stably sorted; entries newer than the current head are
    /// lowered to the head's timestamp.
    pub fn prepend(&mut self, entries: Vec<ConversationEntry>, has_more: bool, pane: Pane) -> usize {
        self.has_more = has_more;

        let mut batch: Vec<ConversationEntry> = Vec::with_capacity(entries.len());
        for mut entry in entries {
            if self.ids.insert(entry.id.clone()) {
                entry.pane = pane.pane_id();
                batch.push(entry);
            }
        }
        batch.sort_by_key(|e| e.created_at);

        let seq = &mut self.panes[pane.index()];
        if let Some(head) = seq.front().map(|e| e.created_at) {
            for entry in batch.iter_mut() {
                if entry.created_at > head {
                    entry.created_at = head;
                }
            }
        }

        let inserted = batch.len();
        for entry in batch.into_iter().rev() {
            seq.push_front(entry);
        }
        inserted
    }

    /// The globally oldest loaded entry, scanning every pane.
    ///
    /// Its id is the `before_id` cursor for the next page. Ties go to the
    /// first pane in [`Pane::ALL`] order.
    pub fn oldest_entry_across_panes(&self) -> Option<&ConversationEntry> {
        let mut oldest: Option<&ConversationEntry> = None;
        for pane in Pane::ALL {
            if let Some(head) = self.panes[pane.index()].front() {
                match oldest {
                    Some(current) if current.created_at <= head.created_at => {}
                    _ => oldest = Some(head),
                }
            }
        }
        oldest
    }

    pub fn entries(&self, pane: Pane) -> &VecDeque<ConversationEntry> {
        &self.panes[pane.index()]
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn set_has_more(&mut self, has_more: bool) {
        self.has_more = has_more;
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        for seq in self.panes.iter_mut() {
            seq.clear();
        }
        self.ids.clear();
        self.has_more = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use convo_wire::Role;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn entry(id: &str, secs: i64) -> ConversationEntry {
        ConversationEntry::new(id, Role::Assistant, id, at(secs))
    }

    fn ids(store: &HistoryStore, pane: Pane) -> Vec<&str> {
        store.entries(pane).iter().map(|e| e.id.as_str()).collect()
    }

    // ── append ──────────────────────────────────────────────────────────

    #[test]
    fn test_append_in_order() {
        let mut store = HistoryStore::new();
        assert!(store.append(entry("a", 1), Pane::Main));
        assert!(store.append(entry("b", 2), Pane::Main));
        assert_eq!(ids(&store, Pane::Main), vec!["a", "b"]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_append_duplicate_id_rejected() {
        let mut store = HistoryStore::new();
        store.append(entry("a", 1), Pane::Main);
        assert!(!store.append(entry("a", 5), Pane::Deadloop));
        assert!(store.entries(Pane::Deadloop).is_empty());
    }

    #[test]
    fn test_append_older_entry_is_clamped_to_tail() {
        let mut store = HistoryStore::new();
        store.append(entry("a", 10), Pane::Main);
        store.append(entry("b", 3), Pane::Main);
        let seq = store.entries(Pane::Main);
        assert_eq!(seq[1].id, "b");
        assert_eq!(seq[1].created_at, at(10));
    }

    #[test]
    fn test_append_sets_pane_field() {
        let mut store = HistoryStore::new();
        store.append(entry("a", 1), Pane::Interactive);
        store.append(entry("b", 1), Pane::Main);
        assert_eq!(store.entries(Pane::Interactive)[0].pane, Some(PaneId::Interactive));
        assert_eq!(store.entries(Pane::Main)[0].pane, None);
    }

    // ── prepend ─────────────────────────────────────────────────────────

    #[test]
    fn test_prepend_extends_backward() {
        let mut store = HistoryStore::new();
        store.prepend(vec![entry("c", 30), entry("d", 40)], true, Pane::Main);
        let inserted = store.prepend(vec![entry("a", 10), entry("b", 20)], false, Pane::Main);
        assert_eq!(inserted, 2);
        assert_eq!(ids(&store, Pane::Main), vec!["a", "b", "c", "d"]);
        assert!(!store.has_more());
    }

    #[test]
    fn test_prepend_skips_known_ids() {
        let mut store = HistoryStore::new();
        store.prepend(vec![entry("b", 20), entry("c", 30)], true, Pane::Main);
        let inserted = store.prepend(vec![entry("a", 10), entry("b", 20)], true, Pane::Main);
        assert_eq!(inserted, 1);
        assert_eq!(ids(&store, Pane::Main), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_prepend_sorts_batch_stably() {
        let mut store = HistoryStore::new();
        store.prepend(
            vec![entry("x", 20), entry("y", 10), entry("z", 20)],
            false,
            Pane::Main,
        );
        assert_eq!(ids(&store, Pane::Main), vec!["y", "x", "z"]);
    }

    #[test]
    fn test_prepend_lowers_entries_newer_than_head() {
        let mut store = HistoryStore::new();
        store.append(entry("live", 50), Pane::Main);
        store.prepend(vec![entry("old", 10), entry("odd", 90)], true, Pane::Main);
        let seq = store.entries(Pane::Main);
        assert_eq!(ids(&store, Pane::Main), vec!["old", "odd", "live"]);
        assert_eq!(seq[1].created_at, at(50));
    }

    #[test]
    fn test_has_more_trusts_last_response() {
        let mut store = HistoryStore::new();
        store.prepend(vec![], true, Pane::Main);
        assert!(store.has_more());
        store.prepend(vec![entry("a", 1)], false, Pane::Deadloop);
        assert!(!store.has_more());
    }

    // ── cursor ──────────────────────────────────────────────────────────

    #[test]
    fn test_oldest_entry_scans_all_panes() {
        let mut store = HistoryStore::new();
        assert!(store.oldest_entry_across_panes().is_none());
        store.append(entry("main", 30), Pane::Main);
        store.append(entry("dl", 10), Pane::Deadloop);
        store.append(entry("int", 20), Pane::Interactive);
        assert_eq!(store.oldest_entry_across_panes().unwrap().id, "dl");
    }

    #[test]
    fn test_oldest_entry_tie_prefers_scan_order() {
        let mut store = HistoryStore::new();
        store.append(entry("int", 10), Pane::Interactive);
        store.append(entry("dl", 10), Pane::Deadloop);
        assert_eq!(store.oldest_entry_across_panes().unwrap().id, "dl");
    }

    #[test]
    fn test_clear() {
        let mut store = HistoryStore::new();
        store.prepend(vec![entry("a", 1)], true, Pane::Deadloop);
        store.clear();
        assert!(store.is_empty());
        assert!(!store.has_more());
        assert!(!store.contains("a"));
        assert!(store.append(entry("a", 1), Pane::Main));
    }
}
