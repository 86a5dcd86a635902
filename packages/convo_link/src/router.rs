//! Pane routing for inbound conversation entries.
//!
//! Outside dual-pane mode everything goes to the main pane. The first entry
//! that arrives with a wire pane tag switches the router into dual-pane mode;
//! the wire, not a local toggle, decides this. Once in dual-pane mode a known
//! tag selects its pane and anything else falls back to main.

use convo_wire::{ConversationEntry, PaneId, PaneTag, TaggedEntry};

use crate::history::Pane;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Routed {
    pub pane: Pane,
    /// This call switched the router into dual-pane mode.
    pub entered_dual_pane: bool,
}

#[derive(Debug, Default)]
pub struct PaneRouter {
    dual_pane: bool,
}

impl PaneRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dual_pane(&self) -> bool {
        self.dual_pane
    }

    pub fn reset(&mut self) {
        self.dual_pane = false;
    }

    /// Pick the pane for an entry carrying `tag`, upgrading to dual-pane mode
    /// if a tag is present. Re-entering dual-pane mode is a no-op.
    pub fn route(&mut self, tag: Option<&PaneTag>) -> Routed {
        let entered_dual_pane = tag.is_some() && !self.dual_pane;
        if entered_dual_pane {
            self.dual_pane = true;
        }
        let pane = if self.dual_pane {
            tag.and_then(PaneTag::pane).map(Pane::from).unwrap_or(Pane::Main)
        } else {
            Pane::Main
        };
        Routed {
            pane,
            entered_dual_pane,
        }
    }

    /// Place a locally created entry without touching the mode.
    pub fn place(&self, requested: Option<PaneId>) -> Pane {
        match requested {
            Some(pane) if self.dual_pane => pane.into(),
            _ => Pane::Main,
        }
    }

    /// Split a history page into per-pane sub-batches, preserving the
    /// batch's order within each pane. Sub-batches are returned in
    /// [`Pane::ALL`] order, empty ones omitted.
    pub fn split_batch(&mut self, entries: Vec<TaggedEntry>) -> (Vec<(Pane, Vec<ConversationEntry>)>, bool) {
        let mut buckets: [Vec<ConversationEntry>; 3] = Default::default();
        let mut entered = false;
        for tagged in entries {
            let routed = self.route(tagged.tag.as_ref());
            entered |= routed.entered_dual_pane;
            let slot = Pane::ALL
                .iter()
                .position(|p| *p == routed.pane)
                .unwrap_or(0);
            buckets[slot].push(tagged.entry);
        }
        let batches = Pane::ALL
            .into_iter()
            .zip(buckets)
            .filter(|(_, batch)| !batch.is_empty())
            .collect();
        (batches, entered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use convo_wire::Role;

    fn tagged(id: &str, tag: Option<&str>) -> TaggedEntry {
        TaggedEntry::new(
            ConversationEntry::new(id, Role::Assistant, id, Utc::now()),
            tag.map(PaneTag::from_wire),
        )
    }

    #[test]
    fn test_single_pane_without_tag() {
        let mut router = PaneRouter::new();
        let routed = router.route(None);
        assert_eq!(routed.pane, Pane::Main);
        assert!(!routed.entered_dual_pane);
        assert!(!router.is_dual_pane());
    }

    #[test]
    fn test_tag_upgrades_to_dual_pane_once() {
        let mut router = PaneRouter::new();
        let tag = PaneTag::from_wire("deadloop");
        let first = router.route(Some(&tag));
        assert_eq!(first.pane, Pane::Deadloop);
        assert!(first.entered_dual_pane);
        let second = router.route(Some(&tag));
        assert!(!second.entered_dual_pane);
        assert!(router.is_dual_pane());
    }

    #[test]
    fn test_dual_pane_untagged_goes_to_main() {
        let mut router = PaneRouter::new();
        router.route(Some(&PaneTag::from_wire("interactive")));
        assert_eq!(router.route(None).pane, Pane::Main);
    }

    #[test]
    fn test_unrecognized_tag_upgrades_but_lands_in_main() {
        let mut router = PaneRouter::new();
        let routed = router.route(Some(&PaneTag::from_wire("sidebar")));
        assert!(routed.entered_dual_pane);
        assert_eq!(routed.pane, Pane::Main);
    }

    #[test]
    fn test_place_does_not_upgrade() {
        let router = PaneRouter::new();
        assert_eq!(router.place(Some(PaneId::Deadloop)), Pane::Main);
        assert!(!router.is_dual_pane());
    }

    #[test]
    fn test_place_in_dual_pane() {
        let mut router = PaneRouter::new();
        router.route(Some(&PaneTag::from_wire("deadloop")));
        assert_eq!(router.place(Some(PaneId::Interactive)), Pane::Interactive);
        assert_eq!(router.place(None), Pane::Main);
    }

    #[test]
    fn test_split_batch_preserves_order() {
        let mut router = PaneRouter::new();
        let (batches, entered) = router.split_batch(vec![
            tagged("m1", None),
            tagged("d1", Some("deadloop")),
            tagged("i1", Some("interactive")),
            tagged("d2", Some("deadloop")),
            tagged("m2", None),
        ]);
        assert!(entered);
        let names: Vec<(Pane, Vec<&str>)> = batches
            .iter()
            .map(|(p, b)| (*p, b.iter().map(|e| e.id.as_str()).collect()))
            .collect();
        assert_eq!(
            names,
            vec![
                (Pane::Main, vec!["m1", "m2"]),
                (Pane::Deadloop, vec!["d1", "d2"]),
                (Pane::Interactive, vec!["i1"]),
            ]
        );
    }

    #[test]
    fn test_split_batch_single_pane() {
        let mut router = PaneRouter::new();
        let (batches, entered) = router.split_batch(vec![tagged("a", None), tagged("b", None)]);
        assert!(!entered);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0, Pane::Main);
    }
}
