//! Path expansion and contraction
//!
//! [`PathExpander`] never owns the selection. It works through the
//! [`SelectionTarget`] seam so any store can be driven by it.

use crate::mapping::{is_path_id, PathMapping};
use serde::{Deserialize, Serialize};

/// How an id came to be selected
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    /// Chosen by the learner
    Direct,
    /// Pulled in by selecting the named path
    ViaPath(String),
}

/// Mutable selection that expansion and contraction act on
///
/// Implementations use interior mutability; the expander only holds `&self`.
pub trait SelectionTarget {
    /// Whether `id` is currently selected
    fn is_selected(&self, id: &str) -> bool;

    /// Select `id` as a dependent of `path_id`; returns true if inserted
    fn select_dependent(&self, id: &str, path_id: &str) -> bool;

    /// Deselect `id` without side effects; returns true if removed
    fn deselect_dependent(&self, id: &str) -> bool;
}

/// Maps path ids to items and applies them to a selection
#[derive(Debug, Clone, Default)]
pub struct PathExpander {
    mapping: PathMapping,
}

impl PathExpander {
    /// Create expander over mapping
    #[inline]
    #[must_use]
    pub fn new(mapping: PathMapping) -> Self {
        Self { mapping }
    }

    /// Underlying mapping
    #[inline]
    #[must_use]
    pub fn mapping(&self) -> &PathMapping {
        &self.mapping
    }

    /// Whether `id` is a path id
    #[inline]
    #[must_use]
    pub fn is_path_id(&self, id: &str) -> bool {
        is_path_id(id)
    }

    /// Items of `path_id`; empty with a warning when unmapped
    #[must_use]
    pub fn expand(&self, path_id: &str) -> Vec<String> {
        if let Some(items) = self.mapping.items(path_id) {
            items.to_vec()
        } else {
            tracing::warn!(path_id, "no item mapping for path, expansion skipped");
            Vec::new()
        }
    }

    /// Paths whose mapping includes `item_id`
    #[must_use]
    pub fn paths_containing(&self, item_id: &str) -> Vec<String> {
        self.mapping
            .path_ids()
            .filter(|p| {
                self.mapping
                    .items(p)
                    .is_some_and(|items| items.iter().any(|i| i == item_id))
            })
            .map(str::to_string)
            .collect()
    }

    /// Select every unselected item of `path_id` as its dependent
    ///
    /// Idempotent: already-selected items are left untouched.
    ///
    /// # Returns
    /// Number of items newly selected
    pub fn apply_expansion<S: SelectionTarget + ?Sized>(&self, target: &S, path_id: &str) -> usize {
        let added = self
            .expand(path_id)
            .iter()
            .filter(|item| !target.is_selected(item))
            .filter(|item| target.select_dependent(item, path_id))
            .count();
        tracing::debug!(path_id, added, "applied path expansion");
        added
    }

    /// Deselect every selected item of `path_id`
    ///
    /// Contraction is total: items are removed even if the learner also
    /// picked them directly.
    ///
    /// # Returns
    /// Number of items removed
    pub fn apply_contraction<S: SelectionTarget + ?Sized>(&self, target: &S, path_id: &str) -> usize {
        let removed = self
            .expand(path_id)
            .iter()
            .filter(|item| target.is_selected(item))
            .filter(|item| target.deselect_dependent(item))
            .count();
        tracing::debug!(path_id, removed, "applied path contraction");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct Selection(RefCell<BTreeMap<String, Provenance>>);

    impl Selection {
        fn ids(&self) -> Vec<String> {
            self.0.borrow().keys().cloned().collect()
        }
    }

    impl SelectionTarget for Selection {
        fn is_selected(&self, id: &str) -> bool {
            self.0.borrow().contains_key(id)
        }

        fn select_dependent(&self, id: &str, path_id: &str) -> bool {
            self.0
                .borrow_mut()
                .insert(id.to_string(), Provenance::ViaPath(path_id.to_string()))
                .is_none()
        }

        fn deselect_dependent(&self, id: &str) -> bool {
            self.0.borrow_mut().remove(id).is_some()
        }
    }

    fn expander() -> PathExpander {
        PathExpander::new(
            PathMapping::from_pairs([
                ("path-foundation", vec!["a", "b", "c"]),
                ("path-advanced", vec!["c", "d"]),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn expansion_then_contraction_scenario() {
        let selection = Selection::default();
        let expander = expander();

        assert_eq!(expander.apply_expansion(&selection, "path-foundation"), 3);
        assert_eq!(selection.ids(), vec!["a", "b", "c"]);

        assert_eq!(expander.apply_contraction(&selection, "path-foundation"), 3);
        assert!(selection.ids().is_empty());
    }

    #[test]
    fn expansion_marks_items_as_dependent() {
        let selection = Selection::default();
        expander().apply_expansion(&selection, "path-foundation");
        assert_eq!(
            selection.0.borrow().get("a"),
            Some(&Provenance::ViaPath("path-foundation".to_string()))
        );
    }

    #[test]
    fn expansion_keeps_direct_provenance() {
        let selection = Selection::default();
        selection.0.borrow_mut().insert("b".to_string(), Provenance::Direct);

        assert_eq!(expander().apply_expansion(&selection, "path-foundation"), 2);
        assert_eq!(selection.0.borrow().get("b"), Some(&Provenance::Direct));
    }

    #[test]
    fn contraction_is_total() {
        let selection = Selection::default();
        selection.0.borrow_mut().insert("c".to_string(), Provenance::Direct);
        selection.0.borrow_mut().insert("z".to_string(), Provenance::Direct);

        expander().apply_contraction(&selection, "path-advanced");
        assert_eq!(selection.ids(), vec!["z"]);
    }

    #[test]
    fn unknown_path_is_a_noop() {
        let selection = Selection::default();
        let expander = expander();
        assert!(expander.expand("path-missing").is_empty());
        assert_eq!(expander.apply_expansion(&selection, "path-missing"), 0);
        assert_eq!(expander.apply_contraction(&selection, "path-missing"), 0);
    }

    #[test]
    fn inverse_lookup() {
        let expander = expander();
        assert_eq!(
            expander.paths_containing("c"),
            vec!["path-foundation".to_string(), "path-advanced".to_string()]
        );
        assert!(expander.paths_containing("q").is_empty());
    }

    proptest! {
        #[test]
        fn prop_expansion_is_idempotent(
            preselected in proptest::collection::btree_set("[a-e]", 0..5),
            path in prop_oneof![Just("path-foundation"), Just("path-advanced"), Just("path-none")],
        ) {
            let expander = expander();

            let once = Selection::default();
            let twice = Selection::default();
            for id in &preselected {
                once.0.borrow_mut().insert(id.clone(), Provenance::Direct);
                twice.0.borrow_mut().insert(id.clone(), Provenance::Direct);
            }

            expander.apply_expansion(&once, path);
            expander.apply_expansion(&twice, path);
            let second = expander.apply_expansion(&twice, path);

            prop_assert_eq!(second, 0);
            prop_assert_eq!(once.ids(), twice.ids());
        }
    }
}
