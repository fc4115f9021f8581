//! The ordered project forest.
//!
//! Containment order lives here, not in the entity collections: chapter and
//! plot-line order under their root buckets, section order within a
//! chapter, plot-point order within a plot line. Child lists preserve call
//! order exactly and are used directly as manuscript/export order.
//!
//! Not thread-safe; the conversion pipeline is single-writer by contract.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::id::{
    CHAPTER_PREFIX, CH_ROOT, CR_ROOT, IT_ROOT, LC_ROOT, PLOT_LINE_PREFIX, PL_ROOT, PN_ROOT,
};

#[derive(Debug, Clone)]
pub struct ProjectTree {
    roots: IndexMap<&'static str, Vec<String>>,
    sections: HashMap<String, Vec<String>>,
    plot_points: HashMap<String, Vec<String>>,
}

impl Default for ProjectTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectTree {
    pub fn new() -> Self {
        let mut roots = IndexMap::new();
        for key in [CH_ROOT, CR_ROOT, LC_ROOT, IT_ROOT, PL_ROOT, PN_ROOT] {
            roots.insert(key, Vec::new());
        }
        Self {
            roots,
            sections: HashMap::new(),
            plot_points: HashMap::new(),
        }
    }

    /// Appends `id` under `parent`. Appending a chapter or plot line under
    /// its root bucket provisions an empty child list for it.
    pub fn append(&mut self, parent: &str, id: impl Into<String>) {
        let id = id.into();
        if let Some(children) = self.roots.get_mut(parent) {
            if parent == CH_ROOT {
                self.sections.entry(id.clone()).or_default();
            } else if parent == PL_ROOT {
                self.plot_points.entry(id.clone()).or_default();
            }
            children.push(id);
            return;
        }

        if parent.starts_with(CHAPTER_PREFIX) {
            self.sections.entry(parent.to_string()).or_default().push(id);
        } else if parent.starts_with(PLOT_LINE_PREFIX) {
            self.plot_points
                .entry(parent.to_string())
                .or_default()
                .push(id);
        }
    }

    /// Inserts `id` at `index` under `parent`; indices past the end append.
    pub fn insert(&mut self, parent: &str, index: usize, id: impl Into<String>) {
        let id = id.into();
        if let Some(children) = self.roots.get_mut(parent) {
            if parent == CH_ROOT {
                self.sections.entry(id.clone()).or_default();
            } else if parent == PL_ROOT {
                self.plot_points.entry(id.clone()).or_default();
            }
            let index = index.min(children.len());
            children.insert(index, id);
            return;
        }

        if parent.starts_with(CHAPTER_PREFIX) {
            let children = self.sections.entry(parent.to_string()).or_default();
            let index = index.min(children.len());
            children.insert(index, id);
        } else if parent.starts_with(PLOT_LINE_PREFIX) {
            let children = self.plot_points.entry(parent.to_string()).or_default();
            let index = index.min(children.len());
            children.insert(index, id);
        }
    }

    /// Children of `parent` in insertion order. Unknown keys yield an empty
    /// slice, never an error.
    pub fn get_children(&self, parent: &str) -> &[String] {
        if let Some(children) = self.roots.get(parent) {
            return children;
        }
        if parent.starts_with(CHAPTER_PREFIX) {
            return self.sections.get(parent).map(Vec::as_slice).unwrap_or(&[]);
        }
        if parent.starts_with(PLOT_LINE_PREFIX) {
            return self
                .plot_points
                .get(parent)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
        }
        &[]
    }

    /// Drops the children of `parent`. Clearing a root bucket also clears
    /// the per-node lists of that branch.
    pub fn delete_children(&mut self, parent: &str) {
        if let Some(children) = self.roots.get_mut(parent) {
            children.clear();
            if parent == CH_ROOT {
                self.sections.clear();
            } else if parent == PL_ROOT {
                self.plot_points.clear();
            }
            return;
        }

        if parent.starts_with(CHAPTER_PREFIX) {
            self.sections.insert(parent.to_string(), Vec::new());
        } else if parent.starts_with(PLOT_LINE_PREFIX) {
            self.plot_points.insert(parent.to_string(), Vec::new());
        }
    }

    /// Replaces the children of `parent` with `children`. Re-setting a root
    /// bucket discards the per-node lists of that branch.
    pub fn set_children(&mut self, parent: &str, children: Vec<String>) {
        if let Some(slot) = self.roots.get_mut(parent) {
            if parent == CH_ROOT {
                self.sections.clear();
            } else if parent == PL_ROOT {
                self.plot_points.clear();
            }
            *slot = children;
            return;
        }

        if parent.starts_with(CHAPTER_PREFIX) {
            self.sections.insert(parent.to_string(), children);
        } else if parent.starts_with(PLOT_LINE_PREFIX) {
            self.plot_points.insert(parent.to_string(), children);
        }
    }

    /// Clears every bucket and node list.
    pub fn reset(&mut self) {
        for children in self.roots.values_mut() {
            children.clear();
        }
        self.sections.clear();
        self.plot_points.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{CH_ROOT, CR_ROOT, PL_ROOT};
    use proptest::prelude::*;

    #[test]
    fn append_and_get_preserve_order() {
        let mut tree = ProjectTree::new();
        tree.append(CH_ROOT, "ch1");
        tree.append("ch1", "sc2");
        tree.append("ch1", "sc1");
        assert_eq!(tree.get_children(CH_ROOT), ["ch1"]);
        assert_eq!(tree.get_children("ch1"), ["sc2", "sc1"]);
    }

    #[test]
    fn unknown_parent_yields_empty() {
        let tree = ProjectTree::new();
        assert!(tree.get_children("ch99").is_empty());
        assert!(tree.get_children("nonsense").is_empty());
    }

    #[test]
    fn insert_places_by_index() {
        let mut tree = ProjectTree::new();
        tree.append(CR_ROOT, "cr1");
        tree.append(CR_ROOT, "cr3");
        tree.insert(CR_ROOT, 1, "cr2");
        assert_eq!(tree.get_children(CR_ROOT), ["cr1", "cr2", "cr3"]);
    }

    #[test]
    fn delete_children_of_root_clears_branch() {
        let mut tree = ProjectTree::new();
        tree.append(CH_ROOT, "ch1");
        tree.append("ch1", "sc1");
        tree.delete_children(CH_ROOT);
        assert!(tree.get_children(CH_ROOT).is_empty());
        assert!(tree.get_children("ch1").is_empty());
    }

    #[test]
    fn set_children_replaces_order() {
        let mut tree = ProjectTree::new();
        tree.append(PL_ROOT, "ac1");
        tree.append("ac1", "ap1");
        tree.append("ac1", "ap2");
        tree.set_children("ac1", vec!["ap2".to_string(), "ap1".to_string()]);
        assert_eq!(tree.get_children("ac1"), ["ap2", "ap1"]);
    }

    proptest! {
        #[test]
        fn appended_ids_stay_under_exactly_one_parent(
            choices in prop::collection::vec(0usize..3, 1..60)
        ) {
            let parents = ["ch1", "ch2", "ac1"];
            let mut tree = ProjectTree::new();
            tree.append(CH_ROOT, "ch1");
            tree.append(CH_ROOT, "ch2");
            tree.append(PL_ROOT, "ac1");

            let mut expected: [Vec<String>; 3] = Default::default();
            for (n, &pick) in choices.iter().enumerate() {
                let id = if pick == 2 {
                    format!("ap{n}")
                } else {
                    format!("sc{n}")
                };
                tree.append(parents[pick], id.clone());
                expected[pick].push(id);
            }

            for (pick, parent) in parents.iter().enumerate() {
                prop_assert_eq!(tree.get_children(parent), expected[pick].as_slice());
            }
            let mut all: Vec<&String> = expected.iter().flatten().collect();
            let total = all.len();
            all.sort();
            all.dedup();
            prop_assert_eq!(all.len(), total);
        }
    }

    #[test]
    fn reset_clears_everything() {
        let mut tree = ProjectTree::new();
        tree.append(CH_ROOT, "ch1");
        tree.append("ch1", "sc1");
        tree.append(PL_ROOT, "ac1");
        tree.reset();
        assert!(tree.get_children(CH_ROOT).is_empty());
        assert!(tree.get_children(PL_ROOT).is_empty());
        assert!(tree.get_children("ch1").is_empty());
    }
}
