//! Oncotree diagnosis taxonomy: a rooted tree of cancer diagnosis labels, expanded to
//! descendant-closure sets for diagnosis matching, including the reserved `_SOLID_` /
//! `_LIQUID_` tokens.

use std::collections::{HashMap, HashSet};

/// Opaque index into an [`Oncotree`]'s node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Node {
    text: String,
    children: Vec<NodeId>,
}

/// Reserved diagnosis token covering the union of descendants of `"Lymph"` and `"Blood"`.
pub const LIQUID_TOKEN: &str = "_LIQUID_";
/// Reserved diagnosis token covering every node not covered by [`LIQUID_TOKEN`].
pub const SOLID_TOKEN: &str = "_SOLID_";

const LIQUID_ROOTS: &[&str] = &["Lymph", "Blood"];

/// A rooted, read-only oncotree with a precomputed `text -> node` index.
#[derive(Debug, Clone, Default)]
pub struct Oncotree {
    nodes: Vec<Node>,
    by_text: HashMap<String, NodeId>,
}

/// One `(parent_text, child_text)` edge, or a lone root with no parent, as handed to
/// [`Oncotree::build`].
#[derive(Debug, Clone)]
pub struct OncotreeEdge {
    pub parent_text: Option<String>,
    pub text: String,
}

impl Oncotree {
    /// Builds the tree from a flat edge list. Nodes may arrive in any order; a node with
    /// `parent_text: None` is a root (the real oncotree has exactly one, but callers
    /// building fixtures from partial data may supply several disjoint roots).
    pub fn build(edges: impl IntoIterator<Item = OncotreeEdge>) -> Self {
        let mut tree = Oncotree::default();
        let mut pending_children: HashMap<String, Vec<String>> = HashMap::new();

        for edge in edges {
            let id = tree.intern(&edge.text);
            if let Some(parent_text) = edge.parent_text {
                pending_children.entry(parent_text).or_default().push(edge.text.clone());
            }
            let _ = id;
        }
        for (parent_text, children_texts) in pending_children {
            let parent_id = tree.intern(&parent_text);
            for child_text in children_texts {
                let child_id = tree.intern(&child_text);
                tree.nodes[parent_id.0].children.push(child_id);
            }
        }
        tree
    }

    fn intern(&mut self, text: &str) -> NodeId {
        if let Some(id) = self.by_text.get(text) {
            return *id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            text: text.to_string(),
            children: Vec::new(),
        });
        self.by_text.insert(text.to_string(), id);
        id
    }

    fn find(&self, text: &str) -> Option<NodeId> {
        self.by_text.get(text).copied()
    }

    /// Descendant-closure labels of the node with the given exact text, including the node
    /// itself. Empty if no such node exists.
    pub fn descendants_closure(&self, text: &str) -> HashSet<String> {
        let Some(root) = self.find(text) else {
            return HashSet::new();
        };
        self.closure_from(root)
    }

    fn closure_from(&self, root: NodeId) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if seen.insert(id) {
                stack.extend(self.nodes[id.0].children.iter().copied());
            }
        }
        seen.into_iter().map(|id| self.nodes[id.0].text.clone()).collect()
    }

    /// All node labels in the tree.
    pub fn all_labels(&self) -> HashSet<String> {
        self.nodes.iter().map(|n| n.text.clone()).collect()
    }

    /// Descendant-closure of the union of the liquid tumor roots (`"Lymph"`, `"Blood"`).
    pub fn liquid_set(&self) -> HashSet<String> {
        LIQUID_ROOTS
            .iter()
            .flat_map(|root| self.descendants_closure(root))
            .collect()
    }

    /// All labels not in [`Oncotree::liquid_set`].
    pub fn solid_set(&self) -> HashSet<String> {
        let liquid = self.liquid_set();
        self.all_labels().difference(&liquid).cloned().collect()
    }

    /// Expands a single diagnosis label (or `_SOLID_`/`_LIQUID_`) to its covering set.
    pub fn expand(&self, label: &str) -> HashSet<String> {
        match label {
            LIQUID_TOKEN => self.liquid_set(),
            SOLID_TOKEN => self.solid_set(),
            other => self.descendants_closure(other),
        }
    }

    /// Expands a list of diagnosis labels into the union of their covering sets,
    /// de-duplicated (multiple diagnoses within a single criterion combine into a single
    /// in/nin list).
    pub fn expand_all<'a>(&self, labels: impl IntoIterator<Item = &'a str>) -> HashSet<String> {
        labels.into_iter().flat_map(|l| self.expand(l)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Oncotree {
        Oncotree::build([
            OncotreeEdge { parent_text: None, text: "Tissue".into() },
            OncotreeEdge { parent_text: Some("Tissue".into()), text: "Lymph".into() },
            OncotreeEdge { parent_text: Some("Lymph".into()), text: "Hodgkin Lymphoma".into() },
            OncotreeEdge { parent_text: Some("Tissue".into()), text: "Blood".into() },
            OncotreeEdge { parent_text: Some("Blood".into()), text: "Leukemia".into() },
            OncotreeEdge { parent_text: Some("Tissue".into()), text: "Lung".into() },
            OncotreeEdge { parent_text: Some("Lung".into()), text: "Lung Adenocarcinoma".into() },
            OncotreeEdge { parent_text: Some("Tissue".into()), text: "Skin".into() },
            OncotreeEdge { parent_text: Some("Skin".into()), text: "Melanoma".into() },
        ])
    }

    #[test]
    fn descendants_closure_includes_self_and_children() {
        let tree = fixture();
        let set = tree.descendants_closure("Lymph");
        assert!(set.contains("Lymph"));
        assert!(set.contains("Hodgkin Lymphoma"));
        assert!(!set.contains("Leukemia"));
    }

    #[test]
    fn unknown_label_expands_empty() {
        let tree = fixture();
        assert!(tree.descendants_closure("Not A Real Diagnosis").is_empty());
    }

    #[test]
    fn liquid_and_solid_partition_all_labels() {
        let tree = fixture();
        let liquid = tree.liquid_set();
        let solid = tree.solid_set();
        assert!(liquid.contains("Hodgkin Lymphoma"));
        assert!(liquid.contains("Leukemia"));
        assert!(solid.contains("Melanoma"));
        assert!(solid.contains("Lung Adenocarcinoma"));
        assert!(liquid.is_disjoint(&solid));
        assert_eq!(
            liquid.union(&solid).cloned().collect::<HashSet<_>>(),
            tree.all_labels()
        );
    }

    #[test]
    fn expand_all_unions_and_dedups() {
        let tree = fixture();
        let expanded = tree.expand_all(["Lymph", "Blood"]);
        assert!(expanded.contains("Hodgkin Lymphoma"));
        assert!(expanded.contains("Leukemia"));
    }
}
