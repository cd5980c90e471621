//! Match-Tree Builder (C5): parses the nested `and`/`or`/`clinical`/`genomic` payload (§6)
//! into a typed tree held in an arena, so the evaluator can hold per-node result/evidence
//! annotations in a parallel, index-keyed table instead of fighting the borrow checker over a
//! pointer-linked graph (§9).

use crate::err::BuildError;
use crate::model::{ClinicalCriterion, GenomicCriterion, MatchTreePayload};

/// Opaque index into a [`MatchTree`]'s node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// A leaf's typed criterion, tagged by the collection it queries (§3: "each leaf has type
/// CLINICAL or GENOMIC").
#[derive(Debug, Clone, PartialEq)]
pub enum LeafCriterion {
    Clinical(ClinicalCriterion),
    Genomic(GenomicCriterion),
}

/// One node of a built match tree.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchNode {
    And(Vec<NodeId>),
    Or(Vec<NodeId>),
    Leaf(LeafCriterion),
}

/// A match tree: an arena of [`MatchNode`]s plus the id of its root. Built once per
/// step/arm/dose `match` payload and discarded after evaluation (§3 "Lifecycles").
#[derive(Debug, Clone, PartialEq)]
pub struct MatchTree {
    arena: Vec<MatchNode>,
    root: NodeId,
}

impl MatchTree {
    /// Builds a tree from a parsed [`MatchTreePayload`]. Rejects a junction with zero
    /// children (§4.6 "Empty junction ... is invalid; builder must reject it").
    pub fn build(payload: MatchTreePayload) -> Result<Self, BuildError> {
        let mut arena = Vec::new();
        let root = Self::build_node(payload, &mut arena)?;
        Ok(MatchTree { arena, root })
    }

    fn build_node(payload: MatchTreePayload, arena: &mut Vec<MatchNode>) -> Result<NodeId, BuildError> {
        match payload {
            MatchTreePayload::And(children) => {
                if children.is_empty() {
                    return Err(BuildError::EmptyJunction);
                }
                let ids = children
                    .into_iter()
                    .map(|c| Self::build_node(c, arena))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::push(arena, MatchNode::And(ids)))
            }
            MatchTreePayload::Or(children) => {
                if children.is_empty() {
                    return Err(BuildError::EmptyJunction);
                }
                let ids = children
                    .into_iter()
                    .map(|c| Self::build_node(c, arena))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::push(arena, MatchNode::Or(ids)))
            }
            MatchTreePayload::Clinical(c) => Ok(Self::push(arena, MatchNode::Leaf(LeafCriterion::Clinical(c)))),
            MatchTreePayload::Genomic(g) => Ok(Self::push(arena, MatchNode::Leaf(LeafCriterion::Genomic(g)))),
        }
    }

    fn push(arena: &mut Vec<MatchNode>, node: MatchNode) -> NodeId {
        arena.push(node);
        NodeId(arena.len() - 1)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &MatchNode {
        &self.arena[id.0]
    }

    /// Node ids in post-order (children before parents), the traversal order §4.6 specifies.
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.arena.len());
        self.post_order_from(self.root, &mut order);
        order
    }

    fn post_order_from(&self, id: NodeId, order: &mut Vec<NodeId>) {
        match &self.arena[id.0] {
            MatchNode::And(children) | MatchNode::Or(children) => {
                for child in children {
                    self.post_order_from(*child, order);
                }
            }
            MatchNode::Leaf(_) => {}
        }
        order.push(id);
    }
}
