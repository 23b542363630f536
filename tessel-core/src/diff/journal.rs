//! The mutation journal.
//!
//! A diff never mutates attached host nodes directly. It records [`Op`]s and
//! the container applies the whole journal once the diff succeeded, so a
//! failed diff leaves the host untouched.
//!
//! # Child order
//!
//! Structural changes are recorded as one [`Op::Arrange`] per affected host
//! element, carrying the complete desired child list. Applying it keeps the
//! longest run of children that are already in the right relative order in
//! place and moves or inserts only the rest.

use std::collections::{HashMap, HashSet};

use serde_json::Value as Json;

use crate::error::Result;
use crate::host::{Host, HostNode};

use super::attrs::AttrPatch;

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    SetAttr {
        node: HostNode,
        name: String,
        value: String,
        ns: Option<&'static str>,
    },
    RemoveAttr {
        node: HostNode,
        name: String,
    },
    SetProperty {
        node: HostNode,
        name: String,
        value: Json,
    },
    SetText {
        node: HostNode,
        text: String,
    },
    SetInnerHtml {
        node: HostNode,
        html: String,
    },
    Remove {
        node: HostNode,
    },
    Arrange {
        parent: HostNode,
        children: Vec<HostNode>,
    },
}

impl Op {
    pub fn from_patch(node: HostNode, patch: AttrPatch) -> Self {
        match patch {
            AttrPatch::Set { name, value, ns } => Op::SetAttr { node, name, value, ns },
            AttrPatch::Remove { name } => Op::RemoveAttr { node, name },
            AttrPatch::Property { name, value } => Op::SetProperty { node, name, value },
        }
    }
}

/// What applying a journal did to the host.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JournalStats {
    pub ops: usize,
    /// Nodes placed that had no position under their parent before.
    pub inserted: usize,
    /// Nodes repositioned under the same parent.
    pub moved: usize,
    pub removed: usize,
}

#[derive(Debug, Default)]
pub struct Journal {
    ops: Vec<Op>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn apply(&self, host: &dyn Host) -> Result<JournalStats> {
        let mut stats = JournalStats {
            ops: self.ops.len(),
            ..JournalStats::default()
        };
        for op in &self.ops {
            match op {
                Op::SetAttr { node, name, value, ns } => host.set_attribute(*node, name, value, *ns)?,
                Op::RemoveAttr { node, name } => host.remove_attribute(*node, name)?,
                Op::SetProperty { node, name, value } => host.set_property(*node, name, value)?,
                Op::SetText { node, text } => host.set_text(*node, text)?,
                Op::SetInnerHtml { node, html } => host.set_inner_html(*node, html)?,
                Op::Remove { node } => {
                    if host.parent(*node).is_some() {
                        host.remove(*node)?;
                        stats.removed += 1;
                    }
                }
                Op::Arrange { parent, children } => arrange(host, *parent, children, &mut stats)?,
            }
        }
        Ok(stats)
    }
}

fn arrange(host: &dyn Host, parent: HostNode, desired: &[HostNode], stats: &mut JournalStats) -> Result<()> {
    let current: HashMap<HostNode, usize> = host
        .children(parent)
        .into_iter()
        .enumerate()
        .map(|(index, node)| (node, index))
        .collect();
    let positions: Vec<Option<usize>> = desired.iter().map(|node| current.get(node).copied()).collect();

    let present: Vec<(usize, usize)> = positions
        .iter()
        .enumerate()
        .filter_map(|(index, position)| position.map(|p| (index, p)))
        .collect();
    let ranks: Vec<usize> = present.iter().map(|(_, position)| *position).collect();
    let stable: HashSet<usize> = longest_increasing_subsequence(&ranks)
        .into_iter()
        .map(|i| present[i].0)
        .collect();

    let mut anchor = None;
    for (index, node) in desired.iter().enumerate().rev() {
        if !stable.contains(&index) {
            host.insert_before(parent, *node, anchor)?;
            if positions[index].is_some() {
                stats.moved += 1;
            } else {
                stats.inserted += 1;
            }
        }
        anchor = Some(*node);
    }
    Ok(())
}

/// Indices into `values` of one longest strictly increasing subsequence.
pub fn longest_increasing_subsequence(values: &[usize]) -> Vec<usize> {
    // tails[k]: index of the smallest tail of an increasing run of length k+1
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; values.len()];
    for (i, value) in values.iter().enumerate() {
        let k = tails.partition_point(|&t| values[t] < *value);
        if k > 0 {
            prev[i] = Some(tails[k - 1]);
        }
        if k == tails.len() {
            tails.push(i);
        } else {
            tails[k] = i;
        }
    }
    let mut out = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        out.push(i);
        cursor = prev[i];
    }
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryDocument;
    use crate::vnode::Namespace;

    #[test]
    fn lis_picks_a_longest_run() {
        assert_eq!(longest_increasing_subsequence(&[]), Vec::<usize>::new());
        assert_eq!(longest_increasing_subsequence(&[2, 0, 1]), vec![1, 2]);
        let values = [3, 1, 4, 1, 5, 9, 2, 6];
        let lis = longest_increasing_subsequence(&values);
        assert_eq!(lis.len(), 4);
        assert!(lis.windows(2).all(|w| values[w[0]] < values[w[1]]));
    }

    #[test]
    fn arrange_moves_only_unstable_nodes() {
        let doc = MemoryDocument::new();
        let root = doc.create_element("ul", Namespace::Html);
        let items: Vec<HostNode> = ["a", "b", "c"].iter().map(|t| doc.create_text(t)).collect();
        for item in &items {
            doc.insert_before(root, *item, None).unwrap();
        }

        let mut journal = Journal::new();
        journal.push(Op::Arrange {
            parent: root,
            children: vec![items[2], items[0], items[1]],
        });
        let stats = journal.apply(&doc).unwrap();
        assert_eq!(doc.text_content(root), "cab");
        assert_eq!(stats.moved, 1);
        assert_eq!(stats.inserted, 0);
    }

    #[test]
    fn arrange_inserts_new_nodes_at_their_index() {
        let doc = MemoryDocument::new();
        let root = doc.create_element("div", Namespace::Html);
        let a = doc.create_text("a");
        let c = doc.create_text("c");
        doc.insert_before(root, a, None).unwrap();
        doc.insert_before(root, c, None).unwrap();
        let b = doc.create_text("b");

        let mut journal = Journal::new();
        journal.push(Op::Arrange {
            parent: root,
            children: vec![a, b, c],
        });
        let stats = journal.apply(&doc).unwrap();
        assert_eq!(doc.text_content(root), "abc");
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.moved, 0);
    }
}
