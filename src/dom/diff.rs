//! Tree diff.
//!
//! Nodes are matched by position. Matching elements with the same tag are
//! diffed in place (attributes, then children); anything else is replaced.
//! Extra children are inserted or removed at the tail, so patch paths stay
//! valid when applied in order.

use super::node::Node;

/// Child-index path from the diff root.
pub type NodePath = Vec<usize>;

/// A single DOM mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch {
    Replace { path: NodePath, node: Node },
    SetText { path: NodePath, text: String },
    SetAttr { path: NodePath, name: String, value: String },
    RemoveAttr { path: NodePath, name: String },
    Insert { parent: NodePath, index: usize, node: Node },
    Remove { parent: NodePath, index: usize },
}

/// Diff two child lists (the contents of `<body>`).
pub fn diff(old: &[Node], new: &[Node]) -> Vec<Patch> {
    let mut patches = Vec::new();
    diff_children(old, new, &mut Vec::new(), &mut patches);
    patches
}

fn diff_children(old: &[Node], new: &[Node], parent: &mut NodePath, out: &mut Vec<Patch>) {
    for (i, (a, b)) in old.iter().zip(new).enumerate() {
        parent.push(i);
        diff_node(a, b, parent, out);
        parent.pop();
    }

    if new.len() > old.len() {
        for (index, node) in new.iter().enumerate().skip(old.len()) {
            out.push(Patch::Insert {
                parent: parent.clone(),
                index,
                node: node.clone(),
            });
        }
    } else {
        for index in (new.len()..old.len()).rev() {
            out.push(Patch::Remove {
                parent: parent.clone(),
                index,
            });
        }
    }
}

fn diff_node(old: &Node, new: &Node, path: &mut NodePath, out: &mut Vec<Patch>) {
    match (old, new) {
        (Node::Text(a), Node::Text(b)) => {
            if a != b {
                out.push(Patch::SetText {
                    path: path.clone(),
                    text: b.clone(),
                });
            }
        }
        (Node::Element(a), Node::Element(b)) if a.tag == b.tag => {
            for (name, _) in &a.attrs {
                if b.attr(name).is_none() {
                    out.push(Patch::RemoveAttr {
                        path: path.clone(),
                        name: name.clone(),
                    });
                }
            }
            for (name, value) in &b.attrs {
                if a.attr(name) != Some(value.as_str()) {
                    out.push(Patch::SetAttr {
                        path: path.clone(),
                        name: name.clone(),
                        value: value.clone(),
                    });
                }
            }
            diff_children(&a.children, &b.children, path, out);
        }
        _ if old == new => {}
        _ => out.push(Patch::Replace {
            path: path.clone(),
            node: new.clone(),
        }),
    }
}
