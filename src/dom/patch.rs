//! Patch application.

use thiserror::Error;

use super::diff::{NodePath, Patch};
use super::node::Node;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("no node at path {0:?}")]
    MissingNode(NodePath),
    #[error("node at {0:?} is not an element")]
    NotElement(NodePath),
    #[error("node at {0:?} is not text")]
    NotText(NodePath),
    #[error("index {index} out of bounds under {parent:?}")]
    OutOfBounds { parent: NodePath, index: usize },
}

/// Apply patches to a child list in order.
///
/// Stops at the first failing patch; earlier patches stay applied, so
/// callers wanting atomicity apply to a clone first.
pub fn apply(children: &mut Vec<Node>, patches: &[Patch]) -> Result<(), PatchError> {
    for patch in patches {
        apply_one(children, patch)?;
    }
    Ok(())
}

/// Apply to a copy and return it, leaving `children` untouched on failure.
pub fn apply_cloned(children: &[Node], patches: &[Patch]) -> Result<Vec<Node>, PatchError> {
    let mut trial = children.to_vec();
    apply(&mut trial, patches)?;
    Ok(trial)
}

fn apply_one(root: &mut Vec<Node>, patch: &Patch) -> Result<(), PatchError> {
    match patch {
        Patch::Replace { path, node } => {
            *node_at(root, path)? = node.clone();
        }
        Patch::SetText { path, text } => match node_at(root, path)? {
            Node::Text(t) => *t = text.clone(),
            _ => return Err(PatchError::NotText(path.clone())),
        },
        Patch::SetAttr { path, name, value } => {
            element_at(root, path)?.set_attr(name, value);
        }
        Patch::RemoveAttr { path, name } => {
            element_at(root, path)?.remove_attr(name);
        }
        Patch::Insert {
            parent,
            index,
            node,
        } => {
            let children = children_at(root, parent)?;
            if *index > children.len() {
                return Err(PatchError::OutOfBounds {
                    parent: parent.clone(),
                    index: *index,
                });
            }
            children.insert(*index, node.clone());
        }
        Patch::Remove { parent, index } => {
            let children = children_at(root, parent)?;
            if *index >= children.len() {
                return Err(PatchError::OutOfBounds {
                    parent: parent.clone(),
                    index: *index,
                });
            }
            children.remove(*index);
        }
    }
    Ok(())
}

fn node_at<'a>(root: &'a mut [Node], path: &NodePath) -> Result<&'a mut Node, PatchError> {
    let missing = || PatchError::MissingNode(path.clone());
    let (&first, rest) = path.split_first().ok_or_else(missing)?;
    let mut node = root.get_mut(first).ok_or_else(missing)?;
    for &index in rest {
        node = match node {
            Node::Element(el) => el.children.get_mut(index).ok_or_else(missing)?,
            _ => return Err(missing()),
        };
    }
    Ok(node)
}

fn element_at<'a>(
    root: &'a mut [Node],
    path: &NodePath,
) -> Result<&'a mut super::node::Element, PatchError> {
    node_at(root, path)?
        .as_element_mut()
        .ok_or_else(|| PatchError::NotElement(path.clone()))
}

fn children_at<'a>(root: &'a mut Vec<Node>, parent: &NodePath) -> Result<&'a mut Vec<Node>, PatchError> {
    if parent.is_empty() {
        return Ok(root);
    }
    Ok(&mut element_at(root, parent)?.children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::diff::diff;
    use crate::dom::parse::parse_fragment;

    fn html(nodes: &[Node]) -> String {
        nodes.iter().map(Node::to_html).collect()
    }

    #[test]
    fn test_diff_then_apply_reaches_target() {
        let cases = [
            ("<p>a</p>", "<p>b</p><div id=\"x\">c</div>"),
            ("<ul><li>1</li><li>2</li></ul>", "<ul><li>1</li></ul><p>tail</p>"),
            ("<div class=\"a\"><span>x</span></div>", "<div><em>x</em>y</div>"),
            ("text<!-- c -->", "<h1>t</h1>"),
        ];
        for (from, to) in cases {
            let mut old = parse_fragment(from).unwrap();
            let new = parse_fragment(to).unwrap();
            let patches = diff(&old, &new);
            apply(&mut old, &patches).unwrap();
            assert_eq!(html(&old), to, "{from} -> {to}");
        }
    }

    #[test]
    fn test_bad_path_fails() {
        let mut nodes = parse_fragment("<p>a</p>").unwrap();
        let err = apply(
            &mut nodes,
            &[Patch::SetText {
                path: vec![3, 0],
                text: "x".into(),
            }],
        )
        .unwrap_err();
        assert_eq!(err, PatchError::MissingNode(vec![3, 0]));

        let err = apply(
            &mut nodes,
            &[Patch::SetAttr {
                path: vec![0, 0],
                name: "id".into(),
                value: "x".into(),
            }],
        )
        .unwrap_err();
        assert_eq!(err, PatchError::NotElement(vec![0, 0]));
    }

    #[test]
    fn test_apply_cloned_leaves_original_on_failure() {
        let nodes = parse_fragment("<p>a</p>").unwrap();
        let patches = [
            Patch::SetText {
                path: vec![0, 0],
                text: "changed".into(),
            },
            Patch::Remove {
                parent: vec![],
                index: 5,
            },
        ];
        assert!(apply_cloned(&nodes, &patches).is_err());
        assert_eq!(html(&nodes), "<p>a</p>");
    }
}
