use serde::{Deserialize, Serialize};

use crate::scenario::SelectorCondition;

/// Screen rectangle of a node, in device pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> (i32, i32) {
        (
            self.left + self.width() / 2,
            self.top + self.height() / 2,
        )
    }
}

/// Queryable attributes of a single UI element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    pub clickable: bool,
    pub enabled: bool,
    pub selected: bool,
    pub checkable: bool,
    pub checked: bool,
    pub focusable: bool,
    pub focused: bool,
    pub scrollable: bool,
    pub long_clickable: bool,
    pub bounds: Bounds,
}

/// Tree form of a hierarchy dump, as produced by perception backends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiElement {
    #[serde(flatten)]
    pub attributes: NodeAttributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UiElement>,
}

pub type NodeId = usize;

/// Arena entry. Node 0 is the root of a non-empty snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct UiNode {
    pub id: NodeId,
    pub attributes: NodeAttributes,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Point-in-time, read-only view of the UI hierarchy.
///
/// Nodes are stored flat in pre-order, so "does anything match" is a linear
/// scan and the tree shape is kept through parent/child indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    nodes: Vec<UiNode>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_root(root: UiElement) -> Self {
        let mut nodes = Vec::with_capacity(128);
        // (element, parent) pairs; children pushed in reverse to keep pre-order.
        let mut stack = vec![(root, None::<NodeId>)];
        while let Some((element, parent)) = stack.pop() {
            let id = nodes.len();
            nodes.push(UiNode {
                id,
                attributes: element.attributes,
                parent,
                children: Vec::new(),
            });
            if let Some(parent_id) = parent {
                nodes[parent_id].children.push(id);
            }
            for child in element.children.into_iter().rev() {
                stack.push((child, Some(id)));
            }
        }
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[UiNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&UiNode> {
        self.nodes.get(id)
    }

    pub fn root(&self) -> Option<&UiNode> {
        self.nodes.first()
    }

    pub fn children_of(&self, id: NodeId) -> impl Iterator<Item = &UiNode> {
        self.nodes
            .get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.nodes.get(*child))
    }

    /// True when at least one node satisfies `condition`.
    pub fn exists(&self, condition: &SelectorCondition) -> bool {
        self.nodes.iter().any(|n| condition.matches_node(&n.attributes))
    }

    /// First node in pre-order satisfying `condition`.
    pub fn find(&self, condition: &SelectorCondition) -> Option<&UiNode> {
        self.nodes.iter().find(|n| condition.matches_node(&n.attributes))
    }

    pub fn find_all<'a>(
        &'a self,
        condition: &'a SelectorCondition,
    ) -> impl Iterator<Item = &'a UiNode> + 'a {
        self.nodes
            .iter()
            .filter(move |n| condition.matches_node(&n.attributes))
    }

    /// Rebuild the tree form, e.g. for a hierarchy dump.
    pub fn to_tree(&self) -> Option<UiElement> {
        fn build(snapshot: &Snapshot, id: NodeId) -> Option<UiElement> {
            let node = snapshot.nodes.get(id)?;
            Some(UiElement {
                attributes: node.attributes.clone(),
                children: node
                    .children
                    .iter()
                    .filter_map(|c| build(snapshot, *c))
                    .collect(),
            })
        }
        build(self, 0)
    }
}
