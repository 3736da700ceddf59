//! Folder and file nodes of a category tree.

use serde::{Deserialize, Serialize};

/// Whether a node is a folder or a playable file.
///
/// Serialized as `1` (folder) or `2` (file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum NodeKind {
    Folder,
    File,
}

impl TryFrom<u8> for NodeKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Folder),
            2 => Ok(Self::File),
            other => Err(format!("unknown node type {other}, expected 1 or 2")),
        }
    }
}

impl From<NodeKind> for u8 {
    fn from(kind: NodeKind) -> u8 {
        match kind {
            NodeKind::Folder => 1,
            NodeKind::File => 2,
        }
    }
}

/// One entry of a category tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentNode {
    pub id: u64,

    #[serde(rename = "type")]
    pub kind: NodeKind,

    pub name: String,

    /// Folder contents. Always empty for files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ContentNode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Where the media can be fetched or played from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_href: Option<String>,

    /// Human-readable running time, e.g. `1Hr 24Min` or `05:46`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
}

impl ContentNode {
    pub fn folder(id: u64, name: impl Into<String>, children: Vec<ContentNode>) -> Self {
        Self {
            id,
            kind: NodeKind::Folder,
            name: name.into(),
            children,
            description: None,
            href: None,
            thumbnail_href: None,
            runtime: None,
        }
    }

    pub fn file(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            kind: NodeKind::File,
            name: name.into(),
            children: Vec::new(),
            description: None,
            href: None,
            thumbnail_href: None,
            runtime: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    pub fn with_thumbnail(mut self, href: impl Into<String>) -> Self {
        self.thumbnail_href = Some(href.into());
        self
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    /// Depth-first, pre-order visit of this node and its descendants.
    /// `depth` is 0 for `self`.
    pub fn walk<F>(&self, visit: &mut F)
    where
        F: FnMut(&ContentNode, usize),
    {
        self.walk_at(0, visit);
    }

    fn walk_at<F>(&self, depth: usize, visit: &mut F)
    where
        F: FnMut(&ContentNode, usize),
    {
        visit(self, depth);
        for child in &self.children {
            child.walk_at(depth + 1, visit);
        }
    }

    /// This node or a descendant with `id`.
    pub fn find(&self, id: u64) -> Option<&ContentNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Largest id in this subtree.
    pub fn max_id(&self) -> u64 {
        self.children
            .iter()
            .map(ContentNode::max_id)
            .fold(self.id, u64::max)
    }

    /// Number of files in this subtree.
    pub fn file_count(&self) -> usize {
        let own = usize::from(self.is_file());
        own + self.children.iter().map(ContentNode::file_count).sum::<usize>()
    }
}
