use time::OffsetDateTime;

use super::uri::Uri;

/// Bookkeeping attached to a stored node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeMeta {
    pub author: Option<String>,
    pub message: Option<String>,
    pub modified_at: Option<OffsetDateTime>,
    pub published_at: Option<OffsetDateTime>,
    pub is_published: bool,
}

impl NodeMeta {
    pub fn authored(author: Option<String>, message: Option<String>) -> Self {
        Self {
            author,
            message,
            ..Self::default()
        }
    }
}

/// Snapshot of a node at a revision-bound address.
///
/// `meta` is only known when the node was read from the durable store; cache
/// hits carry no metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub uri: Uri,
    pub content: Option<String>,
    pub meta: Option<NodeMeta>,
}

impl Node {
    pub fn new(uri: Uri, content: Option<String>, meta: NodeMeta) -> Self {
        Self {
            uri,
            content,
            meta: Some(meta),
        }
    }
}

/// One row of a revision listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionEntry {
    pub uri: Uri,
    pub is_published: bool,
}

/// Raw data and rendered content of a node read straight from the durable store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedNode {
    pub uri: Uri,
    pub data: Option<String>,
    pub content: Option<String>,
    pub meta: NodeMeta,
}
