//! Conversions between engine values and API payloads.

pub use djedi_api_types::{
    LoadResponse, NodeMetaBody, NodeResponse, NodesRequest, NodesResponse, RenderRequest,
    RevisionEntryBody, SetNodeMeta, SetNodeRequest,
};

use crate::domain::node::{LoadedNode, Node, NodeMeta, RevisionEntry};

pub fn meta_to_api(meta: &NodeMeta) -> NodeMetaBody {
    NodeMetaBody {
        author: meta.author.clone(),
        message: meta.message.clone(),
        modified_at: meta.modified_at,
        published_at: meta.published_at,
        is_published: Some(meta.is_published),
    }
}

pub fn node_to_api(node: Node) -> NodeResponse {
    NodeResponse {
        uri: node.uri.to_string(),
        content: node.content,
        meta: None,
    }
}

pub fn node_with_meta_to_api(node: Node) -> NodeResponse {
    let meta = node.meta.as_ref().map(meta_to_api);
    NodeResponse {
        meta,
        ..node_to_api(node)
    }
}

/// A node that was never stored loads with an empty meta object.
pub fn loaded_to_api(loaded: LoadedNode) -> LoadResponse {
    let meta = if loaded.data.is_none() && loaded.meta == NodeMeta::default() {
        NodeMetaBody::default()
    } else {
        meta_to_api(&loaded.meta)
    };
    LoadResponse {
        uri: loaded.uri.to_string(),
        data: loaded.data,
        content: loaded.content,
        meta,
    }
}

pub fn revision_to_api(entry: RevisionEntry) -> RevisionEntryBody {
    (entry.uri.to_string(), entry.is_published)
}

pub fn set_meta_from_api(meta: SetNodeMeta) -> NodeMeta {
    NodeMeta::authored(meta.author, meta.message)
}
