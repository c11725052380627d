//! Request and response payloads for the djedi node API.
//!
//! Node addresses travel as strings (`i18n://sv-se@page/title.md#1`); the
//! server owns parsing and normalization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Node metadata as exposed over the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetaBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub modified_at: Option<OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub published_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
}

impl NodeMetaBody {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A resolved node: revision-bound uri plus rendered content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResponse {
    pub uri: String,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<NodeMetaBody>,
}

/// Raw and rendered view of a node, as returned by the load endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadResponse {
    pub uri: String,
    pub data: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub meta: NodeMetaBody,
}

/// Body for writing a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetNodeRequest {
    pub data: String,
    #[serde(default)]
    pub meta: SetNodeMeta,
}

/// Author-supplied metadata accepted on write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetNodeMeta {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body for rendering arbitrary content through a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub data: String,
}

/// One entry of a revision listing: `[uri, is_published]`.
pub type RevisionEntryBody = (String, bool);

/// Bulk lookup: requested uri → default content used when the node is missing.
pub type NodesRequest = BTreeMap<String, Option<String>>;

/// Bulk lookup result: resolved uri → rendered content.
pub type NodesResponse = BTreeMap<String, Option<String>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_meta_is_omitted_from_node_response() {
        let body = NodeResponse {
            uri: "i18n://sv-se@page/title.txt#1".to_string(),
            content: Some("Djedi".to_string()),
            meta: None,
        };

        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"uri": "i18n://sv-se@page/title.txt#1", "content": "Djedi"})
        );
    }

    #[test]
    fn set_request_rejects_unknown_fields() {
        let err = serde_json::from_str::<SetNodeRequest>(r#"{"data": "x", "extra": "foobar"}"#)
            .expect_err("unknown field");
        assert!(err.to_string().contains("extra"));
    }

    #[test]
    fn set_request_meta_is_optional() {
        let request: SetNodeRequest =
            serde_json::from_str(r##"{"data": "# Djedi"}"##).expect("deserialize");
        assert_eq!(request.data, "# Djedi");
        assert_eq!(request.meta, SetNodeMeta::default());
    }

    #[test]
    fn revision_entries_serialize_as_pairs() {
        let entries: Vec<RevisionEntryBody> = vec![
            ("i18n://sv-se@page/title.txt#1".to_string(), false),
            ("i18n://sv-se@page/title.txt#2".to_string(), true),
        ];
        let json = serde_json::to_string(&entries).expect("serialize");
        assert_eq!(
            json,
            r#"[["i18n://sv-se@page/title.txt#1",false],["i18n://sv-se@page/title.txt#2",true]]"#
        );
    }
}
