//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::node::{Node, NodeMeta, RevisionEntry};
use crate::domain::uri::Uri;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Durable node storage.
///
/// Every `uri` handed to a store is resolved (scheme and language present).
/// Revision-less addresses select the highest published revision, `#draft`
/// the draft slot and `#N` the exact revision. Extensions never take part in
/// lookups.
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn get(&self, uri: &Uri) -> Result<Node, RepoError>;

    /// One slot per requested address, `None` where nothing matched.
    async fn get_many(&self, uris: &[Uri]) -> Result<Vec<Option<Node>>, RepoError>;

    /// Insert a node into the slot named by `uri`'s revision.
    ///
    /// Fails with `InvalidInput` for absent content or a revision-less
    /// address, and with `Duplicate` when the slot is taken.
    async fn create(
        &self,
        uri: &Uri,
        content: Option<&str>,
        meta: &NodeMeta,
    ) -> Result<Node, RepoError>;

    /// Rewrite the draft slot. Published revisions are immutable.
    async fn update(
        &self,
        uri: &Uri,
        content: Option<&str>,
        meta: &NodeMeta,
    ) -> Result<Node, RepoError>;

    /// Move the family draft into the next published revision.
    ///
    /// Allocating the revision number and clearing the draft happen
    /// atomically per family.
    async fn publish(&self, uri: &Uri, published_at: OffsetDateTime) -> Result<Node, RepoError>;

    /// Remove the addressed slot, or the whole family for a revision-less
    /// address. Returns the removed addresses; removing nothing is `NotFound`.
    async fn delete(&self, uri: &Uri) -> Result<Vec<Uri>, RepoError>;

    /// Published revisions ascending, then the draft.
    async fn list_revisions(&self, uri: &Uri) -> Result<Vec<RevisionEntry>, RepoError>;
}
