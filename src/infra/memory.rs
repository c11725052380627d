//! In-process node store.
//!
//! Keeps every family behind one lock, so publishing (revision allocation
//! plus draft removal) is atomic. Used for the `memory` storage backend and
//! throughout the test suite.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::application::repos::{NodeStore, RepoError};
use crate::domain::node::{Node, NodeMeta, RevisionEntry};
use crate::domain::uri::{DEFAULT_EXTENSION, Revision, Uri};

const DRAFT_CONSTRAINT: &str = "djedi_nodes_draft_key";
const REVISION_CONSTRAINT: &str = "djedi_nodes_revision_key";

#[derive(Debug, Clone)]
struct StoredNode {
    extension: String,
    content: Option<String>,
    meta: NodeMeta,
}

#[derive(Debug)]
struct Family {
    /// Family address without extension or revision.
    base: Uri,
    draft: Option<StoredNode>,
    published: BTreeMap<u32, StoredNode>,
}

impl Family {
    fn new(uri: &Uri) -> Self {
        Self {
            base: uri.with_extension(None).with_revision(None),
            draft: None,
            published: BTreeMap::new(),
        }
    }

    fn latest(&self) -> Option<u32> {
        self.published.keys().next_back().copied()
    }

    fn is_empty(&self) -> bool {
        self.draft.is_none() && self.published.is_empty()
    }

    fn address(&self, stored: &StoredNode, revision: Revision) -> Uri {
        self.base
            .with_extension(Some(&stored.extension))
            .with_revision(Some(revision))
    }

    fn node(&self, stored: &StoredNode, revision: Revision) -> Node {
        let mut meta = stored.meta.clone();
        meta.is_published = revision.number().is_some() && revision.number() == self.latest();
        Node::new(self.address(stored, revision), stored.content.clone(), meta)
    }

    fn lookup(&self, revision: Option<Revision>) -> Option<Node> {
        match revision {
            None => {
                let number = self.latest()?;
                let revision = Revision::published(number)?;
                self.published
                    .get(&number)
                    .map(|stored| self.node(stored, revision))
            }
            Some(Revision::Draft) => self
                .draft
                .as_ref()
                .map(|stored| self.node(stored, Revision::Draft)),
            Some(revision @ Revision::Published(number)) => self
                .published
                .get(&number.get())
                .map(|stored| self.node(stored, revision)),
        }
    }

    /// Every stored address, published ascending then the draft.
    fn addresses(&self) -> Vec<(Uri, Revision)> {
        let published = self.published.iter().filter_map(|(number, stored)| {
            let revision = Revision::published(*number)?;
            Some((self.address(stored, revision), revision))
        });
        let draft = self
            .draft
            .iter()
            .map(|stored| (self.address(stored, Revision::Draft), Revision::Draft));
        published.chain(draft).collect()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryNodeStore {
    families: RwLock<HashMap<String, Family>>,
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored families.
    pub async fn len(&self) -> usize {
        self.families.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn stored(uri: &Uri, content: Option<&str>, meta: &NodeMeta) -> Result<StoredNode, RepoError> {
    let content =
        content.ok_or_else(|| RepoError::invalid_input(format!("no content given for `{uri}`")))?;
    Ok(StoredNode {
        extension: uri.extension().unwrap_or(DEFAULT_EXTENSION).to_string(),
        content: Some(content.to_string()),
        meta: meta.clone(),
    })
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn get(&self, uri: &Uri) -> Result<Node, RepoError> {
        let families = self.families.read().await;
        families
            .get(&uri.family_key())
            .and_then(|family| family.lookup(uri.revision()))
            .ok_or(RepoError::NotFound)
    }

    async fn get_many(&self, uris: &[Uri]) -> Result<Vec<Option<Node>>, RepoError> {
        let families = self.families.read().await;
        Ok(uris
            .iter()
            .map(|uri| {
                families
                    .get(&uri.family_key())
                    .and_then(|family| family.lookup(uri.revision()))
            })
            .collect())
    }

    async fn create(
        &self,
        uri: &Uri,
        content: Option<&str>,
        meta: &NodeMeta,
    ) -> Result<Node, RepoError> {
        let revision = uri
            .revision()
            .ok_or_else(|| RepoError::invalid_input(format!("`{uri}` names no revision")))?;
        let node = stored(uri, content, meta)?;

        let mut families = self.families.write().await;
        let family = families
            .entry(uri.family_key())
            .or_insert_with(|| Family::new(uri));

        match revision {
            Revision::Draft => {
                if family.draft.is_some() {
                    return Err(RepoError::Duplicate {
                        constraint: DRAFT_CONSTRAINT.to_string(),
                    });
                }
                family.draft = Some(node);
            }
            Revision::Published(number) => {
                if family.published.contains_key(&number.get()) {
                    return Err(RepoError::Duplicate {
                        constraint: REVISION_CONSTRAINT.to_string(),
                    });
                }
                family.published.insert(number.get(), node);
            }
        }

        family.lookup(Some(revision)).ok_or(RepoError::NotFound)
    }

    async fn update(
        &self,
        uri: &Uri,
        content: Option<&str>,
        meta: &NodeMeta,
    ) -> Result<Node, RepoError> {
        if uri.revision() != Some(Revision::Draft) {
            return Err(RepoError::invalid_input(format!(
                "`{uri}` is not a draft; published revisions are immutable"
            )));
        }

        let mut families = self.families.write().await;
        let family = families
            .get_mut(&uri.family_key())
            .ok_or(RepoError::NotFound)?;
        let draft = family.draft.as_mut().ok_or(RepoError::NotFound)?;
        *draft = stored(uri, content, meta)?;

        family.lookup(Some(Revision::Draft)).ok_or(RepoError::NotFound)
    }

    async fn publish(&self, uri: &Uri, published_at: OffsetDateTime) -> Result<Node, RepoError> {
        let mut families = self.families.write().await;
        let family = families
            .get_mut(&uri.family_key())
            .ok_or(RepoError::NotFound)?;
        let mut draft = family.draft.take().ok_or(RepoError::NotFound)?;

        let revision = Revision::next_after(family.latest());
        let number = revision.number().ok_or(RepoError::NotFound)?;
        draft.meta.published_at = Some(published_at);
        family.published.insert(number, draft);

        family.lookup(Some(revision)).ok_or(RepoError::NotFound)
    }

    async fn delete(&self, uri: &Uri) -> Result<Vec<Uri>, RepoError> {
        let key = uri.family_key();
        let mut families = self.families.write().await;
        let family = families.get_mut(&key).ok_or(RepoError::NotFound)?;

        let removed = match uri.revision() {
            None => family
                .addresses()
                .into_iter()
                .map(|(address, _)| address)
                .collect(),
            Some(Revision::Draft) => family
                .draft
                .take()
                .map(|stored| vec![family.address(&stored, Revision::Draft)])
                .unwrap_or_default(),
            Some(revision @ Revision::Published(number)) => family
                .published
                .remove(&number.get())
                .map(|stored| vec![family.address(&stored, revision)])
                .unwrap_or_default(),
        };

        if uri.revision().is_none() || family.is_empty() {
            families.remove(&key);
        }
        if removed.is_empty() {
            return Err(RepoError::NotFound);
        }
        Ok(removed)
    }

    async fn list_revisions(&self, uri: &Uri) -> Result<Vec<RevisionEntry>, RepoError> {
        let families = self.families.read().await;
        let Some(family) = families.get(&uri.family_key()) else {
            return Ok(Vec::new());
        };
        let latest = family.latest();
        Ok(family
            .addresses()
            .into_iter()
            .map(|(uri, revision)| RevisionEntry {
                uri,
                is_published: revision.number().is_some() && revision.number() == latest,
            })
            .collect())
    }
}
