//! Node storage engine.
//!
//! Orchestrates reads and writes across the node cache and the durable
//! store. Writes always land in the family draft; publishing moves the draft
//! into the next numbered revision. Reads go through the cache and fall back
//! to the store on a miss, repopulating the cache with what was found.
//! Not-found results are never cached.

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, instrument};

use crate::application::render::PluginRegistry;
use crate::application::repos::{NodeStore, RepoError};
use crate::cache::NodeCache;
use crate::domain::error::UriError;
use crate::domain::node::{LoadedNode, Node, NodeMeta, RevisionEntry};
use crate::domain::uri::{Revision, Uri, UriDefaults};

const SOURCE: &str = "application::storage::NodeStorage";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    MalformedUri(#[from] UriError),
    #[error("node `{uri}` does not exist")]
    NodeDoesNotExist { uri: String },
    #[error("persistence error: {message}")]
    Persistence { message: String },
    #[error("no render plugin for extension `{ext}`")]
    UnknownPlugin { ext: String },
}

impl StorageError {
    fn from_repo(uri: &Uri, err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::NodeDoesNotExist {
                uri: uri.to_string(),
            },
            other => Self::Persistence {
                message: other.to_string(),
            },
        }
    }
}

#[derive(Clone)]
pub struct NodeStorage {
    store: Arc<dyn NodeStore>,
    cache: NodeCache,
    plugins: PluginRegistry,
    defaults: UriDefaults,
    warm_on_publish: bool,
}

impl NodeStorage {
    pub fn new(store: Arc<dyn NodeStore>, cache: NodeCache) -> Self {
        Self {
            store,
            cache,
            plugins: PluginRegistry::with_defaults(),
            defaults: UriDefaults::default(),
            warm_on_publish: true,
        }
    }

    pub fn with_defaults(mut self, defaults: UriDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_warm_on_publish(mut self, warm_on_publish: bool) -> Self {
        self.warm_on_publish = warm_on_publish;
        self
    }

    pub fn defaults(&self) -> &UriDefaults {
        &self.defaults
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Parse `raw` and fill in the default scheme and language.
    pub fn resolve(&self, raw: &str) -> Result<Uri, StorageError> {
        Ok(Uri::parse(raw)?.resolve(&self.defaults))
    }

    /// Write `content` to the family draft, publishing it when `publish` is set.
    ///
    /// Any revision fragment on `uri` is ignored; the draft takes the
    /// address's extension, or the default one.
    #[instrument(skip(self, content, meta))]
    pub async fn set(
        &self,
        uri: &str,
        content: Option<&str>,
        meta: NodeMeta,
        publish: bool,
    ) -> Result<Node, StorageError> {
        let draft_uri = self
            .resolve(uri)?
            .with_default_extension(&self.defaults.extension)
            .with_revision(Some(Revision::Draft));
        let meta = NodeMeta {
            modified_at: Some(OffsetDateTime::now_utc()),
            published_at: None,
            is_published: false,
            ..meta
        };

        let draft = match self.store.update(&draft_uri, content, &meta).await {
            Ok(node) => node,
            Err(RepoError::NotFound) => self
                .store
                .create(&draft_uri, content, &meta)
                .await
                .map_err(|err| StorageError::from_repo(&draft_uri, err))?,
            Err(err) => return Err(StorageError::from_repo(&draft_uri, err)),
        };
        self.cache.delete(&draft_uri.cache_key());

        info!(target: SOURCE, uri = %draft.uri, "draft saved");

        if publish {
            return self.publish_draft(&draft_uri).await;
        }
        Ok(draft)
    }

    /// Publish the family draft as the next numbered revision.
    #[instrument(skip(self))]
    pub async fn publish(&self, uri: &str) -> Result<Node, StorageError> {
        let uri = self.resolve(uri)?;
        if let Some(Revision::Published(_)) = uri.revision() {
            return Err(StorageError::NodeDoesNotExist {
                uri: uri.to_string(),
            });
        }
        self.publish_draft(&uri.with_revision(Some(Revision::Draft)))
            .await
    }

    async fn publish_draft(&self, draft_uri: &Uri) -> Result<Node, StorageError> {
        let node = self
            .store
            .publish(draft_uri, OffsetDateTime::now_utc())
            .await
            .map_err(|err| StorageError::from_repo(draft_uri, err))?;

        let latest_key = node.uri.with_revision(None).cache_key();
        self.cache.delete_many(&[
            draft_uri.cache_key(),
            node.uri.cache_key(),
            latest_key.clone(),
        ]);
        if self.warm_on_publish {
            self.cache.set(&latest_key, &node);
        }

        info!(target: SOURCE, uri = %node.uri, "node published");
        Ok(node)
    }

    /// Look up a node; `Ok(None)` when nothing is stored at the address.
    ///
    /// With `lazy` unset the content is rendered through the plugin for the
    /// node's extension.
    #[instrument(skip(self))]
    pub async fn get(&self, uri: &str, lazy: bool) -> Result<Option<Node>, StorageError> {
        let uri = self.resolve(uri)?;
        let key = uri.cache_key();

        let node = match self.cache.get(&key) {
            Some(node) => {
                debug!(target: SOURCE, key = %key, "cache hit");
                Some(node)
            }
            None => match self.store.get(&uri).await {
                Ok(node) => {
                    self.cache.set(&key, &node);
                    Some(node)
                }
                Err(RepoError::NotFound) => None,
                Err(err) => return Err(StorageError::from_repo(&uri, err)),
            },
        };

        Ok(node.map(|node| self.finish(node, lazy)))
    }

    /// Look up several nodes with one cache read, one store read for the
    /// misses and one cache write for the misses that were found.
    ///
    /// Results line up with `uris`.
    #[instrument(skip(self, uris), fields(count = uris.len()))]
    pub async fn get_many(
        &self,
        uris: &[&str],
        lazy: bool,
    ) -> Result<Vec<Option<Node>>, StorageError> {
        let resolved = uris
            .iter()
            .map(|raw| self.resolve(raw))
            .collect::<Result<Vec<_>, _>>()?;
        let keys: Vec<String> = resolved.iter().map(Uri::cache_key).collect();

        let mut cached = self.cache.get_many(&keys);
        let mut nodes: Vec<Option<Node>> = keys.iter().map(|key| cached.remove(key)).collect();

        let missing: Vec<usize> = (0..nodes.len()).filter(|&i| nodes[i].is_none()).collect();
        if !missing.is_empty() {
            let lookups: Vec<Uri> = missing.iter().map(|&i| resolved[i].clone()).collect();
            let found = self
                .store
                .get_many(&lookups)
                .await
                .map_err(|err| StorageError::Persistence {
                    message: err.to_string(),
                })?;

            for (&index, node) in missing.iter().zip(found) {
                nodes[index] = node;
            }
            self.cache.set_many(
                missing
                    .iter()
                    .filter_map(|&i| nodes[i].as_ref().map(|node| (keys[i].clone(), node))),
            );
            debug!(
                target: SOURCE,
                requested = keys.len(),
                missed = missing.len(),
                "cache misses resolved from store"
            );
        }

        Ok(nodes
            .into_iter()
            .map(|node| node.map(|node| self.finish(node, lazy)))
            .collect())
    }

    /// Remove the addressed revision, or the whole family when `uri` carries
    /// no revision. Returns the removed addresses.
    #[instrument(skip(self))]
    pub async fn delete(&self, uri: &str) -> Result<Vec<Uri>, StorageError> {
        let uri = self.resolve(uri)?;
        let removed = self
            .store
            .delete(&uri)
            .await
            .map_err(|err| StorageError::from_repo(&uri, err))?;

        let mut keys: Vec<String> = removed.iter().map(Uri::cache_key).collect();
        keys.push(uri.with_revision(None).cache_key());
        keys.sort();
        keys.dedup();
        self.cache.delete_many(&keys);

        info!(target: SOURCE, uri = %uri, removed = removed.len(), "node deleted");
        Ok(removed)
    }

    /// Every stored revision of the family, oldest first, draft last.
    #[instrument(skip(self))]
    pub async fn revisions(&self, uri: &str) -> Result<Vec<RevisionEntry>, StorageError> {
        let uri = self.resolve(uri)?;
        self.store
            .list_revisions(&uri)
            .await
            .map_err(|err| StorageError::from_repo(&uri, err))
    }

    /// Read a node straight from the store, bypassing the cache.
    ///
    /// A missing node loads as the requested address with the default
    /// extension and no data.
    #[instrument(skip(self))]
    pub async fn load(&self, uri: &str) -> Result<LoadedNode, StorageError> {
        let uri = self.resolve(uri)?;
        match self.store.get(&uri).await {
            Ok(node) => {
                let ext = node
                    .uri
                    .extension()
                    .unwrap_or(&self.defaults.extension)
                    .to_string();
                let content = node
                    .content
                    .as_deref()
                    .map(|data| self.plugins.render_or_raw(&ext, data));
                Ok(LoadedNode {
                    uri: node.uri,
                    data: node.content,
                    content,
                    meta: node.meta.unwrap_or_default(),
                })
            }
            Err(RepoError::NotFound) => Ok(LoadedNode {
                uri: uri.with_default_extension(&self.defaults.extension),
                data: None,
                content: None,
                meta: NodeMeta::default(),
            }),
            Err(err) => Err(StorageError::from_repo(&uri, err)),
        }
    }

    pub fn render(&self, ext: &str, data: &str) -> Result<String, StorageError> {
        self.plugins
            .render(ext, data)
            .ok_or_else(|| StorageError::UnknownPlugin {
                ext: ext.to_string(),
            })
    }

    /// Flush every cached node.
    pub fn clear_cache(&self) {
        self.cache.clear();
        info!(target: SOURCE, "node cache cleared");
    }

    fn finish(&self, node: Node, lazy: bool) -> Node {
        if lazy {
            node
        } else {
            self.plugins.render_node(node)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_node_does_not_exist() {
        let uri = Uri::parse("i18n://sv-se@page/title#draft").expect("uri");
        let err = StorageError::from_repo(&uri, RepoError::NotFound);
        assert!(matches!(
            err,
            StorageError::NodeDoesNotExist { ref uri } if uri == "i18n://sv-se@page/title#draft"
        ));
    }

    #[test]
    fn other_repo_errors_map_to_persistence() {
        let uri = Uri::parse("i18n://sv-se@page/title#1").expect("uri");
        for err in [
            RepoError::invalid_input("content must not be empty"),
            RepoError::Duplicate {
                constraint: "djedi_nodes_revision_key".to_string(),
            },
            RepoError::Timeout,
        ] {
            assert!(matches!(
                StorageError::from_repo(&uri, err),
                StorageError::Persistence { .. }
            ));
        }
    }
}
