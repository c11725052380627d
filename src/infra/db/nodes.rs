use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::application::repos::{NodeStore, RepoError};
use crate::domain::node::{Node, NodeMeta, RevisionEntry};
use crate::domain::uri::{DEFAULT_EXTENSION, Revision, Uri};

use super::PostgresNodeStore;
use super::util::{map_sqlx_error, revision_to_db};

const NODE_COLUMNS: &str = "n.scheme, n.language, n.path, n.name, n.extension, n.revision, \
    n.content, n.author, n.message, n.modified_at, n.published_at, \
    COALESCE(n.revision IS NOT NULL AND n.revision = ( \
        SELECT MAX(m.revision) FROM djedi_nodes m WHERE m.family = n.family \
    ), FALSE) AS is_published";

const ADDRESS_COLUMNS: &str = "scheme, language, path, name, extension, revision";

#[derive(sqlx::FromRow)]
struct AddressRow {
    scheme: String,
    language: String,
    path: String,
    name: String,
    extension: String,
    revision: Option<i32>,
}

impl AddressRow {
    fn uri(self) -> Result<Uri, RepoError> {
        let revision = match self.revision {
            None => Revision::Draft,
            Some(number) => u32::try_from(number)
                .ok()
                .and_then(Revision::published)
                .ok_or_else(|| {
                    RepoError::from_persistence(format!("stored revision {number} is not positive"))
                })?,
        };
        let uri = Uri::new(self.path, self.name).map_err(RepoError::from_persistence)?;
        Ok(uri
            .with_scheme(Some(&self.scheme))
            .with_language(Some(&self.language))
            .with_extension(Some(&self.extension))
            .with_revision(Some(revision)))
    }
}

#[derive(sqlx::FromRow)]
struct NodeRow {
    #[sqlx(flatten)]
    address: AddressRow,
    content: String,
    author: Option<String>,
    message: Option<String>,
    modified_at: Option<OffsetDateTime>,
    published_at: Option<OffsetDateTime>,
    is_published: bool,
}

impl TryFrom<NodeRow> for Node {
    type Error = RepoError;

    fn try_from(row: NodeRow) -> Result<Self, Self::Error> {
        let meta = NodeMeta {
            author: row.author,
            message: row.message,
            modified_at: row.modified_at,
            published_at: row.published_at,
            is_published: row.is_published,
        };
        Ok(Node::new(row.address.uri()?, Some(row.content), meta))
    }
}

#[derive(sqlx::FromRow)]
struct OrderedNodeRow {
    ordinal: i32,
    #[sqlx(flatten)]
    node: NodeRow,
}

/// Push `<columns> FROM ... WHERE ...` selecting the node `uri` addresses.
fn push_node_selection(qb: &mut QueryBuilder<'_, Postgres>, uri: &Uri) -> Result<(), RepoError> {
    qb.push(NODE_COLUMNS)
        .push(" FROM djedi_nodes n WHERE n.family = ")
        .push_bind(uri.family_key());
    match uri.revision() {
        None => {
            qb.push(" AND n.revision IS NOT NULL ORDER BY n.revision DESC LIMIT 1");
        }
        Some(Revision::Draft) => {
            qb.push(" AND n.revision IS NULL");
        }
        Some(Revision::Published(number)) => {
            qb.push(" AND n.revision = ")
                .push_bind(revision_to_db(number.get())?);
        }
    }
    Ok(())
}

fn resolved_parts(uri: &Uri) -> Result<(&str, &str), RepoError> {
    match (uri.scheme(), uri.language()) {
        (Some(scheme), Some(language)) => Ok((scheme, language)),
        _ => Err(RepoError::invalid_input(format!(
            "`{uri}` lacks scheme or language"
        ))),
    }
}

#[async_trait]
impl NodeStore for PostgresNodeStore {
    async fn get(&self, uri: &Uri) -> Result<Node, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        push_node_selection(&mut qb, uri)?;

        let row = qb
            .build_query_as::<NodeRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.ok_or(RepoError::NotFound)?.try_into()
    }

    async fn get_many(&self, uris: &[Uri]) -> Result<Vec<Option<Node>>, RepoError> {
        let mut nodes: Vec<Option<Node>> = vec![None; uris.len()];
        if uris.is_empty() {
            return Ok(nodes);
        }

        let mut qb = QueryBuilder::<Postgres>::new("");
        for (index, uri) in uris.iter().enumerate() {
            if index > 0 {
                qb.push(" UNION ALL ");
            }
            let ordinal = i32::try_from(index)
                .map_err(|_| RepoError::invalid_input("too many nodes requested"))?;
            qb.push("(SELECT ").push_bind(ordinal).push(" AS ordinal, ");
            push_node_selection(&mut qb, uri)?;
            qb.push(")");
        }

        let rows = qb
            .build_query_as::<OrderedNodeRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        for row in rows {
            let slot = usize::try_from(row.ordinal)
                .ok()
                .and_then(|index| nodes.get_mut(index))
                .ok_or_else(|| RepoError::from_persistence("row ordinal out of range"))?;
            *slot = Some(Node::try_from(row.node)?);
        }
        Ok(nodes)
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
        let content =
            content.ok_or_else(|| RepoError::invalid_input(format!("no content given for `{uri}`")))?;
        let (scheme, language) = resolved_parts(uri)?;
        let db_revision = match revision {
            Revision::Draft => None,
            Revision::Published(number) => Some(revision_to_db(number.get())?),
        };

        sqlx::query(
            r#"
            INSERT INTO djedi_nodes (
                family, scheme, language, path, name, extension, revision,
                content, author, message, modified_at, published_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(uri.family_key())
        .bind(scheme)
        .bind(language)
        .bind(uri.path())
        .bind(uri.name())
        .bind(uri.extension().unwrap_or(DEFAULT_EXTENSION))
        .bind(db_revision)
        .bind(content)
        .bind(meta.author.as_deref())
        .bind(meta.message.as_deref())
        .bind(meta.modified_at)
        .bind(meta.published_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        self.get(uri).await
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
        let content =
            content.ok_or_else(|| RepoError::invalid_input(format!("no content given for `{uri}`")))?;

        let result = sqlx::query(
            r#"
            UPDATE djedi_nodes
            SET extension = $2, content = $3, author = $4, message = $5, modified_at = $6
            WHERE family = $1 AND revision IS NULL
            "#,
        )
        .bind(uri.family_key())
        .bind(uri.extension().unwrap_or(DEFAULT_EXTENSION))
        .bind(content)
        .bind(meta.author.as_deref())
        .bind(meta.message.as_deref())
        .bind(meta.modified_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        self.get(uri).await
    }

    async fn publish(&self, uri: &Uri, published_at: OffsetDateTime) -> Result<Node, RepoError> {
        let family = uri.family_key();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        // Locking the draft row serializes concurrent publishes of the family.
        let draft_id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM djedi_nodes WHERE family = $1 AND revision IS NULL FOR UPDATE",
        )
        .bind(&family)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        let latest =
            sqlx::query_scalar::<_, Option<i32>>("SELECT MAX(revision) FROM djedi_nodes WHERE family = $1")
                .bind(&family)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        let latest = latest
            .map(u32::try_from)
            .transpose()
            .map_err(RepoError::from_persistence)?;

        let revision = Revision::next_after(latest);
        let number = revision
            .number()
            .ok_or_else(|| RepoError::from_persistence("next revision is not numbered"))?;

        sqlx::query("UPDATE djedi_nodes SET revision = $2, published_at = $3 WHERE id = $1")
            .bind(draft_id)
            .bind(revision_to_db(number)?)
            .bind(published_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        push_node_selection(&mut qb, &uri.with_revision(Some(revision)))?;
        let row = qb
            .build_query_as::<NodeRow>()
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        row.try_into()
    }

    async fn delete(&self, uri: &Uri) -> Result<Vec<Uri>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM djedi_nodes WHERE family = ");
        qb.push_bind(uri.family_key());
        match uri.revision() {
            None => {}
            Some(Revision::Draft) => {
                qb.push(" AND revision IS NULL");
            }
            Some(Revision::Published(number)) => {
                qb.push(" AND revision = ")
                    .push_bind(revision_to_db(number.get())?);
            }
        }
        qb.push(" RETURNING ").push(ADDRESS_COLUMNS);

        let rows = qb
            .build_query_as::<AddressRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        if rows.is_empty() {
            return Err(RepoError::NotFound);
        }

        let mut removed = rows
            .into_iter()
            .map(AddressRow::uri)
            .collect::<Result<Vec<_>, _>>()?;
        removed.sort_by_key(Uri::revision);
        Ok(removed)
    }

    async fn list_revisions(&self, uri: &Uri) -> Result<Vec<RevisionEntry>, RepoError> {
        let rows = sqlx::query_as::<_, AddressRow>(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM djedi_nodes WHERE family = $1 \
             ORDER BY revision ASC NULLS LAST"
        ))
        .bind(uri.family_key())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let uris = rows
            .into_iter()
            .map(AddressRow::uri)
            .collect::<Result<Vec<_>, _>>()?;
        let latest = uris
            .iter()
            .filter_map(|uri| uri.revision().and_then(Revision::number))
            .max();

        Ok(uris
            .into_iter()
            .map(|uri| {
                let number = uri.revision().and_then(Revision::number);
                RevisionEntry {
                    is_published: number.is_some() && number == latest,
                    uri,
                }
            })
            .collect())
    }
}
