//! Node API handlers.
//!
//! Every `{uri}` segment is a single percent-encoded node address, e.g.
//! `i18n%3A%2F%2Fsv-se%40page%2Ftitle.md%23draft`.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::storage::StorageError;
use crate::domain::uri::{DEFAULT_EXTENSION, Uri};

use super::error::ApiError;
use super::models::*;
use super::state::ApiState;

pub async fn get_node(
    State(state): State<ApiState>,
    Path(uri): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let node = state
        .storage
        .get(&uri, false)
        .await?
        .ok_or_else(|| ApiError::not_found("Node not found", Some(uri)))?;

    Ok(Json(node_to_api(node)))
}

pub async fn set_node(
    State(state): State<ApiState>,
    Path(uri): Path<String>,
    payload: Result<Json<SetNodeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload
        .map_err(|rejection| ApiError::bad_request("Invalid body", Some(rejection.body_text())))?;

    // Writes must name their language; the default is only for reads.
    let parsed = Uri::parse(&uri).map_err(|err| ApiError::from(StorageError::from(err)))?;
    if parsed.language().is_none() {
        return Err(ApiError::bad_request("Node uri lacks a language", Some(uri)));
    }

    let node = state
        .storage
        .set(
            &uri,
            Some(&request.data),
            set_meta_from_api(request.meta),
            false,
        )
        .await?;

    Ok(Json(node_with_meta_to_api(node)))
}

pub async fn delete_node(
    State(state): State<ApiState>,
    Path(uri): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.storage.delete(&uri).await?;
    Ok(StatusCode::OK)
}

pub async fn publish_node(
    State(state): State<ApiState>,
    Path(uri): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let node = state.storage.publish(&uri).await?;
    Ok(Json(node_to_api(node)))
}

pub async fn list_revisions(
    State(state): State<ApiState>,
    Path(uri): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let revisions = state.storage.revisions(&uri).await?;
    Ok(Json(
        revisions
            .into_iter()
            .map(revision_to_api)
            .collect::<Vec<_>>(),
    ))
}

pub async fn load_node(
    State(state): State<ApiState>,
    Path(uri): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let loaded = state.storage.load(&uri).await?;
    Ok(Json(loaded_to_api(loaded)))
}

pub async fn render(
    State(state): State<ApiState>,
    Path(ext): Path<String>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload
        .map_err(|rejection| ApiError::bad_request("Invalid body", Some(rejection.body_text())))?;
    let rendered = state.storage.render(&ext, &request.data)?;
    Ok(rendered)
}

/// Bulk lookup; the posted value stands in for nodes that are not stored.
pub async fn get_nodes(
    State(state): State<ApiState>,
    payload: Result<Json<NodesRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload
        .map_err(|rejection| ApiError::bad_request("Invalid body", Some(rejection.body_text())))?;

    let uris: Vec<&str> = request.keys().map(String::as_str).collect();
    let nodes = state.storage.get_many(&uris, false).await?;

    // Found nodes answer under their full address; misses under the
    // requested address, with the posted default rendered for its extension.
    let mut response = NodesResponse::new();
    for ((raw, default), node) in request.iter().zip(nodes) {
        match node {
            Some(node) => {
                response.insert(node.uri.to_string(), node.content);
            }
            None => {
                let uri = state.storage.resolve(raw)?;
                let ext = uri.extension().unwrap_or(DEFAULT_EXTENSION);
                let content = default
                    .as_deref()
                    .map(|data| state.storage.plugins().render_or_raw(ext, data));
                response.insert(uri.to_string(), content);
            }
        }
    }

    Ok(Json(response))
}
