//! Credential store endpoints.
//!
//! Uploading places operator-supplied files in the session's credential
//! directory. Deleting the directory is how an operator permanently stops a
//! session from reconnecting.

use axum::extract::{Multipart, Path, State};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use hd_domain::{session_key, Error};

use crate::api::ApiError;
use crate::state::AppState;

/// `POST /v1/sessions/:key/credentials` (multipart). Every file field is
/// stored under its base name.
pub async fn upload_credentials(
    State(state): State<AppState>,
    Path(key): Path<String>,
    mut multipart: Multipart,
) -> Response {
    if let Err(e) = session_key::validate(&key) {
        return ApiError(e).into_response();
    }

    let store = &state.registry.context().credentials;
    let mut stored = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return (e.status(), Json(json!({ "error": e.body_text() }))).into_response()
            }
        };
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                return (e.status(), Json(json!({ "error": e.body_text() }))).into_response()
            }
        };
        let task_store = store.clone();
        let owned_key = key.clone();
        let written = tokio::task::spawn_blocking(move || {
            task_store.store_upload(&owned_key, &file_name, &bytes)
        })
        .await
        .unwrap_or_else(|e| Err(join_failed(e)));
        match written {
            Ok(name) => stored.push(name),
            Err(e) => return ApiError(e).into_response(),
        }
    }

    if stored.is_empty() {
        return ApiError(Error::ConfigInvalid(
            "no file fields in upload".into(),
        ))
        .into_response();
    }

    state
        .registry
        .logs()
        .append(&key, format!("Credential files uploaded: {}", stored.join(", ")));
    Json(json!({ "key": key, "stored": stored })).into_response()
}

/// `DELETE /v1/sessions/:key/credentials`.
pub async fn remove_credentials(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.registry.context().credentials.clone();
    let owned_key = key.clone();
    let removed = tokio::task::spawn_blocking(move || store.remove(&owned_key))
        .await
        .unwrap_or_else(|e| Err(join_failed(e)))?;
    if removed {
        state
            .registry
            .logs()
            .append(&key, "Credential store removed by operator.");
    }
    Ok(Json(json!({ "key": key, "removed": removed })))
}

fn join_failed(e: tokio::task::JoinError) -> Error {
    Error::Other(format!("credential store task failed: {e}"))
}
