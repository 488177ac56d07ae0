//! The HTTP face of the store: a two-route axum router over one shared
//! [`Db`]. All engine calls go through `spawn_blocking` because `put` blocks
//! on the writer thread's reply and `get` does synchronous disk reads.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use engine::{Db, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Body of a successful `GET /db/{key}` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetResponse {
    pub key: String,
    pub value: String,
}

/// Body of a `POST /db/{key}` request.
#[derive(Debug, Serialize, Deserialize)]
pub struct PutRequest {
    pub value: String,
}

/// Builds the application router.
pub fn router(db: Arc<Db>) -> Router {
    Router::new()
        .route("/db/{key}", get(get_value).post(put_value))
        .with_state(db)
}

async fn get_value(
    State(db): State<Arc<Db>>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>, StatusCode> {
    debug!(%key, "get request");

    let lookup = {
        let db = Arc::clone(&db);
        let key = key.clone();
        tokio::task::spawn_blocking(move || db.get(&key)).await
    };

    match lookup {
        Ok(Ok(value)) => Ok(Json(GetResponse { key, value })),
        Ok(Err(StoreError::NotFound)) => Err(StatusCode::NOT_FOUND),
        Ok(Err(err)) => {
            warn!(%key, error = %err, "get failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(err) => {
            warn!(%key, error = %err, "get task failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn put_value(
    State(db): State<Arc<Db>>,
    Path(key): Path<String>,
    body: Result<Json<PutRequest>, JsonRejection>,
) -> StatusCode {
    debug!(%key, "put request");

    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(%key, error = %rejection, "malformed put body");
            return StatusCode::BAD_REQUEST;
        }
    };

    let write = {
        let db = Arc::clone(&db);
        let key = key.clone();
        tokio::task::spawn_blocking(move || db.put(&key, &request.value)).await
    };

    match write {
        Ok(Ok(())) => StatusCode::OK,
        Ok(Err(err)) => {
            warn!(%key, error = %err, "put failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(err) => {
            warn!(%key, error = %err, "put task failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
