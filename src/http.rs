use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use thiserror::Error;
use tokio::{net::TcpListener, sync::watch};
use tokio_util::sync::CancellationToken;

use crate::{
    reading::Reading,
    sampler::SamplerStatus,
    sensor::{Sensor, SensorError},
    store::{LogFiles, StoreError},
};

pub struct AppState {
    pub sensor: Sensor,
    pub files: LogFiles,
    pub status: watch::Receiver<SamplerStatus>,
    pub redirect_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        log::error!("Request failed: {self}");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/temp", get(latest))
        .route("/temp/all", get(all))
        .route("/status", get(status))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn root(State(state): State<Arc<AppState>>) -> Response {
    match &state.redirect_url {
        Some(url) => Redirect::temporary(url).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn latest(State(state): State<Arc<AppState>>) -> Result<Json<Reading>, ResponseError> {
    let reading = state.sensor.read().await?;
    Ok(Json(reading))
}

async fn all(State(state): State<Arc<AppState>>) -> Result<Response, ResponseError> {
    let data = state.files.read_raw().await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], data).into_response())
}

async fn status(State(state): State<Arc<AppState>>) -> Json<SamplerStatus> {
    Json(state.status.borrow().clone())
}
