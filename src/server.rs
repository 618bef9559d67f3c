// src/server.rs

//! Server-sent-events transport for discovery runs.
//!
//! Every `/api/stream` request launches and owns its own browser.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use async_stream::stream;
use axum::extract::{Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};

use crate::error::{AppError, Result};
use crate::models::{Config, Event, FilterCriteria, SearchRequest, split_tags};
use crate::pipeline::DiscoveryPipeline;
use crate::session::{BrowsingSession, ChromeSession, SessionContext};
use crate::utils::pacing::Pacer;

/// Shared, read-only server state.
pub struct AppState {
    pub config: Arc<Config>,
    /// Directory relative paths in the config resolve against
    pub base_dir: PathBuf,
}

/// Query parameters of `/api/stream`. Numbers arrive as text; anything
/// unparseable falls back to the configured default.
#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    #[serde(default)]
    pub tags: String,
    pub min_followers: Option<String>,
    pub max_followers: Option<String>,
    pub max_profiles: Option<String>,
    pub country: Option<String>,
}

impl StreamParams {
    pub fn into_request(self, config: &Config) -> SearchRequest {
        let defaults = FilterCriteria::from_config(config);
        let criteria = FilterCriteria {
            min_followers: parse_or(self.min_followers, defaults.min_followers),
            max_followers: parse_or(self.max_followers, defaults.max_followers),
            max_profiles: parse_or(self.max_profiles, defaults.max_profiles),
            location_hint: self
                .country
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
        };
        SearchRequest {
            tags: split_tags(&self.tags),
            criteria,
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Build the router with all endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/stream", get(stream_search))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port)
        .parse()
        .map_err(|e| AppError::config(format!("invalid server address: {e}")))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "OK", "mode": "SSE" }))
}

async fn stream_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
) -> Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>> {
    let request = params.into_request(&state.config);
    tracing::info!(
        tags = ?request.tags,
        min_followers = request.criteria.min_followers,
        max_followers = request.criteria.max_followers,
        max_profiles = request.criteria.max_profiles,
        "Stream requested"
    );

    let frames = search_events(state, request).map(|event| Ok(sse_frame(&event)));
    Sse::new(frames).keep_alive(KeepAlive::default())
}

/// Browser bootstrap followed by the pipeline's own events.
fn search_events(state: Arc<AppState>, request: SearchRequest) -> impl Stream<Item = Event> + Send {
    stream! {
        if request.tags.is_empty() {
            yield Event::error("No tags provided");
            return;
        }

        yield Event::log("Initializing browser...");
        let config = Arc::clone(&state.config);

        let mut session = match ChromeSession::launch(&config.browser).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(error = %e, "Browser launch failed");
                yield Event::error("Failed to start browser");
                return;
            }
        };

        let cookies = config.cookies_path(&state.base_dir);
        let mut pacer = Pacer::new(&config.pacing);
        let authenticated = match session
            .authenticate(&cookies, &config.browser.base_url, &mut pacer)
            .await
        {
            Ok(authenticated) => authenticated,
            Err(e) => {
                tracing::warn!(error = %e, cookies = %cookies.display(), "Authentication failed");
                false
            }
        };
        if !authenticated {
            if let Err(e) = session.shutdown().await {
                tracing::warn!(error = %e, "Browser shutdown failed");
            }
            yield Event::error("Login failed");
            return;
        }

        let context = SessionContext::authenticated(session);
        let events = DiscoveryPipeline::new(context, config).run(request);
        let mut events = Box::pin(events);
        while let Some(event) = events.next().await {
            yield event;
        }
    }
}

/// One SSE message carrying the event's JSON.
fn sse_frame(event: &Event) -> SseEvent {
    match event.to_json() {
        Ok(json) => SseEvent::default().data(json),
        Err(e) => {
            tracing::error!(error = %e, "Event serialization failed");
            SseEvent::default().data(json!({ "type": "error", "data": e.to_string() }).to_string())
        }
    }
}
