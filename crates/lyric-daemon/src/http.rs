use crate::ingest::{Attachment, IngestionPipeline};
use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, FromRequest, Multipart, Query, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::Json,
    routing::get,
    Form, Router,
};
use lyric_proto::protocol::{Ack, Health, Snapshot, FIELD_COVER};
use lyric_proto::state::SnapshotStore;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Cover images can be far larger than axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct HttpState {
    pub pipeline: IngestionPipeline,
    pub store: SnapshotStore,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/nowplaying", get(now_playing).post(now_playing))
        .route("/api/state", get(get_state))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn start_server(bind_address: String, state: HttpState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(state);

        let listener = match TcpListener::bind(&bind_address).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", bind_address, e);
                return;
            }
        };

        info!("HTTP server listening on http://{}", bind_address);

        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn health() -> Json<Health> {
    Json(Health {
        ok: true,
        ts: chrono::Utc::now().to_rfc3339(),
    })
}

async fn get_state(State(state): State<HttpState>) -> Json<Snapshot> {
    Json(state.store.get().await)
}

/// Accepts fields from the query string, a url-encoded form or a multipart
/// form.  Query values win when a key appears in both.
async fn now_playing(
    State(state): State<HttpState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Query(query): Query<HashMap<String, String>>,
    request: Request,
) -> (StatusCode, Json<Ack>) {
    let source_addr = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default();

    let (mut fields, attachment) = read_body(request).await;
    fields.extend(query);

    match state.pipeline.accept(fields, attachment, source_addr).await {
        Ok(()) => (StatusCode::OK, Json(Ack { ok: true })),
        Err(e) => {
            error!("HTTP: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, Json(Ack { ok: false }))
        }
    }
}

async fn read_body(request: Request) -> (HashMap<String, String>, Option<Attachment>) {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        match Multipart::from_request(request, &()).await {
            Ok(multipart) => read_multipart(multipart).await,
            Err(e) => {
                warn!("HTTP: bad multipart request: {}", e);
                (HashMap::new(), None)
            }
        }
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        match Form::<HashMap<String, String>>::from_request(request, &()).await {
            Ok(Form(fields)) => (fields, None),
            Err(e) => {
                warn!("HTTP: bad form body: {}", e);
                (HashMap::new(), None)
            }
        }
    } else {
        (HashMap::new(), None)
    }
}

/// Keeps whatever was read before a malformed part.
async fn read_multipart(mut multipart: Multipart) -> (HashMap<String, String>, Option<Attachment>) {
    let mut fields = HashMap::new();
    let mut attachment = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("HTTP: multipart read error: {}", e);
                break;
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        if name == FIELD_COVER {
            match field.bytes().await {
                Ok(bytes) => {
                    attachment = Some(Attachment {
                        field: name,
                        bytes: bytes.to_vec(),
                    })
                }
                Err(e) => warn!("HTTP: failed to read cover part: {}", e),
            }
        } else {
            match field.text().await {
                Ok(text) => {
                    fields.insert(name, text);
                }
                Err(e) => warn!("HTTP: failed to read field {:?}: {}", name, e),
            }
        }
    }

    (fields, attachment)
}
