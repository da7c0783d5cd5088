use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    routing::{get, post, put},
    Json,
};
use chrono::Utc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{self, Identity},
    buzz::{self, Deps, Normalized},
    conf::{self, Conf},
    data::{ProfileStore, Storage},
    docs::ApiDoc,
    error::ApiError,
    llm::{OpenAi, TextGenerator},
    quota,
    types::{BuzzifyReq, BuzzifyResp, ProfileView, SaveApiKeyReq},
};


const MAX_BODY_SIZE: usize = 1024 * 1024; // 1MB limit

const DB_FILE: &str = "data/data.db";

#[derive(Clone)]
pub struct AppState {
    pub conf: Arc<Conf>,
    pub store: Arc<dyn ProfileStore>,
    pub generator: Arc<dyn TextGenerator>,
}

impl AppState {
    fn deps(&self) -> Deps<'_> {
        Deps {
            store: self.store.as_ref(),
            generator: self.generator.as_ref(),
            pooled_api_key: &self.conf.llm.api_key,
            free_requests_per_day: self.conf.quota.free_requests_per_day,
        }
    }
}

#[tracing::instrument(name = "server", skip_all)]
pub async fn run() -> anyhow::Result<()> {
    let conf = conf::global();
    let dir = std::env::current_dir()?;
    tracing::info!(?dir, ?conf, "Starting.");
    if conf.llm.api_key.is_empty() {
        tracing::warn!(
            env = conf::LLM_API_KEY_ENV,
            "No pooled LLM API key configured. Free requests will fail."
        );
    }
    let addr = SocketAddr::from((conf.addr, conf.port));

    let busy_timeout = Duration::from_secs_f32(conf.sqlite_busy_timeout);
    let storage = Storage::connect(DB_FILE, busy_timeout)
        .await
        .context(DB_FILE)?;
    let generator =
        OpenAi::new(&conf.llm).context("Failed to build LLM client")?;
    let state = AppState {
        conf: conf.clone(),
        store: Arc::new(storage),
        generator: Arc::new(generator),
    };
    let service =
        router(state).into_make_service_with_connect_info::<SocketAddr>();

    match &conf.tls {
        None => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::warn!(?addr, "Listening unencrypted.");
            axum::serve(listener, service).await?;
        }
        Some(conf::Tls {
            cert_file,
            key_file,
        }) => {
            // XXX One MUST do this manual init of rustls provider when using
            //     more than a single dep which itself depends on rustls.
            //     Here we using 2:
            //     - axum_server
            //     - reqwest
            rustls::crypto::aws_lc_rs::default_provider()
                .install_default()
                .map_err(|crypto_provider| {
                    anyhow!(
                        "Failed to install default crypto provider: \
                        {crypto_provider:?}"
                    )
                })?;

            let config =
                axum_server::tls_rustls::RustlsConfig::from_pem_file(
                    cert_file, key_file,
                )
                .await
                .context(format!(
                    "Failed to construct RustlsConfig. \
                    cert_file={cert_file:?}, key_file={key_file:?}"
                ))?;

            tracing::info!(
                ?addr,
                ?cert_file,
                ?key_file,
                "Listening with TLS."
            );
            axum_server::bind_rustls(addr, config)
                .serve(service)
                .await?;
        }
    }

    Ok(())
}

pub fn router(state: AppState) -> axum::Router {
    let cors = cors(&state.conf.cors_origins);
    axum::Router::new()
        .route("/health", get(health_check))
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .route("/api/buzzify", post(handle_buzzify))
        .route("/api/profile", get(handle_profile))
        .route("/api/profile/api-key", put(handle_save_api_key))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(cors)
        .route_layer(middleware::from_fn(req_id_layer))
        .with_state(state)
}

fn cors(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin
                .parse()
                .inspect_err(|error| {
                    tracing::warn!(?origin, ?error, "Ignoring CORS origin.");
                })
                .ok()
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::ORIGIN,
        ])
        .allow_credentials(true)
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_LENGTH])
}

#[tracing::instrument(skip_all, fields(req_id = %req_id()))]
#[utoipa::path(
    post,
    path = "/api/buzzify",
    request_body = BuzzifyReq,
    responses(
        (status = 200, description = "Text rewritten", body = BuzzifyResp),
        (status = 400, description = "Missing text, free requests exhausted without an API key, or invalid caller API key", body = crate::error::ErrorResponse),
        (status = 401, description = "No bearer token or session cookie resolved to a user", body = crate::error::ErrorResponse),
        (status = 500, description = "Profile store or text generation failure, including a rejected pooled key", body = crate::error::ErrorResponse),
    ),
    security(
        ("jwt" = []),
        ("session_cookie" = [])
    )
)]
pub async fn handle_buzzify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<BuzzifyResp>, ApiError> {
    let req: BuzzifyReq = parse_body(&body)?;
    let text = buzz::validate_text(&req.text)?;
    let identity = identify(&headers, &state.conf)?;
    let resp = buzz::buzzify(
        &state.deps(),
        &identity,
        text,
        req.api_key.as_deref(),
        req.length.unwrap_or_default(),
        Utc::now(),
    )
    .await?;
    Ok(Json(resp))
}

#[tracing::instrument(skip_all, fields(req_id = %req_id()))]
#[utoipa::path(
    get,
    path = "/api/profile",
    responses(
        (status = 200, description = "Quota state of the caller", body = ProfileView),
        (status = 401, description = "No bearer token or session cookie resolved to a user", body = crate::error::ErrorResponse),
        (status = 500, description = "Profile store failure", body = crate::error::ErrorResponse),
    ),
    security(
        ("jwt" = []),
        ("session_cookie" = [])
    )
)]
pub async fn handle_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ProfileView>, ApiError> {
    let identity = identify(&headers, &state.conf)?;
    let now = Utc::now();
    let Normalized {
        profile,
        effective_usage,
    } = buzz::load_profile(state.store.as_ref(), &identity, now).await?;
    let limit = state.conf.quota.free_requests_per_day;
    Ok(Json(ProfileView {
        id: profile.id,
        email: profile.email,
        has_api_key: profile.api_key.is_some_and(|key| !key.is_empty()),
        free_requests_used: effective_usage.min(limit),
        free_requests_remaining: quota::remaining(effective_usage, limit),
        free_requests_limit: limit,
        resets_at: quota::next_window_start_at(now),
    }))
}

#[tracing::instrument(skip_all, fields(req_id = %req_id()))]
#[utoipa::path(
    put,
    path = "/api/profile/api-key",
    request_body = SaveApiKeyReq,
    responses(
        (status = 204, description = "Saved, or cleared when empty"),
        (status = 400, description = "Malformed body", body = crate::error::ErrorResponse),
        (status = 401, description = "No bearer token or session cookie resolved to a user", body = crate::error::ErrorResponse),
        (status = 500, description = "Profile store failure", body = crate::error::ErrorResponse),
    ),
    security(
        ("jwt" = []),
        ("session_cookie" = [])
    )
)]
pub async fn handle_save_api_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let identity = identify(&headers, &state.conf)?;
    let req: SaveApiKeyReq = parse_body(&body)?;
    buzz::load_profile(state.store.as_ref(), &identity, Utc::now()).await?;
    let api_key = req
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty());
    tracing::info!(cleared = api_key.is_none(), "Saving API key.");
    state.store.save_api_key(&identity.uid, api_key).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn health_check() -> &'static str {
    "OK"
}

fn identify(headers: &HeaderMap, conf: &Conf) -> Result<Identity, ApiError> {
    auth::resolve(headers, conf).ok_or(ApiError::Unauthenticated)
}

fn parse_body<T: serde::de::DeserializeOwned>(
    body: &[u8],
) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|error| {
        tracing::warn!(?error, "Failed to parse request body");
        ApiError::InvalidInput(format!("Invalid request body: {error}"))
    })
}

#[derive(Debug, Clone)]
struct ReqId {
    pub req_id: String,
}

impl ReqId {
    fn new() -> Self {
        let req_id = cuid2::create_id();
        Self { req_id }
    }
}

tokio::task_local! {
    static REQ_ID: ReqId;
}

fn req_id() -> String {
    REQ_ID
        .try_with(|ReqId { req_id }| req_id.clone())
        .unwrap_or_default()
}

async fn req_id_layer(req: Request, next: Next) -> axum::response::Response {
    REQ_ID.scope(ReqId::new(), next.run(req)).await
}
