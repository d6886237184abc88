//! HTTP surface: the public contact endpoint, health check and admin API.

pub mod admin;
pub mod contact;
pub mod error;
pub mod rate_limit;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;
use zeroize::Zeroizing;

use crate::config::Config;
use crate::crypto::envelope::EnvelopeCipher;
use crate::crypto::integrity::hkdf_expand;
use crate::notify::Notifier;
use crate::session::SessionStore;
use crate::store::{StoreError, SubmissionStore};
use crate::StartupError;

use error::AppError;
use rate_limit::{RateLimitConfig, RateLimiter};

const BODY_LIMIT_BYTES: usize = 32 * 1024;
const CONTACT_REQUESTS_PER_WINDOW: u32 = 5;
const LOGIN_REQUESTS_PER_WINDOW: u32 = 10;
const IP_PEPPER_SALT: &[u8] = b"contact-backend/ip-hash";
const IP_PEPPER_LEN: usize = 32;

pub struct AppState {
    pub store: Arc<SubmissionStore>,
    pub sessions: SessionStore,
    pub admin_password_hash: String,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub ip_pepper: Zeroizing<Vec<u8>>,
    pub trust_proxy: bool,
    pub allowed_origins: Vec<String>,
    pub contact_limiter: RateLimiter,
    pub login_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: &Config, notifier: Option<Arc<dyn Notifier>>) -> Result<Arc<Self>, StartupError> {
        let secret = config.encryption_secret.as_bytes();
        let cipher = EnvelopeCipher::from_secret(&config.encryption_secret)?;
        let store = SubmissionStore::open(&config.data_dir, cipher, config.retention_days)?;
        let ip_pepper = hkdf_expand(secret, IP_PEPPER_SALT, b"ip-pepper", IP_PEPPER_LEN)?;

        Ok(Arc::new(Self {
            store: Arc::new(store),
            sessions: SessionStore::new(chrono::Duration::minutes(config.session_ttl_minutes)),
            admin_password_hash: config.admin_password_hash.clone(),
            notifier,
            ip_pepper: Zeroizing::new(ip_pepper),
            trust_proxy: config.trust_proxy,
            allowed_origins: config.allowed_origins.clone(),
            contact_limiter: RateLimiter::new(RateLimitConfig::per_fifteen_minutes(
                CONTACT_REQUESTS_PER_WINDOW,
            )),
            login_limiter: RateLimiter::new(RateLimitConfig::per_fifteen_minutes(
                LOGIN_REQUESTS_PER_WINDOW,
            )),
        }))
    }
}

/// Runs a store operation on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let contact = Router::new()
        .route("/api/contact", post(contact::submit))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_contact,
        ));

    let login = Router::new()
        .route("/api/admin/login", post(admin::login))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_login,
        ));

    let admin = Router::new()
        .route("/api/admin/logout", post(admin::logout))
        .route("/api/admin/submissions", get(admin::list_submissions))
        .route(
            "/api/admin/submissions/{id}",
            get(admin::get_submission).delete(admin::delete_submission),
        )
        .route("/api/admin/gdpr/export", post(admin::export_by_email))
        .route("/api/admin/gdpr/erase", post(admin::erase_by_email));

    Router::new()
        .route("/api/health", get(contact::health))
        .merge(contact)
        .merge(login)
        .merge(admin)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.allowed_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {origin:?}: {e}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60))
}

/// Serves the router until `shutdown` resolves. Connection info is kept so
/// handlers can see the client address.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
