//! HTTP server assembly: state, router, layers, lifecycle.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::routing::{get, post, put};
use axum::{body::Body, middleware, Router};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug_span, info, warn, Span};
use ulid::Ulid;

use crate::auth::{password::hash_password, Role};
use crate::store::types::{AppSettings, GuestMode};
use crate::store::Store;

pub mod csrf;
pub mod error;
pub mod handlers;
pub mod permissions;
pub mod session;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

/// Server options resolved from the command line and environment.
#[derive(Debug, Clone)]
pub struct Options {
    /// Directory being shared.
    pub root_dir: PathBuf,
    /// Where the database lives.
    pub data_dir: PathBuf,
    pub port: u16,
    /// Listen address, e.g. `0.0.0.0` or `[::]`.
    pub bind: String,
    /// URL prefix when served behind a path-rewriting proxy, e.g. `/files`.
    pub base_path: String,
    /// Externally reachable origin used when printing share URLs.
    pub external_url: Option<String>,
    /// Authentication switch; disabled means every visitor is an admin.
    pub auth_enabled: bool,
    /// Startup override for the stored guest mode setting.
    pub guest_mode: Option<GuestMode>,
    /// Startup override for the stored read-only flag.
    pub read_only: bool,
    /// Whether TLS terminates in front of us; controls the Secure cookie flag.
    pub tls: bool,
    /// Bootstrap admin credentials, applied once at startup.
    pub admin_user: Option<String>,
    pub admin_password: Option<SecretString>,
}

#[derive(Clone)]
pub struct App {
    pub opts: Arc<Options>,
    pub store: Store,
    /// Canonicalized share root; every sandbox resolution starts here.
    pub root: PathBuf,
}

impl App {
    /// Settings snapshot for this request: stored values with the startup
    /// overrides applied on top. Never cached across requests.
    pub async fn effective_settings(&self) -> Result<AppSettings, crate::store::StoreError> {
        let mut settings = self.store.app_settings().await?;
        if let Some(mode) = self.opts.guest_mode {
            settings.guest_mode = mode;
        }
        if self.opts.read_only {
            settings.read_only = true;
        }
        Ok(settings)
    }

    /// Cookie scope: the configured base path, or the whole origin.
    #[must_use]
    pub fn cookie_path(&self) -> &str {
        if self.opts.base_path.is_empty() {
            "/"
        } else {
            &self.opts.base_path
        }
    }

    /// Absolute URL for a server-relative path, used when handing share
    /// links back to the client.
    #[must_use]
    pub fn absolute_url(&self, path: &str) -> String {
        let origin = self.opts.external_url.clone().unwrap_or_else(|| {
            let scheme = if self.opts.tls { "https" } else { "http" };
            format!("{scheme}://localhost:{}", self.opts.port)
        });
        let origin = origin.trim_end_matches('/');
        let base = self.opts.base_path.trim_end_matches('/');
        format!("{origin}{base}{path}")
    }
}

fn api_router(app: App) -> Router {
    let router = Router::new()
        .route("/health", get(handlers::health::health).options(handlers::health::health))
        .route("/api/me", get(handlers::auth::me))
        .route("/api/login", post(handlers::auth::login))
        .route("/api/logout", post(handlers::auth::logout))
        .route("/api/list", get(handlers::files::list))
        .route("/api/download", get(handlers::files::download))
        .route("/api/upload", post(handlers::files::upload))
        .route("/api/delete", post(handlers::files::delete))
        .route("/api/rename", post(handlers::files::rename))
        .route("/api/share/create", post(handlers::share::create))
        .route("/api/share/revoke", post(handlers::share::revoke))
        .route(
            "/api/admin/settings",
            get(handlers::admin::get_settings).put(handlers::admin::update_settings),
        )
        .route(
            "/api/admin/users",
            get(handlers::admin::list_users).post(handlers::admin::create_user),
        )
        .route(
            "/api/admin/users/password",
            put(handlers::admin::set_password),
        )
        .route(
            "/api/admin/users/disable",
            post(handlers::admin::set_disabled),
        )
        .route("/api/admin/users/delete", post(handlers::admin::delete_user))
        .route("/api/admin/links", get(handlers::admin::list_links))
        .route("/api/admin/audit", get(handlers::admin::list_audit))
        .route("/s/:token", get(handlers::share::serve))
        .route("/s/:token/upload", post(handlers::share::upload))
        // Upload ceilings are enforced while streaming, against the
        // current settings, not by a static body limit.
        .layer(DefaultBodyLimit::disable())
        // Session resolution is the outer layer so the CSRF gate can read
        // the session extension.
        .layer(middleware::from_fn(csrf::middleware))
        .layer(middleware::from_fn_with_state(
            app.clone(),
            session::middleware,
        ))
        .with_state(app);

    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &Request<Body>| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span)),
    )
}

/// Start the server and block until shutdown.
pub async fn new(opts: Options) -> Result<()> {
    let root = opts
        .root_dir
        .canonicalize()
        .with_context(|| format!("share root {} not accessible", opts.root_dir.display()))?;

    let store = Store::open(&opts.data_dir).await?;
    let app = App {
        opts: Arc::new(opts),
        store,
        root,
    };

    bootstrap_admin(&app).await?;

    // Expired sessions are also dropped lazily on lookup; this keeps the
    // table from accumulating rows for clients that never return.
    let purge_store = app.store.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            ticker.tick().await;
            if let Err(e) = purge_store.purge_expired_sessions().await {
                warn!("session purge failed: {e}");
            }
        }
    });

    let bind = app.opts.bind.clone();
    let port = app.opts.port;
    let base_path = app.opts.base_path.clone();
    let share_url = app.absolute_url("/");
    let router = api_router(app);
    let router = if base_path.is_empty() {
        router
    } else {
        Router::new().nest_service(&base_path, router)
    };

    let listener = TcpListener::bind(format!("{bind}:{port}")).await?;

    info!("Listening on {bind}:{port}");
    info!("Sharing at {share_url}");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

/// Create the bootstrap admin account on first start, and warn loudly when
/// authentication is on but no active admin exists.
async fn bootstrap_admin(app: &App) -> Result<()> {
    if let (Some(username), Some(password)) = (&app.opts.admin_user, &app.opts.admin_password) {
        if app.store.get_user_by_username(username).await?.is_none() {
            let hash = hash_password(password.expose_secret())?;
            app.store.create_user(username, &hash, Role::Admin).await?;
            info!("created bootstrap admin account {username}");
        }
    }
    if app.opts.auth_enabled && app.store.admin_count().await? == 0 {
        warn!("authentication is enabled but no active admin account exists");
    }
    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, ?headers, request_id)
}
