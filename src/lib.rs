//! CampusMarket - notification backbone of a campus second-hand marketplace
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Conversations, posts, notifications                      │
//! │  - SSE chat streams                                         │
//! │  - Admin API, metrics                                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Chat, posts, admin notifications                         │
//! │  - Notification aggregator, feed, poller                    │
//! │  - Per-conversation event registry                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! │  - In-memory view deduplication cache                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Business logic and the notification mechanism
//! - `client`: HTTP notification source and client session lifecycle
//! - `data`: Database and cache layer
//! - `auth`: Signed session tokens
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;

use std::sync::Arc;

/// JSON bodies are small; the largest field is a 5000 character post
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains
/// shared resources like the database pool, caches and services.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// View deduplication cache (volatile)
    pub views: Arc<data::ViewCache>,

    /// Per-conversation event brokers
    pub chat_events: Arc<service::ChatEventRegistry>,

    pub chat: Arc<service::ChatService>,
    pub posts: Arc<service::PostService>,
    pub notices: Arc<service::AdminNoticeService>,

    /// Notification source over the services above
    pub sources: Arc<service::DatabaseSource>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Initialize the view cache and chat registry
    /// 3. Wire services
    /// 4. Ensure the admin user exists
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        use std::path::Path;

        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = Arc::new(data::Database::connect(Path::new(&config.database.path)).await?);
        tracing::info!("Database connected");

        // 2. Volatile state
        let views = Arc::new(data::ViewCache::with_config(&config.views));
        let chat_events = Arc::new(service::ChatEventRegistry::new(&config.chat));
        tracing::info!(
            dedup_window_seconds = config.views.dedup_window_seconds,
            max_subscribers = config.chat.max_subscribers,
            "Caches initialized"
        );

        // 3. Services
        let chat = Arc::new(service::ChatService::new(db.clone(), chat_events.clone()));
        let posts = Arc::new(service::PostService::new(db.clone(), views.clone()));
        let notices = Arc::new(service::AdminNoticeService::new(db.clone()));
        let sources = Arc::new(service::DatabaseSource::new(
            chat.clone(),
            posts.clone(),
            notices.clone(),
        ));

        // 4. Admin user
        Self::ensure_admin_user(&db, &config).await?;

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            views,
            chat_events,
            chat,
            posts,
            notices,
            sources,
        })
    }

    /// Ensure the configured admin user exists with the admin role
    async fn ensure_admin_user(
        db: &data::Database,
        config: &config::AppConfig,
    ) -> Result<(), error::AppError> {
        if let Some(mut user) = db.get_user_by_username(&config.admin.username).await? {
            if user.role != auth::ADMIN_ROLE {
                user.role = auth::ADMIN_ROLE.to_string();
                db.upsert_user(&user).await?;
                tracing::info!(username = %user.username, "Admin role granted");
            } else {
                tracing::info!(username = %user.username, "Admin user exists");
            }
            return Ok(());
        }

        let user = data::User {
            id: data::EntityId::new().0,
            username: config.admin.username.clone(),
            role: auth::ADMIN_ROLE.to_string(),
            created_at: chrono::Utc::now(),
        };
        db.upsert_user(&user).await?;

        tracing::info!(username = %user.username, user_id = %user.id, "Admin user created");
        Ok(())
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{
        compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
    };

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api", api::api_router())
        .merge(api::metrics_router(state.clone()))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
