//! Common test utilities for E2E tests

use std::net::SocketAddr;

use campusmarket::{AppState, config};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "market.test.example.com".to_string(),
                protocol: "https".to_string(),
            },
            database: config::DatabaseConfig {
                path: db_path.clone(),
            },
            auth: config::AuthConfig {
                session_secret: "test-secret-key-32-bytes-long!!!".to_string(),
                session_max_age: 604800,
            },
            admin: config::AdminConfig {
                username: "moderator".to_string(),
            },
            notifications: config::NotificationConfig::default(),
            chat: config::ChatConfig {
                idle_grace_seconds: 0,
                ..config::ChatConfig::default()
            },
            views: config::ViewConfig::default(),
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config.clone()).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        // Build router
        let app = campusmarket::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Create a signed token for a marketplace user
    pub fn create_token(&self, user_id: &str, username: &str) -> String {
        self.token_with_role(user_id, username, "user")
    }

    /// Create a signed token carrying the admin role
    pub fn create_admin_token(&self, user_id: &str) -> String {
        self.token_with_role(user_id, "moderator", campusmarket::auth::ADMIN_ROLE)
    }

    fn token_with_role(&self, user_id: &str, username: &str, role: &str) -> String {
        use campusmarket::auth::{Session, create_session_token};

        let session = Session::new(
            user_id,
            username,
            role,
            self.state.config.auth.session_max_age,
        );

        // Generate token using the session secret from config
        create_session_token(&session, &self.state.config.auth.session_secret)
            .expect("Failed to create test token")
    }

    /// Open (or fetch) the conversation between two users
    pub async fn open_conversation(&self, token: &str, other_user_id: &str) -> serde_json::Value {
        let response = self
            .client
            .post(self.url("/api/v1/conversations"))
            .bearer_auth(token)
            .json(&serde_json::json!({ "participant_ids": [other_user_id] }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        response.json().await.unwrap()
    }

    /// Send a chat message and return the stored message
    pub async fn send_message(
        &self,
        token: &str,
        conversation_id: &str,
        content: &str,
    ) -> serde_json::Value {
        let response = self
            .client
            .post(self.url(&format!(
                "/api/v1/conversations/{}/messages",
                conversation_id
            )))
            .bearer_auth(token)
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        response.json().await.unwrap()
    }

    /// Publish a post and return it
    pub async fn create_post(&self, token: &str, content: &str) -> serde_json::Value {
        let response = self
            .client
            .post(self.url("/api/v1/posts"))
            .bearer_auth(token)
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        response.json().await.unwrap()
    }

    /// Comment on a post and return the comment
    pub async fn comment(&self, token: &str, post_id: &str, text: &str) -> serde_json::Value {
        let response = self
            .client
            .post(self.url(&format!("/api/v1/posts/{}/comments", post_id)))
            .bearer_auth(token)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        response.json().await.unwrap()
    }
}
