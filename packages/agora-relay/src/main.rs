//! Agora Relay Server
//!
//! HTTP + WebSocket front end for the governance engine:
//!
//! 1. **Command surface**: REST endpoints under `/api` for community
//!    lifecycle, membership, moderation toggles, appeals and reports. Each
//!    call returns the committed community snapshot or an error payload.
//!
//! 2. **Real-time sync**: clients register over `/ws`, subscribe to
//!    `community:<id>` or `communities`, and receive every committed
//!    snapshot in version order.
//!
//! 3. **Notifications**: appeal decisions and auto-bans are pushed to the
//!    affected user, or queued until they next connect.

mod api;
mod handler;
mod protocol;
mod state;

use axum::{
    extract::{State, WebSocketUpgrade},
    http::Method,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use clap::Parser;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use agora_core::EngineConfig;
use state::{RelayConfig, RelayState};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "agora-relay", version, about = "Agora community governance relay")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "RELAY_PORT")]
    port: u16,

    /// Open reports against one user that trigger an automatic ban (0 disables)
    #[arg(long, default_value_t = agora_core::config::DEFAULT_AUTO_BAN_THRESHOLD, env = "AUTO_BAN_THRESHOLD")]
    auto_ban_threshold: usize,

    /// Maximum appeal description length in characters
    #[arg(long, default_value_t = agora_core::config::DEFAULT_MAX_APPEAL_LENGTH, env = "MAX_APPEAL_LENGTH")]
    max_appeal_length: usize,

    /// Maximum report reason length in characters
    #[arg(long, default_value_t = agora_core::config::DEFAULT_MAX_REPORT_REASON_LENGTH, env = "MAX_REPORT_REASON_LENGTH")]
    max_report_reason_length: usize,

    /// Queued commands per community before callers wait
    #[arg(long, default_value_t = agora_core::config::DEFAULT_MAILBOX_CAPACITY, env = "MAILBOX_CAPACITY")]
    mailbox_capacity: usize,

    /// Buffered updates per channel before slow subscribers skip ahead
    #[arg(long, default_value_t = agora_core::config::DEFAULT_CHANNEL_CAPACITY, env = "CHANNEL_CAPACITY")]
    channel_capacity: usize,

    /// Users counted as premium (comma-separated)
    #[arg(long, env = "PREMIUM_USERS", value_delimiter = ',')]
    premium_users: Vec<String>,

    /// Queued notifications kept per offline user (0 disables queueing)
    #[arg(long, default_value_t = 100, env = "MAX_PENDING_NOTIFICATIONS")]
    max_pending_notifications: usize,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> RelayConfig {
        RelayConfig {
            port: self.port,
            engine: EngineConfig {
                auto_ban_threshold: self.auto_ban_threshold,
                max_appeal_length: self.max_appeal_length,
                max_report_reason_length: self.max_report_reason_length,
                mailbox_capacity: self.mailbox_capacity,
                channel_capacity: self.channel_capacity,
            },
            premium_users: self
                .premium_users
                .into_iter()
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect(),
            max_pending_notifications: self.max_pending_notifications,
        }
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "agora_relay=info,agora_core=info,tower_http=info".into());
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = args.into_config();
    tracing::info!(
        auto_ban_threshold = config.engine.auto_ban_threshold,
        premium_users = config.premium_users.len(),
        "Engine configured"
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let state = RelayState::new(config);
    let app = app(state);

    tracing::info!("Agora relay server starting on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = addr.as_str(), error = %e, "Failed to bind address");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Build the full router over `state`.
fn app(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .merge(api::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// WebSocket upgrade handler for client connections.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handler::handle_websocket(socket, state))
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "agora-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

/// Statistics endpoint.
async fn stats_handler(State(state): State<RelayState>) -> impl IntoResponse {
    Json(json!({
        "online_clients": state.online_count(),
        "communities": state.engine.community_count(),
        "open_channels": state.engine.bus().channel_count(),
        "active_mailboxes": state.engine.active_mailboxes(),
        "pending_notifications": state.pending_notification_count(),
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(RelayState::new(RelayConfig::default()));
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "agora-relay");
    }

    #[tokio::test]
    async fn test_stats_reflect_engine() {
        let state = RelayState::new(RelayConfig::default());
        state
            .engine
            .create_community("alice", "Rust", "", agora_core::Visibility::Public)
            .unwrap();

        let (status, body) = get_json(app(state), "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["communities"], 1);
        assert_eq!(body["online_clients"], 0);
        assert_eq!(body["pending_notifications"], 0);
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.engine.auto_ban_threshold, 3);
        assert_eq!(config.max_pending_notifications, 100);
    }

    #[test]
    fn test_args_parse_premium_users() {
        let args = Args::parse_from([
            "agora-relay",
            "--auto-ban-threshold",
            "5",
            "--premium-users",
            "alice, bob,",
        ]);
        let config = args.into_config();
        assert_eq!(config.engine.auto_ban_threshold, 5);
        assert_eq!(config.premium_users, vec!["alice", "bob"]);
    }
}
