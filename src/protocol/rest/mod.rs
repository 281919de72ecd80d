//! HTTP/REST API module.
//!
//! Builds the axum router and owns graceful shutdown. Every route
//! re-authenticates against the catalog per request (see [`crate::auth`]);
//! there is no session-token middleware to apply here.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod stream;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use crate::config::HttpConfig;
use crate::Handler;

use self::handlers::{admin, auth, chat, files, knowledge_base, retrieval, sessions, sql};

fn cors_layer(config: &HttpConfig) -> CorsLayer {
    let mut origins: Vec<axum::http::HeaderValue> = vec![
        axum::http::HeaderValue::from_static("http://localhost:5173"),
    ];
    for origin in &config.cors_origins {
        match origin.parse() {
            Ok(parsed) => origins.push(parsed),
            Err(_) => warn!(%origin, "invalid CORS origin ignored"),
        }
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Builds the full router. Every domain handler is mounted under `/api`.
pub fn create_router(handler: Arc<Handler>, config: &HttpConfig) -> Router {
    let api = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/delete_user", post(auth::delete_user))
        .route("/create_knowledge_base", post(knowledge_base::create_knowledge_base))
        .route("/delete_knowledge_base", post(knowledge_base::delete_knowledge_base))
        .route("/get_knowledge_base", post(knowledge_base::get_knowledge_base))
        .route("/add_file", post(files::add_file))
        .route("/delete_file", post(files::delete_file))
        .route("/get_knowledge_base_file_list", post(files::get_knowledge_base_file_list))
        .route("/get_file_content", get(files::get_file_content))
        .route("/get_local_file_content", get(files::get_local_file_content))
        .route("/get_local_file_content", post(files::post_local_file_content))
        .route("/query_milvus", post(retrieval::query_milvus))
        .route("/query_graph_neo4j", post(retrieval::query_graph_neo4j))
        .route("/execute_query", post(retrieval::execute_query))
        .route("/execute_stream_chat", post(chat::execute_stream_chat))
        .route("/chat", post(chat::chat))
        .route("/create_session", post(sessions::create_session))
        .route("/get_user_session_messages", post(sessions::get_user_session_messages))
        .route("/get_sessions_by_id", post(sessions::get_sessions_by_id))
        .route("/delete_sessions_by_session_id", post(sessions::delete_sessions_by_session_id))
        .route("/clear_chat_history", post(sessions::clear_chat_history))
        .route("/insert_sql_info", post(sql::insert_sql_info))
        .route("/update_sql_info", post(sql::update_sql_info))
        .route("/delete_sql_info", post(sql::delete_sql_info))
        .route("/get_sql_info_list", post(sql::get_sql_info_list))
        .route("/get_table_info", post(sql::get_table_info))
        .route("/insert_sql_rel", post(sql::insert_sql_rel))
        .route("/delete_sql_rel", post(sql::delete_sql_rel))
        .route("/delete_all_data", post(admin::delete_all_data))
        .route("/health", get(admin::health))
        .with_state(handler);

    Router::new().nest("/api", api).layer(cors_layer(config))
}

/// Starts the HTTP server with graceful shutdown on SIGINT/SIGTERM.
pub async fn start_http_server(
    handler: Arc<Handler>,
    config: &HttpConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(handler, config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(%addr, "http server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => { info!("received SIGINT, shutting down"); }
            _ = sigterm.recv() => { info!("received SIGTERM, shutting down"); }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for ctrl-c");
        info!("received SIGINT, shutting down");
    }
}
