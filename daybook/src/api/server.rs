use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{admin, auth, routes, transfer};
use crate::Daybook;
use crate::Result;

#[derive(Clone)]
pub struct AppState {
    pub app: Arc<Daybook>,
    pub metrics: Option<PrometheusHandle>,
}

pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    pub fn new(app: Arc<Daybook>) -> Self {
        Self {
            state: AppState { app, metrics: None },
        }
    }

    /// Serve `/metrics` from an installed Prometheus recorder.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        if self.state.app.config.observability.metrics_enabled {
            self.state.metrics = Some(handle);
        }
        self
    }

    /// Build CORS layer from configuration. Refresh cookies need credentials,
    /// which browsers refuse with a wildcard origin.
    fn build_cors_layer(&self) -> CorsLayer {
        let cors_config = &self.state.app.config.server.cors;
        if !cors_config.enabled {
            return CorsLayer::new();
        }

        let has_wildcard = cors_config.origins.iter().any(|o| o == "*");
        let origins: Vec<HeaderValue> = cors_config
            .origins
            .iter()
            .filter(|o| *o != "*")
            .filter_map(|o| o.parse().ok())
            .collect();

        let methods = [
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ];
        let headers = [
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-csrf-token"),
        ];

        if has_wildcard {
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(methods)
                .allow_headers(headers)
        } else if origins.is_empty() {
            CorsLayer::new()
        } else {
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(methods)
                .allow_headers(headers)
                .allow_credentials(true)
        }
    }

    pub fn router(&self) -> Router {
        let state = self.state.clone();

        let auth_routes = Router::new()
            .route("/api/auth/register", post(auth::register))
            .route("/api/auth/login", post(auth::login))
            .route("/api/auth/refresh", post(auth::refresh))
            .route("/api/auth/logout", post(auth::logout))
            .route("/api/auth/me", get(auth::me));

        let workspace_routes = Router::new()
            .route("/api/workspace/items", get(routes::list_items).post(routes::create_item))
            .route("/api/workspace/items/recent", get(routes::recent_items))
            .route("/api/workspace/items/board", get(routes::board))
            .route(
                "/api/workspace/items/day-note",
                get(routes::get_day_note).put(routes::save_day_note),
            )
            .route(
                "/api/workspace/items/:id",
                get(routes::get_item)
                    .patch(routes::update_item)
                    .delete(routes::delete_item),
            )
            .route(
                "/api/content/:item_id/blocks",
                get(routes::get_blocks).put(routes::replace_blocks),
            )
            .route("/api/files/upload", post(routes::upload_file))
            .route("/api/files/item/:item_id", get(routes::list_files))
            .route("/files/:stored_name", get(routes::serve_file))
            .route("/api/tags", get(routes::list_tags).post(routes::create_tag));

        let transfer_routes = Router::new()
            .route("/api/backup/export", get(transfer::export_backup))
            .route("/api/backup/import", post(transfer::import_backup))
            .route("/api/migration/import", post(transfer::import_migration));

        let admin_routes = Router::new()
            .route("/api/admin/stats", get(admin::stats))
            .route("/api/admin/users", get(admin::users))
            .route("/api/admin/users/:user_id", delete(admin::delete_user))
            .route("/api/admin/users/:user_id/role", patch(admin::update_role))
            .route("/api/admin/users/:user_id/unlock", post(admin::unlock))
            .route("/api/admin/users/:user_id/items", get(admin::user_items))
            .route(
                "/api/admin/users/:user_id/items/:item_id",
                delete(admin::delete_item),
            )
            .route("/api/admin/users/:user_id/items/:item_id/blocks", get(admin::item_blocks))
            .route(
                "/api/admin/users/:user_id/items/:item_id/detail",
                get(admin::item_detail).put(admin::update_item_detail),
            );

        let cors = self.build_cors_layer();
        let body_limit = self.state.app.config.server.max_body_size;

        Router::new()
            .merge(auth_routes)
            .merge(workspace_routes)
            .merge(transfer_routes)
            .merge(admin_routes)
            .route("/health", get(health))
            .route("/metrics", get(render_metrics))
            .layer(middleware::from_fn(super::middleware::audit_middleware))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                super::middleware::auth_middleware,
            ))
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    pub async fn serve(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener (tests bind `127.0.0.1:0`).
    pub async fn serve_on(self, listener: tokio::net::TcpListener) -> Result<()> {
        axum::serve(
            listener,
            self.router().into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
