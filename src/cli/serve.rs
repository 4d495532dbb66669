use relql::error::{RelqlError, Result};
use relql::session::{DataFusionSession, SessionHandle};
use relql::{Metamodel, SchemaBuilder};
use axum::{routing::get, routing::post, Router};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
struct AppState {
    schema: Arc<async_graphql::dynamic::Schema>,
    session: DataFusionSession,
}

/// Run the serve command to start the GraphQL server
pub async fn run(config_path: String, port: u16) -> Result<()> {
    tracing::info!("📖 Loading configuration from {}", config_path);

    let config = relql::config::load_config(&config_path)?;

    // Use provided port or default from config
    let server_port = if port != 4000 { port } else { config.server.port };
    let bind: IpAddr = config.server.bind.parse().map_err(|e| {
        RelqlError::Config(format!("Invalid bind address '{}': {}", config.server.bind, e))
    })?;

    let model = Arc::new(Metamodel::from_config(&config)?);

    let session = DataFusionSession::new();
    for table in &config.tables {
        tracing::info!("   Registering {} from {}", table.name, table.storage_location);
        session
            .register_table_from_path(&table.name, &table.storage_location)
            .await?;
    }

    tracing::info!("🔧 Building GraphQL schema for {} entities...", config.entities.len());
    let schema = SchemaBuilder::new(model).build_schema(None)?;

    tracing::info!("✅ Schema built successfully");
    tracing::info!("🚀 GraphQL server running on http://localhost:{}", server_port);
    tracing::info!("📊 Playground: http://localhost:{}/graphql", server_port);
    tracing::info!("💡 Press Ctrl+C to stop the server");

    let state = AppState {
        schema: Arc::new(schema),
        session,
    };
    start_http_server(state, SocketAddr::new(bind, server_port)).await
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/graphql", post(graphql_handler).get(graphql_playground))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn start_http_server(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        RelqlError::Config(format!(
            "Failed to bind to {}: {}. Port may be in use.",
            addr, e
        ))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| RelqlError::Config(format!("Server error: {}", e)))?;

    Ok(())
}

/// Each request runs in its own session scope, dropped with the request
async fn graphql_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::Json(request): axum::Json<async_graphql::Request>,
) -> axum::Json<async_graphql::Response> {
    let scope: SessionHandle = Arc::new(state.session.scope());
    axum::Json(state.schema.execute(request.data(scope)).await)
}

async fn graphql_playground() -> axum::response::Html<String> {
    axum::response::Html(async_graphql::http::playground_source(
        async_graphql::http::GraphQLPlaygroundConfig::new("/graphql"),
    ))
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn library_state() -> AppState {
        let config = crate::cli::example::create_example_config(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/demos/data"
        ));
        let session = DataFusionSession::new();
        for table in &config.tables {
            session
                .register_table_from_path(&table.name, &table.storage_location)
                .await
                .unwrap();
        }
        let model = Arc::new(Metamodel::from_config(&config).unwrap());
        AppState {
            schema: Arc::new(SchemaBuilder::new(model).build_schema(None).unwrap()),
            session,
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = router(library_state().await);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_graphql_request_runs_in_a_request_scope() {
        let _ = tracing_subscriber::fmt::try_init();
        let app = router(library_state().await);

        let body = serde_json::json!({
            "query": "{ Author(name: [\"Jane Austen\"]) { name books(orderBy: ASC) { title } } }"
        });
        let response = app
            .oneshot(
                Request::post("/graphql")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            json["data"]["Author"][0]["books"],
            serde_json::json!([{ "title": "Emma" }, { "title": "Persuasion" }])
        );
    }
}
