//! HTTP server setup.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::Request;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, Span, info};

use crate::error::{ServerError, ServerResult};
use crate::routes;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 4000,
            enable_cors: true,
        }
    }
}

pub struct LmsServer {
    config: ServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl LmsServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Cancelling the token stops the server gracefully.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn build_router(&self) -> Router {
        let mut router = routes::router(self.state.clone());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(|req: &Request, _span: &Span| {
                    tracing::debug!(method = %req.method(), path = %req.uri().path(), "Request");
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
    }

    /// Bind the configured address and serve until cancelled.
    pub async fn run(self) -> ServerResult<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|_| {
                ServerError::InvalidAddress(format!(
                    "{}:{}",
                    self.config.bind_address, self.config.port
                ))
            })?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    pub async fn serve(self, listener: TcpListener) -> ServerResult<()> {
        let router = self.build_router();
        info!("LMS server listening on http://{}", listener.local_addr()?);

        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("LMS server shutting down...");
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_collaborator_port() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 4000);
        assert!(config.enable_cors);
    }

    #[tokio::test]
    async fn invalid_bind_address_is_reported() {
        let server = LmsServer::new(
            ServerConfig {
                bind_address: "not an address".to_string(),
                ..ServerConfig::default()
            },
            AppState::default(),
        );
        assert!(matches!(
            server.run().await,
            Err(ServerError::InvalidAddress(_))
        ));
    }
}
