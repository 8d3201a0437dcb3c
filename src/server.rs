//! 权威服务 HTTP 服务器启动
//!
//! 绑定端口、挂载 HTTP 追踪层，并按清理策略启动后台任务。
//! 所有任务共享同一个关闭广播通道。

use crate::error::{Error, Result};
use authority::{SweepPolicy, create_authority_state, create_router, spawn_sweeper};
use axum::{body::Body, http::Request};
use discount_common::DiscountConfig;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span};

/// 已启动的权威服务
pub struct RunningServer {
    pub local_addr: SocketAddr,
    pub handles: Vec<JoinHandle<()>>,
}

/// 启动权威服务，返回监听地址和后台任务句柄
pub async fn start_authority_server(
    config: &DiscountConfig,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<RunningServer> {
    let state = create_authority_state(&config.authority, &config.sqlite_path).await?;
    let authority = state.authority.clone();

    let app = create_router(state).layer(TraceLayer::new_for_http().make_span_with(
        |request: &Request<Body>| {
            info_span!(
                "authority.request",
                method = %request.method(),
                uri = %request.uri(),
            )
        },
    ));

    let bind_addr = config.authority.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| Error::service_startup(format!("Failed to bind to address '{bind_addr}': {e}")))?;
    let local_addr = listener.local_addr()?;
    info!("Authority server listening on {}", local_addr);

    let mut handles = Vec::new();

    let server_shutdown_tx = shutdown_tx.clone();
    let mut shutdown_rx = shutdown_tx.subscribe();
    handles.push(tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("HTTP server received shutdown signal");
        });
        if let Err(e) = server.await {
            error!("HTTP server error: {}", e);
            let _ = server_shutdown_tx.send(());
        }
        info!("HTTP server stopped");
    }));

    match config.authority.sweep {
        SweepPolicy::Interval { seconds } => {
            handles.push(spawn_sweeper(
                authority,
                Duration::from_secs(seconds),
                shutdown_tx.subscribe(),
            ));
        }
        SweepPolicy::Lazy { every_requests } => {
            info!("Expired nonces purged every {} requests", every_requests);
        }
        SweepPolicy::Never => {
            info!("Expired nonces are never purged");
        }
    }

    Ok(RunningServer {
        local_addr,
        handles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_start_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DiscountConfig::default();
        config.sqlite_path = dir.path().join("db");
        config.authority.port = 0;
        config.authority.sweep = SweepPolicy::Interval { seconds: 3600 };

        let (shutdown_tx, _) = broadcast::channel::<()>(4);
        let server = start_authority_server(&config, shutdown_tx.clone())
            .await
            .unwrap();
        assert_eq!(server.handles.len(), 2);

        let health = reqwest::get(format!("http://{}/health", server.local_addr))
            .await
            .unwrap();
        assert!(health.status().is_success());

        shutdown_tx.send(()).unwrap();
        for handle in server.handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}
