//! 过期 nonce 后台清理

use crate::metrics::NONCES_PURGED;
use securecode::{NonceAuthority, unix_now};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 执行一次清理，返回删除数量；失败只记录日志
pub async fn sweep_once(authority: &dyn NonceAuthority) -> u64 {
    match authority.purge_expired(unix_now()).await {
        Ok(purged) => {
            if purged > 0 {
                NONCES_PURGED.inc_by(purged);
                info!("Sweep removed {} expired nonces", purged);
            } else {
                debug!("Sweep found no expired nonces");
            }
            purged
        }
        Err(e) => {
            warn!("Failed to purge expired nonces: {}", e);
            0
        }
    }
}

/// 启动固定间隔清理任务，收到关闭信号后退出
pub fn spawn_sweeper(
    authority: Arc<dyn NonceAuthority>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    info!("Starting nonce sweeper (every {:?})", period);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // 第一次 tick 立即返回，跳过
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    sweep_once(authority.as_ref()).await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Nonce sweeper received shutdown signal");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use securecode::{KeyId, MemoryAuthority, Nonce};

    #[tokio::test]
    async fn test_sweep_once_purges_expired() {
        let authority = MemoryAuthority::new();
        let key_id: KeyId = "AAAAAAAA".parse().unwrap();
        authority
            .issue(&Nonce::random(), unix_now() - 1, &key_id)
            .await
            .unwrap();
        authority
            .issue(&Nonce::random(), unix_now() + 600, &key_id)
            .await
            .unwrap();

        assert_eq!(sweep_once(&authority).await, 1);
        assert_eq!(authority.len().await, 1);
        assert_eq!(sweep_once(&authority).await, 0);
    }

    #[tokio::test]
    async fn test_sweeper_runs_and_stops() {
        let authority = Arc::new(MemoryAuthority::new());
        let key_id: KeyId = "AAAAAAAA".parse().unwrap();
        authority
            .issue(&Nonce::random(), unix_now() - 1, &key_id)
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = spawn_sweeper(authority.clone(), Duration::from_millis(20), shutdown_rx);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(authority.is_empty().await);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sweeper should stop on shutdown")
            .unwrap();
    }
}
