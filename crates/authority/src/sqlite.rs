//! SQLite nonce 存储
//!
//! 使用 sqlx 提供原生异步 SQLite 存储。`issue` 依赖主键约束，
//! `consume` 依赖 `DELETE` 的 `rows_affected`，两者都按 nonce 原子执行。

use crate::error::{AuthorityServiceError, AuthorityServiceResult};
use async_trait::async_trait;
use securecode::{
    AuthorityError, AuthorityResult, ConsumeOutcome, KeyId, Nonce, NonceAuthority, NonceRecord,
    NonceStatus, unix_now,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, trace};

/// 数据库文件名，位于配置的 `sqlite_path` 目录下
pub const DATABASE_FILE: &str = "discounts.db";

/// SQLite nonce 权威存储
#[derive(Clone)]
pub struct SqliteAuthority {
    pool: SqlitePool,
    file: PathBuf,
}

impl std::fmt::Debug for SqliteAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAuthority")
            .field("file", &self.file)
            .finish()
    }
}

impl SqliteAuthority {
    /// 打开（或创建）`{db_dir}/discounts.db`
    pub async fn new(db_dir: &Path) -> AuthorityServiceResult<Self> {
        tokio::fs::create_dir_all(db_dir).await?;
        let file = db_dir.join(DATABASE_FILE);

        // 创建连接选项并启用 WAL 模式
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", file.display()))
            .map_err(|e| AuthorityServiceError::Internal(format!("Failed to parse SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        let authority = Self { pool, file };
        authority.init().await?;

        info!(
            "SQLite nonce store initialized: path={}, WAL mode enabled",
            authority.file.display()
        );
        Ok(authority)
    }

    async fn init(&self) -> AuthorityServiceResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS discounts (
                nonce TEXT PRIMARY KEY,
                expiration INTEGER NOT NULL,
                key_id TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_discounts_expiration ON discounts(expiration)",
        )
        .execute(&self.pool)
        .await?;

        debug!("SQLite tables and indexes initialized");
        Ok(())
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// 当前记录总数（含已过期未清理的）
    pub async fn count(&self) -> AuthorityServiceResult<u64> {
        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM discounts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// 读取完整记录
    pub async fn get_record(&self, nonce: &Nonce) -> AuthorityServiceResult<Option<NonceRecord>> {
        let row = sqlx::query_as::<_, (i64, String)>(
            "SELECT expiration, key_id FROM discounts WHERE nonce = ?",
        )
        .bind(nonce.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some((expiration, key_id)) = row else {
            return Ok(None);
        };
        let key_id = KeyId::from_str(&key_id).map_err(|e| {
            AuthorityServiceError::Internal(format!("Corrupt key_id for nonce {nonce}: {e}"))
        })?;
        Ok(Some(NonceRecord {
            nonce: *nonce,
            expiration,
            key_id,
        }))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn storage_error(e: sqlx::Error) -> AuthorityError {
    AuthorityError::Storage(e.to_string())
}

#[async_trait]
impl NonceAuthority for SqliteAuthority {
    async fn issue(&self, nonce: &Nonce, expiration: i64, key_id: &KeyId) -> AuthorityResult<()> {
        let result = sqlx::query(
            "INSERT INTO discounts (nonce, expiration, key_id) VALUES (?1, ?2, ?3)",
        )
        .bind(nonce.to_string())
        .bind(expiration)
        .bind(key_id.to_string())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                trace!("Stored nonce {} (expires {})", nonce, expiration);
                Ok(())
            }
            Err(e)
                if e
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation()) =>
            {
                Err(AuthorityError::DuplicateNonce(*nonce))
            }
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn verify(&self, nonce: &Nonce) -> AuthorityResult<NonceStatus> {
        let row = sqlx::query_as::<_, (i64,)>("SELECT expiration FROM discounts WHERE nonce = ?")
            .bind(nonce.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(match row {
            Some((expiration,)) => NonceStatus::at(expiration, unix_now()),
            None => NonceStatus::NotFound,
        })
    }

    async fn consume(&self, nonce: &Nonce) -> AuthorityResult<ConsumeOutcome> {
        let result = sqlx::query("DELETE FROM discounts WHERE nonce = ?")
            .bind(nonce.to_string())
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(ConsumeOutcome::from_removed(result.rows_affected() > 0))
    }

    async fn purge_expired(&self, now: i64) -> AuthorityResult<u64> {
        let result = sqlx::query("DELETE FROM discounts WHERE expiration < ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            debug!("Purged {} expired nonces", deleted);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn key_id() -> KeyId {
        "ACE84362".parse().unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_init() {
        let temp_dir = tempdir().unwrap();
        let authority = SqliteAuthority::new(temp_dir.path()).await.unwrap();
        assert_eq!(authority.count().await.unwrap(), 0);
        assert!(authority.file().ends_with(DATABASE_FILE));
    }

    #[tokio::test]
    async fn test_issue_verify_consume() {
        let temp_dir = tempdir().unwrap();
        let authority = SqliteAuthority::new(temp_dir.path()).await.unwrap();
        let nonce = Nonce::random();

        assert_eq!(authority.verify(&nonce).await, Ok(NonceStatus::NotFound));
        authority
            .issue(&nonce, unix_now() + 3600, &key_id())
            .await
            .unwrap();
        assert_eq!(authority.verify(&nonce).await, Ok(NonceStatus::Valid));

        let record = authority.get_record(&nonce).await.unwrap().unwrap();
        assert_eq!(record.key_id, key_id());

        assert_eq!(
            authority.consume(&nonce).await,
            Ok(ConsumeOutcome::Removed)
        );
        assert_eq!(
            authority.consume(&nonce).await,
            Ok(ConsumeOutcome::AlreadyGone)
        );
        assert_eq!(authority.verify(&nonce).await, Ok(NonceStatus::NotFound));
    }

    #[tokio::test]
    async fn test_duplicate_issue_keeps_original() {
        let temp_dir = tempdir().unwrap();
        let authority = SqliteAuthority::new(temp_dir.path()).await.unwrap();
        let nonce = Nonce::random();

        authority.issue(&nonce, 2_000_000_000, &key_id()).await.unwrap();
        assert_eq!(
            authority
                .issue(&nonce, 1_000, &"00000000".parse().unwrap())
                .await,
            Err(AuthorityError::DuplicateNonce(nonce))
        );

        let record = authority.get_record(&nonce).await.unwrap().unwrap();
        assert_eq!(record.expiration, 2_000_000_000);
        assert_eq!(record.key_id, key_id());
    }

    #[tokio::test]
    async fn test_expired_status_and_purge() {
        let temp_dir = tempdir().unwrap();
        let authority = SqliteAuthority::new(temp_dir.path()).await.unwrap();
        let now = unix_now();
        let stale = Nonce::random();
        let live = Nonce::random();

        authority.issue(&stale, now - 100, &key_id()).await.unwrap();
        authority.issue(&live, now + 100, &key_id()).await.unwrap();
        assert_eq!(authority.verify(&stale).await, Ok(NonceStatus::Expired));

        assert_eq!(authority.purge_expired(now).await, Ok(1));
        assert_eq!(authority.count().await.unwrap(), 1);
        assert_eq!(authority.verify(&stale).await, Ok(NonceStatus::NotFound));
        assert_eq!(authority.verify(&live).await, Ok(NonceStatus::Valid));
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let temp_dir = tempdir().unwrap();
        let nonce = Nonce::random();

        {
            let authority = SqliteAuthority::new(temp_dir.path()).await.unwrap();
            authority
                .issue(&nonce, unix_now() + 600, &key_id())
                .await
                .unwrap();
            authority.close().await;
        }

        let reopened = SqliteAuthority::new(temp_dir.path()).await.unwrap();
        assert_eq!(reopened.verify(&nonce).await, Ok(NonceStatus::Valid));
    }

    #[tokio::test]
    async fn test_concurrent_consume_single_winner() {
        let temp_dir = tempdir().unwrap();
        let authority = Arc::new(SqliteAuthority::new(temp_dir.path()).await.unwrap());
        let nonce = Nonce::random();
        authority
            .issue(&nonce, unix_now() + 600, &key_id())
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let authority = authority.clone();
            handles.push(tokio::spawn(async move { authority.consume(&nonce).await }));
        }

        let mut removed = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().removed() {
                removed += 1;
            }
        }
        assert_eq!(removed, 1);
    }
}
