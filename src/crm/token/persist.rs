//! 会话键值存储的本地持久化
//!
//! 与浏览器 sessionStorage 使用相同的键，进程重启后可以恢复会话；登出时清空。

use crate::crm::db::create_sqlite_pool_with_migration;
use crate::crm::token::store::TokenSnapshot;
use anyhow::{Context, Result};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};

pub const KEY_AUTH_TOKEN: &str = "authToken";
pub const KEY_GOOGLE_ACCESS_TOKEN: &str = "googleAccessToken";
pub const KEY_USER_ID: &str = "userId";

/// SQLite 实现的会话键值存储
#[derive(Clone)]
pub struct SqliteSessionStorage {
    pool: Pool<Sqlite>,
}

impl SqliteSessionStorage {
    /// 打开（必要时创建）数据库并执行迁移
    pub async fn open(db_url: &str) -> Result<Self> {
        let pool = create_sqlite_pool_with_migration(db_url).await?;
        info!("[Storage] 📦 会话存储已就绪: {}", db_url);
        Ok(Self { pool })
    }

    /// 使用已迁移的连接池
    pub fn with_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT value FROM session_storage WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context(format!("读取会话存储失败: {}", key))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO session_storage (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .context(format!("写入会话存储失败: {}", key))?;
        debug!("[Storage] 写入键: {}", key);
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM session_storage WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .context(format!("删除会话存储失败: {}", key))?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM session_storage")
            .execute(&self.pool)
            .await
            .context("清空会话存储失败")?;
        info!("[Storage] 🧹 会话存储已清空");
        Ok(())
    }

    /// 保存快照，缺失的字段会删除对应的键
    pub async fn save_snapshot(&self, snapshot: &TokenSnapshot) -> Result<()> {
        let entries = [
            (KEY_AUTH_TOKEN, snapshot.identity_token.as_deref()),
            (KEY_GOOGLE_ACCESS_TOKEN, snapshot.delegated_token.as_deref()),
            (KEY_USER_ID, snapshot.user_id.as_deref()),
        ];
        for (key, value) in entries {
            match value {
                Some(value) => self.set(key, value).await?,
                None => self.remove(key).await?,
            }
        }
        Ok(())
    }

    pub async fn load_snapshot(&self) -> Result<TokenSnapshot> {
        Ok(TokenSnapshot {
            identity_token: self.get(KEY_AUTH_TOKEN).await?,
            delegated_token: self.get(KEY_GOOGLE_ACCESS_TOKEN).await?,
            user_id: self.get(KEY_USER_ID).await?,
        })
    }
}
