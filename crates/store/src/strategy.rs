use async_trait::async_trait;
use chrono::Utc;
use conclave_core::store::error::StoreError;
use conclave_core::strategy::entity::Strategy;
use conclave_core::strategy::port::StrategyStore;
use dashmap::DashMap;
use sqlx::SqlitePool;
use std::path::PathBuf;

use crate::config::{db_err, open_pool};

/// # Summary
/// StrategyStore 的 SQLite 实现，采用"一户一库"策略。
///
/// # Invariants
/// * 每个用户拥有独立的 SQLite 数据库文件 (`strategy/strategy_<user_id>.db`)。
/// * 连接池按 user_id 缓存。
/// * 策略定义整体以 JSON 存储，读取时重新校验。
pub struct SqliteStrategyStore {
    base_path: PathBuf,
    pools: DashMap<String, SqlitePool>,
}

impl SqliteStrategyStore {
    /// 在配置的数据根目录下创建存储。
    pub fn new() -> Result<Self, StoreError> {
        Self::with_path(crate::config::get_root_dir().join("strategy"))
    }

    pub fn with_path(base_path: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&base_path).map_err(|e| StoreError::InitError(e.to_string()))?;
        Ok(Self {
            base_path,
            pools: DashMap::new(),
        })
    }

    async fn get_or_init_pool(&self, user_id: &str) -> Result<SqlitePool, StoreError> {
        if let Some(pool) = self.pools.get(user_id) {
            return Ok(pool.clone());
        }

        let db_path = self.base_path.join(format!("strategy_{}.db", user_id));
        let pool = open_pool(&db_path).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strategies (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                enabled INTEGER NOT NULL,
                definition TEXT NOT NULL,
                updated_at DATETIME NOT NULL
            );
            "#,
        )
        .execute(&pool)
        .await
        .map_err(db_err)?;

        self.pools.insert(user_id.to_string(), pool.clone());
        Ok(pool)
    }
}

fn decode(definition: &str) -> Result<Strategy, StoreError> {
    Strategy::from_json(definition).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl StrategyStore for SqliteStrategyStore {
    async fn save_strategy(&self, strategy: &Strategy) -> Result<(), StoreError> {
        let pool = self.get_or_init_pool(&strategy.user_id).await?;
        let definition =
            serde_json::to_string(strategy).map_err(|e| StoreError::Serialization(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO strategies (id, name, enabled, definition, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&strategy.id)
        .bind(&strategy.name)
        .bind(strategy.enabled)
        .bind(definition)
        .bind(Utc::now())
        .execute(&pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_strategy(&self, user_id: &str, id: &str) -> Result<Strategy, StoreError> {
        let pool = self.get_or_init_pool(user_id).await?;
        let row = sqlx::query_as::<_, (String,)>("SELECT definition FROM strategies WHERE id = ?")
            .bind(id)
            .fetch_optional(&pool)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::NotFound)?;
        decode(&row.0)
    }

    async fn list_strategies(&self, user_id: &str) -> Result<Vec<Strategy>, StoreError> {
        let pool = self.get_or_init_pool(user_id).await?;
        let rows = sqlx::query_as::<_, (String,)>("SELECT definition FROM strategies ORDER BY id")
            .fetch_all(&pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(|row| decode(&row.0)).collect()
    }
}
