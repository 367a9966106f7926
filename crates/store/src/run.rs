use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conclave_core::store::error::StoreError;
use conclave_core::strategy::entity::{RunCounts, RunEvent, StrategyDecision, StrategyRun};
use conclave_core::strategy::port::RunStore;
use sqlx::SqlitePool;
use std::path::Path;

use crate::config::{db_err, open_pool};

const DEFAULT_RUN_DB: &str = "runs.db";

type RunRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<String>,
);

/// # Summary
/// RunStore 的 SQLite 实现，运行、事件与决策共用一个库。
///
/// # Invariants
/// * 事件表以 (run_id, seq) 为主键，重复追加由数据库拒绝。
/// * 决策以 id 为主键整体覆盖写入。
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// 在配置的数据根目录下打开 `runs.db`。
    pub async fn new() -> Result<Self, StoreError> {
        Self::open(&crate::config::get_root_dir().join(DEFAULT_RUN_DB)).await
    }

    /// # Summary
    /// 打开指定路径的数据库并初始化表结构。
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let pool = open_pool(db_path).await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strategy_runs (
                id TEXT PRIMARY KEY,
                strategy_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                phase TEXT NOT NULL,
                counts TEXT NOT NULL,
                started_at DATETIME NOT NULL,
                finished_at DATETIME,
                error TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_runs_strategy ON strategy_runs(strategy_id, started_at);
            CREATE TABLE IF NOT EXISTS run_events (
                run_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (run_id, seq)
            );
            CREATE TABLE IF NOT EXISTS strategy_decisions (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_decisions_run ON strategy_decisions(run_id, symbol);
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::InitError(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn load_events(&self, run_id: &str) -> Result<Vec<RunEvent>, StoreError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT payload FROM run_events WHERE run_id = ? ORDER BY seq ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(|r| from_json(&r.0)).collect()
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn row_to_run(row: RunRow) -> Result<StrategyRun, StoreError> {
    let counts: RunCounts = from_json(&row.5)?;
    Ok(StrategyRun {
        id: row.0,
        strategy_id: row.1,
        user_id: row.2,
        status: row.3.parse().map_err(StoreError::Serialization)?,
        phase: row.4.parse().map_err(StoreError::Serialization)?,
        counts,
        started_at: row.6,
        finished_at: row.7,
        error: row.8,
        events: Vec::new(),
    })
}

const RUN_COLUMNS: &str =
    "id, strategy_id, user_id, status, phase, counts, started_at, finished_at, error";

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn create_run(&self, run: &StrategyRun) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO strategy_runs
            (id, strategy_id, user_id, status, phase, counts, started_at, finished_at, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.strategy_id)
        .bind(&run.user_id)
        .bind(run.status.to_string())
        .bind(run.phase.to_string())
        .bind(to_json(&run.counts)?)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(&run.error)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        for event in &run.events {
            self.append_event(&run.id, event).await?;
        }
        Ok(())
    }

    async fn update_run(&self, run: &StrategyRun) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE strategy_runs
            SET status = ?, phase = ?, counts = ?, finished_at = ?, error = ?
            WHERE id = ?
            "#,
        )
        .bind(run.status.to_string())
        .bind(run.phase.to_string())
        .bind(to_json(&run.counts)?)
        .bind(run.finished_at)
        .bind(&run.error)
        .bind(&run.id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn append_event(&self, run_id: &str, event: &RunEvent) -> Result<(), StoreError> {
        let seq = i64::try_from(event.seq)
            .map_err(|e| StoreError::Serialization(format!("event seq overflow: {}", e)))?;
        sqlx::query("INSERT INTO run_events (run_id, seq, payload) VALUES (?, ?, ?)")
            .bind(run_id)
            .bind(seq)
            .bind(to_json(event)?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<StrategyRun, StoreError> {
        let row = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {} FROM strategy_runs WHERE id = ?",
            RUN_COLUMNS
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(StoreError::NotFound)?;
        let mut run = row_to_run(row)?;
        run.events = self.load_events(run_id).await?;
        Ok(run)
    }

    async fn list_runs(&self, strategy_id: &str) -> Result<Vec<StrategyRun>, StoreError> {
        let rows = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {} FROM strategy_runs WHERE strategy_id = ? ORDER BY started_at DESC",
            RUN_COLUMNS
        ))
        .bind(strategy_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(row_to_run).collect()
    }

    async fn save_decision(&self, decision: &StrategyDecision) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO strategy_decisions (id, run_id, symbol, payload, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&decision.id)
        .bind(&decision.run_id)
        .bind(&decision.symbol)
        .bind(to_json(decision)?)
        .bind(decision.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_decisions(&self, run_id: &str) -> Result<Vec<StrategyDecision>, StoreError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT payload FROM strategy_decisions WHERE run_id = ? ORDER BY symbol ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(|r| from_json(&r.0)).collect()
    }
}
