use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use conclave_core::benchmark::entity::{BenchmarkSnapshot, PerformancePoint};
use conclave_core::benchmark::port::BenchmarkStore;
use conclave_core::store::error::StoreError;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::path::Path;

use crate::config::{db_err, open_pool, parse_decimal};

const DEFAULT_BENCHMARK_DB: &str = "benchmark.db";

type PerformanceRow = (
    String,
    NaiveDate,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
);

/// # Summary
/// BenchmarkStore 的 SQLite 实现。
///
/// # Invariants
/// * 金额与百分比以文本形式保存，避免浮点误差。
/// * 快照以 (symbol, date)、绩效点以 (strategy_id, date) 为主键，同日写入覆盖。
pub struct SqliteBenchmarkStore {
    pool: SqlitePool,
}

impl SqliteBenchmarkStore {
    pub async fn new() -> Result<Self, StoreError> {
        Self::open(&crate::config::get_root_dir().join(DEFAULT_BENCHMARK_DB)).await
    }

    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let pool = open_pool(db_path).await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS benchmark_snapshots (
                symbol TEXT NOT NULL,
                date TEXT NOT NULL,
                close TEXT NOT NULL,
                PRIMARY KEY (symbol, date)
            );
            CREATE TABLE IF NOT EXISTS strategy_performance (
                strategy_id TEXT NOT NULL,
                date TEXT NOT NULL,
                portfolio_value TEXT NOT NULL,
                benchmark_symbol TEXT NOT NULL,
                benchmark_close TEXT,
                strategy_return_pct TEXT NOT NULL,
                benchmark_return_pct TEXT,
                alpha_pct TEXT,
                recorded_at DATETIME NOT NULL,
                PRIMARY KEY (strategy_id, date)
            );
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::InitError(e.to_string()))?;
        Ok(Self { pool })
    }
}

fn opt_text(value: Option<Decimal>) -> Option<String> {
    value.map(|v| v.to_string())
}

fn opt_decimal(raw: Option<String>) -> Result<Option<Decimal>, StoreError> {
    raw.as_deref().map(parse_decimal).transpose()
}

#[async_trait]
impl BenchmarkStore for SqliteBenchmarkStore {
    async fn save_snapshot(&self, snapshot: &BenchmarkSnapshot) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO benchmark_snapshots (symbol, date, close) VALUES (?, ?, ?)")
            .bind(&snapshot.symbol)
            .bind(snapshot.date)
            .bind(snapshot.close.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_snapshot(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<BenchmarkSnapshot>, StoreError> {
        let row = sqlx::query_as::<_, (String, NaiveDate, String)>(
            "SELECT symbol, date, close FROM benchmark_snapshots WHERE symbol = ? AND date = ?",
        )
        .bind(symbol)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match row {
            Some((symbol, date, close)) => Ok(Some(BenchmarkSnapshot {
                symbol,
                date,
                close: parse_decimal(&close)?,
            })),
            None => Ok(None),
        }
    }

    async fn record_performance(&self, point: &PerformancePoint) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO strategy_performance
            (strategy_id, date, portfolio_value, benchmark_symbol, benchmark_close,
             strategy_return_pct, benchmark_return_pct, alpha_pct, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&point.strategy_id)
        .bind(point.date)
        .bind(point.portfolio_value.to_string())
        .bind(&point.benchmark_symbol)
        .bind(opt_text(point.benchmark_close))
        .bind(point.strategy_return_pct.to_string())
        .bind(opt_text(point.benchmark_return_pct))
        .bind(opt_text(point.alpha_pct))
        .bind(point.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn performance_series(
        &self,
        strategy_id: &str,
    ) -> Result<Vec<PerformancePoint>, StoreError> {
        let rows = sqlx::query_as::<_, PerformanceRow>(
            r#"
            SELECT strategy_id, date, portfolio_value, benchmark_symbol, benchmark_close,
                   strategy_return_pct, benchmark_return_pct, alpha_pct, recorded_at
            FROM strategy_performance WHERE strategy_id = ? ORDER BY date ASC
            "#,
        )
        .bind(strategy_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(PerformancePoint {
                    strategy_id: row.0,
                    date: row.1,
                    portfolio_value: parse_decimal(&row.2)?,
                    benchmark_symbol: row.3,
                    benchmark_close: opt_decimal(row.4)?,
                    strategy_return_pct: parse_decimal(&row.5)?,
                    benchmark_return_pct: opt_decimal(row.6)?,
                    alpha_pct: opt_decimal(row.7)?,
                    recorded_at: row.8,
                })
            })
            .collect()
    }
}
