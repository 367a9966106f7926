use serde::{Deserialize, Serialize};

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub executor: ExecutorConfig,
    pub market: MarketSessionConfig,
    pub paper: PaperAccountConfig,
    pub log: LogConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub data_dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
        }
    }
}

/// # Summary
/// 编排器并发与重试参数。
///
/// # Invariants
/// - `worker_pool_size` 至少为 1，为 0 时按 1 处理。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub worker_pool_size: usize,
    pub retry: RetryConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 10,
            retry: RetryConfig::default(),
        }
    }
}

/// 顾问调用的指数退避重试参数，对每个后端独立生效。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

/// # Summary
/// 交易时段定义 (本地时间 + 固定 UTC 偏移)，仅工作日开市。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSessionConfig {
    pub open: String,
    pub close: String,
    pub utc_offset_minutes: i32,
}

impl Default for MarketSessionConfig {
    fn default() -> Self {
        Self {
            open: "09:30".to_string(),
            close: "16:00".to_string(),
            utc_offset_minutes: -300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperAccountConfig {
    pub initial_cash: rust_decimal::Decimal,
    pub commission_rate: rust_decimal::Decimal,
}

impl Default for PaperAccountConfig {
    fn default() -> Self {
        Self {
            initial_cash: rust_decimal::Decimal::new(100_000, 0),
            commission_rate: rust_decimal::Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: "logs".to_string(),
        }
    }
}

/// 单次运行的输入文件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub strategy_file: String,
    pub snapshot_file: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            strategy_file: "strategy.json".to_string(),
            snapshot_file: "snapshot.json".to_string(),
        }
    }
}
