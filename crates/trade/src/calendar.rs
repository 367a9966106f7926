use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc, Weekday};
use conclave_core::config::MarketSessionConfig;
use conclave_core::trade::port::{MarketCalendar, TradeError};

/// # Summary
/// 固定时段的交易日历：工作日 `[open, close)` 视为开市，不处理节假日。
#[derive(Debug, Clone)]
pub struct SessionCalendar {
    open: NaiveTime,
    close: NaiveTime,
    offset: FixedOffset,
}

impl SessionCalendar {
    pub fn new(open: NaiveTime, close: NaiveTime, offset: FixedOffset) -> Self {
        Self {
            open,
            close,
            offset,
        }
    }

    /// # Summary
    /// 从配置构造日历。
    ///
    /// # Returns
    /// 时间格式不是 `HH:MM` 或偏移越界时返回错误。
    pub fn from_config(config: &MarketSessionConfig) -> Result<Self, TradeError> {
        let parse = |raw: &str| {
            NaiveTime::parse_from_str(raw, "%H:%M")
                .map_err(|e| TradeError::InternalError(format!("bad session time '{}': {}", raw, e)))
        };
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            TradeError::InternalError(format!("bad utc offset {}", config.utc_offset_minutes))
        })?;
        Ok(Self::new(parse(&config.open)?, parse(&config.close)?, offset))
    }
}

impl MarketCalendar for SessionCalendar {
    fn is_open(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.offset);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let time = local.time();
        time >= self.open && time < self.close
    }
}

/// 始终开市
pub struct AlwaysOpen;

impl MarketCalendar for AlwaysOpen {
    fn is_open(&self, _at: DateTime<Utc>) -> bool {
        true
    }
}

/// 始终闭市，所有交易转为提醒
pub struct AlwaysClosed;

impl MarketCalendar for AlwaysClosed {
    fn is_open(&self, _at: DateTime<Utc>) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_calendar() {
        let cal = SessionCalendar::from_config(&MarketSessionConfig::default()).unwrap();
        // 2026-03-02 是周一，UTC 15:00 = 纽约 10:00
        assert!(cal.is_open(Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()));
        assert!(!cal.is_open(Utc.with_ymd_and_hms(2026, 3, 2, 21, 0, 0).unwrap()));
        assert!(!cal.is_open(Utc.with_ymd_and_hms(2026, 3, 2, 14, 29, 0).unwrap()));
        assert!(!cal.is_open(Utc.with_ymd_and_hms(2026, 3, 7, 15, 0, 0).unwrap()));
    }

    #[test]
    fn test_bad_config() {
        let config = MarketSessionConfig {
            open: "9h30".into(),
            ..MarketSessionConfig::default()
        };
        assert!(SessionCalendar::from_config(&config).is_err());
    }
}
