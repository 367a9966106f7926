use conclave_core::common::time::FakeClockProvider;
use conclave_core::test_utils::{StaticMetrics, base_time};
use conclave_core::trade::entity::{PortfolioId, TradeRequest, TradeSide};
use conclave_core::trade::port::{PortfolioStore, TradeError, TradeSubmitter};
use conclave_trade::account::PortfolioManager;
use conclave_trade::matcher::LocalMatchEngine;
use conclave_trade::service::PaperTradeService;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn setup(cash: Decimal) -> (Arc<PaperTradeService>, Arc<StaticMetrics>, PortfolioId) {
    let metrics = Arc::new(StaticMetrics::new());
    metrics.insert("AAPL", Some(dec!(150)), &[]);
    metrics.insert("XOM", Some(dec!(100)), &[]);
    metrics.insert("HALTED", None, &[]);

    let portfolios = Arc::new(PortfolioManager::new());
    let pid = PortfolioId("paper-1".into());
    portfolios.ensure_portfolio(pid.clone(), cash);

    let service = PaperTradeService::new(
        portfolios,
        LocalMatchEngine::new(dec!(0.001)),
        metrics.clone(),
        Arc::new(FakeClockProvider::new(base_time())),
    );
    (Arc::new(service), metrics, pid)
}

fn request(pid: &PortfolioId, id: &str, symbol: &str, side: TradeSide, qty: Decimal) -> TradeRequest {
    TradeRequest {
        client_order_id: id.to_string(),
        portfolio_id: pid.clone(),
        symbol: symbol.to_string(),
        side,
        quantity: qty,
    }
}

#[tokio::test]
async fn test_buy_sell_and_summary() -> anyhow::Result<()> {
    let (service, metrics, pid) = setup(dec!(10000));

    let fill = service
        .submit(request(&pid, "r1:AAPL:buy", "AAPL", TradeSide::Buy, dec!(10)))
        .await?;
    assert_eq!(fill.price, dec!(150));
    assert_eq!(fill.commission, dec!(1.5));
    assert_eq!(service.commission_rate(), dec!(0.001));
    assert_eq!(fill.executed_at, base_time());

    metrics.set_price("AAPL", dec!(180));
    let summary = service.get_summary(&pid).await?;
    assert_eq!(summary.cash, dec!(8498.5));
    assert_eq!(summary.holdings.get("AAPL"), Some(&dec!(10)));
    assert_eq!(summary.total_value, dec!(10298.5));

    let details = service.get_holdings_detailed(&pid).await?;
    assert_eq!(details[0].cost_basis, dec!(1501.5));
    assert_eq!(details[0].current_value, dec!(1800));
    assert_eq!(details[0].acquired_at, Some(base_time()));

    service
        .submit(request(&pid, "r2:AAPL:sell", "AAPL", TradeSide::Sell, dec!(10)))
        .await?;
    let summary = service.get_summary(&pid).await?;
    assert!(summary.holdings.is_empty());
    assert_eq!(summary.cash, dec!(10296.7));
    assert_eq!(service.fills(&pid).len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_rejections_leave_portfolio_untouched() -> anyhow::Result<()> {
    let (service, _metrics, pid) = setup(dec!(1000));

    let err = service
        .submit(request(&pid, "a", "AAPL", TradeSide::Buy, dec!(10)))
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::InsufficientFunds { .. }));

    let err = service
        .submit(request(&pid, "b", "XOM", TradeSide::Sell, dec!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::InsufficientHoldings { .. }));

    let err = service
        .submit(request(&pid, "c", "HALTED", TradeSide::Buy, dec!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::PriceUnavailable(_)));

    let err = service
        .submit(request(&pid, "d", "XOM", TradeSide::Buy, dec!(1.5)))
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::InvalidQuantity(_)));

    let other = PortfolioId("nope".into());
    assert!(matches!(
        service.get_summary(&other).await,
        Err(TradeError::PortfolioNotFound(_))
    ));

    assert_eq!(service.get_summary(&pid).await?.cash, dec!(1000));
    assert!(service.fills(&pid).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_duplicate_submissions_fill_once() -> anyhow::Result<()> {
    let (service, _metrics, pid) = setup(dec!(100000));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let service = service.clone();
        let req = request(&pid, "run-7:XOM:buy", "XOM", TradeSide::Buy, dec!(5));
        handles.push(tokio::spawn(async move { service.submit(req).await }));
    }
    let mut trade_ids = Vec::new();
    for h in handles {
        trade_ids.push(h.await??.trade_id);
    }
    trade_ids.dedup();
    assert_eq!(trade_ids, vec!["T-run-7:XOM:buy".to_string()]);

    let summary = service.get_summary(&pid).await?;
    assert_eq!(summary.holdings.get("XOM"), Some(&dec!(5)));
    assert_eq!(summary.cash, dec!(99499.5));
    Ok(())
}

#[tokio::test]
async fn test_stamp_evaluated() -> anyhow::Result<()> {
    let (service, _metrics, pid) = setup(dec!(10000));
    service
        .submit(request(&pid, "x", "XOM", TradeSide::Buy, dec!(1)))
        .await?;
    let later = base_time() + chrono::Duration::days(40);
    service.stamp_evaluated(&pid, "XOM", later).await?;
    // 未持有的标的忽略
    service.stamp_evaluated(&pid, "AAPL", later).await?;

    let details = service.get_holdings_detailed(&pid).await?;
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].last_evaluated_at, Some(later));
    Ok(())
}
