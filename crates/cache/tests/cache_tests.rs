use std::sync::Arc;

use chrono::Duration;
use conclave_cache::deliberation::DeliberationCache;
use conclave_cache::mem::MemCache;
use conclave_core::advisory::entity::{AdvisorId, Deliberation, Thesis, Verdict};
use conclave_core::cache::port::{Cache, CacheExt};
use conclave_core::test_utils::base_time;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct TestItem {
    id: u32,
    name: String,
}

fn thesis(symbol: &str, advisor: &str, offset_minutes: i64) -> Thesis {
    Thesis {
        symbol: symbol.to_string(),
        advisor: AdvisorId::new(advisor),
        text: format!("{} on {}", advisor, symbol),
        generated_at: base_time() + Duration::minutes(offset_minutes),
    }
}

#[tokio::test]
async fn test_mem_cache_raw_ops() {
    let cache = MemCache::new();
    let value = vec![1, 2, 3, 4];

    cache.set_raw("raw_key", value.clone()).await.unwrap();
    let result = cache.get_raw("raw_key").await.unwrap().unwrap();
    assert_eq!(result, value);

    cache.del("raw_key").await.unwrap();
    assert!(cache.get_raw("raw_key").await.unwrap().is_none());
}

#[tokio::test]
async fn test_mem_cache_typed_ops_and_keys() {
    let cache = MemCache::new();
    let item = TestItem {
        id: 42,
        name: "Conclave".to_string(),
    };

    cache.set("b:2", &item).await.unwrap();
    cache.set("b:1", &item).await.unwrap();
    cache.set("a:1", &item).await.unwrap();

    let result: TestItem = cache.get("b:2").await.unwrap().unwrap();
    assert_eq!(result, item);
    assert_eq!(cache.keys("b:").await.unwrap(), vec!["b:1", "b:2"]);
    assert_eq!(cache.len(), 3);
}

#[tokio::test]
async fn test_deliberation_cache_staleness() {
    let cache = DeliberationCache::new(Arc::new(MemCache::new()));
    let first = thesis("AAPL", "lynch", 0);
    let second = thesis("AAPL", "buffett", 5);

    assert!(cache.lookup("AAPL", &first, &second).await.unwrap().is_none());

    let deliberation = Deliberation {
        symbol: "AAPL".to_string(),
        text: "Both see durable growth".to_string(),
        verdict: Verdict::Buy,
        generated_at: base_time() + Duration::minutes(10),
    };
    cache.store(&deliberation).await.unwrap();

    let hit = cache.lookup("AAPL", &first, &second).await.unwrap();
    assert_eq!(hit, Some(deliberation));

    // 任一论点更新即失效
    let refreshed = thesis("AAPL", "buffett", 30);
    assert!(cache.lookup("AAPL", &first, &refreshed).await.unwrap().is_none());
    let refreshed_first = thesis("AAPL", "lynch", 11);
    assert!(cache.lookup("AAPL", &refreshed_first, &second).await.unwrap().is_none());

    assert_eq!(cache.symbols().await.unwrap(), vec!["AAPL"]);
    cache.invalidate("AAPL").await.unwrap();
    assert!(cache.symbols().await.unwrap().is_empty());
}
