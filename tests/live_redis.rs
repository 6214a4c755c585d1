//! Redis backend tests against a running server.
//!
//! - Marked `#[ignore]`; run with `cargo test -- --ignored`.
//! - Reads the server address from `SHELF_TEST_REDIS_URL`
//!   (default `redis://127.0.0.1:6379`).
//! - Every test works in its own namespace, so a shared server is fine.

use std::sync::Arc;
use std::time::Duration;

use shelf::cache::{
    CacheBackend, CacheHandle, Collection, InvalidationCoordinator, KeySpace, RedisBackend,
    RequestKey,
};
use uuid::Uuid;

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

fn redis_url() -> String {
    std::env::var("SHELF_TEST_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn live_handle() -> TestResult<CacheHandle> {
    let backend: Arc<dyn CacheBackend> = Arc::new(RedisBackend::open(&redis_url())?);
    Ok(CacheHandle::new(backend, Duration::from_secs(2)))
}

fn scratch_namespace() -> String {
    format!("shelf-test-{}", Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore]
async fn set_get_and_expire() -> TestResult<()> {
    let handle = live_handle()?;
    handle.ping().await?;

    let key = format!("{}:items:probe", scratch_namespace());
    handle
        .set_with_ttl(&key, b"[1,2,3]", Duration::from_secs(1))
        .await?;
    assert_eq!(handle.get(&key).await?.as_deref(), Some(&b"[1,2,3]"[..]));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(handle.get(&key).await?.is_none());
    Ok(())
}

#[tokio::test]
#[ignore]
async fn invalidation_sweeps_only_its_namespace() -> TestResult<()> {
    let handle = live_handle()?;
    let keys = KeySpace::new(scratch_namespace());
    let neighbour = KeySpace::new(scratch_namespace());
    let ttl = Duration::from_secs(30);

    for limit in [1, 5, 50] {
        let request = RequestKey::new("/items").with_param("limit", limit);
        handle
            .set_with_ttl(&keys.listing_key(Collection::Items, 0, &request), b"[]", ttl)
            .await?;
    }
    let untouched = neighbour.listing_key(Collection::Items, 0, &RequestKey::new("/items"));
    handle.set_with_ttl(&untouched, b"[]", ttl).await?;

    let report = InvalidationCoordinator::new(handle.clone(), keys.clone())
        .invalidate(Collection::Items)
        .await;
    assert!(report.complete);
    assert_eq!(report.generation, Some(1));
    assert_eq!(report.deleted, 3);

    assert!(
        handle
            .keys_with_prefix(&keys.collection_prefix(Collection::Items))
            .await?
            .is_empty()
    );
    assert!(handle.get(&untouched).await?.is_some());

    handle
        .delete_many(&[untouched, keys.generation_key(Collection::Items)])
        .await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn glob_characters_in_namespace_match_literally() -> TestResult<()> {
    let handle = live_handle()?;
    let base = scratch_namespace();
    let literal = KeySpace::new(format!("{base}-a?"));
    let lookalike = KeySpace::new(format!("{base}-ab"));
    let ttl = Duration::from_secs(30);
    let request = RequestKey::new("/items");

    let mine = literal.listing_key(Collection::Items, 0, &request);
    let theirs = lookalike.listing_key(Collection::Items, 0, &request);
    handle.set_with_ttl(&mine, b"[]", ttl).await?;
    handle.set_with_ttl(&theirs, b"[]", ttl).await?;

    let found = handle
        .keys_with_prefix(&literal.collection_prefix(Collection::Items))
        .await?;
    assert_eq!(found, vec![mine.clone()]);

    handle.delete_many(&[mine, theirs]).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn counters_start_at_zero_and_increment() -> TestResult<()> {
    let handle = live_handle()?;
    let key = KeySpace::new(scratch_namespace()).generation_key(Collection::Items);

    assert_eq!(handle.counter(&key).await?, 0);
    assert_eq!(handle.increment(&key).await?, 1);
    assert_eq!(handle.increment(&key).await?, 2);
    assert_eq!(handle.counter(&key).await?, 2);

    handle.delete_many(&[key]).await?;
    Ok(())
}
