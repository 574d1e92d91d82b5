//! Integration tests for rate limiting

use std::sync::Arc;
use std::time::Duration;
use kalshi_collector::downloader::{RateLimitConfig, RateLimitPolicy, RateLimiter};
use tokio::time::Instant;

#[test]
fn test_rate_limiter_policies() {
    let limiter = RateLimiter::adaptive(8).unwrap();
    assert!(limiter.is_adaptive());
    assert_eq!(limiter.ceiling(), 8);

    let limiter = RateLimiter::even_spacing(4).unwrap();
    assert!(!limiter.is_adaptive());
    assert_eq!(limiter.spacing(), Duration::from_millis(250));
}

#[test]
fn test_rate_limiter_rejects_zero_ceiling() {
    assert!(RateLimiter::adaptive(0).is_err());
    assert!(RateLimiter::from_config(RateLimitConfig {
        ceiling: 0,
        policy: RateLimitPolicy::EvenSpacing,
    })
    .is_err());
}

#[tokio::test(start_paused = true)]
async fn test_ninth_call_waits_for_window() {
    let limiter = RateLimiter::adaptive(8).unwrap();
    let start = Instant::now();

    for _ in 0..8 {
        limiter.acquire().await;
        assert!(limiter.in_window().await <= 8);
    }
    assert!(start.elapsed() < Duration::from_millis(10));

    let waited = limiter.acquire().await;
    assert!(waited >= Duration::from_secs(1) - Duration::from_millis(1));
    assert!(limiter.in_window().await <= 8);
}

#[tokio::test(start_paused = true)]
async fn test_twenty_calls_at_five_per_second_take_three_seconds() {
    let limiter = RateLimiter::adaptive(5).unwrap();
    let start = Instant::now();

    for _ in 0..20 {
        limiter.acquire().await;
    }

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_window() {
    let limiter = Arc::new(RateLimiter::adaptive(5).unwrap());
    let start = Instant::now();

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire().await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert!(start.elapsed() >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_even_spacing_delays_every_call() {
    let limiter = RateLimiter::even_spacing(4).unwrap();
    let start = Instant::now();

    for _ in 0..4 {
        limiter.acquire().await;
    }

    assert!(start.elapsed() >= Duration::from_secs(1));
}
