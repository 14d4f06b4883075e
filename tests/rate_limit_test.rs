//! Pacing tests for `RateLimiter`, run on tokio's paused clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use muninn::RateLimiter;
use muninn::backends::rate_limit::min_interval;
use tokio::time::Instant;

/// Record the instant each throttled call actually runs.
async fn dispatch(limiter: &RateLimiter, identity: &str, log: &Mutex<Vec<Instant>>) {
    limiter
        .throttle(identity, || async {
            log.lock().unwrap().push(Instant::now());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn consecutive_calls_are_spaced_by_interval() {
    // 60 rpm = one call per second
    let limiter = RateLimiter::new(0).with_limit("anthropic", 60);
    let log = Mutex::new(Vec::new());

    for _ in 0..4 {
        dispatch(&limiter, "anthropic", &log).await;
    }

    let times = log.into_inner().unwrap();
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(1));
    }
}

#[tokio::test(start_paused = true)]
async fn first_call_for_identity_is_immediate() {
    let limiter = RateLimiter::new(1);
    let start = Instant::now();

    limiter.throttle("ollama", || async {}).await;

    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn reset_makes_next_call_immediate() {
    let limiter = RateLimiter::new(2);
    limiter.throttle("openai", || async {}).await;

    limiter.reset();
    let start = Instant::now();
    limiter.throttle("openai", || async {}).await;

    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn identities_do_not_share_a_schedule() {
    let limiter = RateLimiter::new(1);
    limiter.throttle("a", || async {}).await;

    let start = Instant::now();
    limiter.throttle("b", || async {}).await;

    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_queue_one_interval_apart() {
    let limiter = Arc::new(RateLimiter::new(0).with_limit("x", 120));
    let log = Arc::new(Mutex::new(Vec::new()));

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let limiter = limiter.clone();
            let log = log.clone();
            tokio::spawn(async move { dispatch(&limiter, "x", &log).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let mut times = log.lock().unwrap().clone();
    times.sort();
    assert_eq!(times.len(), 3);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(500));
    }
}

#[tokio::test(start_paused = true)]
async fn zero_rpm_is_unpaced() {
    let limiter = RateLimiter::new(0);
    let start = Instant::now();
    for _ in 0..10 {
        limiter.throttle("local", || async {}).await;
    }
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[test]
fn interval_from_rpm() {
    assert_eq!(min_interval(60), Some(Duration::from_secs(1)));
    assert_eq!(min_interval(50), Some(Duration::from_millis(1200)));
    assert_eq!(min_interval(0), None);
}
