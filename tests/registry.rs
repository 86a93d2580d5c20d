//! End-to-end checks of the public tracking API on a manual clock.

use std::collections::HashMap;
use std::sync::Arc;

use eventalyzer::error::EventalyzerError;
use eventalyzer::scheduler::ManualScheduler;
use eventalyzer::tracker::{TrackerOptions, TrackerRegistry, WindowCounter};

const INTERVAL_MS: u64 = 100;
const TTL_MS: u64 = 1000;
const CLEANUP_MS: u64 = 10_000;

#[derive(Debug)]
struct LoginAttempt {
    ip: [u8; 4],
    user: String,
}

fn by_ip(options: TrackerOptions) -> (TrackerRegistry<LoginAttempt, [u8; 4]>, ManualScheduler) {
    let clock = ManualScheduler::new();
    let registry = TrackerRegistry::with_scheduler(
        options,
        |attempt: &LoginAttempt| attempt.ip,
        Arc::new(clock.clone()),
    )
    .unwrap();
    (registry, clock)
}

fn attempt(ip: [u8; 4], user: &str) -> LoginAttempt {
    LoginAttempt {
        ip,
        user: user.to_string(),
    }
}

#[test]
fn test_construction_guard() {
    assert!(matches!(
        WindowCounter::new(TTL_MS + 1, TTL_MS),
        Err(EventalyzerError::InvalidConfiguration(_))
    ));
    assert!(WindowCounter::new(TTL_MS, TTL_MS).is_ok());

    let result = TrackerRegistry::with_scheduler(
        TrackerOptions::new(TTL_MS + 1, TTL_MS),
        |attempt: &LoginAttempt| attempt.ip,
        Arc::new(ManualScheduler::new()),
    );
    assert!(matches!(
        result,
        Err(EventalyzerError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_brute_force_detection() {
    let (registry, clock) = by_ip(TrackerOptions::new(INTERVAL_MS, TTL_MS));
    registry.start().unwrap();

    let attacker = [10, 0, 0, 66];
    let regular = [10, 0, 0, 7];

    for i in 0..20 {
        registry.add_event(&attempt(attacker, &format!("user{}", i)));
        if i % 10 == 0 {
            registry.add_event(&attempt(regular, "alice"));
        }
        clock.advance_ms(INTERVAL_MS / 4);
    }

    let mut flagged = Vec::new();
    registry.check_threshold(15, |ip, count| flagged.push((*ip, count)));
    assert_eq!(flagged, vec![(attacker, 20)]);

    // Once the window slides past the burst nothing is flagged
    clock.advance_ms(TTL_MS + INTERVAL_MS);
    assert!(registry.over_threshold(1).is_empty());

    registry.stop();
}

#[test]
fn test_keys_are_isolated() {
    let (registry, _) = by_ip(TrackerOptions::new(INTERVAL_MS, TTL_MS));
    let a = [192, 168, 0, 1];
    let b = [192, 168, 0, 2];

    for _ in 0..7 {
        registry.add_event(&attempt(a, "alice"));
    }
    for _ in 0..100 {
        registry.add_event(&attempt(b, "bob"));
    }

    let totals: HashMap<[u8; 4], u64> = registry.over_threshold(1).into_iter().collect();
    assert_eq!(registry.currently_tracking(), 2);
    assert_eq!(totals.len(), 2);
    assert_eq!(totals[&a], 7);
    assert_eq!(totals[&b], 100);
}

#[test]
fn test_eviction_timing() {
    let (registry, clock) =
        by_ip(TrackerOptions::new(INTERVAL_MS, TTL_MS).with_cleanup_ms(CLEANUP_MS));
    let idle = [1, 1, 1, 1];
    let busy = [2, 2, 2, 2];

    registry.add_event(&attempt(idle, "carol"));
    registry.start().unwrap();

    // Window empties after TTL_MS of ticks
    for _ in 0..TTL_MS / INTERVAL_MS {
        registry.add_event(&attempt(busy, "dave"));
        clock.advance_ms(INTERVAL_MS);
    }
    assert_eq!(registry.get(&idle), Some(0));
    assert_eq!(registry.currently_tracking(), 2);

    // Still tracked until it has been idle for the cleanup period
    for _ in 0..CLEANUP_MS / INTERVAL_MS - 2 {
        registry.add_event(&attempt(busy, "dave"));
        clock.advance_ms(INTERVAL_MS);
    }
    assert_eq!(registry.currently_tracking(), 2);

    registry.add_event(&attempt(busy, "dave"));
    clock.advance_ms(INTERVAL_MS);
    assert_eq!(registry.currently_tracking(), 1);
    assert_eq!(registry.get(&idle), None);

    let mut seen = Vec::new();
    registry.check_threshold(1, |ip, _| seen.push(*ip));
    assert_eq!(seen, vec![busy]);

    registry.stop();
}

#[test]
fn test_evicted_key_starts_fresh() {
    let (registry, _) = by_ip(TrackerOptions::new(INTERVAL_MS, TTL_MS));
    let ip = [8, 8, 8, 8];

    registry.add_event(&attempt(ip, "erin"));
    // Default cleanup is the TTL: the emptying tick counts as the first idle interval
    for _ in 0..18 {
        registry.tick();
    }
    assert_eq!(registry.currently_tracking(), 1);
    registry.tick();
    assert_eq!(registry.currently_tracking(), 0);

    registry.add_event(&attempt(ip, "erin"));
    assert_eq!(registry.get(&ip), Some(1));
}

#[test]
fn test_stop_when_idle() {
    let (registry, clock) = by_ip(TrackerOptions::new(INTERVAL_MS, TTL_MS));
    let ip = [4, 4, 4, 4];

    registry.stop();
    registry.stop();
    assert!(!registry.is_running());

    registry.add_event(&attempt(ip, "frank"));
    clock.advance_ms(TTL_MS * 5);
    assert_eq!(registry.get(&ip), Some(1));
}

#[test]
fn test_registry_shared_across_threads() {
    let (registry, clock) = by_ip(TrackerOptions::new(INTERVAL_MS, TTL_MS));
    let registry = Arc::new(registry);
    registry.start().unwrap();

    let workers: Vec<_> = (0..4u8)
        .map(|n| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for _ in 0..250 {
                    registry.add_event(&attempt([n, 0, 0, 1], "load"));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(registry.currently_tracking(), 4);
    assert_eq!(registry.over_threshold(250).len(), 4);

    clock.advance_ms(TTL_MS);
    assert!(registry.over_threshold(1).is_empty());
}

#[test]
fn test_key_by_user() {
    let registry = TrackerRegistry::with_scheduler(
        TrackerOptions::new(INTERVAL_MS, TTL_MS),
        |attempt: &LoginAttempt| attempt.user.clone(),
        Arc::new(ManualScheduler::new()),
    )
    .unwrap();

    // Same user from many addresses collapses into one key
    for n in 0..5 {
        registry.add_event(&attempt([10, 0, 0, n], "grace"));
    }
    registry.add_event(&attempt([10, 0, 0, 1], "heidi"));

    assert_eq!(registry.currently_tracking(), 2);
    assert_eq!(registry.get(&"grace".to_string()), Some(5));
    assert_eq!(registry.over_threshold(5), vec![("grace".to_string(), 5)]);
}
