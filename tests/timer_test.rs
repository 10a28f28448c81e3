use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proctordesk_lib::assessment::{CountdownTimer, FrameOutcome};
use tokio::time::Instant;

#[test]
fn test_countdown_is_monotonic_and_completes_once() {
    let fired = Arc::new(AtomicUsize::new(0));
    let remaining_at_fire = Arc::new(Mutex::new(None));

    let mut timer = CountdownTimer::new(5);
    {
        let fired = Arc::clone(&fired);
        timer.set_on_complete(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }
    let start = Instant::now();
    timer.set_active(true, start);

    let mut previous = timer.remaining_seconds();
    // Irregular frame spacing, including gaps longer than a second.
    let mut offset = Duration::ZERO;
    for step in [16, 16, 300, 700, 1200, 33, 2500, 400, 900, 1000, 1000, 1000] {
        offset += Duration::from_millis(step);
        let outcome = timer.on_frame(start + offset);
        let remaining = timer.remaining_seconds();
        assert!(remaining <= previous, "remaining went up from {} to {}", previous, remaining);
        previous = remaining;

        if outcome == FrameOutcome::Completed {
            *remaining_at_fire.lock().unwrap() = Some(remaining);
        }
    }

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(*remaining_at_fire.lock().unwrap(), Some(0));
    assert!(timer.is_completed());
    assert!(!timer.is_active());

    // Further frames and reactivation never fire again.
    timer.set_active(true, start + offset);
    assert_eq!(timer.on_frame(start + offset + Duration::from_secs(10)), FrameOutcome::Idle);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_callback_observes_zero() {
    let observed = Arc::new(Mutex::new(Vec::new()));
    let mut timer = CountdownTimer::new(2);
    let start = Instant::now();
    timer.set_active(true, start);
    timer.on_frame(start);
    assert_eq!(timer.on_frame(start + Duration::from_millis(1500)), FrameOutcome::Ticked { remaining: 1 });

    let seen = Arc::clone(&observed);
    timer.set_on_complete(move || seen.lock().unwrap().push("done"));
    assert_eq!(timer.on_frame(start + Duration::from_millis(2600)), FrameOutcome::Completed);
    assert_eq!(timer.remaining_seconds(), 0);
    assert_eq!(timer.display(), "00:00");
    assert_eq!(*observed.lock().unwrap(), vec!["done"]);
}

#[test]
fn test_paused_time_is_not_counted() {
    let mut timer = CountdownTimer::new(60);
    let start = Instant::now();
    timer.set_active(true, start);
    timer.on_frame(start + Duration::from_secs(10));
    assert_eq!(timer.remaining_seconds(), 50);

    timer.set_active(false, start + Duration::from_secs(10));
    assert_eq!(timer.on_frame(start + Duration::from_secs(40)), FrameOutcome::Idle);

    timer.set_active(true, start + Duration::from_secs(40));
    timer.on_frame(start + Duration::from_secs(40));
    timer.on_frame(start + Duration::from_secs(45));
    assert_eq!(timer.remaining_seconds(), 45);

    let state = timer.state();
    assert_eq!(state.elapsed_seconds, 15);
    assert!(state.is_running);
    assert_eq!(state.display, "00:45");
}

#[test]
fn test_rearm_only_while_inactive() {
    let mut timer = CountdownTimer::new(30);
    let now = Instant::now();
    timer.set_active(true, now);
    assert!(!timer.rearm(90));
    assert_eq!(timer.total_seconds(), 30);

    timer.set_active(false, now);
    assert!(timer.rearm(90));
    assert_eq!(timer.remaining_seconds(), 90);
    assert!(!timer.is_completed());
}

#[test]
fn test_rearm_after_completion_allows_another_run() {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let mut timer = CountdownTimer::new(1).with_completion(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let start = Instant::now();
    timer.set_active(true, start);
    assert_eq!(timer.on_frame(start + Duration::from_secs(1)), FrameOutcome::Completed);

    assert!(timer.rearm(1));
    timer.set_active(true, start + Duration::from_secs(2));
    timer.on_frame(start + Duration::from_secs(2));
    assert_eq!(timer.on_frame(start + Duration::from_secs(3)), FrameOutcome::Completed);
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}
