use super::*;

fn scheduler() -> (FrameScheduler<&'static str>, ManualClock) {
    let clock = ManualClock::new();
    (FrameScheduler::new(Box::new(clock.clone())), clock)
}

// =============================================================
// Coalescing
// =============================================================

#[test]
fn duplicate_schedule_runs_once() {
    let (mut s, _) = scheduler();
    assert!(s.schedule("a", Priority::Normal));
    assert!(!s.schedule("a", Priority::Normal));
    assert_eq!(s.begin_frame(), vec!["a"]);
}

#[test]
fn high_lane_runs_first_in_insertion_order() {
    let (mut s, _) = scheduler();
    s.schedule("n1", Priority::Normal);
    s.schedule("h1", Priority::High);
    s.schedule("n2", Priority::Normal);
    s.schedule("h2", Priority::High);
    assert_eq!(s.begin_frame(), vec!["h1", "h2", "n1", "n2"]);
}

#[test]
fn high_priority_promotes_pending_normal() {
    let (mut s, _) = scheduler();
    s.schedule("a", Priority::Normal);
    s.schedule("b", Priority::Normal);
    assert!(s.schedule("b", Priority::High));
    assert!(!s.schedule("b", Priority::Normal));
    assert_eq!(s.begin_frame(), vec!["b", "a"]);
}

#[test]
fn cancel_before_flush_removes_task() {
    let (mut s, _) = scheduler();
    s.schedule("a", Priority::Normal);
    s.schedule("b", Priority::High);
    assert!(s.cancel(&"a"));
    assert!(!s.cancel(&"a"));
    assert!(!s.is_pending(&"a"));
    assert_eq!(s.begin_frame(), vec!["b"]);
}

// =============================================================
// Frame requests
// =============================================================

#[test]
fn one_frame_request_outstanding() {
    let (mut s, clock) = scheduler();
    for task in ["a", "b", "c", "d"] {
        s.schedule(task, Priority::Normal);
    }
    s.schedule("e", Priority::High);
    assert_eq!(clock.requests(), 1);
    assert!(s.frame_requested());

    s.begin_frame();
    assert!(!s.frame_requested());
    s.schedule("a", Priority::Normal);
    assert_eq!(clock.requests(), 2);
}

#[test]
fn empty_scheduler_requests_nothing() {
    let (mut s, clock) = scheduler();
    assert!(s.begin_frame().is_empty());
    assert_eq!(clock.requests(), 0);
}

#[test]
fn tasks_scheduled_during_batch_land_next_frame() {
    let (mut s, _) = scheduler();
    s.schedule("a", Priority::Normal);
    let batch = s.begin_frame();
    for _ in &batch {
        s.schedule("a", Priority::Normal);
    }
    assert_eq!(s.pending_len(), 1);
    assert!(s.frame_requested());
    assert_eq!(s.begin_frame(), vec!["a"]);
}

// =============================================================
// Flush
// =============================================================

#[test]
fn failing_task_does_not_stop_siblings() {
    let (mut s, _) = scheduler();
    s.schedule("ok1", Priority::Normal);
    s.schedule("boom", Priority::Normal);
    s.schedule("ok2", Priority::Normal);
    let mut ran = Vec::new();
    let report = s.flush(|task| {
        ran.push(*task);
        if *task == "boom" { Err("exploded") } else { Ok(()) }
    });
    assert_eq!(ran, vec!["ok1", "boom", "ok2"]);
    assert_eq!(report, FlushReport { executed: 2, failed: 1 });
}

#[test]
fn report_absorb_sums() {
    let mut a = FlushReport { executed: 1, failed: 2 };
    a.absorb(FlushReport { executed: 3, failed: 0 });
    assert_eq!(a, FlushReport { executed: 4, failed: 2 });
}
