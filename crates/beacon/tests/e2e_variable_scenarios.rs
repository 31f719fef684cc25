//! End-to-end scenarios for `Variable` on the shared global pool.
//!
//! Validates:
//! 1. Subscribing to an uninitialized variable delivers nothing until `next`.
//! 2. Subscribing to an initialized variable delivers the current value first.
//! 3. A subscriber cancelling itself mid-stream sees nothing after the value
//!    that triggered the cancel, while its peers see everything.
//! 4. Cancelling before registration runs never links or invokes the callback.
//! 5. Cancellation is idempotent and `is_cancelled` flips immediately.

#![forbid(unsafe_code)]

use std::sync::mpsc;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use beacon::{Executor, Subscription, Variable};
use beacon_exec::{Job, ThreadPool};

const TIMEOUT: Duration = Duration::from_secs(10);

// ── Helpers ─────────────────────────────────────────────────────────────

/// Subscribe a callback that forwards every value into a channel.
fn channel_subscriber<T: Clone + Send + Sync + 'static>(
    var: &Variable<T>,
) -> (Subscription, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel();
    let sub = var.subscribe(move |v| {
        let _ = tx.send(v);
    });
    (sub, rx)
}

fn take<T>(rx: &mpsc::Receiver<T>, n: usize) -> Vec<T> {
    (0..n).map(|_| rx.recv_timeout(TIMEOUT).unwrap()).collect()
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Holds jobs until opened, then forwards to the global pool.
#[derive(Default)]
struct Gate {
    held: Mutex<Option<Vec<Job>>>,
}

impl Gate {
    fn closed() -> Arc<Self> {
        Arc::new(Self {
            held: Mutex::new(Some(Vec::new())),
        })
    }

    fn open(&self) {
        let jobs = self.held.lock().unwrap().take().unwrap_or_default();
        for job in jobs {
            ThreadPool::global().execute(job);
        }
    }
}

impl Executor for Gate {
    fn execute(&self, job: Job) {
        let mut held = self.held.lock().unwrap();
        match held.as_mut() {
            Some(jobs) => jobs.push(job),
            None => {
                drop(held);
                ThreadPool::global().execute(job);
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Scenarios
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn uninitialized_subscribe_then_updates() {
    let var: Variable<i32> = Variable::new();
    let (_sub, rx) = channel_subscriber(&var);

    assert!(
        rx.recv_timeout(Duration::from_millis(50)).is_err(),
        "no initial delivery from an uninitialized variable"
    );

    var.next(1);
    var.next(2);
    var.next(3);
    assert_eq!(take(&rx, 3), vec![1, 2, 3]);
}

#[test]
fn initialized_subscribe_sees_initial_then_updates() {
    let var = Variable::with_value(0);
    let (_sub, rx) = channel_subscriber(&var);

    var.next(1);
    var.next(2);
    var.next(3);
    assert_eq!(take(&rx, 4), vec![0, 1, 2, 3]);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn self_cancelling_subscriber_stops_at_trigger() {
    let var = Variable::with_value(0);
    let (_a, rx_a) = channel_subscriber(&var);

    let seen_b = Arc::new(Mutex::new(Vec::new()));
    let own: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());
    let b = {
        let seen_b = Arc::clone(&seen_b);
        let own = Arc::clone(&own);
        var.subscribe(move |v: i32| {
            seen_b.lock().unwrap().push(v);
            if v == 100
                && let Some(sub) = own.get()
            {
                sub.cancel();
            }
        })
    };
    own.set(b.clone()).unwrap();

    for v in 1..=200 {
        var.next(v);
    }

    let seen_a = take(&rx_a, 201);
    assert_eq!(seen_a, (0..=200).collect::<Vec<_>>());
    assert!(b.is_cancelled());
    assert_eq!(*seen_b.lock().unwrap(), (0..=100).collect::<Vec<_>>());
    assert!(wait_until(|| var.subscriber_count() == 1));
}

#[test]
fn cancel_before_registration_never_links() {
    let gate = Gate::closed();
    let var = Variable::builder()
        .label("gated")
        .target(gate.clone())
        .value(1)
        .build();

    let calls = Arc::new(Mutex::new(0usize));
    let c = Arc::clone(&calls);
    let sub = var.subscribe(move |_: i32| *c.lock().unwrap() += 1);
    sub.cancel();
    assert!(sub.is_cancelled());

    // A witness subscribed after the cancel proves the queue has drained.
    let (_witness, rx) = channel_subscriber(&var);
    gate.open();
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), 1);

    assert_eq!(*calls.lock().unwrap(), 0);
    assert!(wait_until(|| var.subscriber_count() == 1));
}

#[test]
fn cancel_is_idempotent_and_immediate() {
    let var = Variable::with_value("a".to_string());
    let (sub, rx) = channel_subscriber(&var);
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "a");

    sub.cancel();
    assert!(sub.is_cancelled());
    sub.cancel();
    sub.clone().cancel();
    assert!(sub.is_cancelled());

    var.next("b".to_string());
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert!(wait_until(|| var.subscriber_count() == 0));
}

#[test]
fn guard_cancels_when_dropped() {
    let var = Variable::with_value(1);
    let (sub, rx) = channel_subscriber(&var);
    let probe = sub.clone();
    let guard = sub.guard();
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), 1);

    drop(guard);
    assert!(probe.is_cancelled());
    var.next(2);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn read_only_view_subscribes() {
    let var = Variable::with_value(10);
    let view = var.subscribable();
    let (tx, rx) = mpsc::channel();
    let _sub = view.subscribe(move |v| {
        let _ = tx.send(v);
    });
    var.next(11);
    assert_eq!(take(&rx, 2), vec![10, 11]);
}

#[test]
fn many_subscribers_each_see_every_value() {
    let var = Variable::with_value(0u32);
    let subscribers: Vec<_> = (0..16).map(|_| channel_subscriber(&var)).collect();
    for v in 1..=50 {
        var.next(v);
    }
    for (_, rx) in &subscribers {
        assert_eq!(take(rx, 51), (0..=50).collect::<Vec<_>>());
    }
}

#[test]
fn late_subscriber_starts_from_current() {
    let var = Variable::with_value(0);
    let (_early, rx_early) = channel_subscriber(&var);
    for v in 1..=10 {
        var.next(v);
    }
    let (_late, rx_late) = channel_subscriber(&var);
    for v in 11..=20 {
        var.next(v);
    }

    assert_eq!(take(&rx_early, 21), (0..=20).collect::<Vec<_>>());
    assert_eq!(take(&rx_late, 11), (10..=20).collect::<Vec<_>>());
}
