use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hanaframe::backend::pool::Slots;
use hanaframe::config::PoolSettings;

/// Connection stand-in whose close can fail.
struct Conn {
    id: usize,
    panic_on_close: bool,
}

impl Drop for Conn {
    fn drop(&mut self) {
        if self.panic_on_close && !thread::panicking() {
            panic!("close of connection {} failed", self.id);
        }
    }
}

fn conn(id: usize) -> Result<Conn, String> {
    Ok(Conn {
        id,
        panic_on_close: false,
    })
}

fn settings(max_open: usize, max_idle: usize, max_lifetime: Duration) -> PoolSettings {
    PoolSettings {
        max_open,
        max_idle,
        max_lifetime,
    }
}

#[test]
fn test_idle_connection_is_reused() {
    let slots = Slots::new(settings(2, 2, Duration::from_secs(60)));
    let first = slots.checkout(|| conn(1)).unwrap();
    slots.checkin(first, true);

    let again = slots.checkout(|| conn(2)).unwrap();
    assert_eq!(again.item.id, 1);
    assert_eq!(slots.open_count(), 1);
}

#[test]
fn test_zero_lifetime_never_expires() {
    let slots = Slots::new(settings(1, 1, Duration::ZERO));
    let first = slots.checkout(|| conn(1)).unwrap();
    thread::sleep(Duration::from_millis(5));
    slots.checkin(first, true);
    assert_eq!(slots.idle_count(), 1);

    let again = slots.checkout(|| conn(2)).unwrap();
    assert_eq!(again.item.id, 1);
}

#[test]
fn test_expired_connection_is_replaced() {
    let slots = Slots::new(settings(1, 1, Duration::from_millis(1)));
    let first = slots.checkout(|| conn(1)).unwrap();
    thread::sleep(Duration::from_millis(5));
    slots.checkin(first, true);
    assert_eq!(slots.idle_count(), 0);

    let fresh = slots.checkout(|| conn(2)).unwrap();
    assert_eq!(fresh.item.id, 2);
    assert_eq!(slots.open_count(), 1);
}

#[test]
fn test_discarded_and_surplus_connections_free_their_slot() {
    let slots = Slots::new(settings(3, 1, Duration::from_secs(60)));
    let a = slots.checkout(|| conn(1)).unwrap();
    let b = slots.checkout(|| conn(2)).unwrap();
    let c = slots.checkout(|| conn(3)).unwrap();
    assert_eq!(slots.open_count(), 3);

    slots.checkin(a, false);
    slots.checkin(b, true);
    slots.checkin(c, true);
    assert_eq!(slots.idle_count(), 1);
    assert_eq!(slots.open_count(), 1);
}

#[test]
fn test_failed_open_releases_slot() {
    let slots = Slots::new(settings(1, 1, Duration::from_secs(60)));
    let err = slots
        .checkout(|| Err::<Conn, _>("refused".to_string()))
        .err()
        .unwrap();
    assert_eq!(err, "refused");
    assert_eq!(slots.open_count(), 0);
    assert!(slots.checkout(|| conn(1)).is_ok());
}

#[test]
fn test_borrower_waits_for_checkin_at_max_open() {
    let slots = Arc::new(Slots::new(settings(1, 1, Duration::from_secs(60))));
    let held = slots.checkout(|| conn(1)).unwrap();

    let waiter = {
        let slots = Arc::clone(&slots);
        thread::spawn(move || slots.checkout(|| conn(2)).map(|p| p.item.id))
    };
    thread::sleep(Duration::from_millis(20));
    assert!(!waiter.is_finished());

    slots.checkin(held, true);
    assert_eq!(waiter.join().unwrap(), Ok(1));
}

#[test]
fn test_pool_keeps_working_after_close_panics() {
    let slots = Slots::new(settings(1, 1, Duration::from_millis(1)));
    let mut fragile = slots.checkout(|| conn(1)).unwrap();
    fragile.item.panic_on_close = true;
    slots.checkin(fragile, true);
    thread::sleep(Duration::from_millis(5));

    // The expired connection is closed while the pool state is locked.
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| slots.checkout(|| conn(2))));
    assert!(outcome.is_err());
    assert_eq!(slots.open_count(), 0);

    let next = slots.checkout(|| conn(3)).unwrap();
    assert_eq!(slots.open_count(), 1);
    slots.checkin(next, false);
    assert_eq!(slots.open_count(), 0);
}
