use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering},
};
use std::thread;
use std::time::Duration;

use autopress_hardware::error::HwError;
use autopress_hardware::util::poll_until;

#[test]
fn poll_until_returns_value_once_ready() {
    let ready = Arc::new(AtomicBool::new(false));
    let ready_bg = ready.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(3));
        ready_bg.store(true, Ordering::Relaxed);
    });

    let res = poll_until(
        || Ok(ready.load(Ordering::Relaxed).then_some(42)),
        Duration::from_millis(200),
        Duration::from_micros(200),
    );
    assert_eq!(res.expect("ready before timeout"), 42);
}

#[test]
fn poll_until_times_out() {
    let err = poll_until(
        || Ok(None::<u8>),
        Duration::from_millis(5),
        Duration::from_micros(200),
    )
    .expect_err("expected timeout error");

    match err {
        HwError::DataReadyTimeout => {}
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn probe_errors_abort_the_wait() {
    let calls = AtomicU32::new(0);
    let err = poll_until(
        || {
            calls.fetch_add(1, Ordering::Relaxed);
            Err::<Option<u8>, _>(HwError::I2c("nack".into()))
        },
        Duration::from_millis(100),
        Duration::from_micros(200),
    )
    .expect_err("probe error propagates");
    assert!(matches!(err, HwError::I2c(_)));
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}
