use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chalet_hardware::PulseGenerator;

#[test]
fn generator_emits_edges_until_stopped() {
    let edges = Arc::new(AtomicU32::new(0));
    let counter = edges.clone();
    let mut pulse_gen = PulseGenerator::spawn(1_000, move || {
        counter.fetch_add(1, Ordering::Relaxed);
    });
    std::thread::sleep(Duration::from_millis(50));
    pulse_gen.stop();
    let seen = edges.load(Ordering::Relaxed);
    assert!(seen > 0);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(edges.load(Ordering::Relaxed), seen, "no edges after stop");
}

#[test]
fn zero_rate_is_idle() {
    let edges = Arc::new(AtomicU32::new(0));
    let counter = edges.clone();
    let pulse_gen = PulseGenerator::spawn(0, move || {
        counter.fetch_add(1, Ordering::Relaxed);
    });
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(edges.load(Ordering::Relaxed), 0);
    assert_eq!(pulse_gen.rate(), 0);
}
