use chalet_core::persistence::{BATTERY_PROFILE, load_or_init};
use chalet_core::{BatteryProfile, FileStore};
use chalet_traits::RecordStore;

#[test]
fn missing_record_reads_as_none() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = FileStore::open(dir.path().join("records")).expect("open");
    assert!(store.read("battery.txt").expect("read").is_none());
}

#[test]
fn write_replaces_record_with_trailing_newline() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = FileStore::open(dir.path()).expect("open");
    store.write("tank.txt", "60.00|1.0|").expect("write");
    store.write("tank.txt", "55.00|0.0|").expect("write");
    let on_disk = std::fs::read_to_string(dir.path().join("tank.txt")).expect("read");
    assert_eq!(on_disk, "55.00|0.0|\n");
    assert!(!dir.path().join("tank.new").exists());
}

#[test]
fn first_boot_round_trips_through_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = FileStore::open(dir.path()).expect("open");
    let defaults = BatteryProfile {
        full_capacity: 148.0,
        ..BatteryProfile::default()
    };
    let mut profile = defaults.clone();
    assert!(!load_or_init(&mut store, BATTERY_PROFILE, &mut profile, 0).expect("init"));

    let mut reloaded = BatteryProfile::default();
    assert!(load_or_init(&mut store, BATTERY_PROFILE, &mut reloaded, 0).expect("load"));
    assert_eq!(reloaded, defaults);
}
