use std::fs::File;
use std::io::Write;

use chalet_config::{FlowChannelCfg, load_correction_csv};
use rstest::rstest;
use tempfile::tempdir;

fn write_csv(body: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("fill.csv");
    let mut f = File::create(&path).expect("create");
    f.write_all(body.as_bytes()).expect("write");
    (dir, path)
}

#[rstest]
fn loads_complete_table_in_any_order() {
    let mut body = String::from("decile,m_factor\n");
    for d in (0..10).rev() {
        body.push_str(&format!("{d},{}\n", 1.0 + d as f32 / 100.0));
    }
    let (_dir, path) = write_csv(&body);
    let table = load_correction_csv(&path).expect("load");
    assert!((table[0] - 1.0).abs() < 1e-6);
    assert!((table[9] - 1.09).abs() < 1e-6);
}

#[rstest]
#[case("raw,grams\n0,1.0\n", "headers")]
#[case("decile,m_factor\n0,1.0\n", "missing decile 1")]
#[case("decile,m_factor\n10,1.0\n", "out of range")]
#[case("decile,m_factor\n0,1.0\n0,1.1\n", "listed twice")]
#[case("decile,m_factor\n0,-1.0\n", "must be > 0")]
#[case("decile,m_factor\n0,abc\n", "invalid CSV row 2")]
fn rejects_bad_tables(#[case] body: &str, #[case] needle: &str) {
    let (_dir, path) = write_csv(body);
    let err = load_correction_csv(&path).expect_err("should fail");
    let msg = format!("{err}");
    assert!(msg.contains(needle), "'{msg}' should mention '{needle}'");
}

#[test]
fn csv_takes_precedence_over_inline_table() {
    let mut body = String::from("decile,m_factor\n");
    for d in 0..10 {
        body.push_str(&format!("{d},0.5\n"));
    }
    let (_dir, path) = write_csv(&body);
    let cfg = FlowChannelCfg {
        capacity: 30.0,
        k_factor: 4.5,
        correction: Some(vec![2.0; 10]),
        correction_csv: Some(path),
    };
    assert_eq!(cfg.correction_table().expect("table"), [0.5; 10]);
}
