use std::fs::File;
use std::io::Write;

use rstest::rstest;
use servo_config::{CoefficientRow, load_coefficients_csv, parse_coefficients_csv};
use tempfile::tempdir;

const HEADER: &str = "channel,profile,gain,integrator,zero,offset,set_point_input,set_point_output";

#[rstest]
fn parses_rows_in_order() {
    let text = format!("{HEADER}\n0,0,2048,0,0,0,0,0\n7,1,-100,2047,-5,4096,-12,345\n");
    let rows = parse_coefficients_csv(text.as_bytes()).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[1],
        CoefficientRow {
            channel: 7,
            profile: 1,
            gain: -100,
            integrator: 2047,
            zero: -5,
            offset: 4096,
            set_point_input: -12,
            set_point_output: 345,
        }
    );
}

#[rstest]
#[case("channel,profile,gain\n0,0,1\n")]
#[case("profile,channel,gain,integrator,zero,offset,set_point_input,set_point_output\n0,0,0,0,0,0,0,0\n")]
fn rejects_wrong_headers(#[case] text: &str) {
    let err = parse_coefficients_csv(text.as_bytes()).unwrap_err();
    assert!(format!("{err}").contains("must have headers"));
}

#[rstest]
fn reports_row_number_of_bad_row() {
    let text = format!("{HEADER}\n0,0,1,0,0,0,0,0\n1,0,abc,0,0,0,0,0\n");
    let err = parse_coefficients_csv(text.as_bytes()).unwrap_err();
    assert!(format!("{err}").contains("row 3"), "{err}");
}

#[rstest]
fn rejects_empty_table() {
    let text = format!("{HEADER}\n");
    assert!(parse_coefficients_csv(text.as_bytes()).is_err());
}

#[rstest]
fn loads_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("coeffs.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "{HEADER}").unwrap();
    writeln!(f, "2,1,1024,512,0,0,100,200").unwrap();
    drop(f);
    let rows = load_coefficients_csv(&path).unwrap();
    assert_eq!(rows[0].channel, 2);
    assert_eq!(rows[0].set_point_output, 200);
}

#[rstest]
fn missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    let err = load_coefficients_csv(&dir.path().join("nope.csv")).unwrap_err();
    assert!(format!("{err}").contains("open coefficient CSV"));
}
