use super::*;
use chrono::{TimeZone, Utc};

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap().timestamp()
}

#[test]
fn parses_plain_capture_name_as_utc() {
    let stamp = parse_capture_name("nfcapd.202401010000").expect("valid name");
    assert_eq!(stamp.timestamp, utc(2024, 1, 1, 0, 0));
    assert_eq!(stamp.utc_offset_minutes, None);
}

#[test]
fn parses_offset_suffix_but_ignores_it_for_equality() {
    let with_offset = parse_capture_name("nfcapd.202403151245+0130").expect("valid name");
    let without = parse_capture_name("nfcapd.202403151245").expect("valid name");

    assert_eq!(with_offset.timestamp, utc(2024, 3, 15, 12, 45));
    assert_eq!(with_offset.utc_offset_minutes, Some(90));
    assert_eq!(with_offset, without);

    let negative = parse_capture_name("nfcapd.202403151245-0500").expect("valid name");
    assert_eq!(negative.utc_offset_minutes, Some(-300));
}

#[test]
fn marker_may_follow_a_directory_prefix() {
    let stamp = parse_capture_name("2024/01/01/nfcapd.202401010005").expect("valid name");
    assert_eq!(stamp.timestamp, utc(2024, 1, 1, 0, 5));
}

#[test]
fn rejects_names_without_marker_or_wrong_digit_count() {
    for name in [
        "",
        "nfcapd.current.1234",
        "202401010000",
        "nfcapd.20240101000",
        "nfcapd.2024010100000",
        "nfcapd.202401010000.tmp",
        "nfcapd.202401010000+01",
        "nfdump.202401010000",
    ] {
        let err = parse_capture_name(name).expect_err(name);
        assert!(matches!(err, ImportError::MalformedFilename(_)), "{name}: {err}");
    }
}

#[test]
fn rejects_calendar_invalid_digits() {
    assert!(parse_capture_name("nfcapd.202413010000").is_err());
    assert!(parse_capture_name("nfcapd.202402300000").is_err());
    assert!(parse_capture_name("nfcapd.202401012500").is_err());
    assert!(parse_capture_name("nfcapd.202401010000+0175").is_err());
}

#[test]
fn capture_file_builds_day_relative_path() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let file = CaptureFile::in_day(date, "nfcapd.202401021410").expect("valid file");
    assert_eq!(file.path, PathBuf::from("2024/01/02/nfcapd.202401021410"));
    assert_eq!(file.timestamp(), utc(2024, 1, 2, 14, 10));
    assert_eq!(file.stamp.date(), date);
    assert_eq!(file.name(), "nfcapd.202401021410");
}

#[test]
fn relative_to_strips_source_directory() {
    let file = CaptureFile::from_path("/data/live/gw1/2024/01/02/nfcapd.202401021410").unwrap();
    let rel = file.relative_to(Path::new("/data/live/gw1"));
    assert_eq!(rel.path, PathBuf::from("2024/01/02/nfcapd.202401021410"));

    let untouched = file.relative_to(Path::new("/elsewhere"));
    assert_eq!(untouched.path, file.path);
}
