use chrono::{DateTime, Local, TimeZone};
use waveflow::core::workflow::cron::{CronParseError, CronSchedule};

fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

#[test]
fn daily_schedule_skips_to_next_day_when_reference_is_on_the_minute() {
    // Reference exactly 08:00:00: the next fire must be strictly greater.
    let schedule = CronSchedule::parse("0 8 * * *").unwrap();
    let next = schedule.next_fire_after(local(2026, 6, 1, 8, 0, 0)).unwrap();
    assert_eq!(next, local(2026, 6, 2, 8, 0, 0));
}

#[test]
fn daily_schedule_fires_later_the_same_day() {
    let schedule = CronSchedule::parse("5 9 * * *").unwrap();
    let next = schedule.next_fire_after(local(2026, 6, 1, 9, 4, 59)).unwrap();
    assert_eq!(next, local(2026, 6, 1, 9, 5, 0));
}

#[test]
fn reference_inside_the_matching_minute_rolls_over() {
    let schedule = CronSchedule::parse("5 9 * * *").unwrap();
    let next = schedule.next_fire_after(local(2026, 6, 1, 9, 5, 0)).unwrap();
    assert_eq!(next, local(2026, 6, 2, 9, 5, 0));
}

#[test]
fn day_of_week_field_is_sunday_based() {
    // 2026-06-01 is a Monday; dow 0 selects the following Sunday.
    let schedule = CronSchedule::parse("0 12 * * 0").unwrap();
    let next = schedule.next_fire_after(local(2026, 6, 1, 0, 0, 0)).unwrap();
    assert_eq!(next, local(2026, 6, 7, 12, 0, 0));
}

#[test]
fn month_and_day_of_month_roll_to_next_year() {
    let schedule = CronSchedule::parse("0 0 1 1 *").unwrap();
    let next = schedule.next_fire_after(local(2026, 3, 1, 0, 0, 0)).unwrap();
    assert_eq!(next, local(2027, 1, 1, 0, 0, 0));
}

#[test]
fn seconds_in_the_reference_do_not_shift_the_minute_grid() {
    let schedule = CronSchedule::parse("* * * * *").unwrap();
    let next = schedule.next_fire_after(local(2026, 6, 1, 9, 4, 59)).unwrap();
    assert_eq!(next, local(2026, 6, 1, 9, 5, 0));
}

#[test]
fn parse_rejects_unsupported_syntax() {
    assert!(matches!(
        CronSchedule::parse("5 9 * *"),
        Err(CronParseError::FieldCount(4))
    ));
    assert!(CronSchedule::parse("*/10 * * * *").is_err());
    assert!(CronSchedule::parse("1-5 * * * *").is_err());
    assert!(CronSchedule::parse("a * * * *").is_err());
}

#[test]
fn parse_rejects_out_of_range_values() {
    assert!(matches!(
        CronSchedule::parse("* 24 * * *"),
        Err(CronParseError::OutOfRange { field: "hour", .. })
    ));
    assert!(matches!(
        CronSchedule::parse("* * 0 * *"),
        Err(CronParseError::OutOfRange { field: "day-of-month", .. })
    ));
    assert!(matches!(
        CronSchedule::parse("* * * 13 *"),
        Err(CronParseError::OutOfRange { field: "month", .. })
    ));
    assert!(matches!(
        CronSchedule::parse("* * * * 7"),
        Err(CronParseError::OutOfRange { field: "day-of-week", .. })
    ));
}

#[test]
fn expression_that_never_matches_is_disabled() {
    let schedule = CronSchedule::parse("0 0 31 2 *").unwrap();
    assert_eq!(schedule.next_fire_after(local(2026, 1, 1, 0, 0, 0)), None);
}
