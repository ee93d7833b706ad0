// Recurring series expansion tests
// Occurrence times are derived from the series start, so long series do not
// drift, and month-end starts land on real dates.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use convenio_backend::services::agenda::{AgendaService, RecurrenceInterval, RecurrenceRule};

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn rule(interval: RecurrenceInterval, count: Option<u32>, until: Option<DateTime<Utc>>) -> RecurrenceRule {
    RecurrenceRule {
        interval,
        count,
        until,
    }
}

#[test]
fn test_weekly_count_series() {
    let start = at(2026, 9, 1, 14);
    let occurrences =
        AgendaService::expand_occurrences(start, &rule(RecurrenceInterval::Weekly, Some(4), None))
            .unwrap();

    assert_eq!(occurrences.len(), 4);
    for (i, occurrence) in occurrences.iter().enumerate() {
        assert_eq!(*occurrence, start + Duration::weeks(i as i64));
    }
}

#[test]
fn test_biweekly_spacing() {
    let start = at(2026, 9, 1, 14);
    let occurrences = AgendaService::expand_occurrences(
        start,
        &rule(RecurrenceInterval::Biweekly, Some(3), None),
    )
    .unwrap();

    assert_eq!(
        occurrences,
        vec![
            start,
            start + Duration::weeks(2),
            start + Duration::weeks(4)
        ]
    );
}

#[test]
fn test_monthly_from_month_end() {
    // Jan 31 has no counterpart in February; the occurrence clamps to a
    // real date instead of skipping the month.
    let start = at(2026, 1, 31, 10);
    let occurrences = AgendaService::expand_occurrences(
        start,
        &rule(RecurrenceInterval::Monthly, Some(3), None),
    )
    .unwrap();

    assert_eq!(occurrences.len(), 3);
    assert_eq!(occurrences[1].month(), 2);
    assert_eq!(occurrences[1].day(), 28);
    assert_eq!(occurrences[2].month(), 3);
    assert_eq!(occurrences[2].day(), 31);
}

#[test]
fn test_until_bound_is_inclusive() {
    let start = at(2026, 9, 7, 9);
    let until = start + Duration::days(3);
    let occurrences = AgendaService::expand_occurrences(
        start,
        &rule(RecurrenceInterval::Daily, None, Some(until)),
    )
    .unwrap();

    // start, +1d, +2d, +3d
    assert_eq!(occurrences.len(), 4);
    assert_eq!(*occurrences.last().unwrap(), until);
}

#[test]
fn test_long_weekly_series_does_not_drift() {
    // 52 weekly occurrences across a year land exactly on week boundaries
    let start = at(2026, 1, 5, 10);
    let occurrences =
        AgendaService::expand_occurrences(start, &rule(RecurrenceInterval::Weekly, Some(52), None))
            .unwrap();

    assert_eq!(occurrences.len(), 52);
    assert_eq!(*occurrences.last().unwrap(), start + Duration::weeks(51));
}
