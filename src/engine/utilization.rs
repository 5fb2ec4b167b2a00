//! Utilization roll-ups: unit-milliseconds allocated vs. open, bucketed by
//! civil day, ISO week (Monday start) or calendar month on the UTC grid.

use crate::model::*;

use super::calendar::open_spans;

/// Proleptic Gregorian date for an epoch day (Howard Hinnant's algorithm).
pub fn civil_from_day(day: i64) -> (i64, u32, u32) {
    let z = day + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = yoe + era * 400 + i64::from(m <= 2);
    (y, m, d)
}

pub fn day_from_civil(y: i64, m: u32, d: u32) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = y.div_euclid(400);
    let yoe = y.rem_euclid(400);
    let mp = i64::from(if m > 2 { m - 3 } else { m + 9 });
    let doy = (153 * mp + 2) / 5 + i64::from(d) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe
}

/// First epoch day of the bucket containing `day`.
fn bucket_floor(day: i64, group_by: GroupBy) -> i64 {
    match group_by {
        GroupBy::Day => day,
        GroupBy::Week => day - i64::from(weekday_of(day)),
        GroupBy::Month => {
            let (y, m, _) = civil_from_day(day);
            day_from_civil(y, m, 1)
        }
    }
}

/// First epoch day of the bucket after the one starting at `start_day`.
fn bucket_next(start_day: i64, group_by: GroupBy) -> i64 {
    match group_by {
        GroupBy::Day => start_day + 1,
        GroupBy::Week => start_day + 7,
        GroupBy::Month => {
            let (y, m, _) = civil_from_day(start_day);
            if m == 12 {
                day_from_civil(y + 1, 1, 1)
            } else {
                day_from_civil(y, m + 1, 1)
            }
        }
    }
}

/// Roll up one resource over `query`, one record per bucket the query
/// touches (buckets clipped to the query window). Cancelled appointments
/// never reach the ledger, so they do not count.
///
/// Quantities weigh in on both sides: a 2-unit claim on a 3-unit resource
/// for an hour contributes 2 unit-hours against 3 open unit-hours.
pub fn utilization_for(
    rs: &ResourceState,
    query: &Span,
    group_by: GroupBy,
    open_by_default: bool,
) -> Vec<UtilizationRecord> {
    let mut out = Vec::new();
    if query.end <= query.start {
        return out;
    }

    let mut bucket_day = bucket_floor(epoch_day(query.start), group_by);
    while bucket_day * DAY_MS < query.end {
        let next_day = bucket_next(bucket_day, group_by);
        let bucket = Span::new(
            (bucket_day * DAY_MS).max(query.start),
            (next_day * DAY_MS).min(query.end),
        );

        let open_ms: Ms = open_spans(rs, &bucket, open_by_default)
            .iter()
            .map(Span::duration_ms)
            .sum::<Ms>()
            * rs.capacity as Ms;

        let allocated_ms: Ms = rs
            .overlapping(&bucket)
            .map(|a| a.span.overlap_ms(&bucket) * a.quantity as Ms)
            .sum();

        let ratio = (open_ms > 0).then(|| allocated_ms as f64 / open_ms as f64);
        out.push(UtilizationRecord {
            resource_id: rs.id,
            bucket,
            allocated_ms,
            open_ms,
            ratio,
        });

        bucket_day = next_day;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use ulid::Ulid;

    const H: Ms = 3_600_000;
    const MONDAY: i64 = 23_531; // 2034-06-05

    fn resource(capacity: u32) -> ResourceState {
        let mut rs = ResourceState::new(
            Ulid::new(),
            ResourceKind::Person,
            "Sam".into(),
            capacity,
            BTreeSet::new(),
            ResourceStatus::Active,
        );
        // Open 09:00-17:00 every day of the week.
        for weekday in 0..7 {
            rs.calendar.weekly.push(WeeklyRule {
                id: Ulid::new(),
                weekday,
                start_minute: 9 * 60,
                end_minute: 17 * 60,
            });
        }
        rs
    }

    fn book(rs: &mut ResourceState, start: Ms, end: Ms, quantity: u32) {
        rs.insert_allocation(AllocationInterval {
            appointment_id: Ulid::new(),
            span: Span::new(start, end),
            quantity,
        });
    }

    #[test]
    fn civil_roundtrip_known_dates() {
        assert_eq!(civil_from_day(0), (1970, 1, 1));
        assert_eq!(day_from_civil(1970, 1, 1), 0);
        assert_eq!(day_from_civil(2000, 1, 1), 10_957);
        assert_eq!(civil_from_day(10_957), (2000, 1, 1));
        // 2000 is a leap year.
        assert_eq!(civil_from_day(10_957 + 31 + 29), (2000, 3, 1));
        assert_eq!(civil_from_day(MONDAY), (2034, 6, 5));
        assert_eq!(weekday_of(MONDAY), 0);
    }

    #[test]
    fn daily_buckets_split_allocations() {
        let day = MONDAY * DAY_MS;
        let mut rs = resource(1);
        book(&mut rs, day + 9 * H, day + 13 * H, 1); // 4h on Monday
        book(&mut rs, day + DAY_MS + 9 * H, day + DAY_MS + 11 * H, 1); // 2h Tuesday

        let query = Span::new(day, day + 2 * DAY_MS);
        let records = utilization_for(&rs, &query, GroupBy::Day, false);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].allocated_ms, 4 * H);
        assert_eq!(records[0].open_ms, 8 * H);
        assert_eq!(records[0].ratio, Some(0.5));
        assert_eq!(records[1].allocated_ms, 2 * H);
        assert_eq!(records[1].ratio, Some(0.25));
    }

    #[test]
    fn allocation_spanning_midnight_splits_across_buckets() {
        let day = MONDAY * DAY_MS;
        let mut rs = resource(1);
        rs.calendar.weekly.clear();
        for weekday in 0..7 {
            rs.calendar.weekly.push(WeeklyRule {
                id: Ulid::new(),
                weekday,
                start_minute: 0,
                end_minute: 1440,
            });
        }
        book(&mut rs, day + 22 * H, day + DAY_MS + 2 * H, 1);

        let records =
            utilization_for(&rs, &Span::new(day, day + 2 * DAY_MS), GroupBy::Day, false);
        assert_eq!(records[0].allocated_ms, 2 * H);
        assert_eq!(records[1].allocated_ms, 2 * H);
    }

    #[test]
    fn week_buckets_start_monday() {
        let wednesday = (MONDAY + 2) * DAY_MS;
        let rs = resource(1);
        // Query starts mid-week and runs ten days: buckets are the two
        // Monday-aligned weeks, clipped to the query.
        let query = Span::new(wednesday, wednesday + 10 * DAY_MS);
        let records = utilization_for(&rs, &query, GroupBy::Week, false);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].bucket.start, wednesday); // clipped
        assert_eq!(records[0].bucket.end, (MONDAY + 7) * DAY_MS);
        assert_eq!(records[1].bucket.start, (MONDAY + 7) * DAY_MS);
        assert_eq!(records[1].bucket.end, query.end);
    }

    #[test]
    fn month_buckets_align_to_first() {
        let rs = resource(1);
        // 2034-06-20 .. 2034-07-10.
        let start = day_from_civil(2034, 6, 20) * DAY_MS;
        let end = day_from_civil(2034, 7, 10) * DAY_MS;
        let records = utilization_for(&rs, &Span::new(start, end), GroupBy::Month, false);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].bucket.end, day_from_civil(2034, 7, 1) * DAY_MS);
        assert_eq!(records[1].bucket.start, day_from_civil(2034, 7, 1) * DAY_MS);
    }

    #[test]
    fn zero_open_time_has_no_ratio() {
        let day = MONDAY * DAY_MS;
        let mut rs = resource(1);
        rs.calendar.weekly.clear(); // never open
        book(&mut rs, day + 9 * H, day + 10 * H, 1);

        let records =
            utilization_for(&rs, &Span::new(day, day + DAY_MS), GroupBy::Day, false);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].open_ms, 0);
        assert_eq!(records[0].allocated_ms, H);
        assert_eq!(records[0].ratio, None);
    }

    #[test]
    fn quantities_weigh_both_sides() {
        let day = MONDAY * DAY_MS;
        let mut rs = resource(4);
        book(&mut rs, day + 9 * H, day + 17 * H, 2); // half the units all day

        let records =
            utilization_for(&rs, &Span::new(day, day + DAY_MS), GroupBy::Day, false);
        assert_eq!(records[0].open_ms, 4 * 8 * H);
        assert_eq!(records[0].allocated_ms, 2 * 8 * H);
        assert_eq!(records[0].ratio, Some(0.5));
    }

    #[test]
    fn exception_day_reduces_open_time() {
        let day = MONDAY * DAY_MS;
        let mut rs = resource(1);
        rs.calendar.exceptions.push(MONDAY);

        let records =
            utilization_for(&rs, &Span::new(day, day + 2 * DAY_MS), GroupBy::Day, false);
        assert_eq!(records[0].open_ms, 0);
        assert_eq!(records[0].ratio, None);
        assert_eq!(records[1].open_ms, 8 * H);
    }
}
