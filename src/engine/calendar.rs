use crate::model::*;

use super::availability::merge_adjacent;

/// Expand a weekly recurring calendar into concrete open spans intersected
/// with `query`. Exception days are dropped whole. Output is sorted, merged
/// and non-overlapping.
pub fn expand_calendar(cal: &OperatingCalendar, query: &Span) -> Vec<Span> {
    if query.end <= query.start || cal.is_empty() {
        return Vec::new();
    }

    let first_day = epoch_day(query.start);
    let last_day = epoch_day(query.end - 1);

    let mut open = Vec::new();
    for day in first_day..=last_day {
        if cal.is_exception(day) {
            continue;
        }
        let wd = weekday_of(day);
        let day_start = day * DAY_MS;
        for rule in &cal.weekly {
            if rule.weekday != wd || rule.end_minute <= rule.start_minute {
                continue;
            }
            let start = (day_start + rule.start_minute as Ms * MINUTE_MS).max(query.start);
            let end = (day_start + rule.end_minute as Ms * MINUTE_MS).min(query.end);
            if start < end {
                open.push(Span::new(start, end));
            }
        }
    }

    open.sort_by_key(|s| s.start);
    merge_adjacent(&open)
}

/// Concrete open spans for a resource over `query`. A resource without any
/// weekly rule fails closed unless the tenant opted into the always-open
/// fallback, in which case the whole query window is open.
pub fn open_spans(rs: &ResourceState, query: &Span, open_by_default: bool) -> Vec<Span> {
    if query.end <= query.start {
        return Vec::new();
    }
    if rs.calendar.is_empty() {
        if open_by_default {
            return vec![*query];
        }
        return Vec::new();
    }
    expand_calendar(&rs.calendar, query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const H: Ms = 3_600_000;

    // Monday 1970-01-05 is epoch day 4.
    const MONDAY: i64 = 4;

    fn rule(weekday: u8, start_minute: u32, end_minute: u32) -> WeeklyRule {
        WeeklyRule { id: Ulid::new(), weekday, start_minute, end_minute }
    }

    fn day_span(day: i64) -> Span {
        Span::new(day * DAY_MS, (day + 1) * DAY_MS)
    }

    #[test]
    fn expands_single_weekday() {
        let cal = OperatingCalendar {
            weekly: vec![rule(0, 9 * 60, 17 * 60)], // Monday 09:00-17:00
            exceptions: vec![],
        };
        // Two full weeks starting on that Monday.
        let query = Span::new(MONDAY * DAY_MS, (MONDAY + 14) * DAY_MS);
        let open = expand_calendar(&cal, &query);
        assert_eq!(open.len(), 2);
        assert_eq!(open[0], Span::new(MONDAY * DAY_MS + 9 * H, MONDAY * DAY_MS + 17 * H));
        assert_eq!(
            open[1],
            Span::new((MONDAY + 7) * DAY_MS + 9 * H, (MONDAY + 7) * DAY_MS + 17 * H)
        );
    }

    #[test]
    fn clips_to_query_bounds() {
        let cal = OperatingCalendar {
            weekly: vec![rule(0, 9 * 60, 17 * 60)],
            exceptions: vec![],
        };
        let query = Span::new(MONDAY * DAY_MS + 10 * H, MONDAY * DAY_MS + 12 * H);
        let open = expand_calendar(&cal, &query);
        assert_eq!(open, vec![query]);
    }

    #[test]
    fn exception_day_is_closed() {
        let cal = OperatingCalendar {
            weekly: vec![rule(0, 9 * 60, 17 * 60)],
            exceptions: vec![MONDAY],
        };
        let open = expand_calendar(&cal, &day_span(MONDAY));
        assert!(open.is_empty());

        // The following Monday is unaffected.
        let open = expand_calendar(&cal, &day_span(MONDAY + 7));
        assert_eq!(open.len(), 1);
    }

    #[test]
    fn split_shifts_stay_separate() {
        let cal = OperatingCalendar {
            weekly: vec![rule(0, 9 * 60, 12 * 60), rule(0, 13 * 60, 17 * 60)],
            exceptions: vec![],
        };
        let open = expand_calendar(&cal, &day_span(MONDAY));
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].end, MONDAY * DAY_MS + 12 * H);
        assert_eq!(open[1].start, MONDAY * DAY_MS + 13 * H);
    }

    #[test]
    fn adjacent_rules_merge() {
        let cal = OperatingCalendar {
            weekly: vec![rule(0, 9 * 60, 12 * 60), rule(0, 12 * 60, 17 * 60)],
            exceptions: vec![],
        };
        let open = expand_calendar(&cal, &day_span(MONDAY));
        assert_eq!(open, vec![Span::new(MONDAY * DAY_MS + 9 * H, MONDAY * DAY_MS + 17 * H)]);
    }

    #[test]
    fn zero_length_query_is_empty() {
        let cal = OperatingCalendar {
            weekly: vec![rule(0, 0, 1440)],
            exceptions: vec![],
        };
        let t = MONDAY * DAY_MS;
        assert!(expand_calendar(&cal, &Span { start: t, end: t }).is_empty());
    }

    #[test]
    fn empty_calendar_fails_closed() {
        let rs = ResourceState::new(
            Ulid::new(),
            ResourceKind::Room,
            "Room A".into(),
            1,
            Default::default(),
            ResourceStatus::Active,
        );
        let query = day_span(MONDAY);
        assert!(open_spans(&rs, &query, false).is_empty());
        assert_eq!(open_spans(&rs, &query, true), vec![query]);
    }
}
