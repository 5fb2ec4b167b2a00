//! Free-window computation: operating calendar minus committed allocations,
//! with residual capacity tracked through every segment.

use ulid::Ulid;

use crate::model::*;

use super::calendar::open_spans;

/// Merge a sorted span list; overlapping or touching spans coalesce.
pub fn merge_adjacent(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::with_capacity(sorted.len());
    for span in sorted {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(*span),
        }
    }
    merged
}

/// Subtract `remove` (sorted, non-overlapping) from `base` (same shape).
pub fn subtract_spans(base: &[Span], remove: &[Span]) -> Vec<Span> {
    let mut out = Vec::new();
    let mut ri = 0;
    for b in base {
        let mut cursor = b.start;
        while ri < remove.len() && remove[ri].end <= cursor {
            ri += 1;
        }
        let mut i = ri;
        while i < remove.len() && remove[i].start < b.end {
            if remove[i].start > cursor {
                out.push(Span::new(cursor, remove[i].start));
            }
            cursor = cursor.max(remove[i].end);
            i += 1;
        }
        if cursor < b.end {
            out.push(Span::new(cursor, b.end));
        }
    }
    out
}

/// Capacity-change breakpoints for every allocation overlapping `query`,
/// excluding the ledger entries of `exclude` (used when an appointment is
/// checked against a move of itself). Sorted by time with releases ordered
/// before claims at the same instant, so back-to-back bookings never
/// appear to overlap.
fn capacity_events(
    rs: &ResourceState,
    query: &Span,
    exclude: Option<Ulid>,
) -> Vec<(Ms, i64)> {
    let mut events: Vec<(Ms, i64)> = Vec::new();
    for alloc in rs.overlapping(query) {
        if exclude == Some(alloc.appointment_id) {
            continue;
        }
        events.push((alloc.span.start, alloc.quantity as i64));
        events.push((alloc.span.end, -(alloc.quantity as i64)));
    }
    events.sort_unstable();
    events
}

/// Sweep the allocation profile across `open` spans and emit every segment
/// with residual capacity. Adjacent segments with equal residual merge.
pub fn free_windows_in(
    rs: &ResourceState,
    open: &[Span],
    query: &Span,
    exclude: Option<Ulid>,
) -> Vec<FreeWindow> {
    let events = capacity_events(rs, query, exclude);
    let capacity = rs.capacity as i64;

    let mut out: Vec<FreeWindow> = Vec::new();
    let mut push = |start: Ms, end: Ms, used: i64| {
        let free = (capacity - used).max(0) as u32;
        if free == 0 || end <= start {
            return;
        }
        match out.last_mut() {
            Some(last) if last.span.end == start && last.free == free => last.span.end = end,
            _ => out.push(FreeWindow { span: Span::new(start, end), free }),
        }
    };

    let mut used: i64 = 0;
    let mut ei = 0;
    for span in open {
        let mut cursor = span.start;
        // Catch up on everything that changed at or before the span start.
        while ei < events.len() && events[ei].0 <= cursor {
            used += events[ei].1;
            ei += 1;
        }
        while ei < events.len() && events[ei].0 < span.end {
            let t = events[ei].0;
            push(cursor, t, used);
            cursor = t;
            while ei < events.len() && events[ei].0 == t {
                used += events[ei].1;
                ei += 1;
            }
        }
        push(cursor, span.end, used);
    }
    out
}

/// Public entry point: free windows of one resource over a query window.
pub fn availability(
    rs: &ResourceState,
    query: &Span,
    open_by_default: bool,
) -> Vec<FreeWindow> {
    let open = open_spans(rs, query, open_by_default);
    free_windows_in(rs, &open, query, None)
}

/// Contiguous spans where at least `min_free` units are available.
/// Windows that only differ in residual level merge, so a request is
/// satisfiable iff one returned span contains its whole window.
pub fn spans_with_free(
    rs: &ResourceState,
    query: &Span,
    open_by_default: bool,
    min_free: u32,
    exclude: Option<Ulid>,
) -> Vec<Span> {
    let open = open_spans(rs, query, open_by_default);
    let windows = free_windows_in(rs, &open, query, exclude);
    let eligible: Vec<Span> = windows
        .iter()
        .filter(|w| w.free >= min_free)
        .map(|w| w.span)
        .collect();
    merge_adjacent(&eligible)
}
