//! Pure conflict detection. Every check reports; nothing here mutates or
//! short-circuits, so callers always see the complete picture.

use std::time::{SystemTime, UNIX_EPOCH};

use ulid::Ulid;

use crate::limits;
use crate::model::*;

use super::availability::spans_with_free;
use super::error::EngineError;

pub fn now_ms() -> Ms {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Reject malformed or absurd spans before any lock is taken.
pub fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::validation(format!(
            "span start {} must be before end {}",
            span.start, span.end
        )));
    }
    if span.start < limits::MIN_VALID_TIMESTAMP_MS || span.end > limits::MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::validation(
            "timestamp outside supported range (2000-01-01 .. 2100-01-01)",
        ));
    }
    if span.duration_ms() > limits::MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span duration above 31 days"));
    }
    Ok(())
}

pub fn validate_query_window(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::validation(format!(
            "window start {} must be before end {}",
            span.start, span.end
        )));
    }
    if span.duration_ms() > limits::MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window above 366 days"));
    }
    Ok(())
}

fn conflict(kind: ConflictKind, rs: &ResourceState, severity: Severity, detail: String) -> Conflict {
    Conflict { kind, resource_id: rs.id, severity, detail }
}

/// Run every check for one allocation request against one resource.
///
/// `exclude` names an appointment whose own ledger entries are ignored,
/// which lets a reschedule move within the space it already occupies.
pub fn detect(
    rs: &ResourceState,
    window: &Span,
    request: &AllocationRequest,
    exclude: Option<Ulid>,
    open_by_default: bool,
    advance_horizon_ms: Option<Ms>,
    now: Ms,
) -> Vec<Conflict> {
    let mut out = Vec::new();

    if !rs.status.is_bookable() {
        out.push(conflict(
            ConflictKind::ResourceNotBookable,
            rs,
            Severity::Hard,
            format!("resource status is {}", rs.status.as_str()),
        ));
    }

    let missing = rs.missing_skills(&request.required_skills);
    if !missing.is_empty() {
        out.push(conflict(
            ConflictKind::SkillMissing,
            rs,
            Severity::Hard,
            format!("missing skills: {}", missing.join(", ")),
        ));
    }

    if let Some(horizon) = advance_horizon_ms {
        if window.end > now + horizon {
            out.push(conflict(
                ConflictKind::BeyondHorizon,
                rs,
                Severity::Hard,
                format!("window ends {} ms past the booking horizon", window.end - now - horizon),
            ));
        }
    }

    if request.quantity > rs.capacity {
        out.push(conflict(
            ConflictKind::CapacityExceeded,
            rs,
            Severity::Hard,
            format!("requested {} units, capacity is {}", request.quantity, rs.capacity),
        ));
        return out; // coverage check below would be noise
    }

    // The window must sit inside one contiguous stretch with enough
    // residual capacity. Adjacent free windows merge first, so a request
    // spanning a residual-level change still passes.
    let covered = spans_with_free(rs, window, open_by_default, request.quantity, exclude)
        .iter()
        .any(|s| s.contains_span(window));
    if !covered {
        out.push(conflict(
            ConflictKind::CapacityExceeded,
            rs,
            Severity::Hard,
            format!(
                "no contiguous window with {} free unit(s) covering [{}, {})",
                request.quantity, window.start, window.end
            ),
        ));
    } else if rs.calendar.is_empty() && open_by_default {
        // Bookable only through the tenant fallback. Flag it, don't block.
        out.push(conflict(
            ConflictKind::OutsideOperatingHours,
            rs,
            Severity::Soft,
            "resource has no operating calendar; booked via open-by-default".into(),
        ));
    }

    out
}

/// Collapse duplicate resource ids in a batch by summing quantities and
/// unioning skill requirements. Returns requests sorted by resource id,
/// which is also the lock-acquisition order.
pub fn normalize_requests(
    requests: &[AllocationRequest],
) -> Result<Vec<AllocationRequest>, EngineError> {
    if requests.is_empty() {
        return Err(EngineError::validation("at least one allocation is required"));
    }
    if requests.len() > limits::MAX_BATCH_SIZE {
        return Err(EngineError::LimitExceeded("too many allocations in one booking"));
    }

    let mut merged: Vec<AllocationRequest> = Vec::with_capacity(requests.len());
    let mut sorted: Vec<&AllocationRequest> = requests.iter().collect();
    sorted.sort_by_key(|r| r.resource_id);

    for req in sorted {
        if req.quantity == 0 {
            return Err(EngineError::validation("quantity must be at least 1"));
        }
        for skill in &req.required_skills {
            if skill.is_empty() || skill.len() > limits::MAX_SKILL_LEN {
                return Err(EngineError::validation("skill name length out of range"));
            }
        }
        match merged.last_mut() {
            Some(last) if last.resource_id == req.resource_id => {
                last.quantity = last.quantity.saturating_add(req.quantity);
                for skill in &req.required_skills {
                    if !last.required_skills.contains(skill) {
                        last.required_skills.push(skill.clone());
                    }
                }
            }
            _ => merged.push(req.clone()),
        }
    }
    Ok(merged)
}
