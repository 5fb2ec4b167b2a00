//! Hard caps protecting the engine from unbounded input.

use crate::model::Ms;

pub const MAX_TENANTS: usize = 1024;
pub const MAX_TENANT_NAME_LEN: usize = 256;

pub const MAX_RESOURCES_PER_TENANT: usize = 100_000;
pub const MAX_LEDGER_ENTRIES_PER_RESOURCE: usize = 100_000;
pub const MAX_WEEKLY_RULES_PER_RESOURCE: usize = 64;
pub const MAX_EXCEPTIONS_PER_RESOURCE: usize = 4096;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_TITLE_LEN: usize = 512;
pub const MAX_SKILLS_PER_RESOURCE: usize = 64;
pub const MAX_SKILL_LEN: usize = 64;
pub const MAX_CLASSIFY_TEXT_LEN: usize = 1024;

/// Allocation requests in a single booking.
pub const MAX_BATCH_SIZE: usize = 64;
/// Resource ids in one IN (...) clause.
pub const MAX_IN_CLAUSE_IDS: usize = 256;

/// Widest allowed availability/slot/utilization query: 366 days.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 86_400_000;
/// Widest allowed appointment: 31 days.
pub const MAX_SPAN_DURATION_MS: Ms = 31 * 86_400_000;

/// Sanity bounds for timestamps: 2000-01-01 .. 2100-01-01 (UTC).
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Candidate starts one slot search will examine before giving up.
pub const MAX_SLOT_CANDIDATES: usize = 100_000;

/// Attempts to lock an appointment's allocation set before giving up.
/// A racing reschedule can swap the set between the snapshot and the
/// lock acquisition; each retry re-reads and re-locks.
pub const LIFECYCLE_LOCK_RETRIES: usize = 3;
