use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const DAY_MS: Ms = 86_400_000;

/// Days since the Unix epoch for an instant.
pub fn epoch_day(t: Ms) -> i64 {
    t.div_euclid(DAY_MS)
}

/// Weekday of an epoch day, 0 = Monday .. 6 = Sunday.
/// Day 0 (1970-01-01) was a Thursday.
pub fn weekday_of(day: i64) -> u8 {
    (day + 3).rem_euclid(7) as u8
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Overlap of two spans, `None` when they only touch or are disjoint.
    pub fn intersect(&self, other: &Span) -> Option<Span> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            Some(Span::new(start, end))
        } else {
            None
        }
    }

    /// Milliseconds of overlap with `other`.
    pub fn overlap_ms(&self, other: &Span) -> Ms {
        (self.end.min(other.end) - self.start.max(other.start)).max(0)
    }
}

// ── Resources ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    Person,
    Room,
    Equipment,
    Virtual,
}

impl ResourceKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "person" => Some(Self::Person),
            "room" => Some(Self::Room),
            "equipment" => Some(Self::Equipment),
            "virtual" => Some(Self::Virtual),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Room => "room",
            Self::Equipment => "equipment",
            Self::Virtual => "virtual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceStatus {
    Active,
    Inactive,
    Retired,
}

impl ResourceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "retired" => Some(Self::Retired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Retired => "retired",
        }
    }

    pub fn is_bookable(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// One recurring open interval of a resource's week.
/// Minutes are offsets into the day on the engine's (UTC) day grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyRule {
    pub id: Ulid,
    /// 0 = Monday .. 6 = Sunday.
    pub weekday: u8,
    pub start_minute: u32,
    pub end_minute: u32,
}

impl WeeklyRule {
    pub fn overlaps(&self, other: &WeeklyRule) -> bool {
        self.weekday == other.weekday
            && self.start_minute < other.end_minute
            && other.start_minute < self.end_minute
    }
}

/// Weekly recurring open intervals plus fully-closed exception days.
/// An empty calendar means "never open" unless the tenant opted into
/// the open-by-default fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingCalendar {
    pub weekly: Vec<WeeklyRule>,
    /// Epoch day numbers on which the resource is fully closed.
    pub exceptions: Vec<i64>,
}

impl OperatingCalendar {
    pub fn is_empty(&self) -> bool {
        self.weekly.is_empty()
    }

    pub fn is_exception(&self, day: i64) -> bool {
        self.exceptions.contains(&day)
    }
}

/// A committed claim on a resource's capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationInterval {
    pub appointment_id: Ulid,
    pub span: Span,
    pub quantity: u32,
}

#[derive(Debug, Clone)]
pub struct ResourceState {
    pub id: Ulid,
    pub kind: ResourceKind,
    pub name: String,
    /// Units that may be committed concurrently (default 1).
    pub capacity: u32,
    pub skills: BTreeSet<String>,
    pub calendar: OperatingCalendar,
    pub status: ResourceStatus,
    /// Advisory taxonomy suggestion attached at creation.
    pub classification: Option<(String, f64)>,
    /// Allocation ledger, sorted by `span.start`.
    pub ledger: Vec<AllocationInterval>,
}

impl ResourceState {
    pub fn new(
        id: Ulid,
        kind: ResourceKind,
        name: String,
        capacity: u32,
        skills: BTreeSet<String>,
        status: ResourceStatus,
    ) -> Self {
        Self {
            id,
            kind,
            name,
            capacity,
            skills,
            calendar: OperatingCalendar::default(),
            status,
            classification: None,
            ledger: Vec::new(),
        }
    }

    /// Insert an allocation maintaining sort order by span.start.
    pub fn insert_allocation(&mut self, alloc: AllocationInterval) {
        let pos = self
            .ledger
            .binary_search_by_key(&alloc.span.start, |a| a.span.start)
            .unwrap_or_else(|e| e);
        self.ledger.insert(pos, alloc);
    }

    /// Remove every ledger entry belonging to an appointment.
    pub fn remove_allocations(&mut self, appointment_id: Ulid) -> usize {
        let before = self.ledger.len();
        self.ledger.retain(|a| a.appointment_id != appointment_id);
        before - self.ledger.len()
    }

    /// Highest total quantity committed at any instant across the whole
    /// ledger. Bounds how far capacity may be lowered.
    pub fn peak_committed(&self) -> u32 {
        let mut events: Vec<(Ms, i64)> = Vec::with_capacity(self.ledger.len() * 2);
        for a in &self.ledger {
            events.push((a.span.start, a.quantity as i64));
            events.push((a.span.end, -(a.quantity as i64)));
        }
        // Releases sort before claims at equal timestamps (half-open spans).
        events.sort_unstable();
        let mut current = 0i64;
        let mut peak = 0i64;
        for (_, delta) in events {
            current += delta;
            peak = peak.max(current);
        }
        peak as u32
    }

    /// Ledger entries whose span overlaps the query window. Binary search
    /// skips entries starting at or after `query.end`, so a bounded query
    /// never scans the resource's full booking history.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &AllocationInterval> {
        let right_bound = self.ledger.partition_point(|a| a.span.start < query.end);
        self.ledger[..right_bound]
            .iter()
            .filter(move |a| a.span.end > query.start)
    }

    /// Skills in `required` that this resource lacks.
    pub fn missing_skills<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|s| !self.skills.contains(s.as_str()))
            .map(|s| s.as_str())
            .collect()
    }
}

// ── Appointments ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Tentative,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tentative" => Some(Self::Tentative),
            "confirmed" => Some(Self::Confirmed),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tentative => "tentative",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Monotonic lifecycle: tentative → confirmed → completed, any
    /// non-terminal state → cancelled. No way out of a terminal state.
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        match (self, next) {
            (Self::Tentative, Self::Confirmed) => true,
            (Self::Confirmed, Self::Completed) => true,
            (s, Self::Cancelled) if !s.is_terminal() => true,
            _ => false,
        }
    }
}

/// One requested claim: quantity units of a resource, optionally gated
/// on skills the resource must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRequest {
    pub resource_id: Ulid,
    pub quantity: u32,
    pub required_skills: Vec<String>,
}

impl AllocationRequest {
    pub fn new(resource_id: Ulid, quantity: u32) -> Self {
        Self {
            resource_id,
            quantity,
            required_skills: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Appointment {
    pub id: Ulid,
    pub title: String,
    pub span: Span,
    pub status: AppointmentStatus,
    /// Opaque taxonomy code; the engine never interprets it.
    pub code: Option<String>,
    /// Tenant-unique human-readable id, e.g. `APT-000042`.
    pub reference: String,
    pub allocations: Vec<(Ulid, u32)>,
    /// Tentative appointments may expire; the reaper cancels them.
    pub expires_at: Option<Ms>,
}

// ── WAL events ───────────────────────────────────────────────────

/// The event types, flat with no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    ResourceCreated {
        id: Ulid,
        kind: ResourceKind,
        name: String,
        capacity: u32,
        skills: Vec<String>,
        status: ResourceStatus,
    },
    ResourceUpdated {
        id: Ulid,
        name: String,
        capacity: u32,
        status: ResourceStatus,
    },
    ResourceDeleted {
        id: Ulid,
    },
    WeeklyRuleAdded {
        id: Ulid,
        resource_id: Ulid,
        weekday: u8,
        start_minute: u32,
        end_minute: u32,
    },
    WeeklyRuleRemoved {
        id: Ulid,
        resource_id: Ulid,
    },
    ExceptionAdded {
        resource_id: Ulid,
        day: i64,
    },
    ExceptionRemoved {
        resource_id: Ulid,
        day: i64,
    },
    AppointmentBooked {
        id: Ulid,
        title: String,
        span: Span,
        status: AppointmentStatus,
        code: Option<String>,
        reference: String,
        allocations: Vec<(Ulid, u32)>,
        expires_at: Option<Ms>,
    },
    AppointmentRescheduled {
        id: Ulid,
        span: Span,
        allocations: Vec<(Ulid, u32)>,
    },
    AppointmentStatusChanged {
        id: Ulid,
        status: AppointmentStatus,
    },
    ConfigChanged {
        open_by_default: bool,
        industry_profile: String,
        advance_horizon_ms: Option<Ms>,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInfo {
    pub id: Ulid,
    pub kind: ResourceKind,
    pub name: String,
    pub capacity: u32,
    pub skills: Vec<String>,
    pub status: ResourceStatus,
    pub classification: Option<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentInfo {
    pub id: Ulid,
    pub title: String,
    pub span: Span,
    pub status: AppointmentStatus,
    pub reference: String,
    pub resource_ids: Vec<Ulid>,
}

/// A derived window during which a resource has spare capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeWindow {
    pub span: Span,
    /// Residual uncommitted capacity throughout the window.
    pub free: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedSlot {
    pub span: Span,
    pub resource_ids: Vec<Ulid>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    CapacityExceeded,
    SkillMissing,
    ResourceNotBookable,
    BeyondHorizon,
    OutsideOperatingHours,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CapacityExceeded => "capacity_exceeded",
            Self::SkillMissing => "skill_missing",
            Self::ResourceNotBookable => "resource_not_bookable",
            Self::BeyondHorizon => "beyond_horizon",
            Self::OutsideOperatingHours => "outside_operating_hours",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Blocks booking.
    Hard,
    /// Reported, never blocks.
    Soft,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hard => "hard",
            Self::Soft => "soft",
        }
    }
}

/// One reason a proposed allocation cannot (or should not) be committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub resource_id: Ulid,
    pub severity: Severity,
    pub detail: String,
}

impl Conflict {
    pub fn is_hard(&self) -> bool {
        self.severity == Severity::Hard
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Day,
    Week,
    Month,
}

impl GroupBy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UtilizationRecord {
    pub resource_id: Ulid,
    pub bucket: Span,
    pub allocated_ms: Ms,
    pub open_ms: Ms,
    /// `None` when the resource had zero open time in the bucket.
    pub ratio: Option<f64>,
}

/// Advisory taxonomy suggestion from the classification assistant.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub code: &'static str,
    pub confidence: f64,
    pub note: &'static str,
}
