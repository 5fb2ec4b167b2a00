use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{availability, spans_with_free};
use super::conflict::{detect, normalize_requests, now_ms, validate_query_window};
use super::slots::{rank_slots, CandidateResource, Preferences, Requirement, SlotOutcome};
use super::utilization::utilization_for;
use super::{Engine, EngineError};

impl Engine {
    /// Free windows of one resource over a bounded query window.
    pub async fn compute_availability(
        &self,
        resource_id: Ulid,
        from: Ms,
        to: Ms,
    ) -> Result<Vec<FreeWindow>, EngineError> {
        let query = Span { start: from, end: to };
        validate_query_window(&query)?;
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.read().await;
        Ok(availability(&guard, &query, self.config_snapshot().open_by_default))
    }

    /// Availability across several resources, flattened to rows.
    pub async fn find_availability(
        &self,
        resource_ids: &[Ulid],
        from: Ms,
        to: Ms,
    ) -> Result<Vec<(Ulid, FreeWindow)>, EngineError> {
        if resource_ids.is_empty() {
            return Err(EngineError::validation("at least one resource id is required"));
        }
        if resource_ids.len() > MAX_IN_CLAUSE_IDS {
            return Err(EngineError::LimitExceeded("too many resource ids"));
        }
        let mut rows = Vec::new();
        for rid in resource_ids {
            for window in self.compute_availability(*rid, from, to).await? {
                rows.push((*rid, window));
            }
        }
        Ok(rows)
    }

    /// Dry-run a proposed booking. Read locks only, nothing is committed,
    /// and the full conflict list (hard and soft) comes back.
    pub async fn check_conflicts(
        &self,
        window: Span,
        requests: Vec<AllocationRequest>,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Conflict>, EngineError> {
        validate_query_window(&window)?;
        let requests = normalize_requests(&requests)?;

        let cfg = self.config_snapshot();
        let now = now_ms();
        let mut conflicts = Vec::new();
        for req in &requests {
            let rs = self
                .get_resource(&req.resource_id)
                .ok_or(EngineError::NotFound(req.resource_id))?;
            let guard = rs.read().await;
            conflicts.extend(detect(
                &guard,
                &window,
                req,
                exclude,
                cfg.open_by_default,
                cfg.advance_horizon_ms,
                now,
            ));
        }
        Ok(conflicts)
    }

    /// Ranked open slots for a duration within a range. Resources are
    /// filtered by the requirement, their free windows snapshotted under
    /// read locks, then ranking runs without holding anything.
    pub async fn find_slots(
        &self,
        duration: Ms,
        range: Span,
        requirement: Requirement,
        prefs: Preferences,
        granularity_override: Option<Ms>,
    ) -> Result<SlotOutcome, EngineError> {
        validate_query_window(&range)?;
        if duration <= 0 || duration > MAX_SPAN_DURATION_MS {
            return Err(EngineError::validation("slot duration out of range"));
        }
        if requirement.count == 0 {
            return Err(EngineError::validation("resource count must be at least 1"));
        }
        let mut cfg = self.config_snapshot();
        if let Some(g) = granularity_override {
            if g < MINUTE_MS {
                return Err(EngineError::validation("granularity below one minute"));
            }
            cfg.slots.granularity_ms = g;
        }

        // A configured horizon clips the search range so every returned
        // slot is actually bookable right now.
        let mut range = range;
        if let Some(horizon) = cfg.advance_horizon_ms {
            range.end = range.end.min(now_ms() + horizon);
            if range.end <= range.start {
                return Ok(SlotOutcome {
                    slots: Vec::new(),
                    reason: Some(super::slots::NO_CAPACITY_IN_RANGE),
                });
            }
        }

        let mut candidates = Vec::new();
        let resource_ids: Vec<Ulid> = self.resources.iter().map(|e| *e.key()).collect();
        for rid in resource_ids {
            let Some(rs) = self.get_resource(&rid) else { continue };
            let guard = rs.read().await;
            if !guard.status.is_bookable() {
                continue;
            }
            if requirement.kind.is_some_and(|k| k != guard.kind) {
                continue;
            }
            if guard.capacity < requirement.min_capacity.max(1) {
                continue;
            }
            if !guard.missing_skills(&requirement.skills).is_empty() {
                continue;
            }
            let windows = spans_with_free(&guard, &range, cfg.open_by_default, 1, None);
            candidates.push(CandidateResource {
                id: rid,
                preferred: prefs.preferred_resources.contains(&rid),
                windows,
            });
        }

        Ok(rank_slots(duration, &range, &candidates, requirement.count, &prefs, &cfg.slots))
    }

    pub async fn get_utilization(
        &self,
        resource_ids: &[Ulid],
        from: Ms,
        to: Ms,
        group_by: GroupBy,
    ) -> Result<Vec<UtilizationRecord>, EngineError> {
        let query = Span { start: from, end: to };
        validate_query_window(&query)?;
        if resource_ids.len() > MAX_IN_CLAUSE_IDS {
            return Err(EngineError::LimitExceeded("too many resource ids"));
        }
        let open_by_default = self.config_snapshot().open_by_default;

        let ids: Vec<Ulid> = if resource_ids.is_empty() {
            let mut all: Vec<Ulid> = self.resources.iter().map(|e| *e.key()).collect();
            all.sort();
            all
        } else {
            resource_ids.to_vec()
        };

        let mut records = Vec::new();
        for rid in ids {
            let rs = self.get_resource(&rid).ok_or(EngineError::NotFound(rid))?;
            let guard = rs.read().await;
            records.extend(utilization_for(&guard, &query, group_by, open_by_default));
        }
        Ok(records)
    }

    pub async fn list_resources(&self) -> Vec<ResourceInfo> {
        let resource_ids: Vec<Ulid> = self.resources.iter().map(|e| *e.key()).collect();
        let mut out = Vec::with_capacity(resource_ids.len());
        for rid in resource_ids {
            let Some(rs) = self.get_resource(&rid) else { continue };
            let guard = rs.read().await;
            out.push(ResourceInfo {
                id: guard.id,
                kind: guard.kind,
                name: guard.name.clone(),
                capacity: guard.capacity,
                skills: guard.skills.iter().cloned().collect(),
                status: guard.status,
                classification: guard.classification.clone(),
            });
        }
        out.sort_by_key(|r| r.id);
        out
    }

    pub fn list_appointments(&self) -> Vec<AppointmentInfo> {
        let mut out: Vec<AppointmentInfo> = self
            .appointments
            .iter()
            .map(|e| AppointmentInfo {
                id: e.id,
                title: e.title.clone(),
                span: e.span,
                status: e.status,
                reference: e.reference.clone(),
                resource_ids: e.allocations.iter().map(|(rid, _)| *rid).collect(),
            })
            .collect();
        out.sort_by_key(|a| a.id);
        out
    }

    pub fn get_appointment(&self, id: &Ulid) -> Option<AppointmentInfo> {
        self.appointments.get(id).map(|e| AppointmentInfo {
            id: e.id,
            title: e.title.clone(),
            span: e.span,
            status: e.status,
            reference: e.reference.clone(),
            resource_ids: e.allocations.iter().map(|(rid, _)| *rid).collect(),
        })
    }
}
