//! Mutations: resource and calendar CRUD, atomic multi-resource booking,
//! lifecycle transitions and WAL compaction.
//!
//! Every multi-resource operation acquires write locks in sorted id order,
//! validates everything first, then appends one WAL event and applies it to
//! all held guards. Either all ledgers change or none do.

use std::sync::Arc;

use tokio::sync::{oneshot, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::classify::classify;
use super::conflict::{detect, normalize_requests, now_ms, validate_span};
use super::{Engine, EngineError, IndustryProfile, WalCommand};

impl Engine {
    pub async fn create_resource(
        &self,
        id: Ulid,
        kind: ResourceKind,
        name: String,
        capacity: u32,
        skills: Vec<String>,
        status: ResourceStatus,
    ) -> Result<(), EngineError> {
        if self.resources.len() >= MAX_RESOURCES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::validation("resource name length out of range"));
        }
        if capacity == 0 {
            return Err(EngineError::validation("capacity must be at least 1"));
        }
        if skills.len() > MAX_SKILLS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many skills"));
        }
        if skills.iter().any(|s| s.is_empty() || s.len() > MAX_SKILL_LEN) {
            return Err(EngineError::validation("skill name length out of range"));
        }
        if self.resources.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::ResourceCreated {
            id,
            kind,
            name: name.clone(),
            capacity,
            skills: skills.clone(),
            status,
        };
        self.wal_append(&event).await?;

        let mut rs =
            ResourceState::new(id, kind, name.clone(), capacity, skills.into_iter().collect(), status);
        let suggestion = classify(&name, self.config_snapshot().industry_profile);
        rs.classification = Some((suggestion.code.to_string(), suggestion.confidence));
        self.resources.insert(id, Arc::new(RwLock::new(rs)));
        self.notify.send(id, &event);
        Ok(())
    }

    /// Patch semantics: `None` keeps the current value. The persisted event
    /// always carries the full post-update state.
    pub async fn update_resource(
        &self,
        id: Ulid,
        name: Option<String>,
        capacity: Option<u32>,
        status: Option<ResourceStatus>,
    ) -> Result<(), EngineError> {
        if let Some(ref n) = name
            && (n.is_empty() || n.len() > MAX_NAME_LEN)
        {
            return Err(EngineError::validation("resource name length out of range"));
        }
        if capacity == Some(0) {
            return Err(EngineError::validation("capacity must be at least 1"));
        }
        let rs = self.get_resource(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;

        // Lowering capacity below what the ledger already commits would
        // oversubscribe existing windows.
        if let Some(new_capacity) = capacity {
            let peak = guard.peak_committed();
            if new_capacity < peak {
                return Err(EngineError::validation(format!(
                    "capacity {new_capacity} is below the {peak} unit(s) already committed",
                )));
            }
        }

        let event = Event::ResourceUpdated {
            id,
            name: name.unwrap_or_else(|| guard.name.clone()),
            capacity: capacity.unwrap_or(guard.capacity),
            status: status.unwrap_or(guard.status),
        };
        self.wal_append(&event).await?;
        if let Event::ResourceUpdated { name, capacity, status, .. } = &event {
            guard.name = name.clone();
            guard.capacity = *capacity;
            guard.status = *status;
        }
        self.notify.send(id, &event);
        Ok(())
    }

    /// A resource with live allocations cannot be deleted; cancel or
    /// reschedule its appointments first (or retire it).
    pub async fn delete_resource(&self, id: Ulid) -> Result<(), EngineError> {
        let rs = self.get_resource(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.write().await;
        if !guard.ledger.is_empty() {
            return Err(EngineError::validation(
                "resource has allocations; cancel its appointments or retire it",
            ));
        }
        let rule_ids: Vec<Ulid> = guard.calendar.weekly.iter().map(|r| r.id).collect();
        drop(guard);

        let event = Event::ResourceDeleted { id };
        self.wal_append(&event).await?;
        self.resources.remove(&id);
        for rule_id in rule_ids {
            self.rule_to_resource.remove(&rule_id);
        }
        self.notify.send(id, &event);
        Ok(())
    }

    pub async fn add_weekly_rule(
        &self,
        id: Ulid,
        resource_id: Ulid,
        weekday: u8,
        start_minute: u32,
        end_minute: u32,
    ) -> Result<(), EngineError> {
        if weekday > 6 {
            return Err(EngineError::validation("weekday must be 0 (Monday) .. 6 (Sunday)"));
        }
        if start_minute >= end_minute || end_minute > 1440 {
            return Err(EngineError::validation(
                "rule minutes must satisfy 0 <= start < end <= 1440",
            ));
        }
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let mut guard = rs.write().await;
        if guard.calendar.weekly.len() >= MAX_WEEKLY_RULES_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many weekly rules on resource"));
        }
        let candidate = WeeklyRule { id, weekday, start_minute, end_minute };
        if let Some(hit) = guard.calendar.weekly.iter().find(|r| r.overlaps(&candidate)) {
            return Err(EngineError::validation(format!(
                "rule overlaps existing rule {} on the same weekday",
                hit.id
            )));
        }

        let event = Event::WeeklyRuleAdded { id, resource_id, weekday, start_minute, end_minute };
        self.persist_calendar_event(resource_id, &mut guard, &event).await
    }

    pub async fn remove_weekly_rule(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (resource_id, mut guard) = self.resolve_rule_write(&id).await?;
        let event = Event::WeeklyRuleRemoved { id, resource_id };
        self.persist_calendar_event(resource_id, &mut guard, &event).await?;
        Ok(resource_id)
    }

    /// Idempotent: adding a day that is already closed is a no-op.
    pub async fn add_exception(&self, resource_id: Ulid, day: i64) -> Result<(), EngineError> {
        let day_ms = day * DAY_MS;
        if !(MIN_VALID_TIMESTAMP_MS..MAX_VALID_TIMESTAMP_MS).contains(&day_ms) {
            return Err(EngineError::validation("exception day outside supported range"));
        }
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let mut guard = rs.write().await;
        if guard.calendar.is_exception(day) {
            return Ok(());
        }
        if guard.calendar.exceptions.len() >= MAX_EXCEPTIONS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many exception days on resource"));
        }

        let event = Event::ExceptionAdded { resource_id, day };
        self.persist_calendar_event(resource_id, &mut guard, &event).await
    }

    pub async fn remove_exception(&self, resource_id: Ulid, day: i64) -> Result<(), EngineError> {
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let mut guard = rs.write().await;
        if !guard.calendar.is_exception(day) {
            return Ok(());
        }

        let event = Event::ExceptionRemoved { resource_id, day };
        self.persist_calendar_event(resource_id, &mut guard, &event).await
    }

    pub async fn set_config(
        &self,
        open_by_default: Option<bool>,
        industry_profile: Option<String>,
        advance_horizon_ms: Option<Option<Ms>>,
    ) -> Result<(), EngineError> {
        let mut cfg = self.config_snapshot();
        if let Some(v) = open_by_default {
            cfg.open_by_default = v;
        }
        if let Some(ref p) = industry_profile {
            cfg.industry_profile = IndustryProfile::parse(p).ok_or_else(|| {
                EngineError::validation(format!("unknown industry profile: {p}"))
            })?;
        }
        if let Some(h) = advance_horizon_ms {
            if h.is_some_and(|ms| ms <= 0) {
                return Err(EngineError::validation("advance horizon must be positive"));
            }
            cfg.advance_horizon_ms = h;
        }

        let event = Event::ConfigChanged {
            open_by_default: cfg.open_by_default,
            industry_profile: cfg.industry_profile.as_str().to_string(),
            advance_horizon_ms: cfg.advance_horizon_ms,
        };
        self.wal_append(&event).await?;
        self.set_config_applied(cfg);
        Ok(())
    }

    /// Book one appointment against one or more resources, all-or-nothing.
    ///
    /// Write locks are taken in sorted resource-id order, every allocation
    /// is conflict-checked under those locks, and only a fully clean batch
    /// produces a WAL event. Hard conflicts abort with the complete list.
    pub async fn book_appointment(
        &self,
        id: Ulid,
        title: String,
        span: Span,
        status: AppointmentStatus,
        code: Option<String>,
        requests: Vec<AllocationRequest>,
        expires_at: Option<Ms>,
    ) -> Result<AppointmentInfo, EngineError> {
        validate_span(&span)?;
        if title.is_empty() || title.len() > MAX_TITLE_LEN {
            return Err(EngineError::validation("title length out of range"));
        }
        if !matches!(status, AppointmentStatus::Tentative | AppointmentStatus::Confirmed) {
            return Err(EngineError::validation(
                "new appointments start tentative or confirmed",
            ));
        }
        if expires_at.is_some() && status != AppointmentStatus::Tentative {
            return Err(EngineError::validation("only tentative appointments expire"));
        }
        if self.appointments.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let requests = normalize_requests(&requests)?;

        // Sorted lock order; normalize_requests already sorted and deduped.
        let mut guards: Vec<OwnedRwLockWriteGuard<ResourceState>> =
            Vec::with_capacity(requests.len());
        for req in &requests {
            let rs = self
                .get_resource(&req.resource_id)
                .ok_or(EngineError::NotFound(req.resource_id))?;
            let guard = rs.write_owned().await;
            if guard.ledger.len() >= MAX_LEDGER_ENTRIES_PER_RESOURCE {
                return Err(EngineError::LimitExceeded("too many allocations on resource"));
            }
            guards.push(guard);
        }

        let cfg = self.config_snapshot();
        let now = now_ms();
        let mut conflicts = Vec::new();
        for (req, guard) in requests.iter().zip(&guards) {
            conflicts.extend(detect(
                guard,
                &span,
                req,
                None,
                cfg.open_by_default,
                cfg.advance_horizon_ms,
                now,
            ));
        }
        if conflicts.iter().any(Conflict::is_hard) {
            return Err(EngineError::Conflicts(conflicts));
        }

        let code = code.or_else(|| {
            Some(classify(&title, cfg.industry_profile).code.to_string())
        });
        let reference = self.next_reference();
        let allocations: Vec<(Ulid, u32)> =
            requests.iter().map(|r| (r.resource_id, r.quantity)).collect();

        let event = Event::AppointmentBooked {
            id,
            title: title.clone(),
            span,
            status,
            code: code.clone(),
            reference: reference.clone(),
            allocations: allocations.clone(),
            expires_at,
        };
        self.wal_append(&event).await?;

        for (guard, (_, quantity)) in guards.iter_mut().zip(&allocations) {
            guard.insert_allocation(AllocationInterval {
                appointment_id: id,
                span,
                quantity: *quantity,
            });
        }
        self.appointments.insert(
            id,
            Appointment {
                id,
                title: title.clone(),
                span,
                status,
                code,
                reference: reference.clone(),
                allocations: allocations.clone(),
                expires_at,
            },
        );
        for (resource_id, _) in &allocations {
            self.notify.send(*resource_id, &event);
        }

        Ok(AppointmentInfo {
            id,
            title,
            span,
            status,
            reference,
            resource_ids: allocations.iter().map(|(rid, _)| *rid).collect(),
        })
    }

    /// Move an appointment to a new window, a new allocation set, or both.
    /// The appointment's own ledger entries are excluded from the conflict
    /// check so it may shift within the space it already occupies.
    pub async fn reschedule_appointment(
        &self,
        id: Ulid,
        new_span: Option<Span>,
        new_requests: Option<Vec<AllocationRequest>>,
    ) -> Result<(), EngineError> {
        if new_span.is_none() && new_requests.is_none() {
            return Err(EngineError::validation(
                "a reschedule changes the window, the allocations, or both",
            ));
        }
        // Same stale-snapshot hazard as change_status: the allocation set
        // read here decides which locks to take, and a racing mutation can
        // change it before the locks are held. Re-validate under the locks.
        for _ in 0..LIFECYCLE_LOCK_RETRIES {
            let (status, old_span, old_allocations) = {
                let apt = self.appointments.get(&id).ok_or(EngineError::NotFound(id))?;
                (apt.status, apt.span, apt.allocations.clone())
            };
            if status.is_terminal() {
                return Err(EngineError::validation(format!(
                    "cannot reschedule a {} appointment",
                    status.as_str()
                )));
            }
            let span = new_span.unwrap_or(old_span);
            validate_span(&span)?;
            let requests = match &new_requests {
                Some(reqs) => normalize_requests(reqs)?,
                None => old_allocations
                    .iter()
                    .map(|(rid, q)| AllocationRequest::new(*rid, *q))
                    .collect(),
            };

            // Lock the union of old and new resources in sorted id order so
            // the freed and claimed ledgers change under one serialization
            // scope.
            let mut lock_ids: Vec<Ulid> = old_allocations
                .iter()
                .map(|(rid, _)| *rid)
                .chain(requests.iter().map(|r| r.resource_id))
                .collect();
            lock_ids.sort_unstable();
            lock_ids.dedup();

            let mut guards: Vec<(Ulid, OwnedRwLockWriteGuard<ResourceState>)> =
                Vec::with_capacity(lock_ids.len());
            for rid in &lock_ids {
                let rs = self.get_resource(rid).ok_or(EngineError::NotFound(*rid))?;
                guards.push((*rid, rs.write_owned().await));
            }

            {
                let apt = self.appointments.get(&id).ok_or(EngineError::NotFound(id))?;
                if apt.status.is_terminal() {
                    // A cancel won the race while we were locking.
                    return Err(EngineError::validation(format!(
                        "cannot reschedule a {} appointment",
                        apt.status.as_str()
                    )));
                }
                if apt.allocations != old_allocations || apt.span != old_span {
                    continue; // lock set went stale
                }
            }

            return self
                .commit_reschedule(id, span, requests, guards, &lock_ids)
                .await;
        }
        Err(EngineError::Concurrency("appointment kept changing under reschedule"))
    }

    async fn commit_reschedule(
        &self,
        id: Ulid,
        span: Span,
        requests: Vec<AllocationRequest>,
        mut guards: Vec<(Ulid, OwnedRwLockWriteGuard<ResourceState>)>,
        lock_ids: &[Ulid],
    ) -> Result<(), EngineError> {
        let cfg = self.config_snapshot();
        let now = now_ms();
        let mut conflicts = Vec::new();
        for req in &requests {
            let (_, guard) = guards
                .iter()
                .find(|(rid, _)| *rid == req.resource_id)
                .ok_or(EngineError::NotFound(req.resource_id))?;
            if guard.ledger.len() >= MAX_LEDGER_ENTRIES_PER_RESOURCE {
                return Err(EngineError::LimitExceeded("too many allocations on resource"));
            }
            conflicts.extend(detect(
                guard,
                &span,
                req,
                Some(id),
                cfg.open_by_default,
                cfg.advance_horizon_ms,
                now,
            ));
        }
        if conflicts.iter().any(Conflict::is_hard) {
            return Err(EngineError::Conflicts(conflicts));
        }

        let allocations: Vec<(Ulid, u32)> =
            requests.iter().map(|r| (r.resource_id, r.quantity)).collect();
        let event = Event::AppointmentRescheduled {
            id,
            span,
            allocations: allocations.clone(),
        };
        self.wal_append(&event).await?;

        for (rid, guard) in guards.iter_mut() {
            guard.remove_allocations(id);
            if let Some((_, quantity)) = allocations.iter().find(|(r, _)| r == &*rid) {
                guard.insert_allocation(AllocationInterval {
                    appointment_id: id,
                    span,
                    quantity: *quantity,
                });
            }
        }
        if let Some(mut apt) = self.appointments.get_mut(&id) {
            apt.span = span;
            apt.allocations = allocations;
        }
        for rid in lock_ids {
            self.notify.send(*rid, &event);
        }
        Ok(())
    }

    /// Cancel releases capacity immediately. Cancelling an already
    /// cancelled appointment succeeds without effect.
    pub async fn cancel_appointment(&self, id: Ulid) -> Result<(), EngineError> {
        self.change_status(id, AppointmentStatus::Cancelled).await
    }

    /// Drive the lifecycle forward: tentative → confirmed → completed,
    /// non-terminal → cancelled.
    pub async fn transition_appointment(
        &self,
        id: Ulid,
        next: AppointmentStatus,
    ) -> Result<(), EngineError> {
        if next == AppointmentStatus::Tentative {
            return Err(EngineError::validation("appointments cannot return to tentative"));
        }
        self.change_status(id, next).await
    }

    async fn change_status(
        &self,
        id: Ulid,
        next: AppointmentStatus,
    ) -> Result<(), EngineError> {
        // Status changes take the same locks as bookings so two racing
        // transitions serialize and validate against the committed state.
        // A racing reschedule can swap the allocation set between the
        // snapshot and the lock acquisition; re-read under the locks and
        // retry with the new set when that happens.
        for _ in 0..LIFECYCLE_LOCK_RETRIES {
            let allocations = {
                let apt = self.appointments.get(&id).ok_or(EngineError::NotFound(id))?;
                apt.allocations.clone()
            };

            let mut guards = Vec::with_capacity(allocations.len());
            for (resource_id, _) in &allocations {
                if let Some(rs) = self.get_resource(resource_id) {
                    guards.push(rs.write_owned().await);
                }
            }

            let current = {
                let apt = self.appointments.get(&id).ok_or(EngineError::NotFound(id))?;
                if apt.allocations != allocations {
                    continue; // lock set went stale
                }
                apt.status
            };
            return self.commit_status(id, current, next, &allocations, guards).await;
        }
        Err(EngineError::Concurrency("appointment allocations kept changing"))
    }

    async fn commit_status(
        &self,
        id: Ulid,
        current: AppointmentStatus,
        next: AppointmentStatus,
        allocations: &[(Ulid, u32)],
        mut guards: Vec<OwnedRwLockWriteGuard<ResourceState>>,
    ) -> Result<(), EngineError> {
        if current == next {
            if next == AppointmentStatus::Cancelled {
                return Ok(()); // idempotent cancel
            }
            return Err(EngineError::validation(format!(
                "appointment is already {}",
                next.as_str()
            )));
        }
        if !current.can_transition_to(next) {
            return Err(EngineError::validation(format!(
                "cannot move appointment from {} to {}",
                current.as_str(),
                next.as_str()
            )));
        }

        let event = Event::AppointmentStatusChanged { id, status: next };
        self.wal_append(&event).await?;

        if next == AppointmentStatus::Cancelled {
            for guard in guards.iter_mut() {
                guard.remove_allocations(id);
            }
        }
        if let Some(mut apt) = self.appointments.get_mut(&id) {
            apt.status = next;
            if next == AppointmentStatus::Confirmed {
                apt.expires_at = None;
            }
        }
        for (resource_id, _) in allocations {
            self.notify.send(*resource_id, &event);
        }
        Ok(())
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state: config first (classification on replay
    /// depends on it), then resources with their calendars, then live
    /// appointments.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let cfg = self.config_snapshot();
        events.push(Event::ConfigChanged {
            open_by_default: cfg.open_by_default,
            industry_profile: cfg.industry_profile.as_str().to_string(),
            advance_horizon_ms: cfg.advance_horizon_ms,
        });

        let resource_ids: Vec<Ulid> = self.resources.iter().map(|e| *e.key()).collect();
        for id in resource_ids {
            let Some(rs) = self.get_resource(&id) else { continue };
            let guard = rs.read().await;
            events.push(Event::ResourceCreated {
                id: guard.id,
                kind: guard.kind,
                name: guard.name.clone(),
                capacity: guard.capacity,
                skills: guard.skills.iter().cloned().collect(),
                status: guard.status,
            });
            for rule in &guard.calendar.weekly {
                events.push(Event::WeeklyRuleAdded {
                    id: rule.id,
                    resource_id: guard.id,
                    weekday: rule.weekday,
                    start_minute: rule.start_minute,
                    end_minute: rule.end_minute,
                });
            }
            for day in &guard.calendar.exceptions {
                events.push(Event::ExceptionAdded { resource_id: guard.id, day: *day });
            }
        }

        let mut appointments: Vec<Appointment> =
            self.appointments.iter().map(|e| e.value().clone()).collect();
        appointments.sort_by_key(|a| a.id);
        for apt in appointments {
            events.push(Event::AppointmentBooked {
                id: apt.id,
                title: apt.title,
                span: apt.span,
                status: apt.status,
                code: apt.code,
                reference: apt.reference,
                allocations: apt.allocations,
                expires_at: apt.expires_at,
            });
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Wal(e.to_string()))
    }
}
