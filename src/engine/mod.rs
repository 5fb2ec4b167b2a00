mod availability;
mod booking;
mod calendar;
mod classify;
mod conflict;
mod error;
mod queries;
mod slots;
mod utilization;

pub use availability::{availability, free_windows_in, merge_adjacent, spans_with_free, subtract_spans};
pub use calendar::{expand_calendar, open_spans};
pub use classify::{classify, IndustryProfile};
pub use conflict::{detect, normalize_requests, now_ms, validate_query_window, validate_span};
pub use error::EngineError;
pub use slots::{
    CandidateResource, Preferences, Requirement, SlotConfig, SlotOutcome, SlotWeights,
    NO_CAPACITY_IN_RANGE,
};
pub use utilization::{civil_from_day, day_from_civil, utilization_for};

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedResourceState = Arc<RwLock<ResourceState>>;

/// Per-tenant behavior switches. The persisted part travels through
/// `Event::ConfigChanged`; slot tuning is runtime-only.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Treat resources without a calendar as always open.
    pub open_by_default: bool,
    pub industry_profile: IndustryProfile,
    /// How far ahead bookings may end, `None` = unlimited.
    pub advance_horizon_ms: Option<Ms>,
    pub slots: SlotConfig,
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
    result: &io::Result<()>,
) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

pub struct Engine {
    pub resources: DashMap<Ulid, SharedResourceState>,
    /// Appointment mutations always run under the resource locks of their
    /// allocations, so the entry lock here is never held across an await.
    pub(super) appointments: DashMap<Ulid, Appointment>,
    /// Reverse lookup: weekly rule id → resource id.
    pub(super) rule_to_resource: DashMap<Ulid, Ulid>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    config: std::sync::RwLock<EngineConfig>,
    /// Highest APT-nnnnnn sequence handed out so far.
    reference_seq: AtomicU64,
}

/// Apply a calendar event to a ResourceState (no locking; caller holds
/// the lock).
fn apply_calendar_event(rs: &mut ResourceState, event: &Event, rule_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::WeeklyRuleAdded { id, resource_id, weekday, start_minute, end_minute } => {
            rs.calendar.weekly.push(WeeklyRule {
                id: *id,
                weekday: *weekday,
                start_minute: *start_minute,
                end_minute: *end_minute,
            });
            rule_map.insert(*id, *resource_id);
        }
        Event::WeeklyRuleRemoved { id, .. } => {
            rs.calendar.weekly.retain(|r| r.id != *id);
            rule_map.remove(id);
        }
        Event::ExceptionAdded { day, .. } => {
            if !rs.calendar.exceptions.contains(day) {
                rs.calendar.exceptions.push(*day);
            }
        }
        Event::ExceptionRemoved { day, .. } => {
            rs.calendar.exceptions.retain(|d| d != day);
        }
        _ => {}
    }
}

fn reference_sequence(reference: &str) -> Option<u64> {
    reference.strip_prefix("APT-").and_then(|s| s.parse().ok())
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            resources: DashMap::new(),
            appointments: DashMap::new(),
            rule_to_resource: DashMap::new(),
            wal_tx,
            notify,
            config: std::sync::RwLock::new(EngineConfig::default()),
            reference_seq: AtomicU64::new(0),
        };

        // Replay events. We're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context (e.g. lazy
        // tenant creation).
        for event in &events {
            engine.replay_event(event);
        }

        Ok(engine)
    }

    fn replay_event(&self, event: &Event) {
        match event {
            Event::ResourceCreated { id, kind, name, capacity, skills, status } => {
                let mut rs = ResourceState::new(
                    *id,
                    *kind,
                    name.clone(),
                    *capacity,
                    skills.iter().cloned().collect(),
                    *status,
                );
                let suggestion = classify(name, self.config_snapshot().industry_profile);
                rs.classification = Some((suggestion.code.to_string(), suggestion.confidence));
                self.resources.insert(*id, Arc::new(RwLock::new(rs)));
            }
            Event::ResourceUpdated { id, name, capacity, status } => {
                if let Some(entry) = self.resources.get(id) {
                    let rs_arc = entry.value().clone();
                    drop(entry);
                    let mut rs = rs_arc.try_write().expect("replay: uncontended write");
                    rs.name = name.clone();
                    rs.capacity = *capacity;
                    rs.status = *status;
                }
            }
            Event::ResourceDeleted { id } => {
                if let Some((_, rs_arc)) = self.resources.remove(id) {
                    let rs = rs_arc.try_read().expect("replay: uncontended read");
                    for rule in &rs.calendar.weekly {
                        self.rule_to_resource.remove(&rule.id);
                    }
                }
            }
            Event::WeeklyRuleAdded { resource_id, .. }
            | Event::WeeklyRuleRemoved { resource_id, .. }
            | Event::ExceptionAdded { resource_id, .. }
            | Event::ExceptionRemoved { resource_id, .. } => {
                if let Some(entry) = self.resources.get(resource_id) {
                    let rs_arc = entry.value().clone();
                    drop(entry);
                    let mut rs = rs_arc.try_write().expect("replay: uncontended write");
                    apply_calendar_event(&mut rs, event, &self.rule_to_resource);
                }
            }
            Event::AppointmentBooked {
                id,
                title,
                span,
                status,
                code,
                reference,
                allocations,
                expires_at,
            } => {
                if let Some(seq) = reference_sequence(reference) {
                    self.reference_seq.fetch_max(seq, Ordering::Relaxed);
                }
                if *status != AppointmentStatus::Cancelled {
                    for (resource_id, quantity) in allocations {
                        if let Some(entry) = self.resources.get(resource_id) {
                            let rs_arc = entry.value().clone();
                            drop(entry);
                            let mut rs =
                                rs_arc.try_write().expect("replay: uncontended write");
                            rs.insert_allocation(AllocationInterval {
                                appointment_id: *id,
                                span: *span,
                                quantity: *quantity,
                            });
                        }
                    }
                }
                self.appointments.insert(
                    *id,
                    Appointment {
                        id: *id,
                        title: title.clone(),
                        span: *span,
                        status: *status,
                        code: code.clone(),
                        reference: reference.clone(),
                        allocations: allocations.clone(),
                        expires_at: *expires_at,
                    },
                );
            }
            Event::AppointmentRescheduled { id, span, allocations } => {
                let Some(mut apt) = self.appointments.get_mut(id) else { return };
                for (resource_id, _) in &apt.allocations {
                    if let Some(entry) = self.resources.get(resource_id) {
                        let rs_arc = entry.value().clone();
                        drop(entry);
                        let mut rs = rs_arc.try_write().expect("replay: uncontended write");
                        rs.remove_allocations(*id);
                    }
                }
                for (resource_id, quantity) in allocations {
                    if let Some(entry) = self.resources.get(resource_id) {
                        let rs_arc = entry.value().clone();
                        drop(entry);
                        let mut rs = rs_arc.try_write().expect("replay: uncontended write");
                        rs.insert_allocation(AllocationInterval {
                            appointment_id: *id,
                            span: *span,
                            quantity: *quantity,
                        });
                    }
                }
                apt.span = *span;
                apt.allocations = allocations.clone();
            }
            Event::AppointmentStatusChanged { id, status } => {
                let Some(mut apt) = self.appointments.get_mut(id) else { return };
                if *status == AppointmentStatus::Cancelled {
                    for (resource_id, _) in &apt.allocations {
                        if let Some(entry) = self.resources.get(resource_id) {
                            let rs_arc = entry.value().clone();
                            drop(entry);
                            let mut rs =
                                rs_arc.try_write().expect("replay: uncontended write");
                            rs.remove_allocations(*id);
                        }
                    }
                }
                if *status == AppointmentStatus::Confirmed {
                    apt.expires_at = None;
                }
                apt.status = *status;
            }
            Event::ConfigChanged { open_by_default, industry_profile, advance_horizon_ms } => {
                let mut cfg = self.config.write().unwrap_or_else(|e| e.into_inner());
                cfg.open_by_default = *open_by_default;
                cfg.industry_profile =
                    IndustryProfile::parse(industry_profile).unwrap_or_default();
                cfg.advance_horizon_ms = *advance_horizon_ms;
            }
        }
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Wal(e.to_string()))
    }

    pub fn get_resource(&self, id: &Ulid) -> Option<SharedResourceState> {
        self.resources.get(id).map(|e| e.value().clone())
    }

    pub fn resource_for_rule(&self, rule_id: &Ulid) -> Option<Ulid> {
        self.rule_to_resource.get(rule_id).map(|e| *e.value())
    }

    pub fn config_snapshot(&self) -> EngineConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(super) fn set_config_applied(&self, cfg: EngineConfig) {
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = cfg;
    }

    pub(super) fn next_reference(&self) -> String {
        let seq = self.reference_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("APT-{seq:06}")
    }

    /// WAL-append + apply + notify in one call for calendar mutations.
    pub(super) async fn persist_calendar_event(
        &self,
        resource_id: Ulid,
        rs: &mut ResourceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_calendar_event(rs, event, &self.rule_to_resource);
        self.notify.send(resource_id, event);
        Ok(())
    }

    /// Lookup rule → resource, get resource, acquire write lock.
    pub(super) async fn resolve_rule_write(
        &self,
        rule_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<ResourceState>), EngineError> {
        let resource_id = self
            .resource_for_rule(rule_id)
            .ok_or(EngineError::NotFound(*rule_id))?;
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.write_owned().await;
        Ok((resource_id, guard))
    }

    /// Tentative appointments whose expiry has passed, for the reaper.
    pub fn collect_expired_tentative(&self, now: Ms) -> Vec<Ulid> {
        self.appointments
            .iter()
            .filter(|e| {
                e.status == AppointmentStatus::Tentative
                    && e.expires_at.is_some_and(|t| t <= now)
            })
            .map(|e| e.id)
            .collect()
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
