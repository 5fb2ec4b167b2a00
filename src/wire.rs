use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use ulid::Ulid;

use crate::auth::RostraAuthSource;
use crate::engine::{classify, Engine, EngineError, IndustryProfile, Preferences, Requirement};
use crate::limits::MAX_CLASSIFY_TEXT_LEN;
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command};
use crate::tenant::TenantManager;

pub struct RostraHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<RostraQueryParser>,
}

impl RostraHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(RostraQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    async fn run(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(engine, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(
        &self,
        engine: &Engine,
        cmd: Command,
    ) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::InsertResource { id, kind, name, capacity, skills, status } => {
                engine
                    .create_resource(id, kind, name, capacity, skills, status)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateResource { id, name, capacity, status } => {
                engine
                    .update_resource(id, name, capacity, status)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteResource { id } => {
                engine.delete_resource(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertWeeklyRule { id, resource_id, weekday, start_minute, end_minute } => {
                engine
                    .add_weekly_rule(id, resource_id, weekday, start_minute, end_minute)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::DeleteWeeklyRule { id } => {
                engine.remove_weekly_rule(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertException { resource_id, day } => {
                engine.add_exception(resource_id, day).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::DeleteException { resource_id, day } => {
                engine.remove_exception(resource_id, day).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertAppointment {
                id,
                title,
                start,
                end,
                status,
                code,
                expires_at,
                allocations,
            } => {
                let rows = allocations.len();
                let requests: Vec<AllocationRequest> = allocations
                    .into_iter()
                    .map(|(resource_id, quantity, required_skills)| AllocationRequest {
                        resource_id,
                        quantity,
                        required_skills,
                    })
                    .collect();
                engine
                    .book_appointment(
                        id,
                        title,
                        Span { start, end },
                        status.unwrap_or(AppointmentStatus::Confirmed),
                        code,
                        requests,
                        expires_at,
                    )
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(rows))])
            }
            Command::RescheduleAppointment { id, start, end, allocations } => {
                // Parser guarantees start and end come together.
                let span = start.zip(end).map(|(start, end)| Span { start, end });
                let requests = allocations.map(|a| {
                    a.into_iter()
                        .map(|(resource_id, quantity)| AllocationRequest::new(resource_id, quantity))
                        .collect()
                });
                engine
                    .reschedule_appointment(id, span, requests)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::SetAppointmentStatus { id, status } => {
                engine.transition_appointment(id, status).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::CancelAppointment { id } => {
                engine.cancel_appointment(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectResources => {
                let schema = Arc::new(resources_schema());
                let rows: Vec<PgWireResult<_>> = engine
                    .list_resources()
                    .await
                    .into_iter()
                    .map(|r| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&r.id.to_string())?;
                        encoder.encode_field(&r.kind.as_str())?;
                        encoder.encode_field(&r.name)?;
                        encoder.encode_field(&(r.capacity as i32))?;
                        encoder.encode_field(&r.skills.join(","))?;
                        encoder.encode_field(&r.status.as_str())?;
                        encoder.encode_field(&r.classification.as_ref().map(|(c, _)| c.clone()))?;
                        encoder.encode_field(&r.classification.as_ref().map(|(_, conf)| *conf))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectAppointments => {
                let schema = Arc::new(appointments_schema());
                let rows: Vec<PgWireResult<_>> = engine
                    .list_appointments()
                    .into_iter()
                    .map(|a| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&a.id.to_string())?;
                        encoder.encode_field(&a.reference)?;
                        encoder.encode_field(&a.title)?;
                        encoder.encode_field(&a.span.start)?;
                        encoder.encode_field(&a.span.end)?;
                        encoder.encode_field(&a.status.as_str())?;
                        encoder.encode_field(&join_ids(&a.resource_ids))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectAvailability { resource_ids, start, end } => {
                let windows = engine
                    .find_availability(&resource_ids, start, end)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(availability_schema());
                let rows: Vec<PgWireResult<_>> = windows
                    .into_iter()
                    .map(|(rid, w)| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&rid.to_string())?;
                        encoder.encode_field(&w.span.start)?;
                        encoder.encode_field(&w.span.end)?;
                        encoder.encode_field(&(w.free as i32))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectConflicts { resource_ids, start, end, quantity, skills } => {
                let requests: Vec<AllocationRequest> = resource_ids
                    .into_iter()
                    .map(|rid| AllocationRequest {
                        resource_id: rid,
                        quantity,
                        required_skills: skills.clone(),
                    })
                    .collect();
                let conflicts = engine
                    .check_conflicts(Span { start, end }, requests, None)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(conflicts_schema());
                let rows: Vec<PgWireResult<_>> = conflicts
                    .into_iter()
                    .map(|c| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&c.kind.as_str())?;
                        encoder.encode_field(&c.resource_id.to_string())?;
                        encoder.encode_field(&c.severity.as_str())?;
                        encoder.encode_field(&c.detail)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectSlots {
                duration,
                start,
                end,
                kind,
                skills,
                min_capacity,
                count,
                granularity,
                preferred,
                avoided,
                preferred_resources,
            } => {
                let requirement = Requirement { kind, skills, min_capacity, count };
                let prefs = Preferences {
                    preferred: preferred
                        .map(|(s, e)| Span { start: s, end: e })
                        .into_iter()
                        .collect(),
                    avoided: avoided
                        .map(|(s, e)| Span { start: s, end: e })
                        .into_iter()
                        .collect(),
                    preferred_resources,
                };
                let outcome = engine
                    .find_slots(duration, Span { start, end }, requirement, prefs, granularity)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(slots_schema());
                let mut rows: Vec<PgWireResult<_>> = outcome
                    .slots
                    .into_iter()
                    .map(|s| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&s.span.start)?;
                        encoder.encode_field(&s.span.end)?;
                        encoder.encode_field(&s.confidence)?;
                        encoder.encode_field(&join_ids(&s.resource_ids))?;
                        encoder.encode_field(&None::<String>)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                // An empty result still carries its diagnostic: one all-NULL
                // row with only `reason` set.
                if rows.is_empty()
                    && let Some(reason) = outcome.reason
                {
                    let mut encoder = DataRowEncoder::new(schema.clone());
                    encoder.encode_field(&None::<i64>)?;
                    encoder.encode_field(&None::<i64>)?;
                    encoder.encode_field(&None::<f64>)?;
                    encoder.encode_field(&None::<String>)?;
                    encoder.encode_field(&Some(reason))?;
                    rows.push(Ok(encoder.take_row()));
                }
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectUtilization { resource_ids, start, end, group_by } => {
                let records = engine
                    .get_utilization(&resource_ids, start, end, group_by)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(utilization_schema());
                let rows: Vec<PgWireResult<_>> = records
                    .into_iter()
                    .map(|r| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&r.resource_id.to_string())?;
                        encoder.encode_field(&r.bucket.start)?;
                        encoder.encode_field(&r.bucket.end)?;
                        encoder.encode_field(&r.allocated_ms)?;
                        encoder.encode_field(&r.open_ms)?;
                        encoder.encode_field(&r.ratio)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectClassification { text, profile } => {
                if text.len() > MAX_CLASSIFY_TEXT_LEN {
                    return Err(PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "22023".into(),
                        "classification text too long".into(),
                    ))));
                }
                let profile = match profile {
                    Some(s) => IndustryProfile::parse(&s).ok_or_else(|| {
                        PgWireError::UserError(Box::new(ErrorInfo::new(
                            "ERROR".into(),
                            "22023".into(),
                            format!("unknown industry profile: {s}"),
                        )))
                    })?,
                    None => engine.config_snapshot().industry_profile,
                };
                let suggestion = classify(&text, profile);
                let schema = Arc::new(classification_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&suggestion.code)?;
                encoder.encode_field(&suggestion.confidence)?;
                encoder.encode_field(&suggestion.note)?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::UpdateSettings { open_by_default, industry_profile, advance_horizon_ms } => {
                engine
                    .set_config(open_by_default, industry_profile, advance_horizon_ms)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::Listen { channel } => {
                let resource_id_str = channel.strip_prefix("resource_").ok_or_else(|| {
                    PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "42000".into(),
                        format!("invalid channel: {channel} (expected resource_{{id}})"),
                    )))
                })?;
                let resource_id = Ulid::from_string(resource_id_str).map_err(|e| {
                    PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "42000".into(),
                        format!("bad ULID in channel: {e}"),
                    )))
                })?;
                if engine.get_resource(&resource_id).is_none() {
                    return Err(engine_err(EngineError::NotFound(resource_id)));
                }
                Ok(vec![Response::Execution(Tag::new("LISTEN"))])
            }
        }
    }
}

fn join_ids(ids: &[Ulid]) -> String {
    ids.iter().map(Ulid::to_string).collect::<Vec<_>>().join(",")
}

// ── Result schemas ───────────────────────────────────────────────

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int8_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn int4_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT4, FieldFormat::Text)
}

fn float8_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::FLOAT8, FieldFormat::Text)
}

fn resources_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("kind"),
        text_field("name"),
        int4_field("capacity"),
        text_field("skills"),
        text_field("status"),
        text_field("code"),
        float8_field("confidence"),
    ]
}

fn appointments_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("reference"),
        text_field("title"),
        int8_field("start"),
        int8_field("end"),
        text_field("status"),
        text_field("resource_ids"),
    ]
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        text_field("resource_id"),
        int8_field("start"),
        int8_field("end"),
        int4_field("free"),
    ]
}

fn conflicts_schema() -> Vec<FieldInfo> {
    vec![
        text_field("kind"),
        text_field("resource_id"),
        text_field("severity"),
        text_field("detail"),
    ]
}

fn slots_schema() -> Vec<FieldInfo> {
    vec![
        int8_field("start"),
        int8_field("end"),
        float8_field("confidence"),
        text_field("resource_ids"),
        text_field("reason"),
    ]
}

fn utilization_schema() -> Vec<FieldInfo> {
    vec![
        text_field("resource_id"),
        int8_field("bucket_start"),
        int8_field("bucket_end"),
        int8_field("allocated_ms"),
        int8_field("open_ms"),
        float8_field("ratio"),
    ]
}

fn classification_schema() -> Vec<FieldInfo> {
    vec![
        text_field("code"),
        float8_field("confidence"),
        text_field("note"),
    ]
}

/// Best-effort schema lookup from raw SQL, for Describe before Execute.
fn schema_for_statement(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    if !upper.contains("SELECT") {
        return vec![];
    }
    if upper.contains("AVAILABILITY") {
        availability_schema()
    } else if upper.contains("CONFLICTS") {
        conflicts_schema()
    } else if upper.contains("SLOTS") {
        slots_schema()
    } else if upper.contains("UTILIZATION") {
        utilization_schema()
    } else if upper.contains("CLASSIFICATION") {
        classification_schema()
    } else if upper.contains("APPOINTMENTS") {
        appointments_schema()
    } else if upper.contains("RESOURCES") {
        resources_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for RostraHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.run(&engine, cmd).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct RostraQueryParser;

#[async_trait]
impl QueryParser for RostraQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(schema_for_statement(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for RostraHandler {
    type Statement = String;
    type QueryParser = RostraQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self.run(&engine, cmd).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            schema_for_statement(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(schema_for_statement(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start {
                if let Ok(n) = sql[start..i].parse::<usize>() {
                    if n > max {
                        max = n;
                    }
                }
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let sql = portal.statement.statement.to_string();
    let params = &portal.parameters;
    let mut result = sql;

    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }

    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct RostraFactory {
    handler: Arc<RostraHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<RostraAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl RostraFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = RostraAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(RostraHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for RostraFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection to completion.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> Result<(), std::io::Error> {
    let factory = Arc::new(RostraFactory::new(tenant_manager, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: EngineError) -> PgWireError {
    // SQLSTATE by failure class so clients can branch without string
    // matching: booking conflicts surface as exclusion_violation,
    // duplicates as unique_violation, contention as serialization_failure.
    let code = match &e {
        EngineError::Validation(_) | EngineError::LimitExceeded(_) => "22023",
        EngineError::NotFound(_) => "P0002",
        EngineError::AlreadyExists(_) => "23505",
        EngineError::Conflicts(_) => "23P01",
        EngineError::Concurrency(_) => "40001",
        EngineError::Configuration(_) => "F0000",
        EngineError::Wal(_) => "XX000",
    };
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
