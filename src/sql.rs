use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertResource {
        id: Ulid,
        kind: ResourceKind,
        name: String,
        capacity: u32,
        skills: Vec<String>,
        status: ResourceStatus,
    },
    UpdateResource {
        id: Ulid,
        name: Option<String>,
        capacity: Option<u32>,
        status: Option<ResourceStatus>,
    },
    DeleteResource {
        id: Ulid,
    },
    InsertWeeklyRule {
        id: Ulid,
        resource_id: Ulid,
        weekday: u8,
        start_minute: u32,
        end_minute: u32,
    },
    DeleteWeeklyRule {
        id: Ulid,
    },
    InsertException {
        resource_id: Ulid,
        day: i64,
    },
    DeleteException {
        resource_id: Ulid,
        day: i64,
    },
    /// Multi-row INSERT books one appointment over several resources.
    /// Shared fields (title, span, status, code, expires_at) come from the
    /// first row; each row contributes its own (resource_id, quantity, skills).
    InsertAppointment {
        id: Ulid,
        title: String,
        start: Ms,
        end: Ms,
        status: Option<AppointmentStatus>,
        code: Option<String>,
        expires_at: Option<Ms>,
        allocations: Vec<(Ulid, u32, Vec<String>)>,
    },
    /// `SET start = ..., "end" = ...` moves the window; `SET resources =
    /// '<ulid>:qty,<ulid>'` swaps the allocation set (quantity defaults
    /// to 1). Either part may appear alone.
    RescheduleAppointment {
        id: Ulid,
        start: Option<Ms>,
        end: Option<Ms>,
        allocations: Option<Vec<(Ulid, u32)>>,
    },
    SetAppointmentStatus {
        id: Ulid,
        status: AppointmentStatus,
    },
    CancelAppointment {
        id: Ulid,
    },
    SelectResources,
    SelectAppointments,
    SelectAvailability {
        resource_ids: Vec<Ulid>,
        start: Ms,
        end: Ms,
    },
    SelectConflicts {
        resource_ids: Vec<Ulid>,
        start: Ms,
        end: Ms,
        quantity: u32,
        skills: Vec<String>,
    },
    SelectSlots {
        duration: Ms,
        start: Ms,
        end: Ms,
        kind: Option<ResourceKind>,
        skills: Vec<String>,
        min_capacity: u32,
        count: usize,
        granularity: Option<Ms>,
        preferred: Option<(Ms, Ms)>,
        avoided: Option<(Ms, Ms)>,
        preferred_resources: Vec<Ulid>,
    },
    SelectUtilization {
        resource_ids: Vec<Ulid>,
        start: Ms,
        end: Ms,
        group_by: GroupBy,
    },
    SelectClassification {
        text: String,
        profile: Option<String>,
    },
    UpdateSettings {
        open_by_default: Option<bool>,
        industry_profile: Option<String>,
        advance_horizon_ms: Option<Option<Ms>>,
    },
    Listen {
        channel: String,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim();
    if trimmed.to_uppercase().starts_with("LISTEN ") {
        let channel = trimmed[7..].trim().trim_matches(';').to_string();
        return Ok(Command::Listen { channel });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update { table, assignments, selection, .. } => {
            parse_update(table, assignments, selection)
        }
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;

    match table.as_str() {
        "resources" => {
            let values = extract_insert_values(insert)?;
            if values.len() < 3 {
                return Err(SqlError::WrongArity("resources", 3, values.len()));
            }
            let kind_s = parse_string(&values[1])?;
            let kind = ResourceKind::parse(&kind_s)
                .ok_or_else(|| SqlError::Parse(format!("unknown resource kind: {kind_s}")))?;
            let capacity = if values.len() >= 4 { parse_u32(&values[3])? } else { 1 };
            let skills = if values.len() >= 5 {
                parse_csv_or_null(&values[4])?
            } else {
                Vec::new()
            };
            let status = if values.len() >= 6 {
                let s = parse_string(&values[5])?;
                ResourceStatus::parse(&s)
                    .ok_or_else(|| SqlError::Parse(format!("unknown resource status: {s}")))?
            } else {
                ResourceStatus::Active
            };
            Ok(Command::InsertResource {
                id: parse_ulid(&values[0])?,
                kind,
                name: parse_string(&values[2])?,
                capacity,
                skills,
                status,
            })
        }
        "calendar_rules" => {
            let values = extract_insert_values(insert)?;
            if values.len() < 5 {
                return Err(SqlError::WrongArity("calendar_rules", 5, values.len()));
            }
            Ok(Command::InsertWeeklyRule {
                id: parse_ulid(&values[0])?,
                resource_id: parse_ulid(&values[1])?,
                weekday: parse_u8(&values[2])?,
                start_minute: parse_u32(&values[3])?,
                end_minute: parse_u32(&values[4])?,
            })
        }
        "calendar_exceptions" => {
            let values = extract_insert_values(insert)?;
            if values.len() < 2 {
                return Err(SqlError::WrongArity("calendar_exceptions", 2, values.len()));
            }
            Ok(Command::InsertException {
                resource_id: parse_ulid(&values[0])?,
                day: parse_i64(&values[1])?,
            })
        }
        "appointments" => {
            let rows = extract_all_insert_rows(insert)?;
            let first = &rows[0];
            if first.len() < 6 {
                return Err(SqlError::WrongArity("appointments", 6, first.len()));
            }
            let status = if first.len() >= 8 {
                match parse_string_or_null(&first[7])? {
                    Some(s) => Some(AppointmentStatus::parse(&s).ok_or_else(|| {
                        SqlError::Parse(format!("unknown appointment status: {s}"))
                    })?),
                    None => None,
                }
            } else {
                None
            };
            let code = if first.len() >= 9 {
                parse_string_or_null(&first[8])?
            } else {
                None
            };
            let expires_at = if first.len() >= 10 {
                parse_i64_or_null(&first[9])?
            } else {
                None
            };

            let mut allocations = Vec::with_capacity(rows.len());
            for (i, row) in rows.iter().enumerate() {
                if row.len() < 6 {
                    return Err(SqlError::WrongArity("appointments row", 6, row.len()));
                }
                let skills = if row.len() >= 7 {
                    parse_csv_or_null(&row[6])
                        .map_err(|e| SqlError::Parse(format!("row {i}: {e}")))?
                } else {
                    Vec::new()
                };
                allocations.push((
                    parse_ulid(&row[4]).map_err(|e| SqlError::Parse(format!("row {i}: {e}")))?,
                    parse_u32(&row[5]).map_err(|e| SqlError::Parse(format!("row {i}: {e}")))?,
                    skills,
                ));
            }

            Ok(Command::InsertAppointment {
                id: parse_ulid(&first[0])?,
                title: parse_string(&first[1])?,
                start: parse_i64(&first[2])?,
                end: parse_i64(&first[3])?,
                status,
                code,
                expires_at,
                allocations,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;

    match table.as_str() {
        "resources" => {
            let id = extract_where_id(selection)?;
            let (mut name, mut capacity, mut status) = (None, None, None);
            for a in assignments {
                match assignment_column(a)?.as_str() {
                    "name" => name = Some(parse_string(&a.value)?),
                    "capacity" => capacity = Some(parse_u32(&a.value)?),
                    "status" => {
                        let s = parse_string(&a.value)?;
                        status = Some(ResourceStatus::parse(&s).ok_or_else(|| {
                            SqlError::Parse(format!("unknown resource status: {s}"))
                        })?);
                    }
                    col => return Err(SqlError::UnknownColumn(col.to_string())),
                }
            }
            Ok(Command::UpdateResource { id, name, capacity, status })
        }
        "appointments" => {
            let id = extract_where_id(selection)?;
            let (mut start, mut end, mut status, mut allocations) = (None, None, None, None);
            for a in assignments {
                match assignment_column(a)?.as_str() {
                    "start" => start = Some(parse_i64(&a.value)?),
                    "end" => end = Some(parse_i64(&a.value)?),
                    "resources" => allocations = Some(parse_allocation_csv(&a.value)?),
                    "status" => {
                        let s = parse_string(&a.value)?;
                        status = Some(AppointmentStatus::parse(&s).ok_or_else(|| {
                            SqlError::Parse(format!("unknown appointment status: {s}"))
                        })?);
                    }
                    col => return Err(SqlError::UnknownColumn(col.to_string())),
                }
            }
            if start.is_some() != end.is_some() {
                return Err(SqlError::Unsupported(
                    "start and \"end\" must be set together".into(),
                ));
            }
            match (status, start.is_some() || allocations.is_some()) {
                (Some(status), false) => Ok(Command::SetAppointmentStatus { id, status }),
                (None, true) => Ok(Command::RescheduleAppointment { id, start, end, allocations }),
                _ => Err(SqlError::Unsupported(
                    "UPDATE appointments sets either start+end/resources or status".into(),
                )),
            }
        }
        "settings" => {
            let (mut open_by_default, mut industry_profile, mut advance_horizon_ms) =
                (None, None, None);
            for a in assignments {
                match assignment_column(a)?.as_str() {
                    "open_by_default" => open_by_default = Some(parse_bool(&a.value)?),
                    "industry_profile" => industry_profile = Some(parse_string(&a.value)?),
                    "advance_horizon_ms" => {
                        advance_horizon_ms = Some(parse_i64_or_null(&a.value)?);
                    }
                    col => return Err(SqlError::UnknownColumn(col.to_string())),
                }
            }
            Ok(Command::UpdateSettings { open_by_default, industry_profile, advance_horizon_ms })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;

    match table.as_str() {
        "resources" => Ok(Command::DeleteResource { id: extract_where_id(&delete.selection)? }),
        "calendar_rules" => {
            Ok(Command::DeleteWeeklyRule { id: extract_where_id(&delete.selection)? })
        }
        "calendar_exceptions" => {
            let filters = Filters::from_selection(&delete.selection)?;
            Ok(Command::DeleteException {
                resource_id: parse_ulid(filters.eq("resource_id").ok_or(SqlError::MissingFilter("resource_id"))?)?,
                day: parse_i64(filters.eq("day").ok_or(SqlError::MissingFilter("day"))?)?,
            })
        }
        // DELETE never removes the record, it cancels: history is kept.
        "appointments" => Ok(Command::CancelAppointment { id: extract_where_id(&delete.selection)? }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let filters = Filters::from_selection(&select.selection)?;

    match table.as_str() {
        "resources" => Ok(Command::SelectResources),
        "appointments" => Ok(Command::SelectAppointments),
        "availability" => Ok(Command::SelectAvailability {
            resource_ids: filters.id_list("resource_id")?,
            start: filters.require_gteq("start")?,
            end: filters.require_lteq("end")?,
        }),
        "conflicts" => Ok(Command::SelectConflicts {
            resource_ids: filters.id_list("resource_id")?,
            start: filters.require_gteq("start")?,
            end: filters.require_lteq("end")?,
            quantity: match filters.eq("quantity") {
                Some(e) => parse_u32(e)?,
                None => 1,
            },
            skills: match filters.eq("skills") {
                Some(e) => parse_csv_or_null(e)?,
                None => Vec::new(),
            },
        }),
        "slots" => {
            let kind = match filters.eq("kind") {
                Some(e) => {
                    let s = parse_string(e)?;
                    Some(ResourceKind::parse(&s).ok_or_else(|| {
                        SqlError::Parse(format!("unknown resource kind: {s}"))
                    })?)
                }
                None => None,
            };
            let band = |prefix: &str| -> Result<Option<(Ms, Ms)>, SqlError> {
                let s = filters.eq(&format!("{prefix}_start"));
                let e = filters.eq(&format!("{prefix}_end"));
                match (s, e) {
                    (Some(s), Some(e)) => Ok(Some((parse_i64(s)?, parse_i64(e)?))),
                    (None, None) => Ok(None),
                    _ => Err(SqlError::Parse(format!(
                        "{prefix}_start and {prefix}_end must be given together"
                    ))),
                }
            };
            Ok(Command::SelectSlots {
                duration: parse_i64(
                    filters.eq("duration").ok_or(SqlError::MissingFilter("duration"))?,
                )?,
                start: filters.require_gteq("start")?,
                end: filters.require_lteq("end")?,
                kind,
                skills: match filters.eq("skills") {
                    Some(e) => parse_csv_or_null(e)?,
                    None => Vec::new(),
                },
                min_capacity: match filters.eq("min_capacity") {
                    Some(e) => parse_u32(e)?,
                    None => 1,
                },
                count: match filters.eq("count") {
                    Some(e) => parse_u32(e)? as usize,
                    None => 1,
                },
                granularity: match filters.eq("granularity") {
                    Some(e) => Some(parse_i64(e)?),
                    None => None,
                },
                preferred: band("preferred")?,
                avoided: band("avoided")?,
                preferred_resources: match filters.eq("preferred_resources") {
                    Some(e) => parse_ulid_csv(e)?,
                    None => Vec::new(),
                },
            })
        }
        "utilization" => {
            let group_s = parse_string(
                filters.eq("group_by").ok_or(SqlError::MissingFilter("group_by"))?,
            )?;
            Ok(Command::SelectUtilization {
                // Empty means all resources.
                resource_ids: filters.id_list_optional("resource_id")?,
                start: filters.require_gteq("start")?,
                end: filters.require_lteq("end")?,
                group_by: GroupBy::parse(&group_s)
                    .ok_or_else(|| SqlError::Parse(format!("unknown group_by: {group_s}")))?,
            })
        }
        "classification" => Ok(Command::SelectClassification {
            text: parse_string(filters.eq("text").ok_or(SqlError::MissingFilter("text"))?)?,
            profile: match filters.eq("profile") {
                Some(e) => Some(parse_string(e)?),
                None => None,
            },
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── WHERE clause collection ───────────────────────────────────

/// Flattened WHERE clause: conjunctions of `col = v`, `col >= v`,
/// `col <= v`, and `col IN (...)`. Anything else is rejected.
#[derive(Default)]
struct Filters {
    eq: Vec<(String, Expr)>,
    gteq: Vec<(String, Expr)>,
    lteq: Vec<(String, Expr)>,
    in_list: Vec<(String, Vec<Expr>)>,
}

impl Filters {
    fn from_selection(selection: &Option<Expr>) -> Result<Self, SqlError> {
        let mut f = Filters::default();
        if let Some(expr) = selection {
            f.collect(expr)?;
        }
        Ok(f)
    }

    fn collect(&mut self, expr: &Expr) -> Result<(), SqlError> {
        match expr {
            Expr::BinaryOp { left, op: ast::BinaryOperator::And, right } => {
                self.collect(left)?;
                self.collect(right)
            }
            Expr::BinaryOp { left, op, right } => {
                let col = expr_column_name(left)
                    .ok_or_else(|| SqlError::Parse(format!("expected column, got {left}")))?;
                match op {
                    ast::BinaryOperator::Eq => self.eq.push((col, (**right).clone())),
                    ast::BinaryOperator::GtEq => self.gteq.push((col, (**right).clone())),
                    ast::BinaryOperator::LtEq => self.lteq.push((col, (**right).clone())),
                    _ => return Err(SqlError::Unsupported(format!("operator {op}"))),
                }
                Ok(())
            }
            Expr::InList { expr, list, negated: false } => {
                let col = expr_column_name(expr)
                    .ok_or_else(|| SqlError::Parse(format!("expected column, got {expr}")))?;
                self.in_list.push((col, list.clone()));
                Ok(())
            }
            Expr::Nested(inner) => self.collect(inner),
            _ => Err(SqlError::Unsupported(format!("filter {expr}"))),
        }
    }

    fn eq(&self, col: &str) -> Option<&Expr> {
        self.eq.iter().find(|(c, _)| c == col).map(|(_, e)| e)
    }

    fn require_gteq(&self, col: &'static str) -> Result<Ms, SqlError> {
        let e = self
            .gteq
            .iter()
            .find(|(c, _)| c == col)
            .map(|(_, e)| e)
            .ok_or(SqlError::MissingFilter(col))?;
        parse_i64(e)
    }

    fn require_lteq(&self, col: &'static str) -> Result<Ms, SqlError> {
        let e = self
            .lteq
            .iter()
            .find(|(c, _)| c == col)
            .map(|(_, e)| e)
            .ok_or(SqlError::MissingFilter(col))?;
        parse_i64(e)
    }

    /// `col = 'ulid'` or `col IN ('ulid', ...)`. At least one id required.
    fn id_list(&self, col: &'static str) -> Result<Vec<Ulid>, SqlError> {
        let ids = self.id_list_optional(col)?;
        if ids.is_empty() {
            return Err(SqlError::MissingFilter(col));
        }
        Ok(ids)
    }

    fn id_list_optional(&self, col: &str) -> Result<Vec<Ulid>, SqlError> {
        if let Some(e) = self.eq(col) {
            return Ok(vec![parse_ulid(e)?]);
        }
        if let Some((_, list)) = self.in_list.iter().find(|(c, _)| c == col) {
            return list.iter().map(parse_ulid).collect();
        }
        Ok(Vec::new())
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn assignment_column(a: &ast::Assignment) -> Result<String, SqlError> {
    match &a.target {
        ast::AssignmentTarget::ColumnName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty column name".into()))
        }
        _ => Err(SqlError::Parse("unsupported assignment target".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let rows = extract_all_insert_rows(insert)?;
    Ok(rows.into_iter().next().unwrap_or_default())
}

fn extract_all_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) => Ok(s.clone()),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if let Some(Value::Null) = extract_value(expr) {
        return Ok(None);
    }
    parse_string(expr).map(Some)
}

/// Comma-separated list in a single quoted string, e.g. 'mri,xray'.
fn parse_csv_or_null(expr: &Expr) -> Result<Vec<String>, SqlError> {
    match parse_string_or_null(expr)? {
        None => Ok(Vec::new()),
        Some(s) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()),
    }
}

fn parse_ulid_csv(expr: &Expr) -> Result<Vec<Ulid>, SqlError> {
    parse_csv_or_null(expr)?
        .iter()
        .map(|s| Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}"))))
        .collect()
}

/// `'<ulid>:qty,<ulid>'` allocation list; quantity defaults to 1.
fn parse_allocation_csv(expr: &Expr) -> Result<Vec<(Ulid, u32)>, SqlError> {
    let entries = parse_csv_or_null(expr)?;
    if entries.is_empty() {
        return Err(SqlError::Parse("resources list must not be empty".into()));
    }
    entries
        .iter()
        .map(|entry| {
            let (id, qty) = match entry.split_once(':') {
                Some((id, qty)) => (
                    id,
                    qty.trim()
                        .parse::<u32>()
                        .map_err(|e| SqlError::Parse(format!("bad quantity: {e}")))?,
                ),
                None => (entry.as_str(), 1),
            };
            let id = Ulid::from_string(id.trim())
                .map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))?;
            Ok((id, qty))
        })
        .collect()
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64_or_null(expr: &Expr) -> Result<Option<i64>, SqlError> {
    if let Some(Value::Null) = extract_value(expr) {
        return Ok(None);
    }
    parse_i64(expr).map(Some)
}

fn parse_u8(expr: &Expr) -> Result<u8, SqlError> {
    let v = parse_i64(expr)?;
    u8::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u8 range")))
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::Parse(format!("expected bool, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
