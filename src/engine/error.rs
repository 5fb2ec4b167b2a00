use ulid::Ulid;

use crate::model::Conflict;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed input, rejected before any work begins.
    Validation(String),
    /// Appointment/resource id does not exist in tenant scope.
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Hard conflicts detected; carries the full list (soft ones included
    /// for context). Expected under contention, not a system failure.
    Conflicts(Vec<Conflict>),
    /// Lock contention exhausted its bound; the caller should retry.
    Concurrency(&'static str),
    /// Resource has no operating calendar and the tenant has not opted
    /// into the always-open fallback.
    Configuration(String),
    LimitExceeded(&'static str),
    Wal(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn hard_conflicts(&self) -> usize {
        match self {
            Self::Conflicts(list) => list.iter().filter(|c| c.is_hard()).count(),
            _ => 0,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Conflicts(list) => {
                let detail = serde_json::to_string(list).unwrap_or_else(|_| "[]".into());
                write!(f, "conflicts: {detail}")
            }
            EngineError::Concurrency(msg) => write!(f, "concurrency: {msg}"),
            EngineError::Configuration(msg) => write!(f, "configuration: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Wal(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConflictKind, Severity};

    #[test]
    fn conflict_error_carries_json_detail() {
        let err = EngineError::Conflicts(vec![Conflict {
            kind: ConflictKind::CapacityExceeded,
            resource_id: Ulid::new(),
            severity: Severity::Hard,
            detail: "window not covered".into(),
        }]);
        let msg = err.to_string();
        assert!(msg.starts_with("conflicts: ["));
        assert!(msg.contains("capacity_exceeded"));
        assert_eq!(err.hard_conflicts(), 1);
    }
}
