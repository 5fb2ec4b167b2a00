use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::engine::Engine;
use crate::limits::*;
use crate::notify::NotifyHub;
use crate::reaper;

/// Manages per-tenant engines. Each tenant gets its own Engine + WAL +
/// expiry reaper + compactor. Tenant = database name from the pgwire
/// connection, so isolation is structural: an engine simply cannot see
/// another tenant's resources or appointments.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
        }
    }

    /// Get or lazily create an engine for the given tenant.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // The tenant name becomes the WAL file name. Stripping characters
        // would let two distinct names alias one file, so anything outside
        // the allowed set is rejected outright (this also rules out path
        // traversal).
        if tenant.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }
        if !tenant
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name may only contain alphanumerics, '_' and '-'",
            ));
        }

        let wal_path = self.data_dir.join(format!("{tenant}.wal"));
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(wal_path, notify)?);

        // Spawn reaper + compactor for this tenant
        let reaper_engine = engine.clone();
        tokio::spawn(async move {
            reaper::run_reaper(reaper_engine).await;
        });
        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            reaper::run_compactor(compactor_engine, threshold).await;
        });

        self.engines.insert(tenant.to_string(), engine.clone());
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use std::fs;
    use ulid::Ulid;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("rostra_test_tenant").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    const MONDAY: i64 = 23_531;
    const H: Ms = 3_600_000;

    #[tokio::test]
    async fn tenant_isolation() {
        let dir = test_data_dir("isolation");
        let tm = TenantManager::new(dir, 1000);

        let eng_a = tm.get_or_create("clinic_north").unwrap();
        let eng_b = tm.get_or_create("clinic_south").unwrap();

        // Same resource id in both tenants: fully independent state.
        let rid = Ulid::new();
        for eng in [&eng_a, &eng_b] {
            eng.create_resource(
                rid,
                ResourceKind::Person,
                "Dr. Chen".into(),
                1,
                vec![],
                ResourceStatus::Active,
            )
            .await
            .unwrap();
        }
        eng_a
            .add_weekly_rule(Ulid::new(), rid, 0, 9 * 60, 17 * 60)
            .await
            .unwrap();

        let day = MONDAY * DAY_MS;
        let avail_a = eng_a.compute_availability(rid, day, day + DAY_MS).await.unwrap();
        assert_eq!(avail_a.len(), 1);
        assert_eq!(avail_a[0].span, Span::new(day + 9 * H, day + 17 * H));

        // Tenant B's copy has no calendar: closed.
        let avail_b = eng_b.compute_availability(rid, day, day + DAY_MS).await.unwrap();
        assert!(avail_b.is_empty());

        // A booking in A never shows in B.
        eng_a
            .book_appointment(
                Ulid::new(),
                "visit".into(),
                Span::new(day + 10 * H, day + 11 * H),
                AppointmentStatus::Confirmed,
                None,
                vec![AllocationRequest::new(rid, 1)],
                None,
            )
            .await
            .unwrap();
        assert_eq!(eng_a.list_appointments().len(), 1);
        assert!(eng_b.list_appointments().is_empty());
    }

    #[tokio::test]
    async fn tenant_lazy_creation() {
        let dir = test_data_dir("lazy");
        let tm = TenantManager::new(dir.clone(), 1000);

        // No WAL files should exist yet
        let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert!(entries.is_empty());

        // Create a tenant
        let _eng = tm.get_or_create("my_db").unwrap();

        // WAL file should now exist
        assert!(dir.join("my_db.wal").exists());
    }

    #[tokio::test]
    async fn tenant_same_engine_returned() {
        let dir = test_data_dir("same_eng");
        let tm = TenantManager::new(dir, 1000);

        let eng1 = tm.get_or_create("foo").unwrap();
        let eng2 = tm.get_or_create("foo").unwrap();

        // Should be the same Arc
        assert!(Arc::ptr_eq(&eng1, &eng2));
    }

    #[tokio::test]
    async fn tenant_name_characters_rejected() {
        let dir = test_data_dir("bad_chars");
        let tm = TenantManager::new(dir.clone(), 1000);

        for bad in ["../evil", "north!", "a b", "a/b", ""] {
            assert!(tm.get_or_create(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(tm.get_or_create("clinic_north-2").is_ok());

        // Nothing outside the data dir, nothing for the rejected names.
        let entries: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["clinic_north-2.wal".to_string()]);
    }

    #[tokio::test]
    async fn lookalike_tenant_name_cannot_reach_another_wal() {
        let dir = test_data_dir("lookalike");
        let tm = TenantManager::new(dir, 1000);

        let eng = tm.get_or_create("north").unwrap();
        eng.create_resource(
            Ulid::new(),
            ResourceKind::Room,
            "Room A".into(),
            1,
            vec![],
            ResourceStatus::Active,
        )
        .await
        .unwrap();

        // Under a strip-and-reuse scheme these would replay north's WAL.
        assert!(tm.get_or_create("north!").is_err());
        assert!(tm.get_or_create("north ").is_err());
        assert!(tm.get_or_create("/north").is_err());
    }

    #[tokio::test]
    async fn tenant_name_too_long() {
        let dir = test_data_dir("name_too_long");
        let tm = TenantManager::new(dir, 1000);

        let long_name = "x".repeat(MAX_TENANT_NAME_LEN + 1);
        let result = tm.get_or_create(&long_name);
        assert!(result.is_err());
        let err = result.err().unwrap();
        assert!(err.to_string().contains("tenant name too long"));
    }

    #[tokio::test]
    async fn tenant_count_limit() {
        let dir = test_data_dir("count_limit");
        let tm = TenantManager::new(dir, 1000);

        for i in 0..MAX_TENANTS {
            tm.get_or_create(&format!("t{i}")).unwrap();
        }
        let result = tm.get_or_create("one_more");
        assert!(result.is_err());
        let err = result.err().unwrap();
        assert!(err.to_string().contains("too many tenants"));
    }
}
