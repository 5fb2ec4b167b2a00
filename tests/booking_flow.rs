use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Config, NoTls, SimpleQueryMessage};
use ulid::Ulid;

use rostra::tenant::TenantManager;
use rostra::wire;

// ── Test infrastructure ──────────────────────────────────────

const DAY_MS: i64 = 86_400_000;
const HOUR_MS: i64 = 3_600_000;
/// 2034-06-05, a Monday on the engine's epoch-day grid.
const MONDAY: i64 = 23_531;

async fn start_test_server() -> (SocketAddr, Arc<TenantManager>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("rostra_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(dir, 1000));

    let tm2 = tm.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let tm = tm2.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, tm, "rostra".to_string(), None).await;
            });
        }
    });

    (addr, tm)
}

async fn connect(addr: SocketAddr, dbname: &str) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname(dbname)
        .user("rostra")
        .password("rostra");

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

/// Extract the data rows from a simple_query response.
fn data_rows(messages: Vec<SimpleQueryMessage>) -> Vec<tokio_postgres::SimpleQueryRow> {
    messages
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(r) => Some(r),
            _ => None,
        })
        .collect()
}

/// Create an active resource with Monday 09:00-17:00 hours, return its id.
async fn setup_resource(client: &tokio_postgres::Client, name: &str, capacity: u32) -> Ulid {
    let rid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO resources (id, kind, name, capacity) VALUES ('{rid}', 'person', '{name}', {capacity})"
        ))
        .await
        .unwrap();
    let rule = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO calendar_rules (id, resource_id, weekday, start_minute, end_minute) \
             VALUES ('{rule}', '{rid}', 0, 540, 1020)"
        ))
        .await
        .unwrap();
    rid
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn book_and_query_availability() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "clinic").await;

    let rid = setup_resource(&client, "Dr. Chen", 1).await;
    let day = MONDAY * DAY_MS;

    // Availability before booking: one open window 09:00-17:00.
    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM availability WHERE resource_id = '{rid}' AND start >= {day} AND \"end\" <= {}",
                day + DAY_MS
            ))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("start").unwrap(), (day + 9 * HOUR_MS).to_string());
    assert_eq!(rows[0].get("end").unwrap(), (day + 17 * HOUR_MS).to_string());
    assert_eq!(rows[0].get("free").unwrap(), "1");

    // Book 10:00-11:00.
    let apt = Ulid::new();
    client
        .batch_execute(&format!(
            r#"INSERT INTO appointments (id, title, start, "end", resource_id, quantity) VALUES ('{apt}', 'checkup', {}, {}, '{rid}', 1)"#,
            day + 10 * HOUR_MS,
            day + 11 * HOUR_MS
        ))
        .await
        .unwrap();

    // The booked hour is carved out.
    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM availability WHERE resource_id = '{rid}' AND start >= {day} AND \"end\" <= {}",
                day + DAY_MS
            ))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("end").unwrap(), (day + 10 * HOUR_MS).to_string());
    assert_eq!(rows[1].get("start").unwrap(), (day + 11 * HOUR_MS).to_string());

    // The appointment shows up with a human-readable reference.
    let rows = data_rows(client.simple_query("SELECT * FROM appointments").await.unwrap());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("reference").unwrap(), "APT-000001");
    assert_eq!(rows[0].get("status").unwrap(), "confirmed");
}

#[tokio::test]
async fn overlapping_booking_rejected_with_conflict_state() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "clinic").await;

    let rid = setup_resource(&client, "Dr. Okafor", 1).await;
    let day = MONDAY * DAY_MS;

    let first = Ulid::new();
    client
        .batch_execute(&format!(
            r#"INSERT INTO appointments (id, title, start, "end", resource_id, quantity) VALUES ('{first}', 'visit', {}, {}, '{rid}', 1)"#,
            day + 10 * HOUR_MS,
            day + 11 * HOUR_MS
        ))
        .await
        .unwrap();

    let second = Ulid::new();
    let err = client
        .batch_execute(&format!(
            r#"INSERT INTO appointments (id, title, start, "end", resource_id, quantity) VALUES ('{second}', 'visit', {}, {}, '{rid}', 1)"#,
            day + 10 * HOUR_MS + 30 * 60_000,
            day + 11 * HOUR_MS + 30 * 60_000
        ))
        .await
        .unwrap_err();
    let db_err = err.as_db_error().expect("expected a database error");
    assert_eq!(db_err.code(), &SqlState::EXCLUSION_VIOLATION);
    assert!(db_err.message().contains("capacity_exceeded"));

    // The dry-run view reports the same conflict without mutating.
    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM conflicts WHERE resource_id = '{rid}' AND start >= {} AND \"end\" <= {}",
                day + 10 * HOUR_MS,
                day + 11 * HOUR_MS
            ))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("kind").unwrap(), "capacity_exceeded");
    assert_eq!(rows[0].get("severity").unwrap(), "hard");
}

#[tokio::test]
async fn multi_resource_booking_is_all_or_nothing() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "clinic").await;

    let doctor = setup_resource(&client, "Dr. Reyes", 1).await;
    let room = setup_resource(&client, "Exam 3", 1).await;
    let day = MONDAY * DAY_MS;

    // Occupy the room.
    let blocker = Ulid::new();
    client
        .batch_execute(&format!(
            r#"INSERT INTO appointments (id, title, start, "end", resource_id, quantity) VALUES ('{blocker}', 'cleaning', {}, {}, '{room}', 1)"#,
            day + 10 * HOUR_MS,
            day + 12 * HOUR_MS
        ))
        .await
        .unwrap();

    // Doctor + room together must fail because the room is taken.
    let apt = Ulid::new();
    let err = client
        .batch_execute(&format!(
            r#"INSERT INTO appointments (id, title, start, "end", resource_id, quantity) VALUES
               ('{apt}', 'procedure', {s}, {e}, '{doctor}', 1),
               ('{apt}', 'procedure', {s}, {e}, '{room}', 1)"#,
            s = day + 11 * HOUR_MS,
            e = day + 12 * HOUR_MS
        ))
        .await
        .unwrap_err();
    assert_eq!(err.as_db_error().unwrap().code(), &SqlState::EXCLUSION_VIOLATION);

    // The doctor keeps the hour free: nothing was partially committed.
    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM availability WHERE resource_id = '{doctor}' AND start >= {day} AND \"end\" <= {}",
                day + DAY_MS
            ))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn cancel_restores_availability() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "clinic").await;

    let rid = setup_resource(&client, "Dr. Petit", 1).await;
    let day = MONDAY * DAY_MS;

    let apt = Ulid::new();
    client
        .batch_execute(&format!(
            r#"INSERT INTO appointments (id, title, start, "end", resource_id, quantity) VALUES ('{apt}', 'visit', {}, {}, '{rid}', 1)"#,
            day + 10 * HOUR_MS,
            day + 11 * HOUR_MS
        ))
        .await
        .unwrap();

    client
        .batch_execute(&format!("DELETE FROM appointments WHERE id = '{apt}'"))
        .await
        .unwrap();

    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM availability WHERE resource_id = '{rid}' AND start >= {day} AND \"end\" <= {}",
                day + DAY_MS
            ))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1, "whole shift open again after cancel");

    // The record survives as history.
    let rows = data_rows(client.simple_query("SELECT * FROM appointments").await.unwrap());
    assert_eq!(rows[0].get("status").unwrap(), "cancelled");
}

#[tokio::test]
async fn slot_search_over_the_wire() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "clinic").await;

    let _rid = setup_resource(&client, "Dr. Varga", 1).await;
    let day = MONDAY * DAY_MS;

    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM slots WHERE duration = {HOUR_MS} AND start >= {day} AND \"end\" <= {} AND kind = 'person'",
                day + DAY_MS
            ))
            .await
            .unwrap(),
    );
    assert!(!rows.is_empty());
    assert_eq!(rows[0].get("start").unwrap(), (day + 9 * HOUR_MS).to_string());
    assert!(rows[0].get("reason").is_none());

    // Nothing fits on a Sunday: the diagnostic row comes back instead.
    let sunday = (MONDAY + 6) * DAY_MS;
    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM slots WHERE duration = {HOUR_MS} AND start >= {sunday} AND \"end\" <= {}",
                sunday + DAY_MS
            ))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("reason").unwrap(), "no_capacity_in_range");
    assert!(rows[0].get("start").is_none());
}

#[tokio::test]
async fn utilization_and_classification_views() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "clinic").await;

    client
        .batch_execute("UPDATE settings SET industry_profile = 'healthcare'")
        .await
        .unwrap();

    let rid = setup_resource(&client, "Dr. Ibanez", 1).await;
    let day = MONDAY * DAY_MS;

    let apt = Ulid::new();
    client
        .batch_execute(&format!(
            r#"INSERT INTO appointments (id, title, start, "end", resource_id, quantity) VALUES ('{apt}', 'exam', {}, {}, '{rid}', 1)"#,
            day + 9 * HOUR_MS,
            day + 13 * HOUR_MS
        ))
        .await
        .unwrap();

    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM utilization WHERE resource_id = '{rid}' AND start >= {day} AND \"end\" <= {} AND group_by = 'day'",
                day + DAY_MS
            ))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("allocated_ms").unwrap(), (4 * HOUR_MS).to_string());
    assert_eq!(rows[0].get("open_ms").unwrap(), (8 * HOUR_MS).to_string());
    assert_eq!(rows[0].get("ratio").unwrap(), "0.5");

    // Ad-hoc classification against the tenant profile.
    let rows = data_rows(
        client
            .simple_query("SELECT * FROM classification WHERE text = 'Dr. Smith, cardiology'")
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("code").unwrap(), "DOCTOR");

    // Resources created under the profile carry a code too.
    let rows = data_rows(client.simple_query("SELECT * FROM resources").await.unwrap());
    assert_eq!(rows[0].get("code").unwrap(), "DOCTOR");
}

#[tokio::test]
async fn settings_allow_calendarless_booking() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "workshop").await;

    let rid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO resources (id, kind, name) VALUES ('{rid}', 'equipment', 'CNC mill')"
        ))
        .await
        .unwrap();
    let day = MONDAY * DAY_MS;

    // Closed by default without a calendar.
    let apt = Ulid::new();
    let insert = format!(
        r#"INSERT INTO appointments (id, title, start, "end", resource_id, quantity) VALUES ('{apt}', 'milling run', {}, {}, '{rid}', 1)"#,
        day + HOUR_MS,
        day + 2 * HOUR_MS
    );
    assert!(client.batch_execute(&insert).await.is_err());

    client
        .batch_execute("UPDATE settings SET open_by_default = true")
        .await
        .unwrap();
    client.batch_execute(&insert).await.unwrap();
}

#[tokio::test]
async fn tenants_are_isolated_over_the_wire() {
    let (addr, _tm) = start_test_server().await;
    let client_a = connect(addr, "north").await;
    let client_b = connect(addr, "south").await;

    setup_resource(&client_a, "Shared Name", 1).await;

    let rows_a = data_rows(client_a.simple_query("SELECT * FROM resources").await.unwrap());
    let rows_b = data_rows(client_b.simple_query("SELECT * FROM resources").await.unwrap());
    assert_eq!(rows_a.len(), 1);
    assert!(rows_b.is_empty());
}

#[tokio::test]
async fn listen_validates_channel() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr, "clinic").await;

    let rid = setup_resource(&client, "Dr. Kim", 1).await;
    client
        .batch_execute(&format!("LISTEN resource_{rid}"))
        .await
        .unwrap();

    // Unknown resource and malformed channel are both rejected.
    let unknown = Ulid::new();
    assert!(client
        .batch_execute(&format!("LISTEN resource_{unknown}"))
        .await
        .is_err());
    assert!(client.batch_execute("LISTEN bogus_channel").await.is_err());
}
