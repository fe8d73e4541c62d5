//! Integration tests for attendd
//!
//! These tests drive the full agent over a mock host and an in-memory
//! record store.

use attend_config::{AgentConfig, parse_config};
use attend_host_api::{MockHost, ShutdownResponse};
use attend_store::{Employee, RecordStore, SqliteRecordStore};
use attend_util::{EmployeeId, MachineId};
use attendd::{AGENT_VERSION, Agent, Collaborators, RunOutcome};
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use std::sync::Arc;
use std::time::Duration;

const MAC: &str = "3c:7c:3f:12:34:56";

fn evening() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 5, 1, 19, 0, 0).unwrap()
}

fn morning() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

fn at(mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, mo, d, h, mi, 0).unwrap()
}

fn make_test_config(data_dir: &std::path::Path) -> AgentConfig {
    let mut config = parse_config(
        r#"
        config_version = 1

        [agent]
        startup_delay_seconds = 0
        retry_delay_seconds = 300

        [shutdown]
        cutoff = "18:30"
        idle_threshold_seconds = 1080
        cpu_threshold_percent = 20
        countdown_seconds = 300
        tick_seconds = 60
        "#,
    )
    .unwrap();
    config.agent.data_dir = data_dir.to_path_buf();
    config
}

fn make_host() -> Arc<MockHost> {
    let host = Arc::new(MockHost::new().with_identity(MachineId::parse(MAC).unwrap()));
    host.push_event(42, at(4, 30, 19, 58));
    host.push_event(6006, at(4, 30, 23, 40));
    host.push_event(6005, at(5, 1, 8, 5));
    host.set_idle(Duration::from_secs(3600));
    host.set_cpu(5.0);
    host
}

fn make_store() -> Arc<SqliteRecordStore> {
    let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
    store
        .put_employee(&Employee {
            employee_id: EmployeeId::new("E042"),
            name: "Ada".into(),
            machine_id: MachineId::parse(MAC),
        })
        .unwrap();
    store
}

fn collaborators(host: &Arc<MockHost>, store: &Arc<SqliteRecordStore>) -> Collaborators {
    Collaborators {
        events: host.clone(),
        idle: host.clone(),
        power: host.clone(),
        identity: host.clone(),
        store: store.clone(),
    }
}

#[tokio::test]
async fn test_records_corrected_interval() {
    let dir = tempfile::tempdir().unwrap();
    let host = make_host();
    let store = make_store();

    let agent = Agent::new(make_test_config(dir.path()), collaborators(&host, &store))
        .with_clock(evening);
    let record = agent.record_attendance().await.unwrap();

    assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    assert_eq!(record.employee_id.as_str(), "E042");
    assert_eq!(record.employee_name, "Ada");
    assert_eq!(record.check_in, at(5, 1, 8, 5).naive_local());
    assert_eq!(record.check_out, Some(at(4, 30, 19, 58).naive_local()));
    assert_eq!(record.agent_version, AGENT_VERSION);

    let stored = store
        .fetch_record(record.date, &record.employee_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, record);
}

#[tokio::test]
async fn test_once_skips_monitoring() {
    let dir = tempfile::tempdir().unwrap();
    let host = make_host();
    let store = make_store();

    let agent = Agent::new(make_test_config(dir.path()), collaborators(&host, &store))
        .with_clock(evening);

    assert_eq!(agent.run(true).await.unwrap(), RunOutcome::MonitoringSkipped);
    assert!(host.shutdown_requests().is_empty());
}

#[tokio::test]
async fn test_disabled_monitor_skips_monitoring() {
    let dir = tempfile::tempdir().unwrap();
    let host = make_host();
    let store = make_store();
    let mut config = make_test_config(dir.path());
    config.shutdown.enabled = false;

    let agent = Agent::new(config, collaborators(&host, &store)).with_clock(evening);

    assert_eq!(agent.run(false).await.unwrap(), RunOutcome::MonitoringSkipped);
    assert!(host.shutdown_requests().is_empty());
}

#[tokio::test]
async fn test_exemption_marker_skips_monitoring() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("exempt"), "").unwrap();
    let host = make_host();
    let store = make_store();

    let agent = Agent::new(make_test_config(dir.path()), collaborators(&host, &store))
        .with_clock(evening);

    assert_eq!(
        agent.run(false).await.unwrap(),
        RunOutcome::Exempt(dir.path().join("exempt"))
    );
    assert!(host.shutdown_requests().is_empty());

    // Attendance is still recorded
    let stored = store
        .fetch_record(
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            &EmployeeId::new("E042"),
        )
        .await
        .unwrap();
    assert!(stored.is_some());
}

#[tokio::test]
async fn test_idle_evening_requests_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let host = make_host();
    let store = make_store();

    let agent = Agent::new(make_test_config(dir.path()), collaborators(&host, &store))
        .with_clock(evening);

    assert_eq!(agent.run(false).await.unwrap(), RunOutcome::ShutdownAccepted);

    let requests = host.shutdown_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].countdown, Duration::from_secs(300));
}

#[tokio::test(start_paused = true)]
async fn test_declined_shutdown_keeps_monitoring() {
    let dir = tempfile::tempdir().unwrap();
    let host = make_host();
    host.queue_responses([ShutdownResponse::Declined, ShutdownResponse::Declined]);
    let store = make_store();
    let mut config = make_test_config(dir.path());
    config.shutdown.interactive = true;

    let agent = Agent::new(config, collaborators(&host, &store)).with_clock(evening);

    assert_eq!(agent.run(false).await.unwrap(), RunOutcome::ShutdownAccepted);
    assert_eq!(host.shutdown_requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_todays_first_event() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(MockHost::new().with_identity(MachineId::parse(MAC).unwrap()));
    host.push_event(6006, at(4, 30, 18, 0));
    let store = make_store();

    let delayed = host.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(700)).await;
        delayed.push_event(7001, at(5, 1, 8, 50));
    });

    let started = tokio::time::Instant::now();
    let agent = Agent::new(make_test_config(dir.path()), collaborators(&host, &store))
        .with_clock(morning);
    let record = agent.record_attendance().await.unwrap();

    assert_eq!(record.check_in, at(5, 1, 8, 50).naive_local());
    assert_eq!(record.check_out, Some(at(4, 30, 18, 0).naive_local()));
    // Three failed attempts, 300s apart
    assert!(started.elapsed() >= Duration::from_secs(900));
}

#[tokio::test(start_paused = true)]
async fn test_retries_until_machine_is_on_roster() {
    let dir = tempfile::tempdir().unwrap();
    let host = make_host();
    host.set_identity(MachineId::parse("aa:aa:aa:aa:aa:aa"));
    let store = make_store();

    let late_roster = store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(400)).await;
        late_roster
            .put_employee(&Employee {
                employee_id: EmployeeId::new("E100"),
                name: "Grace".into(),
                machine_id: MachineId::parse("AA-AA-AA-AA-AA-AA"),
            })
            .unwrap();
    });

    let agent = Agent::new(make_test_config(dir.path()), collaborators(&host, &store))
        .with_clock(morning);
    let record = agent.record_attendance().await.unwrap();

    assert_eq!(record.employee_id.as_str(), "E100");
    assert_eq!(record.machine_id.as_str(), "AA:AA:AA:AA:AA:AA");
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let host = make_host();
    let store = make_store();

    let first = Agent::new(make_test_config(dir.path()), collaborators(&host, &store))
        .with_clock(morning)
        .record_attendance()
        .await
        .unwrap();
    let second = Agent::new(make_test_config(dir.path()), collaborators(&host, &store))
        .with_clock(evening)
        .record_attendance()
        .await
        .unwrap();

    assert_eq!(first, second);
    assert!(store.verify(&first).await.unwrap());
}
