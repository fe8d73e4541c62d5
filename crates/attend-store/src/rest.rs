//! PostgREST-backed record store (e.g. a hosted Supabase project)

use async_trait::async_trait;
use attend_util::{DATETIME_FORMAT, EmployeeId, MachineId};
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{AttendanceRecord, Employee, RecordStore, StoreError, StoreResult};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Connection settings for [`RestRecordStore`]
#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    /// Project base URL, without the `/rest/v1` suffix
    pub url: String,
    pub api_key: String,
    pub roster_table: String,
    pub attendance_table: String,
    pub timeout: Duration,
}

/// Roster row as returned by the backend
#[derive(Debug, Deserialize)]
struct RosterRow {
    employee_id: serde_json::Value,
    name: String,
    mac_address: Option<String>,
}

impl RosterRow {
    fn into_employee(self) -> Option<Employee> {
        let id = match self.employee_id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                warn!(employee_id = %other, "Ignoring roster row with unusable id");
                return None;
            }
        };
        Some(Employee {
            employee_id: EmployeeId::new(id),
            name: self.name,
            machine_id: self.mac_address.as_deref().and_then(MachineId::parse),
        })
    }
}

/// Attendance row as exchanged with the backend
#[derive(Debug, Serialize, Deserialize)]
struct AttendanceRow {
    date: String,
    employee_id: String,
    employee_name: String,
    mac_address: String,
    check_in: Option<String>,
    check_out: Option<String>,
    version: String,
}

impl From<&AttendanceRecord> for AttendanceRow {
    fn from(record: &AttendanceRecord) -> Self {
        Self {
            date: record.date.format(DATE_FORMAT).to_string(),
            employee_id: record.employee_id.as_str().to_string(),
            employee_name: record.employee_name.clone(),
            mac_address: record.machine_id.as_str().to_string(),
            check_in: Some(record.check_in.format(DATETIME_FORMAT).to_string()),
            check_out: record
                .check_out
                .map(|t| t.format(DATETIME_FORMAT).to_string()),
            version: record.agent_version.clone(),
        }
    }
}

impl AttendanceRow {
    fn into_record(self) -> StoreResult<AttendanceRecord> {
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT)
            .map_err(|e| StoreError::Serialization(format!("bad date '{}': {}", self.date, e)))?;
        let machine_id = MachineId::parse(&self.mac_address).ok_or_else(|| {
            StoreError::Serialization(format!("bad mac_address '{}'", self.mac_address))
        })?;
        let check_in = self
            .check_in
            .as_deref()
            .map(parse_timestamp)
            .transpose()?
            .ok_or_else(|| StoreError::Serialization("record has no check_in".into()))?;

        Ok(AttendanceRecord {
            date,
            employee_id: EmployeeId::new(self.employee_id),
            employee_name: self.employee_name,
            machine_id,
            check_in,
            check_out: self.check_out.as_deref().map(parse_timestamp).transpose()?,
            agent_version: self.version,
        })
    }
}

/// Parse a timestamp as written by us (`2024-05-01 08:45:00`) or as echoed
/// back by PostgREST (`2024-05-01T08:45:00`, possibly with fractions)
pub fn parse_timestamp(s: &str) -> StoreResult<NaiveDateTime> {
    let normalized = s.trim().replacen('T', " ", 1);
    let whole_seconds = normalized.split('.').next().unwrap_or(&normalized);
    NaiveDateTime::parse_from_str(whole_seconds, DATETIME_FORMAT)
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{}': {}", s, e)))
}

/// [`RecordStore`] speaking the PostgREST protocol
pub struct RestRecordStore {
    client: Client,
    config: RestStoreConfig,
}

impl RestRecordStore {
    pub fn new(config: RestStoreConfig) -> StoreResult<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| StoreError::Serialization("api_key is not a valid header value".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| StoreError::Serialization("api_key is not a valid header value".into()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url.trim_end_matches('/'), table)
    }

    fn roster_url(&self) -> String {
        format!(
            "{}?select=employee_id,name,mac_address",
            self.table_url(&self.config.roster_table)
        )
    }

    fn upsert_url(&self) -> String {
        format!(
            "{}?on_conflict=date,employee_id",
            self.table_url(&self.config.attendance_table)
        )
    }

    fn record_url(&self, date: NaiveDate, employee_id: &EmployeeId) -> String {
        format!(
            "{}?select=*&date=eq.{}&employee_id=eq.{}&limit=1",
            self.table_url(&self.config.attendance_table),
            date.format(DATE_FORMAT),
            encode_query_value(employee_id.as_str())
        )
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<Vec<u8>> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            return Ok(body.to_vec());
        }

        let body = String::from_utf8_lossy(&body).into_owned();
        if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            Err(StoreError::Unreachable(format!("{}: {}", status, body)))
        } else {
            Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Percent-encode a PostgREST filter value
fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'~' => out.push(byte as char),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

#[async_trait]
impl RecordStore for RestRecordStore {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn ping(&self) -> StoreResult<()> {
        let url = format!(
            "{}?select=employee_id&limit=1",
            self.table_url(&self.config.roster_table)
        );
        self.send(self.client.get(url)).await?;
        Ok(())
    }

    async fn fetch_roster(&self) -> StoreResult<Vec<Employee>> {
        let body = self.send(self.client.get(self.roster_url())).await?;
        let rows: Vec<RosterRow> = serde_json::from_slice(&body)?;
        let roster: Vec<Employee> = rows.into_iter().filter_map(RosterRow::into_employee).collect();
        debug!(count = roster.len(), "Fetched roster");
        Ok(roster)
    }

    async fn upsert(&self, record: &AttendanceRecord) -> StoreResult<()> {
        let body = serde_json::to_vec(&AttendanceRow::from(record))?;
        let request = self
            .client
            .post(self.upsert_url())
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .body(body);

        self.send(request).await?;
        debug!(
            date = %record.date,
            employee_id = %record.employee_id,
            "Attendance record upserted"
        );
        Ok(())
    }

    async fn fetch_record(
        &self,
        date: NaiveDate,
        employee_id: &EmployeeId,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let body = self
            .send(self.client.get(self.record_url(date, employee_id)))
            .await?;
        let rows: Vec<AttendanceRow> = serde_json::from_slice(&body)?;
        rows.into_iter().next().map(AttendanceRow::into_record).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const STORED_ROW: &str = r#"[{
        "id": 1,
        "date": "2024-05-01",
        "employee_id": "E001",
        "employee_name": "Ada",
        "mac_address": "AA:BB:CC:DD:EE:01",
        "check_in": "2024-05-01T08:45:00",
        "check_out": "2024-04-30T19:58:00",
        "version": "0.1.0"
    }]"#;

    fn stub_store(url: String) -> RestRecordStore {
        RestRecordStore::new(RestStoreConfig {
            url,
            api_key: "anon-key".into(),
            roster_table: "userlist".into(),
            attendance_table: "attendance".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn record() -> AttendanceRecord {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        AttendanceRecord {
            date,
            employee_id: EmployeeId::new("E001"),
            employee_name: "Ada".into(),
            machine_id: MachineId::parse("AA:BB:CC:DD:EE:01").unwrap(),
            check_in: date.and_hms_opt(8, 45, 0).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2024, 4, 30)
                .unwrap()
                .and_hms_opt(19, 58, 0),
            agent_version: "0.1.0".into(),
        }
    }

    async fn record_mock(server: &mut mockito::Server, body: &str) -> mockito::Mock {
        server
            .mock("GET", "/rest/v1/attendance")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("date".into(), "eq.2024-05-01".into()),
                Matcher::UrlEncoded("employee_id".into(), "eq.E001".into()),
            ]))
            .match_header("apikey", "anon-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn upsert_is_repeatable_and_verifies() {
        let mut server = mockito::Server::new_async().await;
        let upsert = server
            .mock("POST", "/rest/v1/attendance")
            .match_query(Matcher::UrlEncoded(
                "on_conflict".into(),
                "date,employee_id".into(),
            ))
            .match_header("apikey", "anon-key")
            .match_header("authorization", "Bearer anon-key")
            .match_header("prefer", Matcher::Regex("resolution=merge-duplicates".into()))
            .match_body(Matcher::PartialJsonString(
                r#"{
                    "date": "2024-05-01",
                    "employee_id": "E001",
                    "mac_address": "AA:BB:CC:DD:EE:01",
                    "check_in": "2024-05-01 08:45:00",
                    "check_out": "2024-04-30 19:58:00"
                }"#
                .into(),
            ))
            .with_status(201)
            .expect(2)
            .create_async()
            .await;
        let fetch = record_mock(&mut server, STORED_ROW).await;

        let store = stub_store(server.url());
        let record = record();
        store.upsert(&record).await.unwrap();
        store.upsert(&record).await.unwrap();
        assert!(store.verify(&record).await.unwrap());

        upsert.assert_async().await;
        fetch.assert_async().await;
    }

    #[tokio::test]
    async fn verify_rejects_different_stored_times() {
        let mut server = mockito::Server::new_async().await;
        let stale = STORED_ROW.replace("2024-04-30T19:58:00", "2024-04-30T23:40:00");
        record_mock(&mut server, &stale).await;

        let store = stub_store(server.url());
        assert!(!store.verify(&record()).await.unwrap());
    }

    #[tokio::test]
    async fn verify_is_false_when_nothing_stored() {
        let mut server = mockito::Server::new_async().await;
        record_mock(&mut server, "[]").await;

        let store = stub_store(server.url());
        assert!(!store.verify(&record()).await.unwrap());
    }

    #[tokio::test]
    async fn fetches_roster() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/userlist")
            .match_query(Matcher::UrlEncoded(
                "select".into(),
                "employee_id,name,mac_address".into(),
            ))
            .with_status(200)
            .with_body(r#"[{"employee_id": "E001", "name": "Ada", "mac_address": "aa-bb-cc-dd-ee-01"}]"#)
            .create_async()
            .await;

        let roster = stub_store(server.url()).fetch_roster().await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].machine_id, MachineId::parse("AA:BB:CC:DD:EE:01"));
    }

    #[tokio::test]
    async fn status_codes_map_to_errors() {
        let mut server = mockito::Server::new_async().await;
        let store = stub_store(server.url());

        for status in [500, 503, 408, 429] {
            let mock = server
                .mock("GET", "/rest/v1/userlist")
                .with_status(status)
                .with_body("try later")
                .create_async()
                .await;
            let err = store.fetch_roster().await.unwrap_err();
            assert!(matches!(err, StoreError::Unreachable(_)), "{}: {:?}", status, err);
            mock.remove_async().await;
        }

        for status in [400, 401, 404, 409] {
            let mock = server
                .mock("GET", "/rest/v1/userlist")
                .with_status(status)
                .with_body("nope")
                .create_async()
                .await;
            let err = store.fetch_roster().await.unwrap_err();
            assert!(
                matches!(&err, StoreError::Rejected { status: s, body } if *s as usize == status && body == "nope"),
                "{}: {:?}",
                status,
                err
            );
            mock.remove_async().await;
        }
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let store = stub_store(format!("http://127.0.0.1:{}", port));
        assert!(matches!(store.ping().await, Err(StoreError::Unreachable(_))));
    }

    fn store() -> RestRecordStore {
        RestRecordStore::new(RestStoreConfig {
            url: "https://example.supabase.co/".into(),
            api_key: "anon-key".into(),
            roster_table: "userlist".into(),
            attendance_table: "attendance".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn endpoint_urls() {
        let store = store();
        assert_eq!(
            store.roster_url(),
            "https://example.supabase.co/rest/v1/userlist?select=employee_id,name,mac_address"
        );
        assert_eq!(
            store.upsert_url(),
            "https://example.supabase.co/rest/v1/attendance?on_conflict=date,employee_id"
        );
        assert_eq!(
            store.record_url(
                NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                &EmployeeId::new("A 01")
            ),
            "https://example.supabase.co/rest/v1/attendance?select=*&date=eq.2024-05-01&employee_id=eq.A%2001&limit=1"
        );
    }

    #[test]
    fn parses_backend_timestamps() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 45, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-05-01 08:45:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-05-01T08:45:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-05-01T08:45:00.123456").unwrap(), expected);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn roster_rows_accept_numeric_ids() {
        let rows: Vec<RosterRow> = serde_json::from_str(
            r#"[
                {"employee_id": 7, "name": "Ada", "mac_address": "aa-bb-cc-dd-ee-ff"},
                {"employee_id": "E2", "name": "Grace", "mac_address": null},
                {"employee_id": null, "name": "Nobody", "mac_address": null}
            ]"#,
        )
        .unwrap();

        let roster: Vec<Employee> = rows.into_iter().filter_map(RosterRow::into_employee).collect();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].employee_id.as_str(), "7");
        assert_eq!(roster[0].machine_id.as_ref().unwrap().as_str(), "AA:BB:CC:DD:EE:FF");
        assert!(roster[1].machine_id.is_none());
    }

    #[test]
    fn attendance_row_round_trip() {
        let json = r#"{
            "id": 12,
            "date": "2024-05-01",
            "employee_id": "E001",
            "employee_name": "Ada",
            "mac_address": "AA:BB:CC:DD:EE:01",
            "check_in": "2024-05-01T08:45:00",
            "check_out": "2024-04-30T19:58:00",
            "version": "0.1.0"
        }"#;

        let record = serde_json::from_str::<AttendanceRow>(json)
            .unwrap()
            .into_record()
            .unwrap();
        assert_eq!(record.employee_id.as_str(), "E001");
        assert_eq!(
            record.check_out.unwrap().format(DATETIME_FORMAT).to_string(),
            "2024-04-30 19:58:00"
        );

        let row = AttendanceRow::from(&record);
        assert_eq!(row.check_in.as_deref(), Some("2024-05-01 08:45:00"));
        assert_eq!(row.mac_address, "AA:BB:CC:DD:EE:01");
    }
}
