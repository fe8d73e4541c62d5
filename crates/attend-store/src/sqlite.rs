//! SQLite-based record store

use async_trait::async_trait;
use attend_util::{DATETIME_FORMAT, EmployeeId, MachineId};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{AttendanceRecord, Employee, RecordStore, StoreError, StoreResult};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-based record store
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Roster
            CREATE TABLE IF NOT EXISTS employees (
                employee_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                mac_address TEXT
            );

            -- One row per employee and day
            CREATE TABLE IF NOT EXISTS attendance (
                date TEXT NOT NULL,
                employee_id TEXT NOT NULL,
                employee_name TEXT NOT NULL,
                mac_address TEXT NOT NULL,
                check_in TEXT NOT NULL,
                check_out TEXT,
                version TEXT NOT NULL,
                PRIMARY KEY (date, employee_id)
            );

            CREATE INDEX IF NOT EXISTS idx_employees_mac ON employees(mac_address);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    /// Add or replace a roster entry
    pub fn put_employee(&self, employee: &Employee) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO employees (employee_id, name, mac_address)
            VALUES (?, ?, ?)
            ON CONFLICT(employee_id) DO UPDATE SET
                name = excluded.name,
                mac_address = excluded.mac_address
            "#,
            params![
                employee.employee_id.as_str(),
                employee.name,
                employee.machine_id.as_ref().map(|m| m.as_str()),
            ],
        )?;

        debug!(employee_id = %employee.employee_id, "Roster entry saved");
        Ok(())
    }
}

fn parse_datetime(s: &str) -> StoreResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{}': {}", s, e)))
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn ping(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    async fn fetch_roster(&self) -> StoreResult<Vec<Employee>> {
        let conn = self.conn()?;

        let mut stmt =
            conn.prepare("SELECT employee_id, name, mac_address FROM employees ORDER BY employee_id")?;

        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let mac: Option<String> = row.get(2)?;
            Ok((id, name, mac))
        })?;

        let mut roster = Vec::new();
        for row in rows {
            let (id, name, mac) = row?;
            let machine_id = mac.as_deref().and_then(MachineId::parse);
            if mac.is_some() && machine_id.is_none() {
                warn!(employee_id = %id, mac = ?mac, "Ignoring invalid roster address");
            }
            roster.push(Employee {
                employee_id: EmployeeId::new(id),
                name,
                machine_id,
            });
        }

        Ok(roster)
    }

    async fn upsert(&self, record: &AttendanceRecord) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO attendance
                (date, employee_id, employee_name, mac_address, check_in, check_out, version)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(date, employee_id) DO UPDATE SET
                employee_name = excluded.employee_name,
                mac_address = excluded.mac_address,
                check_in = excluded.check_in,
                check_out = excluded.check_out,
                version = excluded.version
            "#,
            params![
                record.date.format(DATE_FORMAT).to_string(),
                record.employee_id.as_str(),
                record.employee_name,
                record.machine_id.as_str(),
                record.check_in.format(DATETIME_FORMAT).to_string(),
                record.check_out.map(|t| t.format(DATETIME_FORMAT).to_string()),
                record.agent_version,
            ],
        )?;

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
        let conn = self.conn()?;

        let row = conn
            .query_row(
                r#"
                SELECT employee_name, mac_address, check_in, check_out, version
                FROM attendance WHERE date = ? AND employee_id = ?
                "#,
                params![date.format(DATE_FORMAT).to_string(), employee_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((employee_name, mac, check_in, check_out, agent_version)) = row else {
            return Ok(None);
        };

        let machine_id = MachineId::parse(&mac)
            .ok_or_else(|| StoreError::Serialization(format!("bad mac_address '{}'", mac)))?;

        Ok(Some(AttendanceRecord {
            date,
            employee_id: employee_id.clone(),
            employee_name,
            machine_id,
            check_in: parse_datetime(&check_in)?,
            check_out: check_out.as_deref().map(parse_datetime).transpose()?,
            agent_version,
        }))
    }
}
