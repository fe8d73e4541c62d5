//! Store trait definitions

use async_trait::async_trait;
use attend_util::{EmployeeId, MachineId};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::StoreResult;

/// Roster entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub employee_id: EmployeeId,
    pub name: String,
    /// `None` when the roster holds no valid hardware address
    pub machine_id: Option<MachineId>,
}

/// Find the roster entry assigned to `machine`
pub fn find_employee<'a>(roster: &'a [Employee], machine: &MachineId) -> Option<&'a Employee> {
    roster
        .iter()
        .find(|e| e.machine_id.as_ref() == Some(machine))
}

/// One employee's attendance for one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub date: NaiveDate,
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub machine_id: MachineId,
    pub check_in: NaiveDateTime,
    /// End of the previous working session, which may be an earlier date
    pub check_out: Option<NaiveDateTime>,
    pub agent_version: String,
}

impl AttendanceRecord {
    pub fn new(
        date: NaiveDate,
        employee: &Employee,
        machine_id: MachineId,
        check_in: DateTime<Local>,
        check_out: Option<DateTime<Local>>,
        agent_version: impl Into<String>,
    ) -> Self {
        Self {
            date,
            employee_id: employee.employee_id.clone(),
            employee_name: employee.name.clone(),
            machine_id,
            check_in: check_in.naive_local(),
            check_out: check_out.map(|dt| dt.naive_local()),
            agent_version: agent_version.into(),
        }
    }

    /// Whether `stored` carries the same check-in and check-out times
    pub fn times_match(&self, stored: &AttendanceRecord) -> bool {
        self.check_in == stored.check_in && self.check_out == stored.check_out
    }
}

/// Backend holding the roster and attendance records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Check that the backend is reachable
    async fn ping(&self) -> StoreResult<()>;

    /// All roster entries
    async fn fetch_roster(&self) -> StoreResult<Vec<Employee>>;

    /// Create or replace the record for `(record.date, record.employee_id)`
    async fn upsert(&self, record: &AttendanceRecord) -> StoreResult<()>;

    /// The stored record for `(date, employee_id)`, if any
    async fn fetch_record(
        &self,
        date: NaiveDate,
        employee_id: &EmployeeId,
    ) -> StoreResult<Option<AttendanceRecord>>;

    /// Read the record back and compare both times with `expected`
    async fn verify(&self, expected: &AttendanceRecord) -> StoreResult<bool> {
        let stored = self
            .fetch_record(expected.date, &expected.employee_id)
            .await?;

        let matches = stored
            .as_ref()
            .is_some_and(|stored| expected.times_match(stored));
        debug!(
            date = %expected.date,
            employee_id = %expected.employee_id,
            found = stored.is_some(),
            matches,
            "Verified attendance record"
        );
        Ok(matches)
    }
}
