//! Daily attendance records, one per student per date.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

use super::{constraint, new_id, now};
use crate::{Database, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Tardy,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Tardy => "tardy",
            AttendanceStatus::Excused => "excused",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "tardy" => Ok(AttendanceStatus::Tardy),
            "excused" => Ok(AttendanceStatus::Excused),
            other => Err(Error::Validation(format!("unknown attendance status `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    pub id: String,
    pub student_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excuse: Option<String>,
    pub recorded_by: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Create/update body. The recorder is the authenticated caller.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAttendance {
    pub student_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub excuse: Option<String>,
}

impl NewAttendance {
    pub fn validate(&self) -> Result<(), Error> {
        super::require("student_id", &self.student_id)?;
        if self.status == AttendanceStatus::Excused && self.excuse.as_deref().is_none_or(|e| e.trim().is_empty()) {
            return Err(Error::Validation("excused attendance needs an excuse".into()));
        }
        Ok(())
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";
const COLUMNS: &str = "id, student_id, date, status, excuse, recorded_by, created_at, updated_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Attendance> {
    let conversion = |idx: usize, e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    };
    let date: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(Attendance {
        id: row.get(0)?,
        student_id: row.get(1)?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|e| conversion(2, e.to_string()))?,
        status: status.parse().map_err(|e: Error| conversion(3, e.to_string()))?,
        excuse: row.get(4)?,
        recorded_by: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn fetch(conn: &rusqlite::Connection, id: &str) -> Result<Option<Attendance>, Error> {
    let sql = format!("SELECT {COLUMNS} FROM attendance WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], from_row).optional()?)
}

fn query(conn: &rusqlite::Connection, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Attendance>, Error> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, from_row)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl Database {
    /// Record attendance. A second record for the same student and date
    /// is a `Conflict`.
    pub async fn create_attendance(&self, input: &NewAttendance, recorded_by: &str) -> Result<Attendance, Error> {
        input.validate()?;
        let ts = now();
        let record = Attendance {
            id: new_id(),
            student_id: input.student_id.clone(),
            date: input.date,
            status: input.status,
            excuse: input.excuse.clone().filter(|e| !e.trim().is_empty()),
            recorded_by: recorded_by.to_string(),
            created_at: ts.clone(),
            updated_at: ts,
        };

        let row = record.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO attendance (id, student_id, date, status, excuse, recorded_by, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        row.id,
                        row.student_id,
                        row.date.format(DATE_FORMAT).to_string(),
                        row.status.as_str(),
                        row.excuse,
                        row.recorded_by,
                        row.created_at,
                        row.updated_at,
                    ],
                )
                .map_err(|e| constraint(e, "attendance record"))?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(record)
    }

    pub async fn get_attendance(&self, id: &str) -> Result<Option<Attendance>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Attendance>, Error> { fetch(conn, &id) })
            .await
            .map_err(Error::from)
    }

    pub async fn update_attendance(&self, id: &str, input: &NewAttendance, recorded_by: &str) -> Result<Attendance, Error> {
        input.validate()?;
        let id = id.to_string();
        let input = input.clone();
        let recorded_by = recorded_by.to_string();
        self.conn
            .call(move |conn| -> Result<Attendance, Error> {
                let changed = conn
                    .execute(
                        "UPDATE attendance SET student_id = ?2, date = ?3, status = ?4, excuse = ?5, recorded_by = ?6, updated_at = ?7
                         WHERE id = ?1",
                        params![
                            id,
                            input.student_id,
                            input.date.format(DATE_FORMAT).to_string(),
                            input.status.as_str(),
                            input.excuse.filter(|e| !e.trim().is_empty()),
                            recorded_by,
                            now(),
                        ],
                    )
                    .map_err(|e| constraint(e, "attendance record"))?;
                if changed == 0 {
                    return Err(Error::NotFound(format!("attendance {id}")));
                }
                fetch(conn, &id)?.ok_or_else(|| Error::NotFound(format!("attendance {id}")))
            })
            .await
            .map_err(Error::from)
    }

    pub async fn delete_attendance(&self, id: &str) -> Result<(), Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                if conn.execute("DELETE FROM attendance WHERE id = ?1", params![id])? == 0 {
                    return Err(Error::NotFound(format!("attendance {id}")));
                }
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// A student's records, newest date first.
    pub async fn attendance_for_student(&self, student_id: &str) -> Result<Vec<Attendance>, Error> {
        let student_id = student_id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<Attendance>, Error> {
                let sql = format!("SELECT {COLUMNS} FROM attendance WHERE student_id = ?1 ORDER BY date DESC");
                query(conn, &sql, params![student_id])
            })
            .await
            .map_err(Error::from)
    }

    /// All records with `start <= date <= end`, ordered by date.
    pub async fn attendance_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Attendance>, Error> {
        if start > end {
            return Err(Error::Validation("start date is after end date".into()));
        }
        let start = start.format(DATE_FORMAT).to_string();
        let end = end.format(DATE_FORMAT).to_string();
        self.conn
            .call(move |conn| -> Result<Vec<Attendance>, Error> {
                let sql = format!(
                    "SELECT {COLUMNS} FROM attendance WHERE date >= ?1 AND date <= ?2 ORDER BY date, student_id"
                );
                query(conn, &sql, params![start, end])
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewStudent, Role, User, migrated_db, new_user};

    async fn setup() -> (Database, String, User) {
        let db = migrated_db().await;
        let student = db.create_student(&NewStudent { name: "Kid".into(), age: 8, grade: 3 }).await.unwrap();
        let teacher = db.create_user(&new_user("teach", Role::Faculty)).await.unwrap();
        (db, student.id, teacher)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    fn present(student_id: &str, date: NaiveDate) -> NewAttendance {
        NewAttendance { student_id: student_id.into(), date, status: AttendanceStatus::Present, excuse: None }
    }

    #[tokio::test]
    async fn test_create_and_get_attendance() {
        let (db, student_id, teacher) = setup().await;
        let record = db.create_attendance(&present(&student_id, day(2)), &teacher.id).await.unwrap();
        let fetched = db.get_attendance(&record.id).await.unwrap().unwrap();
        assert_eq!(record, fetched);
        assert_eq!(fetched.recorded_by, teacher.id);
    }

    #[tokio::test]
    async fn test_one_record_per_student_per_day() {
        let (db, student_id, teacher) = setup().await;
        db.create_attendance(&present(&student_id, day(2)), &teacher.id).await.unwrap();
        let again = db.create_attendance(&present(&student_id, day(2)), &teacher.id).await;
        assert!(matches!(again, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_unknown_student_is_validation_error() {
        let (db, _, teacher) = setup().await;
        let result = db.create_attendance(&present("missing", day(2)), &teacher.id).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_excused_requires_excuse() {
        let (db, student_id, teacher) = setup().await;
        let mut input = present(&student_id, day(3));
        input.status = AttendanceStatus::Excused;
        assert!(matches!(db.create_attendance(&input, &teacher.id).await, Err(Error::Validation(_))));

        input.excuse = Some("doctor".into());
        let record = db.create_attendance(&input, &teacher.id).await.unwrap();
        assert_eq!(record.excuse.as_deref(), Some("doctor"));
    }

    #[tokio::test]
    async fn test_update_attendance() {
        let (db, student_id, teacher) = setup().await;
        let record = db.create_attendance(&present(&student_id, day(2)), &teacher.id).await.unwrap();
        let mut input = present(&student_id, day(2));
        input.status = AttendanceStatus::Tardy;
        let updated = db.update_attendance(&record.id, &input, &teacher.id).await.unwrap();
        assert_eq!(updated.status, AttendanceStatus::Tardy);

        assert!(matches!(db.update_attendance("missing", &input, &teacher.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_by_student_and_range() {
        let (db, student_id, teacher) = setup().await;
        for d in [2, 3, 4, 9] {
            db.create_attendance(&present(&student_id, day(d)), &teacher.id).await.unwrap();
        }

        let all = db.attendance_for_student(&student_id).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].date, day(9));

        let week = db.attendance_in_range(day(2), day(4)).await.unwrap();
        assert_eq!(week.iter().map(|a| a.date).collect::<Vec<_>>(), vec![day(2), day(3), day(4)]);

        assert!(matches!(db.attendance_in_range(day(4), day(2)).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_attendance() {
        let (db, student_id, teacher) = setup().await;
        let record = db.create_attendance(&present(&student_id, day(2)), &teacher.id).await.unwrap();
        db.delete_attendance(&record.id).await.unwrap();
        assert!(db.get_attendance(&record.id).await.unwrap().is_none());
    }
}
