use crate::migrate::{self, MigrationReport};
use crate::model::{Attendance, AttendanceStatus, DayStats, Student};
use crate::store::{self, KeyValueStore, ATTENDANCE_KEY, STUDENTS_KEY};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("student not found: {0}")]
    UnknownStudent(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Saved {
    pub created: bool,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Nothing changed; the caller has to ask the user first.
    ConfirmationRequired { full_name: String },
    NotFound,
    Deleted {
        entries_removed: usize,
        days_removed: usize,
        closed_detail: bool,
        persisted: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub status: Option<AttendanceStatus>,
    pub persisted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkChange {
    pub marked: usize,
    pub persisted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replaced {
    pub migration: MigrationReport,
    pub orphans_dropped: usize,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchoolGroup {
    pub name: String,
    pub count: usize,
}

/// Sole owner and mutator of the roster and attendance collections.
///
/// Every mutation builds the next collection, hands it to the store, and only
/// then makes it visible. A failed write is logged and the change is kept; the
/// returned `persisted` flag tells the caller.
pub struct RosterController<S: KeyValueStore> {
    store: S,
    students: Vec<Student>,
    attendance: Attendance,
    open_student: Option<String>,
}

impl<S: KeyValueStore> RosterController<S> {
    /// Loads both collections and runs the migration step over the roster.
    /// An upgraded roster is written back so the upgrade happens once.
    pub fn load(store: S) -> (Self, MigrationReport) {
        let raw = store::load_students(&store);
        let attendance = store::load_attendance(&store);
        let (students, report) = migrate::migrate_roster(raw, migrate::new_student_id);

        let mut ctl = Self {
            store,
            students: Vec::new(),
            attendance,
            open_student: None,
        };
        if !report.is_noop() {
            info!(
                ids = report.ids_assigned,
                schools = report.schools_backfilled,
                parents = report.parents_backfilled,
                "migrated stored roster"
            );
            ctl.persist(Some(&students), None);
        }
        ctl.students = students;
        (ctl, report)
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn attendance(&self) -> &Attendance {
        &self.attendance
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Replace in place when the id exists, append otherwise. Callers are
    /// trusted to hand in a well-formed record.
    pub fn add_or_update_student(&mut self, student: Student) -> Saved {
        let mut next = self.students.clone();
        let created = match next.iter_mut().find(|s| s.id == student.id) {
            Some(slot) => {
                *slot = student;
                false
            }
            None => {
                next.push(student);
                true
            }
        };
        let persisted = self.persist(Some(&next), None);
        self.students = next;
        Saved { created, persisted }
    }

    /// Cascading delete, gated on `confirmed`. The roster and the attendance
    /// store are written in one store call.
    pub fn delete_student(&mut self, id: &str, confirmed: bool) -> DeleteOutcome {
        let Some(student) = self.student(id) else {
            return DeleteOutcome::NotFound;
        };
        if !confirmed {
            return DeleteOutcome::ConfirmationRequired {
                full_name: student.full_name.clone(),
            };
        }

        let students: Vec<Student> = self
            .students
            .iter()
            .filter(|s| s.id != id)
            .cloned()
            .collect();
        let mut attendance = self.attendance.clone();
        let (entries_removed, days_removed) = attendance.remove_student(id);

        let persisted = self.persist(Some(&students), Some(&attendance));
        self.students = students;
        self.attendance = attendance;

        let closed_detail = self.open_student.as_deref() == Some(id);
        if closed_detail {
            self.open_student = None;
        }
        info!(
            student_id = id,
            entries_removed, days_removed, persisted, "deleted student"
        );
        DeleteOutcome::Deleted {
            entries_removed,
            days_removed,
            closed_detail,
            persisted,
        }
    }

    pub fn set_attendance_status(
        &mut self,
        date: NaiveDate,
        student_id: &str,
        status: AttendanceStatus,
    ) -> Result<StatusChange, ControllerError> {
        if self.student(student_id).is_none() {
            return Err(ControllerError::UnknownStudent(student_id.to_string()));
        }
        let mut next = self.attendance.clone();
        let status = next.toggle(date, student_id, status);
        let persisted = self.persist(None, Some(&next));
        self.attendance = next;
        debug!(%date, student_id, status = ?status, "attendance toggled");
        Ok(StatusChange { status, persisted })
    }

    /// Stamps `present` for every id on the roster; unknown ids are skipped.
    pub fn mark_all_present(&mut self, date: NaiveDate, student_ids: &[String]) -> BulkChange {
        let known = self.roster_subset(student_ids);
        if known.is_empty() {
            return BulkChange {
                marked: 0,
                persisted: true,
            };
        }
        let mut next = self.attendance.clone();
        let marked = next.mark_present(date, known);
        let persisted = self.persist(None, Some(&next));
        self.attendance = next;
        BulkChange { marked, persisted }
    }

    pub fn day_stats(&self, date: NaiveDate, student_ids: &[String]) -> DayStats {
        self.attendance
            .stats(date, self.roster_subset(student_ids))
    }

    /// Ids on the roster, each once, in first-seen order.
    fn roster_subset<'a>(&self, student_ids: &'a [String]) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        student_ids
            .iter()
            .map(String::as_str)
            .filter(|id| self.student(id).is_some() && seen.insert(*id))
            .collect()
    }

    /// Sorted grouping keys with their student counts. Students without any
    /// school are not grouped.
    pub fn school_groups(&self) -> Vec<SchoolGroup> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for s in &self.students {
            if let Some(key) = s.grouping_key() {
                *counts.entry(key).or_default() += 1;
            }
        }
        counts
            .into_iter()
            .map(|(name, count)| SchoolGroup {
                name: name.to_string(),
                count,
            })
            .collect()
    }

    /// Roster order, optionally restricted to one grouping key.
    pub fn students_in_school(&self, school: Option<&str>) -> Vec<&Student> {
        self.students
            .iter()
            .filter(|s| school.map_or(true, |k| s.grouping_key() == Some(k)))
            .collect()
    }

    pub fn open_student(&mut self, id: &str) -> Result<(), ControllerError> {
        if self.student(id).is_none() {
            return Err(ControllerError::UnknownStudent(id.to_string()));
        }
        self.open_student = Some(id.to_string());
        Ok(())
    }

    pub fn close_student(&mut self) {
        self.open_student = None;
    }

    pub fn open_student_id(&self) -> Option<&str> {
        self.open_student.as_deref()
    }

    /// Swaps in a whole roster and attendance store (backup restore). The
    /// roster is migrated and attendance entries for unknown ids are dropped
    /// before both are written together.
    pub fn replace_all(&mut self, students: Vec<Student>, mut attendance: Attendance) -> Replaced {
        let (students, migration) = migrate::migrate_roster(students, migrate::new_student_id);
        let known: HashSet<&str> = students.iter().map(|s| s.id.as_str()).collect();
        let orphans_dropped = attendance.retain_students(&known);

        let persisted = self.persist(Some(&students), Some(&attendance));
        if self
            .open_student
            .as_deref()
            .map_or(false, |open| !known.contains(open))
        {
            self.open_student = None;
        }
        self.students = students;
        self.attendance = attendance;
        info!(
            students = self.students.len(),
            days = self.attendance.days.len(),
            orphans_dropped,
            persisted,
            "replaced workspace data"
        );
        Replaced {
            migration,
            orphans_dropped,
            persisted,
        }
    }

    fn persist(&mut self, students: Option<&[Student]>, attendance: Option<&Attendance>) -> bool {
        let mut entries: Vec<(&str, String)> = Vec::with_capacity(2);
        let encoded = (|| {
            if let Some(s) = students {
                entries.push((STUDENTS_KEY, store::encode_students(s)?));
            }
            if let Some(a) = attendance {
                entries.push((ATTENDANCE_KEY, store::encode_attendance(a)?));
            }
            Ok::<_, store::StoreError>(())
        })();
        match encoded.and_then(|_| self.store.set_many(&entries)) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to persist; keeping in-memory change");
                false
            }
        }
    }
}
