//! Load-boundary upcast of stored student records.
//!
//! Stored rosters carry no schema version. Older front-ends wrote records
//! without ids, with a single `schoolName`, and with a single
//! `parentName`/`parentPhone` pair. Every rule here is guarded by "only if the
//! target field is absent", so running it on migrated data changes nothing.

use crate::model::{present, Student};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub ids_assigned: usize,
    pub schools_backfilled: usize,
    pub parents_backfilled: usize,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.ids_assigned == 0 && self.schools_backfilled == 0 && self.parents_backfilled == 0
    }
}

pub fn new_student_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldUpgrades {
    pub school: bool,
    pub parent: bool,
}

/// Folds the deprecated school and parent fields forward. Legacy fields are
/// left in place.
pub fn upgrade_fields(student: &mut Student) -> FieldUpgrades {
    let mut out = FieldUpgrades::default();

    if present(&student.turkish_school).is_none() {
        if let Some(school) = present(&student.school_name) {
            student.turkish_school = Some(school.to_string());
            out.school = true;
        }
    }

    if present(&student.mother_name).is_none() && present(&student.father_name).is_none() {
        if let Some(parent) = present(&student.parent_name) {
            student.mother_name = Some(parent.to_string());
            if let Some(phone) = present(&student.parent_phone) {
                student.mother_phone = Some(phone.to_string());
            }
            out.parent = true;
        }
    }

    out
}

/// Upgrades a whole stored roster. Ids are backfilled from `next_id`, which is
/// asked again whenever it hands out an id already used in this load.
pub fn migrate_roster<F>(records: Vec<Student>, mut next_id: F) -> (Vec<Student>, MigrationReport)
where
    F: FnMut() -> String,
{
    let mut report = MigrationReport::default();
    let mut taken: HashSet<String> = records
        .iter()
        .filter(|s| !s.id.is_empty())
        .map(|s| s.id.clone())
        .collect();

    let students = records
        .into_iter()
        .map(|mut s| {
            if s.id.is_empty() {
                let mut id = next_id();
                while id.is_empty() || taken.contains(&id) {
                    id = next_id();
                }
                taken.insert(id.clone());
                s.id = id;
                report.ids_assigned += 1;
            }
            let up = upgrade_fields(&mut s);
            if up.school {
                report.schools_backfilled += 1;
            }
            if up.parent {
                report.parents_backfilled += 1;
            }
            s
        })
        .collect();

    (students, report)
}
