use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One enrolled child as stored under `student_app_data_v1`.
///
/// Every string field is read leniently: stored data written by older
/// front-ends may carry numbers or `null` where a string is expected, and a
/// single odd value must not make the whole roster unreadable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub full_name: String,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub registered_school: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub turkish_school: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub mother_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub mother_phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub father_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub father_phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    // Deprecated single-field schema. Read and folded forward, never written
    // by current logic, but kept on the record.
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub school_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub parent_phone: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Student {
    /// School key used for grouping and filtering: the Turkish-course school,
    /// falling back to the legacy `schoolName`.
    pub fn grouping_key(&self) -> Option<&str> {
        present(&self.turkish_school).or_else(|| present(&self.school_name))
    }
}

/// `Some(s)` only for a non-empty value. Empty strings count as absent
/// everywhere a field's presence matters.
pub fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

fn scalar_to_string(v: serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_opt<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(v.and_then(scalar_to_string))
}

fn lenient_string<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt(d)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 4] = [
        AttendanceStatus::Present,
        AttendanceStatus::Absent,
        AttendanceStatus::Late,
        AttendanceStatus::Excused,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown attendance status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for AttendanceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttendanceStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s.trim())
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Student id -> status for one calendar date.
pub type DayRecord = BTreeMap<String, AttendanceStatus>;

/// Date key (`YYYY-MM-DD`) -> Day Record, as stored under
/// `student_app_attendance_v1`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attendance {
    pub days: BTreeMap<String, DayRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DayStats {
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
    pub none: usize,
}

impl DayStats {
    pub fn total(&self) -> usize {
        self.present + self.absent + self.late + self.excused + self.none
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn student_reads_legacy_shape_and_keeps_unknown_fields() {
        let raw = json!({
            "fullName": "Deniz",
            "grade": 4,
            "schoolName": "Goethe",
            "parentName": "Ayşe",
            "parentPhone": null,
            "favouriteColour": "blue"
        });
        let s: Student = serde_json::from_value(raw).expect("student");
        assert_eq!(s.id, "");
        assert_eq!(s.grade.as_deref(), Some("4"));
        assert_eq!(s.parent_phone, None);
        assert_eq!(s.extra.get("favouriteColour"), Some(&json!("blue")));

        let back = serde_json::to_value(&s).expect("encode");
        assert_eq!(back["favouriteColour"], json!("blue"));
        assert_eq!(back["schoolName"], json!("Goethe"));
        assert!(back.get("motherName").is_none());
    }

    #[test]
    fn grouping_key_falls_back_to_legacy_school() {
        let mut s = Student {
            school_name: Some("Legacy".into()),
            turkish_school: Some(String::new()),
            ..Student::default()
        };
        assert_eq!(s.grouping_key(), Some("Legacy"));
        s.turkish_school = Some("Current".into());
        assert_eq!(s.grouping_key(), Some("Current"));
    }

    #[test]
    fn status_parses_closed_set_only() {
        assert_eq!("late".parse::<AttendanceStatus>().ok(), Some(AttendanceStatus::Late));
        assert!("sick".parse::<AttendanceStatus>().is_err());
        assert_eq!(AttendanceStatus::Excused.to_string(), "excused");
    }
}
