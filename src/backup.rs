use crate::model::{Attendance, Student};
use crate::store::{self, ATTENDANCE_KEY, STUDENTS_KEY};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const STUDENTS_ENTRY: &str = "data/students.json";
const ATTENDANCE_ENTRY: &str = "data/attendance.json";
pub const BUNDLE_FORMAT_V1: &str = "rosterd-workspace-v1";
/// A browser `localStorage` dump holding the two app keys.
pub const LOCAL_STORAGE_FORMAT: &str = "local-storage-json";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub students: usize,
    pub days: usize,
}

#[derive(Debug, Clone)]
pub struct BundleContents {
    pub format_detected: String,
    pub students: Vec<Student>,
    pub attendance: Attendance,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    version: u32,
    app_version: String,
    exported_at: String,
    entries: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestEntry {
    path: String,
    sha256: String,
    bytes: u64,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn export_bundle(
    students: &[Student],
    attendance: &Attendance,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let students_json =
        serde_json::to_vec_pretty(students).context("failed to serialize roster")?;
    let attendance_json =
        serde_json::to_vec_pretty(attendance).context("failed to serialize attendance")?;
    let payload = [
        (STUDENTS_ENTRY, students_json),
        (ATTENDANCE_ENTRY, attendance_json),
    ];

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = Manifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        version: 1,
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        entries: payload
            .iter()
            .map(|(path, bytes)| ManifestEntry {
                path: path.to_string(),
                sha256: sha256_hex(bytes),
                bytes: bytes.len() as u64,
            })
            .collect(),
    };
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        &serde_json::to_vec_pretty(&manifest).context("failed to serialize manifest")?,
    )
    .context("failed to write manifest entry")?;

    for (path, bytes) in &payload {
        zip.start_file(*path, opts)
            .with_context(|| format!("failed to start {path}"))?;
        zip.write_all(bytes)
            .with_context(|| format!("failed to write {path}"))?;
    }
    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: payload.len() + 1,
        students: students.len(),
        days: attendance.days.len(),
    })
}

/// Reads a zip bundle (digest-checked) or a `localStorage` JSON dump. The
/// returned roster is not migrated yet.
pub fn read_bundle(in_path: &Path) -> anyhow::Result<BundleContents> {
    if !is_zip_file(in_path)? {
        let text = std::fs::read_to_string(in_path)
            .with_context(|| format!("failed to read {}", in_path.to_string_lossy()))?;
        return parse_local_storage_dump(&text);
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let manifest_bytes = read_entry(&mut archive, MANIFEST_ENTRY)?;
    let manifest: Manifest =
        serde_json::from_slice(&manifest_bytes).context("manifest.json is invalid")?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", manifest.format));
    }

    let mut verified = |name: &str| -> anyhow::Result<String> {
        let listed = manifest
            .entries
            .iter()
            .find(|e| e.path == name)
            .ok_or_else(|| anyhow!("manifest does not list {name}"))?;
        let bytes = read_entry(&mut archive, name)?;
        let actual = sha256_hex(&bytes);
        if actual != listed.sha256 {
            return Err(anyhow!(
                "checksum mismatch for {name}: expected {}, got {actual}",
                listed.sha256
            ));
        }
        String::from_utf8(bytes).with_context(|| format!("{name} is not UTF-8"))
    };
    let students_text = verified(STUDENTS_ENTRY)?;
    let attendance_text = verified(ATTENDANCE_ENTRY)?;

    Ok(BundleContents {
        format_detected: manifest.format,
        students: store::decode_students(&students_text).context("invalid roster entry")?,
        attendance: store::decode_attendance(&attendance_text)
            .context("invalid attendance entry")?,
    })
}

fn read_entry<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> anyhow::Result<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .with_context(|| format!("bundle missing {name}"))?;
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .with_context(|| format!("failed to read {name}"))?;
    Ok(bytes)
}

/// `{ "student_app_data_v1": ..., "student_app_attendance_v1": ... }` where each
/// value is either the stored JSON string or the parsed value itself. A missing
/// key is an empty collection.
fn parse_local_storage_dump(text: &str) -> anyhow::Result<BundleContents> {
    let dump: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(text).context("input is neither a zip bundle nor a JSON object")?;
    if !dump.contains_key(STUDENTS_KEY) && !dump.contains_key(ATTENDANCE_KEY) {
        return Err(anyhow!(
            "JSON input has neither {STUDENTS_KEY} nor {ATTENDANCE_KEY}"
        ));
    }

    let raw = |key: &str| -> Option<String> {
        match dump.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    };
    let students = match raw(STUDENTS_KEY) {
        Some(t) => store::decode_students(&t).context("invalid roster value")?,
        None => Vec::new(),
    };
    let attendance = match raw(ATTENDANCE_KEY) {
        Some(t) => store::decode_attendance(&t).context("invalid attendance value")?,
        None => Attendance::default(),
    };
    Ok(BundleContents {
        format_detected: LOCAL_STORAGE_FORMAT.to_string(),
        students,
        attendance,
    })
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttendanceStatus;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn sample() -> (Vec<Student>, Attendance) {
        let students: Vec<Student> = serde_json::from_str(
            r#"[{"id":"s1","fullName":"Deniz","turkishSchool":"Rhein","motherName":"Ayşe"}]"#,
        )
        .expect("students");
        let mut attendance = Attendance::default();
        attendance.toggle(
            NaiveDate::from_ymd_opt(2024, 3, 5).expect("date"),
            "s1",
            AttendanceStatus::Late,
        );
        (students, attendance)
    }

    #[test]
    fn bundle_export_then_read() {
        let dir = temp_dir("rosterd-backup");
        let path = dir.join("out").join("roster.zip");
        let (students, attendance) = sample();

        let summary = export_bundle(&students, &attendance, &path).expect("export");
        assert_eq!(summary.entry_count, 3);
        assert_eq!((summary.students, summary.days), (1, 1));

        let read = read_bundle(&path).expect("read");
        assert_eq!(read.format_detected, BUNDLE_FORMAT_V1);
        assert_eq!(read.students, students);
        assert_eq!(read.attendance, attendance);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn tampered_entry_fails_digest_check() {
        let dir = temp_dir("rosterd-backup-tamper");
        let path = dir.join("tampered.zip");
        let (students, attendance) = sample();

        let good = dir.join("good.zip");
        export_bundle(&students, &attendance, &good).expect("export");
        let mut archive = ZipArchive::new(File::open(&good).expect("open")).expect("zip");
        let manifest = read_entry(&mut archive, MANIFEST_ENTRY).expect("manifest");
        let att = read_entry(&mut archive, ATTENDANCE_ENTRY).expect("attendance");

        let mut zip = ZipWriter::new(File::create(&path).expect("create"));
        let opts = FileOptions::default();
        zip.start_file(MANIFEST_ENTRY, opts).expect("start");
        zip.write_all(&manifest).expect("write");
        zip.start_file(STUDENTS_ENTRY, opts).expect("start");
        zip.write_all(b"[]").expect("write");
        zip.start_file(ATTENDANCE_ENTRY, opts).expect("start");
        zip.write_all(&att).expect("write");
        zip.finish().expect("finish");

        let err = read_bundle(&path).expect_err("digest mismatch");
        assert!(err.to_string().contains("checksum mismatch"), "{err}");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn local_storage_dump_accepts_string_and_inline_values() {
        let dump = serde_json::json!({
            STUDENTS_KEY: r#"[{"fullName":"Elif","schoolName":"Goethe"}]"#,
            ATTENDANCE_KEY: {"2024-03-05": {"x": "absent"}},
            "unrelated": "ignored",
        });
        let read = parse_local_storage_dump(&dump.to_string()).expect("parse");
        assert_eq!(read.format_detected, LOCAL_STORAGE_FORMAT);
        assert_eq!(read.students.len(), 1);
        assert_eq!(read.students[0].id, "");
        assert_eq!(read.attendance.days.len(), 1);

        assert!(parse_local_storage_dump(r#"{"other": 1}"#).is_err());
        assert!(parse_local_storage_dump("not json").is_err());
    }
}
