use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
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

fn spawn_sidecar(cwd: &Path) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rosterd");
    let mut child = Command::new(exe)
        .current_dir(cwd)
        .env_remove("ROSTERD_GEMINI_API_KEY")
        .env_remove("GEMINI_API_KEY")
        .env_remove("API_KEY")
        .env_remove("ROSTERD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rosterd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn stored(workspace: &Path, key: &str) -> serde_json::Value {
    let conn = Connection::open(workspace.join("roster.sqlite3")).expect("open db");
    let text: Option<String> = conn
        .query_row("SELECT value FROM kv_store WHERE key = ?", [key], |r| r.get(0))
        .optional()
        .expect("query kv_store");
    text.map(|t| serde_json::from_str(&t).expect("stored json"))
        .unwrap_or(serde_json::Value::Null)
}

fn save(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    name: &str,
) -> String {
    let result = request_ok(
        stdin,
        reader,
        id,
        "students.save",
        json!({ "student": { "fullName": name, "turkishSchool": "Rhein", "motherName": "Ayşe" } }),
    );
    result["student"]["id"].as_str().expect("id").to_string()
}

#[test]
fn delete_requires_confirmation_then_cascades() {
    let workspace = temp_dir("rosterd-delete-cascade");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let deniz = save(&mut stdin, &mut reader, "s1", "Deniz");
    let elif = save(&mut stdin, &mut reader, "s2", "Elif");
    for (id, date, student, status) in [
        ("a1", "2024-03-05", &deniz, "present"),
        ("a2", "2024-03-05", &elif, "absent"),
        ("a3", "2024-03-06", &deniz, "late"),
    ] {
        request_ok(
            &mut stdin,
            &mut reader,
            id,
            "attendance.setStatus",
            json!({ "date": date, "studentId": student, "status": status }),
        );
    }
    request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "students.open",
        json!({ "studentId": deniz }),
    );

    let unconfirmed = request(
        &mut stdin,
        &mut reader,
        "d0",
        "students.delete",
        json!({ "studentId": deniz }),
    );
    assert_eq!(unconfirmed["ok"], json!(false));
    assert_eq!(unconfirmed["error"]["code"], json!("confirmation_required"));
    assert_eq!(unconfirmed["error"]["details"]["fullName"], json!("Deniz"));
    assert_eq!(stored(&workspace, "student_app_data_v1").as_array().map(Vec::len), Some(2));

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "d1",
        "students.delete",
        json!({ "studentId": deniz, "confirmed": true }),
    );
    assert_eq!(deleted["attendanceEntriesRemoved"], json!(2));
    assert_eq!(deleted["attendanceDaysRemoved"], json!(1));
    assert_eq!(deleted["closedDetail"], json!(true));
    assert_eq!(deleted["persisted"], json!(true));

    let roster = stored(&workspace, "student_app_data_v1");
    assert_eq!(roster.as_array().map(Vec::len), Some(1));
    assert_eq!(roster[0]["id"], json!(elif));
    assert_eq!(
        stored(&workspace, "student_app_attendance_v1"),
        json!({ "2024-03-05": { elif.as_str(): "absent" } })
    );

    let again = request(
        &mut stdin,
        &mut reader,
        "d2",
        "students.delete",
        json!({ "studentId": deniz, "confirmed": true }),
    );
    assert_eq!(again["error"]["code"], json!("not_found"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn save_validates_form_and_updates_in_place() {
    let workspace = temp_dir("rosterd-save-form");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let no_name = request(
        &mut stdin,
        &mut reader,
        "v1",
        "students.save",
        json!({ "student": { "fullName": "  ", "turkishSchool": "Rhein" } }),
    );
    assert_eq!(no_name["error"]["code"], json!("bad_params"));
    assert_eq!(no_name["error"]["details"]["field"], json!("fullName"));

    let no_school = request(
        &mut stdin,
        &mut reader,
        "v2",
        "students.save",
        json!({ "student": { "fullName": "Deniz" } }),
    );
    assert_eq!(no_school["error"]["details"]["field"], json!("turkishSchool"));
    assert_eq!(stored(&workspace, "student_app_data_v1"), serde_json::Value::Null);

    let id = save(&mut stdin, &mut reader, "s1", "Deniz");
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "s2",
        "students.save",
        json!({ "student": {
            "id": id,
            "fullName": "Deniz Yılmaz",
            "turkishSchool": "Goethe",
            "grade": "4",
            "notes": "allergic to nuts"
        }}),
    );
    assert_eq!(updated["created"], json!(false));

    let listed = request_ok(&mut stdin, &mut reader, "l", "students.list", json!({}));
    assert_eq!(listed["count"], json!(1));
    assert_eq!(listed["students"][0]["fullName"], json!("Deniz Yılmaz"));
    assert_eq!(listed["students"][0]["notes"], json!("allergic to nuts"));

    let schools = request_ok(&mut stdin, &mut reader, "sc", "students.schools", json!({}));
    assert_eq!(schools["schools"], json!([{ "name": "Goethe", "count": 1 }]));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
