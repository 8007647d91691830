use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_scoreboardd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn scoreboardd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
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

    let value = read_response(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("scoreboard-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["result"]["scores"], "idle");
    assert!(health["result"]["workspacePath"].is_null());

    // Everything that needs a workspace says so before one is selected.
    let no_ws = request(&mut stdin, &mut reader, "2", "scores.load", json!({}));
    assert_eq!(error_code(&no_ws), Some("no_workspace"));
    let no_ws = request(&mut stdin, &mut reader, "3", "setup.get", json!({}));
    assert_eq!(error_code(&no_ws), Some("no_workspace"));

    let selected = request(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["ok"], true);
    assert!(workspace.join("scoreboard.sqlite3").is_file());

    let not_loaded = request(&mut stdin, &mut reader, "5", "scores.view", json!({}));
    assert_eq!(error_code(&not_loaded), Some("not_loaded"));

    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "records.import",
        json!({ "users": [], "lessons": [], "progress": [] }),
    );
    let loaded = request(&mut stdin, &mut reader, "7", "scores.load", json!({}));
    assert_eq!(loaded["ok"], true);
    assert_eq!(loaded["result"]["students"], 0);

    let _ = request(&mut stdin, &mut reader, "8", "scores.gradeLevels", json!({}));
    let view = request(&mut stdin, &mut reader, "9", "scores.view", json!({}));
    assert_eq!(view["result"]["matchedStudents"], 0);
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "scores.student",
        json!({ "studentId": "nobody" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "reports.scoreReportModel",
        json!({}),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "exports.spreadsheet",
        json!({ "outPath": workspace.join("smoke.xlsx").to_string_lossy() }),
    );
    let _ = request(&mut stdin, &mut reader, "13", "setup.get", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "setup.update",
        json!({ "section": "display", "patch": { "locale": "en" } }),
    );

    let health = request(&mut stdin, &mut reader, "15", "health", json!({}));
    assert_eq!(health["result"]["scores"], "ready");

    // Unknown methods are reported, not dropped.
    writeln!(
        stdin,
        "{}",
        json!({ "id": "16", "method": "classes.list", "params": {} })
    )
    .expect("write request");
    stdin.flush().expect("flush request");
    let unknown = read_response(&mut reader);
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    // Unparseable lines get a reply without an id and the loop keeps going.
    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let bad = read_response(&mut reader);
    assert_eq!(error_code(&bad), Some("bad_json"));
    let health = request(&mut stdin, &mut reader, "17", "health", json!({}));
    assert_eq!(health["ok"], true);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
