use crate::ipc::error::{err, ok};
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

const IMPORT_MAX_RECORDS: usize = 50_000;
/// Upper bound for xp, scores and quiz length.
const VALUE_MAX: i64 = 1_000_000;

/// Store rows may arrive with either camelCase or snake_case field names.
fn field<'a>(obj: &'a Map<String, Value>, camel: &str, snake: &str) -> Option<&'a Value> {
    obj.get(camel)
        .or_else(|| obj.get(snake))
        .filter(|v| !v.is_null())
}

fn id_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

struct RecordIssue {
    code: &'static str,
    table: &'static str,
    index: usize,
    message: String,
}

fn issue(table: &'static str, index: usize, message: impl Into<String>) -> RecordIssue {
    RecordIssue {
        code: "bad_params",
        table,
        index,
        message: message.into(),
    }
}

fn db_issue(table: &'static str, index: usize, e: rusqlite::Error) -> RecordIssue {
    RecordIssue {
        code: "db_insert_failed",
        table,
        index,
        message: e.to_string(),
    }
}

fn bounded(
    table: &'static str,
    index: usize,
    key: &str,
    v: &Value,
) -> Result<i64, RecordIssue> {
    match v.as_i64() {
        Some(n) if (0..=VALUE_MAX).contains(&n) => Ok(n),
        Some(_) => Err(issue(
            table,
            index,
            format!("{} must be between 0 and {}", key, VALUE_MAX),
        )),
        None => Err(issue(table, index, format!("{} must be an integer", key))),
    }
}

fn as_record<'a>(
    table: &'static str,
    index: usize,
    v: &'a Value,
) -> Result<&'a Map<String, Value>, RecordIssue> {
    v.as_object()
        .ok_or_else(|| issue(table, index, "record must be an object"))
}

fn import_users(conn: &Connection, users: &[Value]) -> Result<usize, RecordIssue> {
    for (i, v) in users.iter().enumerate() {
        let obj = as_record("users", i, v)?;
        let id = field(obj, "id", "id")
            .and_then(id_text)
            .ok_or_else(|| issue("users", i, "missing id"))?;
        let username = field(obj, "username", "username")
            .and_then(id_text)
            .ok_or_else(|| issue("users", i, "missing username"))?;
        let fullname = field(obj, "fullname", "full_name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let grade_level = field(obj, "gradeLevel", "grade_level").and_then(id_text);
        let image = field(obj, "image", "image")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let role = field(obj, "role", "role")
            .and_then(|v| v.as_str())
            .unwrap_or("student")
            .to_string();

        conn.execute(
            "INSERT INTO users(id, username, fullname, grade_level, image, role)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               username = excluded.username,
               fullname = excluded.fullname,
               grade_level = excluded.grade_level,
               image = excluded.image,
               role = excluded.role",
            (&id, &username, &fullname, &grade_level, &image, &role),
        )
        .map_err(|e| db_issue("users", i, e))?;
    }
    Ok(users.len())
}

fn import_lessons(conn: &Connection, lessons: &[Value]) -> Result<usize, RecordIssue> {
    for (i, v) in lessons.iter().enumerate() {
        let obj = as_record("lessons", i, v)?;
        let id = field(obj, "id", "id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| issue("lessons", i, "id must be an integer"))?;
        let title = field(obj, "title", "title")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let xp = match field(obj, "xp", "xp") {
            None => 0,
            Some(v) => bounded("lessons", i, "xp", v)?,
        };
        let quiz = match field(obj, "quiz", "quiz") {
            None => None,
            Some(Value::Array(items)) if items.len() as i64 > VALUE_MAX => {
                return Err(issue(
                    "lessons",
                    i,
                    format!("quiz must have at most {} questions", VALUE_MAX),
                ))
            }
            Some(q) if q.is_array() => Some(q.to_string()),
            Some(_) => return Err(issue("lessons", i, "quiz must be an array or null")),
        };

        conn.execute(
            "INSERT INTO lessons(id, title, xp, quiz)
             VALUES(?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               title = excluded.title,
               xp = excluded.xp,
               quiz = excluded.quiz",
            (id, &title, xp, &quiz),
        )
        .map_err(|e| db_issue("lessons", i, e))?;
    }
    Ok(lessons.len())
}

fn import_progress(conn: &Connection, progress: &[Value]) -> Result<usize, RecordIssue> {
    for (i, v) in progress.iter().enumerate() {
        let obj = as_record("progress", i, v)?;
        let student_id = field(obj, "studentId", "student_id")
            .and_then(id_text)
            .ok_or_else(|| issue("progress", i, "missing studentId"))?;
        let lesson_id = field(obj, "lessonId", "lesson_id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| issue("progress", i, "lessonId must be an integer"))?;
        let score = match field(obj, "score", "score") {
            None => None,
            Some(v) => Some(bounded("progress", i, "score", v)?),
        };
        let passed = field(obj, "passed", "passed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        conn.execute(
            "INSERT INTO progress(student_id, lesson_id, score, passed) VALUES(?, ?, ?, ?)",
            (&student_id, lesson_id, score, passed as i64),
        )
        .map_err(|e| db_issue("progress", i, e))?;
    }
    Ok(progress.len())
}

fn array_param<'a>(req: &'a Request, key: &str) -> Result<&'a [Value], serde_json::Value> {
    match req.params.get(key) {
        None => Ok(&[]),
        Some(v) if v.is_null() => Ok(&[]),
        Some(v) => v
            .as_array()
            .map(|a| a.as_slice())
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be an array", key), None)),
    }
}

fn handle_records_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let users = match array_param(req, "users") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let lessons = match array_param(req, "lessons") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let progress = match array_param(req, "progress") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let replace = req
        .params
        .get("replace")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let total = users.len() + lessons.len() + progress.len();
    if total > IMPORT_MAX_RECORDS {
        return err(
            &req.id,
            "bad_params",
            format!(
                "import payload exceeds max records: {} > {}",
                total, IMPORT_MAX_RECORDS
            ),
            None,
        );
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    if replace {
        if let Err(e) = tx.execute_batch("DELETE FROM progress; DELETE FROM lessons; DELETE FROM users;") {
            return err(&req.id, "db_delete_failed", e.to_string(), None);
        }
    }

    let imported = import_users(&tx, users).and_then(|u| {
        let l = import_lessons(&tx, lessons)?;
        let p = import_progress(&tx, progress)?;
        Ok((u, l, p))
    });
    let (u, l, p) = match imported {
        Ok(v) => v,
        Err(i) => {
            // Dropping the transaction rolls back everything written so far.
            return err(
                &req.id,
                i.code,
                i.message,
                Some(json!({ "table": i.table, "index": i.index })),
            );
        }
    };

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    log::info!(
        "imported {} users, {} lessons, {} progress records{}",
        u,
        l,
        p,
        if replace { " (replaced)" } else { "" }
    );
    ok(
        &req.id,
        json!({ "users": u, "lessons": l, "progress": p, "replaced": replace }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "records.import" => Some(handle_records_import(state, req)),
        _ => None,
    }
}
