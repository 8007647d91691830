use crate::snapshot::{Lesson, ProgressAttempt, RecordSource, Student};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "scoreboard.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            fullname TEXT NOT NULL,
            grade_level TEXT,
            image TEXT,
            role TEXT NOT NULL DEFAULT 'student'
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_role_username ON users(role, username)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lessons(
            id INTEGER PRIMARY KEY,
            title TEXT,
            xp INTEGER NOT NULL DEFAULT 0,
            quiz TEXT
        )",
        [],
    )?;

    // No uniqueness on (student_id, lesson_id): the store may hold repeats and
    // the index decides which one counts.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS progress(
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL,
            lesson_id INTEGER NOT NULL,
            score INTEGER,
            passed INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_progress_student ON progress(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    // Older workspaces predate avatars.
    ensure_users_image(&conn)?;

    Ok(conn)
}

fn ensure_users_image(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "users", "image")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE users ADD COLUMN image TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Question count of a stored quiz payload. Anything other than a JSON array counts as 0.
pub fn quiz_question_count(lesson_id: i64, quiz: Option<&str>) -> i64 {
    let Some(raw) = quiz.map(str::trim).filter(|s| !s.is_empty()) else {
        return 0;
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => items.len() as i64,
        Ok(serde_json::Value::Null) => 0,
        Ok(_) => {
            log::warn!("lesson {}: quiz is not an array; counting 0 questions", lesson_id);
            0
        }
        Err(e) => {
            log::warn!("lesson {}: unreadable quiz ({}); counting 0 questions", lesson_id, e);
            0
        }
    }
}

/// Record source backed by the workspace database.
pub struct SqliteSource<'a> {
    pub conn: &'a Connection,
}

impl RecordSource for SqliteSource<'_> {
    fn students(&self) -> anyhow::Result<Vec<Student>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, fullname, grade_level, image
             FROM users
             WHERE role = 'student'
             ORDER BY username ASC",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(Student {
                    id: r.get(0)?,
                    username: r.get(1)?,
                    fullname: r.get(2)?,
                    grade_level: r.get(3)?,
                    image: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn lessons(&self) -> anyhow::Result<Vec<Lesson>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, title, xp, quiz FROM lessons ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], |r| {
                let id: i64 = r.get(0)?;
                let quiz: Option<String> = r.get(3)?;
                Ok(Lesson {
                    id,
                    title: r.get(1)?,
                    xp: r.get(2)?,
                    question_count: quiz_question_count(id, quiz.as_deref()),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn progress(&self) -> anyhow::Result<Vec<ProgressAttempt>> {
        let mut stmt = self
            .conn
            .prepare("SELECT student_id, lesson_id, score, passed FROM progress ORDER BY seq")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(ProgressAttempt {
                    student_id: r.get(0)?,
                    lesson_id: r.get(1)?,
                    score: r.get(2)?,
                    passed: r.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiz_count_tolerates_missing_and_malformed() {
        assert_eq!(quiz_question_count(1, None), 0);
        assert_eq!(quiz_question_count(1, Some("")), 0);
        assert_eq!(quiz_question_count(1, Some("null")), 0);
        assert_eq!(quiz_question_count(1, Some("{\"q\":1}")), 0);
        assert_eq!(quiz_question_count(1, Some("not json")), 0);
        assert_eq!(quiz_question_count(1, Some("[{\"q\":1},{\"q\":2}]")), 2);
    }

    #[test]
    fn source_reads_students_only_in_username_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open db");
        conn.execute_batch(
            "INSERT INTO users(id, username, fullname, grade_level, role) VALUES
               ('b', '20', 'Bee', 'M1', 'student'),
               ('t', '00', 'Teacher', NULL, 'admin'),
               ('a', '10', 'Aye', NULL, 'student');
             INSERT INTO lessons(id, xp, quiz) VALUES (2, 20, '[1,2,3]'), (1, 10, NULL);
             INSERT INTO progress(student_id, lesson_id, score, passed) VALUES
               ('a', 1, 4, 1), ('a', 1, 2, 0);",
        )
        .expect("seed");

        let source = SqliteSource { conn: &conn };
        let students = source.students().expect("students");
        let ids: Vec<&str> = students.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let lessons = source.lessons().expect("lessons");
        assert_eq!(lessons[0].id, 1);
        assert_eq!(lessons[0].question_count, 0);
        assert_eq!(lessons[1].question_count, 3);

        let progress = source.progress().expect("progress");
        assert_eq!(progress.len(), 2);
        assert_eq!(progress[1].score, Some(2));
        assert!(!progress[1].passed);
    }

    #[test]
    fn settings_roundtrip_upserts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open db");
        assert!(settings_get_json(&conn, "k").expect("get").is_none());
        settings_set_json(&conn, "k", &serde_json::json!({ "a": 1 })).expect("set");
        settings_set_json(&conn, "k", &serde_json::json!({ "a": 2 })).expect("set");
        assert_eq!(
            settings_get_json(&conn, "k").expect("get"),
            Some(serde_json::json!({ "a": 2 }))
        );
    }
}
