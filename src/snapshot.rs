use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub username: String,
    pub fullname: String,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl Student {
    /// Grade level, treating an empty string the same as a missing one.
    pub fn grade(&self) -> Option<&str> {
        self.grade_level.as_deref().filter(|g| !g.is_empty())
    }

    /// Avatar image reference. Values starting with `fa-` are icon classes, not images.
    pub fn avatar(&self) -> Option<&str> {
        self.image
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.starts_with("fa-"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    pub xp: i64,
    /// Max achievable raw score.
    pub question_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressAttempt {
    pub student_id: String,
    pub lesson_id: i64,
    #[serde(default)]
    pub score: Option<i64>,
    pub passed: bool,
}

/// Attempts keyed by (student, lesson). Built once per load, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ProgressIndex {
    by_student: HashMap<String, HashMap<i64, ProgressAttempt>>,
    len: usize,
    overwritten: usize,
}

impl ProgressIndex {
    pub fn build<I>(attempts: I) -> Self
    where
        I: IntoIterator<Item = ProgressAttempt>,
    {
        let mut index = ProgressIndex::default();
        for attempt in attempts {
            let per_student = index
                .by_student
                .entry(attempt.student_id.clone())
                .or_default();
            // Last write wins for duplicate (student, lesson) pairs.
            if per_student.insert(attempt.lesson_id, attempt).is_some() {
                index.overwritten += 1;
            } else {
                index.len += 1;
            }
        }
        index
    }

    pub fn get(&self, student_id: &str, lesson_id: i64) -> Option<&ProgressAttempt> {
        self.by_student
            .get(student_id)
            .and_then(|per_student| per_student.get(&lesson_id))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// How many records were replaced by a later record with the same key.
    pub fn overwritten(&self) -> usize {
        self.overwritten
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSet {
    Students,
    Lessons,
    Progress,
}

impl fmt::Display for RecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordSet::Students => "students",
            RecordSet::Lessons => "lessons",
            RecordSet::Progress => "progress",
        })
    }
}

#[derive(Debug, Error)]
#[error("failed to load {set}: {message}")]
pub struct LoadError {
    pub set: RecordSet,
    pub message: String,
}

/// The three reads a load needs. Students come back ordered by username,
/// lessons by id; progress is unordered.
pub trait RecordSource {
    fn students(&self) -> anyhow::Result<Vec<Student>>;
    fn lessons(&self) -> anyhow::Result<Vec<Lesson>>;
    fn progress(&self) -> anyhow::Result<Vec<ProgressAttempt>>;
}

/// Immutable view of one data load.
#[derive(Debug, Clone)]
pub struct Snapshot {
    load_id: String,
    loaded_at: String,
    students: Vec<Student>,
    lessons: Vec<Lesson>,
    index: ProgressIndex,
}

impl Snapshot {
    pub fn new(
        students: Vec<Student>,
        lessons: Vec<Lesson>,
        attempts: Vec<ProgressAttempt>,
    ) -> Self {
        Snapshot {
            load_id: Uuid::new_v4().to_string(),
            loaded_at: chrono::Utc::now().to_rfc3339(),
            students,
            lessons,
            index: ProgressIndex::build(attempts),
        }
    }

    /// All three reads must succeed; the first failure aborts the load.
    pub fn load(source: &dyn RecordSource) -> Result<Snapshot, LoadError> {
        let students = source.students().map_err(|e| LoadError {
            set: RecordSet::Students,
            message: format!("{e:#}"),
        })?;
        let lessons = source.lessons().map_err(|e| LoadError {
            set: RecordSet::Lessons,
            message: format!("{e:#}"),
        })?;
        let attempts = source.progress().map_err(|e| LoadError {
            set: RecordSet::Progress,
            message: format!("{e:#}"),
        })?;

        let attempt_count = attempts.len();
        let snapshot = Snapshot::new(students, lessons, attempts);
        if snapshot.index.overwritten() > 0 {
            log::debug!(
                "progress index: {} duplicate attempt(s) overwritten",
                snapshot.index.overwritten()
            );
        }
        log::info!(
            "loaded snapshot {}: {} students, {} lessons, {} attempts",
            snapshot.load_id,
            snapshot.students.len(),
            snapshot.lessons.len(),
            attempt_count
        );
        Ok(snapshot)
    }

    pub fn load_id(&self) -> &str {
        &self.load_id
    }

    pub fn loaded_at(&self) -> &str {
        &self.loaded_at
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    pub fn index(&self) -> &ProgressIndex {
        &self.index
    }

    pub fn student(&self, student_id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == student_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(student: &str, lesson: i64, score: Option<i64>, passed: bool) -> ProgressAttempt {
        ProgressAttempt {
            student_id: student.to_string(),
            lesson_id: lesson,
            score,
            passed,
        }
    }

    struct FailingLessons;

    impl RecordSource for FailingLessons {
        fn students(&self) -> anyhow::Result<Vec<Student>> {
            Ok(vec![])
        }
        fn lessons(&self) -> anyhow::Result<Vec<Lesson>> {
            anyhow::bail!("connection reset")
        }
        fn progress(&self) -> anyhow::Result<Vec<ProgressAttempt>> {
            Ok(vec![])
        }
    }

    #[test]
    fn later_duplicate_attempt_wins() {
        let index = ProgressIndex::build(vec![
            attempt("s1", 1, Some(2), false),
            attempt("s1", 2, Some(5), true),
            attempt("s1", 1, Some(9), true),
        ]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.overwritten(), 1);
        let a = index.get("s1", 1).expect("attempt");
        assert_eq!(a.score, Some(9));
        assert!(a.passed);
        assert!(index.get("s2", 1).is_none());
    }

    #[test]
    fn load_fails_as_a_whole() {
        let e = Snapshot::load(&FailingLessons).expect_err("load should fail");
        assert_eq!(e.set, RecordSet::Lessons);
        assert!(e.to_string().contains("connection reset"));
    }

    #[test]
    fn avatar_skips_icon_tokens_and_blanks() {
        let mut s = Student {
            id: "s1".into(),
            username: "01".into(),
            fullname: "A".into(),
            grade_level: Some(String::new()),
            image: Some("fa-user".into()),
        };
        assert_eq!(s.avatar(), None);
        assert_eq!(s.grade(), None);
        s.image = Some("https://cdn.example/a.png".into());
        assert_eq!(s.avatar(), Some("https://cdn.example/a.png"));
        s.image = Some("  ".into());
        assert_eq!(s.avatar(), None);
    }
}
