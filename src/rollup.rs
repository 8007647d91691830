use crate::snapshot::{Lesson, ProgressIndex, Snapshot};
use serde::Serialize;

/// Raw quiz score for one (student, lesson) attempt.
/// `obtained` is `None` when the attempt carries no score value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawScore {
    pub obtained: Option<i64>,
    pub max: i64,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTotal {
    pub obtained: i64,
    pub max: i64,
}

/// Display state of one lesson cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum AttemptState {
    NoAttempt,
    Failed {
        obtained: Option<i64>,
        max: i64,
    },
    Passed {
        xp: i64,
        obtained: Option<i64>,
        max: i64,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonResult {
    pub lesson_id: i64,
    pub lesson_xp: i64,
    #[serde(flatten)]
    pub state: AttemptState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRollup {
    pub student_id: String,
    pub total_xp: i64,
    pub raw_total: RawTotal,
    pub pass_count: usize,
    pub lesson_count: usize,
    pub lessons: Vec<LessonResult>,
}

/// Metric calculator over one snapshot's index and lesson list.
#[derive(Debug, Clone, Copy)]
pub struct Rollup<'a> {
    index: &'a ProgressIndex,
    lessons: &'a [Lesson],
}

impl<'a> Rollup<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Rollup {
            index: snapshot.index(),
            lessons: snapshot.lessons(),
        }
    }

    pub fn lessons(&self) -> &'a [Lesson] {
        self.lessons
    }

    /// All-or-nothing: the lesson's xp when a passed attempt exists, else 0.
    pub fn xp_for(&self, student_id: &str, lesson_id: i64, lesson_xp: i64) -> i64 {
        match self.index.get(student_id, lesson_id) {
            Some(a) if a.passed => lesson_xp,
            _ => 0,
        }
    }

    pub fn raw_score_for(&self, student_id: &str, lesson: &Lesson) -> Option<RawScore> {
        self.index
            .get(student_id, lesson.id)
            .map(|a| RawScore {
                obtained: a.score,
                max: lesson.question_count,
                passed: a.passed,
            })
    }

    pub fn attempt_state(&self, student_id: &str, lesson: &Lesson) -> AttemptState {
        match self.raw_score_for(student_id, lesson) {
            None => AttemptState::NoAttempt,
            Some(RawScore {
                obtained,
                max,
                passed: false,
            }) => AttemptState::Failed { obtained, max },
            Some(RawScore {
                obtained,
                max,
                passed: true,
            }) => AttemptState::Passed {
                xp: lesson.xp,
                obtained,
                max,
            },
        }
    }

    /// Saturates rather than overflowing on out-of-range stored values.
    pub fn total_xp(&self, student_id: &str) -> i64 {
        self.lessons
            .iter()
            .map(|l| self.xp_for(student_id, l.id, l.xp))
            .fold(0i64, i64::saturating_add)
    }

    /// The denominator counts every lesson, attempted or not.
    pub fn total_raw_score(&self, student_id: &str) -> RawTotal {
        let mut total = RawTotal::default();
        for lesson in self.lessons {
            total.max = total.max.saturating_add(lesson.question_count);
            if let Some(score) = self
                .index
                .get(student_id, lesson.id)
                .and_then(|a| a.score)
            {
                total.obtained = total.obtained.saturating_add(score);
            }
        }
        total
    }

    pub fn pass_count(&self, student_id: &str) -> usize {
        self.lessons
            .iter()
            .filter(|l| {
                self.index
                    .get(student_id, l.id)
                    .map(|a| a.passed)
                    .unwrap_or(false)
            })
            .count()
    }

    pub fn student_rollup(&self, student_id: &str) -> StudentRollup {
        StudentRollup {
            student_id: student_id.to_string(),
            total_xp: self.total_xp(student_id),
            raw_total: self.total_raw_score(student_id),
            pass_count: self.pass_count(student_id),
            lesson_count: self.lessons.len(),
            lessons: self
                .lessons
                .iter()
                .map(|l| LessonResult {
                    lesson_id: l.id,
                    lesson_xp: l.xp,
                    state: self.attempt_state(student_id, l),
                })
                .collect(),
        }
    }
}
