use crate::collate::Collator;
use crate::rollup::{AttemptState, Rollup};
use crate::settings::DisplaySettings;
use crate::snapshot::{Lesson, Snapshot, Student};
use crate::view::{filter_and_sort, FilterState};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub const KEY_NAME: &str = "name";
pub const KEY_USERNAME: &str = "username";
pub const KEY_GRADE: &str = "grade";
pub const KEY_TOTAL_SCORE: &str = "totalScore";
pub const KEY_TOTAL_XP: &str = "totalXp";
pub const KEY_PASSED: &str = "passed";

/// Columns of the report export, in order.
pub const REPORT_KEYS: [&str; 5] = [KEY_NAME, KEY_GRADE, KEY_TOTAL_SCORE, KEY_TOTAL_XP, KEY_PASSED];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub key: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesson_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xp: Option<i64>,
}

impl Column {
    fn fixed(key: &str, label: &str) -> Self {
        Column {
            key: key.to_string(),
            label: label.to_string(),
            lesson_id: None,
            xp: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub student_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub cells: Vec<Cell>,
    /// One entry per lesson column, for badge rendering.
    pub lesson_states: Vec<AttemptState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowTable {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl RowTable {
    pub fn column_index(&self, key: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.key == key)
    }

    /// Hex SHA-256 of the serialized table.
    pub fn digest(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        Sha256::digest(&bytes)
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Narrow projection for the report export, taken column-by-key from this table.
    pub fn report_table(&self) -> ReportTable {
        let picks: Vec<usize> = REPORT_KEYS
            .iter()
            .filter_map(|k| self.column_index(k))
            .collect();
        ReportTable {
            columns: picks
                .iter()
                .map(|&i| self.columns[i].label.clone())
                .collect(),
            rows: self
                .rows
                .iter()
                .map(|r| picks.iter().map(|&i| r.cells[i].clone()).collect())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// Column descriptor for the current lesson list. Lesson headers follow list position.
pub fn columns_for(lessons: &[Lesson], display: &DisplaySettings) -> Vec<Column> {
    let mut columns = vec![
        Column::fixed(KEY_NAME, "Name"),
        Column::fixed(KEY_USERNAME, "Username"),
        Column::fixed(KEY_GRADE, "Grade"),
    ];
    columns.extend(lessons.iter().enumerate().map(|(i, l)| Column {
        key: format!("lesson:{}", l.id),
        label: format!("{} {}", display.lesson_label, i + 1),
        lesson_id: Some(l.id),
        xp: Some(l.xp),
    }));
    columns.push(Column::fixed(KEY_TOTAL_SCORE, "Total Score"));
    columns.push(Column::fixed(KEY_TOTAL_XP, "Total XP"));
    columns.push(Column::fixed(KEY_PASSED, "Passed"));
    columns
}

fn score_text(obtained: Option<i64>, max: i64, display: &DisplaySettings) -> String {
    match obtained {
        Some(v) => format!("{}/{}", v, max),
        None => format!("{}/{}", display.missing_text, max),
    }
}

pub fn lesson_cell_text(state: &AttemptState, display: &DisplaySettings) -> String {
    match *state {
        AttemptState::NoAttempt => display.no_attempt_text.clone(),
        AttemptState::Failed { obtained, max } => format!(
            "{} ({})",
            display.failed_label,
            score_text(obtained, max, display)
        ),
        AttemptState::Passed { xp, obtained, max } => {
            format!("{} XP ({})", xp, score_text(obtained, max, display))
        }
    }
}

fn build_row(rollup: &Rollup<'_>, student: &Student, display: &DisplaySettings) -> Row {
    let lessons = rollup.lessons();
    let states: Vec<AttemptState> = lessons
        .iter()
        .map(|l| rollup.attempt_state(&student.id, l))
        .collect();
    let raw = rollup.total_raw_score(&student.id);

    let mut cells = Vec::with_capacity(lessons.len() + 6);
    cells.push(Cell::Text(student.fullname.clone()));
    cells.push(Cell::Text(student.username.clone()));
    cells.push(Cell::Text(
        student
            .grade()
            .map(str::to_string)
            .unwrap_or_else(|| display.missing_text.clone()),
    ));
    cells.extend(
        states
            .iter()
            .map(|s| Cell::Text(lesson_cell_text(s, display))),
    );
    cells.push(Cell::Text(format!("{}/{}", raw.obtained, raw.max)));
    cells.push(Cell::Number(rollup.total_xp(&student.id)));
    cells.push(Cell::Text(format!(
        "{}/{}",
        rollup.pass_count(&student.id),
        lessons.len()
    )));

    Row {
        student_id: student.id.clone(),
        avatar: student.avatar().map(str::to_string),
        cells,
        lesson_states: states,
    }
}

/// The single projection feeding the on-screen table, the spreadsheet and the report.
pub fn build_row_table(
    snapshot: &Snapshot,
    filter: &FilterState,
    display: &DisplaySettings,
) -> RowTable {
    let collator = Collator::for_locale(&display.locale);
    let rollup = Rollup::new(snapshot);
    let students = filter_and_sort(snapshot.students(), filter, &collator);
    RowTable {
        columns: columns_for(snapshot.lessons(), display),
        rows: students
            .into_iter()
            .map(|s| build_row(&rollup, s, display))
            .collect(),
    }
}
