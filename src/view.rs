use crate::collate::{CollationKey, Collator};
use crate::snapshot::Student;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize)]
pub struct ViewError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ViewError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GradeSelector {
    #[default]
    All,
    Only(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    pub query: String,
    pub grade: GradeSelector,
}

pub fn parse_filter_state(raw: Option<&serde_json::Value>) -> Result<FilterState, ViewError> {
    let Some(raw) = raw else {
        return Ok(FilterState::default());
    };
    if raw.is_null() {
        return Ok(FilterState::default());
    }
    let Some(obj) = raw.as_object() else {
        return Err(ViewError::new("bad_params", "filters must be an object"));
    };

    let query = match obj.get("query") {
        None => String::new(),
        Some(v) if v.is_null() => String::new(),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(ViewError::new(
                    "bad_params",
                    "filters.query must be string or null",
                ));
            };
            s.to_string()
        }
    };

    let grade = match obj.get("grade") {
        None => GradeSelector::All,
        Some(v) if v.is_null() => GradeSelector::All,
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(ViewError::new(
                    "bad_params",
                    "filters.grade must be string, 'all', or null",
                ));
            };
            if s == "all" {
                GradeSelector::All
            } else {
                GradeSelector::Only(s.to_string())
            }
        }
    };

    Ok(FilterState { query, grade })
}

/// Leading-integer parse of a username: optional whitespace and sign, then digits.
/// A `0x`/`0X` prefix reads the digits as hexadecimal. Anything without a leading
/// digit run yields 0.
pub fn numeric_code(username: &str) -> i64 {
    let s = username.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let (radix, digits) = match rest.get(..2) {
        Some("0x") | Some("0X") => (16, &rest[2..]),
        _ => (10, rest),
    };
    let mut value: i64 = 0;
    for d in digits.chars().map_while(|c| c.to_digit(radix)) {
        value = value
            .saturating_mul(i64::from(radix))
            .saturating_add(i64::from(d));
    }
    if negative {
        -value
    } else {
        value
    }
}

fn matches_query(student: &Student, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    student.fullname.to_lowercase().contains(needle)
        || student.username.to_lowercase().contains(needle)
}

fn matches_grade(student: &Student, grade: &GradeSelector) -> bool {
    match grade {
        GradeSelector::All => true,
        GradeSelector::Only(g) => student.grade_level.as_deref() == Some(g.as_str()),
    }
}

/// Coded students (nonzero numeric username) order numerically ahead of the rest;
/// the rest order by collated full name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Coded(i64),
    Named(CollationKey),
}

fn sort_key(student: &Student, collator: &Collator) -> SortKey {
    match numeric_code(&student.username) {
        0 => SortKey::Named(collator.key(&student.fullname)),
        code => SortKey::Coded(code),
    }
}

/// Filter in load order; sort only when a specific grade is selected.
pub fn filter_and_sort<'a>(
    students: &'a [Student],
    filter: &FilterState,
    collator: &Collator,
) -> Vec<&'a Student> {
    let needle = filter.query.to_lowercase();
    let matched = students
        .iter()
        .filter(|s| matches_query(s, &needle) && matches_grade(s, &filter.grade));

    if filter.grade == GradeSelector::All {
        return matched.collect();
    }

    let mut keyed: Vec<(SortKey, &Student)> =
        matched.map(|s| (sort_key(s, collator), s)).collect();
    // Stable: equal keys keep load order.
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, s)| s).collect()
}

/// Distinct non-empty grade levels, ascending.
pub fn grade_levels(students: &[Student]) -> Vec<String> {
    students
        .iter()
        .filter_map(|s| s.grade())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn student(id: &str, username: &str, fullname: &str, grade: Option<&str>) -> Student {
        Student {
            id: id.to_string(),
            username: username.to_string(),
            fullname: fullname.to_string(),
            grade_level: grade.map(str::to_string),
            image: None,
        }
    }

    fn ids(list: &[&Student]) -> Vec<String> {
        list.iter().map(|s| s.id.clone()).collect()
    }

    fn only(grade: &str) -> FilterState {
        FilterState {
            query: String::new(),
            grade: GradeSelector::Only(grade.to_string()),
        }
    }

    #[test]
    fn numeric_code_follows_leading_digits() {
        assert_eq!(numeric_code("12"), 12);
        assert_eq!(numeric_code("  7"), 7);
        assert_eq!(numeric_code("42abc"), 42);
        assert_eq!(numeric_code("-3"), -3);
        assert_eq!(numeric_code("+5"), 5);
        assert_eq!(numeric_code("abc"), 0);
        assert_eq!(numeric_code(""), 0);
        assert_eq!(numeric_code("s12"), 0);
        assert_eq!(numeric_code("0x1A"), 26);
        assert_eq!(numeric_code("0Xff"), 255);
        assert_eq!(numeric_code("-0x10"), -16);
        assert_eq!(numeric_code("0x"), 0);
        assert_eq!(numeric_code("0xg"), 0);
    }

    #[test]
    fn empty_filter_returns_everyone_in_load_order() {
        let students = vec![
            student("a", "zed", "Zed", Some("M1")),
            student("b", "12", "Bee", None),
            student("c", "3", "Cee", Some("M2")),
        ];
        let out = filter_and_sort(&students, &FilterState::default(), &Collator::Thai);
        assert_eq!(ids(&out), vec!["a", "b", "c"]);
    }

    #[test]
    fn grade_filter_sorts_numerically_not_lexicographically() {
        let students = vec![
            student("x12", "12", "Twelve", Some("M1")),
            student("x3", "3", "Three", Some("M1")),
            student("other", "1", "One", Some("M2")),
            student("x7", "7", "Seven", Some("M1")),
        ];
        let out = filter_and_sort(&students, &only("M1"), &Collator::Thai);
        assert_eq!(ids(&out), vec!["x3", "x7", "x12"]);
    }

    #[test]
    fn uncoded_students_fall_back_to_names_after_coded_ones() {
        let students = vec![
            student("c", "carol", "Carol", Some("M1")),
            student("n5", "5", "Zulu", Some("M1")),
            student("a", "alice", "alice", Some("M1")),
            student("n2", "2", "Yankee", Some("M1")),
        ];
        let out = filter_and_sort(&students, &only("M1"), &Collator::Generic);
        assert_eq!(ids(&out), vec!["n2", "n5", "a", "c"]);
    }

    #[test]
    fn equal_keys_keep_load_order() {
        let students = vec![
            student("first", "08", "Same", Some("M1")),
            student("second", "8", "Other", Some("M1")),
            student("third", "x", "Dup", Some("M1")),
            student("fourth", "y", "Dup", Some("M1")),
        ];
        let out = filter_and_sort(&students, &only("M1"), &Collator::Thai);
        assert_eq!(ids(&out), vec!["first", "second", "third", "fourth"]);
    }

    #[test]
    fn query_matches_name_or_username_case_insensitively() {
        let students = vec![
            student("a", "S001", "Anna Lee", None),
            student("b", "s002", "Ben Ho", None),
            student("c", "t003", "Cara Sol", None),
        ];
        let f = FilterState {
            query: "s0".into(),
            grade: GradeSelector::All,
        };
        assert_eq!(ids(&filter_and_sort(&students, &f, &Collator::Thai)), vec!["a", "b"]);

        let f = FilterState {
            query: "SOL".into(),
            grade: GradeSelector::All,
        };
        assert_eq!(ids(&filter_and_sort(&students, &f, &Collator::Thai)), vec!["c"]);
    }

    #[test]
    fn grade_filter_is_exact_equality() {
        let students = vec![
            student("a", "1", "A", Some("M1")),
            student("b", "2", "B", Some("M1/2")),
            student("c", "3", "C", Some("m1")),
            student("d", "4", "D", None),
        ];
        assert_eq!(ids(&filter_and_sort(&students, &only("M1"), &Collator::Thai)), vec!["a"]);
    }

    #[test]
    fn grade_levels_are_distinct_sorted_and_non_empty() {
        let students = vec![
            student("a", "1", "A", Some("M3")),
            student("b", "2", "B", Some("M1")),
            student("c", "3", "C", Some("")),
            student("d", "4", "D", None),
            student("e", "5", "E", Some("M3")),
            student("f", "6", "F", Some("M10")),
        ];
        assert_eq!(grade_levels(&students), vec!["M1", "M10", "M3"]);
    }

    #[test]
    fn parse_filter_state_accepts_all_and_null() {
        let parsed = parse_filter_state(Some(&json!({ "query": null, "grade": "all" })))
            .expect("parse filters");
        assert_eq!(parsed, FilterState::default());

        let parsed = parse_filter_state(Some(&json!({ "query": "ann", "grade": "M2" })))
            .expect("parse filters");
        assert_eq!(parsed.query, "ann");
        assert_eq!(parsed.grade, GradeSelector::Only("M2".into()));

        let e = parse_filter_state(Some(&json!({ "grade": 3 }))).expect_err("bad grade");
        assert_eq!(e.code, "bad_params");
        assert!(parse_filter_state(None).is_ok());
    }
}
