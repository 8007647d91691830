use crate::db;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Display,
    Exports,
}

impl SetupSection {
    pub const ALL: [SetupSection; 2] = [SetupSection::Display, SetupSection::Exports];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "display" => Some(Self::Display),
            "exports" => Some(Self::Exports),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Display => "display",
            Self::Exports => "exports",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Display => "setup.display",
            Self::Exports => "setup.exports",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySettings {
    pub locale: String,
    pub lesson_label: String,
    pub failed_label: String,
    pub no_attempt_text: String,
    pub missing_text: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        DisplaySettings {
            locale: "th".to_string(),
            lesson_label: "Lesson".to_string(),
            failed_label: "failed".to_string(),
            no_attempt_text: "\u{2014}".to_string(),
            missing_text: "-".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    pub spreadsheet_file_name: String,
    pub sheet_name: String,
    pub report_title: String,
    pub report_file_name: String,
    pub report_font_path: Option<String>,
    pub show_generated_at: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        ExportSettings {
            spreadsheet_file_name: "Student_Scores_Full.xlsx".to_string(),
            sheet_name: "Scores".to_string(),
            report_title: "Student Score Report".to_string(),
            report_file_name: "Student_Scores.pdf".to_string(),
            report_font_path: None,
            show_generated_at: true,
        }
    }
}

pub fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Display => {
            let d = DisplaySettings::default();
            json!({
                "locale": d.locale,
                "lessonLabel": d.lesson_label,
                "failedLabel": d.failed_label,
                "noAttemptText": d.no_attempt_text,
                "missingText": d.missing_text
            })
        }
        SetupSection::Exports => {
            let d = ExportSettings::default();
            json!({
                "spreadsheetFileName": d.spreadsheet_file_name,
                "sheetName": d.sheet_name,
                "reportTitle": d.report_title,
                "reportFileName": d.report_file_name,
                "reportFontPath": d.report_font_path,
                "showGeneratedAt": d.show_generated_at
            })
        }
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_non_empty(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = parse_string_max(v, key, max_len)?;
    if s.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    Ok(s)
}

fn parse_file_name(v: &Value, key: &str, ext: &str) -> Result<String, String> {
    let s = parse_non_empty(v, key, 120)?;
    if s.contains(['/', '\\']) {
        return Err(format!("{} must be a file name, not a path", key));
    }
    if !s.to_ascii_lowercase().ends_with(ext) {
        return Err(format!("{} must end with {}", key, ext));
    }
    Ok(s)
}

pub fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Display => match k.as_str() {
                "locale" => {
                    let s = parse_non_empty(v, k, 16)?;
                    if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                        return Err("locale must be a BCP 47 style tag".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "lessonLabel" | "failedLabel" => {
                    obj.insert(k.clone(), Value::String(parse_non_empty(v, k, 32)?));
                }
                "noAttemptText" | "missingText" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 8)?));
                }
                _ => return Err(format!("unknown display field: {}", k)),
            },
            SetupSection::Exports => match k.as_str() {
                "spreadsheetFileName" => {
                    obj.insert(k.clone(), Value::String(parse_file_name(v, k, ".xlsx")?));
                }
                "reportFileName" => {
                    obj.insert(k.clone(), Value::String(parse_file_name(v, k, ".pdf")?));
                }
                "sheetName" => {
                    let s = parse_non_empty(v, k, 31)?;
                    if s.contains(['[', ']', ':', '*', '?', '/', '\\']) {
                        return Err("sheetName contains a character not allowed in sheet names".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "reportTitle" => {
                    obj.insert(k.clone(), Value::String(parse_non_empty(v, k, 120)?));
                }
                "reportFontPath" => {
                    if v.is_null() {
                        obj.insert(k.clone(), Value::Null);
                    } else {
                        obj.insert(k.clone(), Value::String(parse_non_empty(v, k, 400)?));
                    }
                }
                "showGeneratedAt" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown exports field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults field by field.
            for (k, v) in saved_obj {
                let mut one = Map::new();
                one.insert(k.clone(), v.clone());
                if let Err(msg) = merge_section_patch(section, &mut current, &one) {
                    log::warn!("ignoring saved {} setting {}: {}", section.name(), k, msg);
                }
            }
        }
    }
    Ok(current)
}

pub fn save_section(conn: &Connection, section: SetupSection, value: &Value) -> anyhow::Result<()> {
    db::settings_set_json(conn, section.key(), value)
}

pub fn display_settings(conn: &Connection) -> anyhow::Result<DisplaySettings> {
    let v = load_section(conn, SetupSection::Display)?;
    Ok(serde_json::from_value(v)?)
}

pub fn export_settings(conn: &Connection) -> anyhow::Result<ExportSettings> {
    let v = load_section(conn, SetupSection::Exports)?;
    Ok(serde_json::from_value(v)?)
}
