use crate::calc::GradePolicy;
use crate::db;
use crate::error::{RegistrarError, Validator};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

pub const DEFAULT_PASSING_GRADE: f64 = 75.0;
pub const DEFAULT_MIDTERM_WEIGHT: f64 = 40.0;
pub const DEFAULT_FINALS_WEIGHT: f64 = 60.0;
pub const DEFAULT_CAPACITY: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingKind {
    Text,
    Percent,
    Capacity,
    ImportPolicy,
}

/// Allowed keys with their kind and default.
const SETTINGS: &[(&str, SettingKind, &str)] = &[
    ("school_name", SettingKind::Text, "School Name"),
    ("school_id", SettingKind::Text, ""),
    ("school_address", SettingKind::Text, ""),
    ("district", SettingKind::Text, ""),
    ("division", SettingKind::Text, ""),
    ("region", SettingKind::Text, ""),
    ("passing_grade", SettingKind::Percent, "75"),
    ("midterm_weight", SettingKind::Percent, "40"),
    ("finals_weight", SettingKind::Percent, "60"),
    ("default_capacity", SettingKind::Capacity, "50"),
    ("import_grade_policy", SettingKind::ImportPolicy, "simple_average"),
];

fn lookup(key: &str) -> Option<(SettingKind, &'static str)> {
    SETTINGS
        .iter()
        .find(|(k, _, _)| *k == key)
        .map(|(_, kind, default)| (*kind, *default))
}

/// Stored values merged over defaults, as plain strings.
pub fn all_with_defaults(conn: &Connection) -> Result<Map<String, Value>, RegistrarError> {
    let stored = db::settings_all(conn)?;
    let mut out = Map::new();
    for (key, _, default) in SETTINGS {
        let v = stored
            .get(*key)
            .cloned()
            .unwrap_or_else(|| default.to_string());
        out.insert(key.to_string(), json!(v));
    }
    Ok(out)
}

pub fn get_or_default(conn: &Connection, key: &str) -> Result<String, RegistrarError> {
    let stored = db::settings_get(conn, key)?;
    Ok(stored.unwrap_or_else(|| {
        lookup(key)
            .map(|(_, d)| d.to_string())
            .unwrap_or_default()
    }))
}

fn normalize_value(kind: SettingKind, key: &str, v: &Value, errs: &mut Validator) -> Option<String> {
    let text = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        _ => {
            errs.add(key, format!("{key} must be a string or number"));
            return None;
        }
    };
    match kind {
        SettingKind::Text => {
            if text.chars().count() > 255 {
                errs.add(key, format!("{key} may not be greater than 255 characters"));
                return None;
            }
            Some(text)
        }
        SettingKind::Percent => match text.parse::<f64>() {
            Ok(n) if (0.0..=100.0).contains(&n) => Some(text),
            _ => {
                errs.add(key, format!("{key} must be a number between 0 and 100"));
                None
            }
        },
        SettingKind::Capacity => match text.parse::<i64>() {
            Ok(n) if n >= 1 => Some(text),
            _ => {
                errs.add(key, format!("{key} must be an integer of at least 1"));
                None
            }
        },
        SettingKind::ImportPolicy => match text.as_str() {
            "simple_average" | "weighted" => Some(text),
            _ => {
                errs.add(key, format!("{key} must be one of: simple_average, weighted"));
                None
            }
        },
    }
}

/// Validates the whole patch before writing any key.
pub fn apply_patch(conn: &Connection, patch: &Map<String, Value>) -> Result<usize, RegistrarError> {
    let unknown: Vec<&String> = patch.keys().filter(|k| lookup(k).is_none()).collect();
    if !unknown.is_empty() {
        return Err(RegistrarError::BadParams(format!(
            "unknown settings keys: {}",
            unknown
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    let mut errs = Validator::new();
    let mut updates: Vec<(&str, String)> = Vec::new();
    for (key, v) in patch {
        let Some((kind, _)) = lookup(key) else {
            continue;
        };
        if let Some(value) = normalize_value(kind, key, v, &mut errs) {
            updates.push((key.as_str(), value));
        }
    }
    errs.finish()?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| RegistrarError::db("db_tx_failed", e))?;
    for (key, value) in &updates {
        db::settings_set(&tx, key, value).map_err(|e| RegistrarError::db("db_update_failed", e))?;
    }
    tx.commit()
        .map_err(|e| RegistrarError::db("db_commit_failed", e))?;
    Ok(updates.len())
}

/// Typed view of the grading keys, read fresh from the table on each call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeSettings {
    pub passing_grade: f64,
    pub midterm_weight: f64,
    pub finals_weight: f64,
    pub import_weighted: bool,
}

fn parse_number(conn: &Connection, key: &str, default: f64) -> Result<f64, RegistrarError> {
    let Some(raw) = db::settings_get(conn, key)? else {
        return Ok(default);
    };
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => {
            tracing::warn!(key, value = %raw, "unparsable numeric setting, using default");
            Ok(default)
        }
    }
}

impl GradeSettings {
    pub fn load(conn: &Connection) -> Result<Self, RegistrarError> {
        let import_weighted = matches!(
            db::settings_get(conn, "import_grade_policy")?.as_deref(),
            Some("weighted")
        );
        Ok(Self {
            passing_grade: parse_number(conn, "passing_grade", DEFAULT_PASSING_GRADE)?,
            midterm_weight: parse_number(conn, "midterm_weight", DEFAULT_MIDTERM_WEIGHT)?,
            finals_weight: parse_number(conn, "finals_weight", DEFAULT_FINALS_WEIGHT)?,
            import_weighted,
        })
    }

    /// Policy for interactive grade entry.
    pub fn entry_policy(&self) -> GradePolicy {
        GradePolicy::Weighted {
            midterm_weight: self.midterm_weight,
            finals_weight: self.finals_weight,
        }
    }

    pub fn import_policy(&self) -> GradePolicy {
        if self.import_weighted {
            self.entry_policy()
        } else {
            GradePolicy::SimpleAverage
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "passingGrade": self.passing_grade,
            "midtermWeight": self.midterm_weight,
            "finalsWeight": self.finals_weight,
            "importPolicy": self.import_policy().name(),
        })
    }
}

pub fn default_capacity(conn: &Connection) -> Result<i64, RegistrarError> {
    let raw = get_or_default(conn, "default_capacity")?;
    Ok(raw.trim().parse::<i64>().unwrap_or(DEFAULT_CAPACITY).max(1))
}

/// Header block shared by the school forms.
pub fn school_identity(conn: &Connection) -> Result<Value, RegistrarError> {
    Ok(json!({
        "schoolName": get_or_default(conn, "school_name")?,
        "schoolId": get_or_default(conn, "school_id")?,
        "schoolAddress": get_or_default(conn, "school_address")?,
        "district": get_or_default(conn, "district")?,
        "division": get_or_default(conn, "division")?,
        "region": get_or_default(conn, "region")?,
    }))
}
