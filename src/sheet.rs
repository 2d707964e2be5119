//! Tabular file I/O: spreadsheet and CSV reading, CSV writing.

use anyhow::Context;
use calamine::{open_workbook_auto, Data, DataType, Reader};
use std::collections::HashMap;
use std::path::Path;

/// One data row keyed by normalized header. `row_number` is the 1-based sheet row
/// (the header is row 1).
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub row_number: usize,
    pub cells: HashMap<String, String>,
}

impl SheetRow {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.cells
            .get(key)
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.values().all(|v| v.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<SheetRow>,
}

/// "Last Name" and "last-name" both become "last_name".
pub fn normalize_header(s: &str) -> String {
    let mut out = String::new();
    let mut pending_sep = false;
    for ch in s.trim().trim_start_matches('\u{feff}').chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(ch.to_lowercase());
        } else if ch == ' ' || ch == '-' || ch == '_' {
            pending_sep = true;
        }
    }
    out
}

pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Splits CSV text into records. Line breaks inside a quoted field belong to the field.
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut records: Vec<Vec<String>> = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut started = false;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                buf.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => record.push(std::mem::take(&mut buf)),
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => continue,
            '\n' if !in_quotes => {
                record.push(std::mem::take(&mut buf));
                records.push(std::mem::take(&mut record));
                started = false;
                continue;
            }
            _ => buf.push(ch),
        }
        started = true;
    }
    if started {
        record.push(buf);
        records.push(record);
    }
    records
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        // Whole numbers (LRNs, grades typed as 85) come back as floats.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{:.0}", f),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(_) | Data::DateTimeIso(_) => cell
            .as_date()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| cell.to_string()),
        Data::DurationIso(s) => s.clone(),
    }
}

fn build_sheet(mut records: impl Iterator<Item = Vec<String>>) -> Sheet {
    let headers: Vec<String> = records
        .next()
        .map(|h| h.iter().map(|c| normalize_header(c)).collect())
        .unwrap_or_default();
    let rows = records
        .enumerate()
        .map(|(idx, record)| {
            let mut cells = HashMap::new();
            for (i, h) in headers.iter().enumerate() {
                if h.is_empty() {
                    continue;
                }
                let v = record.get(i).map(|s| s.trim().to_string()).unwrap_or_default();
                cells.insert(h.clone(), v);
            }
            SheetRow {
                row_number: idx + 2,
                cells,
            }
        })
        .collect();
    Sheet { headers, rows }
}

/// Reads the first worksheet of an xlsx/xls/ods file, or a CSV file.
pub fn read_sheet(path: &Path) -> anyhow::Result<Sheet> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" | "txt" => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(build_sheet(parse_csv(&text).into_iter()))
        }
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => {
            let mut workbook = open_workbook_auto(path)
                .with_context(|| format!("failed to open workbook {}", path.display()))?;
            let sheet_names = workbook.sheet_names().to_owned();
            let first = sheet_names
                .first()
                .context("workbook has no worksheets")?
                .clone();
            let range = workbook
                .worksheet_range(&first)
                .with_context(|| format!("failed to read worksheet {first}"))?;
            let records = range
                .rows()
                .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
                .collect::<Vec<_>>();
            Ok(build_sheet(records.into_iter()))
        }
        other => anyhow::bail!("unsupported file type: .{other} (expected xlsx, xls, ods, or csv)"),
    }
}

/// Writes a header row plus records, creating parent directories.
pub fn write_csv(path: &Path, headers: &[&str], rows: &[Vec<String>]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut out = String::new();
    out.push_str(
        &headers
            .iter()
            .map(|h| csv_quote(h))
            .collect::<Vec<_>>()
            .join(","),
    );
    out.push('\n');
    for row in rows {
        out.push_str(
            &row.iter()
                .map(|c| csv_quote(c))
                .collect::<Vec<_>>()
                .join(","),
        );
        out.push('\n');
    }
    std::fs::write(path, out).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_normalize_to_snake_case() {
        assert_eq!(normalize_header("Last Name"), "last_name");
        assert_eq!(normalize_header(" subject-code "), "subject_code");
        assert_eq!(normalize_header("\u{feff}LRN"), "lrn");
        assert_eq!(normalize_header("Guardian  Contact"), "guardian_contact");
    }

    #[test]
    fn csv_record_handles_quotes() {
        assert_eq!(
            parse_csv(r#"a,"b, c","say ""hi""",,"#),
            vec![vec!["a", "b, c", "say \"hi\"", "", ""]]
        );
        assert_eq!(csv_quote("Dela Cruz, Juan"), "\"Dela Cruz, Juan\"");
        assert_eq!(csv_quote("plain"), "plain");
    }

    #[test]
    fn quoted_line_breaks_stay_in_one_record() {
        let text = "lrn,address\r\n100000000001,\"Block 4\nQuezon City\"\r\n\r\n100000000002,Pasig\n";
        let records = parse_csv(text);
        assert_eq!(records.len(), 4);
        assert_eq!(records[1], vec!["100000000001", "Block 4\nQuezon City"]);
        assert_eq!(records[2], vec![""]);
        assert_eq!(records[3], vec!["100000000002", "Pasig"]);

        let sheet = build_sheet(records.into_iter());
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.rows[0].get("address"), Some("Block 4\nQuezon City"));
        assert!(sheet.rows[1].is_blank());
        assert_eq!(sheet.rows[2].row_number, 4);
    }

    #[test]
    fn rows_are_numbered_from_two() {
        let sheet = build_sheet(
            vec![
                vec!["LRN".to_string(), "First Name".to_string()],
                vec!["123".to_string(), " Ana ".to_string()],
                vec!["456".to_string()],
            ]
            .into_iter(),
        );
        assert_eq!(sheet.headers, vec!["lrn", "first_name"]);
        assert_eq!(sheet.rows[0].row_number, 2);
        assert_eq!(sheet.rows[0].get("first_name"), Some("Ana"));
        assert_eq!(sheet.rows[1].row_number, 3);
        assert_eq!(sheet.rows[1].get("first_name"), None);
    }

    #[test]
    fn whole_floats_render_without_decimals() {
        assert_eq!(cell_to_string(&Data::Float(123456789012.0)), "123456789012");
        assert_eq!(cell_to_string(&Data::Float(85.5)), "85.5");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }
}
