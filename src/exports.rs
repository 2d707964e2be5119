//! CSV exports of the report tables and dated file naming.

use crate::error::RegistrarError;
use crate::reports;
use crate::sheet;
use crate::students::StudentFilters;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Keeps `[A-Za-z0-9_-]`, folding everything else to `-`.
pub fn sanitize_component(s: &str) -> String {
    let mapped: String = s
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
        .collect();
    let mut out = String::with_capacity(mapped.len());
    for c in mapped.chars() {
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    let out = out.trim_matches('-').to_string();
    if out.is_empty() {
        "untitled".to_string()
    } else {
        out
    }
}

pub fn dated_filename(stem: &str, today: NaiveDate) -> String {
    format!("{}-{}.csv", stem, today.format("%Y-%m-%d"))
}

/// `SF9-<lrn>-YYYYMMDD.pdf` style names for rendered school forms.
pub fn document_filename(form: &str, lrn: &str, today: NaiveDate) -> String {
    format!("{}-{}-{}.pdf", form, sanitize_component(lrn), today.format("%Y%m%d"))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub path: PathBuf,
    pub rows: usize,
}

fn write(out_dir: &Path, filename: String, headers: &[&str], rows: Vec<Vec<String>>) -> Result<ExportResult, RegistrarError> {
    let path = out_dir.join(filename);
    sheet::write_csv(&path, headers, &rows).map_err(|e| RegistrarError::Io(format!("{e:#}")))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "export written");
    Ok(ExportResult {
        path,
        rows: rows.len(),
    })
}

pub fn enrollment_summary(
    conn: &Connection,
    semester_id: &str,
    out_dir: &Path,
    today: NaiveDate,
) -> Result<ExportResult, RegistrarError> {
    let summary = reports::enrollment_summary(conn, semester_id)?;
    let (headers, rows) = summary.table();
    write(out_dir, dated_filename("enrollment-summary", today), &headers, rows)
}

pub fn class_list(
    conn: &Connection,
    section_id: &str,
    out_dir: &Path,
    today: NaiveDate,
) -> Result<ExportResult, RegistrarError> {
    let list = reports::class_list(conn, section_id)?;
    let (headers, rows) = list.table();
    let stem = format!("class-list-{}", sanitize_component(&list.header.section));
    write(out_dir, dated_filename(&stem, today), &headers, rows)
}

pub fn masterlist(
    conn: &Connection,
    filters: &StudentFilters,
    out_dir: &Path,
    today: NaiveDate,
) -> Result<ExportResult, RegistrarError> {
    let rows = reports::masterlist_all(conn, filters)?;
    write(
        out_dir,
        dated_filename("student-masterlist", today),
        &reports::MASTERLIST_COLUMNS,
        rows,
    )
}

pub fn sf1(
    conn: &Connection,
    section_id: &str,
    out_dir: &Path,
    today: NaiveDate,
) -> Result<ExportResult, RegistrarError> {
    let report = reports::sf1(conn, section_id)?;
    let (headers, rows) = report.table();
    let stem = format!("SF1-{}", sanitize_component(&report.header.section));
    write(out_dir, dated_filename(&stem, today), &headers, rows)
}

pub fn sf5(
    conn: &Connection,
    section_id: &str,
    out_dir: &Path,
    today: NaiveDate,
) -> Result<ExportResult, RegistrarError> {
    let report = reports::sf5(conn, section_id)?;
    let (headers, rows) = report.table();
    let headers: Vec<&str> = headers.iter().map(|h| h.as_str()).collect();
    let stem = format!("SF5-{}", sanitize_component(&report.header.section));
    write(out_dir, dated_filename(&stem, today), &headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 3).expect("date")
    }

    #[test]
    fn filenames_embed_entity_and_date() {
        assert_eq!(dated_filename("enrollment-summary", day()), "enrollment-summary-2026-06-03.csv");
        assert_eq!(
            dated_filename(&format!("class-list-{}", sanitize_component("STEM 11 / A")), day()),
            "class-list-STEM-11-A-2026-06-03.csv"
        );
        assert_eq!(document_filename("SF10", "123456789012", day()), "SF10-123456789012-20260603.pdf");
    }

    #[test]
    fn sanitize_never_returns_empty() {
        assert_eq!(sanitize_component("  //  "), "untitled");
        assert_eq!(sanitize_component("Rizal_1"), "Rizal_1");
    }
}
