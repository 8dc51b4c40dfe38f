// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! CSV power traces
//!
//! Handles the household-dataset layout: a timestamp column plus one column
//! per appliance, optionally renamed through a mapping such as
//! `Appliance1 -> Fridge`. Empty power cells read as zero.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::core::{PowerState, Sample};
use crate::error::{CycleError, Result};

/// Column label written by offline classification runs
pub const DEFAULT_LABEL_COLUMN: &str = "Power Cycle";

/// Which columns of a trace to read
#[derive(Debug, Clone, PartialEq)]
pub struct CsvLayout {
    pub timestamp_column: String,
    pub power_column: String,
    pub label_column: Option<String>,
    /// Raw header name -> appliance name, applied before column lookup
    pub mapping: BTreeMap<String, String>,
}

impl CsvLayout {
    pub fn new(timestamp_column: &str, power_column: &str) -> Self {
        Self {
            timestamp_column: timestamp_column.to_string(),
            power_column: power_column.to_string(),
            label_column: None,
            mapping: BTreeMap::new(),
        }
    }

    pub fn with_mapping(mut self, mapping: BTreeMap<String, String>) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn with_label_column(mut self, column: &str) -> Self {
        self.label_column = Some(column.to_string());
        self
    }
}

/// One parsed row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CsvRow {
    pub sample: Sample,
    pub label: Option<PowerState>,
}

/// Parse a whole trace held in memory
pub fn parse_csv(text: &str, layout: &CsvLayout) -> Result<Vec<CsvRow>> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines
        .next()
        .ok_or_else(|| CycleError::Ingestion("empty CSV: no header".into()))?;
    let columns: Vec<String> = split_fields(header)
        .into_iter()
        .map(|name| layout.mapping.get(&name).cloned().unwrap_or(name))
        .collect();

    let find = |name: &str| -> Result<usize> {
        columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| CycleError::Ingestion(format!("missing column '{}' in {:?}", name, columns)))
    };
    let ts_idx = find(&layout.timestamp_column)?;
    let power_idx = find(&layout.power_column)?;
    let label_idx = layout.label_column.as_deref().map(find).transpose()?;

    let mut rows = Vec::new();
    for (line_no, line) in lines {
        let fields = split_fields(line);
        let field = |idx: usize| fields.get(idx).map(String::as_str).unwrap_or("");

        let timestamp = parse_timestamp(field(ts_idx)).ok_or_else(|| {
            CycleError::Ingestion(format!("line {}: bad timestamp '{}'", line_no + 1, field(ts_idx)))
        })?;

        let raw_power = field(power_idx);
        let power = if raw_power.is_empty() || raw_power.eq_ignore_ascii_case("nan") {
            0.0
        } else {
            raw_power.parse::<f64>().map_err(|_| {
                CycleError::Ingestion(format!("line {}: bad power value '{}'", line_no + 1, raw_power))
            })?
        };
        if !power.is_finite() {
            return Err(CycleError::Ingestion(format!("line {}: non-finite power", line_no + 1)));
        }

        let label = match label_idx {
            Some(idx) => Some(PowerState::parse(field(idx)).ok_or_else(|| {
                CycleError::Ingestion(format!("line {}: bad label '{}'", line_no + 1, field(idx)))
            })?),
            None => None,
        };

        rows.push(CsvRow {
            sample: Sample::new(timestamp, power),
            label,
        });
    }

    Ok(rows)
}

/// Read and parse a trace file
pub fn read_csv(path: &Path, layout: &CsvLayout) -> Result<Vec<CsvRow>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CycleError::Ingestion(format!("reading {}: {}", path.display(), e)))?;
    parse_csv(&text, layout)
}

/// Power values of a trace, in file order
pub fn powers(rows: &[CsvRow]) -> Vec<f64> {
    rows.iter().map(|r| r.sample.power).collect()
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` (taken as UTC) and Unix seconds.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    let seconds: f64 = text.parse().ok()?;
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    Utc.timestamp_opt(whole as i64, nanos.min(999_999_999)).single()
}

/// Split one record on commas outside double quotes; `""` inside quotes is a literal quote.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field).trim().to_string()),
            _ => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = "\
Time,Unix,Aggregate,Appliance1,Appliance2
2013-10-09 13:06:17,1381323977,523,74,0
2013-10-09 13:06:31,1381323991,526,,0
2013-10-09 13:06:46,1381324006,540,76,0
";

    fn layout() -> CsvLayout {
        let mut mapping = BTreeMap::new();
        mapping.insert("Appliance1".to_string(), "Fridge".to_string());
        mapping.insert("Appliance2".to_string(), "Chest Freezer".to_string());
        CsvLayout::new("Time", "Fridge").with_mapping(mapping)
    }

    #[test]
    fn test_parse_mapped_column() {
        let rows = parse_csv(TRACE, &layout()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(powers(&rows), vec![74.0, 0.0, 76.0]);
        assert_eq!(rows[0].sample.timestamp, Utc.timestamp_opt(1381323977, 0).unwrap());
        assert!(rows[0].label.is_none());
    }

    #[test]
    fn test_unix_timestamp_column() {
        let layout = CsvLayout::new("Unix", "Aggregate");
        let rows = parse_csv(TRACE, &layout).unwrap();
        assert_eq!(rows[2].sample.timestamp, Utc.timestamp_opt(1381324006, 0).unwrap());
        assert_eq!(rows[2].sample.power, 540.0);
    }

    #[test]
    fn test_label_column() {
        let text = "Time,Fridge,Power Cycle\n2024-01-01T00:00:00Z,90,ON\n2024-01-01T00:00:10Z,1,0\n";
        let layout = CsvLayout::new("Time", "Fridge").with_label_column(DEFAULT_LABEL_COLUMN);
        let rows = parse_csv(text, &layout).unwrap();
        assert_eq!(rows[0].label, Some(PowerState::On));
        assert_eq!(rows[1].label, Some(PowerState::Off));
    }

    #[test]
    fn test_missing_column() {
        let layout = CsvLayout::new("Time", "Dishwasher");
        assert!(matches!(parse_csv(TRACE, &layout), Err(CycleError::Ingestion(_))));
    }

    #[test]
    fn test_malformed_power() {
        let text = "Time,Fridge\n2024-01-01 00:00:00,abc\n";
        let err = parse_csv(text, &CsvLayout::new("Time", "Fridge")).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_quoted_fields_with_commas() {
        let text = "\"Time\",\"Chest, Freezer\",Fridge\n\"2024-01-01 00:00:00\",\"12\",88\n";
        let layout = CsvLayout::new("Time", "Fridge");
        let rows = parse_csv(text, &layout).unwrap();
        assert_eq!(powers(&rows), vec![88.0]);

        let layout = CsvLayout::new("Time", "Chest, Freezer");
        assert_eq!(powers(&parse_csv(text, &layout).unwrap()), vec![12.0]);
    }

    #[test]
    fn test_split_fields() {
        assert_eq!(split_fields(" a , \"b,c\" ,"), vec!["a", "b,c", ""]);
        assert_eq!(split_fields("\"say \"\"hi\"\"\",x"), vec!["say \"hi\"", "x"]);
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T13:30:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("1709296200"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }
}
