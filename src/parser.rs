//! Turns raw model output into [`ExtractionRecord`]s.
//!
//! The model is asked for a bare JSON array but routinely wraps it in a
//! markdown fence, emits Python-literal dicts, or surrounds it with prose.
//! Parsing therefore walks a fixed ladder of strategies:
//!
//! 1. strict JSON on the fence-stripped text,
//! 2. a permissive literal pass (single quotes, `True`/`False`/`None`,
//!    trailing commas) followed by strict JSON,
//! 3. the first balanced `[...]` (or `{...}`) substring, strict then
//!    permissive.
//!
//! A strategy only succeeds if its value can be viewed as a table.

use log::debug;
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::schema::{CellValue, ExtractionRecord};

const STRATEGY_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    Strict,
    Literal,
    Bracketed,
}

/// Parses a model response for `requested_year`.
///
/// Scalar values and values without an explicit period are attributed to
/// `requested_year`.
pub fn parse_response(
    raw: &str,
    requested_year: &str,
) -> Result<Vec<ExtractionRecord>, ParseError> {
    let (rows, strategy) = parse_table(raw)?;
    let records = records_from_rows(&rows, requested_year);
    debug!(
        "Parsed {} records from {} rows using {:?} strategy",
        records.len(),
        rows.len(),
        strategy
    );
    Ok(records)
}

/// Runs the strategy ladder and returns the tabular rows it produced.
pub fn parse_table(raw: &str) -> Result<(Vec<Map<String, Value>>, ParseStrategy), ParseError> {
    let cleaned = strip_code_fence(raw);
    let mut reasons = Vec::with_capacity(STRATEGY_COUNT);

    match serde_json::from_str::<Value>(cleaned).map(tabulate) {
        Ok(Some(rows)) => return Ok((rows, ParseStrategy::Strict)),
        Ok(None) => reasons.push("strict JSON is not a table".to_string()),
        Err(e) => reasons.push(format!("strict JSON: {}", e)),
    }

    match serde_json::from_str::<Value>(&literal_to_json(cleaned)).map(tabulate) {
        Ok(Some(rows)) => return Ok((rows, ParseStrategy::Literal)),
        Ok(None) => reasons.push("literal structure is not a table".to_string()),
        Err(e) => reasons.push(format!("literal structure: {}", e)),
    }

    let mut fragments = balanced_fragments(cleaned, '[', ']')
        .chain(balanced_fragments(cleaned, '{', '}'))
        .peekable();
    if fragments.peek().is_none() {
        reasons.push("no bracketed fragment found".to_string());
    }
    for fragment in fragments {
        let parsed = serde_json::from_str::<Value>(fragment)
            .or_else(|_| serde_json::from_str::<Value>(&literal_to_json(fragment)));
        match parsed.map(tabulate) {
            Ok(Some(rows)) => return Ok((rows, ParseStrategy::Bracketed)),
            Ok(None) => reasons.push(format!(
                "bracketed fragment {} is not a table",
                preview(fragment)
            )),
            Err(e) => reasons.push(format!("bracketed fragment {}: {}", preview(fragment), e)),
        }
    }

    Err(ParseError {
        attempts: STRATEGY_COUNT,
        reason: reasons.join("; "),
        payload: cleaned.to_string(),
    })
}

/// Removes a leading ```` ``` ```` / ```` ```json ```` marker and a trailing
/// ```` ``` ````.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let rest = match rest.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
            _ => rest,
        };
        text = rest.trim_start();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim_end();
    }
    text
}

/// Rewrites Python-literal syntax into JSON.
///
/// Handles single-quoted strings, `True`/`False`/`None`, `nan`, and trailing
/// commas before a closing bracket. Double-quoted strings pass through.
pub fn literal_to_json(src: &str) -> String {
    let mut out = String::with_capacity(src.len() + 8);
    let mut chars = src.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                out.push('"');
                while let Some(d) = chars.next() {
                    out.push(d);
                    if d == '\\' {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                    } else if d == '"' {
                        break;
                    }
                }
            }
            '\'' => {
                out.push('"');
                while let Some(d) = chars.next() {
                    match d {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(escaped) => {
                                out.push('\\');
                                out.push(escaped);
                            }
                            None => out.push_str("\\\\"),
                        },
                        '"' => out.push_str("\\\""),
                        '\'' => break,
                        other => out.push(other),
                    }
                }
                out.push('"');
            }
            ']' | '}' => {
                let trimmed_len = out.trim_end().len();
                if out[..trimmed_len].ends_with(',') {
                    out.truncate(trimmed_len - 1);
                }
                out.push(c);
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match word.as_str() {
                    "True" => out.push_str("true"),
                    "False" => out.push_str("false"),
                    "None" | "nan" | "NaN" => out.push_str("null"),
                    _ => out.push_str(&word),
                }
            }
            other => out.push(other),
        }
    }

    out
}

/// Finds the first `open ... close` span with balanced nesting, skipping
/// brackets inside quoted strings.
pub fn first_balanced(text: &str, open: char, close: char) -> Option<&str> {
    balanced_at(text, text.find(open)?, open, close)
}

/// Every balanced `open ... close` span, one per occurrence of `open`, in
/// text order. Prose such as `note [4]` ahead of the real payload yields its
/// own span first.
fn balanced_fragments(text: &str, open: char, close: char) -> impl Iterator<Item = &str> {
    text.match_indices(open)
        .filter_map(move |(start, _)| balanced_at(text, start, open, close))
}

fn preview(fragment: &str) -> String {
    const LIMIT: usize = 40;
    match fragment.char_indices().nth(LIMIT) {
        Some((end, _)) => format!("{}...", &fragment[..end]),
        None => fragment.to_string(),
    }
}

fn balanced_at(text: &str, start: usize, open: char, close: char) -> Option<&str> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Views a parsed value as rows of a table.
///
/// - an array of objects is a list of rows,
/// - an object whose values are equal-length arrays is a columnar table,
/// - an object wrapping a single array of objects is unwrapped,
/// - any other object is a single row.
fn tabulate(value: Value) -> Option<Vec<Map<String, Value>>> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Some(Vec::new());
            }
            let rows: Vec<Map<String, Value>> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect();
            if rows.is_empty() {
                None
            } else {
                Some(rows)
            }
        }
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::Array(items)) = map.values().next() {
                    if !items.is_empty() && items.iter().all(Value::is_object) {
                        let inner = map.into_iter().next().map(|(_, v)| v)?;
                        return tabulate(inner);
                    }
                }
            }
            if let Some(rows) = columnar_rows(&map) {
                return Some(rows);
            }
            Some(vec![map])
        }
        _ => None,
    }
}

fn columnar_rows(map: &Map<String, Value>) -> Option<Vec<Map<String, Value>>> {
    let mut height = None;
    for value in map.values() {
        let len = value.as_array()?.len();
        match height {
            None => height = Some(len),
            Some(h) if h != len => return None,
            _ => {}
        }
    }
    let height = height?;

    let rows = (0..height)
        .map(|i| {
            map.iter()
                .map(|(column, values)| (column.clone(), values[i].clone()))
                .collect()
        })
        .collect();
    Some(rows)
}

fn column_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Ordered union of the keys across all rows.
fn columns(rows: &[Map<String, Value>]) -> Vec<String> {
    let mut seen = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !seen.contains(key) {
                seen.push(key.clone());
            }
        }
    }
    seen
}

fn find_column<'a>(columns: &'a [String], wanted: &[&str]) -> Option<&'a str> {
    columns
        .iter()
        .find(|c| wanted.contains(&column_key(c).as_str()))
        .map(String::as_str)
}

fn label_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(_) => CellValue::from_json(value).map(|cell| cell.to_string()),
        _ => None,
    }
}

fn records_from_rows(rows: &[Map<String, Value>], requested_year: &str) -> Vec<ExtractionRecord> {
    let columns = columns(rows);

    if let (Some(item_col), Some(value_col)) = (
        find_column(&columns, &["lineitem"]),
        find_column(&columns, &["values", "value"]),
    ) {
        return keyed_records(rows, item_col, value_col, None, requested_year);
    }

    if let (Some(item_col), Some(value_col)) = (
        find_column(&columns, &["item"]),
        find_column(&columns, &["value"]),
    ) {
        let period_col = find_column(&columns, &["period", "year"]);
        return keyed_records(rows, item_col, value_col, period_col, requested_year);
    }

    debug!(
        "No line-item columns in response (columns: {:?}); treating columns as line items",
        columns
    );
    column_records(rows, &columns, requested_year)
}

fn keyed_records(
    rows: &[Map<String, Value>],
    item_col: &str,
    value_col: &str,
    period_col: Option<&str>,
    requested_year: &str,
) -> Vec<ExtractionRecord> {
    let mut records = Vec::new();

    for row in rows {
        let Some(item) = row.get(item_col).and_then(label_of) else {
            continue;
        };
        let period = period_col
            .and_then(|col| row.get(col))
            .and_then(label_of)
            .unwrap_or_else(|| requested_year.to_string());

        match row.get(value_col) {
            Some(Value::Object(per_year)) => {
                for (year, value) in per_year {
                    if let Some(cell) = CellValue::from_json(value) {
                        records.push(ExtractionRecord::new(item.clone(), year.trim(), cell));
                    }
                }
            }
            value => match value.map_or(Some(CellValue::Empty), CellValue::from_json) {
                Some(cell) => records.push(ExtractionRecord::new(item, period, cell)),
                None => debug!("Skipping non-scalar value for line item '{}'", item),
            },
        }
    }

    records
}

fn first_scalar(value: &Value) -> Option<CellValue> {
    match value {
        Value::Object(map) => map.values().find_map(first_scalar),
        Value::Array(items) => items.iter().find_map(first_scalar),
        other => CellValue::from_json(other).filter(|cell| !cell.is_empty()),
    }
}

fn column_records(
    rows: &[Map<String, Value>],
    columns: &[String],
    requested_year: &str,
) -> Vec<ExtractionRecord> {
    columns
        .iter()
        .filter(|column| !column.trim().is_empty())
        .filter_map(|column| {
            rows.iter()
                .filter_map(|row| row.get(column))
                .find_map(first_scalar)
                .map(|cell| ExtractionRecord::new(column.trim(), requested_year, cell))
        })
        .collect()
}
