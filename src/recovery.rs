// Error recovery: second pass over a table's rejection log. Each record is
// repaired textually, re-parsed with relaxed rules and, as a last resort,
// reduced to the few columns that can still be trusted.

use crate::error::Result;
use crate::loader::insert_rows;
use crate::normalize::{apply_relaxed, normalize, NormalizedRow};
use crate::parser::insert::StatementScanner;
use crate::parser::tuple::{count_fields, split_fields, Piece, TupleTokenizer};
use crate::rejects::{RejectedRecord, RejectionLog};
use crate::schema::TableSpec;
use crate::value::{coerce, ScalarValue};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;

static QUOTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'((?:[^'\\]|\\.)*)'").expect("valid quoted regex"));
static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{9,})\b").expect("valid identifier regex"));

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RecoveryReport {
    pub attempted: u64,
    pub recovered: u64,
    pub salvaged: u64,
    // Parsed and inserted, but a uniqueness conflict kept it out.
    pub ignored: u64,
    pub permanently_failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Recovered,
    Salvaged,
    Ignored,
    Failed(String),
}

// What one rejected record turned into once repaired and re-tokenized.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Candidates {
    // Tuple texts for this table, parens included.
    pub tuples: Vec<String>,
    // Text that cannot become a row of this table.
    pub leftover: Vec<String>,
}

// Textual repairs: collapse a run of leading parens, then give a fragment
// that lost its head the missing leading fields.
pub fn repair_text(raw: &str, arity: usize) -> String {
    let mut text = raw.trim().trim_end_matches(';').trim_end().to_string();

    if text.starts_with("((") {
        text = format!("({}", text.trim_start_matches('('));
    }

    if !text.starts_with('(') && text.ends_with(')') {
        let missing = arity.saturating_sub(count_fields(&text));
        text = format!("({}{}", "NULL, ".repeat(missing), text);
    }
    text
}

// A stray `((` keeps the tokenizer from ever closing, so a rejected record
// may carry its neighbours and even later statements. Split it back into
// single tuples; statements for other tables end up in `leftover`.
pub fn split_candidates(raw: &str, spec: &TableSpec, scanner: &StatementScanner) -> Candidates {
    let text = repair_text(raw, spec.arity());
    let mut found = Candidates::default();
    let mut tokens = TupleTokenizer::new(&text);
    collect_pieces(&mut tokens, spec.arity(), &mut found.tuples);

    let rest = &text[tokens.offset()..];
    let statements = scanner.for_each_insert(rest, |header, tokens| {
        if header.table.eq_ignore_ascii_case(spec.name) {
            collect_pieces(tokens, spec.arity(), &mut found.tuples);
        } else {
            found
                .leftover
                .extend(tokens.map(|piece| piece.text().to_string()));
        }
    });
    let rest = rest.trim().trim_matches(';').trim();
    if statements == 0 && !rest.is_empty() {
        found.leftover.push(rest.to_string());
    }
    if found.tuples.is_empty() && found.leftover.is_empty() {
        found.leftover.push(raw.to_string());
    }
    found
}

fn collect_pieces(tokens: &mut TupleTokenizer<'_>, arity: usize, out: &mut Vec<String>) {
    for piece in tokens {
        match piece {
            Piece::Tuple(inner) if inner.trim_start().starts_with('(') => {
                // Nested group: collapse and split again. Each pass drops at
                // least one paren, so this terminates.
                let repaired = repair_text(&format!("({})", inner), arity);
                let mut nested = TupleTokenizer::new(&repaired);
                collect_pieces(&mut nested, arity, out);
                let rest = repaired[nested.offset()..].trim().trim_matches(';').trim();
                if !rest.is_empty() {
                    out.push(repair_text(rest, arity));
                }
            }
            Piece::Tuple(inner) => out.push(format!("({})", inner)),
            other => out.push(repair_text(other.text(), arity)),
        }
    }
}

fn tuple_body(text: &str) -> &str {
    let body = text.strip_prefix('(').unwrap_or(text);
    body.strip_suffix(')').unwrap_or(body)
}

// One repaired tuple -> row with relaxed fixups applied.
pub fn structured_row(raw: &str, spec: &TableSpec) -> NormalizedRow {
    let text = repair_text(raw, spec.arity());
    let values: Vec<ScalarValue> = split_fields(tuple_body(&text))
        .into_iter()
        .map(coerce)
        .collect();
    let mut row = normalize(values, spec);
    apply_relaxed(&mut row, spec);
    row
}

// Keep only the first quoted string (as the key) and the first long digit
// run (as the identifier); everything else is Null or a fill default.
pub fn salvage_row(raw: &str, spec: &TableSpec) -> NormalizedRow {
    let mut row = normalize(vec![ScalarValue::Null; spec.arity()], spec);
    {
        let values = row.values_mut();
        if let Some(key_slot) = spec.salvage.key {
            if let Some(m) = QUOTED_RE.captures(raw).and_then(|c| c.get(0)) {
                values[key_slot] = coerce(m.as_str());
            }
        }
        if let Some(m) = IDENTIFIER_RE.captures(raw).and_then(|c| c.get(1)) {
            values[spec.salvage.identifier] = coerce(m.as_str());
        }
    }
    apply_relaxed(&mut row, spec);
    row
}

// Recover a single tuple text: structured parse first, salvage second.
pub fn recover_tuple(conn: &mut Connection, spec: &TableSpec, insert_sql: &str, text: &str) -> Outcome {
    let row = structured_row(text, spec);
    match insert_rows(conn, insert_sql, std::slice::from_ref(&row)) {
        Ok(inserted) if inserted[0] => return Outcome::Recovered,
        Ok(_) => return Outcome::Ignored,
        Err(_) => {}
    }
    let row = salvage_row(text, spec);
    match insert_rows(conn, insert_sql, std::slice::from_ref(&row)) {
        Ok(inserted) if inserted[0] => Outcome::Salvaged,
        Ok(_) => Outcome::Ignored,
        Err(e) => Outcome::Failed(e.to_string()),
    }
}

// Only I/O on the log can fail here; store errors become `failed` entries.
pub fn recover_table(
    conn: &mut Connection,
    spec: &TableSpec,
    records: &[RejectedRecord],
    log: &mut RejectionLog,
    bar: Option<&indicatif::ProgressBar>,
) -> Result<RecoveryReport> {
    let insert_sql = spec.insert_sql();
    let scanner = StatementScanner::new();
    let mut report = RecoveryReport::default();
    for record in records {
        let found = split_candidates(&record.raw, spec, &scanner);
        // A record that stayed one piece is logged under its original text.
        let whole = found.tuples.len() + found.leftover.len() == 1;
        let failed = |text: &str, detail: String| {
            let raw = if whole { record.raw.as_str() } else { text };
            RejectedRecord::new(&record.table, raw, record.reason, detail)
        };

        for text in &found.tuples {
            report.attempted += 1;
            match recover_tuple(conn, spec, &insert_sql, text) {
                Outcome::Recovered => report.recovered += 1,
                Outcome::Salvaged => report.salvaged += 1,
                Outcome::Ignored => report.ignored += 1,
                Outcome::Failed(message) => {
                    report.permanently_failed += 1;
                    log.failed(failed(text, message))?;
                }
            }
        }
        for text in &found.leftover {
            report.attempted += 1;
            report.permanently_failed += 1;
            log.failed(failed(text, format!("not a {} tuple", spec.name)))?;
        }
        if let Some(b) = bar {
            b.inc(1);
        }
    }
    tracing::debug!(
        table = spec.name,
        attempted = report.attempted,
        recovered = report.recovered,
        salvaged = report.salvaged,
        ignored = report.ignored,
        failed = report.permanently_failed,
        "recovery finished"
    );
    Ok(report)
}
