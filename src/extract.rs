// Worker stage for SQL dumps: decoded chunk text in, normalized rows and
// rejected records out, grouped by target table. Pure; no store access.

use crate::config::ArityPolicy;
use crate::normalize::{normalize, project, NormalizedRow};
use crate::parser::insert::{InsertHeader, StatementScanner};
use crate::parser::tuple::{split_fields, Piece};
use crate::rejects::{RejectReason, RejectedRecord};
use crate::schema::TableSpec;
use crate::value::{coerce, ScalarValue};

#[derive(Debug, Default)]
pub struct TableRows {
    pub rows: Vec<NormalizedRow>,
    pub rejects: Vec<RejectedRecord>,
}

#[derive(Debug, Default)]
pub struct ChunkOutcome {
    pub index: usize,
    pub bytes: u64,
    // Aligned with the extractor's table list.
    pub tables: Vec<TableRows>,
    pub statements: u64,
    pub skipped_statements: u64,
}

pub struct Extractor {
    tables: &'static [&'static TableSpec],
    scanner: StatementScanner,
    arity: ArityPolicy,
}

impl Extractor {
    pub fn new(tables: &'static [&'static TableSpec], arity: ArityPolicy) -> Self {
        Self {
            tables,
            scanner: StatementScanner::new(),
            arity,
        }
    }

    fn table_slot(&self, name: &str) -> Option<usize> {
        self.tables
            .iter()
            .position(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn extract(&self, text: &str, index: usize, bytes: u64) -> ChunkOutcome {
        let mut outcome = ChunkOutcome {
            index,
            bytes,
            tables: self.tables.iter().map(|_| TableRows::default()).collect(),
            ..ChunkOutcome::default()
        };
        let statements = self.scanner.for_each_insert(text, |header, tokens| {
            let Some(slot) = self.table_slot(header.table) else {
                outcome.skipped_statements += 1;
                return;
            };
            let spec = self.tables[slot];
            let positions = column_positions(header, spec);
            let out = &mut outcome.tables[slot];
            for piece in tokens {
                match self.handle_piece(piece, spec, positions.as_deref()) {
                    Ok(row) => out.rows.push(row),
                    Err(record) => out.rejects.push(record),
                }
            }
        });
        outcome.statements = statements as u64;
        outcome
    }

    fn handle_piece(
        &self,
        piece: Piece<'_>,
        spec: &TableSpec,
        positions: Option<&[usize]>,
    ) -> Result<NormalizedRow, RejectedRecord> {
        let (reason, detail) = match piece {
            Piece::Tuple(inner) => return self.handle_tuple(inner, spec, positions),
            Piece::Fragment(_) => (RejectReason::Fragment, "no opening parenthesis"),
            Piece::Unterminated(_) => (RejectReason::Unterminated, "tuple not closed"),
        };
        Err(RejectedRecord::new(spec.name, piece.text(), reason, detail))
    }

    fn handle_tuple(
        &self,
        inner: &str,
        spec: &TableSpec,
        positions: Option<&[usize]>,
    ) -> Result<NormalizedRow, RejectedRecord> {
        if inner.trim_start().starts_with('(') {
            return Err(RejectedRecord::new(
                spec.name,
                format!("({})", inner),
                RejectReason::NestedParens,
                "nested leading parenthesis",
            ));
        }

        let mut values: Vec<ScalarValue> = split_fields(inner).into_iter().map(coerce).collect();
        if let Some(positions) = positions {
            if values.len() == positions.len() {
                values = project(values, positions, spec.arity());
            }
        }
        if values.len() != spec.arity() && self.arity == ArityPolicy::Strict {
            return Err(RejectedRecord::new(
                spec.name,
                format!("({})", inner),
                RejectReason::ColumnCount,
                format!("expected {} fields, got {}", spec.arity(), values.len()),
            ));
        }
        Ok(normalize(values, spec))
    }
}

// Schema slots for an explicit column list; None unless every name resolves.
fn column_positions(header: &InsertHeader<'_>, spec: &TableSpec) -> Option<Vec<usize>> {
    if header.columns.is_empty() {
        return None;
    }
    header
        .columns
        .iter()
        .map(|c| spec.column_index(c))
        .collect()
}
