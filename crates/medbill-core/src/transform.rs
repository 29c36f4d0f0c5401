//! Report transformation into the canonical schema
//!
//! Rows are converted independently: a row that cannot satisfy a required
//! field is recorded as a [`RowFailure`] and skipped, the rest of the batch
//! carries on. Only a mapping that does not fit the file aborts the run.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::convert::{clean_text, parse_amount, parse_date};
use crate::error::{Error, Result};
use crate::formats::{FormatDefinition, FormatRegistry};
use crate::models::{
    CanonicalField, CanonicalRow, ColumnMapping, DetectionResult, FailureReason, FieldKind,
    QualityNote, QualityNoteKind, RawTable, RowFailure, TransformOutput, TransformationReport,
};

/// A converted cell
#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Date(NaiveDate),
    Amount(Decimal),
}

/// Converts raw rows into [`CanonicalRow`]s
pub struct ReportTransformer<'a> {
    registry: &'a FormatRegistry,
}

impl<'a> ReportTransformer<'a> {
    pub fn new(registry: &'a FormatRegistry) -> Self {
        Self { registry }
    }

    /// Transform every row of `table`
    ///
    /// Uses `explicit_mapping` when given, otherwise the detection's own
    /// mapping. An unknown format without an explicit mapping is refused.
    pub fn transform(
        &self,
        table: &RawTable,
        detection: &DetectionResult,
        explicit_mapping: Option<&ColumnMapping>,
    ) -> Result<TransformOutput> {
        let format = detection.format_id.and_then(|id| self.registry.get(id));

        let mapping = match (explicit_mapping, format) {
            (Some(mapping), _) => mapping,
            (None, Some(_)) => &detection.mapping,
            (None, None) => {
                return Err(Error::UnknownFormat {
                    confidence: detection.confidence,
                })
            }
        };

        let columns = resolve_columns(&table.headers, mapping)?;
        let required = required_fields(format);
        let fill_down: &[CanonicalField] = format.map(|f| f.fill_down.as_slice()).unwrap_or(&[]);

        let mut rows = Vec::with_capacity(table.rows.len());
        let mut failures = Vec::new();
        let mut quality_notes = Vec::new();
        let mut carried: HashMap<CanonicalField, String> = HashMap::new();

        for (row_index, raw) in table.rows.iter().enumerate() {
            // Continuation rows inherit blank fill-down fields from the rows above
            let mut cells: BTreeMap<CanonicalField, String> = BTreeMap::new();
            for (field, column) in &columns {
                let cell = raw.get(*column).map(|v| v.trim()).unwrap_or("");
                if !cell.is_empty() {
                    if fill_down.contains(field) {
                        carried.insert(*field, cell.to_string());
                    }
                    cells.insert(*field, cell.to_string());
                } else if let Some(previous) = carried.get(field) {
                    cells.insert(*field, previous.clone());
                }
            }

            let converted = convert_row(row_index, &columns, &cells, &required)
                .and_then(|(values, notes)| Ok((build_row(row_index, format, values)?, notes)));
            match converted {
                Ok((row, notes)) => {
                    quality_notes.extend(notes);
                    rows.push(row);
                }
                Err(reason) => {
                    warn!("Row {} rejected: {}", row_index, reason);
                    failures.push(RowFailure { row_index, reason });
                }
            }
        }

        for note in &quality_notes {
            debug!("Row {}: {}", note.row_index, note);
        }

        let report = TransformationReport {
            format_id: detection.format_id,
            confidence: detection.confidence,
            rows_processed: table.rows.len(),
            rows_succeeded: rows.len(),
            rows_failed: failures.len(),
            failures,
            quality_notes,
        };

        if report.rows_failed > 0 {
            warn!(
                "{} of {} rows could not be transformed",
                report.rows_failed, report.rows_processed
            );
        }

        Ok(TransformOutput { rows, report })
    }
}

/// Column index of every mapped field, checked against the file's headers
///
/// Entries pinned to a position keep it while the header there still
/// matches. Otherwise the header is looked up by name, preferring an
/// occurrence no other field has taken yet.
fn resolve_columns(
    headers: &[String],
    mapping: &ColumnMapping,
) -> Result<BTreeMap<CanonicalField, usize>> {
    let same = |i: usize, source: &str| headers[i].trim() == source.trim();
    let mut columns = BTreeMap::new();
    let mut taken = HashSet::new();

    for column in mapping.iter() {
        let pinned = column
            .column
            .filter(|&i| i < headers.len() && same(i, column.source.as_str()));
        let by_name = || {
            let mut matching = (0..headers.len()).filter(|&i| same(i, column.source.as_str()));
            let first = matching.clone().next();
            matching.find(|i| !taken.contains(i)).or(first)
        };
        let index = pinned.or_else(by_name).ok_or_else(|| {
            Error::FatalMapping(format!(
                "column '{}' (for {}) is not in this file",
                column.source, column.field
            ))
        })?;

        if columns.insert(column.field, index).is_some() {
            return Err(Error::FatalMapping(format!(
                "{} is mapped from more than one column",
                column.field
            )));
        }
        taken.insert(index);
    }

    Ok(columns)
}

/// The format's required fields plus the ones every canonical row needs
fn required_fields(format: Option<&FormatDefinition>) -> Vec<CanonicalField> {
    let mut required: Vec<CanonicalField> = format
        .map(|f| f.required_fields().collect())
        .unwrap_or_default();
    for field in CanonicalField::always_required() {
        if !required.contains(field) {
            required.push(*field);
        }
    }
    required
}

type Converted = (BTreeMap<CanonicalField, Value>, Vec<QualityNote>);

/// Convert one row's cells, failing on the first required field that can't
/// be satisfied
fn convert_row(
    row_index: usize,
    columns: &BTreeMap<CanonicalField, usize>,
    cells: &BTreeMap<CanonicalField, String>,
    required: &[CanonicalField],
) -> std::result::Result<Converted, FailureReason> {
    let mut values = BTreeMap::new();
    let mut notes = Vec::new();

    for field in CanonicalField::ALL {
        let is_required = required.contains(&field);

        if !columns.contains_key(&field) {
            if is_required {
                return Err(FailureReason::MissingField { field });
            }
            continue;
        }

        let raw = match cells.get(&field) {
            Some(raw) => raw,
            None if is_required => return Err(FailureReason::EmptyField { field }),
            None => continue,
        };

        let converted = match field.kind() {
            FieldKind::Text => Ok(Value::Text(clean_text(raw))),
            FieldKind::Date => parse_date(raw).map(Value::Date).ok_or_else(|| {
                FailureReason::UnparseableDate {
                    field,
                    value: raw.clone(),
                }
            }),
            FieldKind::Decimal => parse_amount(raw).map(Value::Amount).ok_or_else(|| {
                FailureReason::UnparseableAmount {
                    field,
                    value: raw.clone(),
                }
            }),
        };

        match converted {
            Ok(value) => {
                if let Value::Amount(amount) = &value {
                    if amount.is_sign_negative() && !amount.is_zero() {
                        notes.push(QualityNote {
                            row_index,
                            field,
                            kind: QualityNoteKind::NegativeAmount,
                            value: amount.to_string(),
                        });
                    }
                }
                values.insert(field, value);
            }
            Err(reason) if is_required => return Err(reason),
            Err(_) => notes.push(QualityNote {
                row_index,
                field,
                kind: QualityNoteKind::UnparseableOptional,
                value: raw.clone(),
            }),
        }
    }

    Ok((values, notes))
}

fn build_row(
    source_row: usize,
    format: Option<&FormatDefinition>,
    mut values: BTreeMap<CanonicalField, Value>,
) -> std::result::Result<CanonicalRow, FailureReason> {
    let mut text = |field: CanonicalField| match values.remove(&field) {
        Some(Value::Text(s)) => Some(s),
        _ => None,
    };
    let row_id = text(CanonicalField::RowId);
    let check_number = text(CanonicalField::CheckNumber);
    let payer_name = text(CanonicalField::PayerName);
    let reference = text(CanonicalField::Reference);
    let patient_name = text(CanonicalField::PatientName);
    let card_type = text(CanonicalField::CardType);
    let category = text(CanonicalField::Category);
    let provider = text(CanonicalField::Provider);

    let date = |values: &BTreeMap<CanonicalField, Value>, field: CanonicalField| {
        match values.get(&field) {
            Some(Value::Date(d)) => Some(*d),
            _ => None,
        }
    };
    let amount = |values: &BTreeMap<CanonicalField, Value>, field: CanonicalField| {
        match values.get(&field) {
            Some(Value::Amount(a)) => Some(*a),
            _ => None,
        }
    };

    let transaction_date = date(&values, CanonicalField::TransactionDate).ok_or(
        FailureReason::MissingField {
            field: CanonicalField::TransactionDate,
        },
    )?;
    let cash_applied = amount(&values, CanonicalField::CashApplied).ok_or(
        FailureReason::MissingField {
            field: CanonicalField::CashApplied,
        },
    )?;

    Ok(CanonicalRow {
        source_row,
        format_id: format.map(|f| f.id),
        payment_type: format.map(|f| f.payment_type),
        transaction_date,
        cash_applied,
        row_id,
        posted_date: date(&values, CanonicalField::PostedDate),
        check_number,
        payer_name,
        reference,
        check_amount: amount(&values, CanonicalField::CheckAmount),
        fee_amount: amount(&values, CanonicalField::FeeAmount),
        net_amount: amount(&values, CanonicalField::NetAmount),
        patient_name,
        card_type,
        category,
        provider,
    })
}
