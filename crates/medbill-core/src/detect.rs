//! Report format detection
//!
//! Scores a header row (and a few data rows) against every registered
//! [`FormatDefinition`] and proposes a column mapping for the best one.
//!
//! Scoring:
//! - Exact normalized alias matches are assigned first, then still-unmatched
//!   fields may take a fuzzy match among the remaining headers
//! - Matched fields earn their weight (required > optional); fuzzy matches
//!   earn a fraction of it
//! - Date and amount columns whose sampled values don't parse as such cost
//!   a small penalty
//!
//! Detection never fails: anything unrecognized comes back as "unknown".

use strsim::normalized_levenshtein;
use tracing::{debug, warn};

use crate::config::DetectionConfig;
use crate::convert::{normalize_header, parse_amount, parse_date};
use crate::error::{Error, Result};
use crate::formats::{FormatDefinition, FormatRegistry};
use crate::models::{
    CanonicalField, ColumnMapping, DetectionResult, FieldKind, FormatCandidate, FormatId,
    MatchKind,
};

/// Minimum length of both strings for a containment match
const MIN_CONTAINMENT_LEN: usize = 4;

/// Header-based format detector
pub struct FormatDetector<'a> {
    registry: &'a FormatRegistry,
    config: &'a DetectionConfig,
}

/// One format's score against a header row
struct FormatScore<'a> {
    format: &'a FormatDefinition,
    confidence: f64,
    required_matched: usize,
    mapping: ColumnMapping,
    unmapped_required: Vec<CanonicalField>,
}

impl<'a> FormatDetector<'a> {
    pub fn new(registry: &'a FormatRegistry, config: &'a DetectionConfig) -> Self {
        Self { registry, config }
    }

    /// Detect the format of a file from its header row and sample data rows
    pub fn detect<S: AsRef<str>>(&self, headers: &[S], samples: &[Vec<String>]) -> DetectionResult {
        let headers: Vec<String> = headers.iter().map(|h| h.as_ref().to_string()).collect();
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();

        let scores: Vec<FormatScore> = self
            .registry
            .iter()
            .map(|format| self.score_format(format, &headers, &normalized, samples))
            .collect();

        for score in &scores {
            debug!(
                "Format {}: confidence {:.1}, {}/{} required fields",
                score.format.id,
                score.confidence,
                score.required_matched,
                score.format.required_fields().count()
            );
        }

        let candidates: Vec<FormatCandidate> = scores
            .iter()
            .map(|s| FormatCandidate {
                format_id: s.format.id,
                confidence: s.confidence,
                required_matched: s.required_matched,
            })
            .collect();

        // Strictly-better replacement keeps the earliest registered format on ties
        let mut best: Option<FormatScore> = None;
        for score in scores {
            let better = match &best {
                None => true,
                Some(current) => {
                    score.confidence > current.confidence
                        || (score.confidence == current.confidence
                            && score.required_matched > current.required_matched)
                }
            };
            if better {
                best = Some(score);
            }
        }

        match best {
            Some(best) if best.confidence >= self.config.confidence_threshold => {
                let unmapped_headers = unmapped_headers(&headers, &best.mapping);
                DetectionResult {
                    source: None,
                    format_id: Some(best.format.id),
                    confidence: best.confidence,
                    mapping: best.mapping,
                    unmapped_headers,
                    unmapped_required: best.unmapped_required,
                    candidates,
                }
            }
            best => {
                let confidence = best.map(|b| b.confidence).unwrap_or(0.0);
                warn!(
                    "No report format reached confidence {:.1} (best {:.1})",
                    self.config.confidence_threshold, confidence
                );
                DetectionResult {
                    source: None,
                    format_id: None,
                    confidence,
                    mapping: ColumnMapping::new(),
                    unmapped_headers: headers,
                    unmapped_required: CanonicalField::always_required().to_vec(),
                    candidates,
                }
            }
        }
    }

    /// Score a caller-chosen format, accepting it whatever its confidence
    pub fn detect_as<S: AsRef<str>>(
        &self,
        format_id: FormatId,
        headers: &[S],
        samples: &[Vec<String>],
    ) -> Result<DetectionResult> {
        let format = self
            .registry
            .get(format_id)
            .ok_or_else(|| Error::NotFound(format!("report format {}", format_id)))?;

        let headers: Vec<String> = headers.iter().map(|h| h.as_ref().to_string()).collect();
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let score = self.score_format(format, &headers, &normalized, samples);

        debug!(
            "Forced format {}: confidence {:.1}",
            format_id, score.confidence
        );

        Ok(DetectionResult {
            source: None,
            format_id: Some(format_id),
            confidence: score.confidence,
            unmapped_headers: unmapped_headers(&headers, &score.mapping),
            candidates: vec![FormatCandidate {
                format_id,
                confidence: score.confidence,
                required_matched: score.required_matched,
            }],
            mapping: score.mapping,
            unmapped_required: score.unmapped_required,
        })
    }

    fn score_format<'f>(
        &self,
        format: &'f FormatDefinition,
        headers: &[String],
        normalized: &[String],
        samples: &[Vec<String>],
    ) -> FormatScore<'f> {
        let mut claimed = vec![false; headers.len()];
        let mut assigned: Vec<Option<(usize, MatchKind)>> = vec![None; format.fields.len()];

        // Pass 1: exact alias matches
        for (slot, spec) in format.fields.iter().enumerate() {
            let hit = spec.aliases.iter().find_map(|alias| {
                normalized
                    .iter()
                    .enumerate()
                    .find(|(i, h)| !claimed[*i] && *h == alias)
                    .map(|(i, _)| i)
            });
            if let Some(i) = hit {
                claimed[i] = true;
                assigned[slot] = Some((i, MatchKind::Exact));
            }
        }

        // Pass 2: fuzzy matches for whatever is left
        for (slot, spec) in format.fields.iter().enumerate() {
            if assigned[slot].is_some() {
                continue;
            }
            let mut best: Option<(usize, f64)> = None;
            for (i, header) in normalized.iter().enumerate() {
                if claimed[i] || header.is_empty() {
                    continue;
                }
                for alias in &spec.aliases {
                    if let Some(strength) = self.fuzzy_strength(header, alias) {
                        if best.map_or(true, |(_, s)| strength > s) {
                            best = Some((i, strength));
                        }
                    }
                }
            }
            if let Some((i, _)) = best {
                claimed[i] = true;
                assigned[slot] = Some((i, MatchKind::Fuzzy));
            }
        }

        let mut score = 0.0;
        let mut required_matched = 0;
        let mut unmapped_required = Vec::new();
        let mut columns: Vec<(usize, CanonicalField, MatchKind)> = Vec::new();

        for (spec, assignment) in format.fields.iter().zip(&assigned) {
            let weight = if spec.required {
                self.config.required_weight
            } else {
                self.config.optional_weight
            };
            match assignment {
                Some((i, kind)) => {
                    score += match kind {
                        MatchKind::Exact => weight,
                        _ => weight * self.config.fuzzy_factor,
                    };
                    if spec.required {
                        required_matched += 1;
                    }
                    columns.push((*i, spec.field, *kind));
                }
                None if spec.required => unmapped_required.push(spec.field),
                None => {}
            }
        }

        columns.sort_by_key(|(i, _, _)| *i);
        let mut mapping = ColumnMapping::new();
        for (i, field, kind) in &columns {
            mapping.push_column(*i, headers[*i].clone(), *field, *kind);
        }

        let max_score = format.max_score(self.config);
        let mut confidence = if max_score > 0.0 {
            100.0 * score / max_score
        } else {
            0.0
        };

        let (checked, disagreeing) = self.check_value_shapes(&columns, samples);
        if checked > 0 {
            confidence -= self.config.shape_penalty * disagreeing as f64 / checked as f64;
        }

        FormatScore {
            format,
            confidence: confidence.clamp(0.0, 100.0),
            required_matched,
            mapping,
            unmapped_required,
        }
    }

    /// Similarity of a fuzzy match, if `header` and `alias` are close enough
    fn fuzzy_strength(&self, header: &str, alias: &str) -> Option<f64> {
        let similarity = normalized_levenshtein(header, alias);
        let contains = header.len() >= MIN_CONTAINMENT_LEN
            && alias.len() >= MIN_CONTAINMENT_LEN
            && (header.contains(alias) || alias.contains(header));

        (contains || similarity >= self.config.fuzzy_similarity).then_some(similarity)
    }

    /// Count mapped date/amount columns with sampled values, and how many of
    /// them hold a value that does not parse as their type
    fn check_value_shapes(
        &self,
        columns: &[(usize, CanonicalField, MatchKind)],
        samples: &[Vec<String>],
    ) -> (usize, usize) {
        let samples = &samples[..samples.len().min(self.config.sample_rows)];
        let mut checked = 0;
        let mut disagreeing = 0;

        for (i, field, _) in columns {
            let parses: fn(&str) -> bool = match field.kind() {
                FieldKind::Date => |v| parse_date(v).is_some(),
                FieldKind::Decimal => |v| parse_amount(v).is_some(),
                FieldKind::Text => continue,
            };
            let values: Vec<&str> = samples
                .iter()
                .filter_map(|row| row.get(*i))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .collect();
            if values.is_empty() {
                continue;
            }
            checked += 1;
            if !values.iter().all(|v| parses(v)) {
                debug!("Sampled values of column {} don't look like {}", i, field);
                disagreeing += 1;
            }
        }

        (checked, disagreeing)
    }
}

fn unmapped_headers(headers: &[String], mapping: &ColumnMapping) -> Vec<String> {
    headers
        .iter()
        .enumerate()
        .filter(|(i, _)| !mapping.maps_column(*i))
        .map(|(_, h)| h.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSURANCE_HEADERS: [&str; 9] = [
        "RowId",
        "Check Date",
        "Date Posted",
        "Check Number",
        "Payment From",
        "Reference",
        "Check Amount",
        "Cash Applied",
        "Provider",
    ];

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn detect(headers: &[&str], samples: &[Vec<String>]) -> DetectionResult {
        let registry = FormatRegistry::builtin();
        let config = DetectionConfig::default();
        FormatDetector::new(&registry, &config).detect(headers, samples)
    }

    #[test]
    fn test_insurance_scenario() {
        let result = detect(&INSURANCE_HEADERS, &[]);

        assert_eq!(result.format_id, Some(FormatId::InsuranceClaims));
        assert!(result.confidence >= 90.0, "confidence {}", result.confidence);
        assert_eq!(
            result.mapping.field_for("Check Date"),
            Some(CanonicalField::TransactionDate)
        );
        assert_eq!(
            result.mapping.field_for("Cash Applied"),
            Some(CanonicalField::CashApplied)
        );
        assert_eq!(
            result.mapping.field_for("Provider"),
            Some(CanonicalField::Provider)
        );
        assert!(result.unmapped_headers.is_empty());
        assert!(result.unmapped_required.is_empty());
    }

    #[test]
    fn test_own_headers_score_high() {
        let registry = FormatRegistry::builtin();
        let config = DetectionConfig::default();
        let detector = FormatDetector::new(&registry, &config);

        for format in registry.iter() {
            let result = detector.detect(format.example_headers, &[]);
            assert_eq!(result.format_id, Some(format.id));
            assert!(result.confidence >= 95.0, "{}: {}", format.id, result.confidence);
            assert!(result.unmapped_required.is_empty(), "{}", format.id);

            // First alias of every field, as a bare header list
            let first_aliases: Vec<&str> = format
                .fields
                .iter()
                .filter_map(|f| f.aliases.first().map(String::as_str))
                .collect();
            let result = detector.detect(&first_aliases, &[]);
            assert_eq!(result.format_id, Some(format.id));
            assert!(result.confidence >= 95.0, "{}: {}", format.id, result.confidence);
        }
    }

    #[test]
    fn test_no_alias_matches_is_unknown() {
        let result = detect(&["foo", "bar", "baz"], &[]);

        assert!(result.is_unknown());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.unmapped_headers, vec!["foo", "bar", "baz"]);
        assert!(result.mapping.is_empty());
        assert_eq!(result.candidates.len(), 3);
    }

    #[test]
    fn test_empty_header_list_is_unknown() {
        let result = detect(&[], &[]);
        assert!(result.is_unknown());
        assert_eq!(result.confidence, 0.0);
        assert!(result.unmapped_headers.is_empty());
    }

    #[test]
    fn test_below_threshold_reports_best_confidence() {
        // Only the provider column matches anything
        let result = detect(&["Provider", "Notes Field", "xyz"], &[]);
        assert!(result.is_unknown());
        assert!(result.confidence > 0.0);
        assert!(result.confidence < 50.0);
        assert!(result.mapping.is_empty());
        assert_eq!(result.unmapped_headers.len(), 3);
    }

    #[test]
    fn test_header_normalization() {
        let result = detect(
            &["check_date", "CASH-APPLIED", "  provider  ", "payment from"],
            &[],
        );
        assert_eq!(result.format_id, Some(FormatId::InsuranceClaims));
        assert_eq!(
            result.mapping.source_for(CanonicalField::CashApplied),
            Some("CASH-APPLIED")
        );
        assert!(result.mapping.iter().all(|c| c.match_kind == MatchKind::Exact));
    }

    #[test]
    fn test_fuzzy_match_scores_lower_than_exact() {
        let exact = detect(
            &["Check Date", "Check Number", "Payment From", "Cash Applied", "Provider"],
            &[],
        );
        let fuzzy = detect(
            &["Check Date", "Check Number", "Payment From", "Total Cash Applied", "Provider"],
            &[],
        );

        assert_eq!(fuzzy.format_id, Some(FormatId::InsuranceClaims));
        assert_eq!(
            fuzzy.mapping.field_for("Total Cash Applied"),
            Some(CanonicalField::CashApplied)
        );
        let column = fuzzy
            .mapping
            .iter()
            .find(|c| c.field == CanonicalField::CashApplied)
            .unwrap();
        assert_eq!(column.match_kind, MatchKind::Fuzzy);
        assert!(fuzzy.confidence < exact.confidence);
    }

    #[test]
    fn test_header_claimed_once() {
        // "Check Amount" must not feed both check_amount and cash_applied
        let result = detect(&["Check Date", "Check Amount", "Provider"], &[]);
        let uses = result
            .candidates
            .iter()
            .find(|c| c.format_id == FormatId::InsuranceClaims)
            .unwrap();
        assert_eq!(uses.required_matched, 2);
        let fields: Vec<CanonicalField> = result.mapping.iter().map(|c| c.field).collect();
        let mut deduped = fields.clone();
        deduped.dedup();
        assert_eq!(fields, deduped);
    }

    #[test]
    fn test_detect_is_pure() {
        let samples = vec![row(&["1", "01/15/2024", "", "123", "BCBS", "", "100", "50", "Dr. A"])];
        let first = detect(&INSURANCE_HEADERS, &samples);
        let second = detect(&INSURANCE_HEADERS, &samples);
        assert_eq!(first, second);
    }

    #[test]
    fn test_sample_shape_penalty() {
        let good = vec![row(&[
            "1",
            "01/15/2024",
            "01/16/2024",
            "123",
            "BCBS",
            "",
            "100.00",
            "50.00",
            "Dr. A",
        ])];
        let bad = vec![row(&["1", "soon", "later", "123", "BCBS", "", "lots", "some", "Dr. A"])];

        let clean = detect(&INSURANCE_HEADERS, &good);
        let penalized = detect(&INSURANCE_HEADERS, &bad);

        assert_eq!(clean.confidence, 100.0);
        // Every checked column disagrees: the full penalty applies
        assert_eq!(penalized.confidence, 90.0);
        assert_eq!(penalized.format_id, Some(FormatId::InsuranceClaims));
    }

    #[test]
    fn test_tie_prefers_more_required_then_registration_order() {
        let registry = FormatRegistry::builtin();
        let config = DetectionConfig {
            confidence_threshold: 0.0,
            ..Default::default()
        };
        let detector = FormatDetector::new(&registry, &config);

        // Nothing matches: every format ties at 0, the first registered wins
        let result = detector.detect(&["foo"], &[]);
        assert_eq!(result.format_id, Some(FormatId::InsuranceClaims));
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_tie_prefers_more_required_fields() {
        let registry = FormatRegistry::builtin();
        // Equal weights: confidence is matched fields over all fields
        let config = DetectionConfig {
            confidence_threshold: 0.0,
            required_weight: 1.0,
            optional_weight: 1.0,
            ..Default::default()
        };
        let detector = FormatDetector::new(&registry, &config);

        let confidence_of = |result: &DetectionResult, id: FormatId| {
            result
                .candidates
                .iter()
                .find(|c| c.format_id == id)
                .map(|c| (c.confidence, c.required_matched))
                .unwrap()
        };

        // Insurance: 3 of 9 fields, none required. Expenses: 2 of 6, both required.
        let headers = ["RowId", "Check Number", "Payment From", "Category", "Expense Amount"];
        let result = detector.detect(&headers, &[]);
        let insurance = confidence_of(&result, FormatId::InsuranceClaims);
        let expenses = confidence_of(&result, FormatId::PracticeExpenses);
        assert_eq!(insurance.0, expenses.0);
        assert_eq!((insurance.1, expenses.1), (0, 2));
        assert_eq!(result.format_id, Some(FormatId::PracticeExpenses));

        // Reversed: insurance 3 of 9 with two required, expenses 2 of 6 with none
        let headers = ["Cash Applied", "Provider", "RowId", "Vendor", "Description"];
        let result = detector.detect(&headers, &[]);
        let insurance = confidence_of(&result, FormatId::InsuranceClaims);
        let expenses = confidence_of(&result, FormatId::PracticeExpenses);
        assert_eq!(insurance.0, expenses.0);
        assert_eq!((insurance.1, expenses.1), (2, 0));
        assert_eq!(result.format_id, Some(FormatId::InsuranceClaims));
    }

    #[test]
    fn test_detect_as_forces_format() {
        let registry = FormatRegistry::builtin();
        let config = DetectionConfig::default();
        let detector = FormatDetector::new(&registry, &config);

        let result = detector
            .detect_as(FormatId::PracticeExpenses, &INSURANCE_HEADERS, &[])
            .unwrap();
        assert_eq!(result.format_id, Some(FormatId::PracticeExpenses));
        assert!(result.confidence < 50.0);
        assert!(result
            .unmapped_required
            .contains(&CanonicalField::Category));
    }

    #[test]
    fn test_threshold_is_configurable() {
        let registry = FormatRegistry::builtin();
        let strict = DetectionConfig {
            confidence_threshold: 99.0,
            ..Default::default()
        };
        let detector = FormatDetector::new(&registry, &strict);
        let result = detector.detect(&["Check Date", "Cash Applied", "Provider"], &[]);
        assert!(result.is_unknown());
    }

    #[test]
    fn test_repeated_header_reported_unmapped() {
        let headers = ["Check Date", "Cash Applied", "Provider", "Reference", "Reference"];
        let result = detect(&headers, &[]);

        assert_eq!(result.format_id, Some(FormatId::InsuranceClaims));
        assert_eq!(result.unmapped_headers, vec!["Reference".to_string()]);
        let reference = result
            .mapping
            .iter()
            .find(|c| c.field == CanonicalField::Reference)
            .unwrap();
        assert_eq!(reference.column, Some(3));
    }
}
