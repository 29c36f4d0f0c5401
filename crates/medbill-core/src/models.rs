//! Domain models for medbill

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Error, Result};

/// A field of the canonical billing schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    RowId,
    TransactionDate,
    PostedDate,
    CheckNumber,
    PayerName,
    Reference,
    CheckAmount,
    CashApplied,
    FeeAmount,
    NetAmount,
    PatientName,
    CardType,
    Category,
    Provider,
}

impl CanonicalField {
    /// Every canonical field, in schema order
    pub const ALL: [CanonicalField; 14] = [
        Self::RowId,
        Self::TransactionDate,
        Self::PostedDate,
        Self::CheckNumber,
        Self::PayerName,
        Self::Reference,
        Self::CheckAmount,
        Self::CashApplied,
        Self::FeeAmount,
        Self::NetAmount,
        Self::PatientName,
        Self::CardType,
        Self::Category,
        Self::Provider,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RowId => "row_id",
            Self::TransactionDate => "transaction_date",
            Self::PostedDate => "posted_date",
            Self::CheckNumber => "check_number",
            Self::PayerName => "payer_name",
            Self::Reference => "reference",
            Self::CheckAmount => "check_amount",
            Self::CashApplied => "cash_applied",
            Self::FeeAmount => "fee_amount",
            Self::NetAmount => "net_amount",
            Self::PatientName => "patient_name",
            Self::CardType => "card_type",
            Self::Category => "category",
            Self::Provider => "provider",
        }
    }

    /// Value type the transformer converts this field into
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::TransactionDate | Self::PostedDate => FieldKind::Date,
            Self::CheckAmount | Self::CashApplied | Self::FeeAmount | Self::NetAmount => {
                FieldKind::Decimal
            }
            _ => FieldKind::Text,
        }
    }

    /// Fields every canonical row must carry, whatever the source layout
    pub fn always_required() -> &'static [CanonicalField] {
        &[Self::TransactionDate, Self::CashApplied]
    }
}

impl std::str::FromStr for CanonicalField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| format!("Unknown canonical field: {}", s))
    }
}

impl std::fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Value type of a canonical field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Date,
    Decimal,
}

/// Known source report layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatId {
    InsuranceClaims,
    CreditCardPayment,
    PracticeExpenses,
}

impl FormatId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsuranceClaims => "insurance_claims",
            Self::CreditCardPayment => "credit_card_payment",
            Self::PracticeExpenses => "practice_expenses",
        }
    }
}

impl std::str::FromStr for FormatId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "insurance_claims" | "insurance" => Ok(Self::InsuranceClaims),
            "credit_card_payment" | "credit_card" | "cc" => Ok(Self::CreditCardPayment),
            "practice_expenses" | "expenses" => Ok(Self::PracticeExpenses),
            _ => Err(format!("Unknown report format: {}", s)),
        }
    }
}

impl std::fmt::Display for FormatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a payment reached the practice, fixed per source format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Insurance,
    CreditCard,
    Expense,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insurance => "insurance",
            Self::CreditCard => "credit_card",
            Self::Expense => "expense",
        }
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a source header was tied to its canonical field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Normalized header equals a registered alias
    Exact,
    /// Containment or edit-distance match against an alias
    Fuzzy,
    /// Supplied by the caller
    Manual,
}

/// One source header resolved to a canonical field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedColumn {
    pub source: String,
    pub field: CanonicalField,
    pub match_kind: MatchKind,
    /// Position of the header in the file, when known (set by detection)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

/// Resolved correspondence from source headers to canonical fields
///
/// Entries keep the order they were added in (detection adds them in header
/// order).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping {
    columns: Vec<MappedColumn>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a caller-supplied mapping
    pub fn manual<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, CanonicalField)>,
        S: Into<String>,
    {
        let mut mapping = Self::new();
        for (source, field) in pairs {
            mapping.push(source, field, MatchKind::Manual);
        }
        mapping
    }

    /// Parse `Header=field` assignments such as `"Check Date=transaction_date"`
    pub fn parse_assignments<S: AsRef<str>>(assignments: &[S]) -> Result<Self> {
        let mut mapping = Self::new();
        for raw in assignments {
            let raw = raw.as_ref();
            let (source, field) = raw.rsplit_once('=').ok_or_else(|| {
                Error::FatalMapping(format!("expected Header=field, got '{}'", raw))
            })?;
            let source = source.trim();
            if source.is_empty() {
                return Err(Error::FatalMapping(format!("empty header in '{}'", raw)));
            }
            let field: CanonicalField = field.parse().map_err(Error::FatalMapping)?;
            mapping.push(source, field, MatchKind::Manual);
        }
        Ok(mapping)
    }

    pub fn push(
        &mut self,
        source: impl Into<String>,
        field: CanonicalField,
        match_kind: MatchKind,
    ) {
        self.columns.push(MappedColumn {
            source: source.into(),
            field,
            match_kind,
            column: None,
        });
    }

    /// Add a mapping pinned to the header at `column`
    pub fn push_column(
        &mut self,
        column: usize,
        source: impl Into<String>,
        field: CanonicalField,
        match_kind: MatchKind,
    ) {
        self.columns.push(MappedColumn {
            source: source.into(),
            field,
            match_kind,
            column: Some(column),
        });
    }

    /// Source header feeding `field`, if any
    pub fn source_for(&self, field: CanonicalField) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.field == field)
            .map(|c| c.source.as_str())
    }

    /// Canonical field fed by `header`, if any
    pub fn field_for(&self, header: &str) -> Option<CanonicalField> {
        self.columns
            .iter()
            .find(|c| c.source == header)
            .map(|c| c.field)
    }

    /// Whether the header at `column` is pinned by some entry
    pub fn maps_column(&self, column: usize) -> bool {
        self.columns.iter().any(|c| c.column == Some(column))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappedColumn> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Confidence a single registered format achieved during detection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatCandidate {
    pub format_id: FormatId,
    pub confidence: f64,
    pub required_matched: usize,
}

/// Outcome of format detection for one uploaded file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    /// File name or other caller-provided reference
    pub source: Option<String>,
    /// Matched format; `None` means "unknown"
    #[serde(rename = "format", serialize_with = "serialize_format")]
    pub format_id: Option<FormatId>,
    /// 0-100
    pub confidence: f64,
    pub mapping: ColumnMapping,
    pub unmapped_headers: Vec<String>,
    pub unmapped_required: Vec<CanonicalField>,
    /// Every registered format's score, in registration order
    pub candidates: Vec<FormatCandidate>,
}

fn serialize_format<S: Serializer>(
    format: &Option<FormatId>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(format.map(|f| f.as_str()).unwrap_or("unknown"))
}

impl DetectionResult {
    pub fn is_unknown(&self) -> bool {
        self.format_id.is_none()
    }

    /// Format id, or "unknown"
    pub fn format_name(&self) -> &'static str {
        self.format_id.map(|f| f.as_str()).unwrap_or("unknown")
    }

    /// Human-readable summary of the detection
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Detected format: {} (confidence: {:.1})\n",
            self.format_name(),
            self.confidence
        );
        if !self.mapping.is_empty() {
            out.push_str("Column mapping:\n");
            for column in self.mapping.iter() {
                out.push_str(&format!(
                    "  {} -> {} ({:?})\n",
                    column.source, column.field, column.match_kind
                ));
            }
        }
        if !self.unmapped_headers.is_empty() {
            out.push_str(&format!(
                "Unmapped headers: {}\n",
                self.unmapped_headers.join(", ")
            ));
        }
        if !self.unmapped_required.is_empty() {
            let missing: Vec<&str> = self.unmapped_required.iter().map(|f| f.as_str()).collect();
            out.push_str(&format!("Missing required fields: {}\n", missing.join(", ")));
        }
        out
    }
}

/// One billing or expense transaction in the canonical schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalRow {
    /// 0-based index of the data row in the source file
    pub source_row: usize,
    pub format_id: Option<FormatId>,
    pub payment_type: Option<PaymentType>,
    pub transaction_date: NaiveDate,
    pub cash_applied: Decimal,
    pub row_id: Option<String>,
    pub posted_date: Option<NaiveDate>,
    pub check_number: Option<String>,
    pub payer_name: Option<String>,
    pub reference: Option<String>,
    pub check_amount: Option<Decimal>,
    pub fee_amount: Option<Decimal>,
    pub net_amount: Option<Decimal>,
    pub patient_name: Option<String>,
    pub card_type: Option<String>,
    pub category: Option<String>,
    pub provider: Option<String>,
}

/// Why a row was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// No source column is mapped to a required field
    MissingField { field: CanonicalField },
    /// The mapped column is blank in this row
    EmptyField { field: CanonicalField },
    UnparseableDate { field: CanonicalField, value: String },
    UnparseableAmount { field: CanonicalField, value: String },
}

impl FailureReason {
    pub fn field(&self) -> CanonicalField {
        match self {
            Self::MissingField { field }
            | Self::EmptyField { field }
            | Self::UnparseableDate { field, .. }
            | Self::UnparseableAmount { field, .. } => *field,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::EmptyField { .. } => "empty_field",
            Self::UnparseableDate { .. } => "unparseable_date",
            Self::UnparseableAmount { .. } => "unparseable_amount",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField { field } => write!(f, "missing field: {}", field),
            Self::EmptyField { field } => write!(f, "empty field: {}", field),
            Self::UnparseableDate { field, value } => {
                write!(f, "unparseable date: {} = '{}'", field, value)
            }
            Self::UnparseableAmount { field, value } => {
                write!(f, "unparseable amount: {} = '{}'", field, value)
            }
        }
    }
}

/// A rejected row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub row_index: usize,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityNoteKind {
    /// Negative amount, kept as an adjustment or refund
    NegativeAmount,
    /// Optional field whose value could not be converted; left empty
    UnparseableOptional,
}

impl QualityNoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NegativeAmount => "negative_amount",
            Self::UnparseableOptional => "unparseable_optional",
        }
    }
}

/// A data quality observation that does not reject the row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityNote {
    pub row_index: usize,
    pub field: CanonicalField,
    pub kind: QualityNoteKind,
    pub value: String,
}

impl std::fmt::Display for QualityNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            QualityNoteKind::NegativeAmount => {
                write!(f, "negative amount in {}: {} (kept)", self.field, self.value)
            }
            QualityNoteKind::UnparseableOptional => {
                write!(f, "could not convert {} = '{}' (left empty)", self.field, self.value)
            }
        }
    }
}

/// Summary of one transformer run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformationReport {
    pub format_id: Option<FormatId>,
    /// Inherited from the detection result
    pub confidence: f64,
    pub rows_processed: usize,
    pub rows_succeeded: usize,
    pub rows_failed: usize,
    pub failures: Vec<RowFailure>,
    pub quality_notes: Vec<QualityNote>,
}

impl TransformationReport {
    /// No failures and no quality notes
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.quality_notes.is_empty()
    }
}

/// Output of one transformer run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformOutput {
    /// Accepted rows, in input order
    pub rows: Vec<CanonicalRow>,
    pub report: TransformationReport,
}

/// A parsed CSV file: the header row and every data row, as text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// The first `n` data rows, for detection
    pub fn samples(&self, n: usize) -> &[Vec<String>] {
        &self.rows[..self.rows.len().min(n)]
    }
}

/// Final state of a stored upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Every row imported
    Completed,
    /// Some rows were rejected
    Partial,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
        }
    }
}

impl std::str::FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "completed" => Ok(Self::Completed),
            "partial" => Ok(Self::Partial),
            _ => Err(format!("Unknown upload status: {}", s)),
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Upload metadata supplied by the caller before storing
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub filename: String,
    pub file_hash: String,
    pub file_size_bytes: Option<i64>,
}

/// A stored upload (one imported file)
#[derive(Debug, Clone, Serialize)]
pub struct Upload {
    pub id: i64,
    pub filename: String,
    pub file_hash: String,
    pub file_size_bytes: Option<i64>,
    pub format_id: Option<FormatId>,
    pub confidence: f64,
    pub rows_processed: i64,
    pub rows_succeeded: i64,
    pub rows_failed: i64,
    pub status: UploadStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

impl std::str::FromStr for IssueSeverity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warning" => Ok(Self::Warning),
            _ => Err(format!("Unknown issue severity: {}", s)),
        }
    }
}

/// A stored row failure or quality note
#[derive(Debug, Clone, Serialize)]
pub struct UploadIssue {
    pub id: i64,
    pub upload_id: i64,
    pub row_index: i64,
    pub issue_type: String,
    pub field: Option<String>,
    pub description: String,
    pub severity: IssueSeverity,
}

/// A stored canonical row
#[derive(Debug, Clone, Serialize)]
pub struct StoredPayment {
    pub id: i64,
    pub upload_id: i64,
    pub transaction_date: NaiveDate,
    pub provider: Option<String>,
    pub payer_name: Option<String>,
    pub patient_name: Option<String>,
    pub cash_applied: Decimal,
    pub payment_type: Option<String>,
}

/// Row counts for `medbill status`
#[derive(Debug, Clone, Default, Serialize)]
pub struct DbStats {
    pub uploads: i64,
    pub payments: i64,
    pub providers: i64,
    pub failed_rows: i64,
}
