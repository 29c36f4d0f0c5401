//! Registry of known report layouts
//!
//! Each [`FormatDefinition`] lists, per canonical field, the header aliases a
//! practice-management export uses for it. The registry is built once, is
//! read-only afterwards and is passed by reference to the detector and the
//! transformer.

use tracing::debug;

use crate::config::DetectionConfig;
use crate::convert::normalize_header;
use crate::models::{CanonicalField, FormatId, PaymentType};

/// One canonical field a format provides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: CanonicalField,
    /// Normalized header aliases, most specific first
    pub aliases: Vec<String>,
    pub required: bool,
}

/// A known source report layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDefinition {
    pub id: FormatId,
    pub label: &'static str,
    pub fields: Vec<FieldSpec>,
    /// Fields a continuation row inherits from the row above when blank
    pub fill_down: Vec<CanonicalField>,
    pub payment_type: PaymentType,
    /// Header row as the source system exports it
    pub example_headers: &'static [&'static str],
}

impl FormatDefinition {
    fn new(
        id: FormatId,
        label: &'static str,
        payment_type: PaymentType,
        example_headers: &'static [&'static str],
    ) -> Self {
        Self {
            id,
            label,
            fields: Vec::new(),
            fill_down: Vec::new(),
            payment_type,
            example_headers,
        }
    }

    fn required(self, field: CanonicalField, aliases: &[&str]) -> Self {
        self.field(field, aliases, true)
    }

    fn optional(self, field: CanonicalField, aliases: &[&str]) -> Self {
        self.field(field, aliases, false)
    }

    fn field(mut self, field: CanonicalField, aliases: &[&str], required: bool) -> Self {
        self.fields.push(FieldSpec {
            field,
            aliases: aliases.iter().map(|a| normalize_header(a)).collect(),
            required,
        });
        self
    }

    fn filled_down(mut self, fields: &[CanonicalField]) -> Self {
        self.fill_down = fields.to_vec();
        self
    }

    pub fn spec(&self, field: CanonicalField) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.field == field)
    }

    pub fn is_required(&self, field: CanonicalField) -> bool {
        self.spec(field).is_some_and(|f| f.required)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = CanonicalField> + '_ {
        self.fields.iter().filter(|f| f.required).map(|f| f.field)
    }

    pub fn optional_fields(&self) -> impl Iterator<Item = CanonicalField> + '_ {
        self.fields.iter().filter(|f| !f.required).map(|f| f.field)
    }

    /// Highest score a header list can earn against this format
    pub fn max_score(&self, config: &DetectionConfig) -> f64 {
        self.fields
            .iter()
            .map(|f| {
                if f.required {
                    config.required_weight
                } else {
                    config.optional_weight
                }
            })
            .sum()
    }

    fn add_aliases(&mut self, field: CanonicalField, aliases: &[String]) {
        let normalized: Vec<String> = aliases
            .iter()
            .map(|a| normalize_header(a))
            .filter(|a| !a.is_empty())
            .collect();

        match self.fields.iter_mut().find(|f| f.field == field) {
            Some(spec) => {
                for alias in normalized {
                    if !spec.aliases.contains(&alias) {
                        spec.aliases.push(alias);
                    }
                }
            }
            None => self.fields.push(FieldSpec {
                field,
                aliases: normalized,
                required: false,
            }),
        }
    }
}

fn insurance_claims() -> FormatDefinition {
    use CanonicalField::*;

    FormatDefinition::new(
        FormatId::InsuranceClaims,
        "Insurance Claims",
        PaymentType::Insurance,
        &[
            "RowId",
            "Check Date",
            "Date Posted",
            "Check Number",
            "Payment From",
            "Reference",
            "Check Amount",
            "Cash Applied",
            "Provider",
        ],
    )
    .optional(RowId, &["RowId", "Row Id", "Claim Id"])
    .required(TransactionDate, &["Check Date", "Payment Date", "Deposit Date"])
    .optional(PostedDate, &["Date Posted", "Posted Date", "Post Date"])
    .optional(CheckNumber, &["Check Number", "Check No", "Check #", "EFT Number"])
    .optional(PayerName, &["Payment From", "Payer", "Insurance", "Insurance Company"])
    .optional(Reference, &["Reference", "ERA Reference"])
    .optional(CheckAmount, &["Check Amount", "Check Total"])
    .required(CashApplied, &["Cash Applied", "Applied Amount", "Insurance Payment"])
    .required(Provider, &["Provider", "Provider Name", "Rendering Provider"])
    .filled_down(&[TransactionDate, PostedDate, CheckNumber, PayerName])
}

fn credit_card_payment() -> FormatDefinition {
    use CanonicalField::*;

    FormatDefinition::new(
        FormatId::CreditCardPayment,
        "Credit Card Payments",
        PaymentType::CreditCard,
        &[
            "Trans. #",
            "Trans. Date",
            "Settle Date",
            "Gross Amt",
            "Disc. Fee",
            "Per Trans. Fee",
            "Net Amt",
            "Acct Type",
            "Acct Details",
            "Trans. Type",
            "Payer Name",
            "Client Name",
            "Provider",
        ],
    )
    .optional(RowId, &["Trans. #", "Trans No", "Transaction Id"])
    .required(TransactionDate, &["Trans. Date", "Transaction Date"])
    .optional(PostedDate, &["Settle Date", "Settlement Date"])
    .required(CashApplied, &["Gross Amt", "Gross Amount"])
    .optional(FeeAmount, &["Disc. Fee", "Discount Fee", "Processing Fee"])
    .optional(NetAmount, &["Net Amt", "Net Amount"])
    .optional(CardType, &["Acct Type", "Card Type"])
    .optional(PayerName, &["Payer Name", "Cardholder"])
    .optional(PatientName, &["Client Name", "Patient Name", "Patient"])
    .required(Provider, &["Provider", "Provider Name"])
}

fn practice_expenses() -> FormatDefinition {
    use CanonicalField::*;

    FormatDefinition::new(
        FormatId::PracticeExpenses,
        "Practice Expenses",
        PaymentType::Expense,
        &["Expense Date", "Vendor", "Category", "Description", "Amount", "Office"],
    )
    .required(TransactionDate, &["Expense Date", "Date"])
    .optional(PayerName, &["Vendor", "Payee"])
    .required(Category, &["Category", "Expense Category"])
    .optional(Reference, &["Description", "Notes", "Memo"])
    .required(CashApplied, &["Amount", "Expense Amount"])
    .optional(Provider, &["Office", "Location"])
}

/// Read-only set of known formats, in registration order
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    formats: Vec<FormatDefinition>,
}

impl FormatRegistry {
    /// The built-in formats
    pub fn builtin() -> Self {
        Self {
            formats: vec![insurance_claims(), credit_card_payment(), practice_expenses()],
        }
    }

    /// The built-in formats plus the configured extra aliases
    pub fn with_config(config: &DetectionConfig) -> Self {
        let mut registry = Self::builtin();
        for extra in &config.extra_aliases {
            if let Some(format) = registry.formats.iter_mut().find(|f| f.id == extra.format_id) {
                debug!(
                    "Adding {} alias(es) for {}.{}",
                    extra.aliases.len(),
                    extra.format_id,
                    extra.field
                );
                format.add_aliases(extra.field, &extra.aliases);
            }
        }
        registry
    }

    pub fn get(&self, id: FormatId) -> Option<&FormatDefinition> {
        self.formats.iter().find(|f| f.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FormatDefinition> {
        self.formats.iter()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtraAliases;

    #[test]
    fn test_registration_order() {
        let registry = FormatRegistry::builtin();
        let ids: Vec<FormatId> = registry.iter().map(|f| f.id).collect();
        assert_eq!(
            ids,
            vec![
                FormatId::InsuranceClaims,
                FormatId::CreditCardPayment,
                FormatId::PracticeExpenses
            ]
        );
    }

    #[test]
    fn test_every_format_requires_date_and_amount() {
        for format in FormatRegistry::builtin().iter() {
            for field in CanonicalField::always_required() {
                assert!(format.is_required(*field), "{} / {}", format.id, field);
            }
        }
    }

    #[test]
    fn test_aliases_are_normalized_and_unique_per_format() {
        for format in FormatRegistry::builtin().iter() {
            let mut seen = std::collections::HashSet::new();
            for spec in &format.fields {
                for alias in &spec.aliases {
                    assert_eq!(alias, &normalize_header(alias));
                    assert!(seen.insert(alias.clone()), "{} repeats '{}'", format.id, alias);
                }
            }
        }
    }

    #[test]
    fn test_max_score() {
        let config = DetectionConfig::default();
        let registry = FormatRegistry::builtin();
        let insurance = registry.get(FormatId::InsuranceClaims).unwrap();
        // 3 required * 2.0 + 6 optional * 1.0
        assert_eq!(insurance.max_score(&config), 12.0);
    }

    #[test]
    fn test_with_config_appends_aliases() {
        let config = DetectionConfig {
            extra_aliases: vec![ExtraAliases {
                format_id: FormatId::InsuranceClaims,
                field: CanonicalField::CashApplied,
                aliases: vec!["Amount_Applied".to_string(), "Cash Applied".to_string()],
            }],
            ..Default::default()
        };
        let registry = FormatRegistry::with_config(&config);
        let spec = registry
            .get(FormatId::InsuranceClaims)
            .unwrap()
            .spec(CanonicalField::CashApplied)
            .unwrap();

        assert_eq!(spec.aliases.first().map(String::as_str), Some("cash applied"));
        assert_eq!(spec.aliases.last().map(String::as_str), Some("amount applied"));
        assert_eq!(
            spec.aliases.iter().filter(|a| *a == "cash applied").count(),
            1
        );
    }
}
