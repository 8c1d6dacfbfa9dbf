use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currencies the amount parser can attribute to an extracted figure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "GBP")]
    Gbp,
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "EUR")]
    Eur,
    #[serde(rename = "AUD")]
    Aud,
}

impl Currency {
    /// Maps a currency symbol or ISO code as it appears in interest text
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "GBP" | "£" => Some(Currency::Gbp),
            "USD" | "$" => Some(Currency::Usd),
            "EUR" | "€" => Some(Currency::Eur),
            "AUD" => Some(Currency::Aud),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Gbp => "GBP",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Aud => "AUD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One flattened interest (or child interest) plus everything later stages attach to it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InterestRow {
    pub member_id: i64,
    pub category_id: String,
    pub category_name: String,
    pub sort_order: String,
    /// Upstream id; reused across declarations, so never a key on its own
    pub interest_id: String,
    pub unique_interest_id: String,
    pub interest: String,
    pub created_when: String,
    pub last_amended_when: Option<String>,
    pub deleted_when: Option<String>,
    pub is_correction: bool,
    pub is_child_interest: bool,
    pub parent_interest: Option<String>,

    /// Working copy of `interest` after the normalizer's text edits
    pub edited_interest: Option<String>,

    pub contains_time_periods_and_prepositions: Option<bool>,
    pub contains_debt_synonym: Option<bool>,
    /// Present only for rows in an amount-bearing category
    pub amounts: Option<AmountExtraction>,

    pub payer: PayerDetails,
    /// Present only for rows in a family-member category
    pub family: Option<FamilyMemberDetails>,
    pub employment: EmploymentDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AmountExtraction {
    /// Every candidate token the money pattern matched
    pub extracted_amounts: Vec<String>,
    /// Candidates that carry a currency marker
    pub filtered_amounts: Vec<String>,
    pub has_multiple_fullstops: bool,
    /// None when the row was held back by the multiple-fullstop filter
    pub parsed: Option<ParsedAmounts>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedAmounts {
    pub split_amounts: Vec<Decimal>,
    /// Same length and order as `split_amounts`
    pub split_currencies: Vec<Option<Currency>>,
    pub max_amount: Option<Decimal>,
    pub max_amount_currency: Option<Currency>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PayerDetails {
    pub donor_name: Option<String>,
    pub donor_type: Option<String>,
    pub donor_address: Option<String>,
    pub companies_house_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FamilyMemberDetails {
    pub name: Option<String>,
    pub relationship: Option<String>,
    pub role: Option<String>,
    pub paid_by_mp_or_parliament: bool,
    pub lobbies: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmploymentDetails {
    pub employer_name: Option<String>,
    pub mp_role: Option<String>,
}

impl InterestRow {
    pub fn max_amount(&self) -> Option<Decimal> {
        self.amounts
            .as_ref()
            .and_then(|a| a.parsed.as_ref())
            .and_then(|p| p.max_amount)
    }

    pub fn max_amount_currency(&self) -> Option<Currency> {
        self.amounts
            .as_ref()
            .and_then(|a| a.parsed.as_ref())
            .and_then(|p| p.max_amount_currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_map_to_iso_codes() {
        assert_eq!(Currency::from_marker("£"), Some(Currency::Gbp));
        assert_eq!(Currency::from_marker("$"), Some(Currency::Usd));
        assert_eq!(Currency::from_marker("€"), Some(Currency::Eur));
        assert_eq!(Currency::from_marker("AUD"), Some(Currency::Aud));
        assert_eq!(Currency::from_marker("¥"), None);
        assert_eq!(Currency::Eur.to_string(), "EUR");
    }
}
