use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

use crate::constants::{
    has_extractable_amounts, CURRENCY_MARKERS, DEBT_SYNONYMS, TIME_PERIODS_AND_PREPOSITIONS,
};
use crate::error::Result;
use crate::metrics;
use crate::pipeline::table::InterestTable;
use crate::types::{AmountExtraction, Currency, ParsedAmounts};

pub const QUALITY_FLAG_COLUMNS: &[&str] =
    &["contains_time_periods_and_prepositions", "contains_debt_synonym"];

pub const AMOUNT_COLUMNS: &[&str] = &[
    "extracted_amounts",
    "filtered_amounts",
    "has_multiple_fullstops",
    "split_amounts",
    "split_currencies",
    "max_amount",
    "max_amount_currency",
];

// Symbol- or code-prefixed/suffixed numbers with separators, pence and k/m suffixes.
// Also matches plenty of bare numbers; the currency filter removes those.
static MONEY_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[£$€]?\d+(?:[,.]\d{1,3})*(?:\.\d{2})?[kKmM]?(?: ?[A-Z]{2,3})?|[A-Z]{2,3} ?[£$€]?\d+(?:[,.]\d{3})*(?:\.\d{2})?",
    )
    .unwrap()
});

static AMOUNT_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:,\d{3})*(?:\.\d+)?").unwrap());

static CURRENCY_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"AUD|USD|GBP|EUR|£|\$|€").unwrap());

static TIME_PERIOD: Lazy<Regex> = Lazy::new(|| whole_word_pattern(TIME_PERIODS_AND_PREPOSITIONS));

static DEBT_SYNONYM: Lazy<Regex> = Lazy::new(|| whole_word_pattern(DEBT_SYNONYMS));

fn whole_word_pattern(words: &[&str]) -> Regex {
    let alternatives: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).unwrap()
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MonetaryReport {
    /// Rows in an amount-bearing category
    pub rows_considered: usize,
    /// Rows that ended up with a representative amount
    pub rows_with_amounts: usize,
    /// Rows flagged and held back by the multiple-fullstop filter
    pub multiple_fullstop_rows: usize,
    /// Tokens that could not be parsed and were skipped
    pub skipped_tokens: usize,
}

pub fn mentions_time_period(text: &str) -> bool {
    TIME_PERIOD.is_match(text)
}

pub fn mentions_debt(text: &str) -> bool {
    DEBT_SYNONYM.is_match(text)
}

/// Every candidate money token in text order
pub fn tokenize_amounts(text: &str) -> Vec<String> {
    MONEY_TOKEN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Keeps the tokens that carry a currency symbol or code
pub fn filter_currency(tokens: &[String]) -> Vec<String> {
    tokens
        .iter()
        .filter(|t| CURRENCY_MARKERS.iter().any(|marker| t.contains(marker)))
        .cloned()
        .collect()
}

/// A token with two or more '.' is almost certainly a date or reference, not money
pub fn has_multiple_fullstops(tokens: &[String]) -> bool {
    tokens.iter().any(|t| t.matches('.').count() > 1)
}

/// Splits each token into (amount, currency) pairs and picks the largest amount.
///
/// Amounts and currency markers inside a token are paired by position; an
/// amount without a marker at its index gets no currency. Ties keep the first
/// amount seen. A token that fails to parse is logged and skipped.
pub fn parse_amounts(tokens: &[String], skipped: &mut usize) -> ParsedAmounts {
    let mut pairs: Vec<(Decimal, Option<Currency>)> = Vec::new();

    for token in tokens.iter().filter(|t| !t.is_empty()) {
        match parse_token(token) {
            Ok(token_pairs) => pairs.extend(token_pairs),
            Err(e) => {
                warn!("Skipping amount token '{}': {}", token, e);
                *skipped += 1;
            }
        }
    }

    let mut max: Option<(Decimal, Option<Currency>)> = None;
    for &(amount, currency) in &pairs {
        match max {
            Some((current, _)) if amount <= current => {}
            _ => max = Some((amount, currency)),
        }
    }

    ParsedAmounts {
        split_amounts: pairs.iter().map(|(a, _)| *a).collect(),
        split_currencies: pairs.iter().map(|(_, c)| *c).collect(),
        max_amount: max.map(|(a, _)| a),
        max_amount_currency: max.and_then(|(_, c)| c),
    }
}

fn parse_token(token: &str) -> std::result::Result<Vec<(Decimal, Option<Currency>)>, rust_decimal::Error> {
    let currencies: Vec<Option<Currency>> = CURRENCY_MARKER
        .find_iter(token)
        .map(|m| Currency::from_marker(m.as_str()))
        .collect();

    let mut pairs = Vec::new();
    for (i, m) in AMOUNT_DIGITS.find_iter(token).enumerate() {
        let amount = Decimal::from_str(&m.as_str().replace(',', ""))?;
        pairs.push((amount, currencies.get(i).copied().flatten()));
    }
    Ok(pairs)
}

/// Runs the whole extraction for one piece of (already normalized) text
pub fn extract_amounts(text: &str, skipped: &mut usize) -> AmountExtraction {
    let extracted_amounts = tokenize_amounts(text);
    let filtered_amounts = filter_currency(&extracted_amounts);
    let has_multiple_fullstops = has_multiple_fullstops(&filtered_amounts);
    let parsed = if has_multiple_fullstops {
        None
    } else {
        Some(parse_amounts(&filtered_amounts, skipped))
    };

    AmountExtraction {
        extracted_amounts,
        filtered_amounts,
        has_multiple_fullstops,
        parsed,
    }
}

/// Sets the quality flags on every row and extracts amounts for allow-listed categories.
///
/// Rows outside the allow-list keep `amounts == None`. Rows whose currency tokens
/// contain a multi-fullstop token are flagged and get no parsed amounts.
#[instrument(skip(table), fields(rows = table.len()))]
pub fn extract_monetary(table: &mut InterestTable) -> Result<MonetaryReport> {
    let mut report = MonetaryReport::default();

    for row in table.rows_mut() {
        row.contains_time_periods_and_prepositions = Some(mentions_time_period(&row.interest));
        row.contains_debt_synonym = Some(mentions_debt(&row.interest));
    }
    table.ensure_columns(QUALITY_FLAG_COLUMNS);

    let mut results = HashMap::new();
    for row in table.rows().iter().filter(|r| has_extractable_amounts(&r.category_name)) {
        report.rows_considered += 1;
        let text = row.edited_interest.as_deref().unwrap_or(&row.interest);
        let extraction = extract_amounts(text, &mut report.skipped_tokens);

        if extraction.has_multiple_fullstops {
            warn!(
                "Row {} has an amount token with multiple full stops; amounts not parsed: {:?}",
                row.unique_interest_id, extraction.filtered_amounts
            );
            report.multiple_fullstop_rows += 1;
        } else if extraction.parsed.as_ref().and_then(|p| p.max_amount).is_some() {
            report.rows_with_amounts += 1;
        }
        debug!("Row {} amount tokens: {:?}", row.unique_interest_id, extraction.filtered_amounts);
        results.insert(row.unique_interest_id.clone(), extraction);
    }

    table.merge_by_key(results, |row, extraction| row.amounts = Some(extraction))?;
    table.ensure_columns(AMOUNT_COLUMNS);

    metrics::record_amounts_extracted(report.rows_with_amounts);
    metrics::record_multiple_fullstop_rows(report.multiple_fullstop_rows);
    info!(
        "💷 Extracted amounts for {} of {} eligible rows ({} held back for multiple full stops)",
        report.rows_with_amounts, report.rows_considered, report.multiple_fullstop_rows
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize::expand_abbreviations;
    use crate::types::InterestRow;
    use rust_decimal::prelude::FromPrimitive;

    fn dec(value: i64) -> Decimal {
        Decimal::from_i64(value).unwrap()
    }

    fn extract(text: &str) -> AmountExtraction {
        let mut skipped = 0;
        extract_amounts(text, &mut skipped)
    }

    #[test]
    fn expanded_lord_alli_gift() {
        let (text, _) = expand_abbreviations("Gift: £1.2m from Lord Alli");
        let result = extract(&text);
        let parsed = result.parsed.unwrap();
        assert_eq!(parsed.max_amount, Some(dec(1_200_000)));
        assert_eq!(parsed.max_amount_currency, Some(Currency::Gbp));
    }

    #[test]
    fn expanded_250k() {
        let (text, _) = expand_abbreviations("Payments in excess of £250k");
        assert_eq!(text, "Payments in excess of £250000");
        let result = extract(&text);
        assert_eq!(result.filtered_amounts, vec!["£250000".to_string()]);
        let parsed = result.parsed.unwrap();
        assert_eq!(parsed.max_amount, Some(dec(250_000)));
        assert_eq!(parsed.max_amount_currency, Some(Currency::Gbp));
    }

    #[test]
    fn bare_numbers_are_filtered_out() {
        let result = extract("Received on 12 March 2023 a payment of £1,500.50 for 3 hours");
        assert_eq!(result.filtered_amounts, vec!["£1,500.50".to_string()]);
        assert!(result.extracted_amounts.len() > 1);
        let parsed = result.parsed.unwrap();
        assert_eq!(parsed.max_amount, Some(Decimal::from_str("1500.50").unwrap()));
    }

    #[test]
    fn code_prefixed_and_symbol_currencies() {
        let result = extract("Fee of USD 2,000 plus €300 and AUD 450");
        let parsed = result.parsed.unwrap();
        assert_eq!(parsed.split_amounts, vec![dec(2000), dec(300), dec(450)]);
        assert_eq!(
            parsed.split_currencies,
            vec![Some(Currency::Usd), Some(Currency::Eur), Some(Currency::Aud)]
        );
        assert_eq!(parsed.max_amount_currency, Some(Currency::Usd));
    }

    #[test]
    fn ties_keep_first_occurrence() {
        let result = extract("$500 from one and £500 from another");
        let parsed = result.parsed.unwrap();
        assert_eq!(parsed.max_amount, Some(dec(500)));
        assert_eq!(parsed.max_amount_currency, Some(Currency::Usd));
    }

    #[test]
    fn multiple_fullstops_hold_back_the_row() {
        let result = extract("Visit on £12.03.2023 valued at £800");
        assert!(result.has_multiple_fullstops);
        assert!(result.parsed.is_none());
        assert!(!result.filtered_amounts.is_empty());
    }

    #[test]
    fn unparseable_token_is_skipped() {
        let huge = format!("£{}", "9".repeat(40));
        let mut skipped = 0;
        let parsed = parse_amounts(&[huge, "£75".to_string()], &mut skipped);
        assert_eq!(skipped, 1);
        assert_eq!(parsed.split_amounts, vec![dec(75)]);
        assert_eq!(parsed.max_amount, Some(dec(75)));
    }

    #[test]
    fn rerunning_on_edited_text_keeps_max_amount() {
        let text = "Donation of £1.2m from Lord Alli and £2,500 in kind";
        let rows = vec![InterestRow {
            unique_interest_id: "1-1-1".into(),
            category_name: "3. Gifts, benefits and hospitality from UK sources".into(),
            interest: text.into(),
            edited_interest: Some(expand_abbreviations(text).0),
            ..InterestRow::default()
        }];
        let mut table = InterestTable::new(&["unique_interest_id", "category_name"], rows).unwrap();

        extract_monetary(&mut table).unwrap();
        let first = (table.rows()[0].max_amount(), table.rows()[0].max_amount_currency());
        let columns = table.columns().to_vec();

        extract_monetary(&mut table).unwrap();
        let second = (table.rows()[0].max_amount(), table.rows()[0].max_amount_currency());

        assert_eq!(first, (Some(dec(1_200_000)), Some(Currency::Gbp)));
        assert_eq!(first, second);
        assert_eq!(table.columns(), columns.as_slice());
    }

    #[test]
    fn quality_flags_match_whole_words_only() {
        assert!(mentions_time_period("£500 per month"));
        assert!(mentions_time_period("ANNUAL fee"));
        assert!(!mentions_time_period("Perrier water, Dayton Ohio"));
        assert!(mentions_debt("Mortgage with Bank"));
        assert!(!mentions_debt("loaned equipment"));
    }

    #[test]
    fn only_allow_listed_rows_get_amounts() {
        let rows = vec![
            InterestRow {
                unique_interest_id: "1-1-1".into(),
                category_name: "3. Gifts, benefits and hospitality from UK sources".into(),
                interest: "Tickets worth £450 per day".into(),
                edited_interest: Some("Tickets worth £450 per day".into()),
                ..InterestRow::default()
            },
            InterestRow {
                unique_interest_id: "1-2-1".into(),
                category_name: "7. (i) Shareholdings: over 15% of issued share capital".into(),
                interest: "Shares worth £90,000; loan outstanding".into(),
                edited_interest: Some("Shares worth £90,000; loan outstanding".into()),
                ..InterestRow::default()
            },
        ];
        let mut table = InterestTable::new(&["unique_interest_id", "category_name"], rows).unwrap();

        let report = extract_monetary(&mut table).unwrap();

        assert_eq!(report.rows_considered, 1);
        assert_eq!(report.rows_with_amounts, 1);
        let rows = table.rows();
        assert_eq!(rows[0].max_amount(), Some(dec(450)));
        assert_eq!(rows[0].contains_time_periods_and_prepositions, Some(true));
        assert!(rows[1].amounts.is_none());
        assert_eq!(rows[1].contains_debt_synonym, Some(true));
        assert!(table.columns().iter().any(|c| c == "max_amount_currency"));
    }
}
