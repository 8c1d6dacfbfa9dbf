use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::constants::{has_extractable_amounts, ABBREVIATION_EXPANSIONS};
use crate::error::{InterestsError, Result};
use crate::pipeline::table::InterestTable;

static REGISTRATION_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(registration)\s+(\d+)").unwrap());

#[derive(Debug, Default)]
pub struct NormalizeReport {
    /// Rows whose working text had at least one abbreviation expanded
    pub rows_expanded: usize,
    /// Abbreviation phrases that occurred nowhere in the batch
    pub missing_phrases: Vec<&'static str>,
}

/// `createdWhen` -> `created_when`: underscore before every interior uppercase letter, then lowercase
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.extend(ch.to_lowercase());
    }
    out
}

/// Joins "registration 123" into "registration123" so amount tokenizing cannot read the id as money
pub fn collapse_registration_numbers(text: &str) -> String {
    REGISTRATION_NUMBER.replace_all(text, "${1}${2}").into_owned()
}

/// Rewrites the known abbreviated amounts; returns the new text and whether anything changed
pub fn expand_abbreviations(text: &str) -> (String, bool) {
    let mut out = text.to_string();
    let mut changed = false;
    for (abbreviated, expanded) in ABBREVIATION_EXPANSIONS {
        if out.contains(abbreviated) {
            out = out.replace(abbreviated, expanded);
            changed = true;
        }
    }
    (out, changed)
}

/// Renames columns to snake_case and fills `edited_interest` for every row.
///
/// The raw `interest` text is left as it was. When no abbreviation phrase occurs
/// in any amount-bearing row the input has probably drifted; with `strict` set
/// this is an error, otherwise a warning.
#[instrument(skip(table), fields(rows = table.len()))]
pub fn normalize(table: &mut InterestTable, strict: bool) -> Result<NormalizeReport> {
    table.rename_columns(to_snake_case)?;

    let mut seen = vec![false; ABBREVIATION_EXPANSIONS.len()];
    let mut report = NormalizeReport::default();

    for row in table.rows_mut() {
        let collapsed = collapse_registration_numbers(&row.interest);
        // only rows that feed amount extraction count towards the drift check
        if has_extractable_amounts(&row.category_name) {
            for (i, (abbreviated, _)) in ABBREVIATION_EXPANSIONS.iter().enumerate() {
                if collapsed.contains(abbreviated) {
                    seen[i] = true;
                }
            }
        }
        let (edited, changed) = expand_abbreviations(&collapsed);
        if changed {
            report.rows_expanded += 1;
        }
        row.edited_interest = Some(edited);
    }

    report.missing_phrases = ABBREVIATION_EXPANSIONS
        .iter()
        .zip(&seen)
        .filter(|(_, seen)| !**seen)
        .map(|((abbreviated, _), _)| *abbreviated)
        .collect();

    for phrase in &report.missing_phrases {
        warn!("Abbreviation phrase '{}' not found in this batch", phrase);
    }

    if report.missing_phrases.len() == ABBREVIATION_EXPANSIONS.len() {
        let message = "none of the known abbreviated amounts occur in the batch; upstream text may have changed".to_string();
        if strict {
            return Err(InterestsError::InputDrift(message));
        }
        warn!("{}", message);
    }

    table.add_columns(&["edited_interest"])?;
    info!("✏️ Normalized {} rows ({} with expanded amounts)", table.len(), report.rows_expanded);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::flatten::FLATTENED_COLUMNS;
    use crate::types::InterestRow;

    fn table_in(category: &str, texts: &[&str]) -> InterestTable {
        let rows = texts
            .iter()
            .enumerate()
            .map(|(i, t)| InterestRow {
                unique_interest_id: format!("1-{}-1", i),
                category_name: category.to_string(),
                interest: t.to_string(),
                ..InterestRow::default()
            })
            .collect();
        InterestTable::new(FLATTENED_COLUMNS, rows).unwrap()
    }

    fn table(texts: &[&str]) -> InterestTable {
        table_in("8. Miscellaneous", texts)
    }

    #[test]
    fn snake_case_conversion() {
        assert_eq!(to_snake_case("memberId"), "member_id");
        assert_eq!(to_snake_case("isChildInterest"), "is_child_interest");
        assert_eq!(to_snake_case("interest"), "interest");
        assert_eq!(to_snake_case("Leading"), "leading");
    }

    #[test]
    fn registration_whitespace_is_collapsed() {
        assert_eq!(
            collapse_registration_numbers("Company REGISTRATION   0123 and registration\t99"),
            "Company REGISTRATION0123 and registration99"
        );
        assert_eq!(collapse_registration_numbers("registration pending"), "registration pending");
    }

    #[test]
    fn both_abbreviations_expand() {
        assert_eq!(
            expand_abbreviations("Gift: £1.2m from Lord Alli").0,
            "Gift: £1200000 from Lord Alli"
        );
        assert_eq!(expand_abbreviations("excess of £250k").0, "excess of £250000");
        assert!(!expand_abbreviations("3M plc, SW1A 1AA").1);
    }

    #[test]
    fn original_text_is_preserved() {
        let mut t = table(&["Gift: £1.2m from Lord Alli", "Company registration 555"]);
        let report = normalize(&mut t, true).unwrap();

        assert_eq!(report.rows_expanded, 1);
        assert_eq!(report.missing_phrases, vec!["excess of £250k"]);
        assert_eq!(t.rows()[0].interest, "Gift: £1.2m from Lord Alli");
        assert_eq!(t.rows()[0].edited_interest.as_deref(), Some("Gift: £1200000 from Lord Alli"));
        assert_eq!(t.rows()[1].edited_interest.as_deref(), Some("Company registration555"));
        assert_eq!(t.columns()[0], "member_id");
        assert_eq!(t.columns().last().map(String::as_str), Some("edited_interest"));
    }

    #[test]
    fn batch_without_any_phrase_is_drift() {
        let mut t = table(&["£500 from A", "£20 from B"]);
        assert!(matches!(normalize(&mut t, true), Err(InterestsError::InputDrift(_))));

        let mut t = table(&["£500 from A"]);
        let report = normalize(&mut t, false).unwrap();
        assert_eq!(report.missing_phrases.len(), 2);
    }

    #[test]
    fn phrases_outside_amount_categories_do_not_satisfy_drift_check() {
        let mut t = table_in("6. Land and property portfolio", &["Gift: £1.2m from Lord Alli"]);
        assert!(matches!(normalize(&mut t, true), Err(InterestsError::InputDrift(_))));

        let mut t = table_in("6. Land and property portfolio", &["Gift: £1.2m from Lord Alli"]);
        let report = normalize(&mut t, false).unwrap();
        assert_eq!(report.missing_phrases.len(), 2);
        // the text is still expanded for every row
        assert_eq!(t.rows()[0].edited_interest.as_deref(), Some("Gift: £1200000 from Lord Alli"));
    }
}
