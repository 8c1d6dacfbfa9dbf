/// Fixed lookup tables used across the extraction pipeline.
///
/// Every list here is a closed set matched by exact string comparison. Supporting
/// a renamed or new upstream category, or another abbreviated amount, means adding
/// an entry to the relevant table; nothing downstream needs to change.

// Categories whose interest text states amounts plainly
pub const CATEGORIES_WITH_EASILY_EXTRACTABLE_AMOUNTS: &[&str] = &[
    "2. (a) Support linked to an MP but received by a local party organisation or indirectly via a central party organisation",
    "2. (b) Any other support not included in Category 2(a)",
    "3. Gifts, benefits and hospitality from UK sources",
    "8. Miscellaneous",
    "Category 6: Sponsorship",
    "Category 8: Gifts, benefits and hospitality",
    "Category 9: Miscellaneous financial interests",
];

// Categories whose amounts need the normalizer's text edits first.
// Extraction treats both groups identically; the split is for triage only.
pub const CATEGORIES_AMOUNTS_EXTRACTABLE_WITH_PROCESSING: &[&str] = &[
    "1. Employment and earnings",
    "4. Visits outside the UK",
    "5. Gifts and benefits from sources outside the UK",
    "Category 10: Non-financial interests (a)",
    "Category 1: Directorships",
    "Category 2: Remunerated employment, office, profession etc.",
];

pub const EMPLOYMENT_AND_EARNINGS_CATEGORY: &str = "1. Employment and earnings";

/// Categories whose text reads "<role>, <employer>"
pub const OTHER_EMPLOYER_CATEGORIES: &[&str] = &[
    "Category 2: Remunerated employment, office, profession etc.",
    "Category 10: Non-financial interests (a)",
    "Category 10: Non-financial interests (b)",
    "Category 10: Non-financial interests (c)",
    "Category 10: Non-financial interests (d)",
    "Category 10: Non-financial interests (e)",
    "Category 1: Directorships",
];

pub const FAMILY_PAID_FROM_EXPENSES_CATEGORY: &str =
    "9. Family members employed and paid from parliamentary expenses";
pub const FAMILY_LOBBYING_CATEGORY: &str =
    "10. Family members engaged in lobbying the public sector on behalf of a third party or client";

/// Known abbreviated amounts and their expanded numeric forms.
///
/// A general `\d[.,]?\d*[mMkK]` rewrite would also hit company names such as
/// "3M" and postcodes, so only these phrases are rewritten.
pub const ABBREVIATION_EXPANSIONS: &[(&str, &str)] = &[
    ("£1.2m from Lord Alli", "£1200000 from Lord Alli"),
    ("excess of £250k", "excess of £250000"),
];

/// A token must contain one of these to count as a monetary amount
pub const CURRENCY_MARKERS: &[&str] = &["£", "€", "$", "GBP", "AUD", "EUR"];

pub const TIME_PERIODS_AND_PREPOSITIONS: &[&str] = &[
    "per", "day", "month", "year", "annual", "daily", "monthly", "yearly", "annually",
];

pub const DEBT_SYNONYMS: &[&str] = &["debt", "loan", "mortgage"];

pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Returns true when the category is on either amount allow-list
pub fn has_extractable_amounts(category_name: &str) -> bool {
    CATEGORIES_WITH_EASILY_EXTRACTABLE_AMOUNTS.contains(&category_name)
        || CATEGORIES_AMOUNTS_EXTRACTABLE_WITH_PROCESSING.contains(&category_name)
}

pub fn is_family_category(category_name: &str) -> bool {
    category_name == FAMILY_PAID_FROM_EXPENSES_CATEGORY || category_name == FAMILY_LOBBYING_CATEGORY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_lists_do_not_overlap() {
        for name in CATEGORIES_WITH_EASILY_EXTRACTABLE_AMOUNTS {
            assert!(!CATEGORIES_AMOUNTS_EXTRACTABLE_WITH_PROCESSING.contains(name));
        }
    }

    #[test]
    fn category_gates_are_exact_matches() {
        assert!(has_extractable_amounts("8. Miscellaneous"));
        assert!(!has_extractable_amounts("8. miscellaneous"));
        assert!(!has_extractable_amounts("8. Miscellaneous "));
        assert!(is_family_category(FAMILY_LOBBYING_CATEGORY));
        assert!(!is_family_category(EMPLOYMENT_AND_EARNINGS_CATEGORY));
    }
}
