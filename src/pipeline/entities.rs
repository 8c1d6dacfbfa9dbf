use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

use crate::constants::{
    is_family_category, EMPLOYMENT_AND_EARNINGS_CATEGORY, FAMILY_LOBBYING_CATEGORY,
    FAMILY_PAID_FROM_EXPENSES_CATEGORY, OTHER_EMPLOYER_CATEGORIES,
};
use crate::error::Result;
use crate::pipeline::table::InterestTable;
use crate::types::{EmploymentDetails, FamilyMemberDetails, InterestRow, PayerDetails};

pub const PAYER_COLUMNS: &[&str] = &["donor_name", "donor_type", "donor_address", "companies_house_id"];

pub const FAMILY_COLUMNS: &[&str] = &[
    "family_member_name",
    "family_member_relationship",
    "family_member_role",
    "family_member_paid_by_mp_or_parliament",
    "family_member_lobbies",
];

pub const EMPLOYMENT_COLUMNS: &[&str] = &["employer_name", "mp_role"];

static PAYER_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:donor|payer):").unwrap());
// Value after a payer label: word characters, blanks and commas up to the end of the line
static PAYER_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ \t]?([\w \t,]+?)[ \t]*(?:\r?\n|$)").unwrap());
static DONOR_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Donor status:\s(\w+(?:[ \t]+\w+)*)[ \t]*(?:\r?\n|$)").unwrap());
static DONOR_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Address of donor:\s?([^\r\n.]*)[\r\n.]").unwrap());
static REGISTRATION_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"registration\s+(\d+)").unwrap());

static WORK_OR_SERVICES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[wW]ork or services:[ \t]*([^\r\n]*)").unwrap());

static FAMILY_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"Name:[ \t]*([^\r\n]*)").unwrap());
static FAMILY_RELATIONSHIP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Relationship:[ \t]*([^\r\n]*)").unwrap());
static FAMILY_ROLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Role:[ \t]*([^\r\n]*)").unwrap());

const ADDRESS_LABEL_PREFIX: &str = "Address of ";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct EntityReport {
    pub rows_with_payer: usize,
    pub family_rows: usize,
    pub rows_with_employer: usize,
}

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Name following the first "donor:" or "payer:" label that is not part of "Address of donor:".
///
/// The value runs to the end of its line. A name followed by ", <address>" on the
/// same line is captured whole.
pub fn payer_name(text: &str) -> Option<String> {
    PAYER_LABEL
        .find_iter(text)
        .filter(|label| !text[..label.start()].ends_with(ADDRESS_LABEL_PREFIX))
        .find_map(|label| first_capture(&PAYER_VALUE, &text[label.end()..]))
}

pub fn extract_payer(text: &str) -> PayerDetails {
    PayerDetails {
        donor_name: payer_name(text),
        donor_type: first_capture(&DONOR_STATUS, text),
        donor_address: first_capture(&DONOR_ADDRESS, text),
        companies_house_id: first_capture(&REGISTRATION_ID, text),
    }
}

/// Family details for the two family categories; the flags follow from the category alone
pub fn extract_family(category_name: &str, text: &str) -> FamilyMemberDetails {
    FamilyMemberDetails {
        name: first_capture(&FAMILY_NAME, text),
        relationship: first_capture(&FAMILY_RELATIONSHIP, text),
        role: first_capture(&FAMILY_ROLE, text),
        paid_by_mp_or_parliament: category_name == FAMILY_PAID_FROM_EXPENSES_CATEGORY,
        lobbies: category_name == FAMILY_LOBBYING_CATEGORY,
    }
}

/// Employer and role, gated on category.
///
/// "Employment and earnings" rows take the payer as employer and the role from the
/// "work or services:" label, but only when a payer was found. The directorship and
/// similar categories read "<role>, <employer>" split at the first comma.
pub fn extract_employment(category_name: &str, text: &str, donor_name: Option<&str>) -> EmploymentDetails {
    if category_name == EMPLOYMENT_AND_EARNINGS_CATEGORY {
        return match donor_name {
            Some(donor) => EmploymentDetails {
                employer_name: Some(donor.to_string()),
                mp_role: first_capture(&WORK_OR_SERVICES, text),
            },
            None => EmploymentDetails::default(),
        };
    }

    if OTHER_EMPLOYER_CATEGORIES.contains(&category_name) {
        let (role, employer) = match text.split_once(',') {
            Some((role, employer)) => (role, Some(employer)),
            None => (text, None),
        };
        return EmploymentDetails {
            employer_name: employer.map(str::trim).filter(|e| !e.is_empty()).map(str::to_string),
            mp_role: Some(role.trim().to_string()).filter(|r| !r.is_empty()),
        };
    }

    EmploymentDetails::default()
}

/// Attaches payer, family and employment details.
///
/// Payer details come from the raw `interest` text of every row. Family details
/// are computed for the family categories only and joined back by key; the
/// employment step then reads the payer name already on the row.
#[instrument(skip(table), fields(rows = table.len()))]
pub fn extract_entities(table: &mut InterestTable) -> Result<EntityReport> {
    let mut report = EntityReport::default();

    for row in table.rows_mut() {
        row.payer = extract_payer(&row.interest);
        if row.payer.donor_name.is_some() {
            report.rows_with_payer += 1;
        }
    }
    table.add_columns(PAYER_COLUMNS)?;

    let family: HashMap<String, FamilyMemberDetails> = table
        .rows()
        .iter()
        .filter(|r| is_family_category(&r.category_name))
        .map(|r| (r.unique_interest_id.clone(), extract_family(&r.category_name, &r.interest)))
        .collect();
    report.family_rows = table.merge_by_key(family, |row, details| row.family = Some(details))?;
    table.add_columns(FAMILY_COLUMNS)?;

    for row in table.rows_mut() {
        row.employment = employment_for(row);
        if row.employment.employer_name.is_some() {
            debug!("Row {} employer: {:?}", row.unique_interest_id, row.employment.employer_name);
            report.rows_with_employer += 1;
        }
    }
    table.add_columns(EMPLOYMENT_COLUMNS)?;

    info!(
        "🏷️ Entities: {} rows with a payer, {} family rows, {} rows with an employer",
        report.rows_with_payer, report.family_rows, report.rows_with_employer
    );
    Ok(report)
}

fn employment_for(row: &InterestRow) -> EmploymentDetails {
    extract_employment(&row.category_name, &row.interest, row.payer.donor_name.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DONATION: &str = "Name of donor: Acme Holdings Ltd\r\nAddress of donor: 1 High Street, London SW1A 1AA\r\nAmount of donation or nature and value if donation in kind: £5,000\r\nDonor status: company, registration 01234567\r\n(Registered 12 May 2023)";

    #[test]
    fn payer_details_from_donation_text() {
        let payer = extract_payer(DONATION);
        assert_eq!(payer.donor_name.as_deref(), Some("Acme Holdings Ltd"));
        assert_eq!(payer.donor_address.as_deref(), Some("1 High Street, London SW1A 1AA"));
        assert_eq!(payer.companies_house_id.as_deref(), Some("01234567"));
        // "company, registration ..." is not a bare status line
        assert_eq!(payer.donor_type, None);
    }

    #[test]
    fn address_label_is_not_a_payer_label() {
        let text = "Address of donor: 10 Downing Street\r\nDonor status: individual\r\n";
        let payer = extract_payer(text);
        assert_eq!(payer.donor_name, None);
        assert_eq!(payer.donor_type.as_deref(), Some("individual"));
        assert_eq!(payer.donor_address.as_deref(), Some("10 Downing Street"));
    }

    #[test]
    fn payer_label_at_end_of_text() {
        assert_eq!(payer_name("Name of payer: Jane Smith").as_deref(), Some("Jane Smith"));
        assert_eq!(payer_name("No labels here"), None);
    }

    #[test]
    fn known_limitation_captures_trailing_address() {
        let text = "Name of donor: John Doe, 4 Some Road\r\n";
        assert_eq!(payer_name(text).as_deref(), Some("John Doe, 4 Some Road"));
    }

    #[test]
    fn employment_and_earnings_uses_payer_and_work_label() {
        let text = "Payment of £1,000 from Acme Ltd\r\nWork or services: Consultant\r\nHours: 10 hrs";
        let details = extract_employment(EMPLOYMENT_AND_EARNINGS_CATEGORY, text, Some("Acme Ltd"));
        assert_eq!(details.employer_name.as_deref(), Some("Acme Ltd"));
        assert_eq!(details.mp_role.as_deref(), Some("Consultant"));

        let inline = "Received from Acme. work or services: Consultant";
        let details = extract_employment(EMPLOYMENT_AND_EARNINGS_CATEGORY, inline, Some("Acme Ltd"));
        assert_eq!(details.mp_role.as_deref(), Some("Consultant"));

        let without_payer = extract_employment(EMPLOYMENT_AND_EARNINGS_CATEGORY, text, None);
        assert_eq!(without_payer, EmploymentDetails::default());
    }

    #[test]
    fn directorships_split_on_first_comma() {
        let details = extract_employment("Category 1: Directorships", "Non-executive director, Widgets plc, Leeds", None);
        assert_eq!(details.mp_role.as_deref(), Some("Non-executive director"));
        assert_eq!(details.employer_name.as_deref(), Some("Widgets plc, Leeds"));

        let no_comma = extract_employment("Category 1: Directorships", "Trustee", None);
        assert_eq!(no_comma.mp_role.as_deref(), Some("Trustee"));
        assert_eq!(no_comma.employer_name, None);
    }

    #[test]
    fn other_categories_get_no_employment() {
        let details = extract_employment("8. Miscellaneous", "Chair, Local Trust", Some("X"));
        assert_eq!(details, EmploymentDetails::default());
    }

    #[test]
    fn family_flags_follow_category() {
        let text = "Name: Jane Doe\r\nRelationship: Spouse\r\nRole: Senior Parliamentary Assistant\r\n";
        let paid = extract_family(FAMILY_PAID_FROM_EXPENSES_CATEGORY, text);
        assert_eq!(paid.name.as_deref(), Some("Jane Doe"));
        assert_eq!(paid.relationship.as_deref(), Some("Spouse"));
        assert_eq!(paid.role.as_deref(), Some("Senior Parliamentary Assistant"));
        assert!(paid.paid_by_mp_or_parliament);
        assert!(!paid.lobbies);

        let lobbying = extract_family(FAMILY_LOBBYING_CATEGORY, "Name: Sam Doe");
        assert!(lobbying.lobbies);
        assert!(!lobbying.paid_by_mp_or_parliament);
        assert_eq!(lobbying.relationship, None);
    }

    #[test]
    fn table_stage_gates_family_details() {
        let rows = vec![
            InterestRow {
                unique_interest_id: "1-1-1".into(),
                category_name: FAMILY_PAID_FROM_EXPENSES_CATEGORY.into(),
                interest: "Name: Jane Doe\r\nRelationship: Spouse\r\n".into(),
                ..InterestRow::default()
            },
            InterestRow {
                unique_interest_id: "1-2-1".into(),
                category_name: EMPLOYMENT_AND_EARNINGS_CATEGORY.into(),
                interest: "Name of payer: Acme Ltd\r\nWork or services: Consultant\r\n".into(),
                ..InterestRow::default()
            },
        ];
        let mut table = InterestTable::new(&["unique_interest_id", "category_name", "interest"], rows).unwrap();

        let report = extract_entities(&mut table).unwrap();

        assert_eq!(report.family_rows, 1);
        assert_eq!(report.rows_with_employer, 1);
        let rows = table.rows();
        assert_eq!(rows[0].family.as_ref().and_then(|f| f.name.as_deref()), Some("Jane Doe"));
        assert!(rows[1].family.is_none());
        assert_eq!(rows[1].employment.employer_name.as_deref(), Some("Acme Ltd"));
        assert_eq!(rows[1].employment.mp_role.as_deref(), Some("Consultant"));
    }
}
