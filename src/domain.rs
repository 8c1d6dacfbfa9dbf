use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A Member of Parliament as held in the member directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Internal surrogate key, assigned by the store
    pub id: Option<i64>,
    /// Parliament's own identifier for the member
    pub api_id: String,
    pub name: String,
    pub gender: Option<String>,
    pub thumbnail_url: Option<String>,
    pub constituency: Option<String>,
    pub house: String,
    pub membership_start: Option<DateTime<Utc>>,
    pub membership_end: Option<DateTime<Utc>>,
    pub membership_end_reason: Option<String>,
}

/// A registered interest shaped for the `registered_interests` table.
///
/// Created once per import and never updated by the pipeline; deletions upstream
/// show up as a non-null `date_deleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedInterest {
    /// External member id; resolved against the member directory before insert
    pub member_of_parliament: String,
    pub category_id: String,
    pub category_name: String,
    pub sort_order: String,
    pub api_id: String,
    pub unique_api_generated_id: String,
    pub interest_summary: Option<String>,
    pub date_created: Option<DateTime<Utc>>,
    pub date_last_amended: Option<DateTime<Utc>>,
    pub date_deleted: Option<DateTime<Utc>>,
    pub is_correction: bool,
    pub is_child_interest: bool,
    pub contains_time_period: Option<bool>,
    pub contains_loan: Option<bool>,
    pub interest_currency: Option<String>,
    pub interest_amount: Option<Decimal>,
    pub payer: Option<String>,
    pub payer_type: Option<String>,
    pub payer_address: Option<String>,
    pub payer_companies_house_id: Option<String>,
    pub family_member_relationship: Option<String>,
    pub family_member_paid_by_mp_or_parliament: Option<bool>,
    pub family_member_name: Option<String>,
    pub family_member_role: Option<String>,
    pub role: Option<String>,
    pub parent_interest: Option<String>,
    pub employer_name: Option<String>,
}
