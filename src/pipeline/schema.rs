use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

use crate::domain::PersistedInterest;
use crate::error::{InterestsError, Result};
use crate::pipeline::table::{Cell, InterestTable};
use crate::types::InterestRow;

/// The working columns, in order, that the stages must have produced before mapping
pub const EXPECTED_COLUMNS: &[&str] = &[
    "member_id",
    "category_id",
    "category_name",
    "sort_order",
    "interest_id",
    "unique_interest_id",
    "interest",
    "created_when",
    "last_amended_when",
    "deleted_when",
    "is_correction",
    "is_child_interest",
    "parent_interest",
    "edited_interest",
    "contains_time_periods_and_prepositions",
    "contains_debt_synonym",
    "extracted_amounts",
    "filtered_amounts",
    "has_multiple_fullstops",
    "split_amounts",
    "split_currencies",
    "max_amount",
    "max_amount_currency",
    "donor_name",
    "donor_type",
    "donor_address",
    "companies_house_id",
    "family_member_name",
    "family_member_relationship",
    "family_member_role",
    "family_member_paid_by_mp_or_parliament",
    "family_member_lobbies",
    "employer_name",
    "mp_role",
];

/// Working column -> persisted field. Columns not listed here are not persisted.
pub const SCHEMA_MAPPING: &[(&str, &str)] = &[
    ("member_id", "member_of_parliament"),
    ("category_id", "category_id"),
    ("category_name", "category_name"),
    ("sort_order", "sort_order"),
    ("interest_id", "api_id"),
    ("unique_interest_id", "unique_api_generated_id"),
    ("interest", "interest_summary"),
    ("created_when", "date_created"),
    ("last_amended_when", "date_last_amended"),
    ("deleted_when", "date_deleted"),
    ("is_correction", "is_correction"),
    ("is_child_interest", "is_child_interest"),
    ("contains_time_periods_and_prepositions", "contains_time_period"),
    ("contains_debt_synonym", "contains_loan"),
    ("max_amount_currency", "interest_currency"),
    ("max_amount", "interest_amount"),
    ("donor_name", "payer"),
    ("donor_type", "payer_type"),
    ("donor_address", "payer_address"),
    ("companies_house_id", "payer_companies_house_id"),
    ("family_member_relationship", "family_member_relationship"),
    ("family_member_paid_by_mp_or_parliament", "family_member_paid_by_mp_or_parliament"),
    ("family_member_name", "family_member_name"),
    ("family_member_role", "family_member_role"),
    ("mp_role", "role"),
    ("parent_interest", "parent_interest"),
    ("employer_name", "employer_name"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `None` means unbounded
    Text { max_len: Option<usize> },
    Timestamp,
    Bool,
    /// Fixed-point with this many decimal places
    Decimal { scale: u32 },
    /// External member id
    MemberRef,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn text(name: &'static str, max_len: usize) -> FieldSpec {
    FieldSpec { name, kind: FieldKind::Text { max_len: Some(max_len) } }
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

/// Declared kind of every persisted field
pub const FIELD_SPECS: &[FieldSpec] = &[
    field("member_of_parliament", FieldKind::MemberRef),
    text("category_id", 255),
    text("category_name", 255),
    text("sort_order", 255),
    text("api_id", 255),
    text("unique_api_generated_id", 255),
    field("interest_summary", FieldKind::Text { max_len: None }),
    field("date_created", FieldKind::Timestamp),
    field("date_last_amended", FieldKind::Timestamp),
    field("date_deleted", FieldKind::Timestamp),
    field("is_correction", FieldKind::Bool),
    field("is_child_interest", FieldKind::Bool),
    field("contains_time_period", FieldKind::Bool),
    field("contains_loan", FieldKind::Bool),
    text("interest_currency", 50),
    field("interest_amount", FieldKind::Decimal { scale: 2 }),
    text("payer", 255),
    text("payer_type", 255),
    field("payer_address", FieldKind::Text { max_len: None }),
    text("payer_companies_house_id", 10),
    text("family_member_relationship", 255),
    field("family_member_paid_by_mp_or_parliament", FieldKind::Bool),
    text("family_member_name", 255),
    text("family_member_role", 255),
    text("role", 255),
    text("parent_interest", 25),
    text("employer_name", 255),
];

pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    FIELD_SPECS.iter().find(|spec| spec.name == name)
}

#[derive(Debug, Default)]
pub struct MappedInterests {
    pub records: Vec<PersistedInterest>,
    pub truncated_values: usize,
    pub unparseable_timestamps: usize,
}

/// Refuses to map unless the working columns are exactly the expected ones, in order
pub fn validate_columns(columns: &[String]) -> Result<()> {
    if columns.iter().map(String::as_str).ne(EXPECTED_COLUMNS.iter().copied()) {
        return Err(InterestsError::ColumnMismatch {
            expected: EXPECTED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            actual: columns.to_vec(),
        });
    }
    Ok(())
}

/// Parses the timestamp shapes the API emits, with sub-seconds dropped.
///
/// Naive values are taken as UTC and offset values converted to UTC. Anything
/// unparseable gives None.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let parsed = DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z")
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        })?;

    parsed.with_nanosecond(0)
}

/// Cuts a string down to `max_len` characters
pub fn truncate_chars(value: &str, max_len: usize) -> Option<String> {
    if value.chars().count() > max_len {
        Some(value.chars().take(max_len).collect())
    } else {
        None
    }
}

/// Renames one row's cells to persisted field names and applies each field's coercion
pub fn map_row(row: &InterestRow, mapped: &mut MappedInterests) -> Result<PersistedInterest> {
    let mut fields: BTreeMap<&'static str, Cell> = BTreeMap::new();

    for (source, target) in SCHEMA_MAPPING {
        let cell = row.cell(source)?;
        let spec = field_spec(target).ok_or_else(|| InterestsError::UnknownColumn(target.to_string()))?;
        let cell = coerce(cell, spec, mapped);
        if fields.insert(*target, cell).is_some() {
            return Err(InterestsError::ColumnCollision(target.to_string()));
        }
    }

    let record = PersistedInterest {
        member_of_parliament: take_member(&mut fields)?,
        category_id: take_text(&mut fields, "category_id")?,
        category_name: take_text(&mut fields, "category_name")?,
        sort_order: take_text(&mut fields, "sort_order")?,
        api_id: take_text(&mut fields, "api_id")?,
        unique_api_generated_id: take_text(&mut fields, "unique_api_generated_id")?,
        interest_summary: take_opt_text(&mut fields, "interest_summary")?,
        date_created: take_timestamp(&mut fields, "date_created")?,
        date_last_amended: take_timestamp(&mut fields, "date_last_amended")?,
        date_deleted: take_timestamp(&mut fields, "date_deleted")?,
        is_correction: take_bool(&mut fields, "is_correction")?,
        is_child_interest: take_bool(&mut fields, "is_child_interest")?,
        contains_time_period: take_opt_bool(&mut fields, "contains_time_period")?,
        contains_loan: take_opt_bool(&mut fields, "contains_loan")?,
        interest_currency: take_opt_text(&mut fields, "interest_currency")?,
        interest_amount: take_decimal(&mut fields, "interest_amount")?,
        payer: take_opt_text(&mut fields, "payer")?,
        payer_type: take_opt_text(&mut fields, "payer_type")?,
        payer_address: take_opt_text(&mut fields, "payer_address")?,
        payer_companies_house_id: take_opt_text(&mut fields, "payer_companies_house_id")?,
        family_member_relationship: take_opt_text(&mut fields, "family_member_relationship")?,
        family_member_paid_by_mp_or_parliament: take_opt_bool(
            &mut fields,
            "family_member_paid_by_mp_or_parliament",
        )?,
        family_member_name: take_opt_text(&mut fields, "family_member_name")?,
        family_member_role: take_opt_text(&mut fields, "family_member_role")?,
        role: take_opt_text(&mut fields, "role")?,
        parent_interest: take_opt_text(&mut fields, "parent_interest")?,
        employer_name: take_opt_text(&mut fields, "employer_name")?,
    };

    if let Some(leftover) = fields.keys().next() {
        return Err(InterestsError::UnknownColumn(leftover.to_string()));
    }
    Ok(record)
}

/// Validates the column set, then maps every row
#[instrument(skip(table), fields(rows = table.len()))]
pub fn map_interests(table: &InterestTable) -> Result<MappedInterests> {
    validate_columns(table.columns())?;

    let mut mapped = MappedInterests::default();
    let mut records = Vec::with_capacity(table.len());
    for row in table.rows() {
        records.push(map_row(row, &mut mapped)?);
    }
    mapped.records = records;

    info!(
        "🗂️ Mapped {} records ({} values truncated, {} unparseable timestamps)",
        mapped.records.len(),
        mapped.truncated_values,
        mapped.unparseable_timestamps
    );
    Ok(mapped)
}

fn coerce(cell: Cell, spec: &FieldSpec, mapped: &mut MappedInterests) -> Cell {
    match (spec.kind, cell) {
        (FieldKind::Timestamp, Cell::Text(raw)) => match parse_timestamp(&raw) {
            Some(ts) => Cell::Timestamp(ts),
            None => {
                debug!("Unparseable timestamp for {}: '{}'", spec.name, raw);
                mapped.unparseable_timestamps += 1;
                Cell::Null
            }
        },
        (FieldKind::Text { max_len: Some(max) }, Cell::Text(value)) => match truncate_chars(&value, max) {
            Some(cut) => {
                debug!("Truncated {} to {} characters", spec.name, max);
                mapped.truncated_values += 1;
                Cell::Text(cut)
            }
            None => Cell::Text(value),
        },
        (FieldKind::Decimal { scale }, Cell::Decimal(amount)) => Cell::Decimal(amount.round_dp(scale)),
        (_, cell) => cell,
    }
}

fn mistyped(field: &str, cell: &Cell) -> InterestsError {
    InterestsError::MissingField(format!("{} has an unexpected value: {:?}", field, cell))
}

fn take(fields: &mut BTreeMap<&'static str, Cell>, field: &str) -> Result<Cell> {
    fields
        .remove(field)
        .ok_or_else(|| InterestsError::MissingField(field.to_string()))
}

fn take_member(fields: &mut BTreeMap<&'static str, Cell>) -> Result<String> {
    match take(fields, "member_of_parliament")? {
        Cell::Integer(id) => Ok(id.to_string()),
        Cell::Text(id) => Ok(id),
        other => Err(mistyped("member_of_parliament", &other)),
    }
}

fn take_text(fields: &mut BTreeMap<&'static str, Cell>, field: &str) -> Result<String> {
    match take(fields, field)? {
        Cell::Text(value) => Ok(value),
        other => Err(mistyped(field, &other)),
    }
}

fn take_opt_text(fields: &mut BTreeMap<&'static str, Cell>, field: &str) -> Result<Option<String>> {
    match take(fields, field)? {
        Cell::Null => Ok(None),
        Cell::Text(value) => Ok(Some(value)),
        other => Err(mistyped(field, &other)),
    }
}

fn take_bool(fields: &mut BTreeMap<&'static str, Cell>, field: &str) -> Result<bool> {
    match take(fields, field)? {
        Cell::Bool(value) => Ok(value),
        other => Err(mistyped(field, &other)),
    }
}

fn take_opt_bool(fields: &mut BTreeMap<&'static str, Cell>, field: &str) -> Result<Option<bool>> {
    match take(fields, field)? {
        Cell::Null => Ok(None),
        Cell::Bool(value) => Ok(Some(value)),
        other => Err(mistyped(field, &other)),
    }
}

fn take_timestamp(fields: &mut BTreeMap<&'static str, Cell>, field: &str) -> Result<Option<DateTime<Utc>>> {
    match take(fields, field)? {
        Cell::Null => Ok(None),
        Cell::Timestamp(ts) => Ok(Some(ts)),
        other => Err(mistyped(field, &other)),
    }
}

fn take_decimal(fields: &mut BTreeMap<&'static str, Cell>, field: &str) -> Result<Option<Decimal>> {
    match take(fields, field)? {
        Cell::Null => Ok(None),
        Cell::Decimal(amount) => Ok(Some(amount)),
        other => Err(mistyped(field, &other)),
    }
}
