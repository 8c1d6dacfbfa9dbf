use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

use crate::error::{InterestsError, Result};
use crate::types::InterestRow;

/// A single value read out of a row by column name
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Integer(i64),
    Bool(bool),
    Decimal(Decimal),
    Timestamp(DateTime<Utc>),
    List(Vec<Cell>),
}

impl Cell {
    fn text(value: &str) -> Self {
        Cell::Text(value.to_string())
    }

    fn opt_text(value: Option<&String>) -> Self {
        value.map_or(Cell::Null, |v| Cell::Text(v.clone()))
    }

    fn opt_bool(value: Option<bool>) -> Self {
        value.map_or(Cell::Null, Cell::Bool)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

/// The in-memory dataset handed from stage to stage.
///
/// Rows are typed; `columns` records which logical columns the stages so far
/// have produced, under their current names. The schema mapper refuses to run
/// unless that list is exactly what it expects.
#[derive(Debug, Clone, Default)]
pub struct InterestTable {
    columns: Vec<String>,
    rows: Vec<InterestRow>,
}

impl InterestTable {
    pub fn new(columns: &[&str], rows: Vec<InterestRow>) -> Result<Self> {
        let mut table = Self {
            columns: Vec::with_capacity(columns.len()),
            rows,
        };
        table.add_columns(columns)?;
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[InterestRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [InterestRow] {
        &mut self.rows
    }

    pub fn into_rows(self) -> Vec<InterestRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn add_columns(&mut self, columns: &[&str]) -> Result<()> {
        for column in columns {
            if self.columns.iter().any(|c| c == column) {
                return Err(InterestsError::ColumnCollision(column.to_string()));
            }
            self.columns.push(column.to_string());
        }
        Ok(())
    }

    /// Appends the columns not already present, keeping existing positions
    pub fn ensure_columns(&mut self, columns: &[&str]) {
        for column in columns {
            if !self.columns.iter().any(|c| c == column) {
                self.columns.push(column.to_string());
            }
        }
    }

    /// Renames every column; two columns landing on the same name is an error
    pub fn rename_columns<F>(&mut self, rename: F) -> Result<()>
    where
        F: Fn(&str) -> String,
    {
        let renamed: Vec<String> = self.columns.iter().map(|c| rename(c.as_str())).collect();
        let mut seen = HashSet::new();
        for (original, new_name) in self.columns.iter().zip(&renamed) {
            if !seen.insert(new_name.as_str()) {
                return Err(InterestsError::ColumnCollision(format!(
                    "'{}' renames to '{}', which already exists",
                    original, new_name
                )));
            }
        }
        self.columns = renamed;
        Ok(())
    }

    /// Left-joins per-row results computed on a subset back onto the full table.
    ///
    /// Rows without a result are left untouched. A result whose key matches no row
    /// means the subset was not drawn from this table.
    pub fn merge_by_key<T, F>(&mut self, mut results: HashMap<String, T>, mut apply: F) -> Result<usize>
    where
        F: FnMut(&mut InterestRow, T),
    {
        let mut merged = 0;
        for row in &mut self.rows {
            if let Some(value) = results.remove(&row.unique_interest_id) {
                apply(row, value);
                merged += 1;
            }
        }
        if let Some(key) = results.into_keys().next() {
            return Err(InterestsError::UnknownJoinKey(key));
        }
        Ok(merged)
    }
}

impl InterestRow {
    /// Reads a column by its snake_case name
    pub fn cell(&self, column: &str) -> Result<Cell> {
        let amounts = self.amounts.as_ref();
        let parsed = amounts.and_then(|a| a.parsed.as_ref());
        let family = self.family.as_ref();

        let cell = match column {
            "member_id" => Cell::Integer(self.member_id),
            "category_id" => Cell::text(&self.category_id),
            "category_name" => Cell::text(&self.category_name),
            "sort_order" => Cell::text(&self.sort_order),
            "interest_id" => Cell::text(&self.interest_id),
            "unique_interest_id" => Cell::text(&self.unique_interest_id),
            "interest" => Cell::text(&self.interest),
            "created_when" => Cell::text(&self.created_when),
            "last_amended_when" => Cell::opt_text(self.last_amended_when.as_ref()),
            "deleted_when" => Cell::opt_text(self.deleted_when.as_ref()),
            "is_correction" => Cell::Bool(self.is_correction),
            "is_child_interest" => Cell::Bool(self.is_child_interest),
            "parent_interest" => Cell::opt_text(self.parent_interest.as_ref()),
            "edited_interest" => Cell::opt_text(self.edited_interest.as_ref()),
            "contains_time_periods_and_prepositions" => {
                Cell::opt_bool(self.contains_time_periods_and_prepositions)
            }
            "contains_debt_synonym" => Cell::opt_bool(self.contains_debt_synonym),
            "extracted_amounts" => amounts.map_or(Cell::Null, |a| text_list(&a.extracted_amounts)),
            "filtered_amounts" => amounts.map_or(Cell::Null, |a| text_list(&a.filtered_amounts)),
            "has_multiple_fullstops" => Cell::opt_bool(amounts.map(|a| a.has_multiple_fullstops)),
            "split_amounts" => parsed.map_or(Cell::Null, |p| {
                Cell::List(p.split_amounts.iter().copied().map(Cell::Decimal).collect())
            }),
            "split_currencies" => parsed.map_or(Cell::Null, |p| {
                Cell::List(
                    p.split_currencies
                        .iter()
                        .map(|c| c.map_or(Cell::Null, |c| Cell::text(c.code())))
                        .collect(),
                )
            }),
            "max_amount" => self.max_amount().map_or(Cell::Null, Cell::Decimal),
            "max_amount_currency" => self
                .max_amount_currency()
                .map_or(Cell::Null, |c| Cell::text(c.code())),
            "donor_name" => Cell::opt_text(self.payer.donor_name.as_ref()),
            "donor_type" => Cell::opt_text(self.payer.donor_type.as_ref()),
            "donor_address" => Cell::opt_text(self.payer.donor_address.as_ref()),
            "companies_house_id" => Cell::opt_text(self.payer.companies_house_id.as_ref()),
            "family_member_name" => Cell::opt_text(family.and_then(|f| f.name.as_ref())),
            "family_member_relationship" => {
                Cell::opt_text(family.and_then(|f| f.relationship.as_ref()))
            }
            "family_member_role" => Cell::opt_text(family.and_then(|f| f.role.as_ref())),
            "family_member_paid_by_mp_or_parliament" => {
                Cell::opt_bool(family.map(|f| f.paid_by_mp_or_parliament))
            }
            "family_member_lobbies" => Cell::opt_bool(family.map(|f| f.lobbies)),
            "employer_name" => Cell::opt_text(self.employment.employer_name.as_ref()),
            "mp_role" => Cell::opt_text(self.employment.mp_role.as_ref()),
            other => return Err(InterestsError::UnknownColumn(other.to_string())),
        };
        Ok(cell)
    }
}

fn text_list(values: &[String]) -> Cell {
    Cell::List(values.iter().map(|v| Cell::text(v)).collect())
}
