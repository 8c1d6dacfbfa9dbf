use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

use crate::error::{InterestsError, Result};
use crate::pipeline::table::InterestTable;
use crate::types::InterestRow;

/// Column names as the Registered Interests API spells them
pub const FLATTENED_COLUMNS: &[&str] = &[
    "memberId",
    "categoryId",
    "categoryName",
    "sortOrder",
    "interestId",
    "uniqueInterestId",
    "interest",
    "createdWhen",
    "lastAmendedWhen",
    "deletedWhen",
    "isCorrection",
    "isChildInterest",
    "parentInterest",
];

static MEMBER_HREF: Lazy<Regex> = Lazy::new(|| Regex::new(r"/Members/(\d+)/").unwrap());

/// Counts how often each (member, interest id, child?) triple has been seen.
///
/// Upstream interest ids repeat across declarations and category pulls, so the
/// running count is what makes the generated key unique. One counter spans the
/// whole input; it is never reset between members or categories.
#[derive(Debug, Default)]
pub struct OccurrenceCounter {
    counts: HashMap<(i64, String, bool), u32>,
}

impl OccurrenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one more occurrence and returns its 1-based ordinal
    pub fn next(&mut self, member_id: i64, interest_id: &str, is_child: bool) -> u32 {
        let count = self
            .counts
            .entry((member_id, interest_id.to_string(), is_child))
            .or_insert(0);
        *count += 1;
        *count
    }
}

#[derive(Debug)]
pub struct FlattenOutput {
    pub table: InterestTable,
    pub members_read: usize,
    pub members_skipped: usize,
    /// Row- and member-level data errors, for the run's error log
    pub errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryEntry {
    id: Value,
    name: String,
    #[serde(default)]
    sort_order: Value,
    #[serde(default)]
    interests: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InterestEntry {
    id: Value,
    interest: String,
    created_when: String,
    #[serde(default)]
    last_amended_when: Option<String>,
    #[serde(default)]
    deleted_when: Option<String>,
    #[serde(default)]
    is_correction: Option<bool>,
    #[serde(default)]
    child_interests: Vec<Value>,
}

/// Category fields copied onto every row beneath it
struct CategoryContext<'a> {
    member_id: i64,
    category_id: String,
    category_name: &'a str,
    sort_order: String,
}

/// Derives the member id from the member object's `links` array.
///
/// The id comes from the `self` link whose href contains `/Members/<id>/`.
pub fn extract_member_id(links: Option<&Value>) -> Result<i64> {
    let links = match links {
        Some(Value::Array(links)) => links,
        Some(_) => return Err(InterestsError::InvalidLinks("links is not a list".to_string())),
        None => return Err(InterestsError::InvalidLinks("links is absent".to_string())),
    };

    for link in links {
        let (rel, href) = match (link.get("rel"), link.get("href")) {
            (Some(Value::String(rel)), Some(Value::String(href))) => (rel, href),
            _ => {
                return Err(InterestsError::InvalidLinks(
                    "each link must be an object with string 'rel' and 'href'".to_string(),
                ))
            }
        };
        if rel == "self" {
            if let Some(caps) = MEMBER_HREF.captures(href) {
                return caps[1].parse::<i64>().map_err(|_| {
                    InterestsError::InvalidLinks(format!("member id out of range in '{}'", href))
                });
            }
        }
    }

    Err(InterestsError::InvalidLinks(
        "no self link referencing /Members/<id>/".to_string(),
    ))
}

/// Unpacks member objects into one row per interest and per (nested) child interest
#[instrument(skip(members), fields(members = members.len()))]
pub fn flatten_interests(members: &[Value]) -> Result<FlattenOutput> {
    let mut counter = OccurrenceCounter::new();
    let mut rows = Vec::new();
    let mut errors = Vec::new();
    let mut members_skipped = 0;

    for (position, member) in members.iter().enumerate() {
        let member_id = match extract_member_id(member.get("links")) {
            Ok(id) => id,
            Err(e) => {
                let message = format!("Member object {}: {}; its interests were excluded", position, e);
                warn!("{}", message);
                errors.push(message);
                members_skipped += 1;
                continue;
            }
        };

        let categories = match member.get("value") {
            Some(Value::Array(categories)) => categories,
            _ => {
                let message = format!("Member {}: 'value' is not a list of categories", member_id);
                warn!("{}", message);
                errors.push(message);
                members_skipped += 1;
                continue;
            }
        };

        for category in categories {
            let category: CategoryEntry = match serde_json::from_value(category.clone()) {
                Ok(c) => c,
                Err(e) => {
                    let message = format!("Member {}: malformed category: {}", member_id, e);
                    warn!("{}", message);
                    errors.push(message);
                    continue;
                }
            };
            let ctx = CategoryContext {
                member_id,
                category_id: scalar_to_string(&category.id).unwrap_or_default(),
                category_name: &category.name,
                sort_order: scalar_to_string(&category.sort_order).unwrap_or_default(),
            };
            for interest in &category.interests {
                emit_interest(&ctx, interest, None, &mut counter, &mut rows, &mut errors);
            }
        }
    }

    if rows.is_empty() {
        return Err(InterestsError::EmptyDataset);
    }

    info!(
        "🔧 Flattened {} interest rows from {} members ({} skipped)",
        rows.len(),
        members.len() - members_skipped,
        members_skipped
    );

    Ok(FlattenOutput {
        table: InterestTable::new(FLATTENED_COLUMNS, rows)?,
        members_read: members.len(),
        members_skipped,
        errors,
    })
}

fn emit_interest(
    ctx: &CategoryContext<'_>,
    raw: &Value,
    parent_id: Option<&str>,
    counter: &mut OccurrenceCounter,
    rows: &mut Vec<InterestRow>,
    errors: &mut Vec<String>,
) {
    let entry = match parse_interest(raw) {
        Ok(entry) => entry,
        Err(e) => {
            let message = format!(
                "Member {} category '{}': interest skipped: {}",
                ctx.member_id, ctx.category_name, e
            );
            warn!("{}", message);
            errors.push(message);
            return;
        }
    };
    let interest_id = match scalar_to_string(&entry.id) {
        Some(id) => id,
        None => {
            let message = format!(
                "Member {} category '{}': interest skipped: id is not a number or string",
                ctx.member_id, ctx.category_name
            );
            warn!("{}", message);
            errors.push(message);
            return;
        }
    };

    let is_child = parent_id.is_some();
    let count = counter.next(ctx.member_id, &interest_id, is_child);
    let unique_interest_id = match parent_id {
        Some(parent) => format!("{}-{}-{}-{}", ctx.member_id, parent, interest_id, count),
        None => format!("{}-{}-{}", ctx.member_id, interest_id, count),
    };
    debug!("Emitting interest {}", unique_interest_id);

    rows.push(InterestRow {
        member_id: ctx.member_id,
        category_id: ctx.category_id.clone(),
        category_name: ctx.category_name.to_string(),
        sort_order: ctx.sort_order.clone(),
        interest_id: interest_id.clone(),
        unique_interest_id,
        interest: entry.interest,
        created_when: entry.created_when,
        last_amended_when: entry.last_amended_when,
        deleted_when: entry.deleted_when,
        is_correction: entry.is_correction.unwrap_or(false),
        is_child_interest: is_child,
        parent_interest: parent_id.map(str::to_string),
        ..InterestRow::default()
    });

    for child in &entry.child_interests {
        emit_interest(ctx, child, Some(&interest_id), counter, rows, errors);
    }
}

fn parse_interest(raw: &Value) -> Result<InterestEntry> {
    if !raw.is_object() {
        return Err(InterestsError::MissingField(
            "interest entry is not an object".to_string(),
        ));
    }
    serde_json::from_value(raw.clone()).map_err(|e| InterestsError::MissingField(e.to_string()))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
