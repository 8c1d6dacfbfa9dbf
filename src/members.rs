//! Loads the member directory from a Members API dump.
//!
//! Interests can only be persisted for members present in the directory, so
//! this runs before the first import and whenever membership changes.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{error, info, instrument};

use crate::domain::Member;
use crate::error::{InterestsError, Result};
use crate::storage::InterestStore;

const MEMBERSHIP_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemberLoadReport {
    pub added: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberEntry {
    id: Option<i64>,
    name_display_as: Option<String>,
    gender: Option<String>,
    thumbnail_url: Option<String>,
    latest_house_membership: Option<HouseMembership>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HouseMembership {
    membership_from: Option<String>,
    house: Option<i64>,
    membership_start_date: Option<String>,
    membership_end_date: Option<String>,
    membership_end_reason: Option<String>,
}

pub fn house_name(code: Option<i64>) -> &'static str {
    match code {
        Some(1) => "House of Commons",
        Some(2) => "House of Lords",
        _ => "Unknown",
    }
}

fn membership_date(value: Option<&str>) -> std::result::Result<Option<DateTime<Utc>>, chrono::ParseError> {
    value
        .map(|v| NaiveDateTime::parse_from_str(v, MEMBERSHIP_DATE_FORMAT).map(|dt| dt.and_utc()))
        .transpose()
}

fn to_member(entry: MemberEntry) -> std::result::Result<Member, String> {
    let api_id = entry
        .id
        .ok_or_else(|| "missing id".to_string())?
        .to_string();
    let seat = entry.latest_house_membership.unwrap_or_default();

    let membership_start = membership_date(seat.membership_start_date.as_deref())
        .map_err(|e| format!("member {}: bad membershipStartDate: {}", api_id, e))?;
    let membership_end = membership_date(seat.membership_end_date.as_deref())
        .map_err(|e| format!("member {}: bad membershipEndDate: {}", api_id, e))?;

    Ok(Member {
        id: None,
        name: entry.name_display_as.unwrap_or_default(),
        gender: entry.gender,
        thumbnail_url: entry.thumbnail_url,
        constituency: seat.membership_from,
        house: house_name(seat.house).to_string(),
        membership_start,
        membership_end,
        membership_end_reason: seat.membership_end_reason,
        api_id,
    })
}

/// Parses a JSON array of `{ "value": { ... } }` wrappers into members.
///
/// Wrappers without a `value` are ignored. Entries that cannot be turned into a
/// member are reported and skipped.
pub fn parse_members(contents: &str) -> Result<(Vec<Member>, Vec<String>)> {
    let wrappers: Vec<Value> = serde_json::from_str(contents)?;
    let mut members = Vec::new();
    let mut errors = Vec::new();

    for wrapper in wrappers {
        let value = match wrapper.get("value") {
            Some(v) if !v.is_null() => v.clone(),
            _ => continue,
        };
        let result = serde_json::from_value::<MemberEntry>(value)
            .map_err(|e| e.to_string())
            .and_then(to_member);
        match result {
            Ok(member) => members.push(member),
            Err(e) => {
                error!("Skipping member entry: {}", e);
                errors.push(format!("Skipping member entry: {}", e));
            }
        }
    }
    Ok((members, errors))
}

/// Reads a Members API dump and upserts every member by external id
#[instrument(skip(store))]
pub fn load_members<S: InterestStore>(path: &Path, store: &mut S) -> Result<MemberLoadReport> {
    if !path.exists() {
        return Err(InterestsError::SourceNotFound(path.to_path_buf()));
    }
    let contents = fs::read_to_string(path)?;
    let (members, errors) = parse_members(&contents)?;
    let counts = store.upsert_members(&members)?;

    info!(
        "👥 Members added: {}, updated: {}, errors: {}",
        counts.added,
        counts.updated,
        errors.len()
    );
    Ok(MemberLoadReport {
        added: counts.added,
        updated: counts.updated,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use std::io::Write;

    const DUMP: &str = r#"[
        {"value": {"id": 172, "nameDisplayAs": "Ms Diane Abbott", "gender": "F",
            "thumbnailUrl": "https://members-api.parliament.uk/api/Members/172/Thumbnail",
            "latestHouseMembership": {"membershipFrom": "Hackney North and Stoke Newington",
                "house": 1, "membershipStartDate": "1987-06-11T00:00:00",
                "membershipEndDate": null, "membershipEndReason": null}}},
        {"value": {"id": 3898, "nameDisplayAs": "Lord Alli", "gender": "M",
            "latestHouseMembership": {"membershipFrom": "Life peer", "house": 2,
                "membershipStartDate": "1998-07-30T00:00:00"}}},
        {"value": {"nameDisplayAs": "No Id"}},
        {"links": []}
    ]"#;

    #[test]
    fn house_codes_map_to_names() {
        assert_eq!(house_name(Some(1)), "House of Commons");
        assert_eq!(house_name(Some(2)), "House of Lords");
        assert_eq!(house_name(Some(7)), "Unknown");
        assert_eq!(house_name(None), "Unknown");
    }

    #[test]
    fn entries_parse_and_missing_ids_are_errors() {
        let (members, errors) = parse_members(DUMP).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(members[0].api_id, "172");
        assert_eq!(members[0].constituency.as_deref(), Some("Hackney North and Stoke Newington"));
        assert_eq!(members[1].house, "House of Lords");
        assert_eq!(
            members[0].membership_start.map(|d| d.to_rfc3339()),
            Some("1987-06-11T00:00:00+00:00".to_string())
        );
    }

    #[test]
    fn loading_twice_updates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DUMP.as_bytes()).unwrap();
        let mut store = InMemoryStore::new();

        let first = load_members(file.path(), &mut store).unwrap();
        assert_eq!((first.added, first.updated), (2, 0));

        let second = load_members(file.path(), &mut store).unwrap();
        assert_eq!((second.added, second.updated), (0, 2));
        assert!(store.find_member("3898").unwrap().is_some());
    }
}
