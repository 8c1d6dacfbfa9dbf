use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::{batch_error, BatchInsertReport, InterestStore, UpsertCounts, ROLLBACK_NOTICE};
use crate::domain::{Member, PersistedInterest};
use crate::error::Result;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;
CREATE TABLE IF NOT EXISTS members (
    id                     INTEGER PRIMARY KEY AUTOINCREMENT,
    api_id                 TEXT NOT NULL UNIQUE,
    name                   TEXT NOT NULL,
    gender                 TEXT,
    thumbnail_url          TEXT,
    constituency           TEXT,
    house                  TEXT NOT NULL,
    membership_start       TEXT,
    membership_end         TEXT,
    membership_end_reason  TEXT
);
CREATE TABLE IF NOT EXISTS registered_interests (
    id                                      INTEGER PRIMARY KEY AUTOINCREMENT,
    member_of_parliament                    TEXT NOT NULL REFERENCES members(api_id),
    category_id                             TEXT NOT NULL,
    category_name                           TEXT NOT NULL,
    sort_order                              TEXT NOT NULL,
    api_id                                  TEXT NOT NULL,
    unique_api_generated_id                 TEXT NOT NULL UNIQUE,
    interest_summary                        TEXT,
    date_created                            TEXT NOT NULL,
    date_last_amended                       TEXT,
    date_deleted                            TEXT,
    is_correction                           INTEGER NOT NULL,
    is_child_interest                       INTEGER NOT NULL,
    contains_time_period                    INTEGER,
    contains_loan                           INTEGER,
    interest_currency                       TEXT,
    interest_amount                         TEXT,
    gbp_interest_amount                     TEXT,
    payer                                   TEXT,
    payer_type                              TEXT,
    payer_address                           TEXT,
    payer_companies_house_id                TEXT,
    family_member_relationship              TEXT,
    family_member_paid_by_mp_or_parliament  INTEGER,
    family_member_name                      TEXT,
    family_member_role                      TEXT,
    role                                    TEXT,
    parent_interest                         TEXT,
    employer_name                           TEXT
);
CREATE INDEX IF NOT EXISTS idx_registered_interests_member
    ON registered_interests (member_of_parliament);
"#;

const INSERT_INTEREST: &str = "INSERT INTO registered_interests (
    member_of_parliament, category_id, category_name, sort_order, api_id,
    unique_api_generated_id, interest_summary, date_created, date_last_amended, date_deleted,
    is_correction, is_child_interest, contains_time_period, contains_loan, interest_currency,
    interest_amount, payer, payer_type, payer_address, payer_companies_house_id,
    family_member_relationship, family_member_paid_by_mp_or_parliament, family_member_name,
    family_member_role, role, parent_interest, employer_name
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
          ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)";

const SELECT_INTERESTS: &str = "SELECT
    member_of_parliament, category_id, category_name, sort_order, api_id,
    unique_api_generated_id, interest_summary, date_created, date_last_amended, date_deleted,
    is_correction, is_child_interest, contains_time_period, contains_loan, interest_currency,
    interest_amount, payer, payer_type, payer_address, payer_companies_house_id,
    family_member_relationship, family_member_paid_by_mp_or_parliament, family_member_name,
    family_member_role, role, parent_interest, employer_name
FROM registered_interests ORDER BY id";

const SELECT_MEMBERS: &str = "SELECT id, api_id, name, gender, thumbnail_url, constituency, house,
    membership_start, membership_end, membership_end_reason FROM members";

/// SQLite-backed store with foreign keys enforced
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        info!("Opened interests database at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

fn timestamp_text(ts: &Option<DateTime<Utc>>) -> Option<String> {
    ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn decimal_text(amount: &Option<Decimal>) -> Option<String> {
    amount.map(|a| format!("{:.2}", a))
}

fn parse_column<T, E>(idx: usize, value: Option<String>, parse: impl Fn(&str) -> std::result::Result<T, E>) -> rusqlite::Result<Option<T>>
where
    E: std::error::Error + Send + Sync + 'static,
{
    value
        .map(|v| parse(&v).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))))
        .transpose()
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    parse_column(idx, row.get(idx)?, |v| {
        DateTime::parse_from_rfc3339(v).map(|dt| dt.with_timezone(&Utc))
    })
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        id: row.get(0)?,
        api_id: row.get(1)?,
        name: row.get(2)?,
        gender: row.get(3)?,
        thumbnail_url: row.get(4)?,
        constituency: row.get(5)?,
        house: row.get(6)?,
        membership_start: timestamp_column(row, 7)?,
        membership_end: timestamp_column(row, 8)?,
        membership_end_reason: row.get(9)?,
    })
}

fn interest_from_row(row: &Row<'_>) -> rusqlite::Result<PersistedInterest> {
    Ok(PersistedInterest {
        member_of_parliament: row.get(0)?,
        category_id: row.get(1)?,
        category_name: row.get(2)?,
        sort_order: row.get(3)?,
        api_id: row.get(4)?,
        unique_api_generated_id: row.get(5)?,
        interest_summary: row.get(6)?,
        date_created: timestamp_column(row, 7)?,
        date_last_amended: timestamp_column(row, 8)?,
        date_deleted: timestamp_column(row, 9)?,
        is_correction: row.get(10)?,
        is_child_interest: row.get(11)?,
        contains_time_period: row.get(12)?,
        contains_loan: row.get(13)?,
        interest_currency: row.get(14)?,
        interest_amount: parse_column(15, row.get(15)?, Decimal::from_str)?,
        payer: row.get(16)?,
        payer_type: row.get(17)?,
        payer_address: row.get(18)?,
        payer_companies_house_id: row.get(19)?,
        family_member_relationship: row.get(20)?,
        family_member_paid_by_mp_or_parliament: row.get(21)?,
        family_member_name: row.get(22)?,
        family_member_role: row.get(23)?,
        role: row.get(24)?,
        parent_interest: row.get(25)?,
        employer_name: row.get(26)?,
    })
}

fn insert_batch(tx: &mut Transaction<'_>, batch: &[PersistedInterest]) -> rusqlite::Result<usize> {
    // Dropping an uncommitted savepoint rolls back just this batch
    let sp = tx.savepoint()?;
    {
        let mut stmt = sp.prepare_cached(INSERT_INTEREST)?;
        for r in batch {
            stmt.execute(params![
                r.member_of_parliament,
                r.category_id,
                r.category_name,
                r.sort_order,
                r.api_id,
                r.unique_api_generated_id,
                r.interest_summary,
                timestamp_text(&r.date_created),
                timestamp_text(&r.date_last_amended),
                timestamp_text(&r.date_deleted),
                r.is_correction,
                r.is_child_interest,
                r.contains_time_period,
                r.contains_loan,
                r.interest_currency,
                decimal_text(&r.interest_amount),
                r.payer,
                r.payer_type,
                r.payer_address,
                r.payer_companies_house_id,
                r.family_member_relationship,
                r.family_member_paid_by_mp_or_parliament,
                r.family_member_name,
                r.family_member_role,
                r.role,
                r.parent_interest,
                r.employer_name,
            ])?;
        }
    }
    sp.commit()?;
    Ok(batch.len())
}

impl InterestStore for SqliteStore {
    fn member_directory(&self) -> Result<HashMap<String, Member>> {
        let mut stmt = self.conn.prepare(SELECT_MEMBERS)?;
        let members = stmt
            .query_map([], member_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(members.into_iter().map(|m| (m.api_id.clone(), m)).collect())
    }

    fn find_member(&self, api_id: &str) -> Result<Option<Member>> {
        let sql = format!("{} WHERE api_id = ?1", SELECT_MEMBERS);
        let member = self
            .conn
            .query_row(&sql, params![api_id], member_from_row)
            .optional()?;
        Ok(member)
    }

    fn upsert_members(&mut self, members: &[Member]) -> Result<UpsertCounts> {
        let tx = self.conn.transaction()?;
        let mut counts = UpsertCounts::default();
        {
            let mut exists = tx.prepare_cached("SELECT 1 FROM members WHERE api_id = ?1")?;
            let mut upsert = tx.prepare_cached(
                "INSERT INTO members (api_id, name, gender, thumbnail_url, constituency, house,
                    membership_start, membership_end, membership_end_reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(api_id) DO UPDATE SET
                    name = excluded.name,
                    gender = excluded.gender,
                    thumbnail_url = excluded.thumbnail_url,
                    constituency = excluded.constituency,
                    house = excluded.house,
                    membership_start = excluded.membership_start,
                    membership_end = excluded.membership_end,
                    membership_end_reason = excluded.membership_end_reason",
            )?;
            for m in members {
                let known = exists.exists(params![m.api_id])?;
                upsert.execute(params![
                    m.api_id,
                    m.name,
                    m.gender,
                    m.thumbnail_url,
                    m.constituency,
                    m.house,
                    timestamp_text(&m.membership_start),
                    timestamp_text(&m.membership_end),
                    m.membership_end_reason,
                ])?;
                if known {
                    counts.updated += 1;
                } else {
                    counts.added += 1;
                }
            }
        }
        tx.commit()?;
        debug!("Upserted members: {:?}", counts);
        Ok(counts)
    }

    fn insert_batches(&mut self, batches: &[&[PersistedInterest]]) -> Result<BatchInsertReport> {
        let mut tx = self.conn.transaction()?;
        let mut report = BatchInsertReport::default();

        for (index, batch) in batches.iter().enumerate() {
            match insert_batch(&mut tx, batch) {
                Ok(n) => {
                    debug!("Batch {} staged {} records", index + 1, n);
                    report.inserted += n;
                }
                Err(e) => {
                    let message = batch_error(index, batch.len(), &e);
                    warn!("{}", message);
                    report.errors.push(message);
                }
            }
        }

        if report.errors.is_empty() {
            tx.commit()?;
            report.committed = true;
        } else {
            tx.rollback()?;
            report.inserted = 0;
            report.errors.push(ROLLBACK_NOTICE.to_string());
        }
        Ok(report)
    }

    fn count_interests(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM registered_interests", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn list_interests(&self) -> Result<Vec<PersistedInterest>> {
        let mut stmt = self.conn.prepare(SELECT_INTERESTS)?;
        let interests = stmt
            .query_map([], interest_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(interests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn member(api_id: &str) -> Member {
        Member {
            id: None,
            api_id: api_id.to_string(),
            name: format!("Member {}", api_id),
            gender: Some("F".into()),
            thumbnail_url: None,
            constituency: None,
            house: "House of Commons".into(),
            membership_start: Some(Utc.with_ymd_and_hms(2019, 12, 12, 0, 0, 0).unwrap()),
            membership_end: None,
            membership_end_reason: None,
        }
    }

    fn interest(member: &str, key: &str) -> PersistedInterest {
        PersistedInterest {
            member_of_parliament: member.to_string(),
            category_id: "8".into(),
            category_name: "8. Miscellaneous".into(),
            sort_order: "8".into(),
            api_id: "1".into(),
            unique_api_generated_id: key.to_string(),
            interest_summary: Some("Unpaid trustee".into()),
            date_created: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            date_last_amended: None,
            date_deleted: None,
            is_correction: false,
            is_child_interest: false,
            contains_time_period: Some(false),
            contains_loan: Some(false),
            interest_currency: Some("GBP".into()),
            interest_amount: Some(Decimal::from_str("1500.5").unwrap()),
            payer: None,
            payer_type: None,
            payer_address: None,
            payer_companies_house_id: None,
            family_member_relationship: None,
            family_member_paid_by_mp_or_parliament: None,
            family_member_name: None,
            family_member_role: None,
            role: None,
            parent_interest: None,
            employer_name: None,
        }
    }

    #[test]
    fn members_upsert_by_external_id() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let counts = store.upsert_members(&[member("172"), member("4514")]).unwrap();
        assert_eq!(counts, UpsertCounts { added: 2, updated: 0 });

        let mut renamed = member("172");
        renamed.name = "Ms Diane Abbott".into();
        let counts = store.upsert_members(&[renamed]).unwrap();
        assert_eq!(counts, UpsertCounts { added: 0, updated: 1 });

        let found = store.find_member("172").unwrap().unwrap();
        assert_eq!(found.name, "Ms Diane Abbott");
        assert!(found.id.is_some());
        assert_eq!(found.membership_start, member("172").membership_start);
        assert_eq!(store.member_directory().unwrap().len(), 2);
        assert!(store.find_member("999").unwrap().is_none());
    }

    #[test]
    fn interests_round_trip_with_two_decimal_amounts() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.upsert_members(&[member("172")]).unwrap();
        let record = interest("172", "172-1-1");
        let report = store.insert_batches(&[&[record.clone()][..]]).unwrap();

        assert!(report.committed);
        assert_eq!(report.inserted, 1);
        let stored = store.list_interests().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].interest_amount, Some(Decimal::from_str("1500.50").unwrap()));
        assert_eq!(stored[0].date_created, record.date_created);
    }

    #[test]
    fn failure_in_any_batch_rolls_back_all() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.upsert_members(&[member("172")]).unwrap();
        let first = vec![interest("172", "a"), interest("172", "b")];
        let second = vec![interest("172", "c"), interest("172", "a")];
        let third = vec![interest("172", "d")];

        let report = store.insert_batches(&[first.as_slice(), second.as_slice(), third.as_slice()]).unwrap();

        assert!(!report.committed);
        assert_eq!(report.inserted, 0);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].starts_with("Batch 2"));
        assert_eq!(store.count_interests().unwrap(), 0);
    }

    #[test]
    fn unknown_member_violates_foreign_key() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let report = store.insert_batches(&[&[interest("404", "x")][..]]).unwrap();
        assert!(!report.committed);
        assert_eq!(store.count_interests().unwrap(), 0);
    }
}
