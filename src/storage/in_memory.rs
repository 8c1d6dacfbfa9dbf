use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::{batch_error, BatchInsertReport, InterestStore, UpsertCounts, ROLLBACK_NOTICE};
use crate::domain::{Member, PersistedInterest};
use crate::error::Result;

/// In-memory store for tests and dry runs.
///
/// Enforces the same constraints as the SQLite schema: unique generated ids,
/// a known member for every interest and a creation date.
pub struct InMemoryStore {
    members: HashMap<String, Member>,
    interests: Vec<PersistedInterest>,
    next_member_id: i64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            members: HashMap::new(),
            interests: Vec::new(),
            next_member_id: 1,
        }
    }

    fn check_record(
        &self,
        record: &PersistedInterest,
        keys: &HashSet<String>,
    ) -> std::result::Result<(), String> {
        if !self.members.contains_key(&record.member_of_parliament) {
            return Err(format!(
                "FOREIGN KEY constraint failed: member {}",
                record.member_of_parliament
            ));
        }
        if record.date_created.is_none() {
            return Err(format!(
                "NOT NULL constraint failed: registered_interests.date_created ({})",
                record.unique_api_generated_id
            ));
        }
        if keys.contains(&record.unique_api_generated_id) {
            return Err(format!(
                "UNIQUE constraint failed: registered_interests.unique_api_generated_id ({})",
                record.unique_api_generated_id
            ));
        }
        Ok(())
    }
}

impl InterestStore for InMemoryStore {
    fn member_directory(&self) -> Result<HashMap<String, Member>> {
        Ok(self.members.clone())
    }

    fn find_member(&self, api_id: &str) -> Result<Option<Member>> {
        Ok(self.members.get(api_id).cloned())
    }

    fn upsert_members(&mut self, members: &[Member]) -> Result<UpsertCounts> {
        let mut counts = UpsertCounts::default();
        for member in members {
            match self.members.get_mut(&member.api_id) {
                Some(existing) => {
                    let id = existing.id;
                    *existing = Member { id, ..member.clone() };
                    counts.updated += 1;
                }
                None => {
                    let mut member = member.clone();
                    member.id = Some(self.next_member_id);
                    self.next_member_id += 1;
                    debug!("Created member {} with id {:?}", member.api_id, member.id);
                    self.members.insert(member.api_id.clone(), member);
                    counts.added += 1;
                }
            }
        }
        Ok(counts)
    }

    fn insert_batches(&mut self, batches: &[&[PersistedInterest]]) -> Result<BatchInsertReport> {
        let mut keys: HashSet<String> = self
            .interests
            .iter()
            .map(|r| r.unique_api_generated_id.clone())
            .collect();
        let mut staged = Vec::new();
        let mut report = BatchInsertReport::default();

        for (index, batch) in batches.iter().enumerate() {
            let mut batch_keys = keys.clone();
            let outcome = batch.iter().try_for_each(|record| {
                self.check_record(record, &batch_keys)?;
                batch_keys.insert(record.unique_api_generated_id.clone());
                Ok::<(), String>(())
            });
            match outcome {
                Ok(()) => {
                    keys = batch_keys;
                    staged.extend(batch.iter().cloned());
                    report.inserted += batch.len();
                }
                Err(e) => report.errors.push(batch_error(index, batch.len(), &e)),
            }
        }

        if report.errors.is_empty() {
            self.interests.extend(staged);
            report.committed = true;
        } else {
            report.inserted = 0;
            report.errors.push(ROLLBACK_NOTICE.to_string());
        }
        Ok(report)
    }

    fn count_interests(&self) -> Result<usize> {
        Ok(self.interests.len())
    }

    fn list_interests(&self) -> Result<Vec<PersistedInterest>> {
        Ok(self.interests.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn member(api_id: &str) -> Member {
        Member {
            id: None,
            api_id: api_id.into(),
            name: "Test Member".into(),
            gender: None,
            thumbnail_url: None,
            constituency: None,
            house: "House of Lords".into(),
            membership_start: None,
            membership_end: None,
            membership_end_reason: None,
        }
    }

    fn record(member: &str, key: &str) -> PersistedInterest {
        PersistedInterest {
            member_of_parliament: member.into(),
            category_id: "1".into(),
            category_name: "Category 1: Directorships".into(),
            sort_order: "1".into(),
            api_id: "1".into(),
            unique_api_generated_id: key.into(),
            interest_summary: None,
            date_created: Some(Utc::now()),
            date_last_amended: None,
            date_deleted: None,
            is_correction: false,
            is_child_interest: false,
            contains_time_period: None,
            contains_loan: None,
            interest_currency: None,
            interest_amount: None,
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
    fn upsert_keeps_surrogate_id() {
        let mut store = InMemoryStore::new();
        store.upsert_members(&[member("1")]).unwrap();
        let id = store.find_member("1").unwrap().unwrap().id;
        let counts = store.upsert_members(&[member("1"), member("2")]).unwrap();
        assert_eq!(counts, UpsertCounts { added: 1, updated: 1 });
        assert_eq!(store.find_member("1").unwrap().unwrap().id, id);
    }

    #[test]
    fn duplicate_key_rolls_back_every_batch() {
        let mut store = InMemoryStore::new();
        store.upsert_members(&[member("1")]).unwrap();
        let first = [record("1", "a")];
        let second = [record("1", "a")];

        let report = store.insert_batches(&[&first[..], &second[..]]).unwrap();

        assert_eq!(report.inserted, 0);
        assert!(report.errors[0].contains("UNIQUE"));
        assert_eq!(store.count_interests().unwrap(), 0);
    }

    #[test]
    fn clean_batches_commit() {
        let mut store = InMemoryStore::new();
        store.upsert_members(&[member("1")]).unwrap();
        let report = store
            .insert_batches(&[&[record("1", "a")][..], &[record("1", "b")][..]])
            .unwrap();
        assert!(report.committed);
        assert_eq!(store.count_interests().unwrap(), 2);
    }
}
