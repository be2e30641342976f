//! Local append-only write log, ordered by local apply time, that a sync
//! round replays against a peer's vector clock.

use std::collections::BTreeMap;

use fabric_protocol::MachineId;
use parking_lot::RwLock;

use crate::clock::VectorClock;
use crate::wire::LogRecord;

#[derive(Default)]
pub struct WriteLog {
    entries: RwLock<Vec<LogRecord>>,
}

impl WriteLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: LogRecord) {
        self.entries.write().push(record);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries strictly newer than `clock`'s corresponding origin entry,
    /// ordered by `(origin_machine, version)`, bounded by `limit`.
    pub fn records_after(&self, clock: &VectorClock, limit: usize) -> (Vec<LogRecord>, bool) {
        let mut matching: Vec<LogRecord> = self
            .entries
            .read()
            .iter()
            .filter(|r| clock.is_newer(&r.origin_machine, r.version))
            .cloned()
            .collect();
        matching.sort_by(|a, b| (a.origin_machine.as_str(), a.version).cmp(&(b.origin_machine.as_str(), b.version)));
        let has_more = matching.len() > limit;
        matching.truncate(limit);
        (matching, has_more)
    }

    /// The lowest version retained for `machine_id`, used to detect
    /// whether a peer's clock has fallen behind what we can still serve.
    pub fn oldest_retained_version(&self, machine_id: &MachineId) -> Option<u64> {
        self.entries
            .read()
            .iter()
            .filter(|r| &r.origin_machine == machine_id)
            .map(|r| r.version)
            .min()
    }

    pub fn oldest_retained_versions(&self) -> BTreeMap<MachineId, u64> {
        let mut out: BTreeMap<MachineId, u64> = BTreeMap::new();
        for record in self.entries.read().iter() {
            out.entry(record.origin_machine.clone())
                .and_modify(|v| *v = (*v).min(record.version))
                .or_insert(record.version);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_protocol::{Category, MemoryId, Scope};
    use indexmap::IndexSet;

    fn record(id: &str, version: u64, origin: &str) -> LogRecord {
        let now = chrono::Utc::now();
        LogRecord {
            id: MemoryId::from_string(id),
            version,
            origin_machine: MachineId::from_string(origin),
            scope: Scope::NetworkShared,
            item: fabric_protocol::MemoryItem {
                id: MemoryId::from_string(id),
                content: "payload".into(),
                category: Category::Infrastructure,
                tags: IndexSet::new(),
                context: None,
                scope: Scope::NetworkShared,
                origin_machine: MachineId::from_string(origin),
                origin_agent: fabric_protocol::AgentId::from_string("a1"),
                created_at: now,
                updated_at: now,
                version,
                tombstone: false,
                format_version: 1,
                vector_pending: false,
            },
        }
    }

    #[test]
    fn records_after_filters_and_orders_by_origin_then_version() {
        let log = WriteLog::new();
        log.append(record("a", 2, "m2"));
        log.append(record("b", 1, "m1"));
        log.append(record("c", 3, "m1"));
        let clock = VectorClock::new();
        let (records, has_more) = log.records_after(&clock, 10);
        assert!(!has_more);
        assert_eq!(records[0].origin_machine, MachineId::from_string("m1"));
        assert_eq!(records[0].version, 1);
        assert_eq!(records[2].origin_machine, MachineId::from_string("m2"));
    }

    #[test]
    fn records_after_respects_limit_and_reports_has_more() {
        let log = WriteLog::new();
        for v in 1..=5 {
            log.append(record(&format!("id{v}"), v, "m1"));
        }
        let (records, has_more) = log.records_after(&VectorClock::new(), 2);
        assert_eq!(records.len(), 2);
        assert!(has_more);
    }

    #[test]
    fn oldest_retained_version_tracks_minimum_per_machine() {
        let log = WriteLog::new();
        log.append(record("a", 5, "m1"));
        log.append(record("b", 2, "m1"));
        assert_eq!(log.oldest_retained_version(&MachineId::from_string("m1")), Some(2));
    }
}
