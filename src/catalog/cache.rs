use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::SatelliteRecord;

/// TTL cache over resolved records, keyed by catalog number. Entries are
/// dropped lazily on lookup; the working set is small enough that no
/// background sweep is needed.
pub struct RecordCache {
    ttl: Duration,
    entries: Mutex<HashMap<u32, (Instant, Arc<SatelliteRecord>)>>,
}

impl RecordCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, norad_id: u32) -> Option<Arc<SatelliteRecord>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(&norad_id) {
            Some((stored, record)) if stored.elapsed() < self.ttl => Some(Arc::clone(record)),
            Some(_) => {
                entries.remove(&norad_id);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, record: Arc<SatelliteRecord>) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(record.norad_id, (Instant::now(), record));
    }
}
