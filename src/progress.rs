use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Downloading,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProgressEntry {
    pub client_id: String,
    pub percent: f64,
    pub status: ProgressStatus,
}

impl ProgressEntry {
    fn new(client_id: &str, percent: f64) -> Self {
        let percent = percent.clamp(0.0, 100.0);
        let status = if percent >= 100.0 {
            ProgressStatus::Completed
        } else {
            ProgressStatus::Downloading
        };
        Self {
            client_id: client_id.to_string(),
            percent,
            status,
        }
    }
}

/// Body of `GET /api/download-progress`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub progress: f64,
    pub status: ProgressStatus,
}

impl Default for ProgressReport {
    fn default() -> Self {
        Self {
            progress: 0.0,
            status: ProgressStatus::Downloading,
        }
    }
}

impl From<&ProgressEntry> for ProgressReport {
    fn from(entry: &ProgressEntry) -> Self {
        Self {
            progress: entry.percent,
            status: entry.status,
        }
    }
}

struct Slot {
    entry: ProgressEntry,
    generation: u64,
    touched: Instant,
}

/// In-memory progress per client identity.
///
/// Transfers take a generation ticket from [`ProgressRegistry::start`] and
/// use it for every later mutation, so a superseded transfer (or a pending
/// grace-period timer) cannot clobber the entry of a newer one.
#[derive(Clone)]
pub struct ProgressRegistry {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    next_generation: Arc<AtomicU64>,
    grace: Duration,
}

impl ProgressRegistry {
    pub fn new(grace: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(1)),
            grace,
        }
    }

    /// Upserts the entry for `client_id`, starting a new generation if absent.
    pub fn set(&self, client_id: &str, percent: f64) {
        let mut slots = self.slots.lock();
        match slots.get_mut(client_id) {
            Some(slot) => {
                slot.entry = ProgressEntry::new(client_id, percent);
                slot.touched = Instant::now();
            }
            None => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                slots.insert(client_id.to_string(), self.slot(client_id, percent, generation));
            }
        }
    }

    pub fn get(&self, client_id: &str) -> Option<ProgressEntry> {
        self.slots.lock().get(client_id).map(|s| s.entry.clone())
    }

    /// Progress as served to pollers; unknown clients look like a fresh download.
    pub fn report(&self, client_id: &str) -> ProgressReport {
        self.get(client_id)
            .map(|entry| ProgressReport::from(&entry))
            .unwrap_or_default()
    }

    pub fn delete(&self, client_id: &str) {
        self.slots.lock().remove(client_id);
    }

    pub fn delete_after(&self, client_id: &str, delay: Duration) {
        let registry = self.clone();
        let client_id = client_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.delete(&client_id);
        });
    }

    /// Claims the entry for a new transfer at 0% and returns its generation.
    pub fn start(&self, client_id: &str) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .slots
            .lock()
            .insert(client_id.to_string(), self.slot(client_id, 0.0, generation));
        if previous.is_some() {
            debug!("Progress for {} taken over by generation {}", client_id, generation);
        }
        generation
    }

    /// Returns false when the entry was removed or claimed by a newer transfer.
    pub fn update(&self, client_id: &str, generation: u64, percent: f64) -> bool {
        let mut slots = self.slots.lock();
        match slots.get_mut(client_id) {
            Some(slot) if slot.generation == generation => {
                slot.entry = ProgressEntry::new(client_id, percent);
                slot.touched = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Marks the transfer completed and drops the entry once the grace period is over.
    pub fn finish(&self, client_id: &str, generation: u64) {
        if !self.update(client_id, generation, 100.0) {
            return;
        }
        let registry = self.clone();
        let client_id = client_id.to_string();
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            registry.discard(&client_id, generation);
        });
    }

    /// Removes the entry if it still belongs to `generation`.
    pub fn discard(&self, client_id: &str, generation: u64) -> bool {
        let mut slots = self.slots.lock();
        if slots.get(client_id).is_some_and(|s| s.generation == generation) {
            slots.remove(client_id);
            return true;
        }
        false
    }

    /// Drops entries nobody has touched for `max_age`.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| slot.touched.elapsed() < max_age);
        before - slots.len()
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, client_id: &str, percent: f64, generation: u64) -> Slot {
        Slot {
            entry: ProgressEntry::new(client_id, percent),
            generation,
            touched: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ProgressRegistry {
        ProgressRegistry::new(Duration::from_millis(50))
    }

    #[test]
    fn test_set_and_get() {
        let registry = registry();
        registry.set("a", 42.5);
        let entry = registry.get("a").unwrap();
        assert_eq!(entry.percent, 42.5);
        assert_eq!(entry.status, ProgressStatus::Downloading);

        registry.set("a", 100.0);
        assert_eq!(registry.get("a").unwrap().status, ProgressStatus::Completed);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_set_clamps() {
        let registry = registry();
        registry.set("a", 250.0);
        assert_eq!(registry.get("a").unwrap().percent, 100.0);
        registry.set("a", -3.0);
        assert_eq!(registry.get("a").unwrap().percent, 0.0);
    }

    #[test]
    fn test_absent_reports_default() {
        let registry = registry();
        registry.set("a", 10.0);
        registry.delete("a");
        assert!(registry.get("a").is_none());
        assert_eq!(registry.report("a"), ProgressReport::default());
    }

    #[test]
    fn test_report_is_stable_between_sets() {
        let registry = registry();
        registry.set("a", 33.0);
        let first = registry.report("a");
        assert_eq!(registry.report("a"), first);
        assert_eq!(registry.report("a"), first);
    }

    #[test]
    fn test_clients_are_isolated() {
        let registry = registry();
        let a = registry.start("a");
        let b = registry.start("b");
        registry.update("a", a, 70.0);
        registry.update("b", b, 20.0);
        assert_eq!(registry.report("a").progress, 70.0);
        assert_eq!(registry.report("b").progress, 20.0);
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let registry = registry();
        let old = registry.start("a");
        let new = registry.start("a");
        assert_ne!(old, new);

        assert!(!registry.update("a", old, 90.0));
        assert!(!registry.discard("a", old));
        assert_eq!(registry.report("a").progress, 0.0);

        assert!(registry.update("a", new, 10.0));
        assert!(registry.discard("a", new));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_finish_expires_after_grace() {
        let registry = registry();
        let generation = registry.start("a");
        registry.finish("a", generation);

        let report = registry.report("a");
        assert_eq!(report.progress, 100.0);
        assert_eq!(report.status, ProgressStatus::Completed);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(registry.report("a"), ProgressReport::default());
    }

    #[tokio::test]
    async fn test_grace_timer_spares_newer_transfer() {
        let registry = registry();
        let first = registry.start("a");
        registry.finish("a", first);
        let second = registry.start("a");
        registry.update("a", second, 12.0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(registry.report("a").progress, 12.0);
    }

    #[tokio::test]
    async fn test_delete_after() {
        let registry = registry();
        registry.set("a", 5.0);
        registry.delete_after("a", Duration::from_millis(20));
        assert!(registry.get("a").is_some());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(registry.get("a").is_none());
    }

    #[test]
    fn test_sweep_and_clear() {
        let registry = registry();
        registry.set("a", 1.0);
        registry.set("b", 2.0);
        assert_eq!(registry.sweep(Duration::from_secs(60)), 0);
        assert_eq!(registry.sweep(Duration::ZERO), 2);

        registry.set("c", 3.0);
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_report_wire_format() {
        let json = serde_json::to_value(ProgressReport::default()).unwrap();
        assert_eq!(json, serde_json::json!({ "progress": 0.0, "status": "downloading" }));
    }
}
