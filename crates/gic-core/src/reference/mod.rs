//! Bulk reference cache (§4.C, §4.D): entities, the snapshot builder, the
//! catalog freshness manager, and the atomically-swappable handle the Query
//! Service reads through.

pub mod builder;
pub mod freshness;
pub mod model;

use std::sync::Arc;

use arc_swap::ArcSwap;

pub use model::EddbInfo;

/// Atomically-swappable slot holding the current reference snapshot.
///
/// Readers call `load()` once at the start of a request and operate on the
/// returned `Arc` for the lifetime of that call; a concurrent `publish` never
/// tears an in-flight read (§5, §8 "Atomic swap").
pub struct SnapshotSlot {
    current: ArcSwap<EddbInfo>,
}

impl SnapshotSlot {
    pub fn new(initial: EddbInfo) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Loads the currently active snapshot.
    pub fn load(&self) -> Arc<EddbInfo> {
        self.current.load_full()
    }

    /// Atomically publishes a newly built snapshot as the current one.
    pub fn publish(&self, next: EddbInfo) {
        self.current.store(Arc::new(next));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_see_a_stable_snapshot_across_a_publish() {
        let slot = SnapshotSlot::new(EddbInfo::default());
        let held = slot.load();
        assert!(held.systems.is_empty());

        let mut replacement = EddbInfo::default();
        replacement.systems_by_upper_name.insert("SOL".into(), 1);
        slot.publish(replacement);

        // The handle obtained before the publish is untouched.
        assert!(held.systems_by_upper_name.is_empty());
        // A fresh load sees the new snapshot.
        assert!(slot.load().systems_by_upper_name.contains_key("SOL"));
    }
}
