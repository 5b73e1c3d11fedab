//! Registered proximity watches.

use std::collections::BTreeMap;

use crate::entity::EntityId;

pub type ClosenessCallback = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObservationId(pub u64);

pub(crate) struct Observation {
    pub reacher: EntityId,
    pub target: EntityId,
    pub reach: f32,
    callback: ClosenessCallback,
}

impl Observation {
    pub fn fire(self) {
        (self.callback)();
    }
}

#[derive(Default)]
pub(crate) struct ClosenessRegistry {
    next_id: u64,
    observations: BTreeMap<ObservationId, Observation>,
}

impl ClosenessRegistry {
    pub fn insert(
        &mut self,
        reacher: EntityId,
        target: EntityId,
        reach: f32,
        callback: ClosenessCallback,
    ) -> ObservationId {
        self.next_id += 1;
        let id = ObservationId(self.next_id);
        self.observations.insert(
            id,
            Observation {
                reacher,
                target,
                reach,
                callback,
            },
        );
        id
    }

    pub fn get(&self, id: ObservationId) -> Option<&Observation> {
        self.observations.get(&id)
    }

    pub fn remove(&mut self, id: ObservationId) -> Option<Observation> {
        self.observations.remove(&id)
    }

    pub fn drain(&mut self) -> Vec<Observation> {
        std::mem::take(&mut self.observations).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_callbacks_fire_once_on_removal() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut registry = ClosenessRegistry::default();
        let counter = fired.clone();
        let id = registry.insert(
            EntityId(1),
            EntityId(2),
            1.0,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(registry.get(id).map(|o| o.target), Some(EntityId(2)));

        registry.remove(id).unwrap().fire();
        assert!(registry.remove(id).is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drain_empties_registry() {
        let mut registry = ClosenessRegistry::default();
        let a = registry.insert(EntityId(1), EntityId(2), 1.0, Box::new(|| {}));
        let b = registry.insert(EntityId(2), EntityId(3), 1.0, Box::new(|| {}));
        assert_ne!(a, b);
        assert_eq!(registry.drain().len(), 2);
        assert_eq!(registry.len(), 0);
    }
}
