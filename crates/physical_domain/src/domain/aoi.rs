//! Area-of-interest bookkeeping.
//!
//! Every perceptive entry carries a small view sphere and every entry carries a
//! visibility sphere sized by how far away it can be seen. An observer sees an entity
//! while its view sphere overlaps that entity's visibility sphere. Edges are updated on
//! both sides at once and the changes are queued until the entry is flushed, at which
//! point Appearance and Disappearance notifications go out.

use std::collections::BTreeMap;

use super::PhysicalDomain;
use crate::entity::{EntityId, Visibility};
use crate::filter::CollisionProfile;
use crate::notify::Notification;
use crate::registry::Edit;

/// Records an edit, cancelling out an opposite one that has not been flushed yet.
fn record(changes: &mut BTreeMap<EntityId, Edit>, id: EntityId, edit: Edit) {
    match changes.get(&id) {
        Some(existing) if *existing != edit => {
            changes.remove(&id);
        }
        _ => {
            changes.insert(id, edit);
        }
    }
}

impl PhysicalDomain {
    pub(crate) fn insert_spheres(&mut self, id: EntityId) {
        if id == self.container {
            return;
        }
        let view_radius = self.config.view_sphere_radius;
        let container = self.container;
        let container_perceptive = self
            .entries
            .get(&container)
            .is_some_and(|c| c.entity.perceptive);

        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        let Some(pos) = entry.pos() else {
            return;
        };
        let private = entry.entity.visibility != Visibility::Public;
        entry.visibility_sphere = Some(self.visibility.insert_sphere(
            id,
            pos,
            entry.vis_radius,
            CollisionProfile::visibility_sphere(private),
        ));

        let perceptive = entry.entity.perceptive;
        if perceptive {
            entry.view_sphere = Some(self.visibility.insert_sphere(
                id,
                pos,
                view_radius,
                CollisionProfile::view_sphere(entry.entity.admin),
            ));
            entry.observing_this.insert(id);
            entry.observed_by_this.insert(id);
            entry.observed_by_this.insert(container);
            record(&mut entry.observed_by_this_changes, container, Edit::Add);
        }
        if container_perceptive {
            entry.observing_this.insert(container);
        }

        if let Some(c) = self.entries.get_mut(&container) {
            if perceptive {
                c.observing_this.insert(id);
            }
            if container_perceptive {
                c.observed_by_this.insert(id);
            }
        }

        if perceptive {
            self.recompute_observer(id);
            self.flush_observer(id);
        }
        self.recompute_observed(id);
        self.flush_observed(id, false);
    }

    pub(crate) fn remove_spheres(&mut self, id: EntityId) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        for handle in [entry.view_sphere.take(), entry.visibility_sphere.take()]
            .into_iter()
            .flatten()
        {
            self.visibility.remove_sphere(handle);
        }
        if let Some(c) = self.entries.get_mut(&self.container) {
            c.observing_this.remove(&id);
            c.observed_by_this.remove(&id);
        }
    }

    pub(crate) fn move_spheres(&mut self, id: EntityId) {
        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        let Some(pos) = entry.pos() else {
            return;
        };
        for handle in [entry.view_sphere, entry.visibility_sphere].into_iter().flatten() {
            self.visibility.move_sphere(handle, pos);
        }
    }

    pub(crate) fn queue_visibility(&mut self, id: EntityId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            if !entry.queued_for_visibility && (entry.view_sphere.is_some() || entry.visibility_sphere.is_some()) {
                entry.queued_for_visibility = true;
                self.visibility_queue.push_back(id);
            }
        }
    }

    /// Recomputes the area of interest of at most `max_visibility_checks` queued entries.
    pub(crate) fn update_visibility_queue(&mut self) {
        for _ in 0..self.config.max_visibility_checks {
            let Some(id) = self.visibility_queue.pop_front() else {
                break;
            };
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            entry.queued_for_visibility = false;
            self.recompute_observed(id);
            self.flush_observed(id, true);
            self.recompute_observer(id);
            self.flush_observer(id);
        }
    }

    /// Updates who can see `id`.
    fn recompute_observed(&mut self, id: EntityId) {
        let Some(sphere) = self.entries.get(&id).and_then(|e| e.visibility_sphere) else {
            return;
        };
        let container = self.container;
        let mut found = self.visibility.overlapping(sphere);
        found.retain(|o| *o != id && *o != container && self.entries.contains_key(o));

        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        let current: Vec<EntityId> = entry
            .observing_this
            .iter()
            .copied()
            .filter(|o| *o != id && *o != container)
            .collect();

        for observer in found.iter().filter(|o| !current.contains(o)) {
            self.link(*observer, id);
        }
        for observer in current.iter().filter(|o| !found.contains(o)) {
            self.unlink(*observer, id);
        }
    }

    /// Updates what `id` can see.
    fn recompute_observer(&mut self, id: EntityId) {
        let Some(sphere) = self.entries.get(&id).and_then(|e| e.view_sphere) else {
            return;
        };
        let container = self.container;
        let mut found = self.visibility.overlapping(sphere);
        found.retain(|o| *o != id && *o != container && self.entries.contains_key(o));

        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        let current: Vec<EntityId> = entry
            .observed_by_this
            .iter()
            .copied()
            .filter(|o| *o != id && *o != container)
            .collect();

        for observed in found.iter().filter(|o| !current.contains(o)) {
            self.link(id, *observed);
        }
        for observed in current.iter().filter(|o| !found.contains(o)) {
            self.unlink(id, *observed);
        }
    }

    fn link(&mut self, observer: EntityId, observed: EntityId) {
        if let Some(entry) = self.entries.get_mut(&observer) {
            entry.observed_by_this.insert(observed);
            record(&mut entry.observed_by_this_changes, observed, Edit::Add);
        }
        if let Some(entry) = self.entries.get_mut(&observed) {
            entry.observing_this.insert(observer);
            record(&mut entry.observing_this_changes, observer, Edit::Add);
        }
    }

    fn unlink(&mut self, observer: EntityId, observed: EntityId) {
        if let Some(entry) = self.entries.get_mut(&observer) {
            entry.observed_by_this.remove(&observed);
            record(&mut entry.observed_by_this_changes, observed, Edit::Remove);
        }
        if let Some(entry) = self.entries.get_mut(&observed) {
            entry.observing_this.remove(&observer);
            record(&mut entry.observing_this_changes, observer, Edit::Remove);
        }
    }

    /// Tells each observer that started or stopped seeing `id` about it, one record each.
    fn flush_observed(&mut self, id: EntityId, notify: bool) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        let changes = std::mem::take(&mut entry.observing_this_changes);
        for (observer, edit) in changes {
            if let Some(other) = self.entries.get_mut(&observer) {
                other.observed_by_this_changes.remove(&id);
            }
            if !notify {
                continue;
            }
            self.outbox.push(match edit {
                Edit::Add => Notification::Appearance {
                    to: observer,
                    entities: vec![id],
                },
                Edit::Remove => Notification::Disappearance {
                    to: observer,
                    entities: vec![id],
                },
            });
        }
    }

    /// Tells `id` about everything it started or stopped seeing, batched.
    fn flush_observer(&mut self, id: EntityId) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        let changes = std::mem::take(&mut entry.observed_by_this_changes);
        let mut appeared = Vec::new();
        let mut disappeared = Vec::new();
        for (observed, edit) in changes {
            if let Some(other) = self.entries.get_mut(&observed) {
                other.observing_this_changes.remove(&id);
            }
            match edit {
                Edit::Add => appeared.push(observed),
                Edit::Remove => disappeared.push(observed),
            }
        }
        if !appeared.is_empty() {
            self.outbox.push(Notification::Appearance {
                to: id,
                entities: appeared,
            });
        }
        if !disappeared.is_empty() {
            self.outbox.push(Notification::Disappearance {
                to: id,
                entities: disappeared,
            });
        }
    }

    /// Turns perception on or off for an entity.
    pub fn set_perceptive(&mut self, id: EntityId, perceptive: bool) {
        if id == self.container {
            if let Some(c) = self.entries.get_mut(&id) {
                c.entity.perceptive = perceptive;
            }
            return;
        }
        let container = self.container;
        let view_radius = self.config.view_sphere_radius;
        let Some(entry) = self.entries.get_mut(&id) else {
            tracing::warn!("[PHYSICAL-DOMAIN] Cannot change perception of unknown entity {}", id);
            return;
        };
        entry.entity.perceptive = perceptive;

        if perceptive {
            if entry.view_sphere.is_some() {
                return;
            }
            let Some(pos) = entry.pos() else {
                return;
            };
            entry.view_sphere = Some(self.visibility.insert_sphere(
                id,
                pos,
                view_radius,
                CollisionProfile::view_sphere(entry.entity.admin),
            ));
            entry.observing_this.insert(id);
            entry.observed_by_this.insert(id);
            entry.observed_by_this.insert(container);
            record(&mut entry.observed_by_this_changes, container, Edit::Add);
            if let Some(c) = self.entries.get_mut(&container) {
                c.observing_this.insert(id);
            }
            self.recompute_observer(id);
            self.flush_observer(id);
            return;
        }

        let Some(handle) = entry.view_sphere.take() else {
            return;
        };
        self.visibility.remove_sphere(handle);
        entry.observing_this.remove(&id);
        entry.observed_by_this.remove(&id);
        entry.observed_by_this.remove(&container);
        entry.observed_by_this_changes.clear();
        let observed: Vec<EntityId> = std::mem::take(&mut entry.observed_by_this).into_iter().collect();
        if let Some(c) = self.entries.get_mut(&container) {
            c.observing_this.remove(&id);
        }
        for other in observed {
            if let Some(other) = self.entries.get_mut(&other) {
                other.observing_this.remove(&id);
                other.observing_this_changes.remove(&id);
            }
        }
    }

    /// Re-derives the visibility radius after a `vis_dist` or bounding box change.
    pub(crate) fn refresh_visibility_radius(&mut self, id: EntityId) {
        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        let radius = self.visibility_radius_for(&entry.entity);
        let sphere = entry.visibility_sphere;
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.vis_radius = radius;
        }
        if let Some(handle) = sphere {
            self.visibility.resize_sphere(handle, radius);
        }
        self.move_spheres(id);
        self.queue_visibility(id);
    }

    /// Whether `observer` can currently see `observed`. The container and the observer
    /// itself are always visible.
    pub fn is_entity_visible_for(&self, observer: EntityId, observed: EntityId) -> bool {
        if observed == self.container || observer == observed {
            return true;
        }
        self.entries
            .get(&observed)
            .is_some_and(|e| e.observing_this.contains(&observer))
    }

    /// Everything `observer` can currently see.
    pub fn get_visible_entities_for(&self, observer: EntityId) -> Vec<EntityId> {
        self.entries
            .get(&observer)
            .map(|e| e.observed_by_this.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Everything currently observing `observed`.
    pub fn get_observing_entities_for(&self, observed: EntityId) -> Vec<EntityId> {
        self.entries
            .get(&observed)
            .map(|e| e.observing_this.iter().copied().collect())
            .unwrap_or_default()
    }
}
