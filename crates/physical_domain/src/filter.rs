//! Collision categories for the physics world and the visibility world.

use rapier3d::prelude::{Group, InteractionGroups};

use crate::mode::Mode;

pub const PHYSICAL: u32 = 1;
pub const NON_PHYSICAL: u32 = 2;
pub const TERRAIN: u32 = 4;
pub const STATIC: u32 = 8;

pub const OBSERVER: u32 = 2;
pub const OBSERVABLE: u32 = 4;
pub const OBSERVABLE_PRIVATE: u32 = 8;

/// Membership and filter masks for one collider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionProfile {
    pub membership: u32,
    pub filter: u32,
}

impl CollisionProfile {
    pub const WATER: CollisionProfile = CollisionProfile::new(TERRAIN, NON_PHYSICAL | PHYSICAL);
    pub const TERRAIN: CollisionProfile = CollisionProfile::new(TERRAIN, NON_PHYSICAL | PHYSICAL);
    /// Used when sweeping for something static to plant on.
    pub const PLANT_SWEEP: CollisionProfile = CollisionProfile::new(PHYSICAL, STATIC);

    pub const fn new(membership: u32, filter: u32) -> Self {
        Self { membership, filter }
    }

    pub fn for_entity(mode: Mode, solid: bool) -> Self {
        match (mode, solid) {
            (Mode::Fixed, true) => Self::new(STATIC, PHYSICAL),
            (Mode::Fixed, false) => Self::new(0, 0),
            (Mode::Planted, true) => Self::new(STATIC, PHYSICAL | TERRAIN),
            (Mode::Planted, false) => Self::new(0, TERRAIN),
            (_, true) => Self::new(PHYSICAL, PHYSICAL | TERRAIN | STATIC),
            (_, false) => Self::new(NON_PHYSICAL, TERRAIN),
        }
    }

    /// Visibility sphere of an observable entity.
    pub fn visibility_sphere(private: bool) -> Self {
        Self::new(
            OBSERVER,
            if private { OBSERVABLE_PRIVATE } else { OBSERVABLE },
        )
    }

    /// View sphere of a perceiving entity.
    pub fn view_sphere(admin: bool) -> Self {
        Self::new(
            if admin {
                OBSERVABLE | OBSERVABLE_PRIVATE
            } else {
                OBSERVABLE
            },
            OBSERVER,
        )
    }

    pub fn groups(self) -> InteractionGroups {
        InteractionGroups::new(
            Group::from_bits_truncate(self.membership),
            Group::from_bits_truncate(self.filter),
        )
    }

    pub fn interacts_with(self, other: CollisionProfile) -> bool {
        self.membership & other.filter != 0 && other.membership & self.filter != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_collides_with_terrain_and_static() {
        let free = CollisionProfile::for_entity(Mode::Free, true);
        let planted = CollisionProfile::for_entity(Mode::Planted, true);
        let fixed = CollisionProfile::for_entity(Mode::Fixed, true);
        assert!(free.interacts_with(CollisionProfile::TERRAIN));
        assert!(free.interacts_with(planted));
        assert!(free.interacts_with(fixed));
        assert!(!planted.interacts_with(fixed));
    }

    #[test]
    fn test_non_solid_profiles() {
        let ghost = CollisionProfile::for_entity(Mode::Free, false);
        let free = CollisionProfile::for_entity(Mode::Free, true);
        assert!(ghost.interacts_with(CollisionProfile::TERRAIN));
        assert!(!ghost.interacts_with(free));
        assert_eq!(
            CollisionProfile::for_entity(Mode::Fixed, false),
            CollisionProfile::new(0, 0)
        );
        assert_eq!(
            CollisionProfile::for_entity(Mode::Submerged, true),
            CollisionProfile::for_entity(Mode::Projectile, true)
        );
    }

    #[test]
    fn test_private_visibility_needs_admin_view() {
        let public = CollisionProfile::visibility_sphere(false);
        let private = CollisionProfile::visibility_sphere(true);
        let viewer = CollisionProfile::view_sphere(false);
        let admin = CollisionProfile::view_sphere(true);
        assert!(viewer.interacts_with(public));
        assert!(!viewer.interacts_with(private));
        assert!(admin.interacts_with(private));
        assert!(!viewer.interacts_with(admin));
        assert!(!public.interacts_with(private));
    }

    #[test]
    fn test_plant_sweep_only_hits_static() {
        let sweep = CollisionProfile::PLANT_SWEEP;
        assert!(sweep.interacts_with(CollisionProfile::for_entity(Mode::Planted, true)));
        assert!(!sweep.interacts_with(CollisionProfile::for_entity(Mode::Free, true)));
        assert!(!sweep.interacts_with(CollisionProfile::WATER));
    }
}
