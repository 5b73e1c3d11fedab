//! Movement modes and the placement rule each one implies.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, PropertyValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Free,
    Fixed,
    Planted,
    Submerged,
    Projectile,
}

/// How an entity's height is resolved whenever its position is recalculated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Leave the height untouched.
    Keep,
    /// Never sink below the terrain.
    AboveTerrain,
    /// Rest on a supporting surface.
    Plant,
}

impl Mode {
    pub fn placement(self) -> Placement {
        match self {
            Mode::Fixed | Mode::Projectile => Placement::Keep,
            Mode::Free | Mode::Submerged => Placement::AboveTerrain,
            Mode::Planted => Placement::Plant,
        }
    }

    /// Static modes are simulated with zero mass and never move on their own.
    pub fn is_static(self) -> bool {
        matches!(self, Mode::Fixed | Mode::Planted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Free => "free",
            Mode::Fixed => "fixed",
            Mode::Planted => "planted",
            Mode::Submerged => "submerged",
            Mode::Projectile => "projectile",
        }
    }

    pub fn parse(name: &str) -> Option<Mode> {
        match name {
            "free" => Some(Mode::Free),
            "fixed" => Some(Mode::Fixed),
            "planted" => Some(Mode::Planted),
            "submerged" => Some(Mode::Submerged),
            "projectile" => Some(Mode::Projectile),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra data carried alongside a mode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum ModeData {
    #[default]
    None,
    Planted {
        on: EntityId,
    },
    Projectile {
        /// Whoever launched the projectile.
        entity: Option<EntityId>,
        extra: BTreeMap<String, PropertyValue>,
    },
}

impl ModeData {
    pub fn planted_on(&self) -> Option<EntityId> {
        match self {
            ModeData::Planted { on } => Some(*on),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_rules() {
        assert_eq!(Mode::Fixed.placement(), Placement::Keep);
        assert_eq!(Mode::Projectile.placement(), Placement::Keep);
        assert_eq!(Mode::Free.placement(), Placement::AboveTerrain);
        assert_eq!(Mode::Submerged.placement(), Placement::AboveTerrain);
        assert_eq!(Mode::Planted.placement(), Placement::Plant);
        assert!(Mode::Planted.is_static());
        assert!(!Mode::Submerged.is_static());
    }

    #[test]
    fn test_mode_names() {
        for mode in [
            Mode::Free,
            Mode::Fixed,
            Mode::Planted,
            Mode::Submerged,
            Mode::Projectile,
        ] {
            assert_eq!(Mode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(Mode::parse("flying"), None);
    }
}
