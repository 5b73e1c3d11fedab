//! Domain configuration.
//!
//! Loaded from RON, with every field defaulted so partial files work:
//!
//! ```ron
//! (
//!     tick_size: 0.0666,
//!     max_visibility_checks: 40,
//! )
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Seconds between scheduled ticks.
    pub tick_size: f64,
    /// Engine sub-steps per simulated second.
    pub substep_rate: f64,
    pub gravity: [f32; 3],
    /// Angular size below which an entity is considered too small to see.
    pub visibility_angle_degrees: f32,
    /// Visibility radii are snapped down onto these values.
    pub visibility_thresholds: Vec<f32>,
    /// Multiplier applied to every position and radius in the visibility world.
    /// Defaults to the inverse of the visibility ratio.
    pub visibility_scaling: Option<f32>,
    pub view_sphere_radius: f32,
    /// Entries whose visibility is recomputed per tick.
    pub max_visibility_checks: usize,
    pub submerged_damping: f32,
    /// Friction applied while an entity propels itself.
    pub propel_friction: f32,
    pub default_friction: f32,
    /// Minimum drop distance before auto-stepping snaps an entity down.
    pub step_snap_distance: f32,
    pub terrain_resolution: u32,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            tick_size: 1.0 / 15.0,
            substep_rate: 60.0,
            gravity: [0.0, -9.81, 0.0],
            visibility_angle_degrees: 1.0,
            visibility_thresholds: vec![
                10.0, 20.0, 30.0, 50.0, 75.0, 100.0, 300.0, 500.0, 1000.0, 2000.0,
            ],
            visibility_scaling: None,
            view_sphere_radius: 0.5,
            max_visibility_checks: 20,
            submerged_damping: 0.8,
            propel_friction: 0.5,
            default_friction: 1.0,
            step_snap_distance: 0.2,
            terrain_resolution: domain_terrain::DEFAULT_RESOLUTION,
        }
    }
}

impl DomainConfig {
    pub fn from_ron_str(source: &str) -> Result<Self, DomainError> {
        Ok(ron::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_ron_str(&source)?;
        tracing::info!("✓ Loaded domain config from {}", path.display());
        Ok(config)
    }

    /// Distance at which an object of radius 1 subtends the visibility angle.
    pub fn visibility_ratio(&self) -> f32 {
        1.0 / self.visibility_angle_degrees.to_radians().tan()
    }

    pub fn visibility_scaling(&self) -> f32 {
        self.visibility_scaling
            .unwrap_or_else(|| 1.0 / self.visibility_ratio())
    }

    /// Radius within which an entity can be seen, before scaling.
    pub fn visibility_radius(&self, vis_dist: Option<f32>, bbox_radius: Option<f32>) -> f32 {
        let raw = match (vis_dist, bbox_radius) {
            (Some(dist), _) => dist,
            (None, Some(radius)) if radius > 0.0 => radius * self.visibility_ratio(),
            _ => 0.25 * self.visibility_ratio(),
        };
        self.snap_visibility(raw)
    }

    fn snap_visibility(&self, radius: f32) -> f32 {
        let thresholds = &self.visibility_thresholds;
        for (i, threshold) in thresholds.iter().enumerate() {
            if radius < *threshold {
                return if i == 0 { *threshold } else { thresholds[i - 1] };
            }
        }
        thresholds.last().copied().unwrap_or(radius)
    }

    pub fn substep_size(&self) -> f64 {
        1.0 / self.substep_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_snapping() {
        let config = DomainConfig::default();
        assert_eq!(config.visibility_radius(Some(5.0), None), 10.0);
        assert_eq!(config.visibility_radius(Some(49.0), None), 30.0);
        assert_eq!(config.visibility_radius(Some(50.0), None), 50.0);
        assert_eq!(config.visibility_radius(Some(5000.0), None), 2000.0);
        // 0.866 * 57.29 lands between 30 and 50.
        assert_eq!(config.visibility_radius(None, Some(0.866)), 30.0);
        // 0.25 * 57.29 lands between 10 and 20.
        assert_eq!(config.visibility_radius(None, None), 10.0);
    }

    #[test]
    fn test_visibility_radius_is_monotonic() {
        let config = DomainConfig::default();
        let mut last = 0.0;
        for step in 0..200 {
            let radius = config.visibility_radius(None, Some(step as f32 * 0.25));
            assert!(radius >= last);
            last = radius;
        }
    }

    #[test]
    fn test_scaling_defaults_to_inverse_ratio() {
        let config = DomainConfig::default();
        assert!((config.visibility_ratio() - 57.29).abs() < 0.01);
        assert!((config.visibility_scaling() * config.visibility_ratio() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_partial_ron() {
        let config = DomainConfig::from_ron_str("(max_visibility_checks: 5, tick_size: 0.1)").unwrap();
        assert_eq!(config.max_visibility_checks, 5);
        assert_eq!(config.tick_size, 0.1);
        assert_eq!(config.substep_rate, 60.0);
        assert!(DomainConfig::from_ron_str("(tick_size: \"fast\")").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("domain.ron");
        std::fs::write(&path, "(view_sphere_radius: 1.5)").unwrap();
        let config = DomainConfig::load(&path).unwrap();
        assert_eq!(config.view_sphere_radius, 1.5);

        let missing = DomainConfig::load(dir.path().join("missing.ron"));
        assert!(matches!(missing, Err(DomainError::Io(_))));
    }
}
