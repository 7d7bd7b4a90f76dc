//! Acceleration settings
//!
//! Read once at setup. Every field has a default so a partial `[accel]` table
//! is enough.

use pixmux_hal::BackendKind;
use serde::{Deserialize, Serialize};

/// The `[accel]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AccelConfig {
    /// Disable acceleration entirely
    #[serde(default)]
    pub no_accel: bool,
    /// Acceleration architecture; only "exa" enables the engine
    #[serde(default = "default_accel_method")]
    pub accel_method: String,
    /// "z160", "z430" or "none"; unknown names select z160
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Accelerate alpha composition
    #[serde(default = "default_true")]
    pub compositing: bool,
    /// Verbose diagnostics (per-surface memory listings)
    #[serde(default)]
    pub debug: bool,
    /// Allocate a second framebuffer page when the backend can flip
    #[serde(default)]
    pub double_buffer: bool,
    #[serde(default)]
    pub limits: SurfaceLimits,
    #[serde(default)]
    pub demotion: DemotionPolicy,
}

fn default_accel_method() -> String {
    "exa".to_string()
}

fn default_backend() -> String {
    "z160".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for AccelConfig {
    fn default() -> Self {
        Self {
            no_accel: false,
            accel_method: default_accel_method(),
            backend: default_backend(),
            compositing: true,
            debug: false,
            double_buffer: false,
            limits: SurfaceLimits::default(),
            demotion: DemotionPolicy::default(),
        }
    }
}

impl AccelConfig {
    /// The backend to drive, or `None` for software rendering only.
    pub fn resolve_backend(&self) -> Option<BackendKind> {
        if self.no_accel || !self.accel_method.eq_ignore_ascii_case("exa") {
            return None;
        }
        match self.backend.to_ascii_lowercase().as_str() {
            "none" => None,
            "z430" => Some(BackendKind::Z430),
            _ => Some(BackendKind::Z160),
        }
    }
}

/// Geometry a surface must have to be placed in graphics memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct SurfaceLimits {
    #[serde(default = "default_min_area")]
    pub min_area: u32,
    #[serde(default = "default_min_height")]
    pub min_height: u32,
    #[serde(default = "default_max_dim")]
    pub max_dim: u32,
}

fn default_min_area() -> u32 {
    2048
}

fn default_min_height() -> u32 {
    32
}

fn default_max_dim() -> u32 {
    2048
}

impl Default for SurfaceLimits {
    fn default() -> Self {
        Self {
            min_area: default_min_area(),
            min_height: default_min_height(),
            max_dim: default_max_dim(),
        }
    }
}

impl SurfaceLimits {
    pub fn admits(&self, width: u32, height: u32) -> bool {
        width <= self.max_dim
            && height <= self.max_dim
            && width as u64 * height as u64 >= self.min_area as u64
            && height >= self.min_height
    }
}

/// Evict surfaces that keep failing acceleration.
///
/// A failure on a surface with more than `min_failures` failures evicts it when
/// `failure_weight * failures >= use_weight * uses`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DemotionPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_min_failures")]
    pub min_failures: u32,
    #[serde(default = "default_failure_weight")]
    pub failure_weight: u32,
    #[serde(default = "default_use_weight")]
    pub use_weight: u32,
}

fn default_min_failures() -> u32 {
    4
}

fn default_failure_weight() -> u32 {
    2
}

fn default_use_weight() -> u32 {
    5
}

impl Default for DemotionPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            min_failures: default_min_failures(),
            failure_weight: default_failure_weight(),
            use_weight: default_use_weight(),
        }
    }
}

impl DemotionPolicy {
    pub fn should_demote(&self, failures: u32, uses: u32) -> bool {
        self.enabled
            && failures > self.min_failures
            && self.failure_weight as u64 * failures as u64 >= self.use_weight as u64 * uses as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AccelConfig::default();
        assert_eq!(config.resolve_backend(), Some(BackendKind::Z160));
        assert!(config.compositing);
        assert!(!config.demotion.enabled);
        assert_eq!(config.limits.min_area, 2048);
    }

    #[test]
    fn test_backend_resolution() {
        let mut config = AccelConfig::default();
        config.backend = "Z430".to_string();
        assert_eq!(config.resolve_backend(), Some(BackendKind::Z430));

        config.backend = "something-else".to_string();
        assert_eq!(config.resolve_backend(), Some(BackendKind::Z160));

        config.backend = "none".to_string();
        assert_eq!(config.resolve_backend(), None);

        config.backend = "z160".to_string();
        config.accel_method = "uxa".to_string();
        assert_eq!(config.resolve_backend(), None);

        config.accel_method = "EXA".to_string();
        config.no_accel = true;
        assert_eq!(config.resolve_backend(), None);
    }

    #[test]
    fn test_partial_toml() {
        let config: AccelConfig = toml::from_str(
            r#"
            backend = "z430"
            compositing = false

            [demotion]
            enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(config.resolve_backend(), Some(BackendKind::Z430));
        assert!(!config.compositing);
        assert!(config.demotion.enabled);
        assert_eq!(config.demotion.min_failures, 4);
        assert_eq!(config.limits, SurfaceLimits::default());
    }

    #[test]
    fn test_limits() {
        let limits = SurfaceLimits::default();
        assert!(limits.admits(64, 64));
        assert!(!limits.admits(8, 8));
        assert!(!limits.admits(2048, 31));
        assert!(!limits.admits(2049, 64));
        assert!(limits.admits(64, 32));
    }

    #[test]
    fn test_demotion_threshold() {
        let mut policy = DemotionPolicy::default();
        assert!(!policy.should_demote(100, 0));

        policy.enabled = true;
        assert!(!policy.should_demote(4, 0));
        assert!(policy.should_demote(5, 2));
        assert!(!policy.should_demote(5, 3));
    }
}
