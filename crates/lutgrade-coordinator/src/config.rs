//! Coordinator configuration.

use std::str::FromStr;

use lutgrade_gpu::{GpuEngineOptions, Tier};
use serde::{Deserialize, Serialize};

/// Default blend strength for [`crate::ImageCoordinator::apply_default`].
const DEFAULT_STRENGTH: f32 = 1.0;

/// Which LUT backend the coordinator may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// GPU when it can be created, CPU otherwise and after GPU failures.
    #[default]
    Auto,
    /// GPU only; passes fail when it is unavailable.
    Gpu,
    /// CPU only; no GPU context is created.
    Cpu,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown backend {0:?}, expected auto, gpu or cpu")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendPreference {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "gpu" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

/// Runtime configuration for an [`crate::ImageCoordinator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Backend selection policy.
    #[serde(default)]
    pub backend: BackendPreference,
    /// Strength used when the caller gives none, in `[0, 1]`.
    #[serde(default = "default_strength")]
    pub default_strength: f32,
    /// Use the tiled 2D LUT path even when 3D textures are available.
    #[serde(default)]
    pub force_legacy_tier: bool,
}

fn default_strength() -> f32 {
    DEFAULT_STRENGTH
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl CoordinatorConfig {
    /// Build a config from `LUTGRADE_*` variables supplied by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let backend = match lookup("LUTGRADE_BACKEND") {
            Some(value) => value.parse().unwrap_or_else(|e| {
                tracing::warn!("ignoring LUTGRADE_BACKEND: {e}");
                BackendPreference::default()
            }),
            None => BackendPreference::default(),
        };
        Self {
            backend,
            default_strength: lookup("LUTGRADE_STRENGTH")
                .and_then(|s| s.trim().parse::<f32>().ok())
                .map(lutgrade_core::sanitize_strength)
                .unwrap_or(DEFAULT_STRENGTH),
            force_legacy_tier: lookup("LUTGRADE_FORCE_LEGACY")
                .is_some_and(|s| matches!(s.trim(), "1" | "true" | "yes")),
        }
    }

    /// Options for creating the GPU engine under this config.
    pub fn gpu_options(&self) -> GpuEngineOptions {
        GpuEngineOptions {
            force_tier: self.force_legacy_tier.then_some(Tier::Legacy),
            ..Default::default()
        }
    }
}
