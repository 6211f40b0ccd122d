use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pedal_core::{FiniteHorizonOptions, SweepBudget};
use serde::{Deserialize, Serialize};

/// Environment variable naming a config file when `--config` is absent.
pub const CONFIG_ENV: &str = "PEDAL_CONFIG";

/// Decimal digits for `objective` and `c-infinity` when nothing overrides it.
pub const DEFAULT_DIGITS: u32 = 50;

/// Settings file layout:
///
/// ```toml
/// [finite_horizon]
/// grid_resolution = 300
/// multi_start = 100
///
/// [sweep]
/// seconds = 120.0
/// min_points = 80
/// max_points = 350
///
/// [long_horizon]
/// digits = 50
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PedalConfig {
    pub finite_horizon: FiniteHorizonOptions,
    pub sweep: SweepBudget,
    pub long_horizon: LongHorizonConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LongHorizonConfig {
    pub digits: u32,
}

impl Default for LongHorizonConfig {
    fn default() -> Self {
        Self {
            digits: DEFAULT_DIGITS,
        }
    }
}

impl PedalConfig {
    /// Load from `explicit`, else from `$PEDAL_CONFIG`, else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        tracing::debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: PedalConfig = toml::from_str("").unwrap();
        assert_eq!(config, PedalConfig::default());
        assert_eq!(config.long_horizon.digits, 50);
        assert_eq!(config.finite_horizon.grid_resolution, 300);
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config: PedalConfig = toml::from_str(
            "[finite_horizon]\nmulti_start = 7\n\n[long_horizon]\ndigits = 25\n",
        )
        .unwrap();
        assert_eq!(config.finite_horizon.multi_start, 7);
        assert_eq!(config.finite_horizon.grid_resolution, 300);
        assert_eq!(config.long_horizon.digits, 25);
        assert_eq!(config.sweep, SweepBudget::default());
    }

    #[test]
    fn test_sweep_budget_section() {
        let config: PedalConfig =
            toml::from_str("[sweep]\nseconds = 5.0\nmax_points = 90\n").unwrap();
        assert_eq!(config.sweep.seconds, 5.0);
        assert_eq!(config.sweep.min_points, 80);
        assert_eq!(config.sweep.max_points, 90);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(toml::from_str::<PedalConfig>("[long_horizon]\nprecision = 3\n").is_err());
        assert!(toml::from_str::<PedalConfig>("[finite_horizon]\ngrid = 10\n").is_err());
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = PedalConfig::from_file(Path::new("/nonexistent/pedal.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read config"));
    }
}
