//! JSON configuration. Absent or malformed config falls back to
//! defaults with a warning.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_VAR: &str = "VIOLET_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnisotropicFilteringConfig {
    pub enabled: bool,
    pub max_anisotropy: f32,
}

impl Default for AnisotropicFilteringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_anisotropy: 16.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MsaaSamples {
    X1 = 1,
    X2 = 2,
    X4 = 4,
    X8 = 8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MsaaConfig {
    pub enabled: bool,
    pub samples: MsaaSamples,
}

impl Default for MsaaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            samples: MsaaSamples::X1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RendererSection {
    pub anisotropic_filtering: AnisotropicFilteringConfig,
    pub msaa: MsaaConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RendererConfig {
    pub renderer: RendererSection,
}

impl RendererConfig {
    /// Clamp `max_anisotropy` to what the device actually supports; the
    /// config value is a request, not a guarantee.
    pub fn clamp_to_device(&mut self, max_sampler_anisotropy: f32) {
        self.renderer.anisotropic_filtering.max_anisotropy = self
            .renderer
            .anisotropic_filtering
            .max_anisotropy
            .min(max_sampler_anisotropy)
            .max(1.0);
    }

    /// `None` (and not a hard error) iff the requested sample count is
    /// unsupported by both color and depth attachments — open question in
    /// MSAA must fail config load cleanly if unsupported, which
    /// here means "ignore the config and keep MSAA disabled" rather than
    /// aborting renderer startup.
    pub fn resolve_msaa(
        &self,
        color_supported: ash::vk::SampleCountFlags,
        depth_supported: ash::vk::SampleCountFlags,
    ) -> ash::vk::SampleCountFlags {
        if !self.renderer.msaa.enabled {
            return ash::vk::SampleCountFlags::TYPE_1;
        }
        let requested = match self.renderer.msaa.samples {
            MsaaSamples::X1 => ash::vk::SampleCountFlags::TYPE_1,
            MsaaSamples::X2 => ash::vk::SampleCountFlags::TYPE_2,
            MsaaSamples::X4 => ash::vk::SampleCountFlags::TYPE_4,
            MsaaSamples::X8 => ash::vk::SampleCountFlags::TYPE_8,
        };
        if color_supported.contains(requested) && depth_supported.contains(requested) {
            requested
        } else {
            log::warn!(
                "requested MSAA sample count {requested:?} unsupported by color+depth \
                 attachments (color: {color_supported:?}, depth: {depth_supported:?}); \
                 disabling MSAA"
            );
            ash::vk::SampleCountFlags::TYPE_1
        }
    }

    pub fn load_from_env() -> Self {
        let path = std::env::var(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => config,
                Err(err) => {
                    log::warn!(
                        "malformed config at {}: {err}; using defaults",
                        path.display()
                    );
                    Self::default()
                }
            },
            Err(_) => {
                log::warn!(
                    "no config found at {}; using device-derived defaults",
                    path.display()
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = RendererConfig::load_from_path(Path::new("/nonexistent/config.json"));
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn malformed_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = RendererConfig::load_from_path(&path);
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn valid_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"renderer":{"anisotropicFiltering":{"enabled":true,"maxAnisotropy":8.0},"msaa":{"enabled":true,"samples":4}}}"#,
        )
        .unwrap();
        let config = RendererConfig::load_from_path(&path);
        assert!(config.renderer.msaa.enabled);
        assert_eq!(config.renderer.msaa.samples, MsaaSamples::X4);
        assert_eq!(config.renderer.anisotropic_filtering.max_anisotropy, 8.0);
    }

    #[test]
    fn clamp_limits_anisotropy_to_device() {
        let mut config = RendererConfig::default();
        config.renderer.anisotropic_filtering.max_anisotropy = 32.0;
        config.clamp_to_device(8.0);
        assert_eq!(config.renderer.anisotropic_filtering.max_anisotropy, 8.0);
    }

    #[test]
    fn msaa_falls_back_when_unsupported() {
        let mut config = RendererConfig::default();
        config.renderer.msaa.enabled = true;
        config.renderer.msaa.samples = MsaaSamples::X8;
        let resolved = config.resolve_msaa(
            ash::vk::SampleCountFlags::TYPE_1 | ash::vk::SampleCountFlags::TYPE_4,
            ash::vk::SampleCountFlags::TYPE_1 | ash::vk::SampleCountFlags::TYPE_4,
        );
        assert_eq!(resolved, ash::vk::SampleCountFlags::TYPE_1);
    }
}
