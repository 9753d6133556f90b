//! Preview settings loaded from `artifact-preview.toml`.
//!
//! Every field has a default, so an empty file (or no file) is valid.

use crate::error::ConfigError;
use crate::parser::DEFAULT_MAX_NESTING;
use crate::registry::CollisionPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "artifact-preview.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreviewConfig {
    /// File name used in diagnostic reports.
    pub source_name: String,
    pub transform: TransformConfig,
    pub sandbox: SandboxConfig,
    pub render: RenderConfig,
    pub registry: RegistryConfig,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            source_name: "component.jsx".to_string(),
            transform: TransformConfig::default(),
            sandbox: SandboxConfig::default(),
            render: RenderConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    /// Call that markup elements are lowered to.
    pub pragma: String,
    /// Element type used for `<>...</>`.
    pub pragma_frag: String,
    /// Deepest nesting of brackets, markup and operator chains in component source.
    pub max_nesting: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            pragma: "React.createElement".to_string(),
            pragma_frag: "React.Fragment".to_string(),
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxConfig {
    pub max_call_depth: usize,
    /// Nesting limit for generated code. Each markup level lowers to a
    /// member call, so this is a few times `transform.max_nesting`.
    pub max_nesting: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 64,
            max_nesting: 4 * DEFAULT_MAX_NESTING,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    pub max_depth: usize,
    /// Text shown while no attempt has finished.
    pub placeholder: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            placeholder: "Loading...".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    pub collisions: CollisionPolicy,
}

impl PreviewConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Search upward from `start` for `artifact-preview.toml`.
    ///
    /// Falls back to defaults when no file is found.
    pub fn discover(start: &Path) -> Result<(Self, Option<PathBuf>), ConfigError> {
        match find_config_file(start) {
            Some(path) => {
                log::debug!("Using config {}", path.display());
                Ok((Self::load(&path)?, Some(path)))
            }
            None => Ok((Self::default(), None)),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, limit) in [
            ("transform.max_nesting", self.transform.max_nesting),
            ("sandbox.max_call_depth", self.sandbox.max_call_depth),
            ("sandbox.max_nesting", self.sandbox.max_nesting),
            ("render.max_depth", self.render.max_depth),
        ] {
            if limit == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: "must be at least 1".to_string(),
                });
            }
        }
        for (field, path) in [
            ("transform.pragma", &self.transform.pragma),
            ("transform.pragma_frag", &self.transform.pragma_frag),
        ] {
            if !path.split('.').all(crate::parser::is_identifier_name) {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("'{path}' is not an identifier or member path"),
                });
            }
        }
        Ok(())
    }
}

fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        assert_eq!(PreviewConfig::from_toml_str("").unwrap(), PreviewConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let config = PreviewConfig::from_toml_str(
            r#"
            source_name = "App.jsx"

            [transform]
            pragma = "h"

            [registry]
            collisions = "last-wins"
            "#,
        )
        .unwrap();
        assert_eq!(config.source_name, "App.jsx");
        assert_eq!(config.transform.pragma, "h");
        assert_eq!(config.transform.pragma_frag, "React.Fragment");
        assert_eq!(config.registry.collisions, CollisionPolicy::LastWins);
        assert_eq!(config.sandbox.max_call_depth, 64);
        assert_eq!(config.transform.max_nesting, DEFAULT_MAX_NESTING);
        assert_eq!(config.sandbox.max_nesting, 256);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            PreviewConfig::from_toml_str("[sandbox]\nmax_call_depth = 0"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            PreviewConfig::from_toml_str("[transform]\nmax_nesting = 0"),
            Err(ConfigError::Invalid {
                field: "transform.max_nesting",
                ..
            })
        ));
        assert!(matches!(
            PreviewConfig::from_toml_str("[transform]\npragma = \"create-element\""),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            PreviewConfig::from_toml_str("unknown = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_discover_walks_upward() {
        let root = std::env::temp_dir().join(format!("artifact-preview-config-{}", std::process::id()));
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join(CONFIG_FILE_NAME), "[render]\nplaceholder = \"Wait\"").unwrap();

        let (config, path) = PreviewConfig::discover(&nested).unwrap();
        assert_eq!(config.render.placeholder, "Wait");
        assert_eq!(path, Some(root.join(CONFIG_FILE_NAME)));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
