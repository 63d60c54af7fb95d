//! Engine configuration.
//!
//! Every field has a default, so a configuration file only needs the
//! settings it changes:
//!
//! ```json
//! { "target": "es2020", "execution_timeout_ms": 5000 }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default ECMAScript target for typed and markup cells.
pub const DEFAULT_TARGET: &str = "es2022";

/// Default name of the namespace binding visible to cells.
pub const DEFAULT_NAMESPACE_BINDING: &str = "sharedNamespace";

/// Configuration for a notebook session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// ECMAScript target revision for lowering (e.g. `es2022`).
    pub target: String,

    /// Markup construction call emitted for JSX elements.
    pub jsx_factory: String,

    /// Markup construction value emitted for JSX fragments.
    pub jsx_fragment: String,

    /// Global through which cells publish and read shared bindings.
    pub namespace_binding: String,

    /// Interpreter stack limit in bytes.
    pub max_stack_size: usize,

    /// Interpreter heap limit in bytes. `None` leaves the heap unbounded.
    pub memory_limit: Option<usize>,

    /// Wall-clock budget for one execution. `None` means no timeout.
    pub execution_timeout_ms: Option<u64>,

    /// Directories searched when a cell imports a module by path.
    pub module_search_paths: Vec<PathBuf>,

    /// Layout metrics for sandbox surfaces.
    pub surface: SurfaceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            jsx_factory: "React.createElement".to_string(),
            jsx_fragment: "React.Fragment".to_string(),
            namespace_binding: DEFAULT_NAMESPACE_BINDING.to_string(),
            max_stack_size: 2 * 1024 * 1024,
            memory_limit: None,
            execution_timeout_ms: None,
            module_search_paths: Vec::new(),
            surface: SurfaceConfig::default(),
        }
    }
}

/// Metrics of the headless layout used to size sandbox surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub width_px: u32,
    pub line_height_px: u32,
    pub char_width_px: u32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width_px: 800,
            line_height_px: 20,
            char_width_px: 8,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::debug!("Loaded engine configuration from {}", path.display());
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.namespace_binding) {
            return Err(Error::Config(format!(
                "namespace binding `{}` is not a valid identifier",
                self.namespace_binding
            )));
        }
        for (name, value) in [
            ("jsx_factory", &self.jsx_factory),
            ("jsx_fragment", &self.jsx_fragment),
        ] {
            if value.is_empty() || !value.split('.').all(is_identifier) {
                return Err(Error::Config(format!(
                    "{name} `{value}` is not a dotted identifier path"
                )));
            }
        }
        if self.surface.width_px == 0
            || self.surface.line_height_px == 0
            || self.surface.char_width_px == 0
        {
            return Err(Error::Config(
                "surface metrics must be non-zero".to_string(),
            ));
        }
        if self.max_stack_size == 0 {
            return Err(Error::Config("max_stack_size must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Execution timeout as a [`Duration`].
    pub fn execution_timeout(&self) -> Option<Duration> {
        self.execution_timeout_ms.map(Duration::from_millis)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.namespace_binding, "sharedNamespace");
        assert_eq!(config.execution_timeout(), None);
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "target": "es2020", "execution_timeout_ms": 250, "surface": {{ "width_px": 400 }} }}"#
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.target, "es2020");
        assert_eq!(config.execution_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.surface.width_px, 400);
        assert_eq!(config.surface.line_height_px, 20);
        assert_eq!(config.jsx_factory, "React.createElement");
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = EngineConfig::from_file(dir.path().join("absent.json"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_from_file_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            EngineConfig::from_file(file.path()),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_invalid_namespace_binding() {
        let config = EngineConfig {
            namespace_binding: "shared-namespace".to_string(),
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_jsx_factory() {
        let config = EngineConfig {
            jsx_factory: "React..createElement".to_string(),
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_surface_metrics_rejected() {
        let config = EngineConfig {
            surface: SurfaceConfig {
                char_width_px: 0,
                ..SurfaceConfig::default()
            },
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
