//! Configuration file management
//!
//! Loads TOML settings for buffer uploads, diagnostics, framebuffers and the
//! shader manifest.
//! Default config path: ~/.config/glkit/config.toml

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::gpu::{BufferUsage, ShaderOptions};

/// Library settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Buffer upload settings
    pub buffers: BufferConfig,
    /// Diagnostic output settings
    pub diagnostics: DiagnosticsConfig,
    /// Offscreen framebuffer settings
    pub framebuffer: FramebufferConfig,
    /// Shader programs built by `ShaderLibrary`
    #[serde(rename = "shader")]
    pub shaders: Vec<ShaderConfig>,
}

/// Buffer upload settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Usage hint: "static" | "dynamic" (default) | "stream"
    pub usage: String,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            usage: "dynamic".to_string(),
        }
    }
}

/// Diagnostic output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Warn when an uploaded attribute has no location in the program
    pub warn_missing: bool,
    /// Log the full source of a stage that fails to compile
    pub log_source_on_error: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            warn_missing: true,
            log_source_on_error: true,
        }
    }
}

/// Offscreen framebuffer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FramebufferConfig {
    /// MSAA sample count (1 = no multisampling)
    pub samples: u32,
}

impl Default for FramebufferConfig {
    fn default() -> Self {
        Self { samples: 4 }
    }
}

/// One shader program of the manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Program name (used in logs and for lookup)
    pub name: String,
    /// Vertex shader file (relative to the manifest directory)
    pub vertex: PathBuf,
    /// Fragment shader file
    pub fragment: PathBuf,
    /// Optional geometry shader file
    pub geometry: Option<PathBuf>,
    /// Preprocessor definitions injected into every stage
    pub defines: BTreeMap<String, String>,
}

impl BufferConfig {
    /// Parsed usage hint (falls back to dynamic)
    pub fn usage(&self) -> BufferUsage {
        BufferUsage::parse(&self.usage).unwrap_or_else(|| {
            warn!("Unknown buffer usage \"{}\", using dynamic", self.usage);
            BufferUsage::Dynamic
        })
    }
}

impl Config {
    /// Environment variable naming an explicit config file
    pub const ENV_VAR: &'static str = "GLKIT_CONFIG";

    /// Get the path that would be used for loading config
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. GLKIT_CONFIG environment variable
        if let Ok(path) = std::env::var(Self::ENV_VAR) {
            let p = Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        // 2. User config: ~/.config/glkit/config.toml
        let user_config = default_config_path()?;
        if user_config.exists() {
            return Some(user_config);
        }

        None
    }

    /// Load configuration with priority:
    /// 1. GLKIT_CONFIG environment variable
    /// 2. ~/.config/glkit/config.toml (user config)
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(&path) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config {}: {:#}", path.display(), e);
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Serialize back to TOML (for template generation)
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Shader behaviour derived from these settings
    pub fn shader_options(&self) -> ShaderOptions {
        ShaderOptions {
            usage: self.buffers.usage(),
            warn_missing: self.diagnostics.warn_missing,
            log_source_on_error: self.diagnostics.log_source_on_error,
        }
    }

    /// MSAA sample count for offscreen framebuffers (at least 1)
    pub fn framebuffer_samples(&self) -> u32 {
        self.framebuffer.samples.max(1)
    }

    /// Manifest entry by program name
    pub fn shader(&self, name: &str) -> Option<&ShaderConfig> {
        self.shaders.iter().find(|s| s.name == name)
    }
}

/// Get default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("glkit").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[buffers]
usage = "static"

[diagnostics]
log_source_on_error = false

[framebuffer]
samples = 8

[[shader]]
name = "mesh"
vertex = "mesh.vert"
fragment = "mesh.frag"

[shader.defines]
USE_NORMALS = "1"

[[shader]]
name = "lines"
vertex = "lines.vert"
fragment = "lines.frag"
geometry = "lines.geom"
"#;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.buffers.usage(), BufferUsage::Dynamic);
        assert!(config.diagnostics.warn_missing);
        assert_eq!(config.framebuffer.samples, 4);
        assert!(config.shaders.is_empty());
        assert_eq!(config.framebuffer_samples(), 4);
        assert_eq!(config.shader_options(), ShaderOptions::default());
    }

    #[test]
    fn test_parse_manifest() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.buffers.usage(), BufferUsage::Static);
        assert!(config.diagnostics.warn_missing);
        assert!(!config.diagnostics.log_source_on_error);
        assert_eq!(config.framebuffer_samples(), 8);
        assert_eq!(config.shaders.len(), 2);

        let mesh = config.shader("mesh").unwrap();
        assert_eq!(mesh.vertex, PathBuf::from("mesh.vert"));
        assert_eq!(mesh.geometry, None);
        assert_eq!(mesh.defines.get("USE_NORMALS").map(String::as_str), Some("1"));

        let lines = config.shader("lines").unwrap();
        assert_eq!(lines.geometry, Some(PathBuf::from("lines.geom")));
        assert!(lines.defines.is_empty());
    }

    #[test]
    fn test_unknown_usage_falls_back() {
        let config = Config::from_toml_str("[buffers]\nusage = \"sometimes\"\n").unwrap();
        assert_eq!(config.buffers.usage(), BufferUsage::Dynamic);
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        let again = Config::from_toml_str(&text).unwrap();
        assert_eq!(again.shaders.len(), 2);
        assert_eq!(again.framebuffer.samples, 8);
    }

    #[test]
    fn test_zero_samples_means_single() {
        let config = Config::from_toml_str("[framebuffer]\nsamples = 0\n").unwrap();
        assert_eq!(config.framebuffer_samples(), 1);
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(Config::from_toml_str("[framebuffer]\nsamples = \"many\"\n").is_err());
    }
}
