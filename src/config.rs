use crate::error::{ConfigError, Result};
use crate::interop::{TypeDescriptor, TypeRegistry, TypeTag, DEFAULT_MAX_DEPTH};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File name looked up by `BridgeConfig::discover`
pub const CONFIG_FILE: &str = "mazebridge.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub module: ModuleConfig,

    #[serde(default)]
    pub bridge: BridgeSettings,

    /// Struct descriptors keyed by struct name
    #[serde(default)]
    pub structs: BTreeMap<String, StructConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_memory")]
    pub memory_export: String,

    #[serde(default = "default_allocate")]
    pub allocate_export: String,

    #[serde(default = "default_release")]
    pub release_export: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructConfig {
    pub fields: Vec<FieldConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub tag: String,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            path: None,
            memory_export: default_memory(),
            allocate_export: default_allocate(),
            release_export: default_release(),
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

fn default_memory() -> String { "memory".to_string() }
fn default_allocate() -> String { "allocate".to_string() }
fn default_release() -> String { "release".to_string() }
fn default_max_depth() -> usize { DEFAULT_MAX_DEPTH }

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("failed to read {}: {}", path.display(), e)))?;

        let mut config = Self::from_toml_str(&content)?;
        // module paths are relative to the config file
        if let (Some(module), Some(dir)) = (config.module.path.as_mut(), path.parent()) {
            if module.is_relative() {
                *module = dir.join(&*module);
            }
        }
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ConfigError::Load(format!("failed to parse config: {}", e)).into())
    }

    /// Find `mazebridge.toml` in the current directory or its parents
    ///
    /// `Ok(None)` when there is no such file; a file that exists but does not
    /// load is an error.
    pub fn discover() -> Result<Option<Self>> {
        let start = std::env::current_dir()
            .map_err(|e| ConfigError::Load(format!("no current directory: {}", e)))?;
        Self::discover_from(&start)
    }

    /// `discover`, starting at `dir` instead of the current directory
    pub fn discover_from(dir: &Path) -> Result<Option<Self>> {
        for dir in dir.ancestors() {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Self::from_file(&candidate).map(Some);
            }
        }
        Ok(None)
    }

    /// Register every `[structs.*]` entry as a named-record descriptor
    pub fn register_structs(&self, registry: &mut TypeRegistry) -> Result<()> {
        for (name, config) in &self.structs {
            registry.register(name.as_str(), config.descriptor()?)?;
        }
        Ok(())
    }

    #[cfg(feature = "wasmi")]
    pub fn exports(&self) -> crate::interop::WasmExports {
        crate::interop::WasmExports {
            memory: self.module.memory_export.clone(),
            allocate: self.module.allocate_export.clone(),
            release: self.module.release_export.clone(),
        }
    }
}

impl StructConfig {
    pub fn descriptor(&self) -> Result<TypeDescriptor> {
        let fields = self
            .fields
            .iter()
            .map(|field| -> Result<(String, TypeTag)> { Ok((field.name.clone(), field.tag.parse()?)) })
            .collect::<Result<Vec<_>>>()?;
        Ok(TypeDescriptor::record(fields))
    }
}
