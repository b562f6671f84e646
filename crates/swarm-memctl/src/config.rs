use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use swarm_memory::MemoryConfig;

/// Command-line overrides applied on top of file and environment config.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub namespace: Option<String>,
    pub path: Option<PathBuf>,
}

/// Build the namespace config: defaults, then the TOML file, then
/// `SWARM_MEMORY_*` variables, then command-line flags.
pub fn resolve(file: Option<&Path>, overrides: &Overrides) -> Result<MemoryConfig> {
    let mut config = match file {
        Some(path) => MemoryConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => MemoryConfig::default(),
    };
    config.apply_env();
    apply_overrides(&mut config, overrides);
    config.validate().context("Invalid memory configuration")?;
    Ok(config)
}

fn apply_overrides(config: &mut MemoryConfig, overrides: &Overrides) {
    if let Some(ns) = &overrides.namespace {
        config.namespace = ns.clone();
    }
    if let Some(path) = &overrides.path {
        config.persistence_path = Some(path.clone());
    }
}
