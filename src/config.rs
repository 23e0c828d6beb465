//! Configuration for rmc-run.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags
//! 2. Environment variables (RMC_RUN_RUNTIME, RMC_RUN_PACKAGE_MANAGER, ...),
//!    read by the CLI parser into the same overrides as the flags
//! 3. Config file (.rmc-run/config.yaml, or the file named by --config)
//! 4. User config file (<config dir>/rmc-run/config.yaml)
//! 5. Defaults (python, pip, renzmc)
//!
//! Config file discovery:
//! - Searches the current directory and its parents for .rmc-run/config.yaml
//! - Falls back to the user config file when none is found
//!
//! Nothing is ever written back; every run reads the configuration afresh.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::core::{CommandSpec, Toolchain};

/// Directory holding a project's config file
pub const CONFIG_DIR_NAME: &str = ".rmc-run";

/// Config file name inside [`CONFIG_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.yaml";

const DEFAULT_CANCEL_GRACE_MS: u64 = 2000;

/// The only config file schema version understood
pub const CONFIG_VERSION: &str = "1";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    #[serde(default)]
    pub process: ProcessConfig,
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            toolchain: ToolchainConfig::default(),
            process: ProcessConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolchainConfig {
    /// Runtime interpreter (string or list)
    pub runtime: Option<CommandSpec>,
    /// Package manager (string or list)
    pub package_manager: Option<CommandSpec>,
    /// Script launcher (string or list)
    pub launcher: Option<CommandSpec>,
    /// Companion package name
    pub package: Option<String>,
    /// Run the package manager through the shell
    pub package_manager_shell: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessConfig {
    /// Milliseconds between SIGTERM and SIGKILL on cancel
    pub cancel_grace_ms: Option<u64>,
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub runtime: Option<CommandSpec>,
    pub package_manager: Option<CommandSpec>,
    pub launcher: Option<CommandSpec>,
    pub package: Option<String>,
    pub package_manager_shell: Option<bool>,
    pub cancel_grace_ms: Option<u64>,
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Executables and package to use
    pub toolchain: Toolchain,
    /// Grace period for canceled processes
    pub cancel_grace: Duration,
    /// Path to config file (if one was used)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Merge overrides, an optional config file, and defaults
    pub fn resolve(file: Option<(PathBuf, ConfigFile)>, overrides: &Overrides) -> Self {
        let (config_file, file) = match file {
            Some((path, file)) => (Some(path), file),
            None => (None, ConfigFile::default()),
        };
        let defaults = Toolchain::default();
        let toolchain_file = file.toolchain;

        let toolchain = Toolchain {
            runtime: overrides
                .runtime
                .clone()
                .or(toolchain_file.runtime)
                .unwrap_or(defaults.runtime),
            package_manager: overrides
                .package_manager
                .clone()
                .or(toolchain_file.package_manager)
                .unwrap_or(defaults.package_manager),
            launcher: overrides
                .launcher
                .clone()
                .or(toolchain_file.launcher)
                .unwrap_or(defaults.launcher),
            package: overrides
                .package
                .clone()
                .or(toolchain_file.package)
                .unwrap_or(defaults.package),
            package_manager_shell: overrides
                .package_manager_shell
                .or(toolchain_file.package_manager_shell)
                .unwrap_or(defaults.package_manager_shell),
        };

        let cancel_grace_ms = overrides
            .cancel_grace_ms
            .or(file.process.cancel_grace_ms)
            .unwrap_or(DEFAULT_CANCEL_GRACE_MS);

        Self {
            toolchain,
            cancel_grace: Duration::from_millis(cancel_grace_ms),
            config_file,
        }
    }
}

/// Find config file by searching `start` and its parents
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
        if config_path.is_file() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Per-user config file, if it exists
fn user_config_file() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("rmc-run").join(CONFIG_FILE_NAME);
    path.is_file().then_some(path)
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let file: ConfigFile = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    if file.version != CONFIG_VERSION {
        bail!(
            "Unsupported config version {:?} in {} (expected {:?})",
            file.version,
            path.display(),
            CONFIG_VERSION
        );
    }
    Ok(file)
}

/// Load configuration from all sources
///
/// `explicit` names a config file that must exist; otherwise the file is
/// discovered from the current directory.
pub fn load_config(explicit: Option<&Path>, overrides: &Overrides) -> Result<ResolvedConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let cwd = std::env::current_dir().context("Failed to determine current directory")?;
            find_config_file(&cwd).or_else(user_config_file)
        }
    };

    let file = match path {
        Some(path) => {
            let file = load_config_file(&path)?;
            Some((path, file))
        }
        None => None,
    };

    Ok(ResolvedConfig::resolve(file, overrides))
}
