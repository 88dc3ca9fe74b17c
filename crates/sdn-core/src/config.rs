//! Environment and settings loading
//!
//! Deployment knobs live in a `KEY=VALUE` environment file
//! (`/etc/sdn-controller/environment` by default). The topology itself is a
//! TOML settings file layered under `SDN_*` environment overrides.
//!
//! ## Usage
//!
//! Call `load_environment()` early in main(), before loading settings:
//!
//! ```rust,no_run
//! use sdn_core::config::{load_environment, load_settings};
//!
//! #[derive(Default, serde::Deserialize)]
//! struct MySettings {
//!     #[serde(default)]
//!     name: String,
//! }
//!
//! load_environment();
//! let settings: MySettings = load_settings(None, "SDN").unwrap();
//! ```

use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Variable naming an environment file that takes precedence over the defaults
pub const ENV_FILE_VAR: &str = "SDN_ENV_FILE";

/// Default controller settings file
pub const DEFAULT_SETTINGS_FILE: &str = "/etc/sdn-controller/controller.toml";

/// Environment files tried in order after `SDN_ENV_FILE`
pub const ENV_FILE_PATHS: &[&str] = &[
    "/etc/sdn-controller/environment",
    "/etc/sdn-controller.env",
    ".env",
];

/// Outcome of applying one environment file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFileReport {
    pub path: PathBuf,
    pub loaded: usize,
    /// Keys already present in the process environment
    pub skipped: usize,
}

/// Environment files in lookup order
pub fn env_file_candidates() -> Vec<PathBuf> {
    std::env::var_os(ENV_FILE_VAR)
        .map(PathBuf::from)
        .into_iter()
        .chain(ENV_FILE_PATHS.iter().map(PathBuf::from))
        .collect()
}

/// Apply the first readable environment file. Variables that are already
/// set are left alone.
pub fn load_environment() -> Option<EnvFileReport> {
    for path in env_file_candidates() {
        if !path.is_file() {
            continue;
        }
        match apply_env_file(&path) {
            Ok(report) => {
                info!(
                    loaded = report.loaded,
                    skipped = report.skipped,
                    "Loaded environment from {}",
                    report.path.display()
                );
                return Some(report);
            }
            Err(e) => warn!("{}", e),
        }
    }

    debug!("No environment file found, using process environment");
    None
}

/// Set every variable from `path` that the process does not already have
pub fn apply_env_file(path: &Path) -> Result<EnvFileReport> {
    let content = fs::read_to_string(path).map_err(|source| Error::EnvFile {
        path: path.to_path_buf(),
        source,
    })?;

    let mut report = EnvFileReport {
        path: path.to_path_buf(),
        loaded: 0,
        skipped: 0,
    };
    for (key, value) in content.lines().filter_map(parse_env_line) {
        if std::env::var_os(&key).is_some() {
            debug!("Keeping existing {}", key);
            report.skipped += 1;
            continue;
        }
        std::env::set_var(&key, &value);
        report.loaded += 1;
    }
    Ok(report)
}

/// `KEY=VALUE`, optionally `export`-prefixed and single or double quoted.
/// Blank lines and `#` comments yield `None`.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);

    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }

    let value = value.trim();
    let value = ['"', '\'']
        .iter()
        .find_map(|&quote| value.strip_prefix(quote)?.strip_suffix(quote))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

/// Load structured settings.
///
/// Layers, lowest to highest precedence:
/// - serde defaults of `T`
/// - the TOML file at `path` (must exist when given), else the optional
///   `DEFAULT_SETTINGS_FILE`
/// - `{env_prefix}_*` variables, nested keys split on `__`
///   (`SDN_ARP__REQUIRE_KNOWN_TARGET=true`)
pub fn load_settings<T: DeserializeOwned>(path: Option<&Path>, env_prefix: &str) -> Result<T> {
    let file = match path {
        Some(path) => {
            info!("Loading settings from {}", path.display());
            config::File::from(path).required(true)
        }
        None => config::File::with_name(DEFAULT_SETTINGS_FILE)
            .format(config::FileFormat::Toml)
            .required(false),
    };

    let env = config::Environment::with_prefix(env_prefix)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true);

    let settings = config::Config::builder()
        .add_source(file)
        .add_source(env)
        .build()?;
    Ok(settings.try_deserialize()?)
}
