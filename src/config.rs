//! Configuration for h5pack.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (H5PACK_HOME, H5PACK_CACHE_DIR,
//!    H5PACK_LIBRARY_URL, H5PACK_AI_PROVIDER)
//! 2. Config file (.h5pack/config.yaml)
//! 3. Defaults (~/.h5pack)
//!
//! Config file discovery:
//! - Searches current directory and parents for .h5pack/config.yaml
//! - Paths in config file are relative to the .h5pack/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::LibraryIdentifier;
use crate::library::DEFAULT_URL_TEMPLATE;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".h5pack";
const CONFIG_FILE: &str = "config.yaml";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub library: Option<LibraryConfig>,
    #[serde(default)]
    pub ai: Option<AiConfig>,
    #[serde(default)]
    pub package: Option<PackageConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .h5pack/)
    pub home: Option<String>,
    /// Cache directory (relative to .h5pack/)
    pub cache: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryConfig {
    pub url_template: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_key_env: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageConfig {
    pub column_library: Option<LibraryIdentifier>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Absolute path to h5pack home
    pub home: PathBuf,
    /// Absolute path to the cache root
    pub cache: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub library: LibrarySettings,
    pub ai: AiSettings,
    pub package: PackageSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct LibrarySettings {
    /// URL template with `{name}`, `{major}` and `{minor}` placeholders
    pub url_template: String,
    pub timeout_seconds: u64,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AiSettings {
    /// `none`, `openai` or `fabric`
    pub provider: String,
    /// Model name (openai) or pattern (fabric)
    pub model: Option<String>,
    pub endpoint: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_seconds: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: "none".to_string(),
            model: None,
            endpoint: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageSettings {
    /// Container library for `column` packages
    pub column_library: LibraryIdentifier,
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            column_library: LibraryIdentifier::new("H5P.Column", 1, 18),
        }
    }
}

impl ResolvedConfig {
    /// Directory holding cached library bundles
    pub fn libraries_dir(&self) -> PathBuf {
        self.cache.join("libraries")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge file, environment and defaults into a resolved config
fn resolve_config(
    file: Option<(&Path, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
    default_home: PathBuf,
) -> ResolvedConfig {
    let (config_file, config) = match file {
        Some((path, config)) => (Some(path.to_path_buf()), config),
        None => (None, ConfigFile::default()),
    };

    // Paths in the file are relative to .h5pack/
    let config_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(Path::new("."));

    let home = if let Some(env_home) = env("H5PACK_HOME") {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = config.paths.home {
        resolve_path(config_dir, home_path)
    } else {
        default_home
    };

    let cache = if let Some(env_cache) = env("H5PACK_CACHE_DIR") {
        PathBuf::from(env_cache)
    } else if let Some(ref cache_path) = config.paths.cache {
        resolve_path(config_dir, cache_path)
    } else {
        home.join("cache")
    };

    let mut library = LibrarySettings::default();
    if let Some(file_library) = config.library {
        if let Some(url_template) = file_library.url_template {
            library.url_template = url_template;
        }
        if let Some(timeout) = file_library.timeout_seconds {
            library.timeout_seconds = timeout;
        }
    }
    if let Some(url_template) = env("H5PACK_LIBRARY_URL") {
        library.url_template = url_template;
    }

    let mut ai = AiSettings::default();
    if let Some(file_ai) = config.ai {
        if let Some(provider) = file_ai.provider {
            ai.provider = provider;
        }
        if let Some(api_key_env) = file_ai.api_key_env {
            ai.api_key_env = api_key_env;
        }
        if let Some(timeout) = file_ai.timeout_seconds {
            ai.timeout_seconds = timeout;
        }
        ai.model = file_ai.model;
        ai.endpoint = file_ai.endpoint;
    }
    if let Some(provider) = env("H5PACK_AI_PROVIDER") {
        ai.provider = provider;
    }

    let package = config
        .package
        .and_then(|p| p.column_library)
        .map(|column_library| PackageSettings { column_library })
        .unwrap_or_default();

    ResolvedConfig {
        home,
        cache,
        config_file,
        library,
        ai,
        package,
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    let file = match find_config_file() {
        Some(path) => {
            let parsed = load_config_file(&path)?;
            Some((path, parsed))
        }
        None => None,
    };

    Ok(resolve_config(
        file.as_ref().map(|(path, parsed)| (path.as_path(), parsed.clone())),
        |key| std::env::var(key).ok(),
        default_home,
    ))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve_config(None, no_env, PathBuf::from("/home/u/.h5pack"));

        assert_eq!(config.home, PathBuf::from("/home/u/.h5pack"));
        assert_eq!(config.libraries_dir(), PathBuf::from("/home/u/.h5pack/cache/libraries"));
        assert_eq!(config.library.url_template, DEFAULT_URL_TEMPLATE);
        assert_eq!(config.ai.provider, "none");
        assert_eq!(
            config.package.column_library,
            LibraryIdentifier::new("H5P.Column", 1, 18)
        );
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();

        let config_path = config_dir.join(CONFIG_FILE);
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1"
paths:
  cache: ../build-cache
library:
  url_template: "https://libs.example.org/{{name}}-{{major}}.{{minor}}.zip"
  timeout_seconds: 5
ai:
  provider: openai
  model: gpt-test
package:
  column_library: "H5P.Column 1.17"
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        let config = resolve_config(Some((&config_path, parsed)), no_env, PathBuf::from("/unused"));

        assert_eq!(config.home, PathBuf::from("/unused"));
        assert!(config.cache.ends_with("build-cache"));
        assert_eq!(
            config.library.url_template,
            "https://libs.example.org/{name}-{major}.{minor}.zip"
        );
        assert_eq!(config.library.timeout_seconds, 5);
        assert_eq!(config.ai.provider, "openai");
        assert_eq!(config.ai.model.as_deref(), Some("gpt-test"));
        assert_eq!(config.ai.api_key_env, "OPENAI_API_KEY");
        assert_eq!(
            config.package.column_library,
            LibraryIdentifier::new("H5P.Column", 1, 17)
        );
    }

    #[test]
    fn test_environment_wins_over_file() {
        let file = ConfigFile {
            ai: Some(AiConfig {
                provider: Some("openai".to_string()),
                model: None,
                endpoint: None,
                api_key_env: None,
                timeout_seconds: None,
            }),
            ..ConfigFile::default()
        };
        let env: HashMap<&str, &str> = [
            ("H5PACK_HOME", "/env/home"),
            ("H5PACK_LIBRARY_URL", "http://localhost/{name}"),
            ("H5PACK_AI_PROVIDER", "fabric"),
        ]
        .into_iter()
        .collect();

        let config = resolve_config(
            Some((Path::new("/proj/.h5pack/config.yaml"), file)),
            |key| env.get(key).map(|v| v.to_string()),
            PathBuf::from("/unused"),
        );

        assert_eq!(config.home, PathBuf::from("/env/home"));
        assert_eq!(config.cache, PathBuf::from("/env/home/cache"));
        assert_eq!(config.library.url_template, "http://localhost/{name}");
        assert_eq!(config.ai.provider, "fabric");
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
