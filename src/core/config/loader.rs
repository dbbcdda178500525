#![allow(clippy::result_large_err)]

use super::{ConfigStore, SearchRequest, CMDLINE_SECTION, COMPUTED_SECTION};
use crate::core::error::{codes, AppError};
use crate::core::types::ErrorCategory;
use genflow_backend::{Backend, BackendRegistry};
use serde_json::{Map, Value};
use std::env;
use std::path::{Path, PathBuf};

const DEFAULTS: &str = include_str!("defaults.yaml");

/// Backend used when neither the command line, the file, nor the environment names one.
pub const DEFAULT_BACKEND: &str = "dryrun";

/// Inputs that make up one run configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// User configuration file (YAML, JSON or TOML).
    pub file: Option<PathBuf>,
    /// `key=value` overrides. Dotted keys address the tree absolutely; plain
    /// keys land in the `cmdline` section.
    pub overrides: Vec<String>,
    pub backend: Option<String>,
    pub submit_path: Option<PathBuf>,
}

/// A loaded store plus the backend it was layered for.
pub struct LoadedConfig {
    pub store: ConfigStore,
    pub backend: Box<dyn Backend>,
}

impl std::fmt::Debug for LoadedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedConfig")
            .field("store", &self.store)
            .field("backend", &self.backend.name())
            .finish()
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Layer defaults, backend defaults, the user file and overrides, then
    /// compute the derived keys.
    pub fn load(sources: &ConfigSources, registry: &BackendRegistry) -> Result<LoadedConfig, AppError> {
        let mut root: Value = serde_yaml::from_str(DEFAULTS).map_err(|e| {
            AppError::new(
                ErrorCategory::InternalError,
                format!("Failed to parse built-in defaults: {}", e),
            )
        })?;

        let user = match &sources.file {
            Some(path) => Some(Self::load_from_file(path)?.ok_or_else(|| {
                AppError::configuration(
                    codes::INVALID_SOURCE,
                    format!("Config file {} does not exist", path.display()),
                )
                .with_detail("path", path.display().to_string())
            })?),
            None => None,
        };

        let backend_name = Self::select_backend(sources, user.as_ref());
        let backend = registry.create(&backend_name)?;
        merge_values(&mut root, backend.default_config());
        if let Some(user) = user {
            merge_values(&mut root, user);
        }

        let mut store = ConfigStore::with_default_order(root)?;
        for raw in &sources.overrides {
            Self::apply_override(&mut store, raw)?;
        }
        if let Some(submit_path) = &sources.submit_path {
            store.set(
                &format!("{}.submitPath", CMDLINE_SECTION),
                Value::String(submit_path.display().to_string()),
            );
        }
        Self::apply_env_overrides(&mut store);
        store.set("backend", Value::String(backend_name.clone()));
        Self::compute_derived(&mut store)?;

        tracing::debug!(backend = %backend_name, "configuration loaded");
        Ok(LoadedConfig { store, backend })
    }

    /// Read a configuration file by extension.
    /// Returns Ok(None) if the file doesn't exist.
    pub fn load_from_file(path: &Path) -> Result<Option<Value>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let parsed: Result<Value, String> = match extension.as_str() {
            "toml" => toml::from_str(&content).map_err(|e| e.to_string()),
            "json" => serde_json::from_str(&content).map_err(|e| e.to_string()),
            _ => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
        };
        let value = parsed.map_err(|e| {
            AppError::configuration(
                codes::INVALID_SOURCE,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_detail("path", path.display().to_string())
        })?;

        match value {
            Value::Object(_) => Ok(Some(value)),
            Value::Null => Ok(Some(Value::Object(Map::new()))),
            _ => Err(AppError::configuration(
                codes::INVALID_SOURCE,
                format!("Config file {} must contain a mapping", path.display()),
            )
            .with_detail("path", path.display().to_string())),
        }
    }

    /// Apply one `key=value` override. The value is read as a YAML scalar.
    pub fn apply_override(store: &mut ConfigStore, raw: &str) -> Result<(), AppError> {
        let Some((key, value)) = raw.split_once('=') else {
            return Err(AppError::configuration(
                codes::INVALID_SOURCE,
                format!("Override '{}' is not of the form key=value", raw),
            ));
        };
        let key = key.trim();
        if key.is_empty() || key == "." {
            return Err(AppError::configuration(
                codes::INVALID_SOURCE,
                format!("Override '{}' has an empty key", raw),
            ));
        }
        let value: Value = serde_yaml::from_str(value.trim())
            .unwrap_or_else(|_| Value::String(value.trim().to_string()));
        if key.contains('.') {
            store.set(key, value);
        } else {
            store.set(&format!("{}.{}", CMDLINE_SECTION, key), value);
        }
        Ok(())
    }

    /// Environment variables override file values but not explicit overrides.
    fn apply_env_overrides(store: &mut ConfigStore) {
        let cmdline = |name: &str| format!("{}.{}", CMDLINE_SECTION, name);
        if let Ok(path) = env::var("GENFLOW_SUBMIT_PATH") {
            if !store.contains(&cmdline("submitPath")) {
                store.set("submitPath", Value::String(path));
            }
        }
        if let Ok(site) = env::var("GENFLOW_COMPUTE_SITE") {
            if !store.contains(&cmdline("computeSite")) {
                store.set("computeSite", Value::String(site));
            }
        }
        if !store.contains("operator") {
            let operator = env::var("USER").unwrap_or_else(|_| "genflow".to_string());
            store.set("operator", Value::String(operator));
        }
    }

    fn select_backend(sources: &ConfigSources, user: Option<&Value>) -> String {
        if let Some(name) = &sources.backend {
            return name.clone();
        }
        if let Some(name) = user.and_then(|v| v.get("backend")).and_then(Value::as_str) {
            return name.to_string();
        }
        env::var("GENFLOW_BACKEND").unwrap_or_else(|_| DEFAULT_BACKEND.to_string())
    }

    /// Fill the `computed` section: timestamp, unique process name and the
    /// run's resolved paths.
    fn compute_derived(store: &mut ConfigStore) -> Result<(), AppError> {
        let computed = |name: &str| format!("{}.{}", COMPUTED_SECTION, name);
        let request = SearchRequest::new();

        if !store.contains(&computed("timestamp")) {
            let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
            store.set(&computed("timestamp"), Value::String(stamp));
        }

        let (found, _) = store.search("uniqProcName", &request)?;
        if !found {
            let output_run = store
                .search_str("outputRun", &request.clone().required(true))?
                .unwrap_or_default();
            let name = output_run.trim_matches('/').replace('/', "_");
            store.set(&computed("uniqProcName"), Value::String(name));
        }

        let submit_path = store
            .search_str("submitPath", &request.clone().required(true))?
            .unwrap_or_default();
        let submit_path = absolutize(Path::new(&submit_path))?;
        store.set(
            &computed("submitPath"),
            Value::String(submit_path.display().to_string()),
        );

        let run_graph = store
            .search_str("runGraphFile", &request.clone().required(true))?
            .unwrap_or_default();
        let run_graph = under(&submit_path, &run_graph);
        store.set(
            &computed("runGraphFile"),
            Value::String(run_graph.display().to_string()),
        );

        if let Some(aux_dir) = store.search_str(".auxState.auxStateDir", &request)? {
            let aux_dir = under(&submit_path, &aux_dir);
            store.set(
                &computed("auxStateDir"),
                Value::String(aux_dir.display().to_string()),
            );
        }
        Ok(())
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "GENFLOW_BACKEND - Backend used when neither --backend nor the config file names one (default: dryrun)",
            "GENFLOW_SUBMIT_PATH - Override submitPath from the config file",
            "GENFLOW_COMPUTE_SITE - Override computeSite from the config file",
            "USER - Default for operator when the config does not set one",
        ]
    }
}

/// Recursively overlay `overlay` onto `base`. Mappings merge key by key;
/// anything else replaces.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_values(existing, value)
                    }
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn absolutize(path: &Path) -> Result<PathBuf, AppError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(env::current_dir()?.join(path))
}

fn under(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
