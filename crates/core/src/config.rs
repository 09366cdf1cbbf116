use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{default_catalog, ProductCatalog};
use crate::rules::{default_rule_table, RuleTable};

/// Full orchestrator configuration. Built-in defaults work without any
/// file; a TOML file, environment variables, and programmatic overrides
/// layer on top, in that order.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub routing: RoutingConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
    pub catalog: ProductCatalog,
    pub rules: RuleTable,
}

#[derive(Clone, Debug)]
pub struct RoutingConfig {
    /// Tool errors in the recent window before the self-correction
    /// policy fires.
    pub tool_error_threshold: usize,
    /// Self-correction nudges per session before a forced escalation.
    pub max_self_corrections: u32,
    pub escalation_keywords: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Upper bound on internal slot-engine hops within one turn.
    pub max_turn_hops: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub max_self_corrections: Option<u32>,
    pub tool_error_threshold: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_ESCALATION_KEYWORDS: [&str; 8] = [
    "human",
    "live agent",
    "real person",
    "representative",
    "speak to someone",
    "talk to a person",
    "customer service officer",
    "hotline",
];

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            routing: RoutingConfig {
                tool_error_threshold: 2,
                max_self_corrections: 3,
                escalation_keywords: DEFAULT_ESCALATION_KEYWORDS
                    .iter()
                    .map(|keyword| (*keyword).to_owned())
                    .collect(),
            },
            engine: EngineConfig { max_turn_hops: 8 },
            logging: LoggingConfig { level: "info".to_owned(), format: LogFormat::Compact },
            catalog: default_catalog(),
            rules: default_rule_table(),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AgentConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("assure.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(routing) = patch.routing {
            if let Some(threshold) = routing.tool_error_threshold {
                self.routing.tool_error_threshold = threshold;
            }
            if let Some(max) = routing.max_self_corrections {
                self.routing.max_self_corrections = max;
            }
            if let Some(keywords) = routing.escalation_keywords {
                self.routing.escalation_keywords = keywords;
            }
        }

        if let Some(engine) = patch.engine {
            if let Some(hops) = engine.max_turn_hops {
                self.engine.max_turn_hops = hops;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(catalog) = patch.catalog {
            self.catalog = catalog;
        }

        if let Some(rules) = patch.rules {
            self.rules = RuleTable { products: rules.products };
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ASSURE_TOOL_ERROR_THRESHOLD") {
            self.routing.tool_error_threshold =
                parse_usize("ASSURE_TOOL_ERROR_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("ASSURE_MAX_SELF_CORRECTIONS") {
            self.routing.max_self_corrections =
                parse_u32("ASSURE_MAX_SELF_CORRECTIONS", &value)?;
        }
        if let Some(value) = read_env("ASSURE_MAX_TURN_HOPS") {
            self.engine.max_turn_hops = parse_u32("ASSURE_MAX_TURN_HOPS", &value)?;
        }

        let log_level = read_env("ASSURE_LOGGING_LEVEL").or_else(|| read_env("ASSURE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ASSURE_LOGGING_FORMAT").or_else(|| read_env("ASSURE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(max) = overrides.max_self_corrections {
            self.routing.max_self_corrections = max;
        }
        if let Some(threshold) = overrides.tool_error_threshold {
            self.routing.tool_error_threshold = threshold;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.routing.tool_error_threshold == 0 {
            return Err(ConfigError::Validation(
                "routing.tool_error_threshold must be greater than zero".to_owned(),
            ));
        }
        if self.routing.max_self_corrections == 0 {
            return Err(ConfigError::Validation(
                "routing.max_self_corrections must be greater than zero".to_owned(),
            ));
        }
        if self.engine.max_turn_hops == 0 {
            return Err(ConfigError::Validation(
                "engine.max_turn_hops must be greater than zero".to_owned(),
            ));
        }

        for (product, rules) in &self.rules.products {
            if self.catalog.get(product).is_none() {
                return Err(ConfigError::Validation(format!(
                    "rules reference unknown product `{product}`"
                )));
            }
            if rules.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "rules for product `{product}` are empty"
                )));
            }
        }

        let level = self.logging.level.trim().to_ascii_lowercase();
        match level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(ConfigError::Validation(
                "logging.level must be one of trace|debug|info|warn|error".to_owned(),
            )),
        }
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("assure.toml"), PathBuf::from("config/assure.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    toml::from_str::<ConfigPatch>(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    routing: Option<RoutingPatch>,
    engine: Option<EnginePatch>,
    logging: Option<LoggingPatch>,
    catalog: Option<ProductCatalog>,
    rules: Option<RulesPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingPatch {
    tool_error_threshold: Option<usize>,
    max_self_corrections: Option<u32>,
    escalation_keywords: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    max_turn_hops: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct RulesPatch {
    #[serde(flatten)]
    products: std::collections::BTreeMap<String, crate::rules::ProductRules>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AgentConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::rules::SlotRule;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults_load_without_a_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AgentConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        if config.routing.tool_error_threshold != 2 {
            return Err("default tool error threshold should be 2".to_string());
        }
        if config.catalog.get("travel").is_none() {
            return Err("built-in catalog should include travel".to_string());
        }
        if !matches!(config.logging.format, LogFormat::Compact) {
            return Err("default logging format should be compact".to_string());
        }
        Ok(())
    }

    #[test]
    fn file_patch_overrides_rules_and_routing() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("assure.toml");
        fs::write(
            &path,
            r#"
[routing]
max_self_corrections = 5

[logging]
level = "debug"

[rules.travel.destination]
type = "location"
priority = 1

[rules.travel.coverage_scope]
type = "enum"
values = ["self", "family"]
priority = 2
"#,
        )
        .map_err(|err| err.to_string())?;

        let config =
            AgentConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;

        if config.routing.max_self_corrections != 5 {
            return Err("file should override max_self_corrections".to_string());
        }
        if config.logging.level != "debug" {
            return Err("file should override log level".to_string());
        }
        let travel = config.rules.for_product("travel").ok_or("travel rules missing")?;
        let scope = travel.get("coverage_scope").ok_or("coverage_scope rule missing")?;
        if scope.priority != 2 {
            return Err("priority should come from the file".to_string());
        }
        if !matches!(scope.rule, SlotRule::Enum { .. }) {
            return Err("coverage_scope should parse as an enum rule".to_string());
        }
        Ok(())
    }

    #[test]
    fn env_then_programmatic_overrides_win() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ASSURE_MAX_SELF_CORRECTIONS", "7");
        env::set_var("ASSURE_LOG_LEVEL", "warn");

        let result = (|| -> Result<(), String> {
            let config = AgentConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    log_level: Some("error".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            if config.routing.max_self_corrections != 7 {
                return Err("env override should set max_self_corrections".to_string());
            }
            if config.logging.level != "error" {
                return Err("programmatic override should win over env".to_string());
            }
            Ok(())
        })();

        clear_vars(&["ASSURE_MAX_SELF_CORRECTIONS", "ASSURE_LOG_LEVEL"]);
        result
    }

    #[test]
    fn rules_for_unknown_product_fail_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("assure.toml");
        fs::write(
            &path,
            r#"
[rules.spaceship.hull_class]
type = "enum"
values = ["light", "heavy"]
"#,
        )
        .map_err(|err| err.to_string())?;

        match AgentConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
        {
            Ok(_) => Err("expected validation failure for unknown product".to_string()),
            Err(ConfigError::Validation(message)) if message.contains("spaceship") => Ok(()),
            Err(other) => Err(format!("unexpected error: {other}")),
        }
    }

    #[test]
    fn missing_required_file_is_reported_with_path() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let missing = std::path::PathBuf::from("/nonexistent/assure.toml");
        match AgentConfig::load(LoadOptions {
            config_path: Some(missing.clone()),
            require_file: true,
            ..LoadOptions::default()
        }) {
            Ok(_) => Err("expected missing file error".to_string()),
            Err(ConfigError::MissingConfigFile(path)) if path == missing => Ok(()),
            Err(other) => Err(format!("unexpected error: {other}")),
        }
    }
}
