use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::DomainError;
use crate::identity::{AgentIdentity, DEFAULT_SCOPES};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub okta: OktaConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub private_key_jwk: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct OktaConfig {
    pub domain: String,
    pub authorization_server_id: String,
    pub audience: String,
    pub demo_mode: bool,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    /// Unset means the provider's default model, see [`LlmConfig::model`].
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Anthropic,
    OpenAi,
    Ollama,
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
    pub agent_private_key_jwk: Option<String>,
    pub okta_domain: Option<String>,
    pub okta_authorization_server_id: Option<String>,
    pub okta_demo_mode: Option<bool>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub server_port: Option<u16>,
    pub log_level: Option<String>,
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
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig {
                id: "wlp8x5q7mvH86KvFJ0g7".to_string(),
                name: "ProGear Sales Agent".to_string(),
                client_id: "0oa8x5nsjp8aDUpB70g7".to_string(),
                scopes: DEFAULT_SCOPES.iter().map(|scope| scope.to_string()).collect(),
                private_key_jwk: None,
            },
            okta: OktaConfig {
                domain: String::new(),
                authorization_server_id: String::new(),
                audience: "api://progear-mcp".to_string(),
                demo_mode: true,
                timeout_secs: 15,
            },
            llm: LlmConfig {
                provider: LlmProvider::Anthropic,
                api_key: None,
                base_url: None,
                model: None,
                temperature: 0.7,
                max_tokens: 1024,
                timeout_secs: 60,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                request_timeout_secs: 90,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl LlmConfig {
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or_else(|| self.provider.default_model())
    }
}

impl LlmProvider {
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::OpenAi => "gpt-4o-mini",
            Self::Ollama => "llama3.1",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected anthropic|openai|ollama)"
            ))),
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

impl OktaConfig {
    /// Issuer of the resource authorization server the ID-JAG is redeemed at.
    pub fn issuer(&self) -> String {
        format!(
            "{}/oauth2/{}",
            self.domain.trim_end_matches('/'),
            self.authorization_server_id.trim()
        )
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("progear.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn agent_identity(&self) -> Result<AgentIdentity, DomainError> {
        AgentIdentity::new(
            self.agent.id.clone(),
            self.agent.name.clone(),
            self.agent.client_id.clone(),
            self.agent.scopes.iter().cloned(),
        )
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(agent) = patch.agent {
            if let Some(id) = agent.id {
                self.agent.id = id;
            }
            if let Some(name) = agent.name {
                self.agent.name = name;
            }
            if let Some(client_id) = agent.client_id {
                self.agent.client_id = client_id;
            }
            if let Some(scopes) = agent.scopes {
                self.agent.scopes = scopes;
            }
            if let Some(private_key_jwk) = agent.private_key_jwk {
                self.agent.private_key_jwk = Some(secret_value(private_key_jwk));
            }
        }

        if let Some(okta) = patch.okta {
            if let Some(domain) = okta.domain {
                self.okta.domain = domain;
            }
            if let Some(authorization_server_id) = okta.authorization_server_id {
                self.okta.authorization_server_id = authorization_server_id;
            }
            if let Some(audience) = okta.audience {
                self.okta.audience = audience;
            }
            if let Some(demo_mode) = okta.demo_mode {
                self.okta.demo_mode = demo_mode;
            }
            if let Some(timeout_secs) = okta.timeout_secs {
                self.okta.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = Some(model);
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(request_timeout_secs) = server.request_timeout_secs {
                self.server.request_timeout_secs = request_timeout_secs;
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
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PROGEAR_AGENT_ID") {
            self.agent.id = value;
        }
        if let Some(value) = read_env("PROGEAR_AGENT_NAME") {
            self.agent.name = value;
        }
        if let Some(value) = read_env("PROGEAR_AGENT_CLIENT_ID") {
            self.agent.client_id = value;
        }
        if let Some(value) = read_env("PROGEAR_AGENT_SCOPES") {
            self.agent.scopes = parse_scope_list(&value);
        }
        if let Some(value) = read_env("PROGEAR_AGENT_PRIVATE_KEY_JWK") {
            self.agent.private_key_jwk = Some(secret_value(value));
        }

        if let Some(value) = read_env("PROGEAR_OKTA_DOMAIN") {
            self.okta.domain = value;
        }
        if let Some(value) = read_env("PROGEAR_OKTA_AUTHORIZATION_SERVER_ID") {
            self.okta.authorization_server_id = value;
        }
        if let Some(value) = read_env("PROGEAR_OKTA_AUDIENCE") {
            self.okta.audience = value;
        }
        if let Some(value) = read_env("PROGEAR_OKTA_DEMO_MODE") {
            self.okta.demo_mode = parse_bool("PROGEAR_OKTA_DEMO_MODE", &value)?;
        }
        if let Some(value) = read_env("PROGEAR_OKTA_TIMEOUT_SECS") {
            self.okta.timeout_secs = parse_u64("PROGEAR_OKTA_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PROGEAR_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("PROGEAR_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PROGEAR_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("PROGEAR_LLM_MODEL") {
            self.llm.model = Some(value);
        }
        if let Some(value) = read_env("PROGEAR_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("PROGEAR_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("PROGEAR_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("PROGEAR_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("PROGEAR_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("PROGEAR_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PROGEAR_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PROGEAR_SERVER_PORT") {
            self.server.port = parse_u16("PROGEAR_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PROGEAR_SERVER_REQUEST_TIMEOUT_SECS") {
            self.server.request_timeout_secs =
                parse_u64("PROGEAR_SERVER_REQUEST_TIMEOUT_SECS", &value)?;
        }

        let log_level = read_env("PROGEAR_LOGGING_LEVEL").or_else(|| read_env("PROGEAR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PROGEAR_LOGGING_FORMAT").or_else(|| read_env("PROGEAR_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(private_key_jwk) = overrides.agent_private_key_jwk {
            self.agent.private_key_jwk = Some(secret_value(private_key_jwk));
        }
        if let Some(domain) = overrides.okta_domain {
            self.okta.domain = domain;
        }
        if let Some(authorization_server_id) = overrides.okta_authorization_server_id {
            self.okta.authorization_server_id = authorization_server_id;
        }
        if let Some(demo_mode) = overrides.okta_demo_mode {
            self.okta.demo_mode = demo_mode;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = Some(llm_model);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_agent(&self.agent)?;
        validate_okta(&self.okta, &self.agent)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("progear.toml"), PathBuf::from("config/progear.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "agent.id is required. Copy it from Okta Admin > Directory > AI Agents".to_string(),
        ));
    }
    if agent.client_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "agent.client_id is required (the OIDC app linked to the agent)".to_string(),
        ));
    }
    if agent.scopes.iter().all(|scope| scope.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "agent.scopes must list at least one scope (e.g. mcp:read)".to_string(),
        ));
    }

    Ok(())
}

fn validate_okta(okta: &OktaConfig, agent: &AgentConfig) -> Result<(), ConfigError> {
    if okta.timeout_secs == 0 || okta.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "okta.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if okta.audience.trim().is_empty() {
        return Err(ConfigError::Validation("okta.audience must not be empty".to_string()));
    }

    if okta.demo_mode {
        return Ok(());
    }

    let domain = okta.domain.trim();
    if domain.is_empty() {
        return Err(ConfigError::Validation(
            "okta.domain is required unless okta.demo_mode = true".to_string(),
        ));
    }
    if !domain.starts_with("https://") {
        let hint = if domain.starts_with("http://") {
            " (hint: Okta only serves token endpoints over https)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "okta.domain must start with `https://`{hint}"
        )));
    }
    if okta.authorization_server_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "okta.authorization_server_id is required unless okta.demo_mode = true".to_string(),
        ));
    }

    let missing_key = agent
        .private_key_jwk
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(true);
    if missing_key {
        return Err(ConfigError::Validation(
            "agent.private_key_jwk is required unless okta.demo_mode = true".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }
    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }
    if llm.model().trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::Anthropic | LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for anthropic/openai providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {}
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.request_timeout_secs == 0 || server.request_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "server.request_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_scope_list(value: &str) -> Vec<String> {
    value
        .split(|ch: char| ch == ',' || ch.is_whitespace())
        .filter(|scope| !scope.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    agent: Option<AgentPatch>,
    okta: Option<OktaPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    id: Option<String>,
    name: Option<String>,
    client_id: Option<String>,
    scopes: Option<Vec<String>>,
    private_key_jwk: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OktaPatch {
    domain: Option<String>,
    authorization_server_id: Option<String>,
    audience: Option<String>,
    demo_mode: Option<bool>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const ALL_VARS: &[&str] = &[
        "PROGEAR_LLM_API_KEY",
        "PROGEAR_LLM_PROVIDER",
        "PROGEAR_LOG_LEVEL",
        "PROGEAR_LOG_FORMAT",
        "PROGEAR_OKTA_DEMO_MODE",
        "PROGEAR_OKTA_DOMAIN",
        "PROGEAR_OKTA_AUTHORIZATION_SERVER_ID",
        "PROGEAR_AGENT_SCOPES",
        "PROGEAR_AGENT_PRIVATE_KEY_JWK",
        "PROGEAR_SERVER_PORT",
        "TEST_PROGEAR_LLM_KEY",
        "TEST_PROGEAR_JWK",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("TEST_PROGEAR_LLM_KEY", "sk-ant-from-env");
        env::set_var("TEST_PROGEAR_JWK", "{\"kty\":\"OKP\"}");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("progear.toml");
            fs::write(
                &path,
                r#"
[agent]
private_key_jwk = '${TEST_PROGEAR_JWK}'

[okta]
domain = "https://progear.okta.com"
authorization_server_id = "aus8xdftgwlTMxp3u0g7"
demo_mode = false

[llm]
api_key = "${TEST_PROGEAR_LLM_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("sk-ant-from-env".to_string()),
                "llm api key should be loaded from environment",
            )?;
            ensure(
                config.agent.private_key_jwk.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("{\"kty\":\"OKP\"}".to_string()),
                "private key should be loaded from environment",
            )?;
            ensure(
                config.okta.issuer() == "https://progear.okta.com/oauth2/aus8xdftgwlTMxp3u0g7",
                "issuer should join domain and authorization server id",
            )?;
            Ok(())
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("PROGEAR_LLM_API_KEY", "sk-ant-test");
        env::set_var("PROGEAR_LOG_LEVEL", "warn");
        env::set_var("PROGEAR_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("PROGEAR_LLM_API_KEY", "sk-from-env");
        env::set_var("PROGEAR_AGENT_SCOPES", "mcp:read, mcp:pricing");
        env::set_var("PROGEAR_SERVER_PORT", "9100");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("progear.toml");
            fs::write(
                &path,
                r#"
[agent]
scopes = ["mcp:read"]

[llm]
api_key = "sk-from-file"
model = "claude-from-file"

[server]
port = 9000

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    server_port: Some(9200),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.server.port == 9200, "override port should win")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.llm.model() == "claude-from-file", "file model should win over default")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("sk-from-env".to_string()),
                "env api key should win over file and defaults",
            )?;
            ensure(
                config.agent.scopes == ["mcp:read", "mcp:pricing"],
                "env scope list should win and split on commas",
            )?;
            Ok(())
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn live_mode_requires_private_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("PROGEAR_LLM_API_KEY", "sk-ant-test");
        env::set_var("PROGEAR_OKTA_DEMO_MODE", "false");
        env::set_var("PROGEAR_OKTA_DOMAIN", "https://progear.okta.com");
        env::set_var("PROGEAR_OKTA_AUTHORIZATION_SERVER_ID", "aus8xdftgwlTMxp3u0g7");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("agent.private_key_jwk")
            );
            ensure(has_message, "validation failure should mention agent.private_key_jwk")
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn plain_http_okta_domain_is_rejected_with_hint() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("PROGEAR_LLM_API_KEY", "sk-ant-test");

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    okta_demo_mode: Some(false),
                    okta_domain: Some("http://progear.okta.com".to_string()),
                    okta_authorization_server_id: Some("aus1".to_string()),
                    agent_private_key_jwk: Some("{}".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .err()
            .ok_or_else(|| "expected validation failure".to_string())?;

            ensure(error.to_string().contains("https://"), "error should require https")?;
            ensure(error.to_string().contains("hint"), "error should carry a hint")
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn ollama_provider_does_not_need_api_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("PROGEAR_LLM_PROVIDER", "ollama");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.llm.provider == LlmProvider::Ollama, "provider should be ollama")?;
            ensure(config.llm.model() == "llama3.1", "model should follow the provider")?;
            ensure(config.okta.demo_mode, "demo mode should be the default")
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn invalid_numeric_override_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("PROGEAR_LLM_API_KEY", "sk-ant-test");
        env::set_var("PROGEAR_SERVER_PORT", "eighty");

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default())
                .err()
                .ok_or_else(|| "expected override failure".to_string())?;
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "PROGEAR_SERVER_PORT"),
                "error should name the offending variable",
            )
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("PROGEAR_LLM_API_KEY", "sk-ant-secret-value");
        env::set_var("PROGEAR_AGENT_PRIVATE_KEY_JWK", "jwk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-ant-secret-value"), "debug output should not contain api key")?;
            ensure(
                !debug.contains("jwk-secret-value"),
                "debug output should not contain private key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn default_identity_matches_registered_agent() -> Result<(), String> {
        let config = AppConfig::default();
        let identity = config.agent_identity().map_err(|err| err.to_string())?;

        ensure(identity.id() == "wlp8x5q7mvH86KvFJ0g7", "default agent id")?;
        ensure(identity.client_id() == "0oa8x5nsjp8aDUpB70g7", "default client id")?;
        ensure(identity.scopes().len() == 4, "default identity requests every mcp scope")
    }
}
