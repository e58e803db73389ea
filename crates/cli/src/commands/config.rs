use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use progear_core::config::{AppConfig, LoadOptions};
use secrecy::SecretString;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    let fields: Vec<(&str, &str, String)> = vec![
        ("agent.id", "PROGEAR_AGENT_ID", config.agent.id.clone()),
        ("agent.name", "PROGEAR_AGENT_NAME", config.agent.name.clone()),
        ("agent.client_id", "PROGEAR_AGENT_CLIENT_ID", config.agent.client_id.clone()),
        ("agent.scopes", "PROGEAR_AGENT_SCOPES", config.agent.scopes.join(" ")),
        (
            "agent.private_key_jwk",
            "PROGEAR_AGENT_PRIVATE_KEY_JWK",
            redact(config.agent.private_key_jwk.as_ref()),
        ),
        ("okta.domain", "PROGEAR_OKTA_DOMAIN", or_unset(&config.okta.domain)),
        (
            "okta.authorization_server_id",
            "PROGEAR_OKTA_AUTHORIZATION_SERVER_ID",
            or_unset(&config.okta.authorization_server_id),
        ),
        ("okta.audience", "PROGEAR_OKTA_AUDIENCE", config.okta.audience.clone()),
        ("okta.demo_mode", "PROGEAR_OKTA_DEMO_MODE", config.okta.demo_mode.to_string()),
        ("okta.timeout_secs", "PROGEAR_OKTA_TIMEOUT_SECS", config.okta.timeout_secs.to_string()),
        ("llm.provider", "PROGEAR_LLM_PROVIDER", format!("{:?}", config.llm.provider)),
        ("llm.model", "PROGEAR_LLM_MODEL", config.llm.model().to_string()),
        (
            "llm.base_url",
            "PROGEAR_LLM_BASE_URL",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        ("llm.api_key", "PROGEAR_LLM_API_KEY", redact(config.llm.api_key.as_ref())),
        ("llm.timeout_secs", "PROGEAR_LLM_TIMEOUT_SECS", config.llm.timeout_secs.to_string()),
        ("server.bind_address", "PROGEAR_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        ("server.port", "PROGEAR_SERVER_PORT", config.server.port.to_string()),
        (
            "server.request_timeout_secs",
            "PROGEAR_SERVER_REQUEST_TIMEOUT_SECS",
            config.server.request_timeout_secs.to_string(),
        ),
        ("logging.level", "PROGEAR_LOGGING_LEVEL", config.logging.level.clone()),
        ("logging.format", "PROGEAR_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ];

    for (key_path, env_key, value) in fields {
        lines.push(render_line(key_path, &value, source(key_path, env_key)));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("progear.toml"), PathBuf::from("config/progear.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact(secret: Option<&SecretString>) -> String {
    match secret {
        Some(_) => "<redacted>".to_string(),
        None => "<unset>".to_string(),
    }
}

fn or_unset(value: &str) -> String {
    if value.trim().is_empty() {
        "<unset>".to_string()
    } else {
        value.to_string()
    }
}
