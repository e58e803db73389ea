use progear_agent::ReasoningSettings;
use progear_core::config::{AppConfig, LlmProvider, LoadOptions};
use progear_identity::AgentSigningKey;
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_identity_mode(&config));
            checks.push(check_agent_key(&config));
            checks.push(check_reasoning_provider(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["identity_mode", "agent_key_readiness", "reasoning_provider"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_identity_mode(config: &AppConfig) -> DoctorCheck {
    let details = if config.okta.demo_mode {
        "demo mode: exchanges return synthetic tokens, nothing is sent to Okta".to_string()
    } else {
        format!("live mode against issuer `{}`", config.okta.issuer())
    };
    DoctorCheck { name: "identity_mode", status: CheckStatus::Pass, details }
}

fn check_agent_key(config: &AppConfig) -> DoctorCheck {
    let name = "agent_key_readiness";
    if config.okta.demo_mode {
        return DoctorCheck {
            name,
            status: CheckStatus::Skipped,
            details: "no signing key needed in demo mode".to_string(),
        };
    }

    let Some(jwk) = config.agent.private_key_jwk.as_ref() else {
        return DoctorCheck {
            name,
            status: CheckStatus::Fail,
            details: "agent.private_key_jwk is not set".to_string(),
        };
    };

    match AgentSigningKey::from_jwk(jwk.expose_secret()) {
        Ok(key) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!(
                "{} signing key loaded (kid: {})",
                key.algorithm(),
                key.key_id().unwrap_or("<none>")
            ),
        },
        Err(error) => DoctorCheck { name, status: CheckStatus::Fail, details: error.to_string() },
    }
}

fn check_reasoning_provider(config: &AppConfig) -> DoctorCheck {
    let settings = ReasoningSettings::from_config(&config.llm);
    let name = "reasoning_provider";

    let needs_key = !matches!(settings.provider, LlmProvider::Ollama);
    let has_key = settings
        .api_key
        .as_ref()
        .is_some_and(|key| !key.expose_secret().trim().is_empty());
    if needs_key && !has_key {
        return DoctorCheck {
            name,
            status: CheckStatus::Fail,
            details: format!("{:?} requires llm.api_key", settings.provider),
        };
    }

    DoctorCheck {
        name,
        status: CheckStatus::Pass,
        details: format!(
            "{:?} model `{}` at {}",
            settings.provider, settings.model, settings.base_url
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
