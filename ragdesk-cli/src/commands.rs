//! One-shot guardrail and config subcommands.

#![allow(clippy::print_stdout)]

use std::path::Path;

use anyhow::{Context, Result, bail};
use ragdesk::api::ApiClient;
use ragdesk::config::{AppConfig, config_path};
use ragdesk::guardrail::{
    ApplyOutcome, CurrentGuardrail, GuardrailRegistry, GuardrailTarget, PolicyOverride, Preset,
    UseDefaults, build, decode_token, detach_from_target, override_schema, resolve,
};

use crate::chat::render_listing;

fn agent_id(config: &AppConfig) -> Result<&str> {
    config
        .agent_id
        .as_deref()
        .context("no agent configured; pass --agent-id or set RAGDESK_AGENT_ID")
}

/// `guardrails list`: every guardrail and version, marking the one attached
/// to the configured agent.
///
/// # Errors
///
/// Returns an error if the listing cannot be fetched.
pub async fn list(client: &ApiClient, config: &AppConfig) -> Result<()> {
    let identities = client.list_guardrails().await?;
    let attached = match config.agent_id.as_deref() {
        Some(agent) => client
            .current_guardrail(agent)
            .await
            .ok()
            .and_then(|c| c.guardrail().map(ragdesk::guardrail::GuardrailRef::token)),
        None => None,
    };
    println!("{}", render_listing(&identities, attached.as_deref()));
    Ok(())
}

/// `guardrails show TOKEN`: the full policy at one version, as JSON.
///
/// # Errors
///
/// Returns an error if the token does not resolve.
pub async fn show(client: &ApiClient, token: &str) -> Result<()> {
    let identities = client.list_guardrails().await?;
    let resolved = resolve(token, &identities)?;
    println!(
        "{} ({}) version {}",
        resolved.identity.name(),
        resolved.identity.id(),
        resolved.version.version
    );
    println!("{}", serde_json::to_string_pretty(resolved.policy())?);
    Ok(())
}

/// `guardrails current`: what the configured agent has attached.
///
/// # Errors
///
/// Returns an error if no agent is configured or the request fails.
pub async fn current(client: &ApiClient, config: &AppConfig) -> Result<()> {
    let agent = agent_id(config)?;
    match client.current_guardrail(agent).await? {
        CurrentGuardrail::Attached {
            guardrail,
            name,
            description,
        } => {
            println!(
                "{agent}: {} ({})",
                name.as_deref().unwrap_or(&guardrail.id),
                guardrail.token()
            );
            if let Some(description) = description {
                println!("  {description}");
            }
        }
        CurrentGuardrail::NotAttached => println!("{agent}: no guardrail attached"),
    }
    Ok(())
}

/// `guardrails apply TOKEN`: attach a listed guardrail to the agent.
///
/// # Errors
///
/// Returns an error if the listing lacks the guardrail or version, or the
/// agent rejects it.
pub async fn apply(client: &ApiClient, config: &AppConfig, token: &str) -> Result<()> {
    let agent = agent_id(config)?;
    let registry = GuardrailRegistry::from_identities(client.list_guardrails().await?);
    let reference = decode_token(token);
    let outcome = registry
        .apply_to_target(&reference.id, &reference.version, client, agent)
        .await?;
    println!("{}", describe_outcome(agent, &reference.token(), outcome));
    Ok(())
}

/// `guardrails detach`: remove the agent's guardrail.
///
/// # Errors
///
/// Returns an error if the agent rejects the change.
pub async fn detach(client: &ApiClient, config: &AppConfig) -> Result<()> {
    let agent = agent_id(config)?;
    let outcome = detach_from_target(client, agent).await?;
    println!("{}", describe_outcome(agent, "", outcome));
    Ok(())
}

fn describe_outcome(agent: &str, token: &str, outcome: ApplyOutcome) -> String {
    match outcome {
        ApplyOutcome::Attached => format!("{agent} now uses {token}"),
        ApplyOutcome::Unchanged if token.is_empty() => format!("{agent}: no guardrail attached"),
        ApplyOutcome::Unchanged => format!("{agent} already uses {token}"),
        ApplyOutcome::Detached => format!("{agent}: guardrail removed"),
    }
}

/// `guardrails presets`: the deployable presets for an environment.
///
/// # Errors
///
/// Returns an error if a preset fails to build.
pub fn presets(environment: &str) -> Result<()> {
    let registry = GuardrailRegistry::with_presets(environment)?;
    for (preset, identity) in Preset::ALL.iter().zip(registry.list_identities()) {
        let summary = identity
            .draft()
            .map(|v| v.policy.to_string())
            .unwrap_or_default();
        println!("{:<14} {:<28} {summary}", preset.label(), identity.id());
    }
    Ok(())
}

/// `guardrails schema`: the JSON Schema of an override document.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn schema() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&override_schema())?);
    Ok(())
}

/// `guardrails build FILE`: merge an override document with the catalog
/// defaults and print the resulting policy.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or validated.
pub fn build_policy(path: &Path, use_defaults: UseDefaults) -> Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let document = PolicyOverride::from_json(&json)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let policy = build(&document, use_defaults)?;
    if !policy.has_enforceable_content() {
        println!("warning: the policy has no content filters");
    }
    println!("{}", serde_json::to_string_pretty(&policy)?);
    Ok(())
}

/// `config show`.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn config_show(config: &AppConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// `config path`.
pub fn config_path_cmd(explicit: Option<&Path>) {
    let path = explicit.map_or_else(config_path, Path::to_path_buf);
    println!("{}", path.display());
}

/// `config init`: write a default config file.
///
/// # Errors
///
/// Returns an error if the file exists (without `force`) or cannot be
/// written.
pub fn config_init(explicit: Option<&Path>, force: bool) -> Result<()> {
    let path = explicit.map_or_else(config_path, Path::to_path_buf);
    if path.exists() && !force {
        bail!(
            "configuration already exists at {}; use --force to overwrite",
            path.display()
        );
    }
    AppConfig::default().save(&path)?;
    println!("Configuration created: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_required() {
        let config = AppConfig::default();
        assert!(agent_id(&config).unwrap_err().to_string().contains("RAGDESK_AGENT_ID"));
        let config = AppConfig {
            agent_id: Some("A1".into()),
            ..AppConfig::default()
        };
        assert_eq!(agent_id(&config).unwrap(), "A1");
    }

    #[test]
    fn test_describe_outcome() {
        assert_eq!(
            describe_outcome("A1", "gr1:2", ApplyOutcome::Attached),
            "A1 now uses gr1:2"
        );
        assert_eq!(
            describe_outcome("A1", "gr1", ApplyOutcome::Unchanged),
            "A1 already uses gr1"
        );
        assert_eq!(
            describe_outcome("A1", "", ApplyOutcome::Unchanged),
            "A1: no guardrail attached"
        );
        assert_eq!(
            describe_outcome("A1", "", ApplyOutcome::Detached),
            "A1: guardrail removed"
        );
    }

    #[test]
    fn test_build_policy_reports_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        std::fs::write(&good, r#"{"name": "support"}"#).unwrap();
        build_policy(&good, UseDefaults::all()).unwrap();

        let bad = dir.path().join("bad.json");
        std::fs::write(
            &bad,
            r#"{"contentFilters": [{"type": "HATE", "inputStrength": "EXTREME"}]}"#,
        )
        .unwrap();
        let err = build_policy(&bad, UseDefaults::all()).unwrap_err();
        assert!(err.to_string().contains("EXTREME"));
    }

    #[test]
    fn test_config_init_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        config_init(Some(&path), false).unwrap();
        assert!(config_init(Some(&path), false).is_err());
        config_init(Some(&path), true).unwrap();
    }
}
