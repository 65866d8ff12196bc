//! Ragdesk CLI - chat with a model, knowledge base or agent through a
//! selectable guardrail.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ragdesk::api::ApiClient;
use ragdesk::config::{AppConfig, ENV_AGENT_ID, ENV_API_URL};
use ragdesk::guardrail::{GuardrailTarget, Transition, UseDefaults};
use ragdesk::session::{ChatBackend, ChatMode, Conversation};
use ragdesk_cli::{ChatRepl, commands};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Ragdesk - retrieval-augmented chat with guardrail management
#[derive(Parser, Debug)]
#[command(name = "ragdesk")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(short, long, global = true, env = "RAGDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the REST API
    #[arg(long, global = true, env = ENV_API_URL)]
    api_url: Option<String>,

    /// Agent that guardrails are applied to
    #[arg(long, global = true, env = ENV_AGENT_ID)]
    agent_id: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start an interactive chat session (default)
    Chat {
        /// Starting mode: model, kb or agent
        #[arg(short, long)]
        mode: Option<String>,

        /// Guardrail to select, as `id` or `id:version`
        #[arg(short, long)]
        guardrail: Option<String>,
    },
    /// Inspect and apply guardrails
    #[command(subcommand)]
    Guardrails(GuardrailCommand),
    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum GuardrailCommand {
    /// List guardrails and their versions
    List,
    /// Show the policy at one version
    Show {
        /// `id` or `id:version`
        token: String,
    },
    /// Show the guardrail attached to the agent
    Current,
    /// Attach a guardrail to the agent
    Apply {
        /// `id` or `id:version`
        token: String,
    },
    /// Remove the agent's guardrail
    Detach,
    /// Print the deployable presets
    Presets {
        /// Environment prefix for preset ids
        #[arg(long)]
        env: Option<String>,
    },
    /// Print the JSON Schema of an override document
    Schema,
    /// Build a policy from an override document
    Build {
        /// Override document (JSON)
        file: PathBuf,

        /// Leave omitted categories empty instead of using defaults
        #[arg(long)]
        no_defaults: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("ragdesk=debug,ragdesk_cli=debug")
    } else {
        EnvFilter::new("ragdesk=warn,ragdesk_cli=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(url) = &cli.api_url {
        config.api_url.clone_from(url);
    }
    if let Some(agent) = &cli.agent_id {
        config.agent_id = Some(agent.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn run_chat(
    config: &AppConfig,
    mode: Option<String>,
    guardrail: Option<String>,
) -> anyhow::Result<()> {
    let mode = match mode {
        Some(mode) => mode.parse::<ChatMode>()?,
        None => config.default_mode,
    };
    let client = Arc::new(ApiClient::from_config(config)?);

    let backend: Arc<dyn ChatBackend> = Arc::<ApiClient>::clone(&client);
    let mut conversation =
        Conversation::new(backend, config.conversation_options()).with_mode(mode);
    if let Some(agent) = &config.agent_id {
        let target: Arc<dyn GuardrailTarget> = Arc::<ApiClient>::clone(&client);
        conversation = conversation.with_target(target, agent.clone());
    }

    match client.list_guardrails().await {
        Ok(identities) => {
            conversation.refresh_listing(identities);
        }
        Err(e) => warn!(error = %e, "could not load guardrail listing"),
    }
    if let Some(token) = guardrail.as_deref() {
        if conversation.select_guardrail(Some(token)) == Transition::Done {
            info!(token, "guardrail selected");
        }
    }

    ChatRepl::new(conversation, client)
        .run()
        .await
        .context("terminal I/O failed")
}

async fn run_guardrails(config: &AppConfig, command: GuardrailCommand) -> anyhow::Result<()> {
    let client = || ApiClient::from_config(config);
    match command {
        GuardrailCommand::List => commands::list(&client()?, config).await,
        GuardrailCommand::Show { token } => commands::show(&client()?, &token).await,
        GuardrailCommand::Current => commands::current(&client()?, config).await,
        GuardrailCommand::Apply { token } => commands::apply(&client()?, config, &token).await,
        GuardrailCommand::Detach => commands::detach(&client()?, config).await,
        GuardrailCommand::Presets { env } => {
            commands::presets(env.as_deref().unwrap_or(&config.environment))
        }
        GuardrailCommand::Schema => commands::schema(),
        GuardrailCommand::Build { file, no_defaults } => {
            let use_defaults = if no_defaults {
                UseDefaults::none()
            } else {
                UseDefaults::all()
            };
            commands::build_policy(&file, use_defaults)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command.take() {
        Some(Command::Config(ConfigCommand::Path)) => {
            commands::config_path_cmd(cli.config.as_deref());
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Init { force })) => {
            commands::config_init(cli.config.as_deref(), force)
        }
        Some(Command::Config(ConfigCommand::Show)) => commands::config_show(&load_config(&cli)?),
        Some(Command::Guardrails(command)) => {
            let config = load_config(&cli)?;
            run_guardrails(&config, command).await
        }
        Some(Command::Chat { mode, guardrail }) => {
            let config = load_config(&cli)?;
            run_chat(&config, mode, guardrail).await
        }
        None => {
            let config = load_config(&cli)?;
            run_chat(&config, None, None).await
        }
    }
}
