//! Interactive chat REPL.
//!
//! Wraps a [`Conversation`] with line-oriented commands. Anything not
//! starting with `/` is sent as a chat turn.

#![allow(clippy::print_stdout)]

use std::io::{self, Write};
use std::sync::Arc;

use ragdesk::api::ApiClient;
use ragdesk::guardrail::{GuardrailIdentity, SelectionState, Transition, is_current_selection};
use ragdesk::session::{ChatMode, Conversation, Turn, TurnRole};
use ragdesk::util::truncate;
use tracing::warn;

const SOURCE_PREVIEW_CHARS: usize = 160;

const HELP: &str = "\
Commands:
  /mode model|kb|agent   switch chat target (starts a new session)
  /guardrails            list available guardrails
  /guardrail TOKEN       select a guardrail (id or id:version)
  /guardrail none        clear the selection
  /apply                 attach the selected guardrail to the agent
  /sources N             expand or collapse the sources of turn N
  /reset                 start a new session
  /stats                 show session counters
  /help                  show this help
  exit                   quit";

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// Send a chat turn.
    Message(String),
    /// Switch mode.
    Mode(ChatMode),
    /// Select (`Some`) or clear (`None`) a guardrail.
    Guardrail(Option<String>),
    /// List guardrails.
    Guardrails,
    /// Apply the selection.
    Apply,
    /// Toggle sources of a turn.
    Sources(usize),
    /// Reset the session.
    Reset,
    /// Show counters.
    Stats,
    /// Show help.
    Help,
    /// Quit.
    Exit,
}

/// Parse one input line.
///
/// # Errors
///
/// Returns a usage message for malformed commands.
pub fn parse_command(line: &str) -> Result<ReplCommand, String> {
    let line = line.trim();
    if matches!(line, "exit" | "quit" | "/exit" | "/quit") {
        return Ok(ReplCommand::Exit);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(ReplCommand::Message(line.to_owned()));
    };
    let (name, arg) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(n, a)| (n, a.trim()));

    match name {
        "mode" => arg
            .parse::<ChatMode>()
            .map(ReplCommand::Mode)
            .map_err(|_| "usage: /mode model|kb|agent".to_owned()),
        "guardrail" => match arg {
            "" => Err("usage: /guardrail TOKEN | /guardrail none".to_owned()),
            "none" | "off" => Ok(ReplCommand::Guardrail(None)),
            token => Ok(ReplCommand::Guardrail(Some(token.to_owned()))),
        },
        "guardrails" => Ok(ReplCommand::Guardrails),
        "apply" => Ok(ReplCommand::Apply),
        "sources" => arg
            .parse()
            .map(ReplCommand::Sources)
            .map_err(|_| "usage: /sources N (turn number)".to_owned()),
        "reset" | "new" => Ok(ReplCommand::Reset),
        "stats" => Ok(ReplCommand::Stats),
        "help" | "?" => Ok(ReplCommand::Help),
        other => Err(format!("unknown command '/{other}', try /help")),
    }
}

/// Render a turn for the terminal. `index` is the number shown to the
/// user for `/sources`.
#[must_use]
pub fn render_turn(index: usize, turn: &Turn) -> String {
    let label = match turn.role {
        TurnRole::User => "you",
        TurnRole::Assistant => "assistant",
        TurnRole::System => "system",
        TurnRole::Error => "error",
    };
    let mut out = format!("[{index}] {label}: {}", turn.content);

    let sources = turn.source_count();
    if sources == 0 {
        return out;
    }
    if !turn.sources_expanded {
        out.push_str(&format!(
            "\n    ({sources} source{}, /sources {index} to expand)",
            if sources == 1 { "" } else { "s" }
        ));
        return out;
    }
    for (c, citation) in turn.citations.iter().enumerate() {
        out.push_str(&format!("\n    [{}] \"{}\"", c + 1, citation.text));
        for reference in &citation.references {
            let location = reference
                .location_label()
                .unwrap_or_else(|| "unknown source".to_owned());
            out.push_str(&format!(
                "\n        - {location}: {}",
                truncate(&reference.content, SOURCE_PREVIEW_CHARS)
            ));
        }
    }
    out
}

/// Render a guardrail listing, marking the selected token.
#[must_use]
pub fn render_listing(identities: &[GuardrailIdentity], selected: Option<&str>) -> String {
    if identities.is_empty() {
        return "No guardrails available.".to_owned();
    }
    let mut lines = Vec::new();
    for identity in identities {
        lines.push(format!("{} ({})", identity.name(), identity.id()));
        if identity.versions().is_empty() {
            lines.push("    (no version detail)".to_owned());
        }
        for version in identity.versions() {
            let label = version.version.to_string();
            let token = ragdesk::guardrail::encode_token(identity.id(), &label);
            let marker = if selected.is_some_and(|s| is_current_selection(s, identity.id(), &label)) {
                '*'
            } else {
                ' '
            };
            lines.push(format!("  {marker} {token:<32} {}", version.policy));
        }
    }
    lines.join("\n")
}

fn render_selection(state: &SelectionState, label: Option<String>) -> String {
    let label = label.unwrap_or_default();
    match state {
        SelectionState::Unselected => "No guardrail selected.".to_owned(),
        SelectionState::Selected(_) => format!("Selected: {label}"),
        SelectionState::Applying(_) => format!("Applying: {label}"),
        SelectionState::Applied(_) => format!("Applied: {label}"),
        SelectionState::ApplyFailed { error, .. } => format!("Apply failed for {label}: {error}"),
    }
}

/// The interactive chat loop.
pub struct ChatRepl {
    conversation: Conversation,
    client: Arc<ApiClient>,
}

impl std::fmt::Debug for ChatRepl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRepl")
            .field("conversation", &self.conversation)
            .finish_non_exhaustive()
    }
}

impl ChatRepl {
    /// Create a REPL around a conversation. `client` refreshes the listing.
    #[must_use]
    pub const fn new(conversation: Conversation, client: Arc<ApiClient>) -> Self {
        Self {
            conversation,
            client,
        }
    }

    /// The wrapped conversation.
    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Reload the guardrail listing, keeping the cached one on failure.
    pub async fn refresh_listing(&mut self) {
        match self.client.list_guardrails().await {
            Ok(identities) => {
                if self.conversation.refresh_listing(identities) {
                    println!("The applied guardrail is no longer listed; re-apply to use it.");
                }
            }
            Err(e) => warn!(error = %e, "could not refresh guardrail listing"),
        }
    }

    /// Run until `exit` or end of input.
    ///
    /// # Errors
    ///
    /// Returns an error if stdin or stdout fail.
    pub async fn run(&mut self) -> io::Result<()> {
        println!(
            "Ragdesk chat | mode: {} | /help for commands, 'exit' to quit",
            self.conversation.mode()
        );
        self.print_transcript();

        let mut lines = StdinLines;
        loop {
            print!("> ");
            io::stdout().flush()?;
            let Some(line) = lines.next().transpose()? else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Ok(ReplCommand::Exit) => break,
                Ok(command) => self.handle(command, &mut lines).await?,
                Err(usage) => println!("{usage}"),
            }
        }
        println!("{}", self.conversation.metrics());
        Ok(())
    }

    async fn handle(
        &mut self,
        command: ReplCommand,
        lines: &mut impl Iterator<Item = io::Result<String>>,
    ) -> io::Result<()> {
        match command {
            ReplCommand::Message(text) => {
                let before = self.conversation.transcript().turns().len();
                match self.conversation.submit_turn(&text).await {
                    Ok(_) => {
                        let turns = self.conversation.transcript().turns();
                        // Skip the echoed user turn.
                        for (i, turn) in turns.iter().enumerate().skip(before + 1) {
                            println!("{}", render_turn(i, turn));
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }
            ReplCommand::Mode(mode) => {
                let mut transition = self.conversation.switch_mode(mode, false);
                if transition == Transition::NeedsConfirmation
                    && confirm("Switching mode starts a new session.", lines)?
                {
                    transition = self.conversation.switch_mode(mode, true);
                }
                match transition {
                    Transition::Done => {
                        println!("Mode: {mode}");
                        self.print_transcript();
                    }
                    Transition::Ignored => println!("Already in {mode} mode."),
                    Transition::NeedsConfirmation => println!("Cancelled."),
                }
            }
            ReplCommand::Guardrail(token) => {
                if self.conversation.select_guardrail(token.as_deref()) == Transition::Ignored {
                    println!("An apply is in progress.");
                } else {
                    self.print_selection();
                }
            }
            ReplCommand::Guardrails => {
                self.refresh_listing().await;
                println!(
                    "{}",
                    render_listing(
                        self.conversation.listing(),
                        self.conversation.selection().token()
                    )
                );
            }
            ReplCommand::Apply => self.apply(lines).await?,
            ReplCommand::Sources(index) => match self.conversation.toggle_source_expansion(index) {
                Some(_) => {
                    let turn = &self.conversation.transcript().turns()[index];
                    println!("{}", render_turn(index, turn));
                }
                None => println!("Turn {index} has no sources."),
            },
            ReplCommand::Reset => {
                self.conversation.reset_session();
                self.print_transcript();
            }
            ReplCommand::Stats => println!("{}", self.conversation.metrics()),
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Exit => {}
        }
        Ok(())
    }

    async fn apply(
        &mut self,
        lines: &mut impl Iterator<Item = io::Result<String>>,
    ) -> io::Result<()> {
        if self.conversation.selection().token().is_none() {
            println!("Select a guardrail first with /guardrail TOKEN.");
            return Ok(());
        }
        self.refresh_listing().await;

        let mut result = self.conversation.apply_selection(false).await;
        if matches!(result, Ok(Transition::NeedsConfirmation))
            && confirm("Applying a guardrail starts a new session.", lines)?
        {
            result = self.conversation.apply_selection(true).await;
        }
        match result {
            Ok(Transition::Done) => {
                self.print_selection();
                self.print_transcript();
            }
            Ok(Transition::NeedsConfirmation) => println!("Cancelled."),
            Ok(Transition::Ignored) => println!("Nothing to apply."),
            Err(e) => println!("{e}"),
        }
        Ok(())
    }

    fn print_selection(&self) {
        println!(
            "{}",
            render_selection(
                self.conversation.selection(),
                self.conversation.selection_label()
            )
        );
    }

    fn print_transcript(&self) {
        for (i, turn) in self.conversation.transcript().turns().iter().enumerate() {
            println!("{}", render_turn(i, turn));
        }
    }
}

/// Reads stdin one line at a time without holding its lock.
struct StdinLines;

impl Iterator for StdinLines {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(Ok(line.trim_end_matches(['\r', '\n']).to_owned())),
            Err(e) => Some(Err(e)),
        }
    }
}

fn confirm(
    question: &str,
    lines: &mut impl Iterator<Item = io::Result<String>>,
) -> io::Result<bool> {
    print!("{question} Continue? [y/N] ");
    io::stdout().flush()?;
    let answer = lines.next().transpose()?.unwrap_or_default();
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdesk::guardrail::GuardrailRegistry;
    use ragdesk::session::{Citation, SourceReference};

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("hello there"), Ok(ReplCommand::Message("hello there".into())));
        assert_eq!(parse_command("exit"), Ok(ReplCommand::Exit));
        assert_eq!(parse_command("/mode kb"), Ok(ReplCommand::Mode(ChatMode::KnowledgeBase)));
        assert_eq!(
            parse_command("/guardrail gr1:2"),
            Ok(ReplCommand::Guardrail(Some("gr1:2".into())))
        );
        assert_eq!(parse_command("/guardrail none"), Ok(ReplCommand::Guardrail(None)));
        assert_eq!(parse_command("/sources 3"), Ok(ReplCommand::Sources(3)));
        assert!(parse_command("/sources three").is_err());
        assert!(parse_command("/mode rag").is_err());
        assert!(parse_command("/guardrail").is_err());
        assert!(parse_command("/frobnicate").unwrap_err().contains("/frobnicate"));
    }

    #[test]
    fn test_render_turn_collapsed_and_expanded() {
        let mut turn = Turn::assistant(
            "Answer.",
            vec![Citation {
                text: "Answer".into(),
                span: None,
                references: vec![SourceReference {
                    content: "Source passage".into(),
                    location: Some(serde_json::json!({"webLocation": {"url": "https://docs.example.com"}})),
                    metadata: None,
                }],
            }],
        );
        let collapsed = render_turn(2, &turn);
        assert!(collapsed.starts_with("[2] assistant: Answer."));
        assert!(collapsed.contains("(1 source, /sources 2 to expand)"));

        turn.sources_expanded = true;
        let expanded = render_turn(2, &turn);
        assert!(expanded.contains("https://docs.example.com: Source passage"));

        assert_eq!(render_turn(0, &Turn::system("Hi")), "[0] system: Hi");
    }

    #[test]
    fn test_render_listing_marks_selection() {
        let mut registry = GuardrailRegistry::with_presets("dev").unwrap();
        registry.publish("dev-full").unwrap();
        let out = render_listing(registry.list_identities(), Some("dev-full:1"));
        let marked: Vec<_> = out.lines().filter(|l| l.trim_start().starts_with('*')).collect();
        assert_eq!(marked.len(), 1);
        assert!(marked[0].contains("dev-full:1"));
        assert_eq!(render_listing(&[], None), "No guardrails available.");
    }
}
