//! `salesdesk chat` — Interactive or single-message conversation.

use salesdesk_agent::{AgentError, AgentLoop, AgentTurnResult, TurnProgress, system_prompt};
use salesdesk_config::AppConfig;
use salesdesk_core::event::EventBus;
use salesdesk_core::message::ConversationState;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// A wired agent plus the system prompt that seeds each new thread.
pub struct Session {
    agent: AgentLoop,
    system_prompt: String,
}

impl Session {
    pub fn from_config(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let provider = salesdesk_providers::build_from_config(&config.model)?;
        let guardrail = salesdesk_guardrail::build_from_config(&config.guardrail);

        let store = Arc::new(super::open_store(config)?);
        let today = store.today();
        let catalog = salesdesk_tools::default_catalog(store);
        let system_prompt = system_prompt::resolve(
            config.agent.system_prompt_override.as_deref(),
            &catalog,
            today,
        );

        Ok(Self {
            agent: AgentLoop::from_config(config, provider, guardrail, catalog),
            system_prompt,
        })
    }

    /// Mirror the agent's domain events into the log.
    pub fn log_events(&self) -> tokio::task::JoinHandle<()> {
        spawn_event_log(self.agent.event_bus())
    }

    pub fn new_thread(&self) -> ConversationState {
        ConversationState::new(&self.system_prompt)
    }

    /// Run one turn, echoing progress lines to stderr while it runs.
    pub async fn turn(
        &self,
        state: &mut ConversationState,
        text: &str,
    ) -> Result<AgentTurnResult, AgentError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<TurnProgress>();
        let printer = tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                eprintln!("  … {progress}");
            }
        });

        let result = self.agent.handle_turn_with_progress(text, state, &tx).await;
        drop(tx);
        let _ = printer.await;

        match &result {
            Ok(turn) => info!(
                thread_id = %turn.thread_id.short(),
                steps = turn.step_count,
                tools = turn.tool_audit.len(),
                overridden = turn.was_overridden,
                truncated = turn.was_truncated,
                degraded = turn.validation_degraded(),
                "Turn finished"
            ),
            Err(e) => warn!(thread_id = %state.thread_id().short(), error = %e, "Turn failed"),
        }
        result
    }
}

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    // Check for API key early — give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    SALESDESK_API_KEY = 'sk-...'");
        eprintln!("    OPENAI_API_KEY    = 'sk-...'");
        eprintln!();
        eprintln!("  Or add it to the [model] section of your config file:");
        eprintln!("    {}", super::resolve_path(config_path).display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let session = Session::from_config(&config)?;
    let _event_log = session.log_events();

    if let Some(msg) = message {
        let mut state = session.new_thread();
        let result = session.turn(&mut state, &msg).await?;
        println!("{}", result.final_text);
        for notice in notices(&result) {
            eprintln!("  {notice}");
        }
        return Ok(());
    }

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        SalesDesk — Interactive Mode          ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:       {}", config.model.model);
    println!("  Tools:       {}", session.agent.catalog().len());
    println!(
        "  Validation:  {}",
        if session.agent.validation_enabled() { "on" } else { "off" }
    );
    println!();
    println!("  Type your question and press Enter.");
    println!("  '/new' starts a new conversation, 'exit' quits.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut state = session.new_thread();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "exit" | "quit" => break,
            "/new" => {
                state = session.new_thread();
                println!("  Started a new conversation.");
            }
            input => match session.turn(&mut state, input).await {
                Ok(result) => {
                    println!();
                    for line in result.final_text.lines() {
                        println!("  SalesDesk > {line}");
                    }
                    for notice in notices(&result) {
                        println!("  {notice}");
                    }
                    println!();
                }
                Err(e) => {
                    eprintln!("  [Error] {e}");
                    println!();
                }
            },
        }
        prompt()?;
    }

    Ok(())
}

fn spawn_event_log(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => debug!(event = ?event, "Domain event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event log fell behind")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

/// User-facing notes about how the answer was produced.
pub fn notices(result: &AgentTurnResult) -> Vec<String> {
    let mut out = Vec::new();
    if result.was_overridden {
        out.push("🛡️ The original answer was replaced after validation.".to_string());
    }
    if let Some(error) = result.verdict.as_ref().and_then(|v| v.backend_error.as_deref()) {
        out.push(format!("⚠️ Validation unavailable ({error}); answer shown unchecked."));
    }
    if result.was_truncated {
        out.push(format!(
            "⚠️ Stopped after {} steps; the answer may be incomplete.",
            result.step_count
        ));
    }
    if result.escalated() {
        out.push("📨 Flagged for expert review.".to_string());
    }
    out
}
