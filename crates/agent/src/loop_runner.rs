//! The agent turn loop.
//!
//! One call to [`AgentLoop::handle_turn`] drives a user message through
//! `AwaitingModel → {DispatchingTools → AwaitingModel}* → AwaitingValidation
//! → Done`. Messages produced during the turn are staged and committed to
//! the conversation only when the turn completes, so a failed model call
//! leaves nothing behind but the user message.

use crate::dispatcher::ToolDispatcher;
use crate::model_gateway::{ModelGateway, ModelTurn};
use crate::turn::{AgentTurnResult, ToolAuditRecord, TurnProgress};
use crate::validation::ValidationGateway;
use chrono::Utc;
use salesdesk_config::AppConfig;
use salesdesk_core::error::ProviderError;
use salesdesk_core::event::{DomainEvent, EventBus};
use salesdesk_core::guardrail::{Guardrail, ValidationVerdict};
use salesdesk_core::message::{ConversationState, Message};
use salesdesk_core::provider::Provider;
use salesdesk_core::tool::ToolCatalog;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_STEPS: usize = 5;

const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The model call failed; the turn was aborted and may be retried with
    /// the same state.
    #[error("model backend failed at step {step}: {source}")]
    ModelBackend {
        step: usize,
        #[source]
        source: ProviderError,
    },
}

/// Drives user turns against a model, a tool catalog and an optional
/// guardrail.
pub struct AgentLoop {
    model: ModelGateway,
    dispatcher: ToolDispatcher,
    validation: ValidationGateway,
    max_steps: usize,
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, catalog: ToolCatalog) -> Self {
        let event_bus = Arc::new(EventBus::default());
        Self {
            model: ModelGateway::new(provider, model),
            dispatcher: ToolDispatcher::new(catalog).with_event_bus(event_bus.clone()),
            validation: ValidationGateway::disabled(),
            max_steps: DEFAULT_MAX_STEPS,
            event_bus,
        }
    }

    /// Wire an agent from loaded configuration.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        guardrail: Option<Arc<dyn Guardrail>>,
        catalog: ToolCatalog,
    ) -> Self {
        let mut agent = Self::new(provider, &config.model.model, catalog)
            .with_max_steps(config.agent.max_steps)
            .with_tool_timeout(Duration::from_secs(config.agent.tool_timeout_secs));
        agent.model = agent
            .model
            .with_temperature(config.model.temperature)
            .with_max_tokens(config.model.max_tokens)
            .with_timeout(Duration::from_secs(config.model.timeout_secs));
        agent.validation = ValidationGateway::new(guardrail)
            .with_timeout(Duration::from_secs(config.guardrail.timeout_secs))
            .with_integration(&config.guardrail.integration);
        agent
    }

    pub fn with_guardrail(mut self, guardrail: Arc<dyn Guardrail>) -> Self {
        self.validation = ValidationGateway::new(Some(guardrail));
        self
    }

    pub fn with_validation(mut self, validation: ValidationGateway) -> Self {
        self.validation = validation;
        self
    }

    /// Cap on model calls per turn (at least one).
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model = self.model.with_timeout(timeout);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.dispatcher = self.dispatcher.with_timeout(timeout);
        self
    }

    /// Publish domain events on a shared bus instead of the private one.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.dispatcher = self.dispatcher.with_event_bus(event_bus.clone());
        self.event_bus = event_bus;
        self
    }

    /// Bus carrying this agent's domain events. The CLI attaches a tracing
    /// sink; embedders can subscribe their own observers.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn catalog(&self) -> &ToolCatalog {
        self.dispatcher.catalog()
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn validation_enabled(&self) -> bool {
        self.validation.is_enabled()
    }

    /// Process one user message to completion.
    pub async fn handle_turn(
        &self,
        user_text: &str,
        state: &mut ConversationState,
    ) -> Result<AgentTurnResult, AgentError> {
        self.run(user_text, state, None).await
    }

    /// Like [`handle_turn`](Self::handle_turn), reporting intermediate steps
    /// on `progress`. A closed receiver is ignored.
    pub async fn handle_turn_with_progress(
        &self,
        user_text: &str,
        state: &mut ConversationState,
        progress: &UnboundedSender<TurnProgress>,
    ) -> Result<AgentTurnResult, AgentError> {
        self.run(user_text, state, Some(progress)).await
    }

    async fn run(
        &self,
        user_text: &str,
        state: &mut ConversationState,
        progress: Option<&UnboundedSender<TurnProgress>>,
    ) -> Result<AgentTurnResult, AgentError> {
        let report = |event: TurnProgress| {
            if let Some(tx) = progress {
                let _ = tx.send(event);
            }
        };
        let thread_id = state.thread_id().clone();

        if !state.ends_with_user(user_text) {
            state.push(Message::user(user_text));
        }
        info!(thread_id = %thread_id.short(), messages = state.len(), "Turn started");
        self.event_bus.publish(DomainEvent::TurnStarted {
            thread_id: thread_id.to_string(),
            content_preview: user_text.chars().take(PREVIEW_CHARS).collect(),
            timestamp: Utc::now(),
        });

        let committed = state.len();
        let mut history: Vec<Message> = state.messages().to_vec();
        let mut audit: Vec<ToolAuditRecord> = Vec::new();
        let mut step = 0;

        loop {
            step += 1;
            report(TurnProgress::Step {
                step,
                max_steps: self.max_steps,
            });
            debug!(thread_id = %thread_id.short(), step, max_steps = self.max_steps, "Awaiting model");

            let reply = match self.model.complete(&history, self.catalog(), step).await {
                Ok(reply) => reply,
                Err(source) => {
                    warn!(thread_id = %thread_id.short(), step, error = %source, "Model call failed, aborting turn");
                    self.event_bus.publish(DomainEvent::ErrorOccurred {
                        context: format!("model call, step {step}"),
                        error_message: source.to_string(),
                        timestamp: Utc::now(),
                    });
                    return Err(AgentError::ModelBackend { step, source });
                }
            };

            let tool_calls = match &reply.turn {
                ModelTurn::ToolRequest { calls, .. } => calls.len(),
                ModelTurn::FinalAnswer(_) => 0,
            };
            self.event_bus.publish(DomainEvent::ModelResponded {
                thread_id: thread_id.to_string(),
                step,
                tool_calls,
                tokens_used: reply.usage.map_or(0, |u| u.total_tokens),
                timestamp: Utc::now(),
            });

            match reply.turn {
                ModelTurn::FinalAnswer(candidate) => {
                    report(TurnProgress::Validating);
                    let verdict = self
                        .validation
                        .validate(user_text, &candidate, &history, self.catalog(), &thread_id)
                        .await;
                    self.event_bus.publish(DomainEvent::ResponseValidated {
                        thread_id: thread_id.to_string(),
                        overridden: verdict.should_override,
                        escalated: verdict.escalated,
                        fail_open: verdict.is_degraded(),
                        timestamp: Utc::now(),
                    });

                    let was_overridden = verdict.should_override;
                    let final_text = match (&verdict.substitute_answer, was_overridden) {
                        (Some(substitute), true) => substitute.clone(),
                        _ => candidate,
                    };
                    history.push(
                        Message::assistant(final_text.clone())
                            .with_metadata("validation", verdict_metadata(&verdict)),
                    );
                    state.extend(history.drain(committed..));

                    info!(
                        thread_id = %thread_id.short(),
                        steps = step,
                        tools = audit.len(),
                        overridden = was_overridden,
                        "Turn completed"
                    );
                    return Ok(AgentTurnResult {
                        thread_id,
                        final_text,
                        was_overridden,
                        was_truncated: false,
                        tool_audit: audit,
                        step_count: step,
                        verdict: Some(verdict),
                    });
                }
                ModelTurn::ToolRequest { calls, text } => {
                    report(TurnProgress::ToolsRequested {
                        step,
                        tools: calls.iter().map(|c| c.name.clone()).collect(),
                    });
                    history.push(Message::assistant_tool_request(text.clone(), calls.clone()));

                    let results = self.dispatcher.execute_all(&calls).await;
                    for result in &results {
                        report(TurnProgress::ToolFinished {
                            tool: result.tool_name.clone(),
                            success: result.is_success(),
                            duration_ms: result.duration_ms,
                        });
                        audit.push(result.audit_record(step));
                        history.push(result.to_message());
                    }

                    if step >= self.max_steps {
                        let final_text = truncation_notice(self.max_steps, text.as_deref(), &audit, step);
                        history.push(
                            Message::assistant(final_text.clone()).with_metadata("truncated", serde_json::json!(true)),
                        );
                        state.extend(history.drain(committed..));

                        warn!(thread_id = %thread_id.short(), steps = step, "Step cap reached, turn truncated");
                        self.event_bus.publish(DomainEvent::TurnTruncated {
                            thread_id: thread_id.to_string(),
                            steps: step,
                            timestamp: Utc::now(),
                        });
                        return Ok(AgentTurnResult {
                            thread_id,
                            final_text,
                            was_overridden: false,
                            was_truncated: true,
                            tool_audit: audit,
                            step_count: step,
                            verdict: None,
                        });
                    }
                }
            }
        }
    }
}

fn verdict_metadata(verdict: &ValidationVerdict) -> serde_json::Value {
    serde_json::json!({
        "overridden": verdict.should_override,
        "escalated": verdict.escalated,
        "backend_error": verdict.backend_error,
        "diagnostics": verdict.diagnostics,
    })
}

/// Answer for a turn that ran out of steps: whatever the model said last,
/// then the last step's tool summaries, marked incomplete.
fn truncation_notice(max_steps: usize, text: Option<&str>, audit: &[ToolAuditRecord], step: usize) -> String {
    let mut out = format!("⚠️ Incomplete answer: stopped after {max_steps} steps.");
    if let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) {
        out.push_str("\n\n");
        out.push_str(text);
    }
    let last: Vec<&ToolAuditRecord> = audit.iter().filter(|r| r.step == step).collect();
    if !last.is_empty() {
        out.push_str("\n\nLast tool results:");
        for record in last {
            out.push_str(&format!("\n- {}: {}", record.tool_name, record.summary));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        ScriptedGuardrail, ScriptedProvider, StubTool, text_response, tool_call, tool_response,
    };
    use crate::validation::SAFETY_FALLBACK;
    use salesdesk_core::error::GuardrailError;
    use salesdesk_core::message::Role;

    fn catalog() -> ToolCatalog {
        ToolCatalog::new()
            .with(Arc::new(StubTool::echo("a").with_delay(Duration::from_millis(300))))
            .with(Arc::new(StubTool::echo("b").with_delay(Duration::from_millis(100))))
            .with(Arc::new(StubTool::echo("c")))
            .with(Arc::new(StubTool::echo("get_pipeline_report")))
    }

    fn agent(provider: Arc<ScriptedProvider>) -> AgentLoop {
        AgentLoop::new(provider, "mock-model", catalog())
    }

    fn state() -> ConversationState {
        ConversationState::new("You are a sales assistant.")
    }

    #[tokio::test]
    async fn direct_answer_appends_user_and_assistant() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Hello!")]));
        let mut state = state();
        let result = agent(provider).handle_turn("Hi", &mut state).await.unwrap();

        assert_eq!(result.final_text, "Hello!");
        assert_eq!(result.step_count, 1);
        assert!(result.tool_audit.is_empty());
        assert_eq!(result.thread_id, *state.thread_id());
        let roles: Vec<Role> = state.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn user_message_is_not_duplicated_on_retry() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::Network("down".into())));
        let mut state = state();
        let agent = agent(provider);

        let err = agent.handle_turn("Pipeline?", &mut state).await.unwrap_err();
        assert!(matches!(err, AgentError::ModelBackend { step: 1, .. }));
        assert_eq!(state.len(), 2);

        agent.handle_turn("Pipeline?", &mut state).await.unwrap_err();
        assert_eq!(state.len(), 2, "retry must not append the user message again");
        assert!(state.ends_with_user("Pipeline?"));
    }

    #[tokio::test]
    async fn model_failure_mid_turn_leaves_no_partial_state() {
        let provider = Arc::new(ScriptedProvider::scripted(vec![
            Ok(tool_response(vec![tool_call("1", "c", "{}")], None)),
            Err(ProviderError::RateLimited { retry_after_secs: 5 }),
        ]));
        let mut state = state();
        let err = agent(provider).handle_turn("q", &mut state).await.unwrap_err();
        assert!(matches!(err, AgentError::ModelBackend { step: 2, .. }));
        assert_eq!(state.len(), 2);
        assert!(state.orphaned_tool_results().is_empty());
    }

    #[tokio::test]
    async fn tool_results_are_never_orphaned() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![tool_call("1", "a", "{}"), tool_call("2", "nope", "{}")], None),
            tool_response(vec![tool_call("3", "c", "not json")], Some("retrying")),
            text_response("done"),
        ]));
        let mut state = state();
        let result = agent(provider).handle_turn("q", &mut state).await.unwrap();

        assert_eq!(result.step_count, 3);
        assert!(state.orphaned_tool_results().is_empty());
        let roles: Vec<Role> = state.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [
                Role::System,
                Role::User,
                Role::Assistant,
                Role::Tool,
                Role::Tool,
                Role::Assistant,
                Role::Tool,
                Role::Assistant,
            ]
        );
        assert_eq!(state.messages()[5].text(), "retrying");
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_order_is_request_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(
                vec![tool_call("A", "a", "{}"), tool_call("B", "b", "{}"), tool_call("C", "c", "{}")],
                None,
            ),
            text_response("ok"),
        ]));
        let mut state = state();
        let result = agent(provider).handle_turn("q", &mut state).await.unwrap();

        let ids: Vec<&str> = state
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(ids, ["A", "B", "C"]);
        let audited: Vec<&str> = result.tool_audit.iter().map(|r| r.tool_name.as_str()).collect();
        assert_eq!(audited, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn unknown_tool_is_folded_back_and_turn_continues() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![tool_call("1", "forecast_weather", "{}")], None),
            text_response("I can't do that, but here is the pipeline."),
        ]));
        let mut state = state();
        let result = agent(provider.clone()).handle_turn("q", &mut state).await.unwrap();

        assert!(!result.was_truncated);
        assert_eq!(result.step_count, 2);
        assert!(!result.tool_audit[0].success);
        let tool_msg = state.messages().iter().find(|m| m.role == Role::Tool).unwrap();
        let payload: serde_json::Value = serde_json::from_str(tool_msg.text()).unwrap();
        assert_eq!(payload["error"], "tool not implemented");

        // the second model call saw the error payload
        let second = &provider.requests()[1];
        assert_eq!(second.messages.last().unwrap().role, Role::Tool);
    }

    #[tokio::test]
    async fn step_cap_truncates_without_validation() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_response(
            vec![tool_call("", "c", "{}")],
            None,
        )]));
        let guardrail = Arc::new(ScriptedGuardrail::passing());
        let agent = agent(provider.clone()).with_max_steps(3).with_guardrail(guardrail.clone());
        let mut state = state();
        let result = agent.handle_turn("loop forever", &mut state).await.unwrap();

        assert!(result.was_truncated);
        assert_eq!(result.step_count, 3);
        assert_eq!(provider.calls(), 3);
        assert!(result.verdict.is_none());
        assert!(guardrail.requests().is_empty());
        assert!(result.final_text.starts_with("⚠️ Incomplete answer"));
        assert!(result.final_text.contains("- c:"));
        assert!(state.orphaned_tool_results().is_empty());
        assert_eq!(state.last().unwrap().metadata["truncated"], true);

        let ids: Vec<&str> = result.tool_audit.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, ["call_1_0", "call_2_0", "call_3_0"]);
    }

    #[tokio::test]
    async fn failing_guardrail_fails_open() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Pipeline is $555,000.")]));
        let guardrail = Arc::new(ScriptedGuardrail::new(Err(GuardrailError::ApiError {
            status_code: 503,
            message: "unavailable".into(),
        })));
        let mut state = state();
        let result = agent(provider)
            .with_guardrail(guardrail)
            .handle_turn("q", &mut state)
            .await
            .unwrap();

        assert_eq!(result.final_text, "Pipeline is $555,000.");
        assert!(!result.was_overridden);
        assert!(result.validation_degraded());
        assert_eq!(state.last().unwrap().text(), "Pipeline is $555,000.");
    }

    #[tokio::test]
    async fn unset_guardrail_passes() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("answer")]));
        let mut state = state();
        let result = agent(provider).handle_turn("q", &mut state).await.unwrap();
        assert_eq!(result.final_text, "answer");
        assert!(!result.was_overridden);
        assert_eq!(result.verdict, Some(ValidationVerdict::pass()));
    }

    #[tokio::test]
    async fn override_substitutes_answer() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("risky answer")]));
        let guardrail = Arc::new(ScriptedGuardrail::new(Ok(ValidationVerdict::replace_with(
            "Vetted answer.",
        ))));
        let mut state = state();
        let result = agent(provider)
            .with_guardrail(guardrail)
            .handle_turn("q", &mut state)
            .await
            .unwrap();

        assert!(result.was_overridden);
        assert_eq!(result.final_text, "Vetted answer.");
        let last = state.last().unwrap();
        assert_eq!(last.text(), "Vetted answer.");
        assert_eq!(last.metadata["validation"]["overridden"], true);
    }

    #[tokio::test]
    async fn override_without_substitute_uses_safety_fallback() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("risky answer")]));
        let blocked = ValidationVerdict {
            should_override: true,
            escalated: true,
            ..ValidationVerdict::default()
        };
        let guardrail = Arc::new(ScriptedGuardrail::new(Ok(blocked)));
        let mut state = state();
        let result = agent(provider)
            .with_guardrail(guardrail)
            .handle_turn("q", &mut state)
            .await
            .unwrap();

        assert_eq!(result.final_text, SAFETY_FALLBACK);
        assert!(result.escalated());
    }

    #[tokio::test]
    async fn pipeline_scenario() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(
                vec![tool_call("1", "get_pipeline_report", r#"{"close_date_filter":"next_month"}"#)],
                None,
            ),
            text_response("Five deals worth $555,000 close next month."),
        ]));
        let guardrail = Arc::new(ScriptedGuardrail::passing());
        let mut state = state();
        let result = agent(provider)
            .with_guardrail(guardrail.clone())
            .handle_turn("Show me the pipeline for next month", &mut state)
            .await
            .unwrap();

        assert_eq!(result.step_count, 2);
        assert_eq!(result.tool_audit.len(), 1);
        assert_eq!(result.tool_audit[0].arguments["close_date_filter"], "next_month");
        assert!(!result.was_overridden);
        let tool_msg = state.messages().iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("1"));

        let validated = guardrail.requests();
        assert_eq!(validated.len(), 1);
        assert_eq!(validated[0].query, "Show me the pipeline for next month");
        assert_eq!(validated[0].response, "Five deals worth $555,000 close next month.");
    }

    #[tokio::test]
    async fn progress_reports_each_step() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![tool_call("1", "c", "{}")], None),
            text_response("done"),
        ]));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut state = state();
        agent(provider)
            .with_max_steps(4)
            .handle_turn_with_progress("q", &mut state, &tx)
            .await
            .unwrap();
        drop(tx);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event.to_string());
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[..2], ["step 1 of 4", "calling c"]);
        assert!(seen[2].starts_with("c ok"), "{}", seen[2]);
        assert_eq!(seen[3..], ["step 2 of 4", "validating answer"]);
    }

    #[tokio::test]
    async fn events_are_published() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("done")]));
        let agent = agent(provider);
        let mut rx = agent.event_bus().subscribe();
        let mut state = state();
        agent.handle_turn("q", &mut state).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event.as_ref() {
                DomainEvent::TurnStarted { .. } => "started",
                DomainEvent::ModelResponded { .. } => "model",
                DomainEvent::ResponseValidated { .. } => "validated",
                _ => "other",
            });
        }
        assert_eq!(kinds, ["started", "model", "validated"]);
    }
}
