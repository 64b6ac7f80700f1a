//! Per-request chat state machine.
//!
//! INIT → MOD_PRE → ESTIMATE → FREEZE → ASSEMBLE → UPSTREAM_OPEN → STREAM
//! → MOD_POST → SETTLE → PERSIST → DONE, with error transitions to REFUND
//! and ERROR_EMIT. The whole turn runs on a spawned task: a client
//! disconnect stops frame delivery but settlement and persistence always
//! complete.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::frames::ChatFrame;
use crate::agent::{Agent, AgentRepository};
use crate::conversation::{AppendTurn, Message};
use crate::core_types::{ConversationId, UserId};
use crate::gateway::state::AppState;
use crate::gateway::types::sse_codes;
use crate::ledger::FreezeOutcome;
use crate::llm::{StreamEvent, Usage};
use crate::moderation::Verdict;
use crate::persist::{EnqueueResult, PersistJob};
use crate::prompt::render_persona_block;

/// One chat turn request.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnRequest {
    /// Absent for the first turn of a fresh conversation.
    pub conversation_id: Option<ConversationId>,
    pub agent_id: i64,
    pub project_id: Option<i64>,
    #[validate(length(min = 1, max = 8000))]
    pub message: String,
    /// Platform model code; falls back to the configured default.
    pub model: Option<String>,
    /// Caller-chosen idempotency key covering this turn's ledger effects.
    /// Generated server-side when absent.
    pub request_id: Option<Uuid>,
}

/// Orchestrator phase, used for tracing and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    ModPre,
    Estimate,
    Freeze,
    Assemble,
    UpstreamOpen,
    Stream,
    ModPost,
    Settle,
    Persist,
    Done,
}

struct FrameSink {
    tx: mpsc::Sender<ChatFrame>,
    client_gone: bool,
}

impl FrameSink {
    fn new(tx: mpsc::Sender<ChatFrame>) -> Self {
        Self {
            tx,
            client_gone: false,
        }
    }

    /// Send unless the client already disconnected. Returns whether the
    /// client is still attached.
    async fn send(&mut self, frame: ChatFrame) -> bool {
        if !self.client_gone && self.tx.send(frame).await.is_err() {
            self.client_gone = true;
        }
        !self.client_gone
    }
}

/// Run one chat turn end to end, emitting frames into `tx`.
pub async fn run_turn(
    state: Arc<AppState>,
    user_id: UserId,
    req: ChatTurnRequest,
    tx: mpsc::Sender<ChatFrame>,
) {
    let request_id = req.request_id.unwrap_or_else(Uuid::new_v4);
    let span = tracing::info_span!("chat_turn", %request_id, user_id);
    run_phases(state, user_id, req, tx, request_id)
        .instrument(span)
        .await;
}

async fn run_phases(
    state: Arc<AppState>,
    user_id: UserId,
    req: ChatTurnRequest,
    tx: mpsc::Sender<ChatFrame>,
    request_id: Uuid,
) {
    let mut sink = FrameSink::new(tx);

    // ---- MOD_PRE: fail closed before any ledger effect --------------------
    tracing::debug!(phase = ?Phase::ModPre, "turn started");
    if let Verdict::Blocked { matched } = state.moderation.check_pre(&req.message) {
        tracing::info!(matched = %matched, "pre-check blocked request");
        sink.send(ChatFrame::error(sse_codes::CONTENT_VIOLATION_PRE))
            .await;
        return;
    }

    // ---- Resolve model / agent / persona / history ------------------------
    let model_code = req
        .model
        .clone()
        .unwrap_or_else(|| state.config.default_model.clone());
    let Some(model) = state.registry.model(&model_code).cloned() else {
        sink.send(ChatFrame::error(sse_codes::NOT_FOUND)).await;
        return;
    };

    let agent = match AgentRepository::get_active(state.db.pool(), req.agent_id).await {
        Ok(Some(agent)) => agent,
        Ok(None) => {
            sink.send(ChatFrame::error(sse_codes::NOT_FOUND)).await;
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "agent lookup failed");
            sink.send(ChatFrame::error(sse_codes::INTERNAL)).await;
            return;
        }
    };

    let persona_block = match resolve_persona(&state, user_id, req.project_id).await {
        Ok(block) => block,
        Err(frame) => {
            sink.send(frame).await;
            return;
        }
    };

    let history = match load_history(&state, user_id, req.conversation_id).await {
        Ok(history) => history,
        Err(frame) => {
            sink.send(frame).await;
            return;
        }
    };

    // ---- ESTIMATE ---------------------------------------------------------
    let sampling = agent.sampling(state.config.fee.output_token_cap);
    let prompt_chars = req.message.chars().count()
        + persona_block.as_deref().map_or(0, |b| b.chars().count())
        + agent.system_prompt.chars().count();
    let est_in = state.estimator.input_tokens(&model, prompt_chars);
    let est_out = state
        .estimator
        .estimated_output_tokens(&model, sampling.max_tokens);
    let estimate = state.estimator.fee(&model, est_in, est_out);
    tracing::debug!(%estimate, est_in, est_out, phase = ?Phase::Estimate, "estimate computed");

    // ---- FREEZE -----------------------------------------------------------
    tracing::debug!(phase = ?Phase::Freeze, "freezing estimate");
    match state
        .ledger
        .freeze(user_id, estimate, request_id, &model.code, req.conversation_id)
        .await
    {
        Ok(FreezeOutcome::Frozen { .. }) => {}
        Ok(FreezeOutcome::AlreadyFrozen { .. }) => {
            // A replayed request id must not stream (and persist) the turn
            // a second time; the ledger effect already happened exactly once.
            tracing::info!("freeze replay detected, refusing duplicate turn");
            sink.send(ChatFrame::error(sse_codes::ALREADY_PROCESSING))
                .await;
            return;
        }
        Ok(FreezeOutcome::InsufficientBalance) => {
            sink.send(ChatFrame::error(sse_codes::INSUFFICIENT_BALANCE))
                .await;
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "freeze failed");
            let code = if e.is_transient() {
                sse_codes::TRANSIENT
            } else {
                sse_codes::INTERNAL
            };
            sink.send(ChatFrame::error(code)).await;
            return;
        }
    }

    // The conversation row exists before the stream opens so the first
    // frame can carry a real id and the persist job a concrete reference.
    let conversation_id = match ensure_conversation(&state, user_id, &req, &agent).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "conversation create failed");
            refund(&state, user_id, request_id).await;
            sink.send(ChatFrame::error(sse_codes::INTERNAL)).await;
            return;
        }
    };

    // ---- ASSEMBLE ---------------------------------------------------------
    let prompt = state.prompt_builder.build(
        &agent.system_prompt,
        persona_block.as_deref(),
        &history,
        &req.message,
        model.provider,
    );
    tracing::debug!(
        phase = ?Phase::Assemble,
        persona_in_user = prompt.persona_in_user,
        "prompt assembled"
    );

    // ---- UPSTREAM_OPEN ----------------------------------------------------
    tracing::debug!(phase = ?Phase::UpstreamOpen, model = %model.code, "opening upstream");
    let open = state
        .registry
        .open_stream(
            &model.code,
            Some(prompt.system.clone()),
            prompt.messages.clone(),
            sampling,
        )
        .await;
    let mut stream = match open {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "upstream open failed");
            refund(&state, user_id, request_id).await;
            sink.send(ChatFrame::error(sse_codes::UPSTREAM_ERROR)).await;
            return;
        }
    };

    sink.send(ChatFrame::conversation(conversation_id)).await;

    // ---- STREAM -----------------------------------------------------------
    tracing::debug!(phase = ?Phase::Stream, "streaming");
    let deadline = Instant::now() + Duration::from_millis(model.total_deadline_ms);
    let read_timeout = Duration::from_millis(model.read_timeout_ms);
    let mut assistant_text = String::new();
    let mut usage = Usage::default();
    let mut upstream_error: Option<String> = None;

    loop {
        let step_deadline = (Instant::now() + read_timeout).min(deadline);
        match timeout_at(step_deadline, stream.next()).await {
            Err(_) => {
                upstream_error = Some("upstream read timeout".to_string());
                break;
            }
            Ok(None) | Ok(Some(StreamEvent::Done)) => break,
            Ok(Some(StreamEvent::Delta(delta))) => {
                assistant_text.push_str(&delta);
                if !sink.send(ChatFrame::content(delta)).await {
                    // Client disconnected: abort upstream, treat the partial
                    // text as done and settle for what was delivered.
                    tracing::info!("client disconnected mid-stream");
                    break;
                }
            }
            Ok(Some(StreamEvent::Usage(u))) => usage.merge(u),
            Ok(Some(StreamEvent::Error(e))) => {
                upstream_error = Some(e);
                break;
            }
        }
    }
    // Dropping the stream aborts the upstream response body.
    drop(stream);

    if let Some(error) = upstream_error {
        tracing::warn!(error = %error, "upstream failed mid-stream");
        refund(&state, user_id, request_id).await;
        sink.send(ChatFrame::error(sse_codes::UPSTREAM_ERROR)).await;
        return;
    }

    // ---- MOD_POST ---------------------------------------------------------
    tracing::debug!(phase = ?Phase::ModPost, chars = assistant_text.chars().count(), "post-check");
    let post_verdict = state.moderation.check_post(&assistant_text);
    let blocked = post_verdict.is_blocked();
    if let Verdict::Blocked { matched } = &post_verdict {
        tracing::info!(matched = %matched, "post-check blocked output");
    }

    // ---- SETTLE -----------------------------------------------------------
    tracing::debug!(phase = ?Phase::Settle, "settling");
    let actual = if blocked {
        state.estimator.penalty(estimate)
    } else {
        let in_tokens = usage.prompt_tokens.unwrap_or(est_in);
        let out_tokens = usage.completion_tokens.unwrap_or_else(|| {
            state
                .estimator
                .output_tokens_from_chars(&model, assistant_text.chars().count())
        });
        state.estimator.fee(&model, in_tokens, out_tokens)
    };
    if let Err(e) = state.ledger.settle(user_id, request_id, actual).await {
        // The freeze stays FROZEN; surfaced for the reconciliation sweep.
        tracing::error!(error = %e, %actual, "settle failed");
    }

    // ---- PERSIST ----------------------------------------------------------
    tracing::debug!(phase = ?Phase::Persist, "enqueueing turn");
    let user_tokens =
        state
            .estimator
            .input_tokens(&model, req.message.chars().count())
            .min(i32::MAX as i64) as i32;
    let assistant_tokens = usage
        .completion_tokens
        .unwrap_or_else(|| {
            state
                .estimator
                .output_tokens_from_chars(&model, assistant_text.chars().count())
        })
        .min(i32::MAX as i64) as i32;

    let turn = AppendTurn {
        conversation_id: Some(conversation_id),
        user_id,
        agent_id: Some(agent.agent_id),
        project_id: req.project_id,
        model_code: model.code.clone(),
        user_text: req.message.clone(),
        user_tokens,
        assistant_text,
        assistant_tokens,
    };

    if state.queue.enqueue(PersistJob::new(turn.clone())) == EnqueueResult::Dropped {
        // Inline fallback: slower, same atomic insertion pattern.
        if let Err(e) = state.store.append_turn(&turn).await {
            tracing::error!(error = %e, "inline persist fallback failed");
        }
    }

    // ---- DONE -------------------------------------------------------------
    if blocked {
        sink.send(ChatFrame::error(sse_codes::CONTENT_VIOLATION_POST))
            .await;
    } else {
        sink.send(ChatFrame::done()).await;
    }
    tracing::debug!(phase = ?Phase::Done, conversation_id, "chat turn finished");
}

async fn resolve_persona(
    state: &AppState,
    user_id: UserId,
    project_id: Option<i64>,
) -> Result<Option<String>, ChatFrame> {
    let Some(project_id) = project_id else {
        return Ok(None);
    };
    match crate::prompt::ProjectRepository::get_owned(state.db.pool(), user_id, project_id).await {
        Ok(Some(persona)) => Ok(Some(render_persona_block(&persona))),
        Ok(None) => Err(ChatFrame::error(sse_codes::NOT_FOUND)),
        Err(e) => {
            tracing::error!(error = %e, "persona lookup failed");
            Err(ChatFrame::error(sse_codes::INTERNAL))
        }
    }
}

async fn load_history(
    state: &AppState,
    user_id: UserId,
    conversation_id: Option<ConversationId>,
) -> Result<Vec<Message>, ChatFrame> {
    let Some(conversation_id) = conversation_id else {
        return Ok(Vec::new());
    };
    match state.store.get_owned(user_id, conversation_id).await {
        Ok(Some(_)) => state
            .store
            .recent_messages(conversation_id, state.config.prompt.history_max_messages)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "history load failed");
                ChatFrame::error(sse_codes::INTERNAL)
            }),
        Ok(None) => Err(ChatFrame::error(sse_codes::NOT_FOUND)),
        Err(e) => {
            tracing::error!(error = %e, "conversation lookup failed");
            Err(ChatFrame::error(sse_codes::INTERNAL))
        }
    }
}

async fn ensure_conversation(
    state: &AppState,
    user_id: UserId,
    req: &ChatTurnRequest,
    agent: &Agent,
) -> Result<ConversationId, sqlx::Error> {
    match req.conversation_id {
        Some(id) => Ok(id),
        None => {
            state
                .store
                .create_from_first_message(
                    user_id,
                    Some(agent.agent_id),
                    req.project_id,
                    &req.message,
                )
                .await
        }
    }
}

async fn refund(state: &AppState, user_id: UserId, request_id: Uuid) {
    if let Err(e) = state.ledger.refund(user_id, request_id).await {
        tracing::error!(error = %e, %request_id, "refund failed");
    }
}
