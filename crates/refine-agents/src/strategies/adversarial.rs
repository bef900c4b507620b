//! Adversarial arena — a critic attacks, the generator defends.
//!
//! The arena state machine lives in [`evaluation::arena`]; this module only
//! drives it with model calls. A critic response that cannot be parsed is
//! replaced by heuristic criticisms. A failed rewrite ends the arena early,
//! keeping the best round so far.

use evaluation::critique::heuristic_criticisms;
use evaluation::resilience::DegradedReason;
use evaluation::{
    ArenaConfig, ArenaSession, ArenaStep, Criticism, EvaluationConfig, EvaluationResult,
    TaskContext,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::llm::{extract_json_array, LlmCaller};

const CRITIC_PREAMBLE: &str = "You are a relentless but fair critic. You find every weakness \
    in a piece of writing: gaps, unsupported claims, logical jumps and poor structure. \
    You respond with JSON only.";

const GENERATOR_PREAMBLE: &str = "You are an expert author revising your own work in response \
    to criticism. You return only the full revised text, with no commentary.";

#[derive(Debug, Clone)]
pub struct AdversarialStrategy {
    caller: LlmCaller,
    config: EvaluationConfig,
    arena: ArenaConfig,
}

/// A finished arena plus how many critic rounds fell back to heuristics.
#[derive(Debug)]
pub struct ArenaRun {
    pub session: ArenaSession,
    pub fallback_rounds: u32,
    pub last_fallback: Option<DegradedReason>,
}

impl AdversarialStrategy {
    pub fn new(caller: LlmCaller, config: EvaluationConfig, arena: ArenaConfig) -> Self {
        Self {
            caller,
            config,
            arena,
        }
    }

    pub fn arena_config(&self) -> &ArenaConfig {
        &self.arena
    }

    pub async fn evaluate(
        &self,
        content: &str,
        task: &TaskContext,
        iteration: u32,
        cancel: &CancellationToken,
    ) -> EvaluationResult {
        let run = self.run_arena(content, task, cancel).await;
        let phase = run.session.phase;
        let mut result = run
            .session
            .into_evaluation_result(iteration, self.config.quality_threshold);
        if let Some(reason) = run.last_fallback {
            result = result
                .with_metadata("critic_fallback_rounds", u64::from(run.fallback_rounds))
                .mark_degraded(reason.as_str());
        }
        info!(
            task_id = %task.id,
            iteration,
            %phase,
            score = result.overall_score,
            refined = result.refined_content.is_some(),
            "Arena finished"
        );
        result
    }

    /// Drive attack/defend rounds until the session reaches a terminal phase.
    pub async fn run_arena(
        &self,
        content: &str,
        task: &TaskContext,
        cancel: &CancellationToken,
    ) -> ArenaRun {
        let mut session = ArenaSession::new(content, self.arena.clone());
        let mut fallback_rounds = 0;
        let mut last_fallback = None;

        while !session.is_complete() {
            if cancel.is_cancelled() {
                session.abort("cancelled before critic call");
                break;
            }

            let round = session.next_round();
            let (criticisms, fallback) = self.attack(session.current_content(), task, cancel).await;
            if let Some(reason) = fallback {
                fallback_rounds += 1;
                last_fallback = Some(reason);
            }

            match session.record_attack(criticisms) {
                Ok(ArenaStep::Defend) => {}
                Ok(ArenaStep::Finished(phase)) => {
                    debug!(task_id = %task.id, round, %phase, "Arena stopped");
                    break;
                }
                Err(e) => {
                    warn!(task_id = %task.id, round, error = %e, "Arena rejected attack");
                    break;
                }
            }

            if cancel.is_cancelled() {
                session.abort("cancelled before generator call");
                break;
            }

            match self.defend(&session, task, cancel).await {
                Some(improved) => {
                    if let Err(e) = session.record_defense(&improved) {
                        warn!(task_id = %task.id, round, error = %e, "Arena rejected defense");
                        session.abort("defense rejected");
                    }
                }
                None => session.abort("generator failed"),
            }
        }

        ArenaRun {
            session,
            fallback_rounds,
            last_fallback,
        }
    }

    // ── Critic ──────────────────────────────────────────────────────────

    async fn attack(
        &self,
        content: &str,
        task: &TaskContext,
        cancel: &CancellationToken,
    ) -> (Vec<Criticism>, Option<DegradedReason>) {
        let prompt = critic_prompt(content, task);
        match self.caller.call(Some(CRITIC_PREAMBLE), &prompt, cancel).await {
            Ok(raw) => match parse_criticisms(&raw) {
                Some(criticisms) => (criticisms, None),
                None => {
                    warn!(task_id = %task.id, "Critic response unusable; using heuristic criticisms");
                    (heuristic_criticisms(content), Some(DegradedReason::ParseFailure))
                }
            },
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Critic call failed; using heuristic criticisms");
                (heuristic_criticisms(content), Some(DegradedReason::TransportFailure))
            }
        }
    }

    // ── Generator ───────────────────────────────────────────────────────

    async fn defend(
        &self,
        session: &ArenaSession,
        task: &TaskContext,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let prompt = defense_prompt(session.current_content(), session.latest_criticisms(), task);
        match self.caller.call(Some(GENERATOR_PREAMBLE), &prompt, cancel).await {
            Ok(improved) if !improved.trim().is_empty() => Some(improved.trim().to_string()),
            Ok(_) => {
                warn!(task_id = %task.id, "Generator returned empty rewrite; ending arena");
                None
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Generator call failed; ending arena");
                None
            }
        }
    }
}

/// Parse a critic response. An empty array is a valid "no criticisms" answer.
pub fn parse_criticisms(raw: &str) -> Option<Vec<Criticism>> {
    let json = extract_json_array(raw)?;
    serde_json::from_str(json).ok()
}

fn critic_prompt(content: &str, task: &TaskContext) -> String {
    format!(
        "Critique the content below, written for the task \"{}\" (type: {}).\n\
         List every weakness as a JSON array of objects with the fields:\n\
         - category: one of completeness, accuracy, clarity, coherence, relevance, \
           scientific_rigor, structure, length, logic\n\
         - issue: what is wrong\n\
         - severity: high, medium or low\n\
         - suggestion: how to fix it\n\
         - evidence: a short quote from the content\n\
         Return [] if you find nothing worth fixing. Respond with ONLY the JSON array.\n\n\
         Content:\n---\n{}\n---",
        task.name,
        task.task_type,
        content.trim()
    )
}

fn defense_prompt(content: &str, criticisms: &[Criticism], task: &TaskContext) -> String {
    let mut prompt = format!(
        "Rewrite the content below for the task \"{}\" so that it answers every criticism. \
         Keep what is already good.\n\n## Criticisms\n",
        task.name
    );
    for c in criticisms {
        prompt.push_str(&format!("- [{}] {}: {}", c.severity, c.category, c.issue));
        if !c.suggestion.trim().is_empty() {
            prompt.push_str(&format!(" (fix: {})", c.suggestion.trim()));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!("\n## Content\n{}\n", content.trim()));
    prompt
}
