//! Grounded reasoning controller.
//!
//! Drives a bounded Thought → Action → Observation loop against an
//! [`Oracle`], using the [`Router`] as its only tool, and enforces the
//! grounding invariant: an answer reaches the caller verbatim only if
//! some tool call in this invocation returned at least one candidate.
//!
//! ```text
//! THINKING ──Action──▶ ACTION ──▶ OBSERVING ──▶ THINKING ...
//!    │                               │
//!    ├─Final──▶ FINAL                └─last round──▶ FORCED_FINAL
//!    └─no marker / rounds spent ──▶ EXHAUSTED
//! ```
//!
//! Each round is strictly sequential: round N's prompt contains round
//! N−1's observation. All state (trace, evidence flag, accumulated
//! context) is local to one [`Controller::run`] call, so a caller may
//! drop the future between rounds without cleanup.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Aborted, TriageError};
use crate::evidence::{render_bundle, RenderOptions};
use crate::index::EvidenceIndex;
use crate::oracle::Oracle;
use crate::parse::{final_text, parse_reply, Directive};
use crate::router::Router;
use crate::text::prefix_chars;

/// Answer returned whenever no evidence backs a conclusion.
pub const NO_EVIDENCE_ANSWER: &str =
    "No relevant documentation was retrieved to support a grounded conclusion.";

/// Answer returned when the loop ends without a usable conclusion.
pub const EXHAUSTED_ANSWER: &str = "Unable to reach a grounded conclusion.";

/// One entry of the structured trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReasoningStep {
    Thought {
        text: String,
    },
    Action {
        query: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        service: Option<String>,
    },
    Observation {
        text: String,
    },
    Final {
        text: String,
    },
}

/// Everything that happened during one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Trace {
    /// Structured steps in order.
    pub steps: Vec<ReasoningStep>,
    /// Raw oracle completions in call order.
    pub replies: Vec<String>,
}

impl Trace {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.replies.is_empty()
    }

    /// Number of tool calls made.
    pub fn action_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, ReasoningStep::Action { .. }))
            .count()
    }
}

/// How the invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The oracle produced a `Final:` after evidence was found.
    Grounded,
    /// The final answer came from the forced synthesis call.
    ForcedSynthesis,
    /// No evidence was found; the refusal answer was substituted.
    NoEvidence,
    /// Every round was spent without a conclusion.
    Exhausted,
    /// The oracle replied without any recognised marker.
    Unrecognized,
}

/// Result of a completed invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub answer: String,
    pub resolution: Resolution,
    pub evidence_found: bool,
    pub trace: Trace,
}

/// Loop bounds and prompt shaping.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    /// Number of reasoning rounds (also the advertised search budget).
    pub max_rounds: usize,
    /// Round index at or after which an executed Action triggers forced
    /// synthesis. `None` means the last round.
    pub force_final_after_round: Option<usize>,
    /// Candidates kept per ranked list.
    pub top_k: usize,
    pub render: RenderOptions,
    /// Terms appended to every tool query.
    pub query_expansion: Vec<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_rounds: 2,
            force_final_after_round: None,
            top_k: 5,
            render: RenderOptions::default(),
            query_expansion: Vec::new(),
        }
    }
}

impl AgentSettings {
    fn force_round(&self) -> usize {
        self.force_final_after_round
            .unwrap_or_else(|| self.max_rounds.saturating_sub(1))
    }
}

/// Per-invocation mutable state.
#[derive(Default)]
struct Invocation {
    trace: Trace,
    context: String,
    evidence_found: bool,
}

impl Invocation {
    fn finish(self, answer: &str, resolution: Resolution) -> Outcome {
        info!(?resolution, evidence_found = self.evidence_found, "triage finished");
        Outcome {
            answer: answer.to_string(),
            resolution,
            evidence_found: self.evidence_found,
            trace: self.trace,
        }
    }

    fn abort(self, error: TriageError) -> Aborted {
        warn!(%error, "triage aborted");
        Aborted {
            error,
            trace: self.trace,
        }
    }
}

/// The grounded reasoning loop.
pub struct Controller<I, O> {
    router: Router<I>,
    oracle: O,
    settings: AgentSettings,
}

impl<I: EvidenceIndex, O: Oracle> Controller<I, O> {
    pub fn new(router: Router<I>, oracle: O, settings: AgentSettings) -> Self {
        Self {
            router,
            oracle,
            settings,
        }
    }

    /// Explain `symptom`, optionally scoped to one service.
    ///
    /// Returns `Err` only when the oracle or the index fails; the error
    /// carries the trace recorded so far.
    pub async fn run(&self, symptom: &str, service: Option<&str>) -> Result<Outcome, Aborted> {
        let mut inv = Invocation::default();
        let force_round = self.settings.force_round();

        for round in 0..self.settings.max_rounds {
            let prompt = self.round_prompt(symptom, service, &inv.context);
            let reply = match self.ask(&prompt, round).await {
                Ok(reply) => reply,
                Err(e) => return Err(inv.abort(e)),
            };
            inv.trace.replies.push(reply.clone());

            let parsed = parse_reply(&reply, symptom);
            if let Some(thought) = parsed.thought {
                inv.trace.steps.push(ReasoningStep::Thought { text: thought });
            }

            match parsed.directive {
                Directive::Final(text) => {
                    inv.trace.steps.push(ReasoningStep::Final { text: text.clone() });
                    return Ok(if inv.evidence_found {
                        inv.finish(&text, Resolution::Grounded)
                    } else {
                        inv.finish(NO_EVIDENCE_ANSWER, Resolution::NoEvidence)
                    });
                }
                Directive::Action {
                    query,
                    service: requested,
                } => {
                    let search_query = self.expand_query(&query);
                    inv.trace.steps.push(ReasoningStep::Action {
                        query,
                        service: requested,
                    });

                    let bundle = match self
                        .router
                        .route(&search_query, service, self.settings.top_k)
                        .await
                    {
                        Ok(bundle) => bundle,
                        Err(e) => return Err(inv.abort(e)),
                    };
                    debug!(
                        round,
                        query = %search_query,
                        candidates = bundle.candidate_count(),
                        services = ?bundle.services(),
                        "tool call"
                    );
                    if !bundle.is_empty() {
                        inv.evidence_found = true;
                    }

                    let observation = render_bundle(&bundle, &self.settings.render);
                    inv.context.push_str("\nObservation:\n");
                    inv.context.push_str(&observation);
                    inv.context.push('\n');
                    inv.trace
                        .steps
                        .push(ReasoningStep::Observation { text: observation });

                    if round >= force_round {
                        return self.synthesize(inv, symptom).await;
                    }
                }
                Directive::Unrecognized => {
                    warn!(round, "oracle reply had no Action or Final marker");
                    return Ok(inv.finish(EXHAUSTED_ANSWER, Resolution::Unrecognized));
                }
            }
        }

        Ok(inv.finish(EXHAUSTED_ANSWER, Resolution::Exhausted))
    }

    /// One extra oracle call that may only answer. Never made without
    /// evidence.
    async fn synthesize(&self, mut inv: Invocation, symptom: &str) -> Result<Outcome, Aborted> {
        if !inv.evidence_found {
            return Ok(inv.finish(NO_EVIDENCE_ANSWER, Resolution::NoEvidence));
        }

        let prompt = self.synthesis_prompt(symptom, &inv.context);
        let reply = match self.ask(&prompt, self.settings.max_rounds).await {
            Ok(reply) => reply,
            Err(e) => return Err(inv.abort(e)),
        };
        inv.trace.replies.push(reply.clone());

        let text = final_text(&reply);
        inv.trace.steps.push(ReasoningStep::Final { text: text.clone() });
        Ok(inv.finish(&text, Resolution::ForcedSynthesis))
    }

    async fn ask(&self, prompt: &str, round: usize) -> Result<String, TriageError> {
        debug!(round, prompt = prefix_chars(prompt, 800), "oracle prompt");
        let reply = self.oracle.complete(prompt).await?;
        let reply = reply.trim().to_string();
        debug!(round, reply = %reply, "oracle reply");
        Ok(reply)
    }

    fn expand_query(&self, query: &str) -> String {
        if self.settings.query_expansion.is_empty() {
            return query.to_string();
        }
        let mut parts = vec![query];
        parts.extend(self.settings.query_expansion.iter().map(String::as_str));
        parts.join(" ")
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are an infrastructure troubleshooting assistant.

You MUST reason step-by-step using the following format:

Thought: your reasoning about the symptom
Action: search_docs(query=\"...\", service=\"...\")   (if you need documentation)
Observation: summary of retrieved evidence
Final: grounded explanation strictly based on evidence

Rules:
- You may search at most {} times.
- You MUST search before producing Final.
- You MUST use retrieved evidence in your explanation.
- Do NOT provide generic explanations.
- If evidence is insufficient, say so.
- Do NOT invent configuration or causes.",
            self.settings.max_rounds
        )
    }

    fn round_prompt(&self, symptom: &str, service: Option<&str>, context: &str) -> String {
        let evidence = if context.trim().is_empty() {
            "(none retrieved yet)"
        } else {
            context
        };
        format!(
            "{system}

Symptom:
{symptom}

Evidence from documentation:
{evidence}

Instructions:
- You MUST base your answer strictly on the evidence above.
- You MUST explicitly reference specific behaviors described in the evidence.
- If the evidence does not explain the issue, say:
\"The retrieved documentation does not describe this failure mode.\"

Respond with ONE of the following formats:

Thought: ...
Action: search_docs(query=\"...\", service=\"{service}\")

OR

Final: ...
",
            system = self.system_prompt(),
            service = service.unwrap_or(""),
        )
    }

    fn synthesis_prompt(&self, symptom: &str, context: &str) -> String {
        format!(
            "{system}

Symptom:
{symptom}

Evidence from documentation:
{context}

Based strictly on the evidence above:

- You MUST NOT call any tool or request further searches.
- You MUST reference specific phrases from the excerpts.
- You MUST explain which excerpt supports each claim.
- If no excerpt explicitly describes this failure mode, say so.

Respond only with:

Final: ...
",
            system = self.system_prompt(),
        )
    }
}
