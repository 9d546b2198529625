//! Stage orchestrator for narrative analysis.
//!
//! Sequences the safety gate, the optional clarifying-questions branch, the
//! three extraction stages and tag detection, emitting analytics events on
//! each transition. Every invocation is independent; nothing is shared
//! between runs except the completion service and the analytics sink.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{CompletionRequest, CompletionService, OpenAiAdapter};
use crate::analytics::{fingerprint, Analytics};
use crate::config::{PipelineSettings, ResolvedConfig};
use crate::domain::{
    merge_answers, AnalysisRequest, AnalysisResponse, AnalysisResult, EventName, ExitReason,
    NarrativeLoop, Outcome, PipelineRun, PipelineState, SpiessMap, Stage, Summary,
};

use super::prompts;
use super::repair::parse_with_repair;
use super::safety::{GateRejection, ProcessedInput, SafetyGate};
use super::schema::{conform, truncate_words, Conformed, StageSchema};
use super::tags::tag_analysis;

const PROCESSING_ERROR_MESSAGE: &str =
    "Something went wrong while analyzing your story. Please try again in a moment.";

/// Main analysis orchestrator
pub struct Orchestrator {
    completion: Arc<dyn CompletionService>,
    analytics: Analytics,
    gate: SafetyGate,
    settings: PipelineSettings,
}

/// Per-invocation context threaded through the stages
struct RunContext<'a> {
    run: PipelineRun,
    user_id: Option<&'a str>,
    request_context: Option<&'a Value>,
}

impl Orchestrator {
    /// Create an orchestrator over any completion backend
    pub fn new(
        completion: Arc<dyn CompletionService>,
        analytics: Analytics,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            completion,
            analytics,
            gate: SafetyGate::new(settings.max_input_chars),
            settings,
        }
    }

    /// Create an orchestrator backed by the configured OpenAI-compatible service
    pub fn from_config(config: &ResolvedConfig, analytics: Analytics) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("No API key configured (set LOOPWISE_API_KEY or OPENAI_API_KEY)")?;

        let adapter = OpenAiAdapter::new(&config.base_url, api_key, config.pipeline.timeout());
        Ok(Self::new(Arc::new(adapter), analytics, config.pipeline.clone()))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the full pipeline for one request.
    ///
    /// Always returns a structured response; internal failures are logged
    /// and reported generically.
    #[instrument(skip(self, request), fields(session_id))]
    pub async fn analyze(&self, request: AnalysisRequest) -> AnalysisResponse {
        let session_id = request.session_id.unwrap_or_else(Uuid::new_v4);
        tracing::Span::current().record("session_id", tracing::field::display(session_id));

        let mut ctx = RunContext {
            run: PipelineRun::new(session_id),
            user_id: request.user_id.as_deref(),
            request_context: request.request_context.as_ref(),
        };

        if request.session_id.is_none() {
            self.track(&ctx, EventName::SessionStarted, json!({})).await;
        }

        let resumed = request.answers.is_some();
        let raw_input = match request.answers.as_deref().map(merge_answers) {
            Some(answers) if !answers.is_empty() => format!("{} {}", request.input.trim(), answers),
            _ => request.input.clone(),
        };

        let processed = match self
            .gate
            .validate(&raw_input, request.storage_opt_in, request.redact_names)
        {
            Ok(processed) => processed,
            Err(rejection) => return self.safe_exit(&mut ctx, rejection).await,
        };

        match self.run_stages(&mut ctx, &processed, resumed).await {
            Ok(response) => response,
            Err(e) => {
                error!(%session_id, state = ?ctx.run.state, error = ?e, "Analysis failed");
                ctx.run.fail();
                self.track(
                    &ctx,
                    EventName::SafeExit,
                    json!({ "reason": ExitReason::ProcessingError }),
                )
                .await;
                AnalysisResponse::new(
                    session_id,
                    Outcome::ProcessingError {
                        message: PROCESSING_ERROR_MESSAGE.to_string(),
                    },
                )
            }
        }
    }

    /// Continue a session with answers to previously asked questions.
    ///
    /// Never asks questions again, even if no answers are supplied.
    pub async fn process_answers(&self, mut request: AnalysisRequest) -> AnalysisResponse {
        if request.answers.is_none() {
            request.answers = Some(Vec::new());
        }
        self.analyze(request).await
    }

    async fn run_stages(
        &self,
        ctx: &mut RunContext<'_>,
        processed: &ProcessedInput,
        resumed: bool,
    ) -> Result<AnalysisResponse> {
        let session_id = ctx.run.session_id;
        let input = processed.text.as_str();

        ctx.run.advance(PipelineState::SafetyChecked)?;
        self.track(
            ctx,
            EventName::InputReceived,
            json!({
                "length": input.chars().count(),
                "fingerprint": fingerprint(input),
                "resumed": resumed,
                "namesRedacted": processed.names_redacted,
            }),
        )
        .await;

        if !resumed && self.needs_clarifying_questions(input).await {
            // Never falls through to extraction, even with no questions.
            let questions = self.generate_questions(input).await;
            if questions.is_empty() {
                warn!(%session_id, "No clarifying questions generated");
            }
            ctx.run.advance(PipelineState::QuestionsNeeded)?;
            self.track(ctx, EventName::QuestionsAsked, json!({ "count": questions.len() }))
                .await;
            info!(%session_id, count = questions.len(), "Clarifying questions needed");
            return Ok(AnalysisResponse::questions(session_id, questions));
        }

        ctx.run.advance(PipelineState::Processing)?;

        let narrative = self.build_narrative_loop(input).await?;
        ctx.run.advance(PipelineState::NarrativeBuilt)?;
        self.track(ctx, EventName::LoopBuilt, stage_data(&narrative)).await;

        let map = self.build_spiess_map(input, &narrative.value).await?;
        ctx.run.advance(PipelineState::SpiessBuilt)?;
        let mut data = stage_data(&map);
        data["needs"] = json!(map.value.needs);
        data["protocol"] = json!(map.value.tool_action.protocol);
        self.track(ctx, EventName::SpiessBuilt, data).await;

        let summary = self
            .build_summary(input, &narrative.value, &map.value)
            .await?;
        ctx.run.advance(PipelineState::SummaryBuilt)?;
        let mut data = stage_data(&summary);
        data["words"] = json!(summary.value.content.split_whitespace().count());
        self.track(ctx, EventName::SummaryBuilt, data).await;

        let tags = tag_analysis(&narrative.value, &map.value);
        ctx.run.advance(PipelineState::Tagged)?;

        ctx.run.advance(PipelineState::Completed)?;
        info!(
            %session_id,
            tags = tags.len(),
            elapsed_ms = ctx.run.elapsed_ms(),
            "Analysis completed"
        );

        Ok(AnalysisResponse::completed(AnalysisResult {
            session_id,
            stage: Stage::Completed,
            narrative_loop: narrative.value,
            spiess_map: map.value,
            summary: summary.value,
            tags,
        }))
    }

    /// Ask whether the narrative needs clarifying questions.
    ///
    /// Only a literal `YES` (case-insensitive, surrounding whitespace ignored)
    /// counts. Any completion failure answers `false`.
    pub async fn needs_clarifying_questions(&self, input: &str) -> bool {
        let request = CompletionRequest::new(
            &self.settings.model,
            self.settings.decision_max_tokens,
            self.settings.decision_temperature,
        )
        .system(prompts::decision_system())
        .user(prompts::wrap_narrative(input));

        match self.completion.complete(request).await {
            Ok(output) => output.content.trim().eq_ignore_ascii_case("yes"),
            Err(e) => {
                warn!(error = %e, "Clarity check failed, assuming no questions needed");
                false
            }
        }
    }

    /// Generate up to `max_questions` clarifying questions; empty on total failure.
    pub async fn generate_questions(&self, input: &str) -> Vec<String> {
        let request = CompletionRequest::new(
            &self.settings.model,
            self.settings.questions_max_tokens,
            self.settings.extraction_temperature,
        )
        .system(prompts::questions_system(self.settings.max_questions))
        .user(prompts::wrap_narrative(input));

        let text = match self.completion.complete(request).await {
            Ok(output) => output.content,
            Err(e) => {
                warn!(error = %e, "Question generation failed");
                return Vec::new();
            }
        };

        match self.parse_json(prompts::QUESTIONS_INSTRUCTION, &text).await {
            Some(value) => questions_from_value(&value, self.settings.max_questions),
            None => Vec::new(),
        }
    }

    pub async fn build_narrative_loop(&self, input: &str) -> Result<Conformed<NarrativeLoop>> {
        let value = self
            .extract::<NarrativeLoop>(prompts::narrative_system(), prompts::wrap_narrative(input))
            .await?;
        Ok(conform(&value))
    }

    pub async fn build_spiess_map(
        &self,
        input: &str,
        narrative: &NarrativeLoop,
    ) -> Result<Conformed<SpiessMap>> {
        let value = self
            .extract::<SpiessMap>(prompts::spiess_system(), prompts::spiess_user(input, narrative))
            .await?;
        Ok(conform(&value))
    }

    /// Build the summary; content beyond the word cap is cut at a word boundary.
    pub async fn build_summary(
        &self,
        input: &str,
        narrative: &NarrativeLoop,
        map: &SpiessMap,
    ) -> Result<Conformed<Summary>> {
        let mut value = self
            .extract::<Summary>(
                prompts::summary_system(self.settings.summary_max_words),
                prompts::summary_user(input, narrative, map),
            )
            .await?;

        if let Some(Value::String(content)) = value.get_mut("content") {
            *content = truncate_words(content.trim(), self.settings.summary_max_words);
        }

        Ok(conform(&value))
    }

    /// completion -> parse -> repair-on-failure. `Value::Null` when nothing was recoverable.
    ///
    /// A failing completion call is an error; unusable text is not.
    async fn extract<S: StageSchema>(&self, system: String, user: String) -> Result<Value> {
        let request = CompletionRequest::new(
            &self.settings.model,
            self.settings.extraction_max_tokens,
            self.settings.extraction_temperature,
        )
        .system(system)
        .user(user);

        let output = self
            .completion
            .complete(request)
            .await
            .with_context(|| format!("Completion failed for stage '{}'", S::NAME))?;

        match self.parse_json(S::INSTRUCTION, &output.content).await {
            Some(value) => Ok(value),
            None => {
                warn!(stage = S::NAME, "No JSON recovered, using stage default");
                Ok(Value::Null)
            }
        }
    }

    async fn parse_json(&self, instruction: &str, text: &str) -> Option<Value> {
        parse_with_repair(
            self.completion.as_ref(),
            &self.settings.model,
            self.settings.repair_max_tokens,
            instruction,
            text,
        )
        .await
    }

    /// Terminal exit straight from START (crisis or invalid input)
    async fn safe_exit(&self, ctx: &mut RunContext<'_>, rejection: GateRejection) -> AnalysisResponse {
        let session_id = ctx.run.session_id;

        let (state, reason, outcome) = match rejection {
            GateRejection::CrisisDetected { message, resources } => (
                PipelineState::CrisisExit,
                ExitReason::Crisis,
                Outcome::CrisisDetected { message, resources },
            ),
            GateRejection::Validation { message } => (
                PipelineState::ValidationExit,
                ExitReason::Validation,
                Outcome::ValidationError { message },
            ),
        };

        if let Err(e) = ctx.run.advance(state) {
            error!(%session_id, error = %e, "Unexpected state on safe exit");
        }
        warn!(%session_id, ?reason, "Input rejected by safety gate");

        self.track(ctx, EventName::SafeExit, json!({ "reason": reason }))
            .await;

        AnalysisResponse::new(session_id, outcome)
    }

    async fn track(&self, ctx: &RunContext<'_>, name: EventName, data: Value) {
        self.analytics
            .track(
                ctx.run.session_id,
                name,
                data,
                ctx.user_id,
                ctx.request_context.cloned(),
            )
            .await;
    }
}

fn stage_data<S>(conformed: &Conformed<S>) -> Value {
    json!({
        "repaired": conformed.was_repaired(),
        "violations": conformed.violations.len(),
    })
}

/// Accept `["q1", ...]` or `{"questions": ["q1", ...]}`
fn questions_from_value(value: &Value, max: usize) -> Vec<String> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("questions") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .take(max)
        .map(str::to_string)
        .collect()
}
