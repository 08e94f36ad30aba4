//! Orchestration driver: runs one agent through the
//! assemble-invoke-validate-store-record cycle.
//!
//! The model behind an invocation and the output validator are trait
//! seams so the driver can be exercised without a live model. Failures
//! between storing artifacts and recording completion leave a `started`
//! ledger row behind; re-running the agent is safe because artifact
//! stores overwrite in place (at-least-once semantics).

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::agents::{load_prompt, Roster};
use crate::context::ContextStore;
use crate::models::{ArtifactDraft, ArtifactType, ContextPackage, ExecutionRecord, ExecutionStatus};
use crate::{Error, Result};

/// Default context budget when the agent spec carries no override.
const DEFAULT_MAX_TOKENS: i64 = 100_000;

/// One model reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReply {
    pub text: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// A model that can be invoked with a system and user message.
///
/// Implementations signal retryable failures with `Error::Busy`; any
/// other error is treated as fatal and not retried.
pub trait ModelCapability {
    fn invoke(
        &self,
        system: &str,
        user: &str,
        max_tokens: Option<i64>,
        temperature: Option<f64>,
    ) -> Result<ModelReply>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Pass,
    Warn,
    Fail,
}

/// One machine-readable validation finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Where in the output the issue sits, e.g. a section or field path.
    pub path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationIssue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn pass() -> Self {
        Self {
            status: ValidationStatus::Pass,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Checks an agent's raw output before it is stored.
pub trait OutputValidator {
    fn validate(&self, agent_id: &str, content: &str) -> ValidationReport;
}

/// Default validator: rejects empty output, passes everything else.
pub struct LenientValidator;

impl OutputValidator for LenientValidator {
    fn validate(&self, _agent_id: &str, content: &str) -> ValidationReport {
        if content.trim().is_empty() {
            ValidationReport {
                status: ValidationStatus::Fail,
                errors: vec![ValidationIssue {
                    path: "output".to_string(),
                    message: "Agent produced empty output".to_string(),
                    suggestion: Some("Re-run the agent with a more specific task".to_string()),
                }],
                warnings: Vec::new(),
            }
        } else {
            ValidationReport::pass()
        }
    }
}

/// Bounded retry: how many attempts and the initial back-off delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

/// Invoke a model, retrying transient failures with doubling delays.
///
/// Non-transient errors propagate immediately; exhausting the attempt
/// budget surfaces as `Error::Capability` with no partial output.
pub fn invoke_with_retry(
    model: &dyn ModelCapability,
    policy: RetryPolicy,
    system: &str,
    user: &str,
    max_tokens: Option<i64>,
    temperature: Option<f64>,
) -> Result<ModelReply> {
    let mut delay = policy.initial_delay;
    let mut last_error = String::new();
    for attempt in 1..=policy.max_attempts {
        match model.invoke(system, user, max_tokens, temperature) {
            Ok(reply) => return Ok(reply),
            Err(e) if e.is_transient() => {
                tracing::warn!(attempt, error = %e, "transient model failure");
                last_error = e.to_string();
                if attempt < policy.max_attempts {
                    std::thread::sleep(delay);
                    delay *= 2;
                }
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::Capability(format!(
        "Model invocation failed after {} attempts: {}",
        policy.max_attempts, last_error
    )))
}

/// Result of one agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub execution_id: String,
    pub artifact_ids: Vec<String>,
    pub reply: ModelReply,
    pub validation: ValidationReport,
}

/// Drives agent runs against the context store.
pub struct Runner {
    roster: Roster,
    prompts_dir: PathBuf,
    model: Box<dyn ModelCapability>,
    validator: Box<dyn OutputValidator>,
    retry: RetryPolicy,
}

impl Runner {
    pub fn new(
        roster: Roster,
        prompts_dir: PathBuf,
        model: Box<dyn ModelCapability>,
        validator: Box<dyn OutputValidator>,
    ) -> Self {
        Self {
            roster,
            prompts_dir,
            model,
            validator,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run one agent against a task.
    pub fn run_agent(
        &self,
        store: &mut ContextStore,
        agent_id: &str,
        task_text: &str,
        task_id: Option<&str>,
    ) -> Result<RunOutcome> {
        let spec = self.roster.get(agent_id)?.clone();
        let execution_id = format!("exec_{}_{}", agent_id, Utc::now().format("%Y%m%d_%H%M%S"));
        tracing::info!(%execution_id, agent_id, task_id, "agent run started");

        let max_tokens = spec.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let package = store.assemble_context(agent_id, task_id, max_tokens)?;
        for warning in &package.metadata.warnings {
            tracing::warn!(%execution_id, %warning, "context assembly warning");
        }

        let sprint_id = package.current_sprint.clone();
        let started_at = Utc::now();
        let mut record = ExecutionRecord {
            id: execution_id.clone(),
            agent_id: agent_id.to_string(),
            task_id: task_id.map(str::to_string),
            sprint_id,
            status: ExecutionStatus::Started,
            context_version: package.context_version,
            input_artifacts: package.artifacts.keys().cloned().collect(),
            input_token_count: package.metadata.tokens_used,
            output_artifacts: Vec::new(),
            output_token_count: 0,
            started_at,
            completed_at: None,
            duration_seconds: None,
            error_message: None,
        };
        store.record_execution(&record)?;

        let system = load_prompt(&self.prompts_dir, &spec)?;
        let user = format_user_message(&package, task_text)?;

        let reply = match invoke_with_retry(
            self.model.as_ref(),
            self.retry,
            &system,
            &user,
            spec.max_tokens,
            spec.temperature,
        ) {
            Ok(reply) => reply,
            Err(e) => {
                record.status = ExecutionStatus::Failed;
                record.completed_at = Some(Utc::now());
                record.error_message = Some(e.to_string());
                store.record_execution(&record)?;
                tracing::error!(%execution_id, error = %e, "agent run failed");
                return Err(e);
            }
        };

        let validation = self.validator.validate(agent_id, &reply.text);
        if validation.status == ValidationStatus::Fail {
            let message = validation
                .errors
                .first()
                .map(|i| i.message.clone())
                .unwrap_or_else(|| "Output validation failed".to_string());
            record.status = ExecutionStatus::Failed;
            record.completed_at = Some(Utc::now());
            record.error_message = Some(message.clone());
            store.record_execution(&record)?;
            tracing::error!(%execution_id, %message, "agent output rejected");
            return Err(Error::Capability(message));
        }
        for issue in &validation.warnings {
            tracing::warn!(%execution_id, message = %issue.message, "validation warning");
        }

        let draft_name = match task_id {
            Some(id) => format!("{}.md", id),
            None => "output.md".to_string(),
        };
        let receipt = store.store_artifacts(
            agent_id,
            &[ArtifactDraft {
                name: draft_name,
                artifact_type: ArtifactType::Prose,
                content: reply.text.clone(),
                description: Some(format!("Output of {}", execution_id)),
            }],
        )?;

        record.status = ExecutionStatus::Completed;
        record.completed_at = Some(Utc::now());
        record.output_artifacts = receipt.artifact_ids.clone();
        record.output_token_count = reply.output_tokens;
        record.input_token_count = reply.input_tokens;
        store.record_execution(&record)?;
        tracing::info!(
            %execution_id,
            artifacts = receipt.artifact_ids.len(),
            "agent run completed"
        );

        Ok(RunOutcome {
            execution_id,
            artifact_ids: receipt.artifact_ids,
            reply,
            validation,
        })
    }
}

/// User message layout: the context package as JSON, then the task.
fn format_user_message(package: &ContextPackage, task_text: &str) -> Result<String> {
    let context_json = serde_json::to_string_pretty(package)?;
    Ok(format!(
        "## Context\n\n{}\n\n## Task\n\n{}",
        context_json, task_text
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;
    use std::sync::Mutex;

    /// Scripted model: pops one behavior per invocation.
    struct ScriptedModel {
        script: Mutex<Vec<Result<ModelReply>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedModel {
        fn new(script: Vec<Result<ModelReply>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(0),
            }
        }

        fn reply(text: &str) -> ModelReply {
            ModelReply {
                text: text.to_string(),
                input_tokens: 10,
                output_tokens: 5,
                model: "scripted".to_string(),
                stop_reason: Some("end_turn".to_string()),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl ModelCapability for ScriptedModel {
        fn invoke(
            &self,
            _system: &str,
            _user: &str,
            _max_tokens: Option<i64>,
            _temperature: Option<f64>,
        ) -> Result<ModelReply> {
            *self.calls.lock().unwrap() += 1;
            self.script.lock().unwrap().remove(0)
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_retry_recovers_from_transient_failures() {
        let model = ScriptedModel::new(vec![
            Err(Error::Busy("locked".to_string())),
            Err(Error::Busy("locked".to_string())),
            Ok(ScriptedModel::reply("ok")),
        ]);
        let reply = invoke_with_retry(&model, fast_retry(), "s", "u", None, None).unwrap();
        assert_eq!(reply.text, "ok");
        assert_eq!(model.calls(), 3);
    }

    #[test]
    fn test_retry_exhaustion_is_capability_error() {
        let model = ScriptedModel::new(vec![
            Err(Error::Busy("locked".to_string())),
            Err(Error::Busy("locked".to_string())),
            Err(Error::Busy("locked".to_string())),
        ]);
        let err = invoke_with_retry(&model, fast_retry(), "s", "u", None, None).unwrap_err();
        assert!(matches!(err, Error::Capability(_)));
        assert_eq!(model.calls(), 3);
    }

    #[test]
    fn test_fatal_error_is_not_retried() {
        let model = ScriptedModel::new(vec![Err(Error::Capability("bad key".to_string()))]);
        let err = invoke_with_retry(&model, fast_retry(), "s", "u", None, None).unwrap_err();
        assert!(matches!(err, Error::Capability(_)));
        assert_eq!(model.calls(), 1);
    }

    fn runner_fixture(model: ScriptedModel) -> (tempfile::TempDir, Runner) {
        let prompts = tempfile::tempdir().unwrap();
        std::fs::write(prompts.path().join("dev.md"), "You are a developer.").unwrap();
        let roster = Roster::parse(
            r#"
            [[agents]]
            id = "dev"
            name = "Developer"
            role = "developer"
            "#,
        )
        .unwrap();
        let runner = Runner::new(
            roster,
            prompts.path().to_path_buf(),
            Box::new(model),
            Box::new(LenientValidator),
        )
        .with_retry_policy(fast_retry());
        (prompts, runner)
    }

    #[test]
    fn test_run_agent_happy_path() {
        let env = TestEnv::new();
        let mut store = env.context();
        let (_prompts, runner) =
            runner_fixture(ScriptedModel::new(vec![Ok(ScriptedModel::reply("# Done"))]));

        let outcome = runner
            .run_agent(&mut store, "dev", "Implement the parser", Some("S1-001"))
            .unwrap();
        assert_eq!(outcome.artifact_ids, vec!["dev/S1-001.md/1"]);
        assert_eq!(outcome.validation.status, ValidationStatus::Pass);

        let record = store.get_execution(&outcome.execution_id).unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.output_artifacts, vec!["dev/S1-001.md/1"]);
        assert!(record.duration_seconds.is_some());

        let artifact = store.get_artifact("dev", "dev/S1-001.md/1").unwrap();
        assert_eq!(artifact.content, "# Done");
    }

    #[test]
    fn test_run_agent_records_failure_on_exhausted_retries() {
        let env = TestEnv::new();
        let mut store = env.context();
        let (_prompts, runner) = runner_fixture(ScriptedModel::new(vec![
            Err(Error::Busy("locked".to_string())),
            Err(Error::Busy("locked".to_string())),
            Err(Error::Busy("locked".to_string())),
        ]));

        let err = runner
            .run_agent(&mut store, "dev", "Implement the parser", None)
            .unwrap_err();
        assert!(matches!(err, Error::Capability(_)));

        let history = store
            .query_history(Some("dev"), Some(ExecutionStatus::Failed), None, 10)
            .unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].error_message.is_some());
        assert!(history[0].output_artifacts.is_empty());
    }

    #[test]
    fn test_run_agent_rejects_failed_validation() {
        let env = TestEnv::new();
        let mut store = env.context();
        let (_prompts, runner) =
            runner_fixture(ScriptedModel::new(vec![Ok(ScriptedModel::reply("   "))]));

        let err = runner
            .run_agent(&mut store, "dev", "Implement the parser", Some("S1-001"))
            .unwrap_err();
        assert!(matches!(err, Error::Capability(_)));

        // Nothing stored; the ledger row is marked failed.
        assert!(store.get_artifact("dev", "dev/S1-001.md/1").is_err());
        let history = store
            .query_history(Some("dev"), Some(ExecutionStatus::Failed), None, 10)
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_run_agent_unknown_agent() {
        let env = TestEnv::new();
        let mut store = env.context();
        let (_prompts, runner) = runner_fixture(ScriptedModel::new(vec![]));
        let err = runner
            .run_agent(&mut store, "ghost", "task", None)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
