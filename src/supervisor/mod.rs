//! Advisory per-stage scoring sidecar (C9).
//!
//! Never blocks pipeline progression — [`Supervisor::evaluate`] always
//! returns a verdict, it just may be `Fail`. Baseline rule-based checks
//! always run; an LLM call, if available, only contributes qualitative
//! narrative to `details` and is swallowed on failure.

use crate::llm::{ChatMessage, LlmClient};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Pass,
    Warning,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubScore {
    pub value: f64,
    pub pass: bool,
    pub issues: Vec<String>,
    pub details: String,
}

impl SubScore {
    fn clean(details: impl Into<String>) -> Self {
        SubScore { value: 1.0, pass: true, issues: Vec::new(), details: details.into() }
    }

    fn failing(issues: Vec<String>, details: impl Into<String>) -> Self {
        let value = if issues.is_empty() { 1.0 } else { 0.0 };
        SubScore { value, pass: issues.is_empty(), issues, details: details.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationScore {
    pub score: SubScore,
    pub required_fields: Vec<String>,
    pub missing_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvaluation {
    pub stage: String,
    pub accuracy: SubScore,
    pub reasonableness: SubScore,
    pub coordination: CoordinationScore,
    pub quality: SubScore,
    pub overall: OverallStatus,
}

/// Required output fields the *next* stage expects from `stage`, used for
/// the coordination check. Unknown stages have no declared requirement.
fn required_fields_for(stage: &str) -> &'static [&'static str] {
    match stage {
        "file_reading" => &["sheets"],
        "file_understanding" => &["sheet_structure", "key_columns", "user_intent"],
        "data_type_analysis" => &["column_types", "column_stats"],
        "statistics_planning" => &["plan"],
        "statistics_calculation" => &["calculations"],
        "correlation_analysis" => &["strong_correlations"],
        "semantic_analysis" => &["column_semantics"],
        "result_interpretation" => &["report_markdown"],
        "echarts_generation" => &["charts"],
        _ => &[],
    }
}

/// Rule-based checks that always run regardless of the LLM's availability.
/// Returns the issues found (empty when the stage passes its baseline).
fn baseline_checks(stage: &str, result: &Value) -> Vec<String> {
    let mut issues = Vec::new();
    match stage {
        "statistics_calculation" => {
            if !non_empty_object(result, "calculations") {
                issues.push("'calculations' map is missing or empty".to_string());
            }
        }
        "echarts_generation" => {
            if !non_empty_array(result, "charts") {
                issues.push("'charts' list is missing or empty".to_string());
            }
        }
        _ => {}
    }
    issues
}

fn non_empty_object(result: &Value, field: &str) -> bool {
    result.get(field).and_then(Value::as_object).map(|o| !o.is_empty()).unwrap_or(false)
}

fn non_empty_array(result: &Value, field: &str) -> bool {
    result.get(field).and_then(Value::as_array).map(|a| !a.is_empty()).unwrap_or(false)
}

fn coordination_check(stage: &str, result: &Value) -> CoordinationScore {
    let required: Vec<String> = required_fields_for(stage).iter().map(|s| s.to_string()).collect();
    let missing: Vec<String> = required
        .iter()
        .filter(|field| result.get(field.as_str()).map(Value::is_null).unwrap_or(true))
        .cloned()
        .collect();
    let score = if missing.is_empty() {
        SubScore::clean(format!("all {} required field(s) present", required.len()))
    } else {
        SubScore::failing(
            missing.iter().map(|f| format!("missing required field '{f}'")).collect(),
            "downstream stage is missing inputs it expects",
        )
    };
    CoordinationScore { score, required_fields: required, missing_fields: missing }
}

pub struct Supervisor {
    llm: Option<Arc<dyn LlmClient>>,
}

impl Supervisor {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Supervisor { llm }
    }

    pub async fn evaluate(
        &self,
        stage: &str,
        result: &Value,
        preceding: &[StageEvaluation],
        task_context: &str,
    ) -> StageEvaluation {
        let baseline_issues = baseline_checks(stage, result);
        let accuracy = SubScore::failing(baseline_issues.clone(), "baseline rule checks");
        let reasonableness = self.reasonableness_check(stage, result, preceding, task_context).await;
        let coordination = coordination_check(stage, result);
        let quality = SubScore::failing(Vec::new(), "no structural defects found");

        let overall = if !accuracy.pass || !coordination.score.pass {
            OverallStatus::Fail
        } else if !reasonableness.pass || !quality.pass {
            OverallStatus::Warning
        } else {
            OverallStatus::Pass
        };

        StageEvaluation {
            stage: stage.to_string(),
            accuracy,
            reasonableness,
            coordination,
            quality,
            overall,
        }
    }

    /// Best-effort qualitative pass; any LLM failure degrades to a clean
    /// pass with a note rather than failing the stage over an unavailable
    /// sidecar dependency.
    async fn reasonableness_check(
        &self,
        stage: &str,
        result: &Value,
        preceding: &[StageEvaluation],
        task_context: &str,
    ) -> SubScore {
        let Some(llm) = &self.llm else {
            return SubScore::clean("no supervisor LLM configured, baseline-only evaluation");
        };
        let prior_summary = preceding.iter().map(|e| e.stage.clone()).collect::<Vec<_>>().join(", ");
        let prompt = format!(
            "Task: {task_context}\nStage: {stage}\nPreceding stages: {prior_summary}\nResult: {result}\n\
             Is this stage's result reasonable given the task and prior stages? Reply with one short sentence."
        );
        match llm.chat(&[ChatMessage::user(prompt)]).await {
            Ok(reply) => SubScore::clean(reply),
            Err(err) => SubScore::clean(format!("supervisor LLM unavailable: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use serde_json::json;

    #[tokio::test]
    async fn statistics_calculation_fails_baseline_on_empty_calculations() {
        let supervisor = Supervisor::new(None);
        let result = json!({ "calculations": {} });
        let evaluation = supervisor.evaluate("statistics_calculation", &result, &[], "analyze sales").await;
        assert_eq!(evaluation.overall, OverallStatus::Fail);
        assert!(!evaluation.accuracy.issues.is_empty());
    }

    #[tokio::test]
    async fn statistics_calculation_passes_with_data() {
        let supervisor = Supervisor::new(None);
        let result = json!({ "calculations": { "sheet1": { "mean": 1.0 } } });
        let evaluation = supervisor.evaluate("statistics_calculation", &result, &[], "analyze sales").await;
        assert_eq!(evaluation.overall, OverallStatus::Pass);
    }

    #[tokio::test]
    async fn echarts_generation_fails_baseline_on_missing_charts() {
        let supervisor = Supervisor::new(None);
        let result = json!({});
        let evaluation = supervisor.evaluate("echarts_generation", &result, &[], "").await;
        assert_eq!(evaluation.overall, OverallStatus::Fail);
        assert!(!evaluation.coordination.missing_fields.is_empty());
    }

    #[tokio::test]
    async fn unknown_stage_has_no_coordination_requirements() {
        let supervisor = Supervisor::new(None);
        let result = json!({ "anything": 1 });
        let evaluation = supervisor.evaluate("some_custom_stage", &result, &[], "").await;
        assert!(evaluation.coordination.required_fields.is_empty());
        assert_eq!(evaluation.overall, OverallStatus::Pass);
    }

    #[tokio::test]
    async fn reasonableness_uses_llm_when_configured() {
        let supervisor = Supervisor::new(Some(Arc::new(MockLlmClient::new(4))));
        let result = json!({ "calculations": { "a": 1 } });
        let evaluation = supervisor.evaluate("statistics_calculation", &result, &[], "ctx").await;
        assert!(!evaluation.reasonableness.details.is_empty());
    }

    #[test]
    fn failing_subscore_is_a_noop_with_no_issues() {
        let score = SubScore::failing(Vec::new(), "ok");
        assert!(score.pass);
        assert_eq!(score.value, 1.0);
    }
}
