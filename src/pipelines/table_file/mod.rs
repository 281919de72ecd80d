//! Table-file analysis pipeline (C8).
//!
//! Nine sequential stages (0-8), each scored by the supervisor sidecar
//! between steps. A missing prerequisite degrades the next stage to
//! its default rather than aborting the run; only an unreadable source file
//! is fatal.

pub mod reading;
pub mod stats;

use crate::error::{AppError, AppResult};
use crate::llm::{ChatMessage, LlmClient};
use crate::streaming::{Chunk, Delta, DeltaType};
use crate::supervisor::{StageEvaluation, Supervisor};
use crate::util::unix_timestamp;
use reading::SheetFrame;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stats::{
    as_f64_column, classify_column, datetime_range, frequency_stats, numeric_stats, pearson_correlation,
    skewness_kurtosis, text_stats, ColumnType,
};
use std::path::PathBuf;

pub enum FileSource {
    Csv(PathBuf),
    Workbook(PathBuf),
}

const TECHNIQUE_MENU: [&str; 8] =
    ["descriptive", "distribution", "correlation", "frequency", "grouped", "trend", "time_series", "joint"];
const STRONG_CORRELATION_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetIntent {
    pub sheet_name: String,
    pub key_columns: Vec<String>,
    pub intent: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileUnderstanding {
    pub sheets: Vec<SheetIntent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnAnalysis {
    pub name: String,
    pub column_type: ColumnType,
    pub stats: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetTypeAnalysis {
    pub sheet_name: String,
    pub columns: Vec<ColumnAnalysis>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetPlan {
    pub sheet_name: String,
    pub techniques: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EChart {
    pub title: String,
    pub chart_type: String,
    pub option: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationFinding {
    pub sheet_name: String,
    pub column_a: String,
    pub column_b: String,
    pub r: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticAnalysis {
    pub column_semantics: Value,
    pub relationships: Vec<String>,
    pub business_patterns: Vec<String>,
    pub recommended_analyses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableFileOutcome {
    pub report_markdown: String,
    pub charts: Vec<EChart>,
    pub stage_evaluations: Vec<StageEvaluation>,
}

pub struct TableFilePipeline {
    llm: std::sync::Arc<dyn LlmClient>,
    supervisor: Supervisor,
    max_charts: usize,
    indicator_cap_bytes: usize,
}

type ChunkSink<'a> = dyn FnMut(Chunk) + Send + 'a;

impl TableFilePipeline {
    pub fn new(
        llm: std::sync::Arc<dyn LlmClient>,
        supervisor: Supervisor,
        max_charts: usize,
        indicator_cap_bytes: usize,
    ) -> Self {
        TableFilePipeline { llm, supervisor, max_charts, indicator_cap_bytes }
    }

    fn emit(&self, sink: &mut ChunkSink<'_>, step: &str, status: &str, payload: Value) {
        let content = json!({ "step": step, "status": status, "payload": payload }).to_string();
        sink(Chunk::new(
            step,
            "ragweave-table-file",
            unix_timestamp(),
            Delta { content, delta_type: DeltaType::ToolDirectAnswer },
        ));
    }

    async fn score(
        &self,
        sink: &mut ChunkSink<'_>,
        step: &str,
        stage: &str,
        result: &Value,
        preceding: &mut Vec<StageEvaluation>,
        task_context: &str,
    ) {
        let evaluation = self.supervisor.evaluate(stage, result, preceding, task_context).await;
        self.emit(sink, step, "completed", result.clone());
        preceding.push(evaluation);
    }

    pub async fn run(
        &self,
        source: FileSource,
        user_query: Option<&str>,
        sink: &mut ChunkSink<'_>,
    ) -> AppResult<TableFileOutcome> {
        tracing::info!(query = user_query.unwrap_or(""), "table_file_pipeline_run_started");
        let result = self.run_inner(source, user_query, sink).await;
        match &result {
            Ok(outcome) => tracing::info!(charts = outcome.charts.len(), "table_file_pipeline_run_completed"),
            Err(err) => tracing::warn!(error = %err, "table_file_pipeline_run_failed"),
        }
        result
    }

    async fn run_inner(
        &self,
        source: FileSource,
        user_query: Option<&str>,
        sink: &mut ChunkSink<'_>,
    ) -> AppResult<TableFileOutcome> {
        let task_context = user_query.unwrap_or("general exploratory analysis");
        let mut evaluations: Vec<StageEvaluation> = Vec::new();

        // Stage 0: file reading.
        self.emit(sink, "step_0_file_reading", "start", Value::Null);
        let sheets = self.load_sheets(source)?;
        if sheets.is_empty() {
            self.emit(sink, "step_0_file_reading", "failed", Value::Null);
            return Err(AppError::pipeline_fatal("source file contains no readable sheets"));
        }
        let sheet_names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
        self.score(
            sink,
            "step_0_file_reading",
            "file_reading",
            &json!({ "sheets": sheet_names }),
            &mut evaluations,
            task_context,
        )
        .await;

        // Stage 1: file understanding.
        self.emit(sink, "step_1_file_understanding", "start", Value::Null);
        let understanding = self.understand_file(&sheets, task_context).await;
        let result = json!({
            "sheet_structure": understanding.sheets.iter().map(|s| &s.sheet_name).collect::<Vec<_>>(),
            "key_columns": understanding.sheets.iter().map(|s| &s.key_columns).collect::<Vec<_>>(),
            "user_intent": understanding.sheets.iter().map(|s| &s.intent).collect::<Vec<_>>(),
        });
        self.score(sink, "step_1_file_understanding", "file_understanding", &result, &mut evaluations, task_context)
            .await;

        // Stage 2: data-type analysis.
        self.emit(sink, "step_2_data_type_analysis", "start", Value::Null);
        let type_analysis = self.analyze_types(&sheets);
        let result = json!({
            "column_types": type_analysis.iter().map(|s| (s.sheet_name.clone(), s.columns.iter().map(|c| (c.name.clone(), c.column_type)).collect::<Vec<_>>())).collect::<Vec<_>>(),
            "column_stats": type_analysis.iter().map(|s| (s.sheet_name.clone(), s.columns.iter().map(|c| c.stats.clone()).collect::<Vec<_>>())).collect::<Vec<_>>(),
        });
        self.score(sink, "step_2_data_type_analysis", "data_type_analysis", &result, &mut evaluations, task_context)
            .await;

        // Stage 3: statistics planning.
        self.emit(sink, "step_3_statistics_planning", "start", Value::Null);
        let plans = self.plan_statistics(&sheets, task_context).await;
        let result = json!({ "plan": plans });
        self.score(sink, "step_3_statistics_planning", "statistics_planning", &result, &mut evaluations, task_context)
            .await;

        // Stage 4: statistics calculation.
        self.emit(sink, "step_4_statistics_calculation", "start", Value::Null);
        let (calculations, mut charts) = self.calculate_statistics(&sheets, &type_analysis, &plans);
        let result = json!({ "calculations": calculations });
        self.score(
            sink,
            "step_4_statistics_calculation",
            "statistics_calculation",
            &result,
            &mut evaluations,
            task_context,
        )
        .await;

        // Stage 5: correlation analysis.
        self.emit(sink, "step_5_correlation_analysis", "start", Value::Null);
        let (strong_correlations, correlation_charts) = self.aggregate_correlations(&sheets, &type_analysis);
        charts.extend(correlation_charts);
        let result = json!({ "strong_correlations": strong_correlations });
        self.score(
            sink,
            "step_5_correlation_analysis",
            "correlation_analysis",
            &result,
            &mut evaluations,
            task_context,
        )
        .await;

        // Stage 6: semantic analysis.
        self.emit(sink, "step_6_semantic_analysis", "start", Value::Null);
        let semantics = self.semantic_analysis(&type_analysis, task_context).await;
        let result = json!({ "column_semantics": semantics.column_semantics.clone() });
        self.score(sink, "step_6_semantic_analysis", "semantic_analysis", &result, &mut evaluations, task_context)
            .await;

        // Stage 7: result interpretation.
        self.emit(sink, "step_7_result_interpretation", "start", Value::Null);
        let report_markdown = self.interpret_results(&calculations, &strong_correlations, &semantics, task_context).await;
        let result = json!({ "report_markdown": report_markdown });
        self.score(
            sink,
            "step_7_result_interpretation",
            "result_interpretation",
            &result,
            &mut evaluations,
            task_context,
        )
        .await;

        // Stage 8: chart generation.
        self.emit(sink, "step_8_chart_generation", "start", Value::Null);
        let final_charts = if indicators_all_empty(&calculations) {
            Vec::new()
        } else {
            charts.extend(default_charts());
            dedupe_and_cap_charts(charts, self.max_charts)
        };
        if final_charts.is_empty() {
            self.emit(sink, "step_8_chart_generation", "no_valid_data", Value::Null);
        } else {
            for chart in &final_charts {
                let content = format!("option={}", chart.option);
                sink(Chunk::new(
                    "step_8_chart_generation",
                    "ragweave-table-file",
                    unix_timestamp(),
                    Delta { content, delta_type: DeltaType::Echarts },
                ));
            }
        }
        let result = json!({ "charts": final_charts });
        self.score(sink, "step_8_chart_generation", "echarts_generation", &result, &mut evaluations, task_context)
            .await;

        Ok(TableFileOutcome { report_markdown, charts: final_charts, stage_evaluations: evaluations })
    }

    fn load_sheets(&self, source: FileSource) -> AppResult<Vec<SheetFrame>> {
        match source {
            FileSource::Csv(path) => {
                reading::read_csv(&path).map(|f| vec![f]).map_err(AppError::pipeline_fatal)
            }
            FileSource::Workbook(path) => reading::read_workbook(&path).map_err(AppError::pipeline_fatal),
        }
    }

    /// Sends `prompt` and parses the reply as JSON, retrying once with an
    /// explicit JSON-only instruction before falling back to `default`. The
    /// LLM call itself is best-effort here: a transport failure also falls
    /// through to `default` rather than failing the whole run.
    async fn chat_json<T, F>(&self, prompt: String, default: F) -> T
    where
        T: serde::de::DeserializeOwned,
        F: Fn() -> T,
    {
        let Ok(reply) = self.llm.chat(&[ChatMessage::user(prompt.clone())]).await else {
            return default();
        };
        if let Ok(parsed) = serde_json::from_str(&reply) {
            return parsed;
        }
        let retry_prompt = format!("{prompt}\n\nYour previous reply was not valid JSON. Reply with valid JSON only, no prose.");
        match self.llm.chat(&[ChatMessage::user(retry_prompt)]).await {
            Ok(reply) => serde_json::from_str(&reply).unwrap_or_else(|_| default()),
            Err(_) => default(),
        }
    }

    async fn understand_file(&self, sheets: &[SheetFrame], task_context: &str) -> FileUnderstanding {
        let summary: Vec<String> = sheets.iter().map(|s| format!("{}: {:?}", s.name, s.columns)).collect();
        let prompt = format!(
            "Task: {task_context}\nSheets:\n{}\nFor each sheet reply with JSON {{sheets: [{{sheet_name, \
             key_columns, intent}}]}}.",
            summary.join("\n")
        );
        self.chat_json(prompt, || default_understanding(sheets)).await
    }

    fn analyze_types(&self, sheets: &[SheetFrame]) -> Vec<SheetTypeAnalysis> {
        sheets
            .iter()
            .map(|sheet| {
                let columns = sheet
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, name)| {
                        let values: Vec<Value> = sheet.rows.iter().map(|r| r.get(i).cloned().unwrap_or(Value::Null)).collect();
                        let column_type = classify_column(&values);
                        let stats = column_type_stats(column_type, &values);
                        ColumnAnalysis { name: name.clone(), column_type, stats }
                    })
                    .collect();
                SheetTypeAnalysis { sheet_name: sheet.name.clone(), columns }
            })
            .collect()
    }

    async fn plan_statistics(&self, sheets: &[SheetFrame], task_context: &str) -> Vec<SheetPlan> {
        let sheet_names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
        let prompt = format!(
            "Task: {task_context}\nSheets: {sheet_names:?}\nMenu: {TECHNIQUE_MENU:?}\n\
             Reply with JSON array of {{sheet_name, techniques}}."
        );
        self.chat_json(prompt, || default_plans(sheets)).await
    }

    fn calculate_statistics(
        &self,
        sheets: &[SheetFrame],
        type_analysis: &[SheetTypeAnalysis],
        plans: &[SheetPlan],
    ) -> (Value, Vec<EChart>) {
        let mut calculations = serde_json::Map::new();
        let mut charts = Vec::new();

        for sheet in sheets {
            let Some(analysis) = type_analysis.iter().find(|a| a.sheet_name == sheet.name) else { continue };
            let techniques = plans
                .iter()
                .find(|p| p.sheet_name == sheet.name)
                .map(|p| p.techniques.clone())
                .unwrap_or_else(|| vec!["descriptive".to_string()]);

            let mut indicators = serde_json::Map::new();
            let numeric_columns: Vec<&ColumnAnalysis> = analysis
                .columns
                .iter()
                .filter(|c| matches!(c.column_type, ColumnType::Integer | ColumnType::Float))
                .collect();

            if techniques.iter().any(|t| t == "descriptive") {
                indicators.insert("descriptive".to_string(), json!(numeric_columns.iter().map(|c| (c.name.clone(), c.stats.clone())).collect::<Vec<_>>()));
                if let Some(first) = numeric_columns.first() {
                    charts.push(EChart {
                        title: format!("{} descriptive", sheet.name),
                        chart_type: "bar".to_string(),
                        option: json!({ "xAxis": { "type": "category", "data": [first.name.clone()] }, "series": [{ "type": "bar", "data": [first.stats.get("mean")] }] }),
                    });
                }
            }

            if techniques.iter().any(|t| t == "distribution") {
                let distribution: Vec<Value> = numeric_columns
                    .iter()
                    .map(|c| {
                        let values = column_values(sheet, &c.name, &analysis.columns);
                        let (skew, kurt) = skewness_kurtosis(&as_f64_column(&values));
                        json!({ "column": c.name, "skewness": skew, "kurtosis": kurt, "type": c.column_type })
                    })
                    .collect();
                indicators.insert("distribution".to_string(), json!(distribution));
            }

            if techniques.iter().any(|t| t == "correlation") {
                let pairs = strong_pairs(sheet, &numeric_columns, &analysis.columns);
                indicators.insert("correlation".to_string(), json!(pairs));
                if !pairs.is_empty() {
                    charts.push(EChart {
                        title: format!("{} correlation heatmap", sheet.name),
                        chart_type: "heatmap".to_string(),
                        option: json!({ "series": [{ "type": "heatmap", "data": pairs }] }),
                    });
                }
            }

            if techniques.iter().any(|t| t == "frequency") {
                let categorical: Vec<&ColumnAnalysis> = analysis
                    .columns
                    .iter()
                    .filter(|c| matches!(c.column_type, ColumnType::CategoricalText | ColumnType::CategoricalNumeric))
                    .collect();
                let freq: Vec<Value> = categorical
                    .iter()
                    .map(|c| {
                        let values = column_values(sheet, &c.name, &analysis.columns);
                        let f = frequency_stats(&values);
                        json!({ "column": c.name, "unique_count": f.unique_count, "total_count": f.total_count, "top_10": f.top_10 })
                    })
                    .collect();
                indicators.insert("frequency".to_string(), json!(freq));
                if let Some(first) = categorical.first() {
                    charts.push(EChart {
                        title: format!("{} frequency", sheet.name),
                        chart_type: "pie".to_string(),
                        option: json!({ "series": [{ "type": "pie", "name": first.name }] }),
                    });
                }
            }

            calculations.insert(sheet.name.clone(), Value::Object(indicators));
        }

        let mut value = Value::Object(calculations);
        enforce_indicator_cap(&mut value, self.indicator_cap_bytes);
        (value, charts)
    }

    fn aggregate_correlations(
        &self,
        sheets: &[SheetFrame],
        type_analysis: &[SheetTypeAnalysis],
    ) -> (Vec<CorrelationFinding>, Vec<EChart>) {
        let mut findings = Vec::new();
        for sheet in sheets {
            let Some(analysis) = type_analysis.iter().find(|a| a.sheet_name == sheet.name) else { continue };
            let numeric_columns: Vec<&ColumnAnalysis> = analysis
                .columns
                .iter()
                .filter(|c| matches!(c.column_type, ColumnType::Integer | ColumnType::Float))
                .collect();
            for i in 0..numeric_columns.len() {
                for j in (i + 1)..numeric_columns.len() {
                    let a = column_values(sheet, &numeric_columns[i].name, &analysis.columns);
                    let b = column_values(sheet, &numeric_columns[j].name, &analysis.columns);
                    let r = pearson_correlation(&as_f64_column(&a), &as_f64_column(&b));
                    if r.abs() > STRONG_CORRELATION_THRESHOLD {
                        findings.push(CorrelationFinding {
                            sheet_name: sheet.name.clone(),
                            column_a: numeric_columns[i].name.clone(),
                            column_b: numeric_columns[j].name.clone(),
                            r,
                        });
                    }
                }
            }
        }
        let mut charts = Vec::new();
        if !findings.is_empty() {
            charts.push(EChart {
                title: "combined correlation heatmap".to_string(),
                chart_type: "heatmap".to_string(),
                option: json!({ "series": [{ "type": "heatmap", "data": findings }] }),
            });
            for finding in findings.iter().take(3) {
                charts.push(EChart {
                    title: format!("{}.{} vs {}", finding.sheet_name, finding.column_a, finding.column_b),
                    chart_type: "scatter".to_string(),
                    option: json!({ "series": [{ "type": "scatter" }] }),
                });
            }
        }
        (findings, charts)
    }

    async fn semantic_analysis(&self, type_analysis: &[SheetTypeAnalysis], task_context: &str) -> SemanticAnalysis {
        let summary: Vec<String> = type_analysis
            .iter()
            .map(|s| format!("{}: {:?}", s.sheet_name, s.columns.iter().map(|c| &c.name).collect::<Vec<_>>()))
            .collect();
        let prompt = format!(
            "Task: {task_context}\nSchema:\n{}\nReply with JSON {{column_semantics, relationships, \
             business_patterns, recommended_analyses}}.",
            summary.join("\n")
        );
        self.chat_json(prompt, SemanticAnalysis::default).await
    }

    async fn interpret_results(
        &self,
        calculations: &Value,
        correlations: &[CorrelationFinding],
        semantics: &SemanticAnalysis,
        task_context: &str,
    ) -> String {
        let prompt = format!(
            "Task: {task_context}\nCalculations: {calculations}\nCorrelations: {correlations:?}\n\
             Semantics: {semantics:?}\nWrite a Markdown report with sections: Executive Summary, Detailed \
             Analysis, Key Findings, Statistical Summary, Recommendations, Conclusion."
        );
        self.llm.chat(&[ChatMessage::user(prompt)]).await.unwrap_or_else(|e| {
            format!("# Report unavailable\n\nLLM call failed: {e}")
        })
    }
}

fn default_understanding(sheets: &[SheetFrame]) -> FileUnderstanding {
    FileUnderstanding {
        sheets: sheets
            .iter()
            .map(|s| SheetIntent {
                sheet_name: s.name.clone(),
                key_columns: s.columns.first().cloned().into_iter().collect(),
                intent: String::new(),
            })
            .collect(),
    }
}

fn default_plans(sheets: &[SheetFrame]) -> Vec<SheetPlan> {
    sheets.iter().map(|s| SheetPlan { sheet_name: s.name.clone(), techniques: vec!["descriptive".to_string()] }).collect()
}

fn column_type_stats(column_type: ColumnType, values: &[Value]) -> Value {
    match column_type {
        ColumnType::Integer | ColumnType::Float | ColumnType::CategoricalNumeric => {
            numeric_stats(&as_f64_column(values)).map(|s| json!(s)).unwrap_or(Value::Null)
        }
        ColumnType::Text | ColumnType::CategoricalText => text_stats(values).map(|s| json!(s)).unwrap_or(Value::Null),
        ColumnType::Datetime => datetime_range(values).map(|s| json!(s)).unwrap_or(Value::Null),
        ColumnType::Boolean | ColumnType::Unknown => Value::Null,
    }
}

fn column_values(sheet: &SheetFrame, column_name: &str, columns: &[ColumnAnalysis]) -> Vec<Value> {
    let Some(idx) = columns.iter().position(|c| c.name == column_name) else { return Vec::new() };
    sheet.rows.iter().map(|r| r.get(idx).cloned().unwrap_or(Value::Null)).collect()
}

fn strong_pairs(sheet: &SheetFrame, numeric_columns: &[&ColumnAnalysis], columns: &[ColumnAnalysis]) -> Vec<Value> {
    let mut pairs = Vec::new();
    for i in 0..numeric_columns.len() {
        for j in (i + 1)..numeric_columns.len() {
            let a = column_values(sheet, &numeric_columns[i].name, columns);
            let b = column_values(sheet, &numeric_columns[j].name, columns);
            let r = pearson_correlation(&as_f64_column(&a), &as_f64_column(&b));
            if r.abs() > STRONG_CORRELATION_THRESHOLD {
                pairs.push(json!({ "column_a": numeric_columns[i].name, "column_b": numeric_columns[j].name, "r": r }));
            }
        }
    }
    pairs
}

/// Hard size cap: if the serialised indicators exceed `cap_bytes`, keep only
/// the first 10 columns worth of content per sheet.
fn enforce_indicator_cap(value: &mut Value, cap_bytes: usize) {
    let serialized = value.to_string();
    if serialized.len() <= cap_bytes {
        return;
    }
    if let Some(sheets) = value.as_object_mut() {
        for (_, sheet_value) in sheets.iter_mut() {
            if let Some(techniques) = sheet_value.as_object_mut() {
                for (_, technique_value) in techniques.iter_mut() {
                    if let Some(arr) = technique_value.as_array_mut() {
                        arr.truncate(10);
                    }
                }
            }
        }
    }
}

/// True when every sheet's indicator map came back empty, i.e. no technique
/// produced anything usable. Gates stage 8's `no_valid_data` skip.
fn indicators_all_empty(calculations: &Value) -> bool {
    let Some(sheets) = calculations.as_object() else { return true };
    sheets.values().all(|techniques| {
        techniques
            .as_object()
            .map(|t| t.values().all(|v| v.as_array().map(|a| a.is_empty()).unwrap_or(v.is_null())))
            .unwrap_or(true)
    })
}

fn default_charts() -> Vec<EChart> {
    vec![
        EChart {
            title: "descriptive bar".to_string(),
            chart_type: "bar".to_string(),
            option: json!({ "series": [{ "type": "bar" }] }),
        },
        EChart {
            title: "correlation heatmap".to_string(),
            chart_type: "heatmap".to_string(),
            option: json!({ "series": [{ "type": "heatmap" }] }),
        },
    ]
}

fn dedupe_and_cap_charts(charts: Vec<EChart>, max_charts: usize) -> Vec<EChart> {
    let mut seen = std::collections::HashSet::new();
    let mut deduped = Vec::new();
    for chart in charts {
        if seen.insert(chart.title.clone()) {
            deduped.push(chart);
        }
    }
    deduped.truncate(max_charts);
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use std::io::Write;

    fn pipeline() -> TableFilePipeline {
        TableFilePipeline::new(std::sync::Arc::new(MockLlmClient::new(8)), Supervisor::new(None), 5, 50 * 1024)
    }

    fn csv_source(contents: &str) -> FileSource {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write!(file, "{contents}").unwrap();
        let (_, path) = file.keep().unwrap();
        FileSource::Csv(path)
    }

    #[tokio::test]
    async fn happy_path_produces_report_and_charts() {
        let pipeline = pipeline();
        let source = csv_source("revenue,region\n100,east\n200,west\n150,east\n300,west\n");
        let mut chunks = Vec::new();
        let outcome = pipeline.run(source, Some("analyze revenue"), &mut |c| chunks.push(c)).await.unwrap();
        assert!(!outcome.report_markdown.is_empty());
        assert!(chunks.iter().any(|c| c.id == "step_8_chart_generation"));
    }

    #[tokio::test]
    async fn empty_data_skips_charts_with_no_valid_data_event() {
        let pipeline = pipeline();
        let source = csv_source("revenue,region\n");
        let mut chunks = Vec::new();
        let outcome = pipeline.run(source, None, &mut |c| chunks.push(c)).await.unwrap();
        assert!(outcome.charts.is_empty());
        let payloads: Vec<String> = chunks
            .iter()
            .filter(|c| c.id == "step_8_chart_generation")
            .map(|c| c.choices[0].delta.content.clone())
            .collect();
        assert!(payloads.iter().any(|p| p.contains("no_valid_data")));
        assert!(!chunks.iter().any(|c| c.choices[0].delta.delta_type == DeltaType::Echarts));
    }

    #[tokio::test]
    async fn unreadable_file_is_fatal() {
        let pipeline = pipeline();
        let source = FileSource::Csv(PathBuf::from("/nonexistent/path/does_not_exist.csv"));
        let mut chunks = Vec::new();
        assert!(pipeline.run(source, None, &mut |c| chunks.push(c)).await.is_err());
    }

    #[test]
    fn indicator_cap_truncates_when_oversized() {
        let mut value = json!({ "sheet1": { "descriptive": (0..1000).map(|i| json!({"i": i})).collect::<Vec<_>>() } });
        enforce_indicator_cap(&mut value, 100);
        assert_eq!(value["sheet1"]["descriptive"].as_array().unwrap().len(), 10);
    }

    #[test]
    fn dedupe_and_cap_respects_max_and_titles() {
        let charts = vec![
            EChart { title: "a".into(), chart_type: "bar".into(), option: json!({}) },
            EChart { title: "a".into(), chart_type: "bar".into(), option: json!({}) },
            EChart { title: "b".into(), chart_type: "bar".into(), option: json!({}) },
        ];
        let capped = dedupe_and_cap_charts(charts, 1);
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].title, "a");
    }
}
