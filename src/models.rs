//! Core data models for the ledger agent

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A single result row: field name → JSON-safe scalar.
pub type Row = Map<String, Value>;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// Backend category selected for a question.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Route {
    Sql,
    Graph,
    General,
}

impl Route {
    /// Map a label onto the closed set of routes. Anything else is `None`.
    pub fn from_label(label: &str) -> Option<Route> {
        match label.trim().to_uppercase().as_str() {
            "SQL" => Some(Route::Sql),
            "GRAPH" => Some(Route::Graph),
            "GENERAL" => Some(Route::General),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    SecurityViolation,
    ValidationFail,
    ExecError,
    UpstreamFailure,
    ParseFailure,
}

/// States of the orchestration machine, recorded in visit order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Refine,
    Route,
    SqlGen,
    Validate,
    GraphGen,
    Execute,
    Synthesize,
    RecordHistory,
    CacheHit,
    Done,
}

//
// ================= Conversation =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
        }
    }
}

//
// ================= Errors carried on state =================
//

/// Non-fatal failure recorded on the request state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

//
// ================= Chart =================
//

/// Visualization descriptor: one array field of uniform records.
///
/// Only [`crate::synthesis::parse_chart_payload`] constructs these, so a
/// value of this type has already passed the uniformity check. Deserializing
/// goes through the same check.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(transparent)]
pub struct ChartPayload(pub(crate) Map<String, Value>);

impl<'de> Deserialize<'de> for ChartPayload {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        crate::synthesis::parse_chart_payload(value).ok_or_else(|| {
            serde::de::Error::custom("chart payload must hold one array of uniform records")
        })
    }
}

impl ChartPayload {
    pub fn as_object(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The array-of-records series.
    pub fn records(&self) -> &[Value] {
        self.0
            .values()
            .find_map(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

//
// ================= Request State =================
//

/// Request-scoped state, exclusively owned by one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestState {
    pub turns: Vec<ConversationTurn>,
    pub refined_question: String,
    pub route: Option<Route>,
    pub retry_count: u32,
    pub last_error: Option<PipelineError>,
    pub query_text: String,
    /// Always a sequence, empty when nothing ran or execution failed.
    pub result_rows: Vec<Row>,
    pub answer_text: String,
    pub chart_payload: Option<ChartPayload>,
    pub user_id: String,
    pub session_id: String,
    pub trace: Vec<Stage>,
}

impl RequestState {
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        turns: Vec<ConversationTurn>,
    ) -> Self {
        Self {
            turns,
            refined_question: String::new(),
            route: None,
            retry_count: 0,
            last_error: None,
            query_text: String::new(),
            result_rows: Vec::new(),
            answer_text: String::new(),
            chart_payload: None,
            user_id: user_id.into(),
            session_id: session_id.into(),
            trace: Vec::new(),
        }
    }

    /// Text of the newest turn, i.e. the question being answered.
    pub fn current_question(&self) -> Option<&str> {
        self.turns.last().map(|t| t.text.as_str())
    }

    pub(crate) fn enter(&mut self, stage: Stage) {
        self.trace.push(stage);
    }
}

//
// ================= Analyze operation =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub user_id: String,
    pub session_id: String,
    pub question: String,
    /// Prior turns, oldest first. The question itself is appended as the newest turn.
    #[serde(default)]
    pub turns: Vec<ConversationTurn>,
}

impl AnalyzeRequest {
    pub fn into_state(self) -> RequestState {
        let mut turns = self.turns;
        turns.push(ConversationTurn::user(self.question));
        RequestState::new(self.user_id, self.session_id, turns)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeOutcome {
    pub refined_question: String,
    pub route: Option<Route>,
    pub query_text: Option<String>,
    pub answer_text: String,
    pub chart_payload: Option<ChartPayload>,
    pub retry_count: u32,
    pub error: Option<PipelineError>,
    pub status: String,
}

impl From<RequestState> for AnalyzeOutcome {
    fn from(state: RequestState) -> Self {
        let status = if state.last_error.is_none() {
            "success"
        } else {
            "degraded"
        };

        Self {
            refined_question: state.refined_question,
            route: state.route,
            query_text: if state.query_text.is_empty() {
                None
            } else {
                Some(state.query_text)
            },
            answer_text: state.answer_text,
            chart_payload: state.chart_payload,
            retry_count: state.retry_count,
            error: state.last_error,
            status: status.to_string(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Route::Sql => "SQL",
            Route::Graph => "GRAPH",
            Route::General => "GENERAL",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::SecurityViolation => "SECURITY_VIOLATION",
            ErrorKind::ValidationFail => "VALIDATION_FAIL",
            ErrorKind::ExecError => "EXEC_ERROR",
            ErrorKind::UpstreamFailure => "UPSTREAM_FAILURE",
            ErrorKind::ParseFailure => "PARSE_FAILURE",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_payload_deserializes_through_uniformity_check() {
        let chart: ChartPayload = serde_json::from_value(serde_json::json!({
            "type": "bar",
            "data": [{"category": "식비", "total": 52000}, {"category": "교통", "total": 18000}],
        }))
        .unwrap();
        assert_eq!(chart.records().len(), 2);

        let parallel_arrays = serde_json::json!({"labels": ["식비", "교통"], "values": [52000, 18000]});
        assert!(serde_json::from_value::<ChartPayload>(parallel_arrays).is_err());

        let mixed = serde_json::json!({"data": [{"a": 1}, {"b": 2}]});
        assert!(serde_json::from_value::<ChartPayload>(mixed).is_err());
    }

    #[test]
    fn test_route_labels() {
        assert_eq!(Route::from_label("SQL"), Some(Route::Sql));
        assert_eq!(Route::from_label(" graph "), Some(Route::Graph));
        assert_eq!(Route::from_label("General"), Some(Route::General));
        assert_eq!(Route::from_label("DELETE"), None);
        assert_eq!(serde_json::to_string(&Route::Graph).unwrap(), "\"GRAPH\"");
    }

    #[test]
    fn test_error_kind_wire_names() {
        let err = PipelineError::new(ErrorKind::SecurityViolation, "denied");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "SECURITY_VIOLATION");
        assert_eq!(err.to_string(), "SECURITY_VIOLATION: denied");
    }

    #[test]
    fn test_fresh_state_has_empty_rows() {
        let state = AnalyzeRequest {
            user_id: "u1".into(),
            session_id: "s1".into(),
            question: "이번 달 식비 얼마야?".into(),
            turns: vec![],
        }
        .into_state();

        assert!(state.result_rows.is_empty());
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.current_question(), Some("이번 달 식비 얼마야?"));
        assert_eq!(state.turns.len(), 1);
    }

    #[test]
    fn test_outcome_status() {
        let mut state = RequestState::new("u", "s", vec![ConversationTurn::user("hi")]);
        state.answer_text = "hello".into();
        let outcome = AnalyzeOutcome::from(state.clone());
        assert_eq!(outcome.status, "success");
        assert!(outcome.query_text.is_none());

        state.last_error = Some(PipelineError::new(ErrorKind::ExecError, "boom"));
        let outcome = AnalyzeOutcome::from(state);
        assert_eq!(outcome.status, "degraded");
    }
}
