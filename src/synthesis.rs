//! Response synthesis
//!
//! Turns result rows into a natural-language answer, optionally followed by
//! [`CHART_MARKER`] and one chart object. Consumers split on the marker and
//! parse the remainder on their own.

use crate::llm::{GenerateOptions, TextGenerator};
use crate::models::{ChartPayload, RequestState, Row};
use crate::Result;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

pub const CHART_MARKER: &str = "[CHART_JSON]";

/// Rows beyond this are left out of the prompt.
const MAX_PROMPT_ROWS: usize = 50;

const FALLBACK_ANSWER: &str =
    "I could not put together an answer for this question. Please try rephrasing it.";

pub struct ResponseSynthesizer<'a> {
    llm: &'a dyn TextGenerator,
}

impl<'a> ResponseSynthesizer<'a> {
    pub fn new(llm: &'a dyn TextGenerator) -> Self {
        Self { llm }
    }

    /// Produce `(answer_text, chart_payload)` for the current state.
    pub async fn synthesize(&self, state: &RequestState) -> Result<(String, Option<ChartPayload>)> {
        let prompt = build_prompt(state);
        let response = self.llm.generate(&prompt, &GenerateOptions::default()).await?;
        let (answer, chart) = split_answer(&response);
        debug!(has_chart = chart.is_some(), answer_len = answer.len(), "Answer synthesized");
        Ok((answer, chart))
    }
}

fn build_prompt(state: &RequestState) -> String {
    let shown: Vec<&Row> = state.result_rows.iter().take(MAX_PROMPT_ROWS).collect();
    let data = serde_json::to_string(&shown).unwrap_or_else(|_| "[]".to_string());

    let mut notes = String::new();
    if state.result_rows.len() > MAX_PROMPT_ROWS {
        notes.push_str(&format!(
            "Only the first {} of {} rows are shown.\n",
            MAX_PROMPT_ROWS,
            state.result_rows.len()
        ));
    }
    if let Some(err) = &state.last_error {
        notes.push_str(&format!(
            "The data lookup did not succeed ({}). Explain briefly that the data could not be retrieved.\n",
            err.kind
        ));
    }

    format!(
        r#"Answer the user's question about their household ledger in a friendly way,
in the same language as the question.

Data: {}
Question: {}
{}
Chart rules:
1. If the data can be visualized, end the answer with the tag {} followed immediately by ONE JSON object.
2. The object must hold one field whose value is an array of objects with identical keys,
   e.g. {{"data": [{{"label": "Food", "value": 100}}, {{"label": "Transport", "value": 200}}]}}
3. Never use parallel arrays such as {{"labels": [...], "values": [...]}}.
4. If there is no data or nothing worth charting, omit the tag and the JSON entirely."#,
        data, state.refined_question, notes, CHART_MARKER
    )
}

/// Split a raw model answer into prose and a validated chart.
///
/// An invalid or missing chart drops the marker from the answer text; a
/// valid one is re-serialized canonically after the marker.
pub fn split_answer(raw: &str) -> (String, Option<ChartPayload>) {
    let (prose, chart) = match raw.find(CHART_MARKER) {
        Some(pos) => {
            let prose = raw[..pos].trim();
            let remainder = &raw[pos + CHART_MARKER.len()..];
            (prose, extract_json_object(remainder).and_then(parse_chart_payload))
        }
        None => (raw.trim(), None),
    };

    let prose = if prose.is_empty() {
        warn!("Synthesizer returned no prose, using fallback answer");
        FALLBACK_ANSWER.to_string()
    } else {
        prose.to_string()
    };

    match chart {
        Some(payload) => match serde_json::to_string(&payload) {
            Ok(json) => (format!("{}\n\n{} {}", prose, CHART_MARKER, json), Some(payload)),
            Err(_) => (prose, None),
        },
        None => (prose, None),
    }
}

fn extract_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Accept only an object with exactly one array field whose elements are
/// non-empty objects sharing one key set.
pub fn parse_chart_payload(value: Value) -> Option<ChartPayload> {
    let Value::Object(object) = value else {
        return None;
    };

    let mut arrays = object.values().filter_map(Value::as_array);
    let records = arrays.next()?;
    if arrays.next().is_some() || records.is_empty() {
        return None;
    }

    let mut expected: Option<BTreeSet<&str>> = None;
    for record in records {
        let keys: BTreeSet<&str> = record.as_object()?.keys().map(String::as_str).collect();
        if keys.is_empty() {
            return None;
        }
        if let Some(first) = &expected {
            if *first != keys {
                return None;
            }
        } else {
            expected = Some(keys);
        }
    }

    Some(ChartPayload(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedGenerator;
    use crate::models::{ConversationTurn, ErrorKind, PipelineError};
    use serde_json::json;

    #[test]
    fn test_plain_answer_has_no_marker() {
        let (answer, chart) = split_answer("  이번 달 식비는 50,000원입니다.  ");
        assert_eq!(answer, "이번 달 식비는 50,000원입니다.");
        assert!(chart.is_none());
    }

    #[test]
    fn test_valid_chart_is_kept() {
        let raw = r#"식비가 가장 많습니다. [CHART_JSON] {"data": [{"label": "식비", "value": 100}, {"label": "교통", "value": 50}]}"#;
        let (answer, chart) = split_answer(raw);

        let chart = chart.unwrap();
        assert_eq!(chart.records().len(), 2);
        assert!(answer.starts_with("식비가 가장 많습니다."));

        let (_, tail) = answer.split_once(CHART_MARKER).unwrap();
        let reparsed: Value = serde_json::from_str(tail.trim()).unwrap();
        assert_eq!(reparsed["data"][1]["label"], "교통");
    }

    #[test]
    fn test_fenced_chart_is_accepted() {
        let raw = "Spending by category.\n[CHART_JSON]\n```json\n{\"data\": [{\"label\": \"A\", \"value\": 1}]}\n```";
        let (_, chart) = split_answer(raw);
        assert!(chart.is_some());
    }

    #[test]
    fn test_invalid_chart_drops_marker() {
        let cases = vec![
            r#"분석 결과입니다. [CHART_JSON] {"type":"pie"}"#,
            r#"분석 결과입니다. [CHART_JSON] {}"#,
            r#"분석 결과입니다. [CHART_JSON] {"labels": ["a", "b"], "values": [1, 2]}"#,
            r#"분석 결과입니다. [CHART_JSON] {"data": [{"label": "a", "value": 1}, {"label": "b"}]}"#,
            r#"분석 결과입니다. [CHART_JSON] {"data": []}"#,
            r#"분석 결과입니다. [CHART_JSON] not json at all"#,
            r#"분석 결과입니다. [CHART_JSON] {"data": [1, 2, 3]}"#,
        ];

        for raw in cases {
            let (answer, chart) = split_answer(raw);
            assert_eq!(answer, "분석 결과입니다.", "raw: {}", raw);
            assert!(chart.is_none(), "raw: {}", raw);
        }
    }

    #[test]
    fn test_scalar_metadata_is_allowed() {
        let payload = parse_chart_payload(json!({
            "type": "bar",
            "data": [{"label": "a", "value": 1}]
        }));
        assert!(payload.is_some());
    }

    #[test]
    fn test_empty_prose_uses_fallback() {
        let (answer, _) = split_answer("   ");
        assert_eq!(answer, FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn test_prompt_mentions_failed_lookup() {
        let llm = ScriptedGenerator::new(["데이터를 가져오지 못했습니다."]);
        let mut state = RequestState::new("u", "s", vec![ConversationTurn::user("q")]);
        state.refined_question = "이번 달 식비 얼마야?".into();
        state.last_error = Some(PipelineError::new(ErrorKind::ExecError, "boom"));

        let (answer, chart) = ResponseSynthesizer::new(&llm).synthesize(&state).await.unwrap();
        assert_eq!(answer, "데이터를 가져오지 못했습니다.");
        assert!(chart.is_none());

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("Data: []"));
        assert!(prompt.contains("EXEC_ERROR"));
        assert!(prompt.contains("Question: 이번 달 식비 얼마야?"));
    }
}
