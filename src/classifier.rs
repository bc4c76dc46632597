//! Intent Classifier
//!
//! Routes a refined question to one of:
//! - SQL: quantitative aggregation / filtering over transactions
//! - GRAPH: relationship and pattern questions over accounts and merchants
//! - GENERAL: no data access needed
//!
//! The model answers in free text, so its reply is parsed through a fixed
//! ladder that always ends in one of the three routes.

use crate::llm::{GenerateOptions, TextGenerator};
use crate::models::Route;
use crate::Result;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

lazy_static! {
    static ref JSON_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").expect("valid regex");
}

pub struct IntentClassifier<'a> {
    llm: &'a dyn TextGenerator,
}

impl<'a> IntentClassifier<'a> {
    pub fn new(llm: &'a dyn TextGenerator) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, question: &str) -> Result<Route> {
        let prompt = build_prompt(question);
        let response = self.llm.generate(&prompt, &GenerateOptions::default()).await?;
        let route = parse_intent(&response);
        debug!(?route, "Intent classified");
        Ok(route)
    }
}

/// Parse a classifier reply.
///
/// 1. first `{...}` block that parses: its `intent` field, or GENERAL when
///    the field is missing or not one of the three routes
/// 2. no parsable object: case-insensitive substring GRAPH, then SQL
/// 3. GENERAL
pub fn parse_intent(response: &str) -> Route {
    if let Some(object) = json_object(response) {
        return match object
            .get("intent")
            .and_then(Value::as_str)
            .and_then(Route::from_label)
        {
            Some(route) => route,
            None => {
                warn!("Classifier JSON has no valid intent, defaulting to GENERAL");
                Route::General
            }
        };
    }

    let upper = response.to_uppercase();
    if upper.contains("GRAPH") {
        return Route::Graph;
    }
    if upper.contains("SQL") {
        return Route::Sql;
    }

    warn!("Unrecognized intent reply, defaulting to GENERAL");
    Route::General
}

fn json_object(response: &str) -> Option<Value> {
    let block = JSON_OBJECT.find(response)?;
    serde_json::from_str::<Value>(block.as_str())
        .ok()
        .filter(Value::is_object)
}

fn build_prompt(question: &str) -> String {
    format!(
        r#"You route questions for a household ledger assistant.
Classify the question into exactly one of [SQL, GRAPH, GENERAL].

- SQL: totals, averages, spending within a period, top-N lists; anything that needs numeric aggregation or filtering.
  e.g. "이번 달 식비 얼마야?", "Show the 3 merchants I spent the most at"
- GRAPH: relationships between accounts, transactions and merchants; category patterns; similar merchants.
  e.g. "스타벅스와 같은 카테고리인 곳들 알려줘", "Which merchants share customers with my usual cafe?"
- GENERAL: greetings, help, budgeting tips; no data lookup needed.
  e.g. "안녕", "How do I keep a good household ledger?"

Question: {}

Respond ONLY with JSON in this exact form:
{{"intent": "SQL" | "GRAPH" | "GENERAL"}}"#,
        question
    )
}
