//! PostgreSQL query generator

use super::strip_code_fences;
use crate::llm::{GenerateOptions, TextGenerator};
use crate::models::PipelineError;
use crate::schema::SchemaDescriptor;
use crate::Result;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    /// Identifier character glued to a clause keyword, e.g. `currencyFROM` or
    /// `amountfrom`. `_` is not a gluing character, so `date_from` stays intact.
    static ref GLUED_KEYWORD: Regex =
        Regex::new(r"(?i)([A-Za-z0-9])(FROM|WHERE|ORDER|LIMIT|GROUP|JOIN)\b").expect("valid regex");
}

pub struct SqlQueryGenerator<'a> {
    llm: &'a dyn TextGenerator,
    schema: &'a SchemaDescriptor,
}

impl<'a> SqlQueryGenerator<'a> {
    pub fn new(llm: &'a dyn TextGenerator, schema: &'a SchemaDescriptor) -> Self {
        Self { llm, schema }
    }

    /// `previous_error` is the validation failure of the prior attempt, if any.
    pub async fn generate(
        &self,
        question: &str,
        previous_error: Option<&PipelineError>,
    ) -> Result<String> {
        let prompt = build_prompt(&self.schema.describe(), question, previous_error);
        let response = self.llm.generate(&prompt, &GenerateOptions::default()).await?;
        let sql = clean_sql(&response);
        debug!(sql = %sql, "SQL generated");
        Ok(sql)
    }
}

/// Strip fences and split keywords glued onto the preceding identifier.
pub fn clean_sql(raw: &str) -> String {
    let stripped = strip_code_fences(raw);
    GLUED_KEYWORD.replace_all(&stripped, "$1 $2").into_owned()
}

fn build_prompt(schema: &str, question: &str, previous_error: Option<&PipelineError>) -> String {
    let base = format!(
        r#"Write one PostgreSQL query over the household ledger database.

Schema:
{}
Question: {}

Rules:
1. Always put whitespace between SQL keywords and identifiers ('currency FROM', never 'currencyFROM').
2. Return ONLY the SQL text. Do not wrap it in ```sql fences and do not explain it.
3. Read-only: a single SELECT statement. DROP, DELETE, UPDATE, TRUNCATE, ALTER and INSERT are forbidden."#,
        schema, question
    );

    match previous_error {
        Some(err) => format!(
            "The previous query was rejected ({}). Write a corrected query.\n\n{}",
            err, base
        ),
        None => base,
    }
}
