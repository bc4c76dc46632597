//! Query validation gate
//!
//! Deterministic rules run first; the model syntax judgement only runs when
//! every rule passes. Rules are plain functions of the query text.

use crate::llm::{GenerateOptions, TextGenerator};
use crate::models::{ErrorKind, PipelineError};
use crate::Result;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

lazy_static! {
    static ref SQL_DENYLIST: Regex =
        Regex::new(r"(?i)\b(DROP|DELETE|UPDATE|TRUNCATE|ALTER)\b").expect("valid regex");
    static ref CYPHER_WRITE_CLAUSES: Regex =
        Regex::new(r"(?i)\b(CREATE|MERGE|DELETE|DETACH|SET|REMOVE|DROP|FOREACH)\b")
            .expect("valid regex");
}

/// Trait for deterministic query rules
pub trait QueryRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, query: &str) -> RuleCheck;
}

pub struct RuleCheck {
    pub passed: bool,
    pub details: String,
}

impl RuleCheck {
    fn pass() -> Self {
        Self {
            passed: true,
            details: String::new(),
        }
    }

    fn fail(details: impl Into<String>) -> Self {
        Self {
            passed: false,
            details: details.into(),
        }
    }
}

/// Ordered set of deterministic rules; the first failure wins.
pub struct SecurityValidator {
    rules: Vec<Box<dyn QueryRule>>,
}

impl SecurityValidator {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn QueryRule>) {
        self.rules.push(rule);
    }

    pub fn check(&self, query: &str) -> std::result::Result<(), PipelineError> {
        for rule in &self.rules {
            let result = rule.check(query);
            if !result.passed {
                warn!(rule = rule.name(), details = %result.details, "Query rejected");
                return Err(PipelineError::new(
                    ErrorKind::SecurityViolation,
                    format!("{}: {}", rule.name(), result.details),
                ));
            }
        }
        Ok(())
    }
}

impl Default for SecurityValidator {
    fn default() -> Self {
        Self::new()
    }
}

//
// ========== Rules ==========
//

/// Rule: no destructive SQL keyword anywhere, as a whole word
pub struct SqlDenylistRule;

impl QueryRule for SqlDenylistRule {
    fn name(&self) -> &'static str {
        "sql_denylist"
    }

    fn check(&self, query: &str) -> RuleCheck {
        match SQL_DENYLIST.find(query) {
            Some(m) => RuleCheck::fail(format!(
                "forbidden keyword {}",
                m.as_str().to_uppercase()
            )),
            None => RuleCheck::pass(),
        }
    }
}

/// Rule: statement must start with SELECT once trimmed
pub struct SelectAnchorRule;

impl QueryRule for SelectAnchorRule {
    fn name(&self) -> &'static str {
        "select_anchor"
    }

    fn check(&self, query: &str) -> RuleCheck {
        let starts_with_select = query
            .trim()
            .get(..6)
            .map(|head| head.eq_ignore_ascii_case("SELECT"))
            .unwrap_or(false);

        if starts_with_select {
            RuleCheck::pass()
        } else {
            RuleCheck::fail("statement must start with SELECT")
        }
    }
}

/// Rule: graph queries must not contain write clauses
pub struct CypherReadOnlyRule;

impl QueryRule for CypherReadOnlyRule {
    fn name(&self) -> &'static str {
        "cypher_read_only"
    }

    fn check(&self, query: &str) -> RuleCheck {
        match CYPHER_WRITE_CLAUSES.find(query) {
            Some(m) => RuleCheck::fail(format!(
                "write clause {}",
                m.as_str().to_uppercase()
            )),
            None => RuleCheck::pass(),
        }
    }
}

/// Denylist + SELECT anchor.
pub fn create_sql_security_validator() -> SecurityValidator {
    let mut validator = SecurityValidator::new();
    validator.add_rule(Box::new(SqlDenylistRule));
    validator.add_rule(Box::new(SelectAnchorRule));
    validator
}

/// Read-only gate for generated Cypher.
pub fn create_graph_security_validator() -> SecurityValidator {
    let mut validator = SecurityValidator::new();
    validator.add_rule(Box::new(CypherReadOnlyRule));
    validator
}

/// Deterministic SQL gate as a standalone check.
pub fn validate(sql: &str) -> std::result::Result<(), PipelineError> {
    lazy_static! {
        static ref SQL_GATE: SecurityValidator = create_sql_security_validator();
    }
    SQL_GATE.check(sql)
}

//
// ========== Model syntax judgement ==========
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

/// A leading verdict word decides; otherwise any PASS counts.
pub fn parse_verdict(response: &str) -> Verdict {
    let upper = response.trim().to_uppercase();
    let upper = upper.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());

    if upper.starts_with("FAIL") {
        Verdict::Fail
    } else if upper.starts_with("PASS") || upper.contains("PASS") {
        Verdict::Pass
    } else {
        Verdict::Fail
    }
}

/// Full SQL gate: deterministic rules, then the model syntax check.
pub struct SqlValidator<'a> {
    llm: &'a dyn TextGenerator,
    security: &'a SecurityValidator,
}

impl<'a> SqlValidator<'a> {
    pub fn new(llm: &'a dyn TextGenerator, security: &'a SecurityValidator) -> Self {
        Self { llm, security }
    }

    /// `Ok(None)` when the statement passes both stages.
    pub async fn validate(&self, sql: &str) -> Result<Option<PipelineError>> {
        if let Err(violation) = self.security.check(sql) {
            return Ok(Some(violation));
        }

        let prompt = format!(
            "Check whether the following PostgreSQL statement is syntactically valid.\n\
             Answer with exactly one word: PASS or FAIL.\n\nSQL: {}",
            sql
        );
        let response = self.llm.generate(&prompt, &GenerateOptions::default()).await?;

        let verdict = parse_verdict(&response);
        info!(?verdict, "SQL syntax check completed");

        Ok(match verdict {
            Verdict::Pass => None,
            Verdict::Fail => Some(PipelineError::new(
                ErrorKind::ValidationFail,
                format!("syntax check rejected the query: {}", response.trim()),
            )),
        })
    }
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedGenerator;

    #[test]
    fn test_select_passes() {
        assert!(validate("SELECT amount FROM transactions").is_ok());
        assert!(validate("  select category, sum(amount) from transactions group by category").is_ok());
    }

    #[test]
    fn test_denylist_rejects_destructive_words() {
        let cases = vec![
            "DROP TABLE accounts",
            "DELETE FROM transactions",
            "SELECT 1; drop table accounts",
            "SELECT * FROM t WHERE x IN (SELECT 1); UPDATE t SET a = 1",
            "select truncate from t",
            "SELECT 1; Alter TABLE t ADD c int",
        ];

        for c in cases {
            let err = validate(c).unwrap_err();
            assert_eq!(err.kind, ErrorKind::SecurityViolation, "query: {}", c);
        }
    }

    #[test]
    fn test_denylist_is_whole_word() {
        assert!(validate("SELECT updated_at, dropdown FROM t").is_ok());
        assert!(validate("SELECT * FROM deleted_items").is_ok());
    }

    #[test]
    fn test_select_anchor() {
        let err = validate("WITH x AS (SELECT 1) SELECT * FROM x").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SecurityViolation);
        assert!(err.message.contains("select_anchor"));

        assert!(validate("").is_err());
        assert!(validate("INSERT INTO t VALUES (1)").is_err());
        assert!(validate("SEL").is_err());
    }

    #[test]
    fn test_cypher_read_only() {
        let gate = create_graph_security_validator();
        assert!(gate
            .check("MATCH (a:Account)-[:PERFORMED]->(t:Transaction) RETURN count(t) AS n")
            .is_ok());
        assert!(gate.check("MATCH (n) DETACH DELETE n").is_err());
        assert!(gate.check("merge (m:Merchant {merchant_id: 'x'})").is_err());
        assert!(gate.check("MATCH (t:Transaction) SET t.amount = 0").is_err());
    }

    #[test]
    fn test_parse_verdict() {
        assert_eq!(parse_verdict("PASS"), Verdict::Pass);
        assert_eq!(parse_verdict("pass."), Verdict::Pass);
        assert_eq!(parse_verdict("**PASS**"), Verdict::Pass);
        assert_eq!(parse_verdict("The query looks fine: PASS"), Verdict::Pass);
        assert_eq!(parse_verdict("FAIL"), Verdict::Fail);
        assert_eq!(parse_verdict("FAIL - this would not pass"), Verdict::Fail);
        assert_eq!(parse_verdict("looks wrong"), Verdict::Fail);
        assert_eq!(parse_verdict(""), Verdict::Fail);
    }

    #[tokio::test]
    async fn test_security_failure_skips_model() {
        let llm = ScriptedGenerator::new(["PASS"]);
        let security = create_sql_security_validator();
        let validator = SqlValidator::new(&llm, &security);

        let outcome = validator.validate("DROP TABLE accounts").await.unwrap();
        assert_eq!(outcome.unwrap().kind, ErrorKind::SecurityViolation);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_model_rejection_is_validation_fail() {
        let llm = ScriptedGenerator::new(["FAIL", "PASS"]);
        let security = create_sql_security_validator();
        let validator = SqlValidator::new(&llm, &security);

        let outcome = validator.validate("SELECT FROM WHERE").await.unwrap();
        assert_eq!(outcome.unwrap().kind, ErrorKind::ValidationFail);

        let outcome = validator.validate("SELECT 1").await.unwrap();
        assert!(outcome.is_none());
    }
}
