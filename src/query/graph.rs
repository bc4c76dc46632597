//! Cypher query generator for the ledger property graph

use super::strip_code_fences;
use crate::llm::{GenerateOptions, TextGenerator};
use crate::schema::GRAPH_SCHEMA;
use crate::Result;
use tracing::debug;

pub struct GraphQueryGenerator<'a> {
    llm: &'a dyn TextGenerator,
}

impl<'a> GraphQueryGenerator<'a> {
    pub fn new(llm: &'a dyn TextGenerator) -> Self {
        Self { llm }
    }

    pub async fn generate(&self, question: &str) -> Result<String> {
        let prompt = build_prompt(question);
        let response = self.llm.generate(&prompt, &GenerateOptions::default()).await?;
        let cypher = strip_code_fences(&response);
        debug!(cypher = %cypher, "Cypher generated");
        Ok(cypher)
    }
}

fn build_prompt(question: &str) -> String {
    format!(
        r#"Write one Neo4j Cypher query over the household ledger graph.

Graph schema:
{}

Question: {}

Rules:
- Read-only: MATCH / OPTIONAL MATCH / WITH / RETURN only. Never CREATE, MERGE, SET, DELETE or REMOVE.
- Return named columns (use AS aliases) with scalar values.
- Return ONLY the Cypher text, without ``` fences or explanations."#,
        GRAPH_SCHEMA, question
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedGenerator;

    #[tokio::test]
    async fn test_generate_strips_fences() {
        let llm = ScriptedGenerator::new([
            "```cypher\nMATCH (a:Account)-[:PERFORMED]->(t:Transaction)-[:AT]->(m:Merchant) RETURN m.merchant_id AS merchant, count(t) AS visits\n```",
        ]);
        let generator = GraphQueryGenerator::new(&llm);

        let cypher = generator.generate("스타벅스와 비슷한 가맹점은?").await.unwrap();
        assert!(cypher.starts_with("MATCH (a:Account)"));
        assert!(!cypher.contains("```"));

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("(:Account)-[:PERFORMED]->(:Transaction)"));
        assert!(prompt.contains("(:Transaction)-[:AT]->(:Merchant)"));
    }
}
