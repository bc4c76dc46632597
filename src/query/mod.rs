//! Query generation
//!
//! Natural-language question + schema context → backend query text.

pub mod graph;
pub mod sql;

pub use graph::GraphQueryGenerator;
pub use sql::SqlQueryGenerator;

/// Remove markdown code-fence markers a model may wrap around a query.
pub fn strip_code_fences(raw: &str) -> String {
    let mut out = raw.trim().to_string();
    for tag in ["```sql", "```SQL", "```cypher", "```Cypher", "```postgresql", "```"] {
        out = out.replace(tag, "");
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(
            strip_code_fences("```sql\nSELECT 1\n```"),
            "SELECT 1"
        );
        assert_eq!(
            strip_code_fences("```cypher\nMATCH (n) RETURN n\n```"),
            "MATCH (n) RETURN n"
        );
        assert_eq!(strip_code_fences("  SELECT 1  "), "SELECT 1");
    }
}
