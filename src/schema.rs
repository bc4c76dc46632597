//! Static schema descriptor for the ledger stores
//!
//! Built once at startup and handed to the query generators by reference.

use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub note: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: &'static str,
    pub columns: Vec<ColumnDescriptor>,
}

/// Relational entities of the household ledger.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    tables: Vec<TableDescriptor>,
}

const fn col(name: &'static str, sql_type: &'static str) -> ColumnDescriptor {
    ColumnDescriptor {
        name,
        sql_type,
        note: None,
    }
}

const fn key(name: &'static str, sql_type: &'static str, note: &'static str) -> ColumnDescriptor {
    ColumnDescriptor {
        name,
        sql_type,
        note: Some(note),
    }
}

impl SchemaDescriptor {
    /// The `accounts` and `transactions` tables.
    pub fn ledger() -> Self {
        Self {
            tables: vec![
                TableDescriptor {
                    name: "accounts",
                    columns: vec![
                        key("account_id", "VARCHAR(50)", "PK"),
                        col("account_type", "VARCHAR(50)"),
                        col("account_description", "TEXT"),
                        col("creation_date", "DATE"),
                    ],
                },
                TableDescriptor {
                    name: "transactions",
                    columns: vec![
                        key("transaction_id", "VARCHAR(50)", "PK"),
                        key("account_id", "VARCHAR(50)", "FK -> accounts.account_id"),
                        col("transaction_date", "DATE"),
                        col("transaction_time", "TIME"),
                        col("amount", "NUMERIC(15, 2)"),
                        col("merchant_id", "VARCHAR(100)"),
                        col("category", "VARCHAR(50)"),
                        col("transaction_type", "VARCHAR(50)"),
                        col("location", "VARCHAR(255)"),
                        col("country", "VARCHAR(50)"),
                        col("currency", "VARCHAR(10)"),
                    ],
                },
            ],
        }
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Prompt-ready description: one block per table, one line per column.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (i, table) in self.tables.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "Table: {}", table.name);
            out.push_str("Columns:\n");
            for column in &table.columns {
                match column.note {
                    Some(note) => {
                        let _ = writeln!(out, "- {} ({}) [{}]", column.name, column.sql_type, note);
                    }
                    None => {
                        let _ = writeln!(out, "- {} ({})", column.name, column.sql_type);
                    }
                }
            }
        }
        out
    }
}

impl Default for SchemaDescriptor {
    fn default() -> Self {
        Self::ledger()
    }
}

/// Property-graph layout used by the graph query generator.
pub const GRAPH_SCHEMA: &str = r#"Nodes:
- Account {account_id, account_type}
- Transaction {transaction_id, amount, transaction_date, category, currency}
- Merchant {merchant_id}
Relationships:
- (:Account)-[:PERFORMED]->(:Transaction)
- (:Transaction)-[:AT]->(:Merchant)"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_lists_both_tables() {
        let schema = SchemaDescriptor::ledger();
        let text = schema.describe();

        assert!(text.contains("Table: accounts"));
        assert!(text.contains("Table: transactions"));
        assert!(text.contains("- amount (NUMERIC(15, 2))"));
        assert!(text.contains("FK -> accounts.account_id"));
    }

    #[test]
    fn test_transactions_columns() {
        let schema = SchemaDescriptor::default();
        let transactions = schema.table("transactions").unwrap();
        assert_eq!(transactions.columns.len(), 11);
        assert!(schema.table("merchants").is_none());
    }
}
