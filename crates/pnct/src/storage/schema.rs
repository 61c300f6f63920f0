//! SQL for the pnct database.
//!
//! The `metadata` table is created before anything else since it records
//! which migrations have run. Everything else is created by migrations.

/// SQL statement to create the datasets table.
///
/// One row per (year, highway); re-fetching replaces it.
pub const CREATE_DATASETS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS datasets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    year INTEGER NOT NULL,
    highway INTEGER NOT NULL,
    data TEXT NOT NULL,
    row_count INTEGER NOT NULL,
    content_hash TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    UNIQUE(year, highway)
)
";

/// SQL statement to create the query history table.
pub const CREATE_HISTORY_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL,
    timestamp TEXT NOT NULL
)
";

/// SQL statement to create an index on history timestamps for recency queries.
pub const CREATE_HISTORY_TIMESTAMP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_history_timestamp ON history(timestamp DESC)
";

/// Key-value table holding the schema version.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Tables created by the first migration.
pub const INITIAL_TABLES: &[&str] = &[
    CREATE_DATASETS_TABLE,
    CREATE_HISTORY_TABLE,
    CREATE_HISTORY_TIMESTAMP_INDEX,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_tables_are_idempotent() {
        for stmt in INITIAL_TABLES {
            assert!(stmt.contains("IF NOT EXISTS"));
        }
        assert!(CREATE_METADATA_TABLE.contains("IF NOT EXISTS"));
    }

    #[test]
    fn test_datasets_table_is_unique_per_query() {
        assert!(CREATE_DATASETS_TABLE.contains("UNIQUE(year, highway)"));
        assert!(CREATE_DATASETS_TABLE.contains("data TEXT NOT NULL"));
    }

    #[test]
    fn test_history_table_structure() {
        assert!(CREATE_HISTORY_TABLE.contains("query TEXT NOT NULL"));
        assert!(CREATE_HISTORY_TABLE.contains("timestamp TEXT NOT NULL"));
    }
}
