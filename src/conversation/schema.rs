//! SQLite schema definition

/// Schema for the runs table and its message log. `{table}` is replaced
/// with the validated table name.
const SCHEMA_TEMPLATE: &str = r#"
-- Runs: one conversation per row, scoped to a user
CREATE TABLE IF NOT EXISTS {table} (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    run_name TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Messages: ordered chat log of each run
CREATE TABLE IF NOT EXISTS {table}_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL REFERENCES {table}(run_id),
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{table}_user ON {table}(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_{table}_messages_run ON {table}_messages(run_id);
"#;

/// Render the schema for a table name
pub fn schema_sql(table: &str) -> String {
    SCHEMA_TEMPLATE.replace("{table}", table)
}

/// Table names are interpolated into SQL, so only plain identifiers pass
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
