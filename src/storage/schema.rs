//! SQLite schema and connection pragmas.

use rusqlite::Connection;

/// Pragmas applied to every pooled connection.
pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        "#,
    )
}

/// Create the demo tables if they do not exist.
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL CHECK (length(name) <= 55),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL CHECK (length(name) <= 55),
            price INTEGER NOT NULL,
            description TEXT CHECK (description IS NULL OR length(description) <= 255),
            is_available INTEGER NOT NULL DEFAULT 1,
            deleted INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS configs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            "key" TEXT CHECK ("key" IS NULL OR length("key") <= 255),
            value TEXT CHECK (value IS NULL OR length(value) <= 255),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
}
