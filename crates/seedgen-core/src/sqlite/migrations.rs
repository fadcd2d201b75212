#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

const MIGRATION_0001: SqliteMigration = SqliteMigration {
    version: 1,
    name: "initial_policy_schema",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS policy_records (
    policy_id TEXT PRIMARY KEY,
    data_source_type TEXT NOT NULL,
    description TEXT,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at_unix INTEGER NOT NULL,
    updated_at_unix INTEGER
);

CREATE TABLE IF NOT EXISTS policy_generation_configs (
    config_id INTEGER PRIMARY KEY AUTOINCREMENT,
    policy_id TEXT NOT NULL UNIQUE,
    query_text TEXT NOT NULL,
    cron_expression TEXT NOT NULL,
    task_kind TEXT NOT NULL,
    created_at_unix INTEGER NOT NULL,
    updated_at_unix INTEGER
);
"#,
    down_sql: r#"
DROP TABLE IF EXISTS policy_generation_configs;
DROP TABLE IF EXISTS policy_records;
"#,
};

const MIGRATION_0002: SqliteMigration = SqliteMigration {
    version: 2,
    name: "add_seed_tasks",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS seed_tasks (
    task_id INTEGER PRIMARY KEY AUTOINCREMENT,
    policy_id TEXT NOT NULL,
    task_kind TEXT NOT NULL,
    task_params TEXT NOT NULL,
    consumed INTEGER NOT NULL DEFAULT 0,
    created_at_unix INTEGER NOT NULL,
    updated_at_unix INTEGER
);

CREATE INDEX IF NOT EXISTS idx_seed_tasks_policy_pending
    ON seed_tasks (policy_id, consumed);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_seed_tasks_policy_pending;
DROP TABLE IF EXISTS seed_tasks;
"#,
};

const MIGRATION_0003: SqliteMigration = SqliteMigration {
    version: 3,
    name: "add_task_sources",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS task_sources (
    source_id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_name TEXT NOT NULL,
    url TEXT NOT NULL,
    parse_template TEXT,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at_unix INTEGER NOT NULL,
    updated_at_unix INTEGER,
    UNIQUE (source_name, url)
);
"#,
    down_sql: r#"
DROP TABLE IF EXISTS task_sources;
"#,
};

const MIGRATIONS: [SqliteMigration; 3] = [MIGRATION_0001, MIGRATION_0002, MIGRATION_0003];

pub fn migrations() -> &'static [SqliteMigration] {
    &MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static SqliteMigration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
