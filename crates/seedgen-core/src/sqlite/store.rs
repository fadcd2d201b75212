use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{
    ColumnValue, CoreError, CoreErrorKind, NewPolicyGenerationConfig, NewPolicyRecord,
    NewSeedTask, NewTaskSource, PolicyGenerationConfig, PolicyRecord, QueryRow, SeedTask,
    SeedTaskId, TaskKind, TaskParams, TaskSource, TaskSourceId,
};
use crate::persistence::{
    MigrationStore, PersistenceResult, PolicyAdminStore, PolicySession, PolicyStore,
    QueryBackend, SessionFactory,
};
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration, migrations};

const MIGRATIONS_TABLE: &str = "seedgen_schema_migrations";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const POLICY_RECORD_COLUMNS: &str =
    "policy_id, data_source_type, description, enabled, created_at_unix, updated_at_unix";
const GENERATION_CONFIG_COLUMNS: &str =
    "policy_id, query_text, cron_expression, task_kind, created_at_unix, updated_at_unix";
const SEED_TASK_COLUMNS: &str =
    "task_id, policy_id, task_kind, task_params, consumed, created_at_unix, updated_at_unix";
const TASK_SOURCE_COLUMNS: &str =
    "source_id, source_name, url, parse_template, enabled, created_at_unix, updated_at_unix";

/// SQLite-backed policy store. Holds only the database path; every session
/// gets its own connection.
pub struct SqliteStore {
    database_path: PathBuf,
}

/// One connection to the store, owned by a single unit of work. Dropping the
/// session closes the connection.
pub struct SqliteSession {
    connection: Connection,
}

impl SqliteStore {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn planned_migrations(&self, from_version: i64) -> Vec<&'static SqliteMigration> {
        migrations()
            .iter()
            .filter(|entry| entry.version > from_version)
            .collect()
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    pub fn session(&self) -> PersistenceResult<SqliteSession> {
        let connection = open_connection(&self.database_path)
            .map_err(|error| storage_error("open_session", error))?;
        ensure_schema_ready(&connection).map_err(|error| storage_error("open_session", error))?;
        Ok(SqliteSession { connection })
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = open_connection(&self.database_path)
            .map_err(|error| storage_error(operation_name, error))?;
        operation(&mut connection).map_err(|error| storage_error(operation_name, error))
    }
}

impl SessionFactory for SqliteStore {
    fn open_session(&self) -> PersistenceResult<Box<dyn PolicySession>> {
        Ok(Box::new(self.session()?))
    }
}

impl MigrationStore for SqliteStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        if target_version < 0 || target_version > current_schema_version() {
            return Err(storage_error_text(
                "apply_migration",
                format!("invalid migration target version '{target_version}'"),
            ));
        }

        self.with_connection("apply_migration", |connection| {
            ensure_migrations_table(connection)?;
            let current_version = read_current_version(connection)?;

            if target_version == current_version {
                // Versions may be recorded while tables are missing; all DDL is
                // IF NOT EXISTS so replaying it is harmless.
                for entry in migrations()
                    .iter()
                    .filter(|entry| entry.version <= target_version)
                {
                    connection.execute_batch(entry.up_sql)?;
                }
                return Ok(());
            }

            if target_version > current_version {
                for version in (current_version + 1)..=target_version {
                    apply_up_migration(connection, lookup_migration(version)?)?;
                }
            } else {
                for version in ((target_version + 1)..=current_version).rev() {
                    apply_down_migration(connection, lookup_migration(version)?)?;
                }
            }

            Ok(())
        })
    }
}

impl SqliteSession {
    fn run<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        operation(&self.connection).map_err(|error| storage_error(operation_name, error))
    }

    fn seed_task_by_id(&self, task_id: i64) -> PersistenceResult<Option<SeedTask>> {
        self.run("seed_task_by_id", |connection| {
            connection
                .query_row(
                    &format!("SELECT {SEED_TASK_COLUMNS} FROM seed_tasks WHERE task_id = ?1"),
                    [task_id],
                    read_seed_task,
                )
                .optional()
        })
    }

    fn task_source_by_id(&self, source_id: i64) -> PersistenceResult<Option<TaskSource>> {
        self.run("task_source_by_id", |connection| {
            connection
                .query_row(
                    &format!("SELECT {TASK_SOURCE_COLUMNS} FROM task_sources WHERE source_id = ?1"),
                    [source_id],
                    read_task_source,
                )
                .optional()
        })
    }
}

impl PolicyStore for SqliteSession {
    fn policy_record(&self, policy_id: &str) -> PersistenceResult<Option<PolicyRecord>> {
        self.run("policy_record", |connection| {
            connection
                .query_row(
                    &format!("SELECT {POLICY_RECORD_COLUMNS} FROM policy_records WHERE policy_id = ?1"),
                    [policy_id],
                    read_policy_record,
                )
                .optional()
        })
    }

    fn generation_config(
        &self,
        policy_id: &str,
    ) -> PersistenceResult<Option<PolicyGenerationConfig>> {
        self.run("generation_config", |connection| {
            connection
                .query_row(
                    &format!(
                        "SELECT {GENERATION_CONFIG_COLUMNS} FROM policy_generation_configs WHERE policy_id = ?1"
                    ),
                    [policy_id],
                    read_generation_config,
                )
                .optional()
        })
    }

    fn list_generation_configs(&self) -> PersistenceResult<Vec<PolicyGenerationConfig>> {
        self.run("list_generation_configs", |connection| {
            let mut statement = connection.prepare(&format!(
                "SELECT {GENERATION_CONFIG_COLUMNS} FROM policy_generation_configs ORDER BY policy_id"
            ))?;
            let rows = statement.query_map([], read_generation_config)?;
            rows.collect()
        })
    }

    fn list_enabled_generation_configs(&self) -> PersistenceResult<Vec<PolicyGenerationConfig>> {
        self.run("list_enabled_generation_configs", |connection| {
            let mut statement = connection.prepare(
                "
SELECT
    gc.policy_id,
    gc.query_text,
    gc.cron_expression,
    gc.task_kind,
    gc.created_at_unix,
    gc.updated_at_unix
FROM policy_generation_configs gc
JOIN policy_records pr
    ON pr.policy_id = gc.policy_id
WHERE pr.enabled = 1
ORDER BY gc.policy_id
",
            )?;
            let rows = statement.query_map([], read_generation_config)?;
            rows.collect()
        })
    }

    fn create_seed_task(&self, task: &NewSeedTask) -> PersistenceResult<SeedTask> {
        let params_json = serde_json::to_string(&task.params).map_err(|error| {
            storage_error_text("create_seed_task", format!("unserializable task params: {error}"))
        })?;

        let task_id = self.run("create_seed_task", |connection| {
            connection.execute(
                "
INSERT INTO seed_tasks (policy_id, task_kind, task_params, consumed, created_at_unix)
VALUES (?1, ?2, ?3, 0, strftime('%s', 'now'))
",
                params![task.policy_id, task.kind.as_str(), params_json],
            )?;
            Ok(connection.last_insert_rowid())
        })?;

        self.seed_task_by_id(task_id)?.ok_or_else(|| {
            storage_error_text(
                "create_seed_task",
                format!("seed task '{task_id}' vanished after insert"),
            )
        })
    }

    fn list_pending_seed_tasks(
        &self,
        policy_id: Option<&str>,
    ) -> PersistenceResult<Vec<SeedTask>> {
        self.run("list_pending_seed_tasks", |connection| {
            let mut statement = connection.prepare(&format!(
                "
SELECT {SEED_TASK_COLUMNS}
FROM seed_tasks
WHERE consumed = 0
  AND (?1 IS NULL OR policy_id = ?1)
ORDER BY task_id
"
            ))?;
            let rows = statement.query_map([policy_id], read_seed_task)?;
            rows.collect()
        })
    }

    fn mark_seed_task_consumed(&self, task_id: SeedTaskId) -> PersistenceResult<Option<SeedTask>> {
        let raw_id = seed_task_id_to_i64(task_id)
            .map_err(|error| storage_error("mark_seed_task_consumed", error))?;

        self.run("mark_seed_task_consumed", |connection| {
            connection.execute(
                "
UPDATE seed_tasks
SET consumed = 1,
    updated_at_unix = strftime('%s', 'now')
WHERE task_id = ?1 AND consumed = 0
",
                [raw_id],
            )?;
            Ok(())
        })?;

        self.seed_task_by_id(raw_id)
    }
}

impl PolicyAdminStore for SqliteSession {
    fn create_policy_record(&self, record: &NewPolicyRecord) -> PersistenceResult<PolicyRecord> {
        if record.policy_id.trim().is_empty() {
            return Err(invalid_input("policy_id must not be empty"));
        }
        if self.policy_record(&record.policy_id)?.is_some() {
            return Err(invalid_input(format!(
                "policy '{}' already exists",
                record.policy_id
            ))
            .for_policy(&record.policy_id));
        }

        self.run("create_policy_record", |connection| {
            connection.execute(
                "
INSERT INTO policy_records (policy_id, data_source_type, description, enabled, created_at_unix)
VALUES (?1, ?2, ?3, ?4, strftime('%s', 'now'))
",
                params![
                    record.policy_id,
                    record.data_source_type,
                    record.description,
                    bool_to_sqlite(record.enabled),
                ],
            )?;
            Ok(())
        })?;

        self.policy_record(&record.policy_id)?.ok_or_else(|| {
            storage_error_text(
                "create_policy_record",
                format!("policy '{}' vanished after insert", record.policy_id),
            )
        })
    }

    fn set_policy_enabled(
        &self,
        policy_id: &str,
        enabled: bool,
    ) -> PersistenceResult<Option<PolicyRecord>> {
        let updated = self.run("set_policy_enabled", |connection| {
            connection.execute(
                "
UPDATE policy_records
SET enabled = ?2,
    updated_at_unix = strftime('%s', 'now')
WHERE policy_id = ?1
",
                params![policy_id, bool_to_sqlite(enabled)],
            )
        })?;

        if updated == 0 {
            return Ok(None);
        }
        self.policy_record(policy_id)
    }

    fn list_policy_records(
        &self,
        offset: usize,
        limit: usize,
    ) -> PersistenceResult<Vec<PolicyRecord>> {
        self.run("list_policy_records", |connection| {
            let mut statement = connection.prepare(&format!(
                "SELECT {POLICY_RECORD_COLUMNS} FROM policy_records ORDER BY policy_id LIMIT ?1 OFFSET ?2"
            ))?;
            let rows =
                statement.query_map(params![to_i64(limit)?, to_i64(offset)?], read_policy_record)?;
            rows.collect()
        })
    }

    fn create_generation_config(
        &self,
        config: &NewPolicyGenerationConfig,
    ) -> PersistenceResult<PolicyGenerationConfig> {
        if config.query.trim().is_empty() {
            return Err(invalid_input("generation query must not be empty").for_policy(&config.policy_id));
        }
        if self.generation_config(&config.policy_id)?.is_some() {
            return Err(invalid_input(format!(
                "policy '{}' already has a generation config",
                config.policy_id
            ))
            .for_policy(&config.policy_id));
        }

        self.run("create_generation_config", |connection| {
            connection.execute(
                "
INSERT INTO policy_generation_configs (
    policy_id, query_text, cron_expression, task_kind, created_at_unix
) VALUES (?1, ?2, ?3, ?4, strftime('%s', 'now'))
",
                params![
                    config.policy_id,
                    config.query,
                    config.cron_expression.trim(),
                    config.kind.as_str(),
                ],
            )?;
            Ok(())
        })?;

        self.generation_config(&config.policy_id)?.ok_or_else(|| {
            storage_error_text(
                "create_generation_config",
                format!("generation config for '{}' vanished after insert", config.policy_id),
            )
        })
    }

    fn list_seed_tasks(&self, offset: usize, limit: usize) -> PersistenceResult<Vec<SeedTask>> {
        self.run("list_seed_tasks", |connection| {
            let mut statement = connection.prepare(&format!(
                "SELECT {SEED_TASK_COLUMNS} FROM seed_tasks ORDER BY task_id LIMIT ?1 OFFSET ?2"
            ))?;
            let rows =
                statement.query_map(params![to_i64(limit)?, to_i64(offset)?], read_seed_task)?;
            rows.collect()
        })
    }

    fn create_task_source(&self, source: &NewTaskSource) -> PersistenceResult<TaskSource> {
        let source_name = source.source_name.trim();
        let url = source.url.trim();
        if source_name.is_empty() || url.is_empty() {
            return Err(invalid_input("task source name and url must not be empty"));
        }
        let template_json = source
            .parse_template
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| {
                invalid_input(format!("unserializable parse template: {error}"))
            })?;

        let existing = self.run("create_task_source", |connection| {
            connection
                .query_row(
                    "SELECT source_id FROM task_sources WHERE source_name = ?1 AND url = ?2",
                    params![source_name, url],
                    |row| row.get::<_, i64>(0),
                )
                .optional()
        })?;
        if existing.is_some() {
            return Err(invalid_input(format!(
                "task source '{source_name}' is already registered for {url}"
            )));
        }

        let source_id = self.run("create_task_source", |connection| {
            connection.execute(
                "
INSERT INTO task_sources (source_name, url, parse_template, enabled, created_at_unix)
VALUES (?1, ?2, ?3, ?4, strftime('%s', 'now'))
",
                params![source_name, url, template_json, bool_to_sqlite(source.enabled)],
            )?;
            Ok(connection.last_insert_rowid())
        })?;

        self.task_source_by_id(source_id)?.ok_or_else(|| {
            storage_error_text(
                "create_task_source",
                format!("task source '{source_id}' vanished after insert"),
            )
        })
    }

    fn list_task_sources(&self, offset: usize, limit: usize) -> PersistenceResult<Vec<TaskSource>> {
        self.run("list_task_sources", |connection| {
            let mut statement = connection.prepare(&format!(
                "SELECT {TASK_SOURCE_COLUMNS} FROM task_sources ORDER BY source_id LIMIT ?1 OFFSET ?2"
            ))?;
            let rows =
                statement.query_map(params![to_i64(limit)?, to_i64(offset)?], read_task_source)?;
            rows.collect()
        })
    }

    fn set_task_source_enabled(
        &self,
        source_id: TaskSourceId,
        enabled: bool,
    ) -> PersistenceResult<Option<TaskSource>> {
        let Ok(raw_id) = i64::try_from(source_id.0) else {
            return Ok(None);
        };

        let updated = self.run("set_task_source_enabled", |connection| {
            connection.execute(
                "
UPDATE task_sources
SET enabled = ?2,
    updated_at_unix = strftime('%s', 'now')
WHERE source_id = ?1
",
                params![raw_id, bool_to_sqlite(enabled)],
            )
        })?;

        if updated == 0 {
            return Ok(None);
        }
        self.task_source_by_id(raw_id)
    }
}

impl QueryBackend for SqliteSession {
    fn fetch_rows(&self, query: &str) -> PersistenceResult<Vec<QueryRow>> {
        if query.trim().is_empty() {
            return Err(CoreError::new(
                CoreErrorKind::QueryFailure,
                "policy query text is empty",
            ));
        }

        let mut statement = self.connection.prepare(query).map_err(query_error)?;
        if !statement.readonly() {
            return Err(CoreError::new(
                CoreErrorKind::QueryFailure,
                "policy query must be a read-only statement",
            ));
        }

        let columns: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = statement.query([]).map_err(query_error)?;
        let mut output = Vec::new();
        while let Some(row) = rows.next().map_err(query_error)? {
            let mut values = Vec::with_capacity(columns.len());
            for (index, column) in columns.iter().enumerate() {
                let value = row.get_ref(index).map_err(query_error)?;
                values.push((column.clone(), column_value(value)));
            }
            output.push(values);
        }

        Ok(output)
    }
}

fn open_connection(database_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    let connection = Connection::open(database_path)?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    let _journal_mode: String =
        connection.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    Ok(connection)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(
        "
CREATE TABLE IF NOT EXISTS seedgen_schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
",
    )?;
    Ok(())
}

fn ensure_schema_ready(connection: &Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(connection)?;
    let version = read_current_version(connection)?;
    if version <= 0 {
        return Err(storage_error_sqlite(
            "database schema is not initialized; apply migrations before opening sessions",
        ));
    }
    Ok(())
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn lookup_migration(version: i64) -> rusqlite::Result<&'static SqliteMigration> {
    migration(version).ok_or_else(|| {
        storage_error_sqlite(&format!("migration version '{version}' is not defined"))
    })
}

fn apply_up_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.up_sql)?;
    transaction.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    transaction.commit()?;
    Ok(())
}

fn apply_down_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.down_sql)?;
    transaction.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    transaction.commit()?;
    Ok(())
}

fn read_policy_record(row: &Row<'_>) -> rusqlite::Result<PolicyRecord> {
    let enabled_int: i64 = row.get(3)?;
    let created_at_unix: i64 = row.get(4)?;
    let updated_at_unix: Option<i64> = row.get(5)?;

    Ok(PolicyRecord {
        policy_id: row.get(0)?,
        data_source_type: row.get(1)?,
        description: row.get(2)?,
        enabled: sqlite_to_bool(enabled_int),
        created_at: from_unix_seconds(created_at_unix)?,
        updated_at: updated_at_unix.map(from_unix_seconds).transpose()?,
    })
}

fn read_generation_config(row: &Row<'_>) -> rusqlite::Result<PolicyGenerationConfig> {
    let kind_raw: String = row.get(3)?;
    let created_at_unix: i64 = row.get(4)?;
    let updated_at_unix: Option<i64> = row.get(5)?;

    Ok(PolicyGenerationConfig {
        policy_id: row.get(0)?,
        query: row.get(1)?,
        cron_expression: row.get(2)?,
        kind: parse_task_kind(&kind_raw)?,
        created_at: from_unix_seconds(created_at_unix)?,
        updated_at: updated_at_unix.map(from_unix_seconds).transpose()?,
    })
}

fn read_seed_task(row: &Row<'_>) -> rusqlite::Result<SeedTask> {
    let task_id: i64 = row.get(0)?;
    let kind_raw: String = row.get(2)?;
    let params_raw: String = row.get(3)?;
    let consumed_int: i64 = row.get(4)?;
    let created_at_unix: i64 = row.get(5)?;
    let updated_at_unix: Option<i64> = row.get(6)?;

    let params: TaskParams = serde_json::from_str(&params_raw).map_err(|error| {
        storage_error_sqlite(&format!(
            "seed task '{task_id}' has malformed task_params: {error}"
        ))
    })?;

    Ok(SeedTask {
        id: SeedTaskId(row_id_to_u64(task_id)?),
        policy_id: row.get(1)?,
        kind: parse_task_kind(&kind_raw)?,
        params,
        consumed: sqlite_to_bool(consumed_int),
        created_at: from_unix_seconds(created_at_unix)?,
        updated_at: updated_at_unix.map(from_unix_seconds).transpose()?,
    })
}

fn read_task_source(row: &Row<'_>) -> rusqlite::Result<TaskSource> {
    let source_id: i64 = row.get(0)?;
    let template_raw: Option<String> = row.get(3)?;
    let enabled_int: i64 = row.get(4)?;
    let created_at_unix: i64 = row.get(5)?;
    let updated_at_unix: Option<i64> = row.get(6)?;

    let parse_template = template_raw
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|error| {
            storage_error_sqlite(&format!(
                "task source '{source_id}' has malformed parse_template: {error}"
            ))
        })?;

    Ok(TaskSource {
        id: TaskSourceId(row_id_to_u64(source_id)?),
        source_name: row.get(1)?,
        url: row.get(2)?,
        parse_template,
        enabled: sqlite_to_bool(enabled_int),
        created_at: from_unix_seconds(created_at_unix)?,
        updated_at: updated_at_unix.map(from_unix_seconds).transpose()?,
    })
}

fn column_value(value: ValueRef<'_>) -> ColumnValue {
    match value {
        ValueRef::Null => ColumnValue::Null,
        ValueRef::Integer(value) => ColumnValue::Integer(value),
        ValueRef::Real(value) => ColumnValue::Real(value),
        ValueRef::Text(bytes) => ColumnValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => ColumnValue::Blob(bytes.to_vec()),
    }
}

fn parse_task_kind(raw: &str) -> rusqlite::Result<TaskKind> {
    raw.parse::<TaskKind>().map_err(|_| {
        storage_error_sqlite(&format!("unknown task kind '{raw}' in sqlite record"))
    })
}

fn bool_to_sqlite(value: bool) -> i64 {
    if value { 1 } else { 0 }
}

fn sqlite_to_bool(value: i64) -> bool {
    value != 0
}

fn from_unix_seconds(value: i64) -> rusqlite::Result<SystemTime> {
    u64::try_from(value)
        .map(|seconds| UNIX_EPOCH + Duration::from_secs(seconds))
        .map_err(|_| storage_error_sqlite(&format!("timestamp {value} predates the unix epoch")))
}

fn seed_task_id_to_i64(value: SeedTaskId) -> rusqlite::Result<i64> {
    i64::try_from(value.0).map_err(|_| storage_error_sqlite("seed task id exceeds i64 range"))
}

fn row_id_to_u64(value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|_| storage_error_sqlite(&format!("negative row id {value}")))
}

fn to_i64(value: usize) -> rusqlite::Result<i64> {
    i64::try_from(value).map_err(|_| storage_error_sqlite("value exceeds i64 range"))
}

fn storage_error(operation: &str, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, error.to_string())
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

fn storage_error_text(operation: &str, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("sqlite store '{operation}' failed: {}", message.as_ref()),
    )
}

fn query_error(error: rusqlite::Error) -> CoreError {
    CoreError::new(
        CoreErrorKind::QueryFailure,
        format!("policy query failed: {error}"),
    )
}

fn invalid_input(message: impl Into<String>) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidInput, message)
}
