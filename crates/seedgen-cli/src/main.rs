mod console;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use seedgen_core::config::{self, ServiceConfig};
use seedgen_core::generation;
use seedgen_core::models::{
    NewPolicyGenerationConfig, NewPolicyRecord, NewTaskSource, SeedTaskId, TaskKind, TaskSourceId,
};
use seedgen_core::persistence::{MigrationStore, PolicyAdminStore, PolicyStore};
use seedgen_core::scheduling::CronSchedule;
use seedgen_core::sqlite::{SqliteStore, current_schema_version};

#[derive(Parser)]
#[command(name = "seedgen")]
#[command(about = "Generates seed tasks from policy queries on cron schedules")]
#[command(version)]
struct Cli {
    /// SQLite database holding policies and seed tasks
    #[arg(long, global = true, env = "SEEDGEN_DATABASE_PATH")]
    database: Option<PathBuf>,

    /// Default log filter; RUST_LOG takes precedence
    #[arg(long, global = true, env = "SEEDGEN_LOG")]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Manage policy records
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },
    /// Manage policy generation configs
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Manage upstream task sources
    Sources {
        #[command(subcommand)]
        command: SourcesCommand,
    },
    /// Inspect and consume seed tasks
    Tasks {
        #[command(subcommand)]
        command: TasksCommand,
    },
    /// Run generation for one policy now
    Generate { policy_id: String },
    /// List the supported task kinds
    Kinds,
    /// Run the scheduler with a JSON console on stdin/stdout
    Serve,
}

#[derive(Subcommand)]
enum PolicyCommand {
    Add {
        policy_id: String,
        #[arg(long, default_value = "sqlite")]
        source: String,
        #[arg(long)]
        description: Option<String>,
        /// Create the policy disabled
        #[arg(long)]
        disabled: bool,
    },
    List {
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    Enable { policy_id: String },
    Disable { policy_id: String },
}

#[derive(Subcommand)]
enum ConfigCommand {
    Add {
        policy_id: String,
        /// Read-only query whose rows become seed tasks
        #[arg(long)]
        query: String,
        /// 5-field cron expression; required for scheduled policies
        #[arg(long, default_value = "")]
        cron: String,
        #[arg(long, value_parser = parse_kind, default_value = "scheduled")]
        kind: TaskKind,
    },
    List,
}

#[derive(Subcommand)]
enum SourcesCommand {
    Add {
        name: String,
        url: String,
        /// JSON object describing how to parse the source
        #[arg(long, value_parser = parse_template)]
        template: Option<serde_json::Value>,
        /// Register the source disabled
        #[arg(long)]
        disabled: bool,
    },
    List {
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    Enable { source_id: u64 },
    Disable { source_id: u64 },
}

#[derive(Subcommand)]
enum TasksCommand {
    List {
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Unconsumed tasks, optionally for one policy
    Pending {
        #[arg(long)]
        policy: Option<String>,
    },
    Consume { task_id: u64 },
}

fn parse_kind(value: &str) -> Result<TaskKind, String> {
    value.parse().map_err(|()| {
        let known: Vec<&str> = TaskKind::ALL.iter().map(|kind| kind.as_str()).collect();
        format!("unknown task kind '{value}' (expected one of: {})", known.join(", "))
    })
}

fn parse_template(value: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(value).map_err(|error| format!("invalid JSON template: {error}"))
}

fn main() -> Result<()> {
    config::load_dotenv();
    let cli = Cli::parse();

    let defaults = ServiceConfig::from_env();
    let service = ServiceConfig {
        database_path: cli.database.unwrap_or(defaults.database_path),
        log_filter: cli.log.unwrap_or(defaults.log_filter),
        scheduler: defaults.scheduler,
    };
    seedgen_core::logging::init_tracing(&service.log_filter);

    let store = SqliteStore::new(&service.database_path);
    store.migrate_to_latest().with_context(|| {
        format!(
            "failed to migrate database {}",
            service.database_path.display()
        )
    })?;

    match cli.command {
        Commands::Migrate => print_json(&serde_json::json!({
            "database": service.database_path,
            "schema_version": store.current_version()?,
            "latest_version": current_schema_version(),
        })),
        Commands::Policy { command } => run_policy(&store, command),
        Commands::Config { command } => run_config(&store, command),
        Commands::Sources { command } => run_sources(&store, command),
        Commands::Tasks { command } => run_tasks(&store, command),
        Commands::Generate { policy_id } => {
            let outcome = generation::trigger_generation(&store, &policy_id);
            print_json(&outcome)?;
            if !outcome.success {
                bail!(outcome.message);
            }
            Ok(())
        }
        Commands::Kinds => {
            let kinds: Vec<&str> = TaskKind::ALL.iter().map(|kind| kind.as_str()).collect();
            print_json(&kinds)
        }
        Commands::Serve => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to build tokio runtime")?;
            tracing::info!(
                database = %service.database_path.display(),
                "starting seedgen scheduler"
            );
            runtime.block_on(console::serve(Arc::new(store), service.scheduler))
        }
    }
}

fn run_policy(store: &SqliteStore, command: PolicyCommand) -> Result<()> {
    let session = store.session()?;
    match command {
        PolicyCommand::Add {
            policy_id,
            source,
            description,
            disabled,
        } => {
            let record = session.create_policy_record(&NewPolicyRecord {
                policy_id,
                data_source_type: source,
                description,
                enabled: !disabled,
            })?;
            print_json(&record)
        }
        PolicyCommand::List { offset, limit } => {
            print_json(&session.list_policy_records(offset, limit)?)
        }
        PolicyCommand::Enable { policy_id } => set_enabled(store, &policy_id, true),
        PolicyCommand::Disable { policy_id } => set_enabled(store, &policy_id, false),
    }
}

// A running `serve` process picks the change up on its next reconciliation
// cycle.
fn set_enabled(store: &SqliteStore, policy_id: &str, enabled: bool) -> Result<()> {
    match store.session()?.set_policy_enabled(policy_id, enabled)? {
        Some(record) => print_json(&record),
        None => bail!("policy '{policy_id}' not found"),
    }
}

fn run_config(store: &SqliteStore, command: ConfigCommand) -> Result<()> {
    let session = store.session()?;
    match command {
        ConfigCommand::Add {
            policy_id,
            query,
            cron,
            kind,
        } => {
            if kind == TaskKind::Scheduled {
                CronSchedule::parse(&cron)?;
            }
            let config = session.create_generation_config(&NewPolicyGenerationConfig {
                policy_id,
                query,
                cron_expression: cron,
                kind,
            })?;
            print_json(&config)
        }
        ConfigCommand::List => print_json(&session.list_generation_configs()?),
    }
}

fn run_sources(store: &SqliteStore, command: SourcesCommand) -> Result<()> {
    let session = store.session()?;
    let (source_id, enabled) = match command {
        SourcesCommand::Add {
            name,
            url,
            template,
            disabled,
        } => {
            let source = session.create_task_source(&NewTaskSource {
                source_name: name,
                url,
                parse_template: template,
                enabled: !disabled,
            })?;
            return print_json(&source);
        }
        SourcesCommand::List { offset, limit } => {
            return print_json(&session.list_task_sources(offset, limit)?);
        }
        SourcesCommand::Enable { source_id } => (source_id, true),
        SourcesCommand::Disable { source_id } => (source_id, false),
    };

    match session.set_task_source_enabled(TaskSourceId(source_id), enabled)? {
        Some(source) => print_json(&source),
        None => bail!("task source {source_id} not found"),
    }
}

fn run_tasks(store: &SqliteStore, command: TasksCommand) -> Result<()> {
    let session = store.session()?;
    match command {
        TasksCommand::List { offset, limit } => print_json(&session.list_seed_tasks(offset, limit)?),
        TasksCommand::Pending { policy } => {
            print_json(&session.list_pending_seed_tasks(policy.as_deref())?)
        }
        TasksCommand::Consume { task_id } => {
            match session.mark_seed_task_consumed(SeedTaskId(task_id))? {
                Some(task) => print_json(&task),
                None => bail!("seed task {task_id} not found"),
            }
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
