//! Coxswain CLI - coordinates agents over a task board and artifact store.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use coxswain::agents::Roster;
use coxswain::board::Board;
use coxswain::cli::{
    AgentCommands, ArtifactCommands, BlockerCommands, Cli, Commands, ContextCommands,
    SprintCommands, SystemCommands, TaskCommands,
};
use coxswain::context::ContextStore;
use coxswain::models::{ArtifactDraft, SettingValue, TaskFilter};
use coxswain::{Error, Result};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let human = cli.human_readable;

    let result = resolve_data_dir(cli.data_dir).and_then(|dir| run_command(cli.command, &dir, human));

    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            let payload = serde_json::json!({ "error": e.to_string() });
            eprintln!("{}", payload);
        }
        process::exit(1);
    }
}

/// Data directory priority: --data-dir flag / COX_DATA_DIR env (both via
/// clap), then the platform default.
fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir),
        None => coxswain::default_data_dir(),
    }
}

/// Print a command result: compact JSON by default, pretty-printed with -H.
fn emit<T: serde::Serialize>(value: &T, human: bool) -> Result<()> {
    let text = if human {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}

fn run_command(command: Commands, data_dir: &PathBuf, human: bool) -> Result<()> {
    match command {
        Commands::System { command } => match command {
            SystemCommands::Init {
                project_name,
                roster,
            } => {
                let mut board = Board::open(data_dir)?;
                let mut store = ContextStore::open(data_dir)?;

                if let Some(name) = project_name {
                    let mut updates = BTreeMap::new();
                    updates.insert("project_name".to_string(), SettingValue::String(name));
                    store.update_settings(&updates, "system")?;
                }

                let mut registered = 0;
                if let Some(path) = roster {
                    let roster = Roster::load(&path)?;
                    for spec in roster.specs() {
                        board.upsert_agent(
                            &spec.id,
                            &spec.name,
                            spec.role,
                            spec.availability,
                            spec.max_concurrent_tasks,
                        )?;
                        registered += 1;
                    }
                }

                emit(
                    &serde_json::json!({
                        "initialized": true,
                        "data_dir": data_dir,
                        "agents_registered": registered,
                    }),
                    human,
                )
            }
        },

        Commands::Sprint { command } => {
            let mut board = Board::open(data_dir)?;
            match command {
                SprintCommands::Create {
                    id,
                    name,
                    goal,
                    start,
                    end,
                } => {
                    let sprint = board.create_sprint(&id, &name, goal.as_deref(), &start, &end)?;
                    emit(&sprint, human)
                }
                SprintCommands::Show { id } => emit(&board.get_sprint(&id)?, human),
                SprintCommands::Metrics { id } => emit(&board.get_sprint_metrics(&id)?, human),
            }
        }

        Commands::Task { command } => {
            let mut board = Board::open(data_dir)?;
            match command {
                TaskCommands::Create {
                    sprint,
                    title,
                    description,
                    priority,
                    estimate,
                    depends_on,
                } => {
                    let task = board.create_task(
                        &sprint,
                        &title,
                        description.as_deref(),
                        priority,
                        estimate,
                        &depends_on,
                    )?;
                    emit(&task, human)
                }
                TaskCommands::Show { id } => emit(&board.get_task(&id)?, human),
                TaskCommands::List {
                    sprint,
                    status,
                    agent,
                    limit,
                } => {
                    let filter = TaskFilter {
                        sprint_id: sprint,
                        status,
                        assigned_agent: agent,
                    };
                    emit(&board.query_tasks(&filter, limit)?, human)
                }
                TaskCommands::Status {
                    id,
                    status,
                    actor,
                    comment,
                } => {
                    let task = board.update_status(&id, status, &actor, comment.as_deref())?;
                    emit(&task, human)
                }
                TaskCommands::Assign { id, agent, actor } => {
                    emit(&board.assign_task(&id, &agent, &actor)?, human)
                }
                TaskCommands::History { id } => emit(&board.get_task_history(&id)?, human),
            }
        }

        Commands::Blocker { command } => {
            let mut board = Board::open(data_dir)?;
            match command {
                BlockerCommands::Add {
                    task,
                    kind,
                    description,
                    blocking_task,
                } => {
                    let blocker =
                        board.add_blocker(&task, kind, &description, blocking_task.as_deref())?;
                    emit(&blocker, human)
                }
                BlockerCommands::Resolve { id, notes, by } => {
                    emit(&board.resolve_blocker(&id, &notes, &by)?, human)
                }
                BlockerCommands::Escalate { id } => emit(&board.escalate_blocker(&id)?, human),
                BlockerCommands::List { sprint } => {
                    emit(&board.get_active_blockers(sprint.as_deref())?, human)
                }
            }
        }

        Commands::Agent { command } => {
            let mut board = Board::open(data_dir)?;
            match command {
                AgentCommands::Register {
                    id,
                    name,
                    role,
                    availability,
                    max_concurrent,
                } => {
                    let agent = board.upsert_agent(
                        &id,
                        &name,
                        role.parse()?,
                        availability.parse()?,
                        max_concurrent,
                    )?;
                    emit(&agent, human)
                }
                AgentCommands::List => emit(&board.list_agents()?, human),
                AgentCommands::Workload { id } => emit(&board.get_agent_workload(&id)?, human),
            }
        }

        Commands::Artifact { command } => {
            let mut store = ContextStore::open(data_dir)?;
            match command {
                ArtifactCommands::Store {
                    agent,
                    name,
                    file,
                    artifact_type,
                    description,
                } => {
                    let content = match file {
                        Some(path) => std::fs::read_to_string(path)?,
                        None => std::io::read_to_string(std::io::stdin())?,
                    };
                    let receipt = store.store_artifacts(
                        &agent,
                        &[ArtifactDraft {
                            name,
                            artifact_type: artifact_type.parse()?,
                            content,
                            description,
                        }],
                    )?;
                    emit(&receipt, human)
                }
                ArtifactCommands::Show { id, requestor } => {
                    emit(&store.get_artifact(&requestor, &id)?, human)
                }
                ArtifactCommands::List { agent, version } => {
                    emit(&store.list_artifacts(&agent, version)?, human)
                }
            }
        }

        Commands::Context { command } => {
            let mut store = ContextStore::open(data_dir)?;
            match command {
                ContextCommands::Assemble {
                    agent,
                    task,
                    max_tokens,
                } => emit(
                    &store.assemble_context(&agent, task.as_deref(), max_tokens)?,
                    human,
                ),
                ContextCommands::Settings => emit(&store.get_settings()?, human),
                ContextCommands::Set {
                    key,
                    value,
                    value_type,
                    by,
                } => {
                    let typed = SettingValue::from_db(&value_type, &value)?;
                    let mut updates = BTreeMap::new();
                    updates.insert(key.clone(), typed);
                    store.update_settings(&updates, &by)?;
                    let current = store
                        .get_setting(&key)?
                        .ok_or_else(|| Error::NotFound(format!("Setting not found: {}", key)))?;
                    emit(&serde_json::json!({ "key": key, "value": current }), human)
                }
                ContextCommands::Version {
                    description,
                    by,
                    parent,
                } => emit(
                    &store.create_version(description.as_deref(), &by, parent)?,
                    human,
                ),
            }
        }

        Commands::History {
            agent,
            status,
            sprint,
            limit,
        } => {
            let store = ContextStore::open(data_dir)?;
            let status = status.map(|s| s.parse()).transpose()?;
            emit(
                &store.query_history(agent.as_deref(), status, sprint.as_deref(), limit)?,
                human,
            )
        }
    }
}
