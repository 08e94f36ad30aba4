//! CLI argument definitions for Coxswain.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::{BlockerKind, TaskStatus};

/// Coxswain - a shared task board and artifact store for prompt-driven agents.
#[derive(Parser, Debug)]
#[command(name = "cox")]
#[command(author, version, about = "Coordinate agents over a task board and versioned artifact store", long_about = None)]
pub struct Cli {
    /// Output in human-readable (pretty-printed) format instead of compact JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Data directory for coxswain state.
    /// Can also be set via COX_DATA_DIR environment variable.
    #[arg(short = 'C', long = "data-dir", global = true, env = "COX_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// System-level commands
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },

    /// Sprint management commands
    Sprint {
        #[command(subcommand)]
        command: SprintCommands,
    },

    /// Task management commands
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Blocker management commands
    Blocker {
        #[command(subcommand)]
        command: BlockerCommands,
    },

    /// Agent registry commands
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },

    /// Artifact store commands
    Artifact {
        #[command(subcommand)]
        command: ArtifactCommands,
    },

    /// Context settings and assembly commands
    Context {
        #[command(subcommand)]
        command: ContextCommands,
    },

    /// Query the execution history ledger
    History {
        /// Filter by agent id
        #[arg(long)]
        agent: Option<String>,

        /// Filter by execution status (started, completed, failed)
        #[arg(long)]
        status: Option<String>,

        /// Filter by sprint id
        #[arg(long)]
        sprint: Option<String>,

        /// Maximum entries to return
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum SystemCommands {
    /// Initialize the data directory and databases
    Init {
        /// Project name to record in settings
        #[arg(long)]
        project_name: Option<String>,

        /// Roster file; registered agents are seeded from it
        #[arg(long)]
        roster: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum SprintCommands {
    /// Create a sprint
    Create {
        /// Sprint id, e.g. S1
        id: String,

        /// Sprint name
        name: String,

        /// Sprint goal
        #[arg(long)]
        goal: Option<String>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: String,
    },

    /// Show a sprint with per-status task counts
    Show { id: String },

    /// Show sprint completion and effort metrics
    Metrics { id: String },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task in a sprint
    Create {
        /// Sprint id
        sprint: String,

        /// Task title
        title: String,

        /// Task description
        #[arg(long)]
        description: Option<String>,

        /// Priority (lower is more urgent)
        #[arg(long, default_value = "100")]
        priority: i64,

        /// Estimated hours
        #[arg(long)]
        estimate: Option<f64>,

        /// Task ids this task depends on (repeatable)
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
    },

    /// Show a task with dependencies and active blockers
    Show { id: String },

    /// List tasks, most urgent first
    List {
        /// Filter by sprint id
        #[arg(long)]
        sprint: Option<String>,

        /// Filter by status
        #[arg(long)]
        status: Option<TaskStatus>,

        /// Filter by assigned agent
        #[arg(long)]
        agent: Option<String>,

        /// Maximum tasks to return
        #[arg(long, default_value = "100")]
        limit: usize,
    },

    /// Change a task's status (validated against the transition table)
    Status {
        /// Task id
        id: String,

        /// New status (todo, in-progress, blocked, in-qa, done)
        status: TaskStatus,

        /// Who is making the change
        #[arg(long, default_value = "cli")]
        actor: String,

        /// Optional comment recorded with the change
        #[arg(long)]
        comment: Option<String>,
    },

    /// Assign a task to a registered agent
    Assign {
        /// Task id
        id: String,

        /// Agent id
        agent: String,

        /// Who is making the change
        #[arg(long, default_value = "cli")]
        actor: String,
    },

    /// Show a task's audit history
    History { id: String },
}

#[derive(Subcommand, Debug)]
pub enum BlockerCommands {
    /// Add a blocker to a task (forces it to blocked)
    Add {
        /// Task id
        task: String,

        /// Blocker kind (dependency, technical, clarification, resource, external, approval)
        kind: BlockerKind,

        /// What is blocking the task
        description: String,

        /// Task id that must complete first, for dependency blockers
        #[arg(long)]
        blocking_task: Option<String>,
    },

    /// Resolve a blocker (may return the task to in-progress)
    Resolve {
        /// Blocker id
        id: String,

        /// Resolution notes
        notes: String,

        /// Who resolved it
        #[arg(long, default_value = "cli")]
        by: String,
    },

    /// Escalate an active blocker
    Escalate { id: String },

    /// List active blockers
    List {
        /// Restrict to one sprint
        #[arg(long)]
        sprint: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum AgentCommands {
    /// Register or update an agent
    Register {
        /// Agent id
        id: String,

        /// Display name
        name: String,

        /// Role (developer, reviewer, architect, manager, specialist)
        #[arg(long, default_value = "developer")]
        role: String,

        /// Availability (available, busy, offline)
        #[arg(long, default_value = "available")]
        availability: String,

        /// Maximum concurrent tasks
        #[arg(long, default_value = "2")]
        max_concurrent: i64,
    },

    /// List registered agents
    List,

    /// Show an agent's live workload
    Workload { id: String },
}

#[derive(Subcommand, Debug)]
pub enum ArtifactCommands {
    /// Store an artifact for an agent under the current version
    Store {
        /// Owning agent id
        agent: String,

        /// Artifact name, e.g. design.md
        name: String,

        /// Content file; stdin when omitted
        #[arg(long)]
        file: Option<PathBuf>,

        /// Artifact type (structured-data, prose, code, text)
        #[arg(long = "type", default_value = "text")]
        artifact_type: String,

        /// Artifact description
        #[arg(long)]
        description: Option<String>,
    },

    /// Show an artifact with its content
    Show {
        /// Artifact id, e.g. architect/design.md/1
        id: String,

        /// Requesting agent, recorded for the audit trail
        #[arg(long, default_value = "cli")]
        requestor: String,
    },

    /// List an agent's artifacts at a version (default: current)
    List {
        /// Owning agent id
        agent: String,

        /// Context version
        #[arg(long)]
        version: Option<i64>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ContextCommands {
    /// Assemble a token-budgeted context package for an agent
    Assemble {
        /// Agent id
        agent: String,

        /// Task id included in the package metadata
        #[arg(long)]
        task: Option<String>,

        /// Token budget for the whole invocation
        #[arg(long, default_value = "100000")]
        max_tokens: i64,
    },

    /// Show all project settings
    Settings,

    /// Set one typed project setting
    Set {
        /// Setting key
        key: String,

        /// Setting value
        value: String,

        /// Value type (string, integer, boolean, json)
        #[arg(long = "type", default_value = "string")]
        value_type: String,

        /// Who is making the change
        #[arg(long, default_value = "cli")]
        by: String,
    },

    /// Register a new context version in the lineage
    Version {
        /// Version description
        #[arg(long)]
        description: Option<String>,

        /// Creating agent or user
        #[arg(long, default_value = "cli")]
        by: String,

        /// Parent version
        #[arg(long)]
        parent: Option<i64>,
    },
}
