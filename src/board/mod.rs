//! Task board: sprints, tasks, dependencies, blockers, and agent workload.
//!
//! This module enforces the task status state machine:
//!
//! ```text
//! todo        -> {in-progress}
//! in-progress -> {todo, blocked, in-qa}
//! blocked     -> {todo, in-progress}
//! in-qa       -> {in-progress, done}
//! done        -> {}            (terminal)
//! ```
//!
//! Every public mutating operation runs in its own transaction; a failure
//! partway rolls the whole operation back. `blocked` is additionally forced
//! by `add_blocker` outside the table, and left again automatically when the
//! last active blocker is resolved.

use std::collections::{HashSet, VecDeque};
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    AgentAvailability, AgentEntry, AgentRole, AgentWorkload, Blocker, BlockerKind, BlockerStatus,
    Sprint, SprintMetrics, SprintStatus, SprintSummary, Task, TaskComment, TaskFilter,
    TaskHistoryEntry, TaskStatus,
};
use crate::{Error, Result};

/// Actor recorded on history rows written by the board itself rather than
/// a caller (forced blocker transitions, task creation).
const SYSTEM_ACTOR: &str = "system";

/// Task board backed by a SQLite database.
pub struct Board {
    conn: Connection,
}

impl Board {
    /// Open or create the board database under the given data directory.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let conn = Connection::open(data_dir.join("board.db"))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory board. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sprints (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                goal TEXT,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'planned'
                    CHECK(status IN ('planned', 'active', 'completed', 'cancelled')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                sprint_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'todo'
                    CHECK(status IN ('todo', 'in-progress', 'blocked', 'in-qa', 'done')),
                priority INTEGER NOT NULL DEFAULT 100,
                assigned_agent TEXT,
                estimated_hours REAL,
                actual_hours REAL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                FOREIGN KEY (sprint_id) REFERENCES sprints(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_sprint ON tasks(sprint_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
            CREATE INDEX IF NOT EXISTS idx_tasks_agent ON tasks(assigned_agent);
            CREATE INDEX IF NOT EXISTS idx_tasks_priority ON tasks(priority);

            CREATE TABLE IF NOT EXISTS task_dependencies (
                task_id TEXT NOT NULL,
                depends_on_task_id TEXT NOT NULL,
                PRIMARY KEY (task_id, depends_on_task_id),
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE,
                FOREIGN KEY (depends_on_task_id) REFERENCES tasks(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS blockers (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                kind TEXT NOT NULL CHECK(kind IN
                    ('dependency', 'technical', 'clarification', 'resource', 'external', 'approval')),
                description TEXT NOT NULL,
                blocking_task_id TEXT,
                status TEXT NOT NULL DEFAULT 'active'
                    CHECK(status IN ('active', 'resolved', 'escalated')),
                created_at TEXT NOT NULL,
                resolved_at TEXT,
                escalated_at TEXT,
                resolution_notes TEXT,
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE,
                FOREIGN KEY (blocking_task_id) REFERENCES tasks(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_blockers_task ON blockers(task_id);
            CREATE INDEX IF NOT EXISTS idx_blockers_status ON blockers(status);

            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                role TEXT NOT NULL
                    CHECK(role IN ('developer', 'reviewer', 'architect', 'manager', 'specialist')),
                availability TEXT NOT NULL DEFAULT 'available'
                    CHECK(availability IN ('available', 'busy', 'offline')),
                max_concurrent_tasks INTEGER NOT NULL DEFAULT 2,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS task_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                field_changed TEXT NOT NULL,
                old_value TEXT,
                new_value TEXT,
                changed_by TEXT NOT NULL,
                changed_at TEXT NOT NULL,
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_history_task ON task_history(task_id);
            CREATE INDEX IF NOT EXISTS idx_history_changed_at ON task_history(changed_at);

            CREATE TABLE IF NOT EXISTS task_comments (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                author TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_comments_task ON task_comments(task_id);
            "#,
        )?;
        Ok(())
    }

    // === Sprint Operations ===

    /// Create a new sprint.
    pub fn create_sprint(
        &mut self,
        id: &str,
        name: &str,
        goal: Option<&str>,
        start_date: &str,
        end_date: &str,
    ) -> Result<Sprint> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO sprints (id, name, goal, start_date, end_date, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'planned', ?6, ?6)",
            params![id, name, goal, start_date, end_date, now.to_rfc3339()],
        )?;
        let summary = self.get_sprint(id)?;
        Ok(summary.sprint)
    }

    /// Get a sprint with per-status task counts.
    pub fn get_sprint(&self, sprint_id: &str) -> Result<SprintSummary> {
        let sprint = self
            .conn
            .query_row(
                "SELECT id, name, goal, start_date, end_date, status, created_at, updated_at
                 FROM sprints WHERE id = ?1",
                [sprint_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Sprint not found: {}", sprint_id)))?;

        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM tasks WHERE sprint_id = ?1 GROUP BY status",
        )?;
        let mut task_counts = std::collections::BTreeMap::new();
        let rows = stmt.query_map([sprint_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            task_counts.insert(status, count);
        }
        let total_tasks = task_counts.values().sum();

        Ok(SprintSummary {
            sprint: Sprint {
                id: sprint.0,
                name: sprint.1,
                goal: sprint.2,
                start_date: sprint.3,
                end_date: sprint.4,
                status: sprint.5.parse::<SprintStatus>()?,
                created_at: parse_ts(&sprint.6)?,
                updated_at: parse_ts(&sprint.7)?,
            },
            task_counts,
            total_tasks,
        })
    }

    /// Sprint completion and effort metrics.
    ///
    /// Completion rate is `done / total * 100`, 0 for an empty sprint.
    pub fn get_sprint_metrics(&self, sprint_id: &str) -> Result<SprintMetrics> {
        // NotFound beats a row of zeros for a sprint that never existed.
        self.get_sprint(sprint_id)?;

        let (total, done, blocked, estimated, actual) = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'done' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'blocked' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(estimated_hours), 0),
                    COALESCE(SUM(CASE WHEN status = 'done' THEN actual_hours ELSE 0 END), 0)
             FROM tasks WHERE sprint_id = ?1",
            [sprint_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                ))
            },
        )?;

        let completion_rate = if total > 0 {
            (done as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
        } else {
            0.0
        };

        Ok(SprintMetrics {
            sprint_id: sprint_id.to_string(),
            total_tasks: total,
            completed_tasks: done,
            blocked_tasks: blocked,
            completion_rate,
            total_estimated_hours: estimated,
            total_actual_hours: actual,
        })
    }

    // === Task Operations ===

    /// Create a new task in a sprint.
    ///
    /// Ids are `{sprint_id}-{seq:03}` with `seq` one above the highest
    /// existing sequence for the sprint. Allocation happens inside the
    /// insert transaction; a cross-process race surfaces as a primary-key
    /// conflict and is retried once with a freshly read sequence.
    pub fn create_task(
        &mut self,
        sprint_id: &str,
        title: &str,
        description: Option<&str>,
        priority: i64,
        estimated_hours: Option<f64>,
        depends_on: &[String],
    ) -> Result<Task> {
        match self.try_create_task(sprint_id, title, description, priority, estimated_hours, depends_on)
        {
            Err(Error::ConstraintViolation(_)) => self.try_create_task(
                sprint_id,
                title,
                description,
                priority,
                estimated_hours,
                depends_on,
            ),
            other => other,
        }
    }

    fn try_create_task(
        &mut self,
        sprint_id: &str,
        title: &str,
        description: Option<&str>,
        priority: i64,
        estimated_hours: Option<f64>,
        depends_on: &[String],
    ) -> Result<Task> {
        let tx = self.conn.transaction()?;

        let sprint_exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM sprints WHERE id = ?1",
            [sprint_id],
            |row| row.get(0),
        )?;
        if !sprint_exists {
            return Err(Error::NotFound(format!("Sprint not found: {}", sprint_id)));
        }

        let task_id = next_task_id(&tx, sprint_id)?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO tasks (id, sprint_id, title, description, status, priority,
                                estimated_hours, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'todo', ?5, ?6, ?7, ?7)",
            params![task_id, sprint_id, title, description, priority, estimated_hours, now],
        )?;

        for dep in depends_on {
            if dep == &task_id {
                return Err(Error::InvalidInput(format!(
                    "Task cannot depend on itself: {}",
                    task_id
                )));
            }
            if dependency_would_create_cycle(&tx, &task_id, dep)? {
                return Err(Error::CycleDetected);
            }
            tx.execute(
                "INSERT INTO task_dependencies (task_id, depends_on_task_id) VALUES (?1, ?2)",
                params![task_id, dep],
            )?;
        }

        tx.execute(
            "INSERT INTO task_history (task_id, field_changed, old_value, new_value, changed_by, changed_at)
             VALUES (?1, 'created', NULL, 'todo', ?2, ?3)",
            params![task_id, SYSTEM_ACTOR, now],
        )?;

        tx.commit()?;
        self.get_task(&task_id)
    }

    /// Get a task with its dependency ids and active blockers.
    pub fn get_task(&self, task_id: &str) -> Result<Task> {
        let mut task = get_task_row(&self.conn, task_id)?;

        let mut stmt = self
            .conn
            .prepare("SELECT depends_on_task_id FROM task_dependencies WHERE task_id = ?1")?;
        task.depends_on = stmt
            .query_map([task_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, kind, description, blocking_task_id, status,
                    created_at, resolved_at, escalated_at, resolution_notes
             FROM blockers WHERE task_id = ?1 AND status = 'active'
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([task_id], blocker_columns)?;
        task.blockers = rows
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(blocker_from_columns)
            .collect::<Result<Vec<_>>>()?;

        Ok(task)
    }

    /// Update a task's status, enforcing the transition table.
    ///
    /// On success: stamps `started_at` when leaving `todo` for
    /// `in-progress` and `completed_at` when entering `done`, appends one
    /// history row, and optionally a comment, all atomically. An invalid
    /// transition leaves the row untouched and reports the permitted
    /// next states.
    pub fn update_status(
        &mut self,
        task_id: &str,
        new_status: TaskStatus,
        actor: &str,
        comment: Option<&str>,
    ) -> Result<Task> {
        let tx = self.conn.transaction()?;

        let current: TaskStatus = tx
            .query_row("SELECT status FROM tasks WHERE id = ?1", [task_id], |row| {
                row.get::<_, String>(0)
            })
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Task not found: {}", task_id)))?
            .parse()?;

        if !current.can_transition_to(new_status) {
            return Err(Error::InvalidTransition {
                from: current.to_string(),
                to: new_status.to_string(),
                allowed: current
                    .valid_transitions()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            });
        }

        let now = Utc::now().to_rfc3339();
        let mut sql = String::from("UPDATE tasks SET status = ?1, updated_at = ?2");
        if new_status == TaskStatus::InProgress && current == TaskStatus::Todo {
            sql.push_str(", started_at = ?2");
        } else if new_status == TaskStatus::Done {
            sql.push_str(", completed_at = ?2");
        }
        sql.push_str(" WHERE id = ?3");
        tx.execute(&sql, params![new_status.as_str(), now, task_id])?;

        tx.execute(
            "INSERT INTO task_history (task_id, field_changed, old_value, new_value, changed_by, changed_at)
             VALUES (?1, 'status', ?2, ?3, ?4, ?5)",
            params![task_id, current.as_str(), new_status.as_str(), actor, now],
        )?;

        if let Some(content) = comment {
            let comment_id = format!("{}_comment_{}", task_id, Utc::now().timestamp());
            tx.execute(
                "INSERT INTO task_comments (id, task_id, author, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![comment_id, task_id, actor, content, now],
            )?;
        }

        tx.commit()?;
        self.get_task(task_id)
    }

    /// Assign a task to an agent, recording the prior assignee in history.
    ///
    /// Does not enforce the agent's capacity limit; callers consult
    /// `get_agent_workload` separately.
    pub fn assign_task(&mut self, task_id: &str, agent_id: &str, actor: &str) -> Result<Task> {
        let tx = self.conn.transaction()?;

        let agent_exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM agents WHERE id = ?1",
            [agent_id],
            |row| row.get(0),
        )?;
        if !agent_exists {
            return Err(Error::NotFound(format!("Agent not found: {}", agent_id)));
        }

        let old_agent: Option<String> = tx
            .query_row(
                "SELECT assigned_agent FROM tasks WHERE id = ?1",
                [task_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Task not found: {}", task_id)))?;

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE tasks SET assigned_agent = ?1, updated_at = ?2 WHERE id = ?3",
            params![agent_id, now, task_id],
        )?;
        tx.execute(
            "INSERT INTO task_history (task_id, field_changed, old_value, new_value, changed_by, changed_at)
             VALUES (?1, 'assigned_agent', ?2, ?3, ?4, ?5)",
            params![task_id, old_agent, agent_id, actor, now],
        )?;

        tx.commit()?;
        self.get_task(task_id)
    }

    /// Query tasks with optional filters, most urgent first.
    pub fn query_tasks(&self, filter: &TaskFilter, limit: usize) -> Result<Vec<Task>> {
        let mut sql = String::from("SELECT id FROM tasks WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(sprint_id) = &filter.sprint_id {
            sql.push_str(" AND sprint_id = ?");
            params_vec.push(Box::new(sprint_id.clone()));
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            params_vec.push(Box::new(status.as_str().to_string()));
        }
        if let Some(agent) = &filter.assigned_agent {
            sql.push_str(" AND assigned_agent = ?");
            params_vec.push(Box::new(agent.clone()));
        }

        sql.push_str(" ORDER BY priority ASC, created_at ASC LIMIT ?");
        params_vec.push(Box::new(limit as i64));

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let ids: Vec<String> = stmt
            .query_map(params_refs.as_slice(), |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        ids.iter().map(|id| self.get_task(id)).collect()
    }

    /// Audit history for a task, oldest first.
    pub fn get_task_history(&self, task_id: &str) -> Result<Vec<TaskHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, field_changed, old_value, new_value, changed_by, changed_at
             FROM task_history WHERE task_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([task_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|r| {
                Ok(TaskHistoryEntry {
                    id: r.0,
                    task_id: r.1,
                    field_changed: r.2,
                    old_value: r.3,
                    new_value: r.4,
                    changed_by: r.5,
                    changed_at: parse_ts(&r.6)?,
                })
            })
            .collect()
    }

    /// Comments on a task, oldest first.
    pub fn get_comments(&self, task_id: &str) -> Result<Vec<TaskComment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, author, content, created_at
             FROM task_comments WHERE task_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([task_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|r| {
                Ok(TaskComment {
                    id: r.0,
                    task_id: r.1,
                    author: r.2,
                    content: r.3,
                    created_at: parse_ts(&r.4)?,
                })
            })
            .collect()
    }

    // === Blocker Operations ===

    /// Add an active blocker to a task.
    ///
    /// Side effect: a task not already `blocked` is force-transitioned to
    /// `blocked` with a `"system"` history row. This bypasses the normal
    /// transition table, since `blocked` is always reachable when a
    /// blocker appears.
    pub fn add_blocker(
        &mut self,
        task_id: &str,
        kind: BlockerKind,
        description: &str,
        blocking_task_id: Option<&str>,
    ) -> Result<Blocker> {
        let tx = self.conn.transaction()?;

        let current: TaskStatus = tx
            .query_row("SELECT status FROM tasks WHERE id = ?1", [task_id], |row| {
                row.get::<_, String>(0)
            })
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Task not found: {}", task_id)))?
            .parse()?;

        let now = Utc::now();
        // Ids are second-granular; bump the suffix if a blocker landed in
        // the same second.
        let mut suffix = now.timestamp();
        let blocker_id = loop {
            let candidate = format!("{}_blocker_{}", task_id, suffix);
            let taken: bool = tx.query_row(
                "SELECT COUNT(*) > 0 FROM blockers WHERE id = ?1",
                [&candidate],
                |row| row.get(0),
            )?;
            if !taken {
                break candidate;
            }
            suffix += 1;
        };
        tx.execute(
            "INSERT INTO blockers (id, task_id, kind, description, blocking_task_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6)",
            params![
                blocker_id,
                task_id,
                kind.as_str(),
                description,
                blocking_task_id,
                now.to_rfc3339()
            ],
        )?;

        if current != TaskStatus::Blocked {
            tx.execute(
                "UPDATE tasks SET status = 'blocked', updated_at = ?1 WHERE id = ?2",
                params![now.to_rfc3339(), task_id],
            )?;
            tx.execute(
                "INSERT INTO task_history (task_id, field_changed, old_value, new_value, changed_by, changed_at)
                 VALUES (?1, 'status', ?2, 'blocked', ?3, ?4)",
                params![task_id, current.as_str(), SYSTEM_ACTOR, now.to_rfc3339()],
            )?;
        }

        tx.commit()?;
        self.get_blocker(&blocker_id)
    }

    /// Resolve a blocker.
    ///
    /// When the last active blocker on a task goes away and the task is
    /// still exactly `blocked`, the task auto-transitions back to
    /// `in-progress` credited to `resolved_by`. A task meanwhile moved
    /// elsewhere is left alone; blockers never fight a manual transition.
    pub fn resolve_blocker(
        &mut self,
        blocker_id: &str,
        notes: &str,
        resolved_by: &str,
    ) -> Result<Blocker> {
        let tx = self.conn.transaction()?;

        let task_id: String = tx
            .query_row(
                "SELECT task_id FROM blockers WHERE id = ?1",
                [blocker_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Blocker not found: {}", blocker_id)))?;

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE blockers SET status = 'resolved', resolution_notes = ?1, resolved_at = ?2
             WHERE id = ?3",
            params![notes, now, blocker_id],
        )?;

        let active_remaining: i64 = tx.query_row(
            "SELECT COUNT(*) FROM blockers WHERE task_id = ?1 AND status = 'active'",
            [&task_id],
            |row| row.get(0),
        )?;

        if active_remaining == 0 {
            let current: TaskStatus = tx
                .query_row("SELECT status FROM tasks WHERE id = ?1", [&task_id], |row| {
                    row.get::<_, String>(0)
                })?
                .parse()?;
            if current == TaskStatus::Blocked {
                tx.execute(
                    "UPDATE tasks SET status = 'in-progress', updated_at = ?1 WHERE id = ?2",
                    params![now, task_id],
                )?;
                tx.execute(
                    "INSERT INTO task_history (task_id, field_changed, old_value, new_value, changed_by, changed_at)
                     VALUES (?1, 'status', 'blocked', 'in-progress', ?2, ?3)",
                    params![task_id, resolved_by, now],
                )?;
            }
        }

        tx.commit()?;
        self.get_blocker(blocker_id)
    }

    /// Escalate an active blocker.
    pub fn escalate_blocker(&mut self, blocker_id: &str) -> Result<Blocker> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE blockers SET status = 'escalated', escalated_at = ?1
             WHERE id = ?2 AND status = 'active'",
            params![now, blocker_id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!(
                "Active blocker not found: {}",
                blocker_id
            )));
        }
        self.get_blocker(blocker_id)
    }

    /// Get a blocker by id.
    pub fn get_blocker(&self, blocker_id: &str) -> Result<Blocker> {
        let columns = self
            .conn
            .query_row(
                "SELECT id, task_id, kind, description, blocking_task_id, status,
                        created_at, resolved_at, escalated_at, resolution_notes
                 FROM blockers WHERE id = ?1",
                [blocker_id],
                blocker_columns,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Blocker not found: {}", blocker_id)))?;
        blocker_from_columns(columns)
    }

    /// All active blockers, optionally restricted to one sprint, newest first.
    pub fn get_active_blockers(&self, sprint_id: Option<&str>) -> Result<Vec<Blocker>> {
        let mut sql = String::from(
            "SELECT b.id, b.task_id, b.kind, b.description, b.blocking_task_id, b.status,
                    b.created_at, b.resolved_at, b.escalated_at, b.resolution_notes
             FROM blockers b JOIN tasks t ON b.task_id = t.id
             WHERE b.status = 'active'",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(sprint) = sprint_id {
            sql.push_str(" AND t.sprint_id = ?");
            params_vec.push(Box::new(sprint.to_string()));
        }
        sql.push_str(" ORDER BY b.created_at DESC");

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), blocker_columns)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(blocker_from_columns)
            .collect()
    }

    // === Agent Operations ===

    /// Insert or update a registry entry for an agent.
    pub fn upsert_agent(
        &mut self,
        id: &str,
        name: &str,
        role: AgentRole,
        availability: AgentAvailability,
        max_concurrent_tasks: i64,
    ) -> Result<AgentEntry> {
        self.conn.execute(
            "INSERT INTO agents (id, name, role, availability, max_concurrent_tasks, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 role = excluded.role,
                 availability = excluded.availability,
                 max_concurrent_tasks = excluded.max_concurrent_tasks",
            params![
                id,
                name,
                role.as_str(),
                availability.as_str(),
                max_concurrent_tasks,
                Utc::now().to_rfc3339()
            ],
        )?;
        self.get_agent(id)
    }

    /// Get a registry entry by agent id.
    pub fn get_agent(&self, agent_id: &str) -> Result<AgentEntry> {
        self.conn
            .query_row(
                "SELECT id, name, role, availability, max_concurrent_tasks, created_at
                 FROM agents WHERE id = ?1",
                [agent_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?
            .map(|r| -> Result<AgentEntry> {
                Ok(AgentEntry {
                    id: r.0,
                    name: r.1,
                    role: r.2.parse()?,
                    availability: r.3.parse()?,
                    max_concurrent_tasks: r.4,
                    created_at: parse_ts(&r.5)?,
                })
            })
            .transpose()?
            .ok_or_else(|| Error::NotFound(format!("Agent not found: {}", agent_id)))
    }

    /// All registered agents, ordered by id.
    pub fn list_agents(&self) -> Result<Vec<AgentEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, role, availability, max_concurrent_tasks, created_at
             FROM agents ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|r| {
                Ok(AgentEntry {
                    id: r.0,
                    name: r.1,
                    role: r.2.parse()?,
                    availability: r.3.parse()?,
                    max_concurrent_tasks: r.4,
                    created_at: parse_ts(&r.5)?,
                })
            })
            .collect()
    }

    /// An agent's registry entry plus a live count of its open tasks.
    pub fn get_agent_workload(&self, agent_id: &str) -> Result<AgentWorkload> {
        let agent = self.get_agent(agent_id)?;
        let current_tasks: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tasks
             WHERE assigned_agent = ?1 AND status IN ('todo', 'in-progress', 'blocked', 'in-qa')",
            [agent_id],
            |row| row.get(0),
        )?;
        let available_capacity = agent.max_concurrent_tasks - current_tasks;
        let at_capacity = current_tasks >= agent.max_concurrent_tasks;
        Ok(AgentWorkload {
            agent,
            current_tasks,
            available_capacity,
            at_capacity,
        })
    }

    // === Dependency Operations ===

    /// Add a dependency edge between existing tasks.
    ///
    /// Self-loops and cycles are rejected.
    pub fn add_task_dependency(&mut self, task_id: &str, depends_on: &str) -> Result<()> {
        if task_id == depends_on {
            return Err(Error::InvalidInput(format!(
                "Task cannot depend on itself: {}",
                task_id
            )));
        }
        get_task_row(&self.conn, task_id)?;
        get_task_row(&self.conn, depends_on)?;
        if dependency_would_create_cycle(&self.conn, task_id, depends_on)? {
            return Err(Error::CycleDetected);
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO task_dependencies (task_id, depends_on_task_id) VALUES (?1, ?2)",
            params![task_id, depends_on],
        )?;
        Ok(())
    }
}

/// Allocate the next task id for a sprint: highest existing sequence + 1.
fn next_task_id(conn: &Connection, sprint_id: &str) -> Result<String> {
    let mut stmt = conn.prepare("SELECT id FROM tasks WHERE sprint_id = ?1")?;
    let ids = stmt.query_map([sprint_id], |row| row.get::<_, String>(0))?;

    let prefix = format!("{}-", sprint_id);
    let mut max_seq = 0u32;
    for id in ids {
        let id = id?;
        if let Some(seq) = id
            .strip_prefix(&prefix)
            .and_then(|suffix| suffix.parse::<u32>().ok())
        {
            max_seq = max_seq.max(seq);
        }
    }
    Ok(format!("{}-{:03}", sprint_id, max_seq + 1))
}

/// BFS from `depends_on` along dependency edges; a path back to `task_id`
/// means the new edge would close a cycle.
fn dependency_would_create_cycle(
    conn: &Connection,
    task_id: &str,
    depends_on: &str,
) -> Result<bool> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(depends_on.to_string());

    while let Some(current) = queue.pop_front() {
        if current == task_id {
            return Ok(true);
        }
        if !visited.insert(current.clone()) {
            continue;
        }
        let mut stmt =
            conn.prepare("SELECT depends_on_task_id FROM task_dependencies WHERE task_id = ?1")?;
        let next = stmt.query_map([&current], |row| row.get::<_, String>(0))?;
        for id in next {
            queue.push_back(id?);
        }
    }
    Ok(false)
}

fn get_task_row(conn: &Connection, task_id: &str) -> Result<Task> {
    conn.query_row(
        "SELECT id, sprint_id, title, description, status, priority, assigned_agent,
                estimated_hours, actual_hours, created_at, updated_at, started_at, completed_at
         FROM tasks WHERE id = ?1",
        [task_id],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<f64>>(7)?,
                row.get::<_, Option<f64>>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, String>(10)?,
                row.get::<_, Option<String>>(11)?,
                row.get::<_, Option<String>>(12)?,
            ))
        },
    )
    .optional()?
    .map(|r| -> Result<Task> {
        Ok(Task {
            id: r.0,
            sprint_id: r.1,
            title: r.2,
            description: r.3,
            status: r.4.parse()?,
            priority: r.5,
            assigned_agent: r.6,
            estimated_hours: r.7,
            actual_hours: r.8,
            created_at: parse_ts(&r.9)?,
            updated_at: parse_ts(&r.10)?,
            started_at: parse_opt_ts(r.11.as_deref())?,
            completed_at: parse_opt_ts(r.12.as_deref())?,
            depends_on: Vec::new(),
            blockers: Vec::new(),
        })
    })
    .transpose()?
    .ok_or_else(|| Error::NotFound(format!("Task not found: {}", task_id)))
}

type BlockerColumns = (
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn blocker_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<BlockerColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn blocker_from_columns(r: BlockerColumns) -> Result<Blocker> {
    Ok(Blocker {
        id: r.0,
        task_id: r.1,
        kind: r.2.parse::<BlockerKind>()?,
        description: r.3,
        blocking_task_id: r.4,
        status: r.5.parse::<BlockerStatus>()?,
        created_at: parse_ts(&r.6)?,
        resolved_at: parse_opt_ts(r.7.as_deref())?,
        escalated_at: parse_opt_ts(r.8.as_deref())?,
        resolution_notes: r.9,
    })
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("Invalid timestamp '{}': {}", s, e)))
}

pub(crate) fn parse_opt_ts(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    s.map(parse_ts).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;

    fn board_with_sprint() -> (TestEnv, Board) {
        let env = TestEnv::new();
        let mut board = env.board();
        board
            .create_sprint("S1", "Sprint One", Some("Ship it"), "2026-01-01", "2026-01-14")
            .unwrap();
        (env, board)
    }

    fn register_tester(board: &mut Board) {
        board
            .upsert_agent(
                "tester",
                "Tester",
                AgentRole::Developer,
                AgentAvailability::Available,
                2,
            )
            .unwrap();
    }

    #[test]
    fn test_task_id_sequence() {
        let (_env, mut board) = board_with_sprint();
        let t1 = board.create_task("S1", "First", None, 100, None, &[]).unwrap();
        let t2 = board.create_task("S1", "Second", None, 100, None, &[]).unwrap();
        assert_eq!(t1.id, "S1-001");
        assert_eq!(t2.id, "S1-002");
        assert_eq!(t1.status, TaskStatus::Todo);
    }

    #[test]
    fn test_create_task_unknown_sprint() {
        let env = TestEnv::new();
        let mut board = env.board();
        let err = board.create_task("S9", "Nope", None, 100, None, &[]).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_all_valid_transitions_append_one_history_row() {
        let transitions: &[(TaskStatus, TaskStatus)] = &[
            (TaskStatus::Todo, TaskStatus::InProgress),
            (TaskStatus::InProgress, TaskStatus::Todo),
            (TaskStatus::InProgress, TaskStatus::Blocked),
            (TaskStatus::InProgress, TaskStatus::InQa),
            (TaskStatus::Blocked, TaskStatus::Todo),
            (TaskStatus::Blocked, TaskStatus::InProgress),
            (TaskStatus::InQa, TaskStatus::InProgress),
            (TaskStatus::InQa, TaskStatus::Done),
        ];

        for (from, to) in transitions {
            let (_env, mut board) = board_with_sprint();
            let task = board.create_task("S1", "T", None, 100, None, &[]).unwrap();
            force_status(&mut board, &task.id, *from);
            let before = board.get_task_history(&task.id).unwrap().len();
            let updated = board.update_status(&task.id, *to, "tester", None).unwrap();
            assert_eq!(updated.status, *to);
            let after = board.get_task_history(&task.id).unwrap().len();
            assert_eq!(after, before + 1, "{:?} -> {:?}", from, to);
        }
    }

    #[test]
    fn test_invalid_transitions_leave_task_untouched() {
        let all = [
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::InQa,
            TaskStatus::Done,
        ];
        for from in all {
            for to in all {
                if from.can_transition_to(to) {
                    continue;
                }
                let (_env, mut board) = board_with_sprint();
                let task = board.create_task("S1", "T", None, 100, None, &[]).unwrap();
                force_status(&mut board, &task.id, from);
                let before = board.get_task_history(&task.id).unwrap().len();
                let err = board.update_status(&task.id, to, "tester", None).unwrap_err();
                match err {
                    Error::InvalidTransition { from: f, allowed, .. } => {
                        assert_eq!(f, from.to_string());
                        assert_eq!(
                            allowed,
                            from.valid_transitions()
                                .iter()
                                .map(|s| s.to_string())
                                .collect::<Vec<_>>()
                        );
                    }
                    other => panic!("expected InvalidTransition, got {:?}", other),
                }
                assert_eq!(board.get_task(&task.id).unwrap().status, from);
                assert_eq!(board.get_task_history(&task.id).unwrap().len(), before);
            }
        }
    }

    /// Walk the task to the target status through valid transitions.
    fn force_status(board: &mut Board, task_id: &str, target: TaskStatus) {
        let path: &[TaskStatus] = match target {
            TaskStatus::Todo => &[],
            TaskStatus::InProgress => &[TaskStatus::InProgress],
            TaskStatus::Blocked => &[TaskStatus::InProgress, TaskStatus::Blocked],
            TaskStatus::InQa => &[TaskStatus::InProgress, TaskStatus::InQa],
            TaskStatus::Done => &[TaskStatus::InProgress, TaskStatus::InQa, TaskStatus::Done],
        };
        for status in path {
            board.update_status(task_id, *status, "setup", None).unwrap();
        }
    }

    #[test]
    fn test_status_stamps_timestamps() {
        let (_env, mut board) = board_with_sprint();
        let task = board.create_task("S1", "T", None, 100, None, &[]).unwrap();
        assert!(task.started_at.is_none());

        let task = board
            .update_status(&task.id, TaskStatus::InProgress, "tester", None)
            .unwrap();
        assert!(task.started_at.is_some());
        assert!(task.completed_at.is_none());

        board.update_status(&task.id, TaskStatus::InQa, "tester", None).unwrap();
        let task = board
            .update_status(&task.id, TaskStatus::Done, "tester", None)
            .unwrap();
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_update_status_with_comment() {
        let (_env, mut board) = board_with_sprint();
        let task = board.create_task("S1", "T", None, 100, None, &[]).unwrap();
        board
            .update_status(&task.id, TaskStatus::InProgress, "tester", Some("picking this up"))
            .unwrap();
        let comments = board.get_comments(&task.id).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].author, "tester");
        assert_eq!(comments[0].content, "picking this up");
        assert!(comments[0].id.starts_with(&format!("{}_comment_", task.id)));
    }

    #[test]
    fn test_done_requires_qa_first() {
        let (_env, mut board) = board_with_sprint();
        let task = board.create_task("S1", "First task", None, 100, None, &[]).unwrap();
        assert_eq!(task.id, "S1-001");
        assert_eq!(task.status, TaskStatus::Todo);

        board
            .update_status("S1-001", TaskStatus::InProgress, "tester", None)
            .unwrap();
        let err = board
            .update_status("S1-001", TaskStatus::Done, "tester", None)
            .unwrap_err();
        match err {
            Error::InvalidTransition { allowed, .. } => {
                assert_eq!(allowed, vec!["todo", "blocked", "in-qa"]);
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
    }

    #[test]
    fn test_assign_task_records_prior_assignee() {
        let (_env, mut board) = board_with_sprint();
        register_tester(&mut board);
        board
            .upsert_agent("other", "Other", AgentRole::Reviewer, AgentAvailability::Available, 1)
            .unwrap();
        let task = board.create_task("S1", "T", None, 100, None, &[]).unwrap();

        let task = board.assign_task(&task.id, "tester", "manager").unwrap();
        assert_eq!(task.assigned_agent.as_deref(), Some("tester"));
        let task = board.assign_task(&task.id, "other", "manager").unwrap();
        assert_eq!(task.assigned_agent.as_deref(), Some("other"));

        let history = board.get_task_history(&task.id).unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.field_changed, "assigned_agent");
        assert_eq!(last.old_value.as_deref(), Some("tester"));
        assert_eq!(last.new_value.as_deref(), Some("other"));
    }

    #[test]
    fn test_assign_task_unknown_agent() {
        let (_env, mut board) = board_with_sprint();
        let task = board.create_task("S1", "T", None, 100, None, &[]).unwrap();
        let err = board.assign_task(&task.id, "ghost", "manager").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_add_blocker_forces_blocked_once() {
        let (_env, mut board) = board_with_sprint();
        let task = board.create_task("S1", "T", None, 100, None, &[]).unwrap();
        board
            .update_status(&task.id, TaskStatus::InProgress, "tester", None)
            .unwrap();

        board
            .add_blocker(&task.id, BlockerKind::Technical, "waiting on X", None)
            .unwrap();
        let task_after = board.get_task(&task.id).unwrap();
        assert_eq!(task_after.status, TaskStatus::Blocked);

        let system_rows = |board: &Board| {
            board
                .get_task_history(&task.id)
                .unwrap()
                .iter()
                .filter(|h| {
                    h.field_changed == "status"
                        && h.new_value.as_deref() == Some("blocked")
                        && h.changed_by == SYSTEM_ACTOR
                })
                .count()
        };
        assert_eq!(system_rows(&board), 1);

        // Additional blockers while already blocked do not re-transition.
        board
            .add_blocker(&task.id, BlockerKind::External, "also waiting on Y", None)
            .unwrap();
        assert_eq!(system_rows(&board), 1);
        assert_eq!(board.get_task(&task.id).unwrap().blockers.len(), 2);
    }

    #[test]
    fn test_resolve_last_blocker_restores_in_progress() {
        let (_env, mut board) = board_with_sprint();
        let task = board.create_task("S1", "T", None, 100, None, &[]).unwrap();
        board
            .update_status(&task.id, TaskStatus::InProgress, "tester", None)
            .unwrap();
        let b1 = board
            .add_blocker(&task.id, BlockerKind::Technical, "waiting on X", None)
            .unwrap();
        let b2 = board
            .add_blocker(&task.id, BlockerKind::External, "waiting on Y", None)
            .unwrap();

        // Resolving a non-last blocker leaves the status alone.
        let resolved = board.resolve_blocker(&b1.id, "fixed X", "tester").unwrap();
        assert_eq!(resolved.status, BlockerStatus::Resolved);
        assert_eq!(resolved.resolution_notes.as_deref(), Some("fixed X"));
        assert_eq!(board.get_task(&task.id).unwrap().status, TaskStatus::Blocked);

        // The last one restores in-progress, credited to the resolver.
        board.resolve_blocker(&b2.id, "fixed Y", "resolver").unwrap();
        let task_after = board.get_task(&task.id).unwrap();
        assert_eq!(task_after.status, TaskStatus::InProgress);
        let history = board.get_task_history(&task.id).unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.changed_by, "resolver");
        assert_eq!(last.new_value.as_deref(), Some("in-progress"));
    }

    #[test]
    fn test_resolve_blocker_skips_manually_moved_task() {
        let (_env, mut board) = board_with_sprint();
        let task = board.create_task("S1", "T", None, 100, None, &[]).unwrap();
        board
            .update_status(&task.id, TaskStatus::InProgress, "tester", None)
            .unwrap();
        let blocker = board
            .add_blocker(&task.id, BlockerKind::Technical, "waiting", None)
            .unwrap();

        // Someone manually pulls the task back to todo while blocked.
        board.update_status(&task.id, TaskStatus::Todo, "tester", None).unwrap();
        board.resolve_blocker(&blocker.id, "done waiting", "tester").unwrap();
        assert_eq!(board.get_task(&task.id).unwrap().status, TaskStatus::Todo);
    }

    #[test]
    fn test_escalate_blocker() {
        let (_env, mut board) = board_with_sprint();
        let task = board.create_task("S1", "T", None, 100, None, &[]).unwrap();
        let blocker = board
            .add_blocker(&task.id, BlockerKind::Approval, "needs signoff", None)
            .unwrap();
        let escalated = board.escalate_blocker(&blocker.id).unwrap();
        assert_eq!(escalated.status, BlockerStatus::Escalated);
        assert!(escalated.escalated_at.is_some());
        assert!(board.escalate_blocker(&blocker.id).is_err());
    }

    #[test]
    fn test_agent_workload() {
        let (_env, mut board) = board_with_sprint();
        register_tester(&mut board);
        let t1 = board.create_task("S1", "A", None, 100, None, &[]).unwrap();
        let t2 = board.create_task("S1", "B", None, 100, None, &[]).unwrap();
        let t3 = board.create_task("S1", "C", None, 100, None, &[]).unwrap();
        for t in [&t1, &t2, &t3] {
            board.assign_task(&t.id, "tester", "manager").unwrap();
        }

        // Done tasks drop out of the live count.
        board.update_status(&t3.id, TaskStatus::InProgress, "x", None).unwrap();
        board.update_status(&t3.id, TaskStatus::InQa, "x", None).unwrap();
        board.update_status(&t3.id, TaskStatus::Done, "x", None).unwrap();

        let workload = board.get_agent_workload("tester").unwrap();
        assert_eq!(workload.current_tasks, 2);
        assert_eq!(workload.available_capacity, 0);
        assert!(workload.at_capacity);
    }

    #[test]
    fn test_sprint_metrics() {
        let (_env, mut board) = board_with_sprint();
        let t1 = board
            .create_task("S1", "A", None, 100, Some(4.0), &[])
            .unwrap();
        board.create_task("S1", "B", None, 100, Some(2.0), &[]).unwrap();
        board.update_status(&t1.id, TaskStatus::InProgress, "x", None).unwrap();
        board.update_status(&t1.id, TaskStatus::InQa, "x", None).unwrap();
        board.update_status(&t1.id, TaskStatus::Done, "x", None).unwrap();

        let metrics = board.get_sprint_metrics("S1").unwrap();
        assert_eq!(metrics.total_tasks, 2);
        assert_eq!(metrics.completed_tasks, 1);
        assert_eq!(metrics.completion_rate, 50.0);
        assert_eq!(metrics.total_estimated_hours, 6.0);

        let empty = board
            .create_sprint("S2", "Empty", None, "2026-02-01", "2026-02-14")
            .and_then(|_| board.get_sprint_metrics("S2"))
            .unwrap();
        assert_eq!(empty.completion_rate, 0.0);
    }

    #[test]
    fn test_dependency_cycle_rejected() {
        let (_env, mut board) = board_with_sprint();
        let a = board.create_task("S1", "A", None, 100, None, &[]).unwrap();
        let b = board
            .create_task("S1", "B", None, 100, None, &[a.id.clone()])
            .unwrap();
        let c = board
            .create_task("S1", "C", None, 100, None, &[b.id.clone()])
            .unwrap();

        let err = board.add_task_dependency(&a.id, &c.id).unwrap_err();
        assert!(matches!(err, Error::CycleDetected));
        let err = board.add_task_dependency(&a.id, &a.id).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_query_tasks_filters() {
        let (_env, mut board) = board_with_sprint();
        register_tester(&mut board);
        let t1 = board.create_task("S1", "A", None, 10, None, &[]).unwrap();
        let t2 = board.create_task("S1", "B", None, 5, None, &[]).unwrap();
        board.assign_task(&t1.id, "tester", "manager").unwrap();
        board.update_status(&t2.id, TaskStatus::InProgress, "x", None).unwrap();

        let all = board.query_tasks(&TaskFilter::default(), 100).unwrap();
        assert_eq!(all.len(), 2);
        // Lower priority number first.
        assert_eq!(all[0].id, t2.id);

        let in_progress = board
            .query_tasks(
                &TaskFilter {
                    status: Some(TaskStatus::InProgress),
                    ..Default::default()
                },
                100,
            )
            .unwrap();
        assert_eq!(in_progress.len(), 1);
        assert_eq!(in_progress[0].id, t2.id);

        let assigned = board
            .query_tasks(
                &TaskFilter {
                    assigned_agent: Some("tester".to_string()),
                    ..Default::default()
                },
                100,
            )
            .unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].id, t1.id);
    }

    #[test]
    fn test_active_blockers_by_sprint() {
        let (_env, mut board) = board_with_sprint();
        board
            .create_sprint("S2", "Two", None, "2026-02-01", "2026-02-14")
            .unwrap();
        let t1 = board.create_task("S1", "A", None, 100, None, &[]).unwrap();
        let t2 = board.create_task("S2", "B", None, 100, None, &[]).unwrap();
        board
            .add_blocker(&t1.id, BlockerKind::Technical, "one", None)
            .unwrap();
        board
            .add_blocker(&t2.id, BlockerKind::Resource, "two", None)
            .unwrap();

        assert_eq!(board.get_active_blockers(None).unwrap().len(), 2);
        let s1_only = board.get_active_blockers(Some("S1")).unwrap();
        assert_eq!(s1_only.len(), 1);
        assert_eq!(s1_only[0].task_id, t1.id);
    }
}
