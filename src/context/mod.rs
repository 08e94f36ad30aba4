//! Artifact and context store: typed project settings, versioned agent
//! artifacts (metadata in SQLite, content on disk), cached summaries,
//! access rules, per-agent context requirements, and the execution ledger.
//!
//! Artifact ids are `{agent_id}/{name}/{version}`; content lives at
//! `artifacts/v{version}/{agent_id}/{name}` under the data directory.
//! Re-storing the same agent/name/version overwrites in place and keeps
//! the same id.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::board::{parse_opt_ts, parse_ts};
use crate::models::{
    AccessRule, Artifact, ArtifactDraft, ArtifactMeta, ArtifactType, ContextMetadata,
    ContextPackage, ContextRequirement, ContextSummary, ContextVersion, DependencyKind,
    ExecutionRecord, ExecutionStatus, Permission, RequirementKind, ResourceKind, SettingValue,
    StoreReceipt,
};
use crate::{Error, Result};

/// Tokens reserved out of every assembly budget for agent instructions.
const INSTRUCTION_TOKEN_OVERHEAD: i64 = 5000;
/// Tokens reserved out of every assembly budget for the task description.
const TASK_TOKEN_OVERHEAD: i64 = 2000;

/// Requirement pattern that refers to the settings snapshot rather than
/// any stored artifact. The snapshot is always included, so the pattern
/// is satisfied by skipping it.
const PROJECT_CONTEXT_SENTINEL: &str = "project_context";

/// Estimate the token count of text content: one token per four
/// characters, rounded down. Counts Unicode characters, not bytes.
pub fn estimate_tokens(content: &str) -> i64 {
    (content.chars().count() / 4) as i64
}

/// SHA-256 hex digest of the exact content bytes.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Artifact and context store backed by a SQLite database plus an
/// on-disk artifact directory.
pub struct ContextStore {
    conn: Connection,
    artifacts_dir: PathBuf,
}

impl ContextStore {
    /// Open or create the context store under the given data directory.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let artifacts_dir = data_dir.join("artifacts");
        std::fs::create_dir_all(&artifacts_dir)?;

        let conn = Connection::open(data_dir.join("context.db"))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn,
            artifacts_dir,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS project_settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                value_type TEXT NOT NULL
                    CHECK(value_type IN ('string', 'integer', 'boolean', 'json')),
                description TEXT,
                updated_by TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS context_versions (
                version INTEGER PRIMARY KEY AUTOINCREMENT,
                description TEXT,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                parent_version INTEGER,
                FOREIGN KEY (parent_version) REFERENCES context_versions(version)
            );

            CREATE TABLE IF NOT EXISTS artifacts (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                artifact_type TEXT NOT NULL
                    CHECK(artifact_type IN ('structured-data', 'prose', 'code', 'text')),
                name TEXT NOT NULL,
                description TEXT,
                file_path TEXT NOT NULL,
                file_hash TEXT NOT NULL,
                version INTEGER NOT NULL,
                token_count INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(agent_id, name, version)
            );

            CREATE INDEX IF NOT EXISTS idx_artifacts_agent ON artifacts(agent_id);
            CREATE INDEX IF NOT EXISTS idx_artifacts_version ON artifacts(version);

            CREATE TABLE IF NOT EXISTS artifact_dependencies (
                from_artifact_id TEXT NOT NULL,
                to_artifact_id TEXT NOT NULL,
                kind TEXT NOT NULL DEFAULT 'required'
                    CHECK(kind IN ('required', 'optional', 'reference')),
                PRIMARY KEY (from_artifact_id, to_artifact_id),
                FOREIGN KEY (from_artifact_id) REFERENCES artifacts(id) ON DELETE CASCADE,
                FOREIGN KEY (to_artifact_id) REFERENCES artifacts(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS context_summaries (
                artifact_id TEXT PRIMARY KEY,
                summary TEXT NOT NULL,
                summary_token_count INTEGER NOT NULL,
                original_token_count INTEGER NOT NULL,
                compression_ratio REAL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (artifact_id) REFERENCES artifacts(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS access_rules (
                agent_pattern TEXT NOT NULL,
                resource TEXT NOT NULL CHECK(resource IN ('artifact', 'context', 'history')),
                resource_pattern TEXT NOT NULL,
                permission TEXT NOT NULL CHECK(permission IN ('read', 'write', 'none')),
                priority INTEGER NOT NULL DEFAULT 100,
                PRIMARY KEY (agent_pattern, resource, resource_pattern, permission)
            );

            CREATE TABLE IF NOT EXISTS context_requirements (
                agent_id TEXT NOT NULL,
                pattern TEXT NOT NULL,
                kind TEXT NOT NULL DEFAULT 'required'
                    CHECK(kind IN ('required', 'optional', 'if-exists')),
                max_tokens INTEGER,
                prefer_summary INTEGER NOT NULL DEFAULT 0,
                priority INTEGER NOT NULL DEFAULT 100,
                PRIMARY KEY (agent_id, pattern)
            );

            CREATE TABLE IF NOT EXISTS execution_history (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                task_id TEXT,
                sprint_id TEXT,
                status TEXT NOT NULL CHECK(status IN ('started', 'completed', 'failed')),
                context_version INTEGER NOT NULL,
                input_artifacts TEXT NOT NULL DEFAULT '[]',
                input_token_count INTEGER NOT NULL DEFAULT 0,
                output_artifacts TEXT NOT NULL DEFAULT '[]',
                output_token_count INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                duration_seconds REAL,
                error_message TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_history_agent ON execution_history(agent_id);
            CREATE INDEX IF NOT EXISTS idx_history_started ON execution_history(started_at);
            "#,
        )?;

        Self::seed_defaults(conn)?;
        Ok(())
    }

    /// Seed settings, version 1, and the baseline access rules, only when
    /// the tables are empty.
    fn seed_defaults(conn: &Connection) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        let settings_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM project_settings", [], |row| row.get(0))?;
        if settings_count == 0 {
            let seeds: &[(&str, &str, &str, &str)] = &[
                ("project_name", "Unnamed Project", "string", "Project name"),
                ("current_phase", "planning", "string", "Current phase"),
                ("context_version", "1", "integer", "Current context version"),
            ];
            for (key, value, value_type, description) in seeds {
                conn.execute(
                    "INSERT INTO project_settings (key, value, value_type, description, updated_by, updated_at)
                     VALUES (?1, ?2, ?3, ?4, 'system', ?5)",
                    params![key, value, value_type, description, now],
                )?;
            }
        }

        let version_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM context_versions", [], |row| row.get(0))?;
        if version_count == 0 {
            conn.execute(
                "INSERT INTO context_versions (version, description, created_by, created_at)
                 VALUES (1, 'Initial version', 'system', ?1)",
                [&now],
            )?;
        }

        let rule_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM access_rules", [], |row| row.get(0))?;
        if rule_count == 0 {
            // Every agent may read and write its own artifacts.
            conn.execute(
                "INSERT INTO access_rules (agent_pattern, resource, resource_pattern, permission, priority)
                 VALUES ('*', 'artifact', 'self', 'read', 1), ('*', 'artifact', 'self', 'write', 1)",
                [],
            )?;
        }

        Ok(())
    }

    // === Project Settings ===

    /// All project settings as typed values.
    pub fn get_settings(&self) -> Result<BTreeMap<String, SettingValue>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value, value_type FROM project_settings")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut settings = BTreeMap::new();
        for row in rows {
            let (key, value, value_type) = row?;
            settings.insert(key, SettingValue::from_db(&value_type, &value)?);
        }
        Ok(settings)
    }

    /// One setting, or `None` if the key is absent.
    pub fn get_setting(&self, key: &str) -> Result<Option<SettingValue>> {
        self.conn
            .query_row(
                "SELECT value, value_type FROM project_settings WHERE key = ?1",
                [key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?
            .map(|(value, value_type)| SettingValue::from_db(&value_type, &value))
            .transpose()
    }

    /// Upsert a batch of typed settings in one transaction.
    pub fn update_settings(
        &mut self,
        updates: &BTreeMap<String, SettingValue>,
        updated_by: &str,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        for (key, value) in updates {
            tx.execute(
                "INSERT INTO project_settings (key, value, value_type, updated_by, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     value_type = excluded.value_type,
                     updated_by = excluded.updated_by,
                     updated_at = excluded.updated_at",
                params![key, value.to_db_string(), value.type_tag(), updated_by, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// The version new artifacts are stored under, from the
    /// `context_version` setting. Defaults to 1 when unset.
    pub fn current_version(&self) -> Result<i64> {
        Ok(self
            .get_setting("context_version")?
            .and_then(|v| v.as_i64())
            .unwrap_or(1))
    }

    // === Context Versions ===

    /// Register a new context version in the lineage.
    ///
    /// Does not change the `context_version` setting; pointing the
    /// project at the new version is a separate, explicit settings
    /// update.
    pub fn create_version(
        &mut self,
        description: Option<&str>,
        created_by: &str,
        parent_version: Option<i64>,
    ) -> Result<ContextVersion> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO context_versions (description, created_by, created_at, parent_version)
             VALUES (?1, ?2, ?3, ?4)",
            params![description, created_by, now, parent_version],
        )?;
        let version = self.conn.last_insert_rowid();
        self.get_version(version)
    }

    /// Get a context version by number.
    pub fn get_version(&self, version: i64) -> Result<ContextVersion> {
        self.conn
            .query_row(
                "SELECT version, description, created_by, created_at, parent_version
                 FROM context_versions WHERE version = ?1",
                [version],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                    ))
                },
            )
            .optional()?
            .map(|r| -> Result<ContextVersion> {
                Ok(ContextVersion {
                    version: r.0,
                    description: r.1,
                    created_by: r.2,
                    created_at: parse_ts(&r.3)?,
                    parent_version: r.4,
                })
            })
            .transpose()?
            .ok_or_else(|| Error::NotFound(format!("Context version not found: {}", version)))
    }

    // === Artifacts ===

    /// Store a batch of artifacts for one agent under the current version.
    ///
    /// Content is written to disk before the metadata transaction commits;
    /// a failure anywhere rolls back every metadata row of the call.
    /// Re-storing an existing agent/name/version overwrites in place.
    pub fn store_artifacts(
        &mut self,
        agent_id: &str,
        drafts: &[ArtifactDraft],
    ) -> Result<StoreReceipt> {
        let version = self.current_version()?;
        let tx = self.conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        let mut artifact_ids = Vec::with_capacity(drafts.len());
        for draft in drafts {
            if draft.name.is_empty() || draft.name.contains('/') {
                return Err(Error::InvalidInput(format!(
                    "Invalid artifact name: '{}'",
                    draft.name
                )));
            }

            let rel_path = format!("v{}/{}/{}", version, agent_id, draft.name);
            let abs_path = self.artifacts_dir.join(&rel_path);
            if let Some(parent) = abs_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&abs_path, draft.content.as_bytes())?;

            let artifact_id = format!("{}/{}/{}", agent_id, draft.name, version);
            let hash = content_hash(&draft.content);
            let tokens = estimate_tokens(&draft.content);

            tx.execute(
                "INSERT OR REPLACE INTO artifacts
                     (id, agent_id, artifact_type, name, description, file_path,
                      file_hash, version, token_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    artifact_id,
                    agent_id,
                    draft.artifact_type.as_str(),
                    draft.name,
                    draft.description,
                    rel_path,
                    hash,
                    version,
                    tokens,
                    now
                ],
            )?;
            artifact_ids.push(artifact_id);
        }

        tx.commit()?;
        tracing::debug!(agent_id, version, count = artifact_ids.len(), "stored artifacts");
        Ok(StoreReceipt {
            version,
            artifact_ids,
        })
    }

    /// Get an artifact with its content re-read from disk.
    ///
    /// `requestor` is recorded for the audit trail; the read path itself
    /// is permissive. Callers that want enforcement use `check_access`.
    pub fn get_artifact(&self, requestor: &str, artifact_id: &str) -> Result<Artifact> {
        tracing::debug!(requestor, artifact_id, "artifact read");
        let meta = self.get_artifact_meta(artifact_id)?;
        let abs_path = self.artifacts_dir.join(&meta.file_path);
        let content = std::fs::read_to_string(&abs_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("Artifact content missing: {}", artifact_id))
            } else {
                Error::Io(e)
            }
        })?;
        Ok(Artifact { meta, content })
    }

    /// Artifact metadata without content.
    pub fn get_artifact_meta(&self, artifact_id: &str) -> Result<ArtifactMeta> {
        self.conn
            .query_row(
                "SELECT id, agent_id, artifact_type, name, description, file_path,
                        file_hash, version, token_count, created_at
                 FROM artifacts WHERE id = ?1",
                [artifact_id],
                artifact_meta_columns,
            )
            .optional()?
            .map(artifact_meta_from_columns)
            .transpose()?
            .ok_or_else(|| Error::NotFound(format!("Artifact not found: {}", artifact_id)))
    }

    /// Metadata for an agent's artifacts at a version (default: current),
    /// newest first.
    pub fn list_artifacts(&self, agent_id: &str, version: Option<i64>) -> Result<Vec<ArtifactMeta>> {
        let version = match version {
            Some(v) => v,
            None => self.current_version()?,
        };
        let mut stmt = self.conn.prepare(
            "SELECT id, agent_id, artifact_type, name, description, file_path,
                    file_hash, version, token_count, created_at
             FROM artifacts WHERE agent_id = ?1 AND version = ?2
             ORDER BY created_at DESC, id ASC",
        )?;
        let rows = stmt.query_map(params![agent_id, version], artifact_meta_columns)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(artifact_meta_from_columns)
            .collect()
    }

    /// Add a dependency edge between artifacts. Self-loops are rejected.
    pub fn add_artifact_dependency(
        &mut self,
        from_artifact_id: &str,
        to_artifact_id: &str,
        kind: DependencyKind,
    ) -> Result<()> {
        if from_artifact_id == to_artifact_id {
            return Err(Error::InvalidInput(format!(
                "Artifact cannot depend on itself: {}",
                from_artifact_id
            )));
        }
        self.get_artifact_meta(from_artifact_id)?;
        self.get_artifact_meta(to_artifact_id)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO artifact_dependencies (from_artifact_id, to_artifact_id, kind)
             VALUES (?1, ?2, ?3)",
            params![from_artifact_id, to_artifact_id, kind.as_str()],
        )?;
        Ok(())
    }

    /// Ids and kinds of the artifacts a given artifact depends on.
    pub fn get_artifact_dependencies(
        &self,
        artifact_id: &str,
    ) -> Result<Vec<(String, DependencyKind)>> {
        let mut stmt = self.conn.prepare(
            "SELECT to_artifact_id, kind FROM artifact_dependencies
             WHERE from_artifact_id = ?1 ORDER BY to_artifact_id ASC",
        )?;
        let rows = stmt.query_map([artifact_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(id, kind)| Ok((id, kind.parse::<DependencyKind>()?)))
            .collect()
    }

    // === Summaries ===

    /// Cache a compressed representation of an artifact.
    pub fn save_summary(&mut self, artifact_id: &str, summary: &str) -> Result<ContextSummary> {
        let meta = self.get_artifact_meta(artifact_id)?;
        let summary_tokens = estimate_tokens(summary);
        let ratio = if meta.token_count > 0 {
            Some(summary_tokens as f64 / meta.token_count as f64)
        } else {
            None
        };
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO context_summaries
                 (artifact_id, summary, summary_token_count, original_token_count,
                  compression_ratio, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![artifact_id, summary, summary_tokens, meta.token_count, ratio, now],
        )?;
        self.get_summary(artifact_id)?
            .ok_or_else(|| Error::Other(format!("Summary write lost for {}", artifact_id)))
    }

    /// Cached summary for an artifact, if one exists.
    pub fn get_summary(&self, artifact_id: &str) -> Result<Option<ContextSummary>> {
        self.conn
            .query_row(
                "SELECT artifact_id, summary, summary_token_count, original_token_count,
                        compression_ratio, created_at
                 FROM context_summaries WHERE artifact_id = ?1",
                [artifact_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<f64>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?
            .map(|r| {
                Ok(ContextSummary {
                    artifact_id: r.0,
                    summary: r.1,
                    summary_token_count: r.2,
                    original_token_count: r.3,
                    compression_ratio: r.4,
                    created_at: parse_ts(&r.5)?,
                })
            })
            .transpose()
    }

    // === Access Rules ===

    /// Insert or replace an access rule.
    pub fn put_access_rule(&mut self, rule: &AccessRule) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO access_rules
                 (agent_pattern, resource, resource_pattern, permission, priority)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                rule.agent_pattern,
                rule.resource.as_str(),
                rule.resource_pattern,
                rule.permission.as_str(),
                rule.priority
            ],
        )?;
        Ok(())
    }

    /// Resolve whether an agent holds a permission on a resource.
    ///
    /// Rules are scanned in ascending priority (lower number wins). The
    /// first rule whose agent pattern (`*` or exact) and resource pattern
    /// (`*`, `self` meaning `resource_owner == agent_id`, or exact owner
    /// match) both apply decides: `none` denies, a matching permission
    /// grants. No applicable rule means denied.
    pub fn check_access(
        &self,
        agent_id: &str,
        resource: ResourceKind,
        resource_owner: &str,
        want: Permission,
    ) -> Result<bool> {
        let mut stmt = self.conn.prepare(
            "SELECT agent_pattern, resource_pattern, permission
             FROM access_rules
             WHERE resource = ?1 AND agent_pattern IN ('*', ?2)
             ORDER BY priority ASC",
        )?;
        let rows = stmt.query_map(params![resource.as_str(), agent_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        for row in rows {
            let (_, resource_pattern, permission) = row?;
            let applies = match resource_pattern.as_str() {
                "*" => true,
                "self" => resource_owner == agent_id,
                exact => exact == resource_owner,
            };
            if !applies {
                continue;
            }
            let permission: Permission = permission.parse()?;
            if permission == Permission::None {
                return Ok(false);
            }
            if permission == want {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // === Context Requirements ===

    /// Replace an agent's context requirement declarations.
    pub fn set_requirements(
        &mut self,
        agent_id: &str,
        requirements: &[ContextRequirement],
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM context_requirements WHERE agent_id = ?1",
            [agent_id],
        )?;
        for req in requirements {
            tx.execute(
                "INSERT INTO context_requirements
                     (agent_id, pattern, kind, max_tokens, prefer_summary, priority)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    agent_id,
                    req.pattern,
                    req.kind.as_str(),
                    req.max_tokens,
                    req.prefer_summary as i64,
                    req.priority
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// An agent's requirements, most important first.
    pub fn get_requirements(&self, agent_id: &str) -> Result<Vec<ContextRequirement>> {
        let mut stmt = self.conn.prepare(
            "SELECT agent_id, pattern, kind, max_tokens, prefer_summary, priority
             FROM context_requirements WHERE agent_id = ?1 ORDER BY priority ASC",
        )?;
        let rows = stmt.query_map([agent_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|r| {
                Ok(ContextRequirement {
                    agent_id: r.0,
                    pattern: r.1,
                    kind: r.2.parse::<RequirementKind>()?,
                    max_tokens: r.3,
                    prefer_summary: r.4 != 0,
                    priority: r.5,
                })
            })
            .collect()
    }

    // === Context Assembly ===

    /// Assemble a token-budgeted context package for one agent invocation.
    ///
    /// Fixed overheads for instructions and the task description come off
    /// `max_tokens` first; requirements are walked in ascending priority;
    /// the `project_context` sentinel is satisfied by the settings
    /// snapshot; a trailing `/*` on a pattern selects every current-version
    /// artifact of that agent. A candidate that would overflow the budget
    /// ends that requirement's scan, with a warning when the requirement
    /// is `required`. `tokens_used` never exceeds `available_tokens`.
    pub fn assemble_context(
        &self,
        agent_id: &str,
        task_id: Option<&str>,
        max_tokens: i64,
    ) -> Result<ContextPackage> {
        let available_tokens = max_tokens - INSTRUCTION_TOKEN_OVERHEAD - TASK_TOKEN_OVERHEAD;
        let settings = self.get_settings()?;

        let project_name = settings
            .get("project_name")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown Project")
            .to_string();
        let current_sprint = settings
            .get("current_sprint")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let current_phase = settings
            .get("current_phase")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let context_version = settings
            .get("context_version")
            .and_then(|v| v.as_i64())
            .unwrap_or(1);

        let mut artifacts = BTreeMap::new();
        let mut warnings = Vec::new();
        let mut tokens_used: i64 = 0;

        for req in self.get_requirements(agent_id)? {
            if req.pattern == PROJECT_CONTEXT_SENTINEL {
                continue;
            }
            let source_agent = req
                .pattern
                .split("/*")
                .next()
                .unwrap_or(req.pattern.as_str());

            for meta in self.list_artifacts(source_agent, None)? {
                if tokens_used + meta.token_count > available_tokens {
                    if req.kind == RequirementKind::Required {
                        warnings.push(format!(
                            "Required artifact {} exceeds token budget",
                            meta.id
                        ));
                    }
                    break;
                }
                match self.get_artifact(agent_id, &meta.id) {
                    Ok(artifact) => {
                        tokens_used += artifact.meta.token_count;
                        artifacts.insert(artifact.meta.id.clone(), artifact);
                    }
                    Err(Error::NotFound(_)) => continue,
                    Err(e) => return Err(e),
                }
            }
        }

        tracing::debug!(agent_id, tokens_used, available_tokens, "assembled context");
        Ok(ContextPackage {
            project_name,
            current_sprint,
            current_phase,
            context_version,
            artifacts,
            metadata: ContextMetadata {
                agent_id: agent_id.to_string(),
                task_id: task_id.map(str::to_string),
                max_tokens,
                available_tokens,
                tokens_used,
                warnings,
                assembled_at: Utc::now(),
            },
        })
    }

    // === Execution History ===

    /// Insert or replace one execution ledger entry.
    ///
    /// `duration_seconds` is derived from the timestamps when absent and
    /// both are present.
    pub fn record_execution(&mut self, record: &ExecutionRecord) -> Result<()> {
        let duration = record.duration_seconds.or_else(|| {
            record
                .completed_at
                .map(|done| (done - record.started_at).num_milliseconds() as f64 / 1000.0)
        });
        self.conn.execute(
            "INSERT OR REPLACE INTO execution_history
                 (id, agent_id, task_id, sprint_id, status, context_version,
                  input_artifacts, input_token_count, output_artifacts, output_token_count,
                  started_at, completed_at, duration_seconds, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                record.id,
                record.agent_id,
                record.task_id,
                record.sprint_id,
                record.status.as_str(),
                record.context_version,
                serde_json::to_string(&record.input_artifacts)?,
                record.input_token_count,
                serde_json::to_string(&record.output_artifacts)?,
                record.output_token_count,
                record.started_at.to_rfc3339(),
                record.completed_at.map(|t| t.to_rfc3339()),
                duration,
                record.error_message
            ],
        )?;
        Ok(())
    }

    /// Get one execution ledger entry.
    pub fn get_execution(&self, execution_id: &str) -> Result<ExecutionRecord> {
        self.conn
            .query_row(
                "SELECT id, agent_id, task_id, sprint_id, status, context_version,
                        input_artifacts, input_token_count, output_artifacts,
                        output_token_count, started_at, completed_at, duration_seconds,
                        error_message
                 FROM execution_history WHERE id = ?1",
                [execution_id],
                execution_columns,
            )
            .optional()?
            .map(execution_from_columns)
            .transpose()?
            .ok_or_else(|| Error::NotFound(format!("Execution not found: {}", execution_id)))
    }

    /// Query the execution ledger, newest first.
    pub fn query_history(
        &self,
        agent_id: Option<&str>,
        status: Option<ExecutionStatus>,
        sprint_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>> {
        let mut sql = String::from(
            "SELECT id, agent_id, task_id, sprint_id, status, context_version,
                    input_artifacts, input_token_count, output_artifacts,
                    output_token_count, started_at, completed_at, duration_seconds,
                    error_message
             FROM execution_history WHERE 1=1",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(agent) = agent_id {
            sql.push_str(" AND agent_id = ?");
            params_vec.push(Box::new(agent.to_string()));
        }
        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            params_vec.push(Box::new(status.as_str().to_string()));
        }
        if let Some(sprint) = sprint_id {
            sql.push_str(" AND sprint_id = ?");
            params_vec.push(Box::new(sprint.to_string()));
        }
        sql.push_str(" ORDER BY started_at DESC LIMIT ?");
        params_vec.push(Box::new(limit as i64));

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), execution_columns)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(execution_from_columns)
            .collect()
    }
}

type ArtifactMetaColumns = (
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    i64,
    i64,
    String,
);

fn artifact_meta_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<ArtifactMetaColumns> {
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

fn artifact_meta_from_columns(r: ArtifactMetaColumns) -> Result<ArtifactMeta> {
    Ok(ArtifactMeta {
        id: r.0,
        agent_id: r.1,
        artifact_type: r.2.parse::<ArtifactType>()?,
        name: r.3,
        description: r.4,
        file_path: r.5,
        file_hash: r.6,
        version: r.7,
        token_count: r.8,
        created_at: parse_ts(&r.9)?,
    })
}

type ExecutionColumns = (
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    i64,
    String,
    i64,
    String,
    i64,
    String,
    Option<String>,
    Option<f64>,
    Option<String>,
);

fn execution_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionColumns> {
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
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
    ))
}

fn execution_from_columns(r: ExecutionColumns) -> Result<ExecutionRecord> {
    Ok(ExecutionRecord {
        id: r.0,
        agent_id: r.1,
        task_id: r.2,
        sprint_id: r.3,
        status: r.4.parse::<ExecutionStatus>()?,
        context_version: r.5,
        input_artifacts: serde_json::from_str(&r.6)?,
        input_token_count: r.7,
        output_artifacts: serde_json::from_str(&r.8)?,
        output_token_count: r.9,
        started_at: parse_ts(&r.10)?,
        completed_at: parse_opt_ts(r.11.as_deref())?,
        duration_seconds: r.12,
        error_message: r.13,
    })
}
