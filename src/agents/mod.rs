//! Agent roster configuration.
//!
//! The roster file is TOML in either of two shapes, normalized into one
//! in-memory form at load:
//!
//! ```toml
//! [[agents]]
//! id = "backend-dev"
//! name = "Backend Developer"
//! role = "developer"
//! ```
//!
//! or keyed by id:
//!
//! ```toml
//! [agents.backend-dev]
//! name = "Backend Developer"
//! role = "developer"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::{AgentAvailability, AgentRole};
use crate::{Error, Result};

fn default_max_concurrent() -> i64 {
    2
}

/// One agent's configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    #[serde(default)]
    pub availability: AgentAvailability,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: i64,
    /// Prompt file relative to the prompts directory; defaults to `{id}.md`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// An `AgentSpec` without the id, as it appears in the keyed shape.
#[derive(Debug, Clone, Deserialize)]
struct KeyedAgentSpec {
    name: String,
    role: AgentRole,
    #[serde(default)]
    availability: AgentAvailability,
    #[serde(default = "default_max_concurrent")]
    max_concurrent_tasks: i64,
    #[serde(default)]
    prompt_file: Option<PathBuf>,
    #[serde(default)]
    max_tokens: Option<i64>,
    #[serde(default)]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RosterShape {
    List(Vec<AgentSpec>),
    Keyed(BTreeMap<String, KeyedAgentSpec>),
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    agents: RosterShape,
}

/// The loaded agent roster.
#[derive(Debug, Clone)]
pub struct Roster {
    specs: Vec<AgentSpec>,
}

impl Roster {
    /// Load and normalize a roster file.
    ///
    /// Duplicate ids are rejected so later code can index by id safely.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let file: RosterFile = toml::from_str(text)?;
        let specs = match file.agents {
            RosterShape::List(specs) => specs,
            RosterShape::Keyed(map) => map
                .into_iter()
                .map(|(id, spec)| AgentSpec {
                    id,
                    name: spec.name,
                    role: spec.role,
                    availability: spec.availability,
                    max_concurrent_tasks: spec.max_concurrent_tasks,
                    prompt_file: spec.prompt_file,
                    max_tokens: spec.max_tokens,
                    temperature: spec.temperature,
                })
                .collect(),
        };

        let mut seen = std::collections::HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.id.clone()) {
                return Err(Error::InvalidInput(format!(
                    "Duplicate agent id in roster: '{}'",
                    spec.id
                )));
            }
        }
        Ok(Self { specs })
    }

    pub fn specs(&self) -> &[AgentSpec] {
        &self.specs
    }

    pub fn get(&self, agent_id: &str) -> Result<&AgentSpec> {
        self.specs
            .iter()
            .find(|s| s.id == agent_id)
            .ok_or_else(|| Error::NotFound(format!("Agent not in roster: {}", agent_id)))
    }
}

/// Resolve an agent's prompt file under the prompts directory.
///
/// Order: an explicit `prompt_file`, then `{id}.md`, then the
/// hyphen-to-underscore variant of the id.
pub fn resolve_prompt_path(prompts_dir: &Path, spec: &AgentSpec) -> Result<PathBuf> {
    if let Some(file) = &spec.prompt_file {
        let path = if file.is_absolute() {
            file.clone()
        } else {
            prompts_dir.join(file)
        };
        if path.is_file() {
            return Ok(path);
        }
        return Err(Error::NotFound(format!(
            "Prompt file not found: {}",
            path.display()
        )));
    }

    let direct = prompts_dir.join(format!("{}.md", spec.id));
    if direct.is_file() {
        return Ok(direct);
    }
    let underscored = prompts_dir.join(format!("{}.md", spec.id.replace('-', "_")));
    if underscored.is_file() {
        return Ok(underscored);
    }
    Err(Error::NotFound(format!(
        "No prompt file for agent '{}' in {}",
        spec.id,
        prompts_dir.display()
    )))
}

/// Read an agent's prompt text.
pub fn load_prompt(prompts_dir: &Path, spec: &AgentSpec) -> Result<String> {
    let path = resolve_prompt_path(prompts_dir, spec)?;
    Ok(std::fs::read_to_string(path)?)
}
