use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An agent that can take tasks and vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,
    /// Voting weight, applied by `DecisionBoard::cast_agent_vote`.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_max_concurrent() -> usize {
    1
}

fn default_weight() -> f64 {
    1.0
}

impl AgentProfile {
    pub fn new(id: impl Into<String>, capabilities: &[&str]) -> Self {
        Self {
            id: id.into(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            max_concurrent_tasks: default_max_concurrent(),
            weight: default_weight(),
        }
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent_tasks = n;
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub(crate) fn keywords(&self) -> HashSet<String> {
        self.capabilities.iter().flat_map(|c| keywords(c)).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Output on completion, reason on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            required_capabilities: Vec::new(),
            priority: TaskPriority::default(),
            status: TaskStatus::Pending,
            assigned_agent: None,
            dependencies: Vec::new(),
            result: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn requires(mut self, capability: impl Into<String>) -> Self {
        self.required_capabilities.push(capability.into());
        self
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn depends_on(mut self, task_id: impl Into<String>) -> Self {
        self.dependencies.push(task_id.into());
        self
    }

    /// Lowercased words of the required capabilities, title and description.
    pub(crate) fn keywords(&self) -> HashSet<String> {
        self.required_capabilities
            .iter()
            .map(String::as_str)
            .chain([self.title.as_str(), self.description.as_str()])
            .flat_map(keywords)
            .collect()
    }
}

fn keywords(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}
