//! Memory record types.
//!
//! [`MemoryKind`] classifies what a memory holds, [`Visibility`] decides which
//! agents can recall it, and [`NewMemory`] is the write-side input.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Durable knowledge, including ingested document chunks.
    Fact,
    /// Something that happened in a session. Decays fastest and gets compacted.
    Event,
    /// What a user or agent likes or wants.
    Preference,
    /// How to do something.
    Procedure,
    /// A person, place, project or thing; usually a graph node.
    Entity,
}

impl MemoryKind {
    pub const ALL: [MemoryKind; 5] = [
        Self::Fact,
        Self::Event,
        Self::Preference,
        Self::Procedure,
        Self::Entity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Event => "event",
            Self::Preference => "preference",
            Self::Procedure => "procedure",
            Self::Entity => "entity",
        }
    }

    /// Events and preferences belong to the agent that recorded them.
    pub fn default_visibility(&self) -> Visibility {
        match self {
            Self::Event | Self::Preference => Visibility::Private,
            Self::Fact | Self::Procedure | Self::Entity => Visibility::Shared,
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown memory kind: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Recallable by every agent.
    Shared,
    /// Recallable only by the owning agent.
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Private => "private",
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(Self::Shared),
            "private" => Ok(Self::Private),
            _ => Err(format!("unknown visibility: {s}")),
        }
    }
}

/// Input to [`crate::memory::store::store_memory`].
#[derive(Debug, Clone)]
pub struct NewMemory<'a> {
    pub content: &'a str,
    pub kind: MemoryKind,
    pub agent_id: &'a str,
    pub visibility: Visibility,
    pub category: Option<&'a str>,
    pub confidence: f64,
    pub metadata: Option<&'a serde_json::Value>,
    pub supersedes: Option<&'a str>,
}

impl<'a> NewMemory<'a> {
    /// A memory with the kind's default visibility and full confidence.
    pub fn new(content: &'a str, kind: MemoryKind, agent_id: &'a str) -> Self {
        Self {
            content,
            kind,
            agent_id,
            visibility: kind.default_visibility(),
            category: None,
            confidence: 1.0,
            metadata: None,
            supersedes: None,
        }
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn category(mut self, category: &'a str) -> Self {
        self.category = Some(category);
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn metadata(mut self, metadata: &'a serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn supersedes(mut self, id: &'a str) -> Self {
        self.supersedes = Some(id);
        self
    }
}

/// A full row of the `memories` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// UUID v7, so ids sort by creation time.
    pub id: String,
    pub kind: MemoryKind,
    pub content: String,
    pub agent_id: String,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// In `[0.0, 1.0]`; decays during maintenance and grows on dedup hits.
    pub confidence: f64,
    pub access_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Replacement id, or `"forgotten"` after a soft delete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// A directed, labelled edge of the memory graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRelation {
    pub id: String,
    pub source_id: String,
    pub relation: String,
    pub target_id: String,
    pub weight: f64,
    pub created_at: String,
}

/// Column list matching [`memory_from_row`].
pub(crate) const MEMORY_COLUMNS: &str = "id, kind, content, agent_id, visibility, category, \
     confidence, access_count, last_accessed, created_at, updated_at, superseded_by, metadata";

/// Map a row selected with [`MEMORY_COLUMNS`] (in order, from column 0).
pub(crate) fn memory_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let kind: String = row.get(1)?;
    let visibility: String = row.get(4)?;
    let metadata: Option<String> = row.get(12)?;
    Ok(Memory {
        id: row.get(0)?,
        kind: kind.parse().map_err(|e: String| invalid_column(1, e))?,
        content: row.get(2)?,
        agent_id: row.get(3)?,
        visibility: visibility.parse().map_err(|e: String| invalid_column(4, e))?,
        category: row.get(5)?,
        confidence: row.get(6)?,
        access_count: row.get(7)?,
        last_accessed: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        superseded_by: row.get(11)?,
        metadata: metadata.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

fn invalid_column(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        msg.into(),
    )
}
