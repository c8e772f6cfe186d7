//! Event model - the unit of ingestion
//!
//! Every observation entering the system is a [`MemoryEvent`]: a source, a
//! kind, free-form content, and a context that is either a typed
//! [`DecisionContent`] (for semantic kinds) or an arbitrary JSON mapping.
//! Events are immutable once built; all validation happens in
//! [`MemoryEvent::new`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};

// ============================================================================
// ENUMS
// ============================================================================

/// Who produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    User,
    Agent,
    System,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::User => "user",
            Source::Agent => "agent",
            Source::System => "system",
        }
    }

    /// Parse from string name. Unknown names are treated as `system`.
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "user" => Source::User,
            "agent" => Source::Agent,
            _ => Source::System,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kinds of events the system ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Decision,
    Error,
    ConfigChange,
    Assumption,
    Constraint,
    Result,
    Proposal,
}

/// Kinds that route to the semantic store when persisted.
pub const SEMANTIC_KINDS: [EventKind; 4] = [
    EventKind::Decision,
    EventKind::Constraint,
    EventKind::Assumption,
    EventKind::Proposal,
];

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Decision => "decision",
            EventKind::Error => "error",
            EventKind::ConfigChange => "config_change",
            EventKind::Assumption => "assumption",
            EventKind::Constraint => "constraint",
            EventKind::Result => "result",
            EventKind::Proposal => "proposal",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "decision" => Some(EventKind::Decision),
            "error" => Some(EventKind::Error),
            "config_change" => Some(EventKind::ConfigChange),
            "assumption" => Some(EventKind::Assumption),
            "constraint" => Some(EventKind::Constraint),
            "result" => Some(EventKind::Result),
            "proposal" => Some(EventKind::Proposal),
            _ => None,
        }
    }

    /// Whether persisted events of this kind belong in the semantic store.
    pub fn is_semantic(&self) -> bool {
        SEMANTIC_KINDS.contains(self)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a semantic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Active,
    Superseded,
    Deprecated,
    Draft,
    Rejected,
    Falsified,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Superseded => "superseded",
            RecordStatus::Deprecated => "deprecated",
            RecordStatus::Draft => "draft",
            RecordStatus::Rejected => "rejected",
            RecordStatus::Falsified => "falsified",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(RecordStatus::Active),
            "superseded" => Some(RecordStatus::Superseded),
            "deprecated" => Some(RecordStatus::Deprecated),
            "draft" => Some(RecordStatus::Draft),
            "rejected" => Some(RecordStatus::Rejected),
            "falsified" => Some(RecordStatus::Falsified),
            _ => None,
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecordStatus::Superseded
                | RecordStatus::Deprecated
                | RecordStatus::Rejected
                | RecordStatus::Falsified
        )
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Security policy for what agents may persist on their own authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustBoundary {
    /// Agents may record decisions when they carry a resolution intent.
    #[default]
    AgentWithIntent,
    /// Only humans may record decisions; agent decision writes are refused.
    HumanOnly,
}

// ============================================================================
// DECISION CONTENT
// ============================================================================

/// Typed context carried by decision, constraint, assumption and proposal
/// events.
///
/// The supersede edges (`supersedes` / `superseded_by`) hold record ids only;
/// structural consistency of the edge pair is the integrity checker's job,
/// not the type system's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionContent {
    pub title: String,
    pub target: String,
    /// Filled during validation: `active` for decisions, `draft` for
    /// proposals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RecordStatus>,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consequences: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supersedes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,

    // Proposal-specific fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miss_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_event_ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub counter_evidence_event_ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub competing_proposal_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_supersedes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_observed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_observed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_for_review: Option<bool>,
}

impl DecisionContent {
    /// Build a decision context with the required fields.
    pub fn new(
        title: impl Into<String>,
        target: impl Into<String>,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            target: target.into(),
            status: None,
            rationale: rationale.into(),
            consequences: Vec::new(),
            supersedes: Vec::new(),
            superseded_by: None,
            confidence: None,
            hit_count: None,
            miss_count: None,
            evidence_event_ids: Vec::new(),
            counter_evidence_event_ids: Vec::new(),
            competing_proposal_ids: Vec::new(),
            suggested_supersedes: Vec::new(),
            first_observed_at: None,
            last_observed_at: None,
            ready_for_review: None,
        }
    }

    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_consequences(mut self, consequences: Vec<String>) -> Self {
        self.consequences = consequences;
        self
    }

    /// Effective status given the kind's default.
    pub fn effective_status(&self, kind: EventKind) -> RecordStatus {
        self.status.unwrap_or(match kind {
            EventKind::Proposal => RecordStatus::Draft,
            _ => RecordStatus::Active,
        })
    }
}

// ============================================================================
// EVENT CONTEXT
// ============================================================================

/// Polymorphic event context: typed decision content for semantic kinds, a
/// free-form mapping otherwise. The event kind is the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventContext {
    Decision(DecisionContent),
    Free(serde_json::Map<String, serde_json::Value>),
}

impl Default for EventContext {
    fn default() -> Self {
        EventContext::Free(serde_json::Map::new())
    }
}

impl From<DecisionContent> for EventContext {
    fn from(content: DecisionContent) -> Self {
        EventContext::Decision(content)
    }
}

impl EventContext {
    /// The governed target, for either shape.
    pub fn target(&self) -> Option<&str> {
        match self {
            EventContext::Decision(d) => Some(d.target.as_str()),
            EventContext::Free(map) => map.get("target").and_then(|v| v.as_str()),
        }
    }

    pub fn as_decision(&self) -> Option<&DecisionContent> {
        match self {
            EventContext::Decision(d) => Some(d),
            EventContext::Free(_) => None,
        }
    }

    pub fn as_decision_mut(&mut self) -> Option<&mut DecisionContent> {
        match self {
            EventContext::Decision(d) => Some(d),
            EventContext::Free(_) => None,
        }
    }

    /// Free-form lookup. Also resolves on the decision shape by serializing
    /// the field name through JSON.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        match self {
            EventContext::Free(map) => map.get(key).cloned(),
            EventContext::Decision(d) => serde_json::to_value(d)
                .ok()
                .and_then(|v| v.get(key).cloned()),
        }
    }
}

// ============================================================================
// EVENT
// ============================================================================

/// The unit ingested by the memory system. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub source: Source,
    pub kind: EventKind,
    pub content: String,
    #[serde(default)]
    pub context: EventContext,
    pub timestamp: DateTime<Utc>,
}

fn default_schema_version() -> u32 {
    1
}

impl MemoryEvent {
    /// Build and validate an event.
    ///
    /// Semantic kinds must carry a decision-shaped context with non-empty
    /// required fields; a free-form mapping that deserializes into
    /// [`DecisionContent`] is coerced. The status default is filled here so
    /// persisted headers always carry an explicit status.
    pub fn new(
        source: Source,
        kind: EventKind,
        content: impl Into<String>,
        context: EventContext,
    ) -> Result<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(MemoryError::Schema("content cannot be empty".into()));
        }

        let context = if kind.is_semantic() {
            let mut decision = match context {
                EventContext::Decision(d) => d,
                EventContext::Free(map) => {
                    serde_json::from_value(serde_json::Value::Object(map)).map_err(|e| {
                        MemoryError::Schema(format!(
                            "{} events require title/target/rationale context: {}",
                            kind, e
                        ))
                    })?
                }
            };
            for (name, value) in [
                ("title", &decision.title),
                ("target", &decision.target),
                ("rationale", &decision.rationale),
            ] {
                if value.trim().is_empty() {
                    return Err(MemoryError::Schema(format!("{} cannot be empty", name)));
                }
            }
            decision.status = Some(decision.effective_status(kind));
            EventContext::Decision(decision)
        } else {
            context
        };

        Ok(Self {
            schema_version: 1,
            source,
            kind,
            content,
            context,
            timestamp: Utc::now(),
        })
    }

    /// Target governed by this event, if any.
    pub fn target(&self) -> Option<&str> {
        self.context.target()
    }

    /// Effective record status for semantic events.
    pub fn status(&self) -> Option<RecordStatus> {
        self.context
            .as_decision()
            .map(|d| d.effective_status(self.kind))
    }
}

// ============================================================================
// RESOLUTION INTENT
// ============================================================================

/// How a caller intends to resolve conflicts with existing active decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionType {
    Supersede,
    Deprecate,
    Abort,
}

/// An explicit conflict-resolution value carried alongside an event through
/// the routing engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionIntent {
    pub resolution_type: ResolutionType,
    pub rationale: String,
    pub target_decision_ids: Vec<String>,
}

impl ResolutionIntent {
    pub fn supersede(rationale: impl Into<String>, target_decision_ids: Vec<String>) -> Self {
        Self {
            resolution_type: ResolutionType::Supersede,
            rationale: rationale.into(),
            target_decision_ids,
        }
    }
}

// ============================================================================
// MEMORY DECISION
// ============================================================================

/// Which store an event was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    Episodic,
    Semantic,
    None,
}

/// Outcome of routing one event: whether it persisted, where, and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDecision {
    pub should_persist: bool,
    pub store_type: StoreType,
    pub reason: String,
    pub priority: u8,
    /// Record id of the semantic file written for this event, when one was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

impl MemoryDecision {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            should_persist: false,
            store_type: StoreType::None,
            reason: reason.into(),
            priority: 0,
            file_id: None,
        }
    }

    pub fn persist(store_type: StoreType, reason: impl Into<String>, priority: u8) -> Self {
        Self {
            should_persist: true,
            store_type,
            reason: reason.into(),
            priority,
            file_id: None,
        }
    }
}
