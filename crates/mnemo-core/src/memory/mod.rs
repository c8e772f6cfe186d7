//! Memory façade
//!
//! Public entry point composing the stores and engines behind a single
//! lifecycle: event processing, decision recording and supersession, search,
//! decay and reflection.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{MemoryError, Result};
use crate::event::{
    EventContext, EventKind, MemoryDecision, MemoryEvent, RecordStatus, ResolutionIntent,
    ResolutionType, Source, StoreType, TrustBoundary,
};
use crate::reasoning::decay::{DecayEngine, DecayReport};
use crate::reasoning::reflection::{Distiller, NullDistiller, ReflectionEngine, ReflectionPolicy};
use crate::reasoning::router::MemoryRouter;
use crate::search::{Embedder, HashEmbedder, SearchHit, SearchMode, VectorStore};
use crate::store::episodic::{EpisodicRow, EpisodicStore, RowStatus};
use crate::store::semantic::{ContextPatch, SemanticStore};

/// Configuration for one memory instance.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Base directory for all memory storage.
    pub storage_path: PathBuf,
    /// Days before unreferenced episodic rows start to decay.
    pub ttl_days: i64,
    /// Security policy for agent-originated decision writes.
    pub trust_boundary: TrustBoundary,
    /// Reflection engine tunables.
    pub reflection: ReflectionPolicy,
}

impl MemoryConfig {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            ttl_days: 30,
            trust_boundary: TrustBoundary::default(),
            reflection: ReflectionPolicy::default(),
        }
    }

    pub fn with_trust_boundary(mut self, trust_boundary: TrustBoundary) -> Self {
        self.trust_boundary = trust_boundary;
        self
    }

    pub fn with_ttl_days(mut self, ttl_days: i64) -> Self {
        self.ttl_days = ttl_days;
        self
    }

    pub fn with_reflection(mut self, reflection: ReflectionPolicy) -> Self {
        self.reflection = reflection;
        self
    }
}

/// The main entry point for the memory system.
pub struct Memory {
    trust_boundary: TrustBoundary,
    episodic: EpisodicStore,
    semantic: SemanticStore,
    router: MemoryRouter,
    decay: DecayEngine,
    reflection: ReflectionPolicy,
    embedder: Box<dyn Embedder>,
    vectors: VectorStore,
    distiller: Box<dyn Distiller>,
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("trust_boundary", &self.trust_boundary)
            .finish_non_exhaustive()
    }
}

impl Memory {
    /// Open a memory instance with an explicit embedder.
    pub fn new(config: MemoryConfig, embedder: Box<dyn Embedder>) -> Result<Self> {
        std::fs::create_dir_all(&config.storage_path)?;
        let semantic_root = config.storage_path.join("semantic");
        let semantic = SemanticStore::new(&semantic_root, config.trust_boundary)?;
        let episodic = EpisodicStore::new(config.storage_path.join("episodic.db"))?;
        let vectors = VectorStore::new(semantic_root.join("semantic_meta.db"))?;

        let memory = Self {
            trust_boundary: config.trust_boundary,
            episodic,
            semantic,
            router: MemoryRouter::default(),
            decay: DecayEngine::new(config.ttl_days),
            reflection: config.reflection,
            embedder,
            vectors,
            distiller: Box::new(NullDistiller),
        };
        memory.index_missing_records()?;
        info!(path = %config.storage_path.display(), "memory system ready");
        Ok(memory)
    }

    /// Open with defaults and the deterministic hash embedder.
    pub fn open(storage_path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(
            MemoryConfig::new(storage_path),
            Box::new(HashEmbedder::default()),
        )
    }

    /// Swap the trajectory distiller used by reflection cycles.
    pub fn with_distiller(mut self, distiller: Box<dyn Distiller>) -> Self {
        self.distiller = distiller;
        self
    }

    pub fn semantic(&self) -> &SemanticStore {
        &self.semantic
    }

    pub fn episodic(&self) -> &EpisodicStore {
        &self.episodic
    }

    // ========================================================================
    // EVENT PROCESSING
    // ========================================================================

    /// Process one incoming event: route it, persist where the decision says,
    /// and rewrite the supersede graph when an intent authorizes it.
    pub fn process_event(
        &self,
        source: Source,
        kind: EventKind,
        content: &str,
        context: EventContext,
        intent: Option<ResolutionIntent>,
    ) -> Result<MemoryDecision> {
        if self.trust_boundary == TrustBoundary::HumanOnly
            && source == Source::Agent
            && kind == EventKind::Decision
        {
            warn!("refusing agent decision under human-only trust boundary");
            return Ok(MemoryDecision::skip("Trust Boundary Violation"));
        }

        let mut event = MemoryEvent::new(source, kind, content, context)?;
        let mut decision = self.router.route(&event, intent.as_ref(), &self.semantic)?;

        // Every validated event leaves an episodic row; routing only decides
        // the durable placement.
        if decision.should_persist && decision.store_type == StoreType::Semantic {
            let new_id = self.persist_semantic(&mut event, intent.as_ref())?;
            // Immortal link: the episodic breadcrumb of a semantic write
            // always carries the new record id.
            self.episodic.append(&event, Some(&new_id))?;
            self.index_record(&new_id, &event)?;
            decision.file_id = Some(new_id);
        } else {
            self.episodic.append(&event, None)?;
        }
        Ok(decision)
    }

    /// Execute the semantic leg of a routed event as one commit.
    ///
    /// Ordering inside the transaction: demote the addressed decisions first
    /// (the metadata index admits one active decision per target), save the
    /// new record with its forward `supersedes` edges, then wire the
    /// `superseded_by` back-pointers. Integrity is validated once at scope
    /// exit.
    fn persist_semantic(
        &self,
        event: &mut MemoryEvent,
        intent: Option<&ResolutionIntent>,
    ) -> Result<String> {
        let resolution = intent.map(|i| (i.resolution_type, i.target_decision_ids.clone()));

        if let Some((ResolutionType::Supersede, ids)) = &resolution {
            if let Some(decision) = event.context.as_decision_mut() {
                decision.supersedes = ids.clone();
            }
        }

        self.semantic.transaction(|store| {
            if let Some((resolution_type, ids)) = &resolution {
                let demoted_status = match resolution_type {
                    ResolutionType::Supersede => RecordStatus::Superseded,
                    ResolutionType::Deprecate => RecordStatus::Deprecated,
                    // The router refuses abort intents before execution.
                    ResolutionType::Abort => {
                        return Err(MemoryError::Schema(
                            "abort intents never authorize persistence".into(),
                        ));
                    }
                };
                for old_id in ids {
                    let mut patch = ContextPatch::new();
                    patch.insert(
                        "status".into(),
                        serde_json::json!(demoted_status.as_str()),
                    );
                    store.update_decision(
                        old_id,
                        &patch,
                        &format!("Resolution: {} demoted", old_id),
                    )?;
                }
            }

            let new_id = store.save(event)?;

            if let Some((ResolutionType::Supersede, ids)) = &resolution {
                for old_id in ids {
                    let mut patch = ContextPatch::new();
                    patch.insert("superseded_by".into(), serde_json::json!(new_id));
                    store.update_decision(
                        old_id,
                        &patch,
                        &format!("Superseded by {new_id}"),
                    )?;
                }
            }
            Ok(new_id)
        })
    }

    // ========================================================================
    // DECISION HELPERS
    // ========================================================================

    /// Record a new decision in semantic memory.
    pub fn record_decision(
        &self,
        title: &str,
        target: &str,
        rationale: &str,
        consequences: Vec<String>,
    ) -> Result<MemoryDecision> {
        let context = crate::event::DecisionContent::new(title, target, rationale)
            .with_status(RecordStatus::Active)
            .with_consequences(consequences);
        self.process_event(
            Source::Agent,
            EventKind::Decision,
            title,
            context.into(),
            None,
        )
    }

    /// Evolve knowledge by superseding existing active decisions.
    ///
    /// Fails when any listed id is not currently the active decision for the
    /// target.
    pub fn supersede_decision(
        &self,
        title: &str,
        target: &str,
        rationale: &str,
        old_decision_ids: Vec<String>,
        consequences: Vec<String>,
    ) -> Result<MemoryDecision> {
        let active = self.semantic.list_active_conflicts(target)?;
        for old_id in &old_decision_ids {
            if !active.contains(old_id) {
                return Err(MemoryError::NotFound(format!(
                    "cannot supersede {old_id}: not an active decision for target {target}"
                )));
            }
        }

        let intent = ResolutionIntent::supersede(rationale, old_decision_ids);
        let context = crate::event::DecisionContent::new(title, target, rationale)
            .with_status(RecordStatus::Active)
            .with_consequences(consequences);
        self.process_event(
            Source::Agent,
            EventKind::Decision,
            title,
            context.into(),
            Some(intent),
        )
    }

    /// Admin operation: activate a draft proposal, superseding the decisions
    /// it suggests. The record keeps its proposal kind (kinds are immutable);
    /// only the status flips.
    pub fn accept_proposal(&self, proposal_id: &str) -> Result<MemoryDecision> {
        let (event, _) = self.semantic.read_record(proposal_id)?;
        if event.kind != EventKind::Proposal || event.status() != Some(RecordStatus::Draft) {
            return Err(MemoryError::Transition(format!(
                "{proposal_id} is not a draft proposal"
            )));
        }
        let suggested = event
            .context
            .as_decision()
            .map(|d| d.suggested_supersedes.clone())
            .unwrap_or_default();

        self.semantic.transaction(|store| {
            for old_id in &suggested {
                let mut patch = ContextPatch::new();
                patch.insert("status".into(), serde_json::json!("superseded"));
                store.update_decision(old_id, &patch, &format!("Resolution: {old_id} demoted"))?;
            }

            let mut patch = ContextPatch::new();
            patch.insert("status".into(), serde_json::json!("active"));
            if !suggested.is_empty() {
                patch.insert("supersedes".into(), serde_json::json!(suggested));
            }
            store.update_decision(proposal_id, &patch, "Proposal accepted")?;

            for old_id in &suggested {
                let mut patch = ContextPatch::new();
                patch.insert("superseded_by".into(), serde_json::json!(proposal_id));
                store.update_decision(
                    old_id,
                    &patch,
                    &format!("Superseded by {proposal_id}"),
                )?;
            }
            Ok(())
        })?;

        let (event, _) = self.semantic.read_record(proposal_id)?;
        self.index_record(proposal_id, &event)?;

        let mut decision =
            MemoryDecision::persist(StoreType::Semantic, "Proposal accepted", 5);
        decision.file_id = Some(proposal_id.to_string());
        Ok(decision)
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// All record ids in the semantic store.
    pub fn get_decisions(&self) -> Result<Vec<String>> {
        self.semantic.list_decisions()
    }

    /// Recent episodic rows, newest first.
    pub fn get_recent_events(
        &self,
        limit: usize,
        include_archived: bool,
    ) -> Result<Vec<EpisodicRow>> {
        let status = if include_archived {
            None
        } else {
            Some(RowStatus::Active)
        };
        self.episodic.query(limit, status, None, None)
    }

    /// Manually link an episodic row to a semantic record.
    pub fn link_evidence(&self, event_id: i64, semantic_id: &str) -> Result<()> {
        self.episodic.link_to_semantic(event_id, semantic_id)
    }

    /// Similarity search over the semantic corpus.
    pub fn search_decisions(
        &self,
        query: &str,
        limit: usize,
        mode: SearchMode,
    ) -> Result<Vec<SearchHit>> {
        let query_vec = self.embedder.embed(query);
        let mut hits = self.vectors.search(&query_vec, usize::MAX)?;

        let rows: HashMap<String, crate::store::meta::MetaRow> = self
            .semantic
            .meta_rows()?
            .into_iter()
            .map(|row| (row.id.clone(), row))
            .collect();

        for hit in &mut hits {
            if let Some(row) = rows.get(&hit.id) {
                hit.status = Some(row.status.as_str().to_string());
                hit.target = Some(row.target.clone());
            }
        }

        let filtered: Vec<SearchHit> = match mode {
            SearchMode::Strict => hits
                .into_iter()
                .filter(|hit| {
                    rows.get(&hit.id).is_some_and(|row| {
                        row.kind == EventKind::Decision && row.status == RecordStatus::Active
                    })
                })
                .collect(),
            SearchMode::Balanced => {
                // One representative per target: its latest active record.
                let mut latest_active: HashMap<&str, &crate::store::meta::MetaRow> =
                    HashMap::new();
                for row in rows.values() {
                    if row.status != RecordStatus::Active {
                        continue;
                    }
                    let slot = latest_active.entry(row.target.as_str()).or_insert(row);
                    if row.timestamp > slot.timestamp {
                        *slot = row;
                    }
                }
                let keep: HashSet<&str> =
                    latest_active.values().map(|row| row.id.as_str()).collect();
                hits.into_iter()
                    .filter(|hit| keep.contains(hit.id.as_str()))
                    .collect()
            }
            SearchMode::Audit => hits,
        };

        Ok(filtered.into_iter().take(limit).collect())
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Execute (or preview) episodic decay.
    pub fn run_decay(&self, dry_run: bool) -> Result<DecayReport> {
        let mut rows = self
            .episodic
            .query(10_000, Some(RowStatus::Active), None, None)?;
        rows.extend(
            self.episodic
                .query(10_000, Some(RowStatus::Archived), None, None)?,
        );
        let referenced = self.referenced_event_ids()?;
        let partition = self.decay.evaluate(&rows, &referenced, Utc::now());

        if !dry_run {
            self.episodic.mark_archived(&partition.to_archive)?;
            self.episodic.physical_prune(&partition.to_prune)?;
        }
        Ok(partition.report())
    }

    /// Run one reflection cycle; returns the record ids touched.
    pub fn run_reflection(&self) -> Result<Vec<String>> {
        let engine = ReflectionEngine::new(
            &self.episodic,
            &self.semantic,
            self.reflection,
            self.distiller.as_ref(),
        );
        let touched = engine.run_cycle()?;
        for id in &touched {
            if let Ok((event, _)) = self.semantic.read_record(id) {
                self.index_record(id, &event)?;
            }
        }
        Ok(touched)
    }

    // ========================================================================
    // INTERNAL
    // ========================================================================

    fn index_record(&self, id: &str, event: &MemoryEvent) -> Result<()> {
        let text = match event.context.as_decision() {
            Some(decision) => format!("{}\n{}", decision.title, decision.rationale),
            None => event.content.clone(),
        };
        self.vectors
            .upsert(id, &self.embedder.embed(&text), &event.content)
    }

    /// Embed records present on disk but absent from the vector index.
    fn index_missing_records(&self) -> Result<()> {
        let indexed: HashSet<String> = self.vectors.indexed_ids()?.into_iter().collect();
        for id in self.semantic.list_decisions()? {
            if indexed.contains(&id) {
                continue;
            }
            match self.semantic.read_record(&id) {
                Ok((event, _)) => self.index_record(&id, &event)?,
                Err(err) => warn!(%id, %err, "skipping unindexable record"),
            }
        }
        Ok(())
    }

    /// Episodic row ids referenced as evidence by any semantic record.
    fn referenced_event_ids(&self) -> Result<HashSet<i64>> {
        let mut referenced = HashSet::new();
        for id in self.semantic.list_decisions()? {
            let Ok((event, _)) = self.semantic.read_record(&id) else {
                continue;
            };
            if let Some(decision) = event.context.as_decision() {
                referenced.extend(decision.evidence_event_ids.iter().copied());
                referenced.extend(decision.counter_evidence_event_ids.iter().copied());
            }
        }
        Ok(referenced)
    }
}
