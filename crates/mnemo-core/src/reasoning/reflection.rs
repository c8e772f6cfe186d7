//! Reflection engine
//!
//! Periodic analyzer over the episodic log: clusters evidence by target,
//! maintains competing draft proposals with falsification-aware confidence,
//! and decays hypotheses that gather no new evidence. Drafts either mature
//! toward review or fall to `rejected`; drafts contradicted by observed
//! successes are marked `falsified`.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::error::Result;
use crate::event::{DecisionContent, EventKind, MemoryEvent, RecordStatus, Source};
use crate::store::episodic::{EpisodicRow, EpisodicStore, RowStatus};
use crate::store::semantic::{ContextPatch, SemanticStore};

/// Tunables for one reflection engine instance.
#[derive(Debug, Clone, Copy)]
pub struct ReflectionPolicy {
    /// Errors per cluster before new hypotheses are generated.
    pub error_threshold: u64,
    /// Confidence floor below which a decayed draft is rejected.
    pub min_confidence: f64,
    /// Minimum evidence span before a draft may be marked ready.
    pub observation_window: Duration,
    /// Confidence lost per cycle by untouched drafts.
    pub decay_rate: f64,
    /// Confidence needed (with a full window) for `ready_for_review`.
    pub ready_threshold: f64,
}

impl Default for ReflectionPolicy {
    fn default() -> Self {
        Self {
            error_threshold: 3,
            min_confidence: 0.3,
            observation_window: Duration::hours(12),
            decay_rate: 0.05,
            ready_threshold: 0.8,
        }
    }
}

/// External trajectory distiller. Invoked at the start of every cycle; each
/// returned context becomes a new draft proposal.
pub trait Distiller: Send + Sync {
    fn distill_trajectories(&self, episodic: &EpisodicStore) -> Result<Vec<DecisionContent>>;
}

/// Distiller that contributes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDistiller;

impl Distiller for NullDistiller {
    fn distill_trajectories(&self, _episodic: &EpisodicStore) -> Result<Vec<DecisionContent>> {
        Ok(Vec::new())
    }
}

/// Evidence aggregated for one target within a cycle.
#[derive(Debug, Clone)]
pub struct EvidenceCluster {
    pub errors: u64,
    pub successes: u64,
    pub error_event_ids: Vec<i64>,
    pub success_event_ids: Vec<i64>,
    pub last_seen: DateTime<Utc>,
}

/// Competitive-hypothesis reflection over the two stores.
pub struct ReflectionEngine<'a> {
    episodic: &'a EpisodicStore,
    semantic: &'a SemanticStore,
    policy: ReflectionPolicy,
    distiller: &'a dyn Distiller,
}

impl<'a> ReflectionEngine<'a> {
    pub fn new(
        episodic: &'a EpisodicStore,
        semantic: &'a SemanticStore,
        policy: ReflectionPolicy,
        distiller: &'a dyn Distiller,
    ) -> Self {
        Self {
            episodic,
            semantic,
            policy,
            distiller,
        }
    }

    /// Run one analysis cycle; returns the record ids touched.
    pub fn run_cycle(&self) -> Result<Vec<String>> {
        info!("starting reflection cycle");
        let mut touched = Vec::new();

        // Distillation: externally ground-truthed procedural proposals.
        for mut content in self.distiller.distill_trajectories(self.episodic)? {
            content.status = Some(RecordStatus::Draft);
            if content.first_observed_at.is_none() {
                content.first_observed_at = Some(Utc::now());
            }
            let title = content.title.clone();
            let event =
                MemoryEvent::new(Source::System, EventKind::Proposal, title, content.into())?;
            touched.push(self.semantic.save(&event)?);
        }

        // Evidence aggregation.
        let recent = self
            .episodic
            .query(1000, Some(RowStatus::Active), None, None)?;
        let clusters = cluster_evidence(&recent);

        let drafts = self.all_draft_proposals()?;
        let mut processed: HashSet<String> = HashSet::new();

        // Update and falsify existing hypotheses; spawn competitors where a
        // cluster runs hot without a strong explanation.
        for (target, stats) in &clusters {
            let relevant: Vec<&(String, MemoryEvent)> = drafts
                .iter()
                .filter(|(_, event)| event.target() == Some(target.as_str()))
                .collect();
            let has_strong = relevant
                .iter()
                .any(|(_, event)| confidence_of(event) > 0.7);

            for (id, event) in &relevant {
                self.evaluate_hypothesis(id, event, stats)?;
                processed.insert(id.clone());
                touched.push(id.clone());
            }

            if stats.errors >= self.policy.error_threshold && !has_strong {
                touched.extend(self.generate_competing_hypotheses(target, stats)?);
            }
        }

        // Global decay for drafts untouched this cycle.
        for (id, event) in &drafts {
            if !processed.contains(id) {
                self.apply_decay(id, event)?;
                touched.push(id.clone());
            }
        }

        Ok(touched)
    }

    fn all_draft_proposals(&self) -> Result<Vec<(String, MemoryEvent)>> {
        let mut drafts = Vec::new();
        for id in self.semantic.list_decisions()? {
            let Ok((event, _)) = self.semantic.read_record(&id) else {
                continue;
            };
            if event.kind == EventKind::Proposal && event.status() == Some(RecordStatus::Draft) {
                drafts.push((id, event));
            }
        }
        Ok(drafts)
    }

    /// Pit one hypothesis against the cycle's evidence. Successes in the same
    /// target area count as falsification pressure.
    fn evaluate_hypothesis(
        &self,
        id: &str,
        event: &MemoryEvent,
        stats: &EvidenceCluster,
    ) -> Result<()> {
        let Some(ctx) = event.context.as_decision() else {
            return Ok(());
        };
        let prior = confidence_of(event);

        if stats.successes > stats.errors * 2 && prior > 0.5 {
            warn!(%id, "falsification triggered: success rate contradicts hypothesis");
            let mut patch = ContextPatch::new();
            patch.insert("status".into(), serde_json::json!("falsified"));
            patch.insert("confidence".into(), serde_json::json!(0.1));
            patch.insert(
                "rationale".into(),
                serde_json::json!(format!(
                    "FALSIFIED: observed {} successes contradicting the recorded error pattern",
                    stats.successes
                )),
            );
            return self.semantic.update_decision(
                id,
                &patch,
                "Reflection: hypothesis falsified by counter-evidence",
            );
        }

        let errors = ctx.hit_count.unwrap_or(0) + stats.errors;
        let successes = ctx.miss_count.unwrap_or(0) + stats.successes;
        let total = errors + successes;
        let confidence =
            ((errors as f64 - successes as f64) / (total as f64 + 1.0)).max(0.0);

        let first_seen = ctx.first_observed_at.unwrap_or(event.timestamp);
        let ready = confidence >= self.policy.ready_threshold
            && (stats.last_seen - first_seen) >= self.policy.observation_window;

        let counter_evidence: BTreeSet<i64> = ctx
            .counter_evidence_event_ids
            .iter()
            .copied()
            .chain(stats.success_event_ids.iter().copied())
            .collect();

        let mut patch = ContextPatch::new();
        patch.insert("confidence".into(), serde_json::json!(confidence));
        patch.insert("hit_count".into(), serde_json::json!(errors));
        patch.insert("miss_count".into(), serde_json::json!(successes));
        patch.insert("ready_for_review".into(), serde_json::json!(ready));
        patch.insert("last_observed_at".into(), serde_json::json!(stats.last_seen));
        patch.insert(
            "counter_evidence_event_ids".into(),
            serde_json::json!(counter_evidence.into_iter().collect::<Vec<_>>()),
        );
        self.semantic.update_decision(
            id,
            &patch,
            &format!("Reflection: confidence re-evaluated to {:.2}", confidence),
        )
    }

    /// Spawn a fix hypothesis and an observe-for-transient hypothesis for a
    /// hot cluster, cross-linked as competitors.
    fn generate_competing_hypotheses(
        &self,
        target: &str,
        stats: &EvidenceCluster,
    ) -> Result<Vec<String>> {
        let mut fix = DecisionContent::new(
            format!("Fix recurring issue in {target}"),
            target,
            format!(
                "Pattern of {} errors indicates a missing constraint or rule.",
                stats.errors
            ),
        );
        fix.confidence = Some(0.5);

        let mut observe = DecisionContent::new(
            format!("Observe {target} for transient failures"),
            target,
            "Failures may be environmental; more observation is needed before locking in a rule."
                .to_string(),
        );
        observe.confidence = Some(0.4);

        let now = Utc::now();
        let mut ids = Vec::new();
        for mut content in [fix, observe] {
            content.status = Some(RecordStatus::Draft);
            content.evidence_event_ids = stats.error_event_ids.clone();
            content.first_observed_at = Some(now);
            let title = content.title.clone();
            let event =
                MemoryEvent::new(Source::System, EventKind::Proposal, title, content.into())?;
            ids.push(self.semantic.save(&event)?);
        }

        // Cross-link the competitors.
        for id in &ids {
            let competitors: Vec<&String> = ids.iter().filter(|other| *other != id).collect();
            let mut patch = ContextPatch::new();
            patch.insert(
                "competing_proposal_ids".into(),
                serde_json::json!(competitors),
            );
            self.semantic
                .update_decision(id, &patch, "Reflection: linking competing hypotheses")?;
        }

        Ok(ids)
    }

    fn apply_decay(&self, id: &str, event: &MemoryEvent) -> Result<()> {
        let confidence = (confidence_of(event) - self.policy.decay_rate).max(0.0);
        let mut patch = ContextPatch::new();
        patch.insert("confidence".into(), serde_json::json!(confidence));
        if confidence < self.policy.min_confidence {
            patch.insert("status".into(), serde_json::json!("rejected"));
            self.semantic.update_decision(
                id,
                &patch,
                "Reflection: hypothesis rejected for lack of new evidence",
            )
        } else {
            self.semantic
                .update_decision(id, &patch, "Reflection: applied decay")
        }
    }
}

fn confidence_of(event: &MemoryEvent) -> f64 {
    event
        .context
        .as_decision()
        .and_then(|d| d.confidence)
        .unwrap_or(0.0)
}

/// Group recent rows by target, counting errors against successes.
pub fn cluster_evidence(rows: &[EpisodicRow]) -> BTreeMap<String, EvidenceCluster> {
    let mut clusters: BTreeMap<String, EvidenceCluster> = BTreeMap::new();
    for row in rows {
        let target = row.target().unwrap_or("general").to_string();
        let cluster = clusters.entry(target).or_insert_with(|| EvidenceCluster {
            errors: 0,
            successes: 0,
            error_event_ids: Vec::new(),
            success_event_ids: Vec::new(),
            last_seen: row.timestamp,
        });
        match row.kind {
            EventKind::Error => {
                cluster.errors += 1;
                cluster.error_event_ids.push(row.id);
            }
            EventKind::Result => {
                cluster.successes += 1;
                cluster.success_event_ids.push(row.id);
            }
            _ => {}
        }
        cluster.last_seen = cluster.last_seen.max(row.timestamp);
    }
    clusters
}
