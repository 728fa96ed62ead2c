//! Hybrid retrieval: lexical and vector rankings merged with weighted Reciprocal Rank Fusion.

use std::{
	cmp::Ordering,
	collections::{HashMap, hash_map::Entry},
	time::Duration,
};

use serde::Serialize;
use tokio::time;

use sift_config::{Search, SearchWeights};
use sift_domain::{
	AtomicUnit, DocumentMeta, FilterNode, LexicalHit, VectorFilter, VectorHit, check_operands,
	compile_lexical_all, compile_vector_all,
};

use crate::{Collaborators, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Weights {
	pub lexical: f32,
	pub semantic: f32,
}
impl Weights {
	pub fn new(lexical: f32, semantic: f32) -> Self {
		Self { lexical, semantic }
	}

	pub fn validate(&self) -> Result<()> {
		for (label, weight) in [("lexical", self.lexical), ("semantic", self.semantic)] {
			if !weight.is_finite() || weight < 0.0 {
				return Err(Error::InvalidRequest {
					message: format!("{label} weight must be a finite number, zero or greater."),
				});
			}
		}

		if self.lexical == 0.0 && self.semantic == 0.0 {
			return Err(Error::InvalidRequest {
				message: "lexical and semantic weights must not both be zero.".to_string(),
			});
		}

		Ok(())
	}
}
impl Default for Weights {
	fn default() -> Self {
		Self::from(SearchWeights::default())
	}
}
impl From<SearchWeights> for Weights {
	fn from(weights: SearchWeights) -> Self {
		Self { lexical: weights.lexical, semantic: weights.semantic }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
	EmbeddingFailed,
	Timeout,
	VectorQueryFailed,
	EmptyEmbedding,
	DimensionMismatch,
}
impl DegradedReason {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::EmbeddingFailed => "embedding_failed",
			Self::Timeout => "timeout",
			Self::VectorQueryFailed => "vector_query_failed",
			Self::EmptyEmbedding => "empty_embedding",
			Self::DimensionMismatch => "dimension_mismatch",
		}
	}
}

/// Result of the embed-then-query stage. A degraded stage contributes nothing to fusion.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorOutcome {
	Retrieved(Vec<VectorHit>),
	Degraded { reason: DegradedReason },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedBoost {
	pub name: String,
	pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedItem {
	pub unit_id: String,
	pub lexical_rank: Option<u32>,
	pub vector_rank: Option<u32>,
	/// Pure RRF contribution before boosts.
	pub base_score: f32,
	pub boosts: Vec<AppliedBoost>,
	pub combined_score: f32,
	pub unit: AtomicUnit,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions<'a> {
	pub limit: u32,
	pub weights: Weights,
	pub filters: &'a [FilterNode],
	pub source: Option<&'a str>,
	pub format: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct FusionOutcome {
	pub items: Vec<RankedItem>,
	pub degraded: Option<DegradedReason>,
}

pub struct FusionEngine {
	cfg: Search,
	vector_dim: u32,
	collaborators: Collaborators,
}
impl FusionEngine {
	pub fn new(cfg: Search, vector_dim: u32, collaborators: Collaborators) -> Self {
		Self { cfg, vector_dim, collaborators }
	}

	#[tracing::instrument(skip_all, fields(limit = options.limit, filters = options.filters.len()))]
	pub async fn search(&self, query: &str, options: &SearchOptions<'_>) -> Result<FusionOutcome> {
		options.weights.validate()?;
		check_operands(options.filters)?;

		if options.limit == 0 {
			return Ok(FusionOutcome { items: Vec::new(), degraded: None });
		}

		let fragment = compile_lexical_all(options.filters);
		let vector_compiled = compile_vector_all(options.filters);
		// A partial vector filter can be stricter than the full tree under negation, so the vector
		// query runs unfiltered in that case.
		let vector_filter =
			if vector_compiled.is_complete() { vector_compiled.filter } else { None };
		let lexical_stage =
			self.collaborators.lexical.query_text(query, &fragment, self.cfg.candidate_k);
		let vector_stage = time::timeout(
			Duration::from_millis(self.cfg.vector_timeout_ms),
			self.retrieve_vector(query, vector_filter.as_ref()),
		);
		let (lexical, vector) = tokio::join!(lexical_stage, vector_stage);
		let lexical = lexical.map_err(|err| Error::UpstreamUnavailable {
			message: format!("lexical index: {err}"),
		})?;
		let vector = vector.unwrap_or_else(|_| {
			tracing::warn!(
				reason = DegradedReason::Timeout.as_str(),
				timeout_ms = self.cfg.vector_timeout_ms,
				"Vector stage degraded; continuing lexical-only."
			);

			VectorOutcome::Degraded { reason: DegradedReason::Timeout }
		});
		let (vector_hits, degraded) = match vector {
			VectorOutcome::Retrieved(hits) => (hits, None),
			VectorOutcome::Degraded { reason } => (Vec::new(), Some(reason)),
		};
		let lexical_count = lexical.len();
		let vector_count = vector_hits.len();
		let fused = fuse_rankings(&lexical, &vector_hits, options.weights, self.cfg.rrf_k);
		let mut items = self.resolve(fused).await?;

		// Payload matching treats missing values and arrays differently from SQL, so vector-only
		// candidates are re-checked even when the filter was pushed down.
		if !options.filters.is_empty() {
			items.retain(|item| {
				item.lexical_rank.is_some()
					|| options.filters.iter().all(|filter| filter.matches(&item.unit))
			});
		}

		for item in &mut items {
			self.apply_boosts(item);
		}

		if options.source.is_some() || options.format.is_some() {
			items = self.filter_by_document(items, options.source, options.format).await?;
		}

		items.sort_by(cmp_ranked);
		items.truncate(options.limit as usize);

		tracing::debug!(
			lexical_count,
			vector_count,
			fused_count = items.len(),
			degraded = degraded.map(DegradedReason::as_str),
			"Fusion completed."
		);

		Ok(FusionOutcome { items, degraded })
	}

	/// Plain tag lookup against the lexical store; no ranking is involved.
	pub async fn search_by_tag(&self, tag: &str) -> Result<Vec<AtomicUnit>> {
		let tag = tag.trim();

		if tag.is_empty() {
			return Err(Error::InvalidRequest { message: "tag must be non-empty.".to_string() });
		}

		self.collaborators.lexical.find_by_tag(tag, self.cfg.max_limit).await.map_err(|err| {
			Error::UpstreamUnavailable { message: format!("lexical index: {err}") }
		})
	}

	async fn retrieve_vector(&self, query: &str, filter: Option<&VectorFilter>) -> VectorOutcome {
		let vector = match self.collaborators.embedding.embed(query).await {
			Ok(vector) => vector,
			Err(err) => return degrade(DegradedReason::EmbeddingFailed, &err),
		};

		if vector.is_empty() {
			return degrade(DegradedReason::EmptyEmbedding, &"provider returned an empty vector");
		}
		if vector.len() != self.vector_dim as usize {
			return degrade(
				DegradedReason::DimensionMismatch,
				&format!("expected {} dimensions, got {}", self.vector_dim, vector.len()),
			);
		}

		match self.collaborators.vector.query_vector(&vector, filter, self.cfg.candidate_k).await {
			Ok(hits) => VectorOutcome::Retrieved(hits),
			Err(err) => degrade(DegradedReason::VectorQueryFailed, &err),
		}
	}

	async fn resolve(&self, fused: Vec<Fused>) -> Result<Vec<RankedItem>> {
		let ids: Vec<String> = fused.iter().map(|candidate| candidate.unit_id.clone()).collect();
		let mut units: HashMap<String, AtomicUnit> = self
			.collaborators
			.units
			.resolve_many(&ids)
			.await
			.map_err(|err| Error::UpstreamUnavailable { message: format!("unit store: {err}") })?
			.into_iter()
			.map(|unit| (unit.id.clone(), unit))
			.collect();
		let mut items = Vec::with_capacity(fused.len());

		for candidate in fused {
			let Some(unit) = units.remove(&candidate.unit_id) else {
				tracing::debug!(unit_id = %candidate.unit_id, "Dropping unresolvable candidate.");

				continue;
			};

			items.push(RankedItem {
				unit_id: candidate.unit_id,
				lexical_rank: candidate.lexical_rank,
				vector_rank: candidate.vector_rank,
				base_score: candidate.score,
				boosts: Vec::new(),
				combined_score: candidate.score,
				unit,
			});
		}

		Ok(items)
	}

	fn apply_boosts(&self, item: &mut RankedItem) {
		let boosts = &self.cfg.boosts;

		for (tag, score) in
			[(&boosts.multi_chunk_tag, boosts.multi_chunk), (&boosts.image_tag, boosts.image)]
		{
			if score != 0.0 && item.unit.has_tag(tag) {
				item.combined_score += score;
				item.boosts.push(AppliedBoost { name: tag.clone(), score });
			}
		}
	}

	async fn filter_by_document(
		&self,
		items: Vec<RankedItem>,
		source: Option<&str>,
		format: Option<&str>,
	) -> Result<Vec<RankedItem>> {
		let mut documents: HashMap<String, Option<DocumentMeta>> = HashMap::new();
		let mut kept = Vec::with_capacity(items.len());

		for item in items {
			let Some(document_id) = item.unit.document_id.as_deref() else {
				continue;
			};
			let document = match documents.entry(document_id.to_string()) {
				Entry::Occupied(entry) => entry.into_mut(),
				Entry::Vacant(entry) => {
					let meta = self
						.collaborators
						.units
						.resolve_document(document_id)
						.await
						.map_err(|err| Error::UpstreamUnavailable {
							message: format!("unit store: {err}"),
						})?;

					entry.insert(meta)
				},
			};
			let Some(document) = document.as_ref() else {
				continue;
			};

			if source.is_some_and(|source| source != document.source_id) {
				continue;
			}
			if format.is_some_and(|format| format != document.format) {
				continue;
			}

			kept.push(item);
		}

		Ok(kept)
	}
}

#[derive(Debug, Clone, PartialEq)]
struct Fused {
	unit_id: String,
	lexical_rank: Option<u32>,
	vector_rank: Option<u32>,
	score: f32,
}

/// `weight / (rank + k + 1)` summed over the rankings an id appears in. Repeated ids keep their
/// best rank.
fn fuse_rankings(lexical: &[LexicalHit], vector: &[VectorHit], weights: Weights, k: f32) -> Vec<Fused> {
	let mut order: Vec<String> = Vec::new();
	let mut ranks: HashMap<String, (Option<u32>, Option<u32>)> = HashMap::new();

	for hit in lexical {
		let slot = ranks.entry(hit.unit_id.clone()).or_insert_with(|| {
			order.push(hit.unit_id.clone());

			(None, None)
		});

		slot.0 = Some(slot.0.map_or(hit.rank, |rank| rank.min(hit.rank)));
	}
	for hit in vector {
		let slot = ranks.entry(hit.unit_id.clone()).or_insert_with(|| {
			order.push(hit.unit_id.clone());

			(None, None)
		});

		slot.1 = Some(slot.1.map_or(hit.rank, |rank| rank.min(hit.rank)));
	}

	order
		.into_iter()
		.map(|unit_id| {
			let (lexical_rank, vector_rank) = ranks.get(&unit_id).copied().unwrap_or_default();
			let score = contribution(weights.lexical, lexical_rank, k)
				+ contribution(weights.semantic, vector_rank, k);

			Fused { unit_id, lexical_rank, vector_rank, score }
		})
		.collect()
}

fn contribution(weight: f32, rank: Option<u32>, k: f32) -> f32 {
	rank.map_or(0.0, |rank| weight / (rank as f32 + k + 1.0))
}

fn degrade(reason: DegradedReason, err: &dyn std::fmt::Display) -> VectorOutcome {
	tracing::warn!(
		reason = reason.as_str(),
		error = %err,
		"Vector stage degraded; continuing lexical-only."
	);

	VectorOutcome::Degraded { reason }
}

fn cmp_ranked(a: &RankedItem, b: &RankedItem) -> Ordering {
	cmp_f32_desc(a.combined_score, b.combined_score)
		.then_with(|| rank_asc(a.lexical_rank).cmp(&rank_asc(b.lexical_rank)))
		.then_with(|| a.unit_id.cmp(&b.unit_id))
}

fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

fn rank_asc(rank: Option<u32>) -> u32 {
	rank.unwrap_or(u32::MAX)
}
