use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use sift_domain::{AtomicUnit, FilterNode};

use crate::{
	Error, Result, SiftService,
	cache::{self, CacheEntry, CacheKeyOptions},
	fusion::{DegradedReason, RankedItem, SearchOptions, Weights},
};

#[derive(Debug, Clone)]
pub struct SearchRequest {
	pub query: String,
	/// Combined with AND.
	pub filters: Vec<FilterNode>,
	/// Falls back to `search.weights` from configuration.
	pub weights: Option<Weights>,
	pub source: Option<String>,
	pub format: Option<String>,
	/// One-based.
	pub page: u32,
	pub page_size: u32,
	/// Recompute even when a cached ranking exists, then refresh the entry.
	pub bypass_cache: bool,
}
impl SearchRequest {
	pub fn new(query: impl Into<String>) -> Self {
		Self {
			query: query.into(),
			filters: Vec::new(),
			weights: None,
			source: None,
			format: None,
			page: 1,
			page_size: 20,
			bypass_cache: false,
		}
	}

	/// Replaces the filters with a parsed external filter list.
	pub fn with_filters_json(mut self, raw: &Value) -> Result<Self> {
		self.filters = FilterNode::parse_list(raw).inspect_err(|err| {
			tracing::info!(path = %err.path, message = %err.message, "Rejected search filter.");
		})?;

		Ok(self)
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
	pub results: Vec<RankedItem>,
	/// Size of the full ranking before paging.
	pub total: usize,
	pub query_time_ms: u64,
	pub cached: bool,
	pub degraded: Option<DegradedReason>,
	pub page: u32,
	pub page_size: u32,
}

impl SiftService {
	/// Cache-fronted hybrid search. The cache stores the whole ranking up to `search.max_limit`;
	/// the requested page is sliced from it.
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let started = Instant::now();
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}
		if req.page == 0 {
			return Err(Error::InvalidRequest { message: "page starts at 1.".to_string() });
		}
		if req.page_size == 0 || req.page_size > self.cfg.search.max_limit {
			return Err(Error::InvalidRequest {
				message: format!(
					"page_size must be between 1 and {}.",
					self.cfg.search.max_limit
				),
			});
		}

		let weights = req.weights.unwrap_or_else(|| Weights::from(self.cfg.search.weights));

		weights.validate()?;

		let key = cache::generate_key(&CacheKeyOptions {
			query,
			weights,
			filters: &req.filters,
			source: req.source.as_deref(),
			format: req.format.as_deref(),
			page_size: req.page_size,
		});

		if let Some(cache) = &self.cache
			&& !req.bypass_cache
			&& let Some(entry) = cache.get(&key)
		{
			return Ok(SearchResponse {
				results: page_of(&entry.results, req.page, req.page_size),
				total: entry.total,
				query_time_ms: elapsed_ms(started),
				cached: true,
				degraded: None,
				page: req.page,
				page_size: req.page_size,
			});
		}

		let outcome = self
			.engine
			.search(
				query,
				&SearchOptions {
					limit: self.cfg.search.max_limit,
					weights,
					filters: &req.filters,
					source: req.source.as_deref(),
					format: req.format.as_deref(),
				},
			)
			.await?;
		let query_time_ms = elapsed_ms(started);
		let total = outcome.items.len();
		let results = page_of(&outcome.items, req.page, req.page_size);

		// Degraded rankings are served but not cached, so recovery of the vector stage is visible
		// on the next request.
		if let Some(cache) = &self.cache
			&& outcome.degraded.is_none()
		{
			cache.set(key, CacheEntry::new(outcome.items, query_time_ms), None);
		}

		Ok(SearchResponse {
			results,
			total,
			query_time_ms,
			cached: false,
			degraded: outcome.degraded,
			page: req.page,
			page_size: req.page_size,
		})
	}

	pub async fn search_by_tag(&self, tag: &str) -> Result<Vec<AtomicUnit>> {
		self.engine.search_by_tag(tag).await
	}
}

fn page_of(items: &[RankedItem], page: u32, page_size: u32) -> Vec<RankedItem> {
	let start = (page as usize - 1).saturating_mul(page_size as usize);

	items.iter().skip(start).take(page_size as usize).cloned().collect()
}

fn elapsed_ms(started: Instant) -> u64 {
	u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
