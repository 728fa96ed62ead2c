//! In-process result cache with strict LRU eviction and lazy TTL expiry.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex, MutexGuard},
	time::{Duration, Instant},
};

use serde::Serialize;
use serde_json::Value;

use sift_domain::{FilterNode, canonical_list_key};

use crate::fusion::{RankedItem, Weights};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
	pub max_size: usize,
	pub default_ttl: Duration,
}
impl From<&sift_config::Cache> for CacheConfig {
	fn from(cfg: &sift_config::Cache) -> Self {
		Self { max_size: cfg.max_size, default_ttl: Duration::from_millis(cfg.default_ttl_ms) }
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
	pub results: Vec<RankedItem>,
	pub total: usize,
	pub query_time_ms: u64,
	pub facets: Option<Value>,
	pub inserted_at: Instant,
	pub ttl: Duration,
}
impl CacheEntry {
	/// The insertion time and TTL are stamped by [`ResultCache::set`].
	pub fn new(results: Vec<RankedItem>, query_time_ms: u64) -> Self {
		Self {
			total: results.len(),
			results,
			query_time_ms,
			facets: None,
			inserted_at: Instant::now(),
			ttl: Duration::ZERO,
		}
	}

	pub fn is_expired(&self, now: Instant) -> bool {
		now.saturating_duration_since(self.inserted_at) >= self.ttl
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
	pub size: usize,
	pub max_size: usize,
	pub hits: u64,
	pub misses: u64,
	/// Percentage in `[0, 100]`; zero when nothing was looked up since the last reset.
	pub hit_rate: f64,
	pub evictions: u64,
	pub expirations: u64,
}

/// Everything that determines a base ranking. The page number is deliberately absent: every page
/// of a query is sliced from the same entry.
#[derive(Debug, Clone, Copy)]
pub struct CacheKeyOptions<'a> {
	pub query: &'a str,
	pub weights: Weights,
	pub filters: &'a [FilterNode],
	pub source: Option<&'a str>,
	pub format: Option<&'a str>,
	pub page_size: u32,
}

/// Builds a deterministic key. Filter lists are canonicalized, so input order does not matter.
pub fn generate_key(options: &CacheKeyOptions<'_>) -> String {
	serde_json::json!({
		"query": options.query.trim(),
		"weights": [options.weights.lexical, options.weights.semantic],
		"filters": canonical_list_key(options.filters),
		"source": options.source,
		"format": options.format,
		"page_size": options.page_size,
	})
	.to_string()
}

/// Short, log-safe identifier for a key.
pub fn cache_key_prefix(key: &str) -> String {
	let hash = blake3::hash(key.as_bytes()).to_hex();

	hash.as_str()[..12].to_string()
}

pub struct ResultCache {
	state: Mutex<LruState>,
}
impl ResultCache {
	pub fn new(cfg: CacheConfig) -> Self {
		Self { state: Mutex::new(LruState::new(cfg)) }
	}

	/// Applies new limits. Shrinking evicts least recently used entries right away.
	pub fn configure(&self, cfg: CacheConfig) {
		let mut state = self.lock();

		state.max_size = cfg.max_size.max(1);
		state.default_ttl = cfg.default_ttl;

		state.enforce_capacity(0);
	}

	/// Returns a live entry and marks it most recently used. Expired entries are removed and
	/// counted as misses.
	pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
		let mut state = self.lock();
		let Some(idx) = state.index.get(key).copied() else {
			state.misses += 1;

			tracing::debug!(cache_key_prefix = %cache_key_prefix(key), hit = false, "Cache miss.");

			return None;
		};
		let entry = state.node(idx).map(|node| node.entry.clone())?;

		if entry.is_expired(Instant::now()) {
			state.remove(idx);

			state.misses += 1;
			state.expirations += 1;

			tracing::debug!(
				cache_key_prefix = %cache_key_prefix(key),
				hit = false,
				expired = true,
				"Cache miss."
			);

			return None;
		}

		state.hits += 1;

		state.touch(idx);

		tracing::debug!(cache_key_prefix = %cache_key_prefix(key), hit = true, "Cache hit.");

		Some(entry)
	}

	/// Stores `entry` as most recently used, stamping its insertion time and TTL.
	pub fn set(&self, key: impl Into<String>, mut entry: CacheEntry, ttl: Option<Duration>) {
		let key = key.into();
		let mut state = self.lock();

		entry.inserted_at = Instant::now();
		entry.ttl = ttl.unwrap_or(state.default_ttl);

		state.insert(key, Arc::new(entry));
	}

	pub fn invalidate_all(&self) -> usize {
		let mut state = self.lock();
		let removed = state.index.len();

		state.nodes.clear();
		state.free.clear();
		state.index.clear();

		state.head = None;
		state.tail = None;

		removed
	}

	/// Removes every entry whose key satisfies `predicate` and returns the count.
	pub fn invalidate_where<F>(&self, predicate: F) -> usize
	where
		F: Fn(&str) -> bool,
	{
		let mut state = self.lock();
		let matched: Vec<usize> =
			state.index.iter().filter(|(key, _)| predicate(key)).map(|(_, idx)| *idx).collect();

		for idx in &matched {
			state.remove(*idx);
		}

		matched.len()
	}

	pub fn stats(&self) -> CacheStats {
		let state = self.lock();
		let lookups = state.hits + state.misses;
		let hit_rate =
			if lookups == 0 { 0.0 } else { state.hits as f64 / lookups as f64 * 100.0 };

		CacheStats {
			size: state.index.len(),
			max_size: state.max_size,
			hits: state.hits,
			misses: state.misses,
			hit_rate,
			evictions: state.evictions,
			expirations: state.expirations,
		}
	}

	pub fn clear_stats(&self) {
		let mut state = self.lock();

		state.hits = 0;
		state.misses = 0;
		state.evictions = 0;
		state.expirations = 0;
	}

	/// Rough footprint of keys and serialized results. Not enforced.
	pub fn size_in_bytes(&self) -> usize {
		let state = self.lock();

		state
			.nodes
			.iter()
			.flatten()
			.map(|node| {
				let results = serde_json::to_vec(&node.entry.results).map_or(0, |raw| raw.len());
				let facets = node.entry.facets.as_ref().map_or(0, |facets| facets.to_string().len());

				node.key.len() + results + facets
			})
			.sum()
	}

	pub fn len(&self) -> usize {
		self.lock().index.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn lock(&self) -> MutexGuard<'_, LruState> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}
}

struct Node {
	key: String,
	entry: Arc<CacheEntry>,
	prev: Option<usize>,
	next: Option<usize>,
}

/// Slab-backed doubly linked list ordered from most (`head`) to least (`tail`) recently used,
/// plus a key index into the slab.
struct LruState {
	nodes: Vec<Option<Node>>,
	free: Vec<usize>,
	index: HashMap<String, usize>,
	head: Option<usize>,
	tail: Option<usize>,
	max_size: usize,
	default_ttl: Duration,
	hits: u64,
	misses: u64,
	evictions: u64,
	expirations: u64,
}
impl LruState {
	fn new(cfg: CacheConfig) -> Self {
		Self {
			nodes: Vec::new(),
			free: Vec::new(),
			index: HashMap::new(),
			head: None,
			tail: None,
			max_size: cfg.max_size.max(1),
			default_ttl: cfg.default_ttl,
			hits: 0,
			misses: 0,
			evictions: 0,
			expirations: 0,
		}
	}

	fn node(&self, idx: usize) -> Option<&Node> {
		self.nodes.get(idx).and_then(Option::as_ref)
	}

	fn node_mut(&mut self, idx: usize) -> Option<&mut Node> {
		self.nodes.get_mut(idx).and_then(Option::as_mut)
	}

	fn insert(&mut self, key: String, entry: Arc<CacheEntry>) {
		if let Some(idx) = self.index.get(&key).copied() {
			if let Some(node) = self.node_mut(idx) {
				node.entry = entry;
			}

			self.touch(idx);

			return;
		}

		self.enforce_capacity(1);

		let node = Node { key: key.clone(), entry, prev: None, next: None };
		let idx = match self.free.pop() {
			Some(idx) => {
				self.nodes[idx] = Some(node);

				idx
			},
			None => {
				self.nodes.push(Some(node));

				self.nodes.len() - 1
			},
		};

		self.index.insert(key, idx);
		self.push_front(idx);
	}

	/// Evicts from the tail until `incoming` more entries fit.
	fn enforce_capacity(&mut self, incoming: usize) {
		while self.index.len() + incoming > self.max_size {
			let Some(tail) = self.tail else {
				break;
			};

			if let Some(node) = self.remove(tail) {
				self.evictions += 1;

				tracing::debug!(
					cache_key_prefix = %cache_key_prefix(&node.key),
					size = self.index.len(),
					max_size = self.max_size,
					"Cache eviction."
				);
			}
		}
	}

	fn touch(&mut self, idx: usize) {
		if self.head == Some(idx) {
			return;
		}

		self.detach(idx);
		self.push_front(idx);
	}

	fn remove(&mut self, idx: usize) -> Option<Node> {
		self.detach(idx);

		let node = self.nodes.get_mut(idx).and_then(Option::take)?;

		self.free.push(idx);
		self.index.remove(&node.key);

		Some(node)
	}

	fn detach(&mut self, idx: usize) {
		let Some((prev, next)) = self.node(idx).map(|node| (node.prev, node.next)) else {
			return;
		};

		match prev.and_then(|prev| self.node_mut(prev)) {
			Some(node) => node.next = next,
			None => self.head = next,
		}
		match next.and_then(|next| self.node_mut(next)) {
			Some(node) => node.prev = prev,
			None => self.tail = prev,
		}

		if let Some(node) = self.node_mut(idx) {
			node.prev = None;
			node.next = None;
		}
	}

	fn push_front(&mut self, idx: usize) {
		let old_head = self.head;

		if let Some(node) = self.node_mut(idx) {
			node.prev = None;
			node.next = old_head;
		}
		if let Some(head) = old_head.and_then(|head| self.node_mut(head)) {
			head.prev = Some(idx);
		}

		self.head = Some(idx);

		if self.tail.is_none() {
			self.tail = Some(idx);
		}
	}
}
