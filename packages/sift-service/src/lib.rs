pub mod backends;
pub mod cache;
pub mod fusion;
pub mod search;

mod error;

pub use cache::{CacheConfig, CacheEntry, CacheKeyOptions, CacheStats, ResultCache};
pub use error::{Error, Result};
pub use fusion::{
	AppliedBoost, DegradedReason, FusionEngine, FusionOutcome, RankedItem, SearchOptions,
	VectorOutcome, Weights,
};
pub use search::{SearchRequest, SearchResponse};

use std::{future::Future, pin::Pin, sync::Arc};

use sift_config::Config;
use sift_domain::{
	AtomicUnit, DocumentMeta, LexicalFragment, LexicalHit, VectorFilter, VectorHit,
};
use sift_providers::HttpEmbedding;
use sift_storage::{db::Db, qdrant::QdrantStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Full-text store. Hits are ordered best first with zero-based ranks.
pub trait LexicalIndex
where
	Self: Send + Sync,
{
	fn query_text<'a>(
		&'a self,
		text: &'a str,
		filter: &'a LexicalFragment,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<LexicalHit>>>;

	fn find_by_tag<'a>(&'a self, tag: &'a str, limit: u32) -> BoxFuture<'a, Result<Vec<AtomicUnit>>>;
}

/// Nearest-neighbor store over unit embeddings.
pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn query_vector<'a>(
		&'a self,
		vector: &'a [f32],
		filter: Option<&'a VectorFilter>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<VectorHit>>>;
}

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>>;
}

pub trait UnitStore
where
	Self: Send + Sync,
{
	fn resolve<'a>(&'a self, unit_id: &'a str) -> BoxFuture<'a, Result<Option<AtomicUnit>>>;

	fn resolve_document<'a>(
		&'a self,
		document_id: &'a str,
	) -> BoxFuture<'a, Result<Option<DocumentMeta>>>;

	/// Resolves many ids; unknown ids are skipped. Stores with a batch lookup should override this.
	fn resolve_many<'a>(&'a self, unit_ids: &'a [String]) -> BoxFuture<'a, Result<Vec<AtomicUnit>>> {
		Box::pin(async move {
			let mut units = Vec::with_capacity(unit_ids.len());

			for unit_id in unit_ids {
				if let Some(unit) = self.resolve(unit_id).await? {
					units.push(unit);
				}
			}

			Ok(units)
		})
	}
}

#[derive(Clone)]
pub struct Collaborators {
	pub lexical: Arc<dyn LexicalIndex>,
	pub vector: Arc<dyn VectorIndex>,
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub units: Arc<dyn UnitStore>,
}
impl Collaborators {
	pub fn new(
		lexical: Arc<dyn LexicalIndex>,
		vector: Arc<dyn VectorIndex>,
		embedding: Arc<dyn EmbeddingProvider>,
		units: Arc<dyn UnitStore>,
	) -> Self {
		Self { lexical, vector, embedding, units }
	}

	/// Postgres serves both the lexical index and unit resolution.
	pub fn from_backends(db: Arc<Db>, qdrant: Arc<QdrantStore>, embedding: Arc<HttpEmbedding>) -> Self {
		Self { lexical: db.clone(), vector: qdrant, embedding, units: db }
	}
}

pub struct SiftService {
	pub cfg: Config,
	pub engine: FusionEngine,
	pub cache: Option<ResultCache>,
}
impl SiftService {
	/// Connects to Postgres and Qdrant from configuration and bootstraps the schema.
	pub async fn connect(cfg: Config) -> Result<Self> {
		let db = Db::connect(&cfg.storage.postgres).await?;

		db.ensure_schema().await?;

		let qdrant = QdrantStore::new(&cfg.storage.qdrant)?;
		let embedding = HttpEmbedding::new(cfg.providers.embedding.clone())?;
		let collaborators =
			Collaborators::from_backends(Arc::new(db), Arc::new(qdrant), Arc::new(embedding));

		Ok(Self::with_collaborators(cfg, collaborators))
	}

	pub fn with_collaborators(cfg: Config, collaborators: Collaborators) -> Self {
		let engine =
			FusionEngine::new(cfg.search.clone(), cfg.storage.qdrant.vector_dim, collaborators);
		let cache = cfg.cache.enabled.then(|| ResultCache::new(CacheConfig::from(&cfg.cache)));

		Self { cfg, engine, cache }
	}

	pub fn cache_stats(&self) -> Option<CacheStats> {
		self.cache.as_ref().map(ResultCache::stats)
	}

	/// Drops every cached ranking and returns how many were removed.
	pub fn invalidate_all(&self) -> usize {
		self.cache.as_ref().map_or(0, ResultCache::invalidate_all)
	}

	pub fn invalidate_where<F>(&self, predicate: F) -> usize
	where
		F: Fn(&str) -> bool,
	{
		self.cache.as_ref().map_or(0, |cache| cache.invalidate_where(predicate))
	}

	pub fn clear_cache_stats(&self) {
		if let Some(cache) = &self.cache {
			cache.clear_stats();
		}
	}
}
