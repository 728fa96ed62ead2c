use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub cache: Cache,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Search {
	/// Number of candidates requested from each index before fusion.
	pub candidate_k: u32,
	/// Upper bound on the fused ranking kept per query; pages are sliced from it.
	pub max_limit: u32,
	/// Budget for the embed-then-query vector path. On expiry the search continues lexical-only.
	pub vector_timeout_ms: u64,
	/// Reciprocal Rank Fusion damping constant.
	pub rrf_k: f32,
	pub weights: SearchWeights,
	pub boosts: SearchBoosts,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			candidate_k: 100,
			max_limit: 200,
			vector_timeout_ms: 2_000,
			rrf_k: 60.0,
			weights: SearchWeights::default(),
			boosts: SearchBoosts::default(),
		}
	}
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SearchWeights {
	pub lexical: f32,
	pub semantic: f32,
}
impl Default for SearchWeights {
	fn default() -> Self {
		Self { lexical: 0.4, semantic: 0.6 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchBoosts {
	pub multi_chunk_tag: String,
	pub multi_chunk: f32,
	pub image_tag: String,
	pub image: f32,
}
impl Default for SearchBoosts {
	fn default() -> Self {
		Self {
			multi_chunk_tag: "multi-chunk".to_string(),
			multi_chunk: 0.05,
			image_tag: "has-image".to_string(),
			image: 0.02,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Cache {
	pub enabled: bool,
	pub max_size: usize,
	pub default_ttl_ms: u64,
}
impl Default for Cache {
	fn default() -> Self {
		Self { enabled: true, max_size: 1_000, default_ttl_ms: 300_000 }
	}
}
