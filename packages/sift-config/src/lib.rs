mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Config, EmbeddingProviderConfig, Postgres, Providers, Qdrant, Search, SearchBoosts,
	SearchWeights, Service, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("storage.postgres.dsn", &cfg.storage.postgres.dsn),
		("storage.qdrant.url", &cfg.storage.qdrant.url),
		("storage.qdrant.collection", &cfg.storage.qdrant.collection),
		("providers.embedding.api_key", &cfg.providers.embedding.api_key),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.vector_dim == 0 {
		return Err(Error::Validation {
			message: "storage.qdrant.vector_dim must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	validate_search(&cfg.search)?;

	if cfg.cache.enabled && cfg.cache.max_size == 0 {
		return Err(Error::Validation {
			message: "cache.max_size must be greater than zero when the cache is enabled."
				.to_string(),
		});
	}
	if cfg.cache.default_ttl_ms == 0 {
		return Err(Error::Validation {
			message: "cache.default_ttl_ms must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_search(search: &Search) -> Result<()> {
	if search.candidate_k == 0 {
		return Err(Error::Validation {
			message: "search.candidate_k must be greater than zero.".to_string(),
		});
	}
	if search.max_limit == 0 {
		return Err(Error::Validation {
			message: "search.max_limit must be greater than zero.".to_string(),
		});
	}
	if !search.rrf_k.is_finite() || search.rrf_k < 0.0 {
		return Err(Error::Validation {
			message: "search.rrf_k must be a finite number, zero or greater.".to_string(),
		});
	}

	for (label, weight) in [
		("search.weights.lexical", search.weights.lexical),
		("search.weights.semantic", search.weights.semantic),
		("search.boosts.multi_chunk", search.boosts.multi_chunk),
		("search.boosts.image", search.boosts.image),
	] {
		if !weight.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if weight < 0.0 {
			return Err(Error::Validation { message: format!("{label} must be zero or greater.") });
		}
	}

	if search.weights.lexical == 0.0 && search.weights.semantic == 0.0 {
		return Err(Error::Validation {
			message: "search.weights must not both be zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.service.log_level = cfg.service.log_level.trim().to_string();

	if cfg.service.log_level.is_empty() {
		cfg.service.log_level = "info".to_string();
	}

	cfg.search.boosts.multi_chunk_tag = cfg.search.boosts.multi_chunk_tag.trim().to_string();
	cfg.search.boosts.image_tag = cfg.search.boosts.image_tag.trim().to_string();
}
