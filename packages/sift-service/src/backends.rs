//! Collaborator implementations over Postgres, Qdrant and the HTTP embedding provider.

use sift_domain::{
	AtomicUnit, DocumentMeta, LexicalFragment, LexicalHit, VectorFilter, VectorHit,
};
use sift_providers::HttpEmbedding;
use sift_storage::{db::Db, qdrant::QdrantStore, units};

use crate::{BoxFuture, EmbeddingProvider, LexicalIndex, Result, UnitStore, VectorIndex};

impl LexicalIndex for Db {
	fn query_text<'a>(
		&'a self,
		text: &'a str,
		filter: &'a LexicalFragment,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<LexicalHit>>> {
		Box::pin(async move { Ok(units::query_text(self, text, filter, limit).await?) })
	}

	fn find_by_tag<'a>(&'a self, tag: &'a str, limit: u32) -> BoxFuture<'a, Result<Vec<AtomicUnit>>> {
		Box::pin(async move { Ok(units::find_by_tag(self, tag, limit).await?) })
	}
}

impl UnitStore for Db {
	fn resolve<'a>(&'a self, unit_id: &'a str) -> BoxFuture<'a, Result<Option<AtomicUnit>>> {
		Box::pin(async move { Ok(units::fetch_unit(self, unit_id).await?) })
	}

	fn resolve_document<'a>(
		&'a self,
		document_id: &'a str,
	) -> BoxFuture<'a, Result<Option<DocumentMeta>>> {
		Box::pin(async move { Ok(units::fetch_document(self, document_id).await?) })
	}

	fn resolve_many<'a>(&'a self, unit_ids: &'a [String]) -> BoxFuture<'a, Result<Vec<AtomicUnit>>> {
		Box::pin(async move { Ok(units::fetch_units(self, unit_ids).await?) })
	}
}

impl VectorIndex for QdrantStore {
	fn query_vector<'a>(
		&'a self,
		vector: &'a [f32],
		filter: Option<&'a VectorFilter>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<VectorHit>>> {
		Box::pin(async move { Ok(QdrantStore::query_vector(self, vector.to_vec(), filter, limit).await?) })
	}
}

impl EmbeddingProvider for HttpEmbedding {
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(self.embed_one(text))
	}
}
