pub const DENSE_VECTOR_NAME: &str = "dense";
pub const UNIT_ID_PAYLOAD: &str = "unit_id";

use std::collections::HashMap;

use qdrant_client::{
	Payload, Qdrant,
	qdrant::{
		Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, Query,
		QueryPointsBuilder, Range, UpsertPointsBuilder, Value, Vector, VectorParamsBuilder,
		VectorsConfigBuilder, value::Kind,
	},
};

use sift_domain::{AtomicUnit, FilterValue, VectorFilter, VectorHit, VectorOp};

use crate::{Error, Result};

pub struct QdrantStore {
	pub client: Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &sift_config::Qdrant) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the collection with a single named dense vector when it does not exist yet.
	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(self.collection.clone()).await? {
			return Ok(());
		}

		let mut vectors_config = VectorsConfigBuilder::default();

		vectors_config.add_named_vector_params(
			DENSE_VECTOR_NAME,
			VectorParamsBuilder::new(u64::from(self.vector_dim), Distance::Cosine),
		);

		self.client
			.create_collection(
				CreateCollectionBuilder::new(self.collection.clone()).vectors_config(vectors_config),
			)
			.await?;

		Ok(())
	}

	pub async fn upsert_unit(&self, unit: &AtomicUnit, vector: Vec<f32>) -> Result<()> {
		if vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"vector for unit {} has {} dimensions, expected {}.",
				unit.id,
				vector.len(),
				self.vector_dim
			)));
		}

		let mut payload = Payload::new();

		payload.insert(UNIT_ID_PAYLOAD, unit.id.clone());
		payload.insert("id", unit.id.clone());
		payload.insert("type", unit.unit_type.clone());
		payload.insert("title", unit.title.clone());
		payload.insert("created_at", unit.created_at);
		payload.insert("tags", serde_json::Value::from(unit.tags.clone()));
		payload.insert("keywords", serde_json::Value::from(unit.keywords.clone()));
		payload.insert("embedding_status", unit.embedding_status.clone());

		for (key, value) in [
			("context", &unit.context),
			("category", &unit.category),
			("parent_conversation_id", &unit.parent_conversation_id),
		] {
			payload.insert(
				key,
				value.clone().map(serde_json::Value::String).unwrap_or(serde_json::Value::Null),
			);
		}

		let mut vectors = HashMap::new();

		vectors.insert(DENSE_VECTOR_NAME.to_string(), Vector::from(vector));

		let point = PointStruct::new(point_id(&unit.id), vectors, payload);

		self.client
			.upsert_points(UpsertPointsBuilder::new(self.collection.clone(), vec![point]).wait(true))
			.await?;

		Ok(())
	}

	/// Nearest neighbors of `vector`. Rank 0 is the closest point; `distance` is `1 - score` for
	/// the cosine metric.
	pub async fn query_vector(
		&self,
		vector: Vec<f32>,
		filter: Option<&VectorFilter>,
		limit: u32,
	) -> Result<Vec<VectorHit>> {
		let mut search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.using(DENSE_VECTOR_NAME)
			.with_payload(true)
			.limit(u64::from(limit));

		if let Some(filter) = filter {
			search = search.filter(to_qdrant_filter(filter));
		}

		let response = self.client.query(search).await?;
		let mut hits = Vec::with_capacity(response.result.len());

		for point in response.result {
			let Some(unit_id) = payload_string(&point.payload, UNIT_ID_PAYLOAD) else {
				tracing::warn!(collection = %self.collection, "Vector hit missing unit_id payload.");

				continue;
			};
			let rank = u32::try_from(hits.len()).unwrap_or(u32::MAX);

			hits.push(VectorHit { unit_id, rank, distance: 1.0 - point.score });
		}

		Ok(hits)
	}
}

/// Converts a compiled vector filter into the Qdrant filter language.
pub fn to_qdrant_filter(filter: &VectorFilter) -> Filter {
	match filter {
		VectorFilter::AllOf(children) => Filter::all(children.iter().map(to_condition)),
		VectorFilter::AnyOf(children) => Filter::any(children.iter().map(to_condition)),
		VectorFilter::NoneOf(children) => Filter::must_not(children.iter().map(to_condition)),
		VectorFilter::Condition { .. } => Filter::all([to_condition(filter)]),
	}
}

fn to_condition(filter: &VectorFilter) -> Condition {
	match filter {
		VectorFilter::Condition { field, op, value } => field_condition(field.as_str(), *op, value),
		nested => Condition::from(to_qdrant_filter(nested)),
	}
}

fn field_condition(key: &str, op: VectorOp, value: &FilterValue) -> Condition {
	let number = match value {
		FilterValue::Number(number) => Some(*number),
		_ => None,
	};

	match op {
		VectorOp::Eq => equals(key, value),
		VectorOp::Ne => Condition::from(Filter::must_not([equals(key, value)])),
		VectorOp::Gt => Condition::range(key, Range { gt: number, ..Default::default() }),
		VectorOp::Gte => Condition::range(key, Range { gte: number, ..Default::default() }),
		VectorOp::Lt => Condition::range(key, Range { lt: number, ..Default::default() }),
		VectorOp::Lte => Condition::range(key, Range { lte: number, ..Default::default() }),
		VectorOp::In => {
			let elements = value.elements();
			let keywords: Option<Vec<String>> = elements
				.iter()
				.map(|element| match element {
					FilterValue::Text(text) => Some(text.clone()),
					_ => None,
				})
				.collect();

			match keywords {
				Some(keywords) => Condition::matches(key, keywords),
				None => Condition::from(Filter::any(
					elements.into_iter().map(|element| equals(key, element)),
				)),
			}
		},
	}
}

fn equals(key: &str, value: &FilterValue) -> Condition {
	match value {
		FilterValue::Text(text) => Condition::matches(key, text.clone()),
		FilterValue::Bool(flag) => Condition::matches(key, *flag),
		// Match conditions are keyword/integer only; a degenerate range covers floats.
		FilterValue::Number(number) => Condition::range(
			key,
			Range { gte: Some(*number), lte: Some(*number), ..Default::default() },
		),
		FilterValue::List(_) | FilterValue::Null => Condition::is_null(key),
	}
}

fn point_id(unit_id: &str) -> u64 {
	let hash = blake3::hash(unit_id.as_bytes());
	let mut bytes = [0_u8; 8];

	bytes.copy_from_slice(&hash.as_bytes()[..8]);

	u64::from_le_bytes(bytes)
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	match &payload.get(key)?.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}
