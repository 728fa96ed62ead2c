use serde::{Deserialize, Serialize};

/// The smallest retrievable piece of knowledge extracted from a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicUnit {
	pub id: String,
	#[serde(rename = "type")]
	pub unit_type: String,
	pub title: String,
	pub content: String,
	pub context: Option<String>,
	pub category: Option<String>,
	/// Unix milliseconds.
	pub created_at: i64,
	pub tags: Vec<String>,
	pub keywords: Vec<String>,
	pub parent_conversation_id: Option<String>,
	pub embedding_status: String,
	pub document_id: Option<String>,
}
impl AtomicUnit {
	pub fn has_tag(&self, tag: &str) -> bool {
		!tag.is_empty() && self.tags.iter().any(|candidate| candidate == tag)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
	pub document_id: String,
	pub source_id: String,
	pub format: String,
}

/// One row of a lexical ranking. `rank` is zero-based; zero is the best match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalHit {
	pub unit_id: String,
	pub rank: u32,
	pub score: f32,
}

/// One row of a nearest-neighbor ranking. `rank` is zero-based; zero is the closest neighbor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
	pub unit_id: String,
	pub rank: u32,
	pub distance: f32,
}
