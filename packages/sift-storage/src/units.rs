use sqlx::{Postgres, Row, postgres::PgArguments, query::Query};

use sift_domain::{AtomicUnit, DocumentMeta, FilterValue, LexicalFragment, LexicalHit};

use crate::{Error, Result, db::Db};

const UNIT_COLUMNS: &str = "\
id,
	type,
	title,
	content,
	context,
	category,
	created_at,
	tags,
	keywords,
	parent_conversation_id,
	embedding_status,
	document_id";

#[derive(Debug, sqlx::FromRow)]
pub struct UnitRow {
	pub id: String,
	pub r#type: String,
	pub title: String,
	pub content: String,
	pub context: Option<String>,
	pub category: Option<String>,
	pub created_at: i64,
	/// JSON array text.
	pub tags: String,
	/// JSON array text.
	pub keywords: String,
	pub parent_conversation_id: Option<String>,
	pub embedding_status: String,
	pub document_id: Option<String>,
}
impl UnitRow {
	pub fn into_unit(self) -> Result<AtomicUnit> {
		let tags = decode_list(&self.id, "tags", &self.tags)?;
		let keywords = decode_list(&self.id, "keywords", &self.keywords)?;

		Ok(AtomicUnit {
			id: self.id,
			unit_type: self.r#type,
			title: self.title,
			content: self.content,
			context: self.context,
			category: self.category,
			created_at: self.created_at,
			tags,
			keywords,
			parent_conversation_id: self.parent_conversation_id,
			embedding_status: self.embedding_status,
			document_id: self.document_id,
		})
	}
}

/// Rewrites a compiled fragment into Postgres syntax: `?` placeholders become `$n` starting at
/// `first_index`, and `REGEXP` becomes the POSIX match operator.
pub fn render_postgres(fragment: &LexicalFragment, first_index: usize) -> String {
	let sql = fragment.sql.replace(" REGEXP ", " ~ ");
	let mut out = String::with_capacity(sql.len() + fragment.params.len() * 2);
	let mut index = first_index;

	for ch in sql.chars() {
		if ch == '?' {
			out.push('$');
			out.push_str(&index.to_string());

			index += 1;
		} else {
			out.push(ch);
		}
	}

	out
}

/// Full-text query ranked by `ts_rank_cd`. Rank 0 is the best match.
pub async fn query_text(
	db: &Db,
	text: &str,
	fragment: &LexicalFragment,
	limit: u32,
) -> Result<Vec<LexicalHit>> {
	let mut sql = String::from(
		"\
SELECT id, ts_rank_cd(search_tsv, query)::real AS score
FROM units, websearch_to_tsquery('english', $1) AS query
WHERE search_tsv @@ query",
	);

	if !fragment.is_empty() {
		sql.push_str("\n\tAND ");
		sql.push_str(&render_postgres(fragment, 3));
	}

	sql.push_str("\nORDER BY score DESC, id ASC\nLIMIT $2");

	let mut query = sqlx::query(&sql).bind(text).bind(i64::from(limit));

	for param in &fragment.params {
		query = bind_filter_value(query, param);
	}

	let rows = query.fetch_all(&db.pool).await?;
	let mut hits = Vec::with_capacity(rows.len());

	for (rank, row) in rows.iter().enumerate() {
		hits.push(LexicalHit {
			unit_id: row.try_get("id")?,
			rank: u32::try_from(rank).unwrap_or(u32::MAX),
			score: row.try_get("score")?,
		});
	}

	Ok(hits)
}

pub async fn find_by_tag(db: &Db, tag: &str, limit: u32) -> Result<Vec<AtomicUnit>> {
	let sql = format!(
		"\
SELECT
	{UNIT_COLUMNS}
FROM units
WHERE tags::jsonb @> jsonb_build_array($1::text)
ORDER BY created_at DESC, id ASC
LIMIT $2"
	);
	let rows: Vec<UnitRow> =
		sqlx::query_as(&sql).bind(tag).bind(i64::from(limit)).fetch_all(&db.pool).await?;

	rows.into_iter().map(UnitRow::into_unit).collect()
}

pub async fn fetch_unit(db: &Db, id: &str) -> Result<Option<AtomicUnit>> {
	let sql = format!("SELECT\n\t{UNIT_COLUMNS}\nFROM units\nWHERE id = $1");
	let row: Option<UnitRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&db.pool).await?;

	row.map(UnitRow::into_unit).transpose()
}

/// Fetches many units in one round trip. Order of the result is unspecified.
pub async fn fetch_units(db: &Db, ids: &[String]) -> Result<Vec<AtomicUnit>> {
	if ids.is_empty() {
		return Ok(Vec::new());
	}

	let sql = format!("SELECT\n\t{UNIT_COLUMNS}\nFROM units\nWHERE id = ANY($1)");
	let rows: Vec<UnitRow> = sqlx::query_as(&sql).bind(ids).fetch_all(&db.pool).await?;

	rows.into_iter().map(UnitRow::into_unit).collect()
}

pub async fn fetch_document(db: &Db, document_id: &str) -> Result<Option<DocumentMeta>> {
	let row: Option<(String, String, String)> = sqlx::query_as(
		"\
SELECT document_id, source_id, format
FROM documents
WHERE document_id = $1",
	)
	.bind(document_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row.map(|(document_id, source_id, format)| DocumentMeta { document_id, source_id, format }))
}

pub async fn upsert_document(db: &Db, document: &DocumentMeta) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO documents (document_id, source_id, format)
VALUES ($1, $2, $3)
ON CONFLICT (document_id) DO UPDATE
SET source_id = EXCLUDED.source_id,
	format = EXCLUDED.format",
	)
	.bind(document.document_id.as_str())
	.bind(document.source_id.as_str())
	.bind(document.format.as_str())
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn upsert_unit(db: &Db, unit: &AtomicUnit) -> Result<()> {
	if unit.id.trim().is_empty() {
		return Err(Error::InvalidArgument("unit id must be non-empty.".to_string()));
	}

	let tags = encode_list(&unit.tags);
	let keywords = encode_list(&unit.keywords);
	let sql = format!(
		"\
INSERT INTO units (
	{UNIT_COLUMNS}
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
ON CONFLICT (id) DO UPDATE
SET type = EXCLUDED.type,
	title = EXCLUDED.title,
	content = EXCLUDED.content,
	context = EXCLUDED.context,
	category = EXCLUDED.category,
	created_at = EXCLUDED.created_at,
	tags = EXCLUDED.tags,
	keywords = EXCLUDED.keywords,
	parent_conversation_id = EXCLUDED.parent_conversation_id,
	embedding_status = EXCLUDED.embedding_status,
	document_id = EXCLUDED.document_id"
	);

	sqlx::query(&sql)
		.bind(unit.id.as_str())
		.bind(unit.unit_type.as_str())
		.bind(unit.title.as_str())
		.bind(unit.content.as_str())
		.bind(unit.context.as_deref())
		.bind(unit.category.as_deref())
		.bind(unit.created_at)
		.bind(tags)
		.bind(keywords)
		.bind(unit.parent_conversation_id.as_deref())
		.bind(unit.embedding_status.as_str())
		.bind(unit.document_id.as_deref())
		.execute(&db.pool)
		.await?;

	Ok(())
}

fn bind_filter_value<'q>(
	query: Query<'q, Postgres, PgArguments>,
	value: &'q FilterValue,
) -> Query<'q, Postgres, PgArguments> {
	match value {
		FilterValue::Text(text) => query.bind(text.as_str()),
		FilterValue::Number(number) => query.bind(*number),
		FilterValue::Bool(flag) => query.bind(*flag),
		FilterValue::Null => query.bind(None::<String>),
		FilterValue::List(_) => query.bind(value.to_value().to_string()),
	}
}

fn decode_list(id: &str, column: &str, raw: &str) -> Result<Vec<String>> {
	serde_json::from_str(raw).map_err(|err| Error::Corrupt {
		id: id.to_string(),
		message: format!("{column} is not a JSON string array: {err}."),
	})
}

fn encode_list(items: &[String]) -> String {
	serde_json::Value::from(items.to_vec()).to_string()
}
