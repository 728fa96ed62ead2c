use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::{error::FilterError, unit::AtomicUnit};

pub const MAX_FILTER_DEPTH: usize = 8;
pub const MAX_FILTER_NODES: usize = 128;
pub const MAX_IN_LIST_ITEMS: usize = 128;
pub const MAX_STRING_BYTES: usize = 512;

const FIELD_ALLOWLIST: &str = "id, type, title, content, context, category, timestamp, tags, keywords, parent_conversation_id, embedding_status";

/// Queryable unit attributes. Anything outside this set is rejected before a query is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterField {
	Id,
	Type,
	Title,
	Content,
	Context,
	Category,
	Timestamp,
	Tags,
	Keywords,
	ConversationId,
	EmbeddingStatus,
}
impl FilterField {
	/// Column name in the lexical store and payload key in the vector store.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Id => "id",
			Self::Type => "type",
			Self::Title => "title",
			Self::Content => "content",
			Self::Context => "context",
			Self::Category => "category",
			Self::Timestamp => "created_at",
			Self::Tags => "tags",
			Self::Keywords => "keywords",
			Self::ConversationId => "parent_conversation_id",
			Self::EmbeddingStatus => "embedding_status",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"id" => Some(Self::Id),
			"type" => Some(Self::Type),
			"title" => Some(Self::Title),
			"content" => Some(Self::Content),
			"context" => Some(Self::Context),
			"category" => Some(Self::Category),
			"timestamp" | "created" | "created_at" => Some(Self::Timestamp),
			"tags" => Some(Self::Tags),
			"keywords" => Some(Self::Keywords),
			"parent_conversation_id" | "parentconversationid" | "conversation_id" =>
				Some(Self::ConversationId),
			"embedding_status" | "embeddingstatus" => Some(Self::EmbeddingStatus),
			_ => None,
		}
	}

	/// Whether the column is a number. Every other field is stored as text.
	pub fn is_numeric(self) -> bool {
		matches!(self, Self::Timestamp)
	}

	fn lookup(self, unit: &AtomicUnit) -> FieldValue {
		match self {
			Self::Id => FieldValue::Text(unit.id.clone()),
			Self::Type => FieldValue::Text(unit.unit_type.clone()),
			Self::Title => FieldValue::Text(unit.title.clone()),
			Self::Content => FieldValue::Text(unit.content.clone()),
			Self::Context => unit.context.clone().map_or(FieldValue::Null, FieldValue::Text),
			Self::Category => unit.category.clone().map_or(FieldValue::Null, FieldValue::Text),
			Self::Timestamp => FieldValue::Number(unit.created_at as f64),
			// List columns are stored as JSON text, so string operators see the encoded form.
			Self::Tags => FieldValue::Text(encode_list(&unit.tags)),
			Self::Keywords => FieldValue::Text(encode_list(&unit.keywords)),
			Self::ConversationId =>
				unit.parent_conversation_id.clone().map_or(FieldValue::Null, FieldValue::Text),
			Self::EmbeddingStatus => FieldValue::Text(unit.embedding_status.clone()),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterOperator {
	Equals,
	NotEquals,
	GreaterThan,
	GreaterThanOrEqual,
	LessThan,
	LessThanOrEqual,
	In,
	Contains,
	Regex,
	Between,
}
impl FilterOperator {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Equals => "equals",
			Self::NotEquals => "not_equals",
			Self::GreaterThan => "greater_than",
			Self::GreaterThanOrEqual => "greater_than_or_equal",
			Self::LessThan => "less_than",
			Self::LessThanOrEqual => "less_than_or_equal",
			Self::In => "in",
			Self::Contains => "contains",
			Self::Regex => "regex",
			Self::Between => "between",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"equals" | "eq" | "=" | "==" => Some(Self::Equals),
			"not_equals" | "notequals" | "neq" | "ne" | "!=" => Some(Self::NotEquals),
			"greater_than" | "greaterthan" | "gt" | ">" => Some(Self::GreaterThan),
			"greater_than_or_equal" | "greaterthanorequal" | "gte" | ">=" =>
				Some(Self::GreaterThanOrEqual),
			"less_than" | "lessthan" | "lt" | "<" => Some(Self::LessThan),
			"less_than_or_equal" | "lessthanorequal" | "lte" | "<=" => Some(Self::LessThanOrEqual),
			"in" => Some(Self::In),
			"contains" => Some(Self::Contains),
			"regex" => Some(Self::Regex),
			"between" => Some(Self::Between),
			_ => None,
		}
	}

	/// SQL comparison token for the single-parameter operators.
	pub(crate) fn comparison_token(self) -> Option<&'static str> {
		match self {
			Self::Equals => Some("="),
			Self::NotEquals => Some("!="),
			Self::GreaterThan => Some(">"),
			Self::GreaterThanOrEqual => Some(">="),
			Self::LessThan => Some("<"),
			Self::LessThanOrEqual => Some("<="),
			Self::In | Self::Contains | Self::Regex | Self::Between => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combinator {
	And,
	Or,
}
impl Combinator {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::And => "AND",
			Self::Or => "OR",
		}
	}
}

/// A literal on the right-hand side of a predicate. It is always bound as a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
	Text(String),
	Number(f64),
	Bool(bool),
	List(Vec<FilterValue>),
	Null,
}
impl FilterValue {
	pub fn to_value(&self) -> Value {
		match self {
			Self::Text(value) => Value::String(value.clone()),
			Self::Number(value) => serde_json::json!(value),
			Self::Bool(value) => Value::Bool(*value),
			Self::List(values) => Value::Array(values.iter().map(Self::to_value).collect()),
			Self::Null => Value::Null,
		}
	}

	/// Elements for set membership; a scalar behaves as a one-element set.
	pub fn elements(&self) -> Vec<&FilterValue> {
		match self {
			Self::List(values) => values.iter().collect(),
			other => vec![other],
		}
	}

	pub(crate) fn as_text(&self) -> String {
		match self {
			Self::Text(value) => value.clone(),
			Self::Number(value) => value.to_string(),
			Self::Bool(value) => value.to_string(),
			Self::List(_) | Self::Null => self.to_value().to_string(),
		}
	}

	fn is_scalar(&self) -> bool {
		!matches!(self, Self::List(_))
	}
}
impl From<&str> for FilterValue {
	fn from(value: &str) -> Self {
		Self::Text(value.to_string())
	}
}
impl From<String> for FilterValue {
	fn from(value: String) -> Self {
		Self::Text(value)
	}
}
impl From<f64> for FilterValue {
	fn from(value: f64) -> Self {
		Self::Number(value)
	}
}
impl From<i64> for FilterValue {
	fn from(value: i64) -> Self {
		Self::Number(value as f64)
	}
}
impl From<bool> for FilterValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}
impl From<OffsetDateTime> for FilterValue {
	/// Timestamps are compared as unix milliseconds on both backends.
	fn from(value: OffsetDateTime) -> Self {
		Self::Number((value.unix_timestamp_nanos() / 1_000_000) as f64)
	}
}
impl<T> From<Vec<T>> for FilterValue
where
	T: Into<FilterValue>,
{
	fn from(values: Vec<T>) -> Self {
		Self::List(values.into_iter().map(Into::into).collect())
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
	pub field: FilterField,
	pub operator: FilterOperator,
	pub value: FilterValue,
	pub negate: bool,
}
impl Filter {
	pub fn new(field: FilterField, operator: FilterOperator, value: impl Into<FilterValue>) -> Self {
		Self { field, operator, value: value.into(), negate: false }
	}

	pub fn negated(mut self) -> Self {
		self.negate = !self.negate;

		self
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterGroup {
	pub combinator: Combinator,
	pub children: Vec<FilterNode>,
	pub negate: bool,
}
impl FilterGroup {
	pub fn all(children: impl IntoIterator<Item = FilterNode>) -> Self {
		Self { combinator: Combinator::And, children: children.into_iter().collect(), negate: false }
	}

	pub fn any(children: impl IntoIterator<Item = FilterNode>) -> Self {
		Self { combinator: Combinator::Or, children: children.into_iter().collect(), negate: false }
	}

	pub fn negated(mut self) -> Self {
		self.negate = !self.negate;

		self
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
	Leaf(Filter),
	Group(FilterGroup),
}
impl FilterNode {
	/// Parses an external filter tree. Leaves carry `field`, `operator`, `value` and an optional
	/// `negate`; groups carry `combinator`, `children` (or `filters`) and an optional `negate`.
	pub fn parse(raw: &Value) -> Result<Self, FilterError> {
		let mut state = ParseState::default();

		parse_node(raw, "$.filter", 1, &mut state)
	}

	/// Parses a list of filters that are implicitly combined with AND.
	pub fn parse_list(raw: &Value) -> Result<Vec<Self>, FilterError> {
		let path = "$.filters";
		let items = raw
			.as_array()
			.ok_or_else(|| FilterError::new(path, "filters must be an array."))?;
		let mut state = ParseState::default();

		items
			.iter()
			.enumerate()
			.map(|(index, item)| parse_node(item, &format!("{path}[{index}]"), 1, &mut state))
			.collect()
	}

	/// Order-independent identity of the node: group children are sorted by their own keys, so
	/// reordered but equivalent trees produce the same string.
	pub fn canonical_key(&self) -> String {
		match self {
			Self::Leaf(filter) => format!(
				"{}{}:{}:{}",
				if filter.negate { "!" } else { "" },
				filter.field.as_str(),
				filter.operator.as_str(),
				filter.value.to_value(),
			),
			Self::Group(group) => {
				let mut children: Vec<String> =
					group.children.iter().map(Self::canonical_key).collect();

				children.sort();

				format!(
					"{}{}({})",
					if group.negate { "!" } else { "" },
					group.combinator.as_str(),
					children.join(",")
				)
			},
		}
	}

	/// Evaluates the node against a resolved unit with the same semantics the compiled lexical
	/// fragment has in SQL, including three-valued logic for missing attributes.
	pub fn matches(&self, unit: &AtomicUnit) -> bool {
		matches!(self.evaluate(unit), Verdict::Unconstrained | Verdict::Known(true))
	}

	pub fn to_value(&self) -> Value {
		match self {
			Self::Leaf(filter) => serde_json::json!({
				"field": filter.field.as_str(),
				"operator": filter.operator.as_str(),
				"value": filter.value.to_value(),
				"negate": filter.negate,
			}),
			Self::Group(group) => serde_json::json!({
				"combinator": group.combinator.as_str(),
				"children": Value::Array(group.children.iter().map(Self::to_value).collect()),
				"negate": group.negate,
			}),
		}
	}

	fn evaluate(&self, unit: &AtomicUnit) -> Verdict {
		match self {
			Self::Leaf(filter) => {
				let verdict = evaluate_leaf(filter, unit);

				if filter.negate { verdict.not() } else { verdict }
			},
			Self::Group(group) => {
				let verdicts: Vec<Verdict> = group
					.children
					.iter()
					.map(|child| child.evaluate(unit))
					.filter(|verdict| *verdict != Verdict::Unconstrained)
					.collect();

				if verdicts.is_empty() {
					return Verdict::Unconstrained;
				}

				let combined = match group.combinator {
					Combinator::And => Verdict::all(&verdicts),
					Combinator::Or => Verdict::any(&verdicts),
				};

				if group.negate { combined.not() } else { combined }
			},
		}
	}
}
impl From<Filter> for FilterNode {
	fn from(filter: Filter) -> Self {
		Self::Leaf(filter)
	}
}
impl From<FilterGroup> for FilterNode {
	fn from(group: FilterGroup) -> Self {
		Self::Group(group)
	}
}

/// Returns whether `raw` is an acceptable filter tree: every field is allow-listed, every
/// combinator is AND/OR, and every value has a usable shape. Never panics on malformed input.
pub fn validate(raw: &Value) -> bool {
	FilterNode::parse(raw).is_ok()
}

/// Checks operands of already built filters against their columns, as parsing does. Paths are
/// reported relative to `$.filters`.
pub fn check_operands(filters: &[FilterNode]) -> Result<(), FilterError> {
	filters
		.iter()
		.enumerate()
		.try_for_each(|(index, node)| check_node(node, &format!("$.filters[{index}]")))
}

/// Canonical key for a filter list; input order does not matter.
pub fn canonical_list_key(filters: &[FilterNode]) -> String {
	let mut keys: Vec<String> = filters.iter().map(FilterNode::canonical_key).collect();

	keys.sort();

	keys.join(";")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
	/// The predicate compiles to nothing and therefore constrains nothing.
	Unconstrained,
	Known(bool),
	/// SQL NULL.
	Unknown,
}
impl Verdict {
	fn not(self) -> Self {
		match self {
			Self::Known(value) => Self::Known(!value),
			other => other,
		}
	}

	fn all(verdicts: &[Self]) -> Self {
		if verdicts.contains(&Self::Known(false)) {
			Self::Known(false)
		} else if verdicts.contains(&Self::Unknown) {
			Self::Unknown
		} else {
			Self::Known(true)
		}
	}

	fn any(verdicts: &[Self]) -> Self {
		if verdicts.contains(&Self::Known(true)) {
			Self::Known(true)
		} else if verdicts.contains(&Self::Unknown) {
			Self::Unknown
		} else {
			Self::Known(false)
		}
	}
}

#[derive(Debug, Clone)]
enum FieldValue {
	Text(String),
	Number(f64),
	Null,
}
impl FieldValue {
	fn compare(&self, value: &FilterValue) -> Option<Ordering> {
		match (self, value) {
			(Self::Text(lhs), FilterValue::Text(rhs)) => Some(lhs.as_str().cmp(rhs.as_str())),
			(Self::Number(lhs), FilterValue::Number(rhs)) => lhs.partial_cmp(rhs),
			_ => None,
		}
	}
}

#[derive(Default)]
struct ParseState {
	nodes: usize,
}

fn evaluate_leaf(filter: &Filter, unit: &AtomicUnit) -> Verdict {
	let actual = filter.field.lookup(unit);
	let is_null = matches!(actual, FieldValue::Null);
	let compare = |expected: &FilterValue, accept: fn(Ordering) -> bool| -> Verdict {
		if is_null || matches!(expected, FilterValue::Null) {
			return Verdict::Unknown;
		}

		Verdict::Known(actual.compare(expected).is_some_and(accept))
	};

	match filter.operator {
		FilterOperator::Equals => compare(&filter.value, |ord| ord == Ordering::Equal),
		FilterOperator::NotEquals => compare(&filter.value, |ord| ord != Ordering::Equal),
		FilterOperator::GreaterThan => compare(&filter.value, |ord| ord == Ordering::Greater),
		FilterOperator::GreaterThanOrEqual => compare(&filter.value, |ord| ord != Ordering::Less),
		FilterOperator::LessThan => compare(&filter.value, |ord| ord == Ordering::Less),
		FilterOperator::LessThanOrEqual => compare(&filter.value, |ord| ord != Ordering::Greater),
		FilterOperator::In => {
			let elements = filter.value.elements();

			if elements.is_empty() {
				return Verdict::Unconstrained;
			}

			let verdicts: Vec<Verdict> = elements
				.into_iter()
				.map(|element| compare(element, |ord| ord == Ordering::Equal))
				.collect();

			Verdict::any(&verdicts)
		},
		FilterOperator::Contains => match &actual {
			FieldValue::Null => Verdict::Unknown,
			FieldValue::Text(text) => Verdict::Known(text.contains(&filter.value.as_text())),
			FieldValue::Number(number) =>
				Verdict::Known(number.to_string().contains(&filter.value.as_text())),
		},
		FilterOperator::Regex => match (&actual, Regex::new(&filter.value.as_text())) {
			(FieldValue::Null, _) => Verdict::Unknown,
			(FieldValue::Text(text), Ok(pattern)) => Verdict::Known(pattern.is_match(text)),
			_ => Verdict::Known(false),
		},
		FilterOperator::Between => match &filter.value {
			FilterValue::List(bounds) if bounds.len() == 2 => Verdict::all(&[
				compare(&bounds[0], |ord| ord != Ordering::Less),
				compare(&bounds[1], |ord| ord != Ordering::Greater),
			]),
			_ => Verdict::Unconstrained,
		},
	}
}

fn parse_node(
	raw: &Value,
	path: &str,
	depth: usize,
	state: &mut ParseState,
) -> Result<FilterNode, FilterError> {
	state.nodes = state.nodes.saturating_add(1);

	if state.nodes > MAX_FILTER_NODES {
		return Err(FilterError::new(
			path,
			format!("filter exceeds node limit ({}/{}).", state.nodes, MAX_FILTER_NODES),
		));
	}
	if depth > MAX_FILTER_DEPTH {
		return Err(FilterError::new(
			path,
			format!("filter exceeds depth limit ({depth}/{MAX_FILTER_DEPTH})."),
		));
	}

	let Some(map) = raw.as_object() else {
		return Err(FilterError::new(path, "filter node must be an object."));
	};
	let negate = parse_negate(map, path)?;
	let children_key = ["children", "filters"].into_iter().find(|key| map.contains_key(*key));

	match children_key {
		Some(key) => parse_group(map, key, negate, path, depth, state),
		None => parse_leaf(map, negate, path).map(FilterNode::Leaf),
	}
}

fn parse_group(
	map: &Map<String, Value>,
	children_key: &str,
	negate: bool,
	path: &str,
	depth: usize,
	state: &mut ParseState,
) -> Result<FilterNode, FilterError> {
	let combinator_path = format!("{path}.combinator");
	let combinator = map
		.get("combinator")
		.and_then(Value::as_str)
		.ok_or_else(|| FilterError::new(&combinator_path, "group requires a string combinator."))?;
	let combinator = match combinator.trim().to_ascii_uppercase().as_str() {
		"AND" => Combinator::And,
		"OR" => Combinator::Or,
		other => {
			return Err(FilterError::new(
				combinator_path,
				format!("unsupported combinator '{other}', expected AND or OR."),
			));
		},
	};
	let children_path = format!("{path}.{children_key}");
	let children = map
		.get(children_key)
		.and_then(Value::as_array)
		.ok_or_else(|| FilterError::new(&children_path, "group children must be an array."))?
		.iter()
		.enumerate()
		.map(|(index, child)| {
			parse_node(child, &format!("{children_path}[{index}]"), depth.saturating_add(1), state)
		})
		.collect::<Result<Vec<_>, _>>()?;

	Ok(FilterNode::Group(FilterGroup { combinator, children, negate }))
}

fn parse_leaf(map: &Map<String, Value>, negate: bool, path: &str) -> Result<Filter, FilterError> {
	let field_path = format!("{path}.field");
	let raw_field = map
		.get("field")
		.and_then(Value::as_str)
		.ok_or_else(|| FilterError::new(&field_path, "filter field must be a string."))?;
	let field = FilterField::parse(raw_field).ok_or_else(|| {
		FilterError::new(
			&field_path,
			format!("field '{raw_field}' is not in allowlist: {FIELD_ALLOWLIST}."),
		)
	})?;
	let operator_path = format!("{path}.operator");
	let raw_operator = map
		.get("operator")
		.and_then(Value::as_str)
		.ok_or_else(|| FilterError::new(&operator_path, "filter operator must be a string."))?;
	let operator = FilterOperator::parse(raw_operator).ok_or_else(|| {
		FilterError::new(&operator_path, format!("unsupported operator '{raw_operator}'."))
	})?;
	let value_path = format!("{path}.value");
	let value = parse_value(
		map.get("value")
			.ok_or_else(|| FilterError::new(&value_path, "filter node requires a value."))?,
		&value_path,
	)?;

	check_operand(field, operator, &value, &value_path)?;

	Ok(Filter { field, operator, value, negate })
}

fn check_node(node: &FilterNode, path: &str) -> Result<(), FilterError> {
	match node {
		FilterNode::Leaf(filter) =>
			check_operand(filter.field, filter.operator, &filter.value, &format!("{path}.value")),
		FilterNode::Group(group) => group.children.iter().enumerate().try_for_each(|(index, child)| {
			check_node(child, &format!("{path}.children[{index}]"))
		}),
	}
}

fn check_operand(
	field: FilterField,
	operator: FilterOperator,
	value: &FilterValue,
	path: &str,
) -> Result<(), FilterError> {
	check_operand_shape(operator, value, path)?;
	check_column_type(field, operator, value, path)
}

fn check_operand_shape(
	operator: FilterOperator,
	value: &FilterValue,
	path: &str,
) -> Result<(), FilterError> {
	match operator {
		FilterOperator::In => Ok(()),
		FilterOperator::Between =>
			if value.is_scalar() {
				Err(FilterError::new(path, "between requires an array of two bounds."))
			} else {
				Ok(())
			},
		FilterOperator::Contains => match value {
			FilterValue::Text(_) | FilterValue::Number(_) => Ok(()),
			_ => Err(FilterError::new(path, "contains requires a string or number.")),
		},
		FilterOperator::Regex => match value {
			FilterValue::Text(pattern) => Regex::new(pattern)
				.map(|_| ())
				.map_err(|err| FilterError::new(path, format!("invalid regex pattern: {err}."))),
			_ => Err(FilterError::new(path, "regex requires a string pattern.")),
		},
		_ =>
			if value.is_scalar() {
				Ok(())
			} else {
				Err(FilterError::new(
					path,
					format!("{} requires a single value.", operator.as_str()),
				))
			},
	}
}

/// Operands must bind to the column's type, otherwise the store rejects the query at run time.
fn check_column_type(
	field: FilterField,
	operator: FilterOperator,
	value: &FilterValue,
	path: &str,
) -> Result<(), FilterError> {
	if field.is_numeric() {
		if matches!(operator, FilterOperator::Contains | FilterOperator::Regex) {
			return Err(FilterError::new(
				path,
				format!("{} does not apply to numeric field {}.", operator.as_str(), field.as_str()),
			));
		}
		if !value.elements().into_iter().all(|element| matches!(element, FilterValue::Number(_))) {
			return Err(FilterError::new(
				path,
				format!("{} on {} requires numeric values.", operator.as_str(), field.as_str()),
			));
		}

		return Ok(());
	}

	// Text columns: pattern operators stringify their operand when compiled.
	if matches!(operator, FilterOperator::Contains | FilterOperator::Regex) {
		return Ok(());
	}
	if !value
		.elements()
		.into_iter()
		.all(|element| matches!(element, FilterValue::Text(_) | FilterValue::Null))
	{
		return Err(FilterError::new(
			path,
			format!("{} on {} requires string values.", operator.as_str(), field.as_str()),
		));
	}

	Ok(())
}

fn parse_negate(map: &Map<String, Value>, path: &str) -> Result<bool, FilterError> {
	match map.get("negate") {
		None | Some(Value::Null) => Ok(false),
		Some(Value::Bool(value)) => Ok(*value),
		Some(_) => Err(FilterError::new(format!("{path}.negate"), "negate must be a boolean.")),
	}
}

fn parse_value(raw: &Value, path: &str) -> Result<FilterValue, FilterError> {
	match raw {
		Value::Array(items) => {
			if items.len() > MAX_IN_LIST_ITEMS {
				return Err(FilterError::new(
					path,
					format!("list exceeds maximum size ({}/{}).", items.len(), MAX_IN_LIST_ITEMS),
				));
			}

			items
				.iter()
				.enumerate()
				.map(|(index, item)| {
					let item_path = format!("{path}[{index}]");

					if item.is_array() {
						return Err(FilterError::new(item_path, "nested lists are not supported."));
					}

					parse_value(item, &item_path)
				})
				.collect::<Result<Vec<_>, _>>()
				.map(FilterValue::List)
		},
		Value::String(value) => {
			if value.len() > MAX_STRING_BYTES {
				return Err(FilterError::new(
					path,
					format!("string value exceeds maximum bytes ({MAX_STRING_BYTES})."),
				));
			}

			Ok(FilterValue::Text(value.clone()))
		},
		Value::Number(number) => number
			.as_f64()
			.map(FilterValue::Number)
			.ok_or_else(|| FilterError::new(path, "numeric value is out of range.")),
		Value::Bool(value) => Ok(FilterValue::Bool(*value)),
		Value::Null => Ok(FilterValue::Null),
		Value::Object(_) => Err(FilterError::new(path, "object values are not supported.")),
	}
}

fn encode_list(items: &[String]) -> String {
	serde_json::to_string(items).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use crate::{
		filter::{
			Combinator, Filter, FilterField, FilterGroup, FilterNode, FilterOperator,
			FilterValue, MAX_FILTER_NODES, MAX_IN_LIST_ITEMS, check_operands, validate,
		},
		unit::AtomicUnit,
	};

	fn unit() -> AtomicUnit {
		AtomicUnit {
			id: "u-1".to_string(),
			unit_type: "question".to_string(),
			title: "OAuth token refresh".to_string(),
			content: "How do refresh tokens rotate?".to_string(),
			context: None,
			category: Some("auth".to_string()),
			created_at: 1_700_000_000_000,
			tags: vec!["multi-chunk".to_string(), "security".to_string()],
			keywords: vec!["oauth".to_string()],
			parent_conversation_id: Some("c-9".to_string()),
			embedding_status: "embedded".to_string(),
			document_id: Some("d-1".to_string()),
		}
	}

	#[test]
	fn parse_rejects_unknown_field_with_json_path() {
		let raw = json!({ "field": "password", "operator": "equals", "value": "x" });
		let err = FilterNode::parse(&raw).expect_err("expected unknown field error");

		assert_eq!(err.path, "$.filter.field");
		assert!(err.message.contains("not in allowlist"));
		assert!(!validate(&raw));
	}

	#[test]
	fn validate_never_panics_on_garbage() {
		assert!(!validate(&json!(42)));
		assert!(!validate(&json!([1, 2, 3])));
		assert!(!validate(&json!({ "combinator": "XOR", "children": [] })));
		assert!(!validate(&json!({ "combinator": "AND", "children": "nope" })));
		assert!(!validate(&json!({ "field": "title" })));
	}

	#[test]
	fn parse_group_with_filters_alias_and_nested_unknown_field() {
		let raw = json!({
			"combinator": "or",
			"filters": [
				{ "field": "type", "operator": "eq", "value": "question" },
				{ "combinator": "AND", "children": [
					{ "field": "bogus", "operator": "eq", "value": 1 },
				]},
			],
		});
		let err = FilterNode::parse(&raw).expect_err("nested unknown field must be rejected");

		assert_eq!(err.path, "$.filter.filters[1].children[0].field");
	}

	#[test]
	fn parse_accepts_field_aliases() {
		let raw = json!({ "field": "created", "operator": ">=", "value": 10 });
		let node = FilterNode::parse(&raw).expect("valid filter");

		assert_eq!(
			node,
			FilterNode::Leaf(Filter::new(
				FilterField::Timestamp,
				FilterOperator::GreaterThanOrEqual,
				10.0,
			))
		);
	}

	#[test]
	fn parse_rejects_list_for_scalar_operator() {
		let raw = json!({ "field": "title", "operator": "equals", "value": ["a", "b"] });
		let err = FilterNode::parse(&raw).expect_err("list for equals must be rejected");

		assert_eq!(err.path, "$.filter.value");
	}

	#[test]
	fn parse_rejects_operands_the_column_cannot_take() {
		for (raw, reason) in [
			(json!({ "field": "title", "operator": "equals", "value": 5 }), "number on text"),
			(json!({ "field": "created", "operator": "contains", "value": "17" }), "contains on number"),
			(json!({ "field": "created_at", "operator": "regex", "value": "^17" }), "regex on number"),
			(json!({ "field": "embedding_status", "operator": "equals", "value": true }), "bool"),
			(json!({ "field": "created", "operator": "gte", "value": "2024-01-01" }), "text on number"),
			(json!({ "field": "created", "operator": "equals", "value": null }), "null on number"),
			(json!({ "field": "type", "operator": "in", "value": ["question", 1] }), "mixed list"),
			(json!({ "field": "title", "operator": "between", "value": [1, 2] }), "numeric bounds"),
		] {
			let err = FilterNode::parse(&raw).expect_err(reason);

			assert_eq!(err.path, "$.filter.value", "{reason}");
			assert!(!validate(&raw), "{reason}");
		}
	}

	#[test]
	fn parse_accepts_operands_matching_the_column() {
		for raw in [
			json!({ "field": "title", "operator": "contains", "value": 17 }),
			json!({ "field": "category", "operator": "equals", "value": null }),
			json!({ "field": "created", "operator": "between", "value": [1, 2] }),
			json!({ "field": "created", "operator": "in", "value": [] }),
			json!({ "field": "type", "operator": "in", "value": ["question", "reference"] }),
		] {
			assert!(validate(&raw), "{raw}");
		}
	}

	#[test]
	fn check_operands_reports_nested_path_for_built_filters() {
		let filters = [
			FilterNode::from(Filter::new(FilterField::Type, FilterOperator::Equals, "question")),
			FilterNode::from(FilterGroup::any([
				FilterNode::from(Filter::new(FilterField::Title, FilterOperator::Equals, 5_i64)),
			])),
		];
		let err = check_operands(&filters).expect_err("number on a text column");

		assert_eq!(err.path, "$.filters[1].children[0].value");
		assert!(check_operands(&filters[..1]).is_ok());
	}

	#[test]
	fn parse_rejects_invalid_regex() {
		let raw = json!({ "field": "title", "operator": "regex", "value": "(unclosed" });

		assert!(FilterNode::parse(&raw).is_err());
	}

	#[test]
	fn parse_enforces_limits() {
		let values: Vec<i32> = (0..=MAX_IN_LIST_ITEMS as i32).collect();
		let raw = json!({ "field": "type", "operator": "in", "value": values });

		assert!(FilterNode::parse(&raw).is_err());

		let leaf = json!({ "field": "type", "operator": "eq", "value": "x" });
		let raw = json!({ "combinator": "AND", "children": vec![leaf; MAX_FILTER_NODES] });

		assert!(FilterNode::parse(&raw).is_err(), "group plus children exceeds the node limit");

		let mut raw = json!({ "field": "type", "operator": "eq", "value": "x" });

		for _ in 0..8 {
			raw = json!({ "combinator": "AND", "children": [raw] });
		}

		assert!(FilterNode::parse(&raw).is_err(), "nine levels exceed the depth limit");
	}

	#[test]
	fn parse_list_reports_index() {
		let raw = json!([
			{ "field": "type", "operator": "eq", "value": "x" },
			{ "field": "type", "operator": "sounds_like", "value": "x" },
		]);
		let err = FilterNode::parse_list(&raw).expect_err("unsupported operator");

		assert_eq!(err.path, "$.filters[1].operator");
	}

	#[test]
	fn canonical_key_ignores_group_child_order() {
		let a = FilterNode::from(Filter::new(FilterField::Type, FilterOperator::Equals, "x"));
		let b = FilterNode::from(Filter::new(FilterField::Title, FilterOperator::Contains, "y"));
		let left = FilterNode::from(FilterGroup::all([a.clone(), b.clone()]));
		let right = FilterNode::from(FilterGroup::all([b.clone(), a.clone()]));
		let either = FilterNode::from(FilterGroup {
			combinator: Combinator::Or,
			children: vec![a, b],
			negate: false,
		});

		assert_eq!(left.canonical_key(), right.canonical_key());
		assert_ne!(left.canonical_key(), either.canonical_key());
	}

	#[test]
	fn matches_follows_sql_semantics() {
		let unit = unit();
		let title = FilterNode::from(Filter::new(FilterField::Title, FilterOperator::Contains, "OAuth"));
		let not_answer =
			FilterNode::from(Filter::new(FilterField::Type, FilterOperator::Equals, "answer").negated());
		let empty_in = FilterNode::from(Filter::new(
			FilterField::Type,
			FilterOperator::In,
			FilterValue::List(Vec::new()),
		));

		assert!(title.matches(&unit));
		assert!(not_answer.matches(&unit));
		assert!(empty_in.matches(&unit));
		assert!(FilterNode::from(Filter::new(FilterField::Tags, FilterOperator::Contains, "\"security\"")).matches(&unit));
	}

	#[test]
	fn matches_treats_missing_attribute_as_unknown_even_when_negated() {
		let unit = unit();
		let context = Filter::new(FilterField::Context, FilterOperator::Equals, "x");

		assert!(!FilterNode::from(context.clone()).matches(&unit));
		assert!(!FilterNode::from(context.negated()).matches(&unit));
	}

	#[test]
	fn matches_between_and_regex() {
		let unit = unit();
		let between = Filter::new(
			FilterField::Timestamp,
			FilterOperator::Between,
			vec![1_600_000_000_000_i64, 1_800_000_000_000],
		);
		let regex = Filter::new(FilterField::Title, FilterOperator::Regex, "^OAuth\\s+token");
		let group = FilterNode::from(FilterGroup::any([
			FilterNode::from(Filter::new(FilterField::Type, FilterOperator::Equals, "reference")),
			FilterNode::from(regex),
		]));

		assert!(FilterNode::from(between).matches(&unit));
		assert!(group.matches(&unit));
		assert!(!FilterNode::from(FilterGroup::any([group]).negated()).matches(&unit));
	}
}
