//! Filter compilation for the two retrieval backends.
//!
//! The lexical side renders a parameterized SQL fragment with `?` placeholders; values never
//! appear in the text. The vector side renders a structured metadata filter and reports when
//! part of the tree could not be expressed, so callers can evaluate the remainder in process.

use serde_json::{Map, Value};

use crate::filter::{Combinator, Filter, FilterField, FilterNode, FilterOperator, FilterValue};

/// A SQL boolean expression with positional `?` placeholders and their values in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LexicalFragment {
	pub sql: String,
	pub params: Vec<FilterValue>,
}
impl LexicalFragment {
	pub fn is_empty(&self) -> bool {
		self.sql.is_empty()
	}

	fn wrap_not(self) -> Self {
		if self.is_empty() {
			return self;
		}

		Self { sql: format!("NOT ({})", self.sql), params: self.params }
	}
}

/// Compiles one node. An empty fragment means the node constrains nothing.
pub fn compile_lexical(node: &FilterNode) -> LexicalFragment {
	match node {
		FilterNode::Leaf(filter) => {
			let fragment = compile_lexical_leaf(filter);

			if filter.negate { fragment.wrap_not() } else { fragment }
		},
		FilterNode::Group(group) => {
			let joined = join_fragments(
				group.children.iter().map(compile_lexical).collect(),
				group.combinator,
			);

			if group.negate { joined.wrap_not() } else { joined }
		},
	}
}

/// Compiles a filter list with the implicit AND that request filters carry.
pub fn compile_lexical_all(filters: &[FilterNode]) -> LexicalFragment {
	join_fragments(filters.iter().map(compile_lexical).collect(), Combinator::And)
}

fn join_fragments(fragments: Vec<LexicalFragment>, combinator: Combinator) -> LexicalFragment {
	let mut survivors: Vec<LexicalFragment> =
		fragments.into_iter().filter(|fragment| !fragment.is_empty()).collect();

	match survivors.len() {
		0 => LexicalFragment::default(),
		1 => survivors.remove(0),
		_ => {
			let separator = format!(" {} ", combinator.as_str());
			let sql = survivors.iter().map(|fragment| fragment.sql.as_str()).collect::<Vec<_>>();
			let sql = format!("({})", sql.join(&separator));
			let params = survivors.into_iter().flat_map(|fragment| fragment.params).collect();

			LexicalFragment { sql, params }
		},
	}
}

fn compile_lexical_leaf(filter: &Filter) -> LexicalFragment {
	let column = filter.field.as_str();

	if let Some(token) = filter.operator.comparison_token() {
		return LexicalFragment {
			sql: format!("{column} {token} ?"),
			params: vec![filter.value.clone()],
		};
	}

	match filter.operator {
		FilterOperator::In => {
			let elements = filter.value.elements();

			if elements.is_empty() {
				return LexicalFragment::default();
			}

			let placeholders = vec!["?"; elements.len()].join(", ");

			LexicalFragment {
				sql: format!("{column} IN ({placeholders})"),
				params: elements.into_iter().cloned().collect(),
			}
		},
		FilterOperator::Contains => LexicalFragment {
			sql: format!("{column} LIKE ?"),
			params: vec![FilterValue::Text(format!("%{}%", escape_like(&filter.value.as_text())))],
		},
		FilterOperator::Regex => LexicalFragment {
			sql: format!("{column} REGEXP ?"),
			params: vec![filter.value.clone()],
		},
		FilterOperator::Between => match &filter.value {
			FilterValue::List(bounds) if bounds.len() == 2 => LexicalFragment {
				sql: format!("{column} BETWEEN ? AND ?"),
				params: bounds.clone(),
			},
			_ => LexicalFragment::default(),
		},
		_ => LexicalFragment::default(),
	}
}

/// Escapes LIKE wildcards so `contains` matches the operand literally. Backslash is the default
/// LIKE escape character.
fn escape_like(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());

	for ch in raw.chars() {
		if matches!(ch, '\\' | '%' | '_') {
			out.push('\\');
		}

		out.push(ch);
	}

	out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorOp {
	Eq,
	Ne,
	Gt,
	Gte,
	Lt,
	Lte,
	In,
}
impl VectorOp {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Eq => "$eq",
			Self::Ne => "$ne",
			Self::Gt => "$gt",
			Self::Gte => "$gte",
			Self::Lt => "$lt",
			Self::Lte => "$lte",
			Self::In => "$in",
		}
	}
}

/// Metadata filter understood by the vector index.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorFilter {
	AllOf(Vec<VectorFilter>),
	AnyOf(Vec<VectorFilter>),
	/// Matches when none of the inner filters match.
	NoneOf(Vec<VectorFilter>),
	Condition { field: FilterField, op: VectorOp, value: FilterValue },
}
impl VectorFilter {
	/// Renders the document-store style form: `{"$and": [...]}`, `{"field": {"$eq": v}}`.
	pub fn to_value(&self) -> Value {
		match self {
			Self::AllOf(filters) => keyed("$and", filters),
			Self::AnyOf(filters) => keyed("$or", filters),
			Self::NoneOf(filters) => keyed("$not", filters),
			Self::Condition { field, op, value } => {
				let mut inner = Map::new();

				inner.insert(op.as_str().to_string(), value.to_value());

				let mut outer = Map::new();

				outer.insert(field.as_str().to_string(), Value::Object(inner));

				Value::Object(outer)
			},
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorFilterCompilation {
	/// `None` when nothing in the tree could be expressed.
	pub filter: Option<VectorFilter>,
	/// Set when at least one predicate was dropped because the vector index cannot evaluate it.
	pub had_unsupported_operator: bool,
}
impl VectorFilterCompilation {
	/// True when the vector filter is equivalent to the lexical one.
	pub fn is_complete(&self) -> bool {
		!self.had_unsupported_operator
	}
}

pub fn compile_vector(node: &FilterNode) -> VectorFilterCompilation {
	let mut had_unsupported_operator = false;
	let filter = compile_vector_node(node, &mut had_unsupported_operator);

	VectorFilterCompilation { filter, had_unsupported_operator }
}

pub fn compile_vector_all(filters: &[FilterNode]) -> VectorFilterCompilation {
	let mut had_unsupported_operator = false;
	let children = filters
		.iter()
		.filter_map(|node| compile_vector_node(node, &mut had_unsupported_operator))
		.collect();

	VectorFilterCompilation { filter: collapse(children, Combinator::And), had_unsupported_operator }
}

fn compile_vector_node(node: &FilterNode, unsupported: &mut bool) -> Option<VectorFilter> {
	match node {
		FilterNode::Leaf(filter) => {
			let condition = compile_vector_leaf(filter, unsupported)?;

			Some(if filter.negate { VectorFilter::NoneOf(vec![condition]) } else { condition })
		},
		FilterNode::Group(group) => {
			let children = group
				.children
				.iter()
				.filter_map(|child| compile_vector_node(child, unsupported))
				.collect();
			let joined = collapse(children, group.combinator)?;

			Some(if group.negate { VectorFilter::NoneOf(vec![joined]) } else { joined })
		},
	}
}

fn compile_vector_leaf(filter: &Filter, unsupported: &mut bool) -> Option<VectorFilter> {
	let op = match filter.operator {
		FilterOperator::Equals => VectorOp::Eq,
		FilterOperator::NotEquals => VectorOp::Ne,
		FilterOperator::GreaterThan => VectorOp::Gt,
		FilterOperator::GreaterThanOrEqual => VectorOp::Gte,
		FilterOperator::LessThan => VectorOp::Lt,
		FilterOperator::LessThanOrEqual => VectorOp::Lte,
		FilterOperator::In => VectorOp::In,
		FilterOperator::Contains | FilterOperator::Regex | FilterOperator::Between => {
			*unsupported = true;

			return None;
		},
	};
	let supported = match op {
		VectorOp::Eq | VectorOp::Ne =>
			matches!(filter.value, FilterValue::Text(_) | FilterValue::Number(_) | FilterValue::Bool(_)),
		VectorOp::Gt | VectorOp::Gte | VectorOp::Lt | VectorOp::Lte =>
			matches!(filter.value, FilterValue::Number(_)),
		VectorOp::In => {
			let elements = filter.value.elements();

			if elements.is_empty() {
				return None;
			}

			homogeneous(&elements)
		},
	};

	if !supported {
		*unsupported = true;

		return None;
	}

	let value = match (op, &filter.value) {
		(VectorOp::In, FilterValue::List(_)) => filter.value.clone(),
		(VectorOp::In, scalar) => FilterValue::List(vec![scalar.clone()]),
		(_, scalar) => scalar.clone(),
	};

	Some(VectorFilter::Condition { field: filter.field, op, value })
}

fn homogeneous(elements: &[&FilterValue]) -> bool {
	let all_text = elements.iter().all(|value| matches!(value, FilterValue::Text(_)));
	let all_numbers = elements.iter().all(|value| matches!(value, FilterValue::Number(_)));

	all_text || all_numbers
}

fn collapse(mut children: Vec<VectorFilter>, combinator: Combinator) -> Option<VectorFilter> {
	match children.len() {
		0 => None,
		1 => children.pop(),
		_ => Some(match combinator {
			Combinator::And => VectorFilter::AllOf(children),
			Combinator::Or => VectorFilter::AnyOf(children),
		}),
	}
}

fn keyed(key: &str, filters: &[VectorFilter]) -> Value {
	let mut map = Map::new();

	map.insert(key.to_string(), Value::Array(filters.iter().map(VectorFilter::to_value).collect()));

	Value::Object(map)
}
