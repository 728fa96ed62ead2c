pub mod compile;
pub mod dates;
pub mod error;
pub mod filter;
pub mod unit;

pub use compile::{
	LexicalFragment, VectorFilter, VectorFilterCompilation, VectorOp, compile_lexical,
	compile_lexical_all, compile_vector, compile_vector_all,
};
pub use error::{DateError, Error, FilterError, Result};
pub use filter::{
	Combinator, Filter, FilterField, FilterGroup, FilterNode, FilterOperator, FilterValue,
	canonical_list_key, check_operands,
};
pub use unit::{AtomicUnit, DocumentMeta, LexicalHit, VectorHit};
