//! Test case model
//!
//! A test case is a straight-line sequence of statements over numbered
//! variables. This module holds the statement representation, the sequence
//! with its reference bookkeeping, the pool of harvested constants and the
//! factory that builds and edits test cases at random.

pub mod constants;
pub mod factory;
pub mod statement;
pub mod test_case;

pub use constants::ConstantPool;
pub use factory::TestFactory;
pub use statement::{CollectionKind, Statement, VariableReference};
pub use test_case::TestCase;
