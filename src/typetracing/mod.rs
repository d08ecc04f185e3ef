//! Dynamic type tracing
//!
//! Shadow executions wrap the arguments of untyped parameters in
//! [`ObjectProxy`] values. Whatever the target does with them is recorded in a
//! [`ProxyKnowledge`] tree, which the type inference model later turns into
//! candidate types for those parameters.

pub mod knowledge;
pub mod proxy;
pub mod shim;

pub use knowledge::{ProxyKnowledge, ROOT_NAME};
pub use proxy::{unwrap, ObjectProxy, Operand, MAX_PROXY_NESTING};
pub use shim::{is_shim_active, shim_isinstance, IsinstanceShim, TypeSpec};
