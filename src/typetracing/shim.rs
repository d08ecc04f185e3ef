//! Scoped override of runtime type checks
//!
//! Type checks made against a proxy are only recorded while an
//! [`IsinstanceShim`] guard is alive on the current thread. The guard restores
//! the previous state when dropped, including when the shadow execution
//! unwinds.

use crate::value::TypeTag;
use std::cell::Cell;
use std::fmt;

thread_local! {
    static SHIM_DEPTH: Cell<usize> = Cell::new(0);
}

/// Second argument of an `isinstance` check
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Type(TypeTag),
    /// The proxy wrapper type itself
    ProxyWrapper,
    Union(Vec<TypeSpec>),
    /// Anything that is not a type; the check raises a `TypeError`
    NotAType(String),
}

impl TypeSpec {
    pub fn union(types: impl IntoIterator<Item = TypeTag>) -> Self {
        TypeSpec::Union(types.into_iter().map(TypeSpec::Type).collect())
    }

    /// Flattened members of the type spec
    pub fn members(&self) -> Vec<&TypeSpec> {
        match self {
            TypeSpec::Union(members) => members.iter().flat_map(TypeSpec::members).collect(),
            single => vec![single],
        }
    }

    pub fn mentions_proxy_wrapper(&self) -> bool {
        self.members().iter().any(|member| matches!(member, TypeSpec::ProxyWrapper))
    }

    /// The offending member if the type spec is not a valid type or tuple of types
    pub fn invalid_member(&self) -> Option<&str> {
        self.members().into_iter().find_map(|member| match member {
            TypeSpec::NotAType(description) => Some(description.as_str()),
            _ => None,
        })
    }

    pub fn types(&self) -> Vec<TypeTag> {
        self.members()
            .into_iter()
            .filter_map(|member| match member {
                TypeSpec::Type(tag) => Some(tag.clone()),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Type(tag) => write!(f, "{}", tag),
            TypeSpec::ProxyWrapper => write!(f, "ObjectProxy"),
            TypeSpec::NotAType(description) => write!(f, "{}", description),
            TypeSpec::Union(members) => {
                let names: Vec<String> = members.iter().map(ToString::to_string).collect();
                write!(f, "({})", names.join(", "))
            }
        }
    }
}

/// Guard that keeps type-check recording enabled on this thread
#[derive(Debug)]
pub struct IsinstanceShim {
    _private: (),
}

/// Enable recording of type checks until the returned guard is dropped
pub fn shim_isinstance() -> IsinstanceShim {
    SHIM_DEPTH.with(|depth| depth.set(depth.get() + 1));
    IsinstanceShim { _private: () }
}

impl Drop for IsinstanceShim {
    fn drop(&mut self) {
        SHIM_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

pub fn is_shim_active() -> bool {
    SHIM_DEPTH.with(|depth| depth.get() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shim_is_scoped() {
        assert!(!is_shim_active());
        {
            let _shim = shim_isinstance();
            assert!(is_shim_active());
            {
                let _inner = shim_isinstance();
                assert!(is_shim_active());
            }
            assert!(is_shim_active());
        }
        assert!(!is_shim_active());
    }

    #[test]
    fn test_shim_restored_after_panic() {
        let result = std::panic::catch_unwind(|| {
            let _shim = shim_isinstance();
            panic!("boom");
        });
        assert!(result.is_err());
        assert!(!is_shim_active());
    }

    #[test]
    fn test_nested_unions_flatten() {
        let spec = TypeSpec::Union(vec![
            TypeSpec::Type(TypeTag::Int),
            TypeSpec::Union(vec![TypeSpec::ProxyWrapper, TypeSpec::Type(TypeTag::Bytes)]),
        ]);
        assert_eq!(spec.types(), vec![TypeTag::Int, TypeTag::Bytes]);
        assert!(spec.mentions_proxy_wrapper());
        assert_eq!(spec.invalid_member(), None);
    }
}
