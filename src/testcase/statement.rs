//! Statements of a generated test case

use crate::value::{TypeTag, Value};
use std::fmt;

/// Reference to the variable defined by the statement at this position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableReference(pub usize);

impl VariableReference {
    pub fn position(self) -> usize {
        self.0
    }
}

impl fmt::Display for VariableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    List,
    Tuple,
    Set,
}

impl CollectionKind {
    pub fn type_tag(self) -> TypeTag {
        match self {
            CollectionKind::List => TypeTag::List,
            CollectionKind::Tuple => TypeTag::Tuple,
            CollectionKind::Set => TypeTag::Set,
        }
    }
}

/// One instruction of a test case. Every statement defines exactly one
/// variable, named by its position in the test case.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Assign a literal
    Primitive(Value),
    Constructor {
        callable: usize,
        class: String,
        args: Vec<VariableReference>,
    },
    Method {
        callable: usize,
        callee: VariableReference,
        args: Vec<VariableReference>,
        returns: Option<TypeTag>,
    },
    Function {
        callable: usize,
        args: Vec<VariableReference>,
        returns: Option<TypeTag>,
    },
    /// `target.field = value`; defines `None`
    FieldAssign {
        target: VariableReference,
        field: String,
        value: VariableReference,
    },
    Collection {
        kind: CollectionKind,
        elements: Vec<VariableReference>,
    },
    Dict {
        entries: Vec<(VariableReference, VariableReference)>,
    },
}

impl Statement {
    /// Variables read by the statement, in argument order
    pub fn references(&self) -> Vec<VariableReference> {
        match self {
            Statement::Primitive(_) => Vec::new(),
            Statement::Constructor { args, .. } | Statement::Function { args, .. } => args.clone(),
            Statement::Method { callee, args, .. } => {
                let mut references = Vec::with_capacity(args.len() + 1);
                references.push(*callee);
                references.extend(args.iter().copied());
                references
            }
            Statement::FieldAssign { target, value, .. } => vec![*target, *value],
            Statement::Collection { elements, .. } => elements.clone(),
            Statement::Dict { entries } => entries.iter().flat_map(|(k, v)| [*k, *v]).collect(),
        }
    }

    pub fn references_mut(&mut self) -> Vec<&mut VariableReference> {
        match self {
            Statement::Primitive(_) => Vec::new(),
            Statement::Constructor { args, .. } | Statement::Function { args, .. } => args.iter_mut().collect(),
            Statement::Method { callee, args, .. } => std::iter::once(callee).chain(args.iter_mut()).collect(),
            Statement::FieldAssign { target, value, .. } => vec![target, value],
            Statement::Collection { elements, .. } => elements.iter_mut().collect(),
            Statement::Dict { entries } => entries.iter_mut().flat_map(|(k, v)| [k, v]).collect(),
        }
    }

    pub fn uses(&self, reference: VariableReference) -> bool {
        self.references().contains(&reference)
    }

    /// Type of the defined variable; `None` when a callable's result type is unknown
    pub fn return_type(&self) -> Option<TypeTag> {
        match self {
            Statement::Primitive(value) => Some(value.type_tag()),
            Statement::Constructor { class, .. } => Some(TypeTag::Class(class.clone())),
            Statement::Method { returns, .. } | Statement::Function { returns, .. } => returns.clone(),
            Statement::FieldAssign { .. } => Some(TypeTag::NoneType),
            Statement::Collection { kind, .. } => Some(kind.type_tag()),
            Statement::Dict { .. } => Some(TypeTag::Dict),
        }
    }

    pub fn callable_id(&self) -> Option<usize> {
        match self {
            Statement::Constructor { callable, .. }
            | Statement::Method { callable, .. }
            | Statement::Function { callable, .. } => Some(*callable),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Statement::Primitive(_))
    }
}
