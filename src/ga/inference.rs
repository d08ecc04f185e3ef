//! Type inference from recorded parameter usage
//!
//! Knowledge collected by shadow calls is merged per `(callable, parameter)`.
//! Candidate types are derived from it in order of how direct the evidence is:
//! explicit type checks first, then the argument types of operators and
//! comparisons applied to the parameter, then well-known method names and
//! container protocols.

use crate::execution::ParameterUsage;
use crate::typetracing::ProxyKnowledge;
use crate::value::{BinOp, TypeTag};
use std::collections::BTreeMap;

const COMPARISONS: [&str; 6] = ["__eq__", "__ne__", "__lt__", "__le__", "__gt__", "__ge__"];

fn method_hint(name: &str) -> Option<TypeTag> {
    match name {
        "startswith" | "endswith" | "upper" | "lower" | "strip" | "split" | "join" | "replace" | "find"
        | "isdigit" => Some(TypeTag::Str),
        "append" | "extend" | "insert" | "pop" | "index" | "clear" => Some(TypeTag::List),
        "keys" | "values" | "items" | "get" => Some(TypeTag::Dict),
        "add" => Some(TypeTag::Set),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct TypeInference {
    knowledge: BTreeMap<(usize, usize), ProxyKnowledge>,
}

impl TypeInference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the knowledge of one shadow-call parameter
    pub fn record(&mut self, usage: &ParameterUsage) {
        self.knowledge
            .entry((usage.callable_id, usage.parameter))
            .or_insert_with(ProxyKnowledge::root)
            .merge(&usage.knowledge);
    }

    pub fn record_all<'a>(&mut self, usages: impl IntoIterator<Item = &'a ParameterUsage>) {
        for usage in usages {
            self.record(usage);
        }
    }

    pub fn knowledge_for(&self, callable_id: usize, parameter: usize) -> Option<&ProxyKnowledge> {
        self.knowledge.get(&(callable_id, parameter))
    }

    pub fn len(&self) -> usize {
        self.knowledge.len()
    }

    pub fn is_empty(&self) -> bool {
        self.knowledge.is_empty()
    }

    /// Types worth trying for an unannotated parameter, most likely first
    pub fn candidate_types(&self, callable_id: usize, parameter: usize) -> Vec<TypeTag> {
        let knowledge = match self.knowledge_for(callable_id, parameter) {
            Some(knowledge) => knowledge,
            None => return Vec::new(),
        };
        let mut candidates: Vec<TypeTag> = Vec::new();
        let mut push = |tag: TypeTag| {
            if !candidates.contains(&tag) {
                candidates.push(tag);
            }
        };

        for tag in &knowledge.type_checks {
            push(tag.clone());
        }

        let operator_names = BinOp::ALL
            .iter()
            .flat_map(|op| [op.name(), op.reflected_name(), op.inplace_name()])
            .chain(COMPARISONS.iter().map(|name| name.to_string()));
        for name in operator_names {
            if let Some(node) = knowledge.attr_table.get(&name) {
                for tag in node.arg_types_at(0) {
                    if tag != TypeTag::NoneType {
                        push(tag);
                    }
                }
            }
        }

        for name in knowledge.attr_table.keys() {
            if let Some(tag) = method_hint(name) {
                push(tag);
            }
        }

        if let Some(node) = knowledge.attr_table.get("__getitem__") {
            let keys = node.arg_types_at(0);
            if keys.contains(&TypeTag::Str) {
                push(TypeTag::Dict);
            }
            if keys.contains(&TypeTag::Int) || keys.contains(&TypeTag::Bool) {
                push(TypeTag::List);
                push(TypeTag::Tuple);
            }
        }
        for protocol in ["__iter__", "__len__", "__contains__"] {
            if knowledge.attr_table.contains_key(protocol) {
                push(TypeTag::List);
            }
        }
        candidates
    }
}
