//! Knowledge trees collected by type-tracing proxies

use crate::value::TypeTag;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

/// Name of the root node of every knowledge tree
pub const ROOT_NAME: &str = "ROOT";

/// What was observed about how a value is used.
///
/// Each node is keyed by the attribute or operation name that led to it. A node
/// records the types of the positional arguments passed to the operation, the
/// types the value was explicitly checked against, and child nodes for
/// attribute, item and iteration accesses on the result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ProxyKnowledge {
    pub name: String,
    pub attr_table: BTreeMap<String, ProxyKnowledge>,
    pub arg_types: BTreeMap<usize, BTreeSet<TypeTag>>,
    pub type_checks: BTreeSet<TypeTag>,
}

impl ProxyKnowledge {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn root() -> Self {
        Self::new(ROOT_NAME)
    }

    /// Child node for `name`, created empty on first access
    pub fn child(&mut self, name: &str) -> &mut ProxyKnowledge {
        self.attr_table
            .entry(name.to_string())
            .or_insert_with(|| ProxyKnowledge::new(name))
    }

    /// Node reached by following `path` from this node, creating missing nodes
    pub fn node_at_mut(&mut self, path: &[String]) -> &mut ProxyKnowledge {
        path.iter().fold(self, |node, name| node.child(name))
    }

    pub fn add_arg_type(&mut self, position: usize, tag: TypeTag) {
        self.arg_types.entry(position).or_default().insert(tag);
    }

    pub fn add_type_check(&mut self, tag: TypeTag) {
        self.type_checks.insert(tag);
    }

    pub fn is_empty(&self) -> bool {
        self.attr_table.is_empty() && self.arg_types.is_empty() && self.type_checks.is_empty()
    }

    /// Argument types observed at `position`, empty if none were
    pub fn arg_types_at(&self, position: usize) -> BTreeSet<TypeTag> {
        self.arg_types.get(&position).cloned().unwrap_or_default()
    }

    /// Union `other` into this tree, node by node
    pub fn merge(&mut self, other: &ProxyKnowledge) {
        for (position, tags) in &other.arg_types {
            self.arg_types
                .entry(*position)
                .or_default()
                .extend(tags.iter().cloned());
        }
        self.type_checks.extend(other.type_checks.iter().cloned());
        for (name, child) in &other.attr_table {
            self.child(name).merge(child);
        }
    }

    /// Merge of two trees; the result keeps the name of `left`
    pub fn merged(left: &ProxyKnowledge, right: &ProxyKnowledge) -> ProxyKnowledge {
        let mut result = left.clone();
        result.merge(right);
        result
    }

    /// Node at `path` below this one, if every step exists
    pub fn find_path(&self, path: &[&str]) -> Option<&ProxyKnowledge> {
        let mut node = self;
        for name in path {
            node = node.attr_table.get(*name)?;
        }
        Some(node)
    }

    /// Tree dump, one node per line
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.write_label(&mut out);
        self.write_children(&mut out, "");
        out
    }

    fn write_label(&self, out: &mut String) {
        let _ = write!(out, "['{}'", self.name);
        if !self.type_checks.is_empty() {
            let _ = write!(out, " (type-checks: {{{}}})", join_tags(&self.type_checks));
        }
        if !self.arg_types.is_empty() {
            let positions: Vec<String> = self
                .arg_types
                .iter()
                .map(|(position, tags)| format!("{}: {{{}}}", position, join_tags(tags)))
                .collect();
            let _ = write!(out, " (arg-types: {{{}}})", positions.join(", "));
        }
        out.push(']');
    }

    fn write_children(&self, out: &mut String, prefix: &str) {
        let count = self.attr_table.len();
        for (index, child) in self.attr_table.values().enumerate() {
            let last = index + 1 == count;
            out.push('\n');
            out.push_str(prefix);
            out.push_str(if last { "└──" } else { "├──" });
            child.write_label(out);
            let extension = if last { "   " } else { "│  " };
            child.write_children(out, &format!("{}{}", prefix, extension));
        }
    }
}

fn join_tags(tags: &BTreeSet<TypeTag>) -> String {
    tags.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
