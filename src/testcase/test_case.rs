//! Ordered statement sequences

use super::statement::{Statement, VariableReference};
use crate::value::TypeTag;
use std::collections::BTreeSet;

/// A test case: statements in execution order, where each statement may only
/// read variables defined by strictly earlier statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestCase {
    statements: Vec<Statement>,
}

impl TestCase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn statement(&self, position: usize) -> Option<&Statement> {
        self.statements.get(position)
    }

    pub fn statement_mut(&mut self, position: usize) -> Option<&mut Statement> {
        self.statements.get_mut(position)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Append a statement and return the variable it defines
    pub fn add_statement(&mut self, statement: Statement) -> VariableReference {
        debug_assert!(statement.references().iter().all(|r| r.0 < self.statements.len()));
        self.statements.push(statement);
        VariableReference(self.statements.len() - 1)
    }

    /// Insert a statement at `position`, shifting the references of every
    /// later statement
    pub fn insert_statement(&mut self, position: usize, statement: Statement) -> VariableReference {
        let position = position.min(self.statements.len());
        debug_assert!(statement.references().iter().all(|r| r.0 < position));
        for later in &mut self.statements[position..] {
            for reference in later.references_mut() {
                if reference.0 >= position {
                    reference.0 += 1;
                }
            }
        }
        self.statements.insert(position, statement);
        VariableReference(position)
    }

    /// Remove the statement at `position` together with every statement that
    /// depends on it, directly or transitively. Returns the removed positions.
    pub fn remove_statement(&mut self, position: usize) -> Vec<usize> {
        if position >= self.statements.len() {
            return Vec::new();
        }
        let mut removed = BTreeSet::new();
        removed.insert(position);
        for (index, statement) in self.statements.iter().enumerate().skip(position + 1) {
            if statement.references().iter().any(|r| removed.contains(&r.0)) {
                removed.insert(index);
            }
        }

        let mut remap = vec![None; self.statements.len()];
        let mut next = 0;
        for (index, slot) in remap.iter_mut().enumerate() {
            if !removed.contains(&index) {
                *slot = Some(next);
                next += 1;
            }
        }

        let old = std::mem::take(&mut self.statements);
        for (index, mut statement) in old.into_iter().enumerate() {
            if removed.contains(&index) {
                continue;
            }
            for reference in statement.references_mut() {
                if let Some(new_position) = remap[reference.0] {
                    reference.0 = new_position;
                }
            }
            self.statements.push(statement);
        }
        removed.into_iter().collect()
    }

    /// Drop every statement after `position`
    pub fn chop(&mut self, position: usize) {
        self.statements.truncate(position + 1);
    }

    pub fn return_type(&self, reference: VariableReference) -> Option<TypeTag> {
        self.statements.get(reference.0).and_then(Statement::return_type)
    }

    /// Variables defined before `before` whose type is usable as `tag`
    pub fn variables_for_type(&self, tag: &TypeTag, before: usize) -> Vec<VariableReference> {
        self.statements
            .iter()
            .take(before)
            .enumerate()
            .filter(|(_, statement)| statement.return_type().map_or(false, |own| tag.accepts(&own)))
            .map(|(index, _)| VariableReference(index))
            .collect()
    }

    /// Every reference points at a strictly earlier statement
    pub fn is_valid(&self) -> bool {
        self.statements
            .iter()
            .enumerate()
            .all(|(index, statement)| statement.references().iter().all(|r| r.0 < index))
    }
}
