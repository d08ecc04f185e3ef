//! The module under test
//!
//! A [`SubjectModule`] is the instrumented view of the target program: its code
//! objects, the predicates and lines inside them with their control
//! dependencies, and the callables a test case can invoke. Callable bodies are
//! closures that report instrumentation events through a [`Frame`].
//!
//! Modules are assembled with a [`ModuleBuilder`], which validates the
//! structure; a malformed module is a target load fault and stops the run
//! before any generation happens.

use crate::execution::Frame;
use crate::typetracing::Operand;
use crate::value::{Fault, TypeTag};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Errors raised while loading the module under test
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    #[error("{owner} refers to unknown code object {code_object_id}")]
    UnknownCodeObject { owner: String, code_object_id: usize },

    #[error("{owner} depends on unknown predicate {predicate_id}")]
    UnknownPredicate { owner: String, predicate_id: usize },

    #[error("{owner} depends on predicate {predicate_id} of another code object")]
    ForeignDependency { owner: String, predicate_id: usize },

    #[error("predicate {owner} depends on later predicate {predicate_id}")]
    ForwardDependency { owner: usize, predicate_id: usize },

    #[error("callable {0} is defined twice")]
    DuplicateCallable(String),

    #[error("could not load module {module}: {reason}")]
    Unavailable { module: String, reason: String },
}

/// A predicate arm that must be taken for code to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ControlDependency {
    pub predicate_id: usize,
    pub branch_value: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeObjectMeta {
    pub id: usize,
    pub name: String,
    pub parent: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredicateMeta {
    pub id: usize,
    pub code_object_id: usize,
    pub line_number: u32,
    pub dependencies: Vec<ControlDependency>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineMeta {
    pub id: usize,
    pub code_object_id: usize,
    pub line_number: u32,
    pub dependencies: Vec<ControlDependency>,
}

/// Size of the instrumented module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubjectProperties {
    pub code_objects: usize,
    pub predicates: usize,
    pub lines: usize,
    pub callables: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallableKind {
    /// Returns a fresh instance of `class`
    Constructor { class: String },
    /// Receives an instance of `class` as its first argument
    Method { class: String },
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    /// Declared type; `None` leaves the choice to type inference
    pub type_hint: Option<TypeTag>,
}

impl Parameter {
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_hint: None,
        }
    }

    pub fn typed(name: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            type_hint: Some(tag),
        }
    }
}

/// Executable body of a callable
pub type CallableBody = Arc<dyn Fn(&mut Frame<'_>, &mut [Operand]) -> Result<Operand, Fault> + Send + Sync>;

/// A constructor, method or function of the module under test
#[derive(Clone)]
pub struct GenericCallable {
    pub id: usize,
    pub name: String,
    pub kind: CallableKind,
    /// Parameters, excluding the receiver of a method
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeTag>,
    pub code_object_id: usize,
    pub body: CallableBody,
}

impl GenericCallable {
    /// Type of the value a call produces, as far as it is known
    pub fn produces(&self) -> Option<TypeTag> {
        match &self.kind {
            CallableKind::Constructor { class } => Some(TypeTag::Class(class.clone())),
            _ => self.return_type.clone(),
        }
    }

    pub fn owner_class(&self) -> Option<&str> {
        match &self.kind {
            CallableKind::Constructor { class } | CallableKind::Method { class } => Some(class),
            CallableKind::Function => None,
        }
    }

    pub fn is_method(&self) -> bool {
        matches!(self.kind, CallableKind::Method { .. })
    }

    pub fn has_untyped_params(&self) -> bool {
        self.params.iter().any(|param| param.type_hint.is_none())
    }

    /// Name as written in a test, e.g. `Queue.put` for a method
    pub fn qualified_name(&self) -> String {
        match &self.kind {
            CallableKind::Method { class } => format!("{}.{}", class, self.name),
            _ => self.name.clone(),
        }
    }
}

impl fmt::Debug for GenericCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericCallable")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("params", &self.params)
            .field("return_type", &self.return_type)
            .field("code_object_id", &self.code_object_id)
            .finish()
    }
}

/// The instrumented module under test
#[derive(Debug, Clone)]
pub struct SubjectModule {
    name: String,
    code_objects: Vec<CodeObjectMeta>,
    predicates: Vec<PredicateMeta>,
    lines: Vec<LineMeta>,
    callables: Vec<GenericCallable>,
}

impl SubjectModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code_objects(&self) -> &[CodeObjectMeta] {
        &self.code_objects
    }

    pub fn predicates(&self) -> &[PredicateMeta] {
        &self.predicates
    }

    pub fn lines(&self) -> &[LineMeta] {
        &self.lines
    }

    pub fn callables(&self) -> &[GenericCallable] {
        &self.callables
    }

    pub fn predicate(&self, id: usize) -> Option<&PredicateMeta> {
        self.predicates.get(id)
    }

    pub fn line(&self, id: usize) -> Option<&LineMeta> {
        self.lines.get(id)
    }

    pub fn callable(&self, id: usize) -> Option<&GenericCallable> {
        self.callables.get(id)
    }

    pub fn callable_by_name(&self, name: &str) -> Option<&GenericCallable> {
        self.callables
            .iter()
            .find(|callable| callable.qualified_name() == name || callable.name == name)
    }

    /// Code objects no predicate lives in
    pub fn branchless_code_objects(&self) -> Vec<usize> {
        let with_predicates: BTreeSet<usize> = self.predicates.iter().map(|p| p.code_object_id).collect();
        self.code_objects
            .iter()
            .map(|code_object| code_object.id)
            .filter(|id| !with_predicates.contains(id))
            .collect()
    }

    /// Callables producing a value usable where `tag` is expected
    pub fn generators_for(&self, tag: &TypeTag) -> Vec<&GenericCallable> {
        self.callables
            .iter()
            .filter(|callable| callable.produces().map_or(false, |produced| tag.accepts(&produced)))
            .collect()
    }

    /// Methods that can be invoked on an instance of `class`
    pub fn modifiers_for(&self, class: &str) -> Vec<&GenericCallable> {
        self.callables
            .iter()
            .filter(|callable| matches!(&callable.kind, CallableKind::Method { class: owner } if owner == class))
            .collect()
    }

    /// Classes with a constructor
    pub fn classes(&self) -> Vec<TypeTag> {
        let classes: BTreeSet<TypeTag> = self
            .callables
            .iter()
            .filter_map(|callable| match &callable.kind {
                CallableKind::Constructor { class } => Some(TypeTag::Class(class.clone())),
                _ => None,
            })
            .collect();
        classes.into_iter().collect()
    }

    /// Every type the test factory can produce a value for
    pub fn known_types(&self) -> Vec<TypeTag> {
        let mut types: Vec<TypeTag> = crate::value::PRIMITIVE_TYPES.to_vec();
        types.extend(crate::value::COLLECTION_TYPES.iter().cloned());
        types.push(TypeTag::NoneType);
        types.extend(self.classes());
        types
    }

    pub fn properties(&self) -> SubjectProperties {
        SubjectProperties {
            code_objects: self.code_objects.len(),
            predicates: self.predicates.len(),
            lines: self.lines.len(),
            callables: self.callables.len(),
        }
    }
}

/// Supplies the module under test
pub trait SubjectProvider {
    fn load(&self) -> Result<SubjectModule, LoadError>;
}

impl<F> SubjectProvider for F
where
    F: Fn() -> Result<SubjectModule, LoadError>,
{
    fn load(&self) -> Result<SubjectModule, LoadError> {
        self()
    }
}

/// Incremental construction of a [`SubjectModule`]
///
/// Identifiers are dense and handed out in creation order, so predicates and
/// lines can only depend on predicates that already exist.
pub struct ModuleBuilder {
    name: String,
    code_objects: Vec<CodeObjectMeta>,
    predicates: Vec<PredicateMeta>,
    lines: Vec<LineMeta>,
    callables: Vec<GenericCallable>,
}

fn dependencies_of(raw: &[(usize, bool)]) -> Vec<ControlDependency> {
    raw.iter()
        .map(|&(predicate_id, branch_value)| ControlDependency {
            predicate_id,
            branch_value,
        })
        .collect()
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code_objects: Vec::new(),
            predicates: Vec::new(),
            lines: Vec::new(),
            callables: Vec::new(),
        }
    }

    pub fn code_object(&mut self, name: impl Into<String>, parent: Option<usize>) -> usize {
        let id = self.code_objects.len();
        self.code_objects.push(CodeObjectMeta {
            id,
            name: name.into(),
            parent,
        });
        id
    }

    /// Register a predicate of `code_object_id` guarded by `dependencies`
    /// (`(predicate, arm)` pairs)
    pub fn predicate(&mut self, code_object_id: usize, line_number: u32, dependencies: &[(usize, bool)]) -> usize {
        let id = self.predicates.len();
        self.predicates.push(PredicateMeta {
            id,
            code_object_id,
            line_number,
            dependencies: dependencies_of(dependencies),
        });
        id
    }

    pub fn line(&mut self, code_object_id: usize, line_number: u32, dependencies: &[(usize, bool)]) -> usize {
        let id = self.lines.len();
        self.lines.push(LineMeta {
            id,
            code_object_id,
            line_number,
            dependencies: dependencies_of(dependencies),
        });
        id
    }

    fn add_callable<F>(
        &mut self,
        name: String,
        kind: CallableKind,
        code_object_id: usize,
        params: Vec<Parameter>,
        return_type: Option<TypeTag>,
        body: F,
    ) -> usize
    where
        F: Fn(&mut Frame<'_>, &mut [Operand]) -> Result<Operand, Fault> + Send + Sync + 'static,
    {
        let id = self.callables.len();
        self.callables.push(GenericCallable {
            id,
            name,
            kind,
            params,
            return_type,
            code_object_id,
            body: Arc::new(body),
        });
        id
    }

    pub fn function<F>(
        &mut self,
        name: impl Into<String>,
        code_object_id: usize,
        params: Vec<Parameter>,
        return_type: Option<TypeTag>,
        body: F,
    ) -> usize
    where
        F: Fn(&mut Frame<'_>, &mut [Operand]) -> Result<Operand, Fault> + Send + Sync + 'static,
    {
        self.add_callable(name.into(), CallableKind::Function, code_object_id, params, return_type, body)
    }

    pub fn constructor<F>(&mut self, class: impl Into<String>, code_object_id: usize, params: Vec<Parameter>, body: F) -> usize
    where
        F: Fn(&mut Frame<'_>, &mut [Operand]) -> Result<Operand, Fault> + Send + Sync + 'static,
    {
        let class = class.into();
        let return_type = Some(TypeTag::Class(class.clone()));
        self.add_callable(
            class.clone(),
            CallableKind::Constructor { class },
            code_object_id,
            params,
            return_type,
            body,
        )
    }

    /// Register a method; its body receives the instance as argument 0
    pub fn method<F>(
        &mut self,
        class: impl Into<String>,
        name: impl Into<String>,
        code_object_id: usize,
        params: Vec<Parameter>,
        return_type: Option<TypeTag>,
        body: F,
    ) -> usize
    where
        F: Fn(&mut Frame<'_>, &mut [Operand]) -> Result<Operand, Fault> + Send + Sync + 'static,
    {
        self.add_callable(
            name.into(),
            CallableKind::Method { class: class.into() },
            code_object_id,
            params,
            return_type,
            body,
        )
    }

    fn check_dependencies(
        &self,
        owner: &str,
        code_object_id: usize,
        dependencies: &[ControlDependency],
        before: Option<usize>,
    ) -> Result<(), LoadError> {
        if code_object_id >= self.code_objects.len() {
            return Err(LoadError::UnknownCodeObject {
                owner: owner.to_string(),
                code_object_id,
            });
        }
        for dependency in dependencies {
            let target = self
                .predicates
                .get(dependency.predicate_id)
                .ok_or_else(|| LoadError::UnknownPredicate {
                    owner: owner.to_string(),
                    predicate_id: dependency.predicate_id,
                })?;
            if target.code_object_id != code_object_id {
                return Err(LoadError::ForeignDependency {
                    owner: owner.to_string(),
                    predicate_id: dependency.predicate_id,
                });
            }
            if let Some(own_id) = before {
                if dependency.predicate_id >= own_id {
                    return Err(LoadError::ForwardDependency {
                        owner: own_id,
                        predicate_id: dependency.predicate_id,
                    });
                }
            }
        }
        Ok(())
    }

    /// Validate and freeze the module
    pub fn build(self) -> Result<SubjectModule, LoadError> {
        for code_object in &self.code_objects {
            if let Some(parent) = code_object.parent {
                if parent >= self.code_objects.len() {
                    return Err(LoadError::UnknownCodeObject {
                        owner: format!("code object {}", code_object.name),
                        code_object_id: parent,
                    });
                }
            }
        }
        for predicate in &self.predicates {
            self.check_dependencies(
                &format!("predicate {}", predicate.id),
                predicate.code_object_id,
                &predicate.dependencies,
                Some(predicate.id),
            )?;
        }
        for line in &self.lines {
            self.check_dependencies(
                &format!("line {}", line.line_number),
                line.code_object_id,
                &line.dependencies,
                None,
            )?;
        }
        let mut seen = BTreeSet::new();
        for callable in &self.callables {
            if callable.code_object_id >= self.code_objects.len() {
                return Err(LoadError::UnknownCodeObject {
                    owner: format!("callable {}", callable.qualified_name()),
                    code_object_id: callable.code_object_id,
                });
            }
            if !seen.insert(callable.qualified_name()) {
                return Err(LoadError::DuplicateCallable(callable.qualified_name()));
            }
        }

        Ok(SubjectModule {
            name: self.name,
            code_objects: self.code_objects,
            predicates: self.predicates,
            lines: self.lines,
            callables: self.callables,
        })
    }
}
