//! Transparent recording wrapper around target values
//!
//! An [`ObjectProxy`] forwards every operation to the value it wraps and notes
//! in a shared [`ProxyKnowledge`] tree which operations were applied and with
//! which argument types. Target code only ever sees [`Operand`]s, so a proxied
//! argument and a plain value flow through the same code paths.

use super::knowledge::ProxyKnowledge;
use super::shim::{is_shim_active, TypeSpec};
use crate::value::{BinOp, CompareOp, Fault, TypeTag, UnaryOp, Value};
use std::sync::{Arc, Mutex, PoisonError};

/// Deepest chain of attribute, item or iteration accesses that is still wrapped
pub const MAX_PROXY_NESTING: usize = 5;

#[derive(Debug, Clone)]
pub struct ObjectProxy {
    inner: Box<Operand>,
    knowledge: Arc<Mutex<ProxyKnowledge>>,
    /// Position of this proxy's node in the shared tree
    path: Vec<String>,
    depth: usize,
}

/// A value as seen by target code: either plain or wrapped in a proxy
#[derive(Debug, Clone)]
pub enum Operand {
    Value(Value),
    Proxy(ObjectProxy),
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Value(value)
    }
}

impl From<ObjectProxy> for Operand {
    fn from(proxy: ObjectProxy) -> Self {
        Operand::Proxy(proxy)
    }
}

impl ObjectProxy {
    /// Wrap `inner` in a new proxy with an empty knowledge tree
    pub fn new(inner: impl Into<Operand>) -> Self {
        Self {
            inner: Box::new(inner.into()),
            knowledge: Arc::new(Mutex::new(ProxyKnowledge::root())),
            path: Vec::new(),
            depth: 0,
        }
    }

    /// Snapshot of the knowledge recorded for this proxy
    pub fn knowledge(&self) -> ProxyKnowledge {
        self.with_node(|node| node.clone())
    }

    /// Shared handle to the whole tree this proxy records into
    pub fn knowledge_handle(&self) -> Arc<Mutex<ProxyKnowledge>> {
        Arc::clone(&self.knowledge)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn inner(&self) -> &Operand {
        &self.inner
    }

    fn with_node<R>(&self, f: impl FnOnce(&mut ProxyKnowledge) -> R) -> R {
        let mut tree = self.knowledge.lock().unwrap_or_else(PoisonError::into_inner);
        f(tree.node_at_mut(&self.path))
    }

    fn touch(&self, name: &str) {
        self.with_node(|node| {
            node.child(name);
        });
    }

    /// Note an operation with a single argument; proxied arguments carry no type
    fn record_arg(&self, name: &str, arg: &Operand) {
        self.record_args(name, std::slice::from_ref(arg));
    }

    fn record_args(&self, name: &str, args: &[Operand]) {
        self.with_node(|node| {
            let child = node.child(name);
            for (position, arg) in args.iter().enumerate() {
                if !arg.is_proxy() {
                    child.add_arg_type(position, arg.type_tag());
                }
            }
        });
    }

    /// Wrap a value produced by an access as a child proxy, or hand it back
    /// raw once the nesting bound is reached
    fn child_operand(&self, name: &str, value: Value) -> Operand {
        if self.depth + 1 > MAX_PROXY_NESTING {
            return Operand::Value(value);
        }
        let mut path = self.path.clone();
        path.push(name.to_string());
        Operand::Proxy(ObjectProxy {
            inner: Box::new(Operand::Value(value)),
            knowledge: Arc::clone(&self.knowledge),
            path,
            depth: self.depth + 1,
        })
    }
}

impl Operand {
    pub fn is_proxy(&self) -> bool {
        matches!(self, Operand::Proxy(_))
    }

    pub fn as_proxy(&self) -> Option<&ObjectProxy> {
        match self {
            Operand::Proxy(proxy) => Some(proxy),
            Operand::Value(_) => None,
        }
    }

    /// The plain value underneath any number of proxies
    pub fn unwrap_value(&self) -> &Value {
        match self {
            Operand::Value(value) => value,
            Operand::Proxy(proxy) => proxy.inner.unwrap_value(),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Operand::Value(value) => value,
            Operand::Proxy(proxy) => proxy.inner.into_value(),
        }
    }

    fn value_mut(&mut self) -> &mut Value {
        match self {
            Operand::Value(value) => value,
            Operand::Proxy(proxy) => proxy.inner.value_mut(),
        }
    }

    /// Runtime type of the underlying value; never recorded
    pub fn type_tag(&self) -> TypeTag {
        self.unwrap_value().type_tag()
    }

    pub fn binary(&self, op: BinOp, rhs: &Operand) -> Result<Operand, Fault> {
        match (self, rhs) {
            (Operand::Proxy(proxy), _) => proxy.record_arg(&op.name(), rhs),
            (_, Operand::Proxy(proxy)) => proxy.record_arg(&op.reflected_name(), self),
            _ => {}
        }
        self.unwrap_value()
            .binary(op, rhs.unwrap_value())
            .map(Operand::Value)
    }

    /// Augmented assignment `self op= rhs`; a proxy keeps wrapping the new value
    pub fn inplace(&mut self, op: BinOp, rhs: &Operand) -> Result<(), Fault> {
        match (&*self, rhs) {
            (Operand::Proxy(proxy), _) => proxy.record_arg(&op.inplace_name(), rhs),
            (lhs, Operand::Proxy(proxy)) => proxy.record_arg(&op.reflected_name(), lhs),
            _ => {}
        }
        let result = self.unwrap_value().binary(op, rhs.unwrap_value())?;
        *self.value_mut() = result;
        Ok(())
    }

    pub fn unary(&self, op: UnaryOp) -> Result<Operand, Fault> {
        if let Operand::Proxy(proxy) = self {
            proxy.touch(op.name());
        }
        self.unwrap_value().unary(op).map(Operand::Value)
    }

    pub fn compare(&self, op: CompareOp, rhs: &Operand) -> Result<bool, Fault> {
        match op {
            CompareOp::Is | CompareOp::IsNot => {}
            CompareOp::In | CompareOp::NotIn => {
                if let Operand::Proxy(container) = rhs {
                    container.record_arg("__contains__", self);
                }
            }
            _ => match (self, rhs) {
                (Operand::Proxy(proxy), _) => {
                    if let Some(name) = op.name() {
                        proxy.record_arg(name, rhs);
                    }
                }
                (_, Operand::Proxy(proxy)) => {
                    if let Some(name) = op.reflected().name() {
                        proxy.record_arg(name, self);
                    }
                }
                _ => {}
            },
        }
        self.unwrap_value().compare(op, rhs.unwrap_value())
    }

    /// `item in self`
    pub fn contains(&self, item: &Operand) -> Result<bool, Fault> {
        item.compare(CompareOp::In, self)
    }

    pub fn len(&self) -> Result<usize, Fault> {
        if let Operand::Proxy(proxy) = self {
            proxy.touch("__len__");
        }
        self.unwrap_value().len()
    }

    pub fn is_truthy(&self) -> bool {
        if let Operand::Proxy(proxy) = self {
            proxy.touch("__bool__");
        }
        self.unwrap_value().is_truthy()
    }

    pub fn getattr(&self, name: &str) -> Result<Operand, Fault> {
        match self {
            Operand::Proxy(proxy) => {
                proxy.touch(name);
                let value = self.unwrap_value().getattr(name)?;
                Ok(proxy.child_operand(name, value))
            }
            Operand::Value(value) => value.getattr(name).map(Operand::Value),
        }
    }

    pub fn setattr(&mut self, name: &str, value: Operand) -> Result<(), Fault> {
        if let Operand::Proxy(proxy) = &*self {
            proxy.touch(name);
        }
        self.value_mut().setattr(name, value.into_value())
    }

    pub fn getitem(&self, key: &Operand) -> Result<Operand, Fault> {
        match self {
            Operand::Proxy(proxy) => {
                proxy.record_arg("__getitem__", key);
                let value = self.unwrap_value().getitem(key.unwrap_value())?;
                Ok(proxy.child_operand("__getitem__", value))
            }
            Operand::Value(value) => value.getitem(key.unwrap_value()).map(Operand::Value),
        }
    }

    pub fn setitem(&mut self, key: &Operand, value: Operand) -> Result<(), Fault> {
        if let Operand::Proxy(proxy) = &*self {
            proxy.record_args("__setitem__", &[key.clone(), value.clone()]);
        }
        self.value_mut().setitem(key.unwrap_value(), value.into_value())
    }

    /// Elements of the value; a proxy yields child proxies
    pub fn iterate(&self) -> Result<Vec<Operand>, Fault> {
        let elements = self.unwrap_value().iterate()?;
        match self {
            Operand::Proxy(proxy) => {
                proxy.touch("__iter__");
                Ok(elements
                    .into_iter()
                    .map(|element| proxy.child_operand("__iter__", element))
                    .collect())
            }
            Operand::Value(_) => Ok(elements.into_iter().map(Operand::Value).collect()),
        }
    }

    /// Invoke a method; a proxy records the method name and, below it, the
    /// argument types of the `__call__`
    pub fn call_method(&mut self, name: &str, args: &[Operand]) -> Result<Operand, Fault> {
        if let Operand::Proxy(proxy) = &*self {
            proxy.with_node(|node| {
                let call = node.child(name).child("__call__");
                for (position, arg) in args.iter().enumerate() {
                    if !arg.is_proxy() {
                        call.add_arg_type(position, arg.type_tag());
                    }
                }
            });
        }
        let plain: Vec<Value> = args.iter().map(|arg| arg.unwrap_value().clone()).collect();
        self.value_mut().call_method(name, &plain).map(Operand::Value)
    }

    /// Builtin conversion such as `int(x)` or `bytes(x)`
    pub fn convert(&self, target: &TypeTag) -> Result<Operand, Fault> {
        if let Operand::Proxy(proxy) = self {
            let name = match target {
                TypeTag::Bool => "__bool__",
                TypeTag::Int => "__int__",
                TypeTag::Float => "__float__",
                TypeTag::Str => "__str__",
                TypeTag::Bytes => "__bytes__",
                _ => "__iter__",
            };
            proxy.touch(name);
        }
        self.unwrap_value().convert(target).map(Operand::Value)
    }

    pub fn hash_value(&self) -> Result<u64, Fault> {
        self.unwrap_value().hash_value()
    }

    pub fn is_identical(&self, other: &Operand) -> bool {
        self.unwrap_value().is_identical(other.unwrap_value())
    }

    /// `isinstance(self, spec)`.
    ///
    /// A type spec that is not a type raises a `TypeError` and records nothing.
    /// Checks naming the proxy wrapper type are never recorded, and a proxy is
    /// always an instance of it. Other checks on a proxy are recorded only
    /// while the shim is active.
    pub fn isinstance(&self, spec: &TypeSpec) -> Result<bool, Fault> {
        if let Some(offender) = spec.invalid_member() {
            return Err(Fault::TypeError(format!(
                "isinstance() arg 2 must be a type or tuple of types, not {}",
                offender
            )));
        }
        let types = spec.types();
        if let Operand::Proxy(proxy) = self {
            if spec.mentions_proxy_wrapper() {
                return Ok(true);
            }
            if is_shim_active() {
                proxy.with_node(|node| {
                    for tag in &types {
                        node.add_type_check(tag.clone());
                    }
                });
            }
        }
        let value = self.unwrap_value();
        Ok(types.iter().any(|tag| value.is_instance_of(tag)))
    }
}

/// The plain value underneath any number of proxies
pub fn unwrap(operand: &Operand) -> &Value {
    operand.unwrap_value()
}
