//! Random construction and modification of test cases
//!
//! The factory builds statements bottom-up: to call a callable it first makes
//! sure a variable exists for every parameter, reusing earlier variables of a
//! compatible type or creating new ones, recursively up to the configured
//! depth. Untyped parameters take a type suggested by the type inference model
//! or, failing that, any type the module knows about.

use super::constants::ConstantPool;
use super::statement::{CollectionKind, Statement, VariableReference};
use super::test_case::TestCase;
use crate::config::Configuration;
use crate::ga::inference::TypeInference;
use crate::subject::{CallableKind, GenericCallable, SubjectModule};
use crate::value::{TypeTag, Value, PRIMITIVE_TYPES};
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Attempts made to reach the requested length of a random test case
const MAX_INSERTION_ATTEMPTS: usize = 100;

pub struct TestFactory<'a> {
    module: &'a SubjectModule,
    config: &'a Configuration,
    inference: &'a TypeInference,
    constants: &'a ConstantPool,
}

impl<'a> TestFactory<'a> {
    pub fn new(
        module: &'a SubjectModule,
        config: &'a Configuration,
        inference: &'a TypeInference,
        constants: &'a ConstantPool,
    ) -> Self {
        Self {
            module,
            config,
            inference,
            constants,
        }
    }

    /// A test case of random length up to the configured chromosome length
    pub fn random_test_case(&self, rng: &mut ChaCha8Rng) -> TestCase {
        let mut test = TestCase::new();
        let target = rng.gen_range(1..=self.config.search.chromosome_length);
        let mut attempts = 0;
        while test.len() < target && attempts < MAX_INSERTION_ATTEMPTS {
            self.insert_random_statement(&mut test, rng);
            attempts += 1;
        }
        if test.len() > self.config.search.chromosome_length {
            test.chop(self.config.search.chromosome_length - 1);
        }
        test
    }

    /// Insert a random call, either on an existing object or of any callable.
    /// Returns the position of the inserted call.
    pub fn insert_random_statement(&self, test: &mut TestCase, rng: &mut ChaCha8Rng) -> Option<usize> {
        let position = rng.gen_range(0..=test.len());
        if rng.gen_bool(0.5) {
            if let Some(inserted) = self.insert_random_call_on_object(test, position, rng) {
                return Some(inserted);
            }
        }
        let callable = self.module.callables().choose(rng)?;
        self.append_callable(test, callable.id, position, rng).map(|reference| reference.0)
    }

    fn insert_random_call_on_object(&self, test: &mut TestCase, position: usize, rng: &mut ChaCha8Rng) -> Option<usize> {
        let objects: Vec<(VariableReference, String)> = (0..position)
            .filter_map(|index| match test.return_type(VariableReference(index)) {
                Some(TypeTag::Class(class)) => Some((VariableReference(index), class)),
                _ => None,
            })
            .collect();
        let (callee, class) = objects.choose(rng)?.clone();
        let method = self.module.modifiers_for(&class).choose(rng).map(|m| m.id)?;
        let backup = test.clone();
        let mut cursor = position;
        match self.add_call(test, method, Some(callee), &mut cursor, 0, rng) {
            Some(reference) => Some(reference.0),
            None => {
                *test = backup;
                None
            }
        }
    }

    /// Insert a call of `callable_id` at `position`, preceded by whatever
    /// statements its arguments need. The test case is left untouched when the
    /// call cannot be built.
    pub fn append_callable(
        &self,
        test: &mut TestCase,
        callable_id: usize,
        position: usize,
        rng: &mut ChaCha8Rng,
    ) -> Option<VariableReference> {
        let backup = test.clone();
        let mut cursor = position.min(test.len());
        let inserted = self.add_call(test, callable_id, None, &mut cursor, 0, rng);
        if inserted.is_none() {
            debug!("could not build a call of callable {}", callable_id);
            *test = backup;
        }
        inserted
    }

    fn add_call(
        &self,
        test: &mut TestCase,
        callable_id: usize,
        callee: Option<VariableReference>,
        cursor: &mut usize,
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> Option<VariableReference> {
        let callable = self.module.callable(callable_id)?;
        let callee = match (&callable.kind, callee) {
            (CallableKind::Method { .. }, Some(callee)) => Some(callee),
            (CallableKind::Method { class }, None) => {
                let class = TypeTag::Class(class.clone());
                Some(self.create_or_reuse(test, &class, cursor, depth + 1, rng)?)
            }
            _ => None,
        };
        let mut args = Vec::with_capacity(callable.params.len());
        for index in 0..callable.params.len() {
            let tag = self.parameter_type(callable, index, rng);
            args.push(self.create_or_reuse(test, &tag, cursor, depth + 1, rng)?);
        }

        let statement = match &callable.kind {
            CallableKind::Constructor { class } => Statement::Constructor {
                callable: callable.id,
                class: class.clone(),
                args,
            },
            CallableKind::Method { .. } => Statement::Method {
                callable: callable.id,
                callee: callee?,
                args,
                returns: callable.return_type.clone(),
            },
            CallableKind::Function => Statement::Function {
                callable: callable.id,
                args,
                returns: callable.return_type.clone(),
            },
        };
        Some(self.insert_at(test, cursor, statement))
    }

    fn insert_at(&self, test: &mut TestCase, cursor: &mut usize, statement: Statement) -> VariableReference {
        let reference = test.insert_statement(*cursor, statement);
        *cursor += 1;
        reference
    }

    /// Type to generate for parameter `index` of `callable`
    fn parameter_type(&self, callable: &GenericCallable, index: usize, rng: &mut ChaCha8Rng) -> TypeTag {
        if let Some(hint) = callable.params.get(index).and_then(|param| param.type_hint.clone()) {
            return hint;
        }
        if rng.gen_bool(self.config.type_inference.inferred_type_probability) {
            if let Some(tag) = self.inference.candidate_types(callable.id, index).choose(rng) {
                return tag.clone();
            }
        }
        self.module
            .known_types()
            .choose(rng)
            .cloned()
            .unwrap_or(TypeTag::NoneType)
    }

    fn create_or_reuse(
        &self,
        test: &mut TestCase,
        tag: &TypeTag,
        cursor: &mut usize,
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> Option<VariableReference> {
        let creation = &self.config.test_creation;
        let reuse_probability = if tag.is_primitive() {
            creation.primitive_reuse_probability
        } else {
            creation.object_reuse_probability
        };
        let candidates = test.variables_for_type(tag, *cursor);
        if !candidates.is_empty() && rng.gen_bool(reuse_probability) {
            return candidates.choose(rng).copied();
        }
        if depth > creation.max_recursion {
            return None;
        }
        if !tag.is_primitive() && rng.gen_bool(creation.none_probability) {
            return Some(self.insert_at(test, cursor, Statement::Primitive(Value::None)));
        }
        self.create_variable(test, tag, cursor, depth, rng)
    }

    fn create_variable(
        &self,
        test: &mut TestCase,
        tag: &TypeTag,
        cursor: &mut usize,
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> Option<VariableReference> {
        match tag {
            primitive if primitive.is_primitive() => {
                let value = self.random_primitive(primitive, rng);
                Some(self.insert_at(test, cursor, Statement::Primitive(value)))
            }
            TypeTag::List | TypeTag::Tuple | TypeTag::Set => {
                let kind = match tag {
                    TypeTag::List => CollectionKind::List,
                    TypeTag::Tuple => CollectionKind::Tuple,
                    _ => CollectionKind::Set,
                };
                let element_type = PRIMITIVE_TYPES.choose(rng).cloned().unwrap_or(TypeTag::Int);
                let size = rng.gen_range(0..=self.config.test_creation.collection_size);
                let mut elements = Vec::with_capacity(size);
                for _ in 0..size {
                    elements.push(self.create_or_reuse(test, &element_type, cursor, depth + 1, rng)?);
                }
                Some(self.insert_at(test, cursor, Statement::Collection { kind, elements }))
            }
            TypeTag::Dict => {
                let key_type = [TypeTag::Str, TypeTag::Int].choose(rng).cloned().unwrap_or(TypeTag::Str);
                let value_type = PRIMITIVE_TYPES.choose(rng).cloned().unwrap_or(TypeTag::Int);
                let size = rng.gen_range(0..=self.config.test_creation.collection_size);
                let mut entries = Vec::with_capacity(size);
                for _ in 0..size {
                    let key = self.create_or_reuse(test, &key_type, cursor, depth + 1, rng)?;
                    let value = self.create_or_reuse(test, &value_type, cursor, depth + 1, rng)?;
                    entries.push((key, value));
                }
                Some(self.insert_at(test, cursor, Statement::Dict { entries }))
            }
            _ => {
                let generator = self.module.generators_for(tag).choose(rng).map(|g| g.id)?;
                self.add_call(test, generator, None, cursor, depth, rng)
            }
        }
    }

    /// A fresh literal of a primitive type, possibly drawn from the constant pool
    pub fn random_primitive(&self, tag: &TypeTag, rng: &mut ChaCha8Rng) -> Value {
        let seeding = &self.config.seeding;
        if seeding.dynamic_constant_seeding && rng.gen_bool(seeding.seeded_primitives_reuse_probability) {
            if let Some(constant) = self.constants.random_for(tag, rng) {
                return constant;
            }
        }
        let creation = &self.config.test_creation;
        match tag {
            TypeTag::Bool => Value::Bool(rng.gen_bool(0.5)),
            TypeTag::Int => Value::Int(rng.gen_range(-creation.max_int..=creation.max_int)),
            TypeTag::Float => {
                let bound = creation.max_int as f64;
                Value::Float(rng.gen_range(-bound..=bound))
            }
            TypeTag::Str => {
                let length = rng.gen_range(0..=creation.string_length);
                Value::Str((0..length).map(|_| random_char(rng)).collect())
            }
            TypeTag::Bytes => {
                let length = rng.gen_range(0..=creation.bytes_length);
                Value::Bytes((0..length).map(|_| rng.gen()).collect())
            }
            _ => Value::None,
        }
    }

    /// A nearby literal of the same type
    pub fn mutate_primitive(&self, value: &Value, rng: &mut ChaCha8Rng) -> Value {
        let creation = &self.config.test_creation;
        if rng.gen_bool(creation.random_perturbation) {
            return self.random_primitive(&value.type_tag(), rng);
        }
        match value {
            Value::Bool(b) => Value::Bool(!b),
            Value::Int(i) => {
                let mut delta = rng.gen_range(-creation.max_delta..=creation.max_delta);
                if delta == 0 {
                    delta = 1;
                }
                Value::Int(i.saturating_add(delta))
            }
            Value::Float(x) => {
                let mut delta = rng.gen_range(-creation.max_delta..=creation.max_delta) as f64 * rng.gen::<f64>();
                if delta == 0.0 {
                    delta = 1.0;
                }
                Value::Float(x + delta)
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let mutated = mutate_sequence(chars, rng, random_char);
                Value::Str(mutated.into_iter().collect())
            }
            Value::Bytes(bytes) => Value::Bytes(mutate_sequence(bytes.clone(), rng, |rng| rng.gen())),
            other => other.clone(),
        }
    }

    /// Change one statement in place: a literal is mutated, a reference is
    /// redirected to another variable of a compatible type or, for a call
    /// argument, to a value drawn for the parameter's type. Returns whether the
    /// test case changed.
    pub fn change_statement(&self, test: &mut TestCase, position: usize, rng: &mut ChaCha8Rng) -> bool {
        let statement = match test.statement(position) {
            Some(statement) => statement.clone(),
            None => return false,
        };
        if let Statement::Primitive(value) = &statement {
            if matches!(value, Value::None) {
                return false;
            }
            let mutated = self.mutate_primitive(value, rng);
            let changed = mutated != *value;
            if let Some(slot) = test.statement_mut(position) {
                *slot = Statement::Primitive(mutated);
            }
            return changed;
        }

        let references = statement.references();
        if references.is_empty() {
            return false;
        }
        let slot = rng.gen_range(0..references.len());
        let current = references[slot];
        let expected = match test.return_type(current) {
            Some(tag) => tag,
            None => return false,
        };
        let alternatives: Vec<VariableReference> = test
            .variables_for_type(&expected, position)
            .into_iter()
            .filter(|candidate| *candidate != current)
            .collect();
        let draw_first = alternatives.is_empty() || rng.gen_bool(0.5);
        if draw_first && self.draw_argument(test, &statement, position, slot, rng) {
            return true;
        }
        let replacement = match alternatives.choose(rng) {
            Some(replacement) => *replacement,
            None => return false,
        };
        if let Some(target) = test.statement_mut(position) {
            if let Some(reference) = target.references_mut().into_iter().nth(slot) {
                *reference = replacement;
                return true;
            }
        }
        false
    }

    /// Rebind reference `slot` of the call at `position` to a variable of a
    /// type drawn for the matching parameter, inserting whatever statements the
    /// new value needs in front of the call. The test case is left untouched
    /// when nothing changes.
    fn draw_argument(
        &self,
        test: &mut TestCase,
        call: &Statement,
        position: usize,
        slot: usize,
        rng: &mut ChaCha8Rng,
    ) -> bool {
        let callable = match call.callable_id().and_then(|id| self.module.callable(id)) {
            Some(callable) => callable,
            None => return false,
        };
        // the receiver of a method call is not a parameter
        let index = match call {
            Statement::Method { .. } => match slot.checked_sub(1) {
                Some(index) => index,
                None => return false,
            },
            _ => slot,
        };
        if index >= callable.params.len() || test.len() >= self.config.search.chromosome_length {
            return false;
        }
        let current = call.references()[slot];
        let tag = self.parameter_type(callable, index, rng);
        let backup = test.clone();
        let mut cursor = position;
        if let Some(replacement) = self.create_or_reuse(test, &tag, &mut cursor, 1, rng) {
            if replacement != current {
                if let Some(reference) = test
                    .statement_mut(cursor)
                    .and_then(|target| target.references_mut().into_iter().nth(slot))
                {
                    *reference = replacement;
                    return true;
                }
            }
        }
        *test = backup;
        false
    }
}

fn random_char(rng: &mut ChaCha8Rng) -> char {
    char::from(rng.gen_range(32u8..127))
}

/// Delete, replace and insert elements, each with probability 1/3, making
/// sure at least one edit happens
fn mutate_sequence<T: Clone + PartialEq>(
    mut items: Vec<T>,
    rng: &mut ChaCha8Rng,
    fresh: impl Fn(&mut ChaCha8Rng) -> T,
) -> Vec<T> {
    let original = items.clone();
    for _ in 0..8 {
        if !items.is_empty() && rng.gen_bool(1.0 / 3.0) {
            let index = rng.gen_range(0..items.len());
            items.remove(index);
        }
        if !items.is_empty() && rng.gen_bool(1.0 / 3.0) {
            let index = rng.gen_range(0..items.len());
            items[index] = fresh(rng);
        }
        if rng.gen_bool(1.0 / 3.0) {
            let index = rng.gen_range(0..=items.len());
            items.insert(index, fresh(rng));
        }
        if items != original {
            break;
        }
    }
    if items == original {
        items.push(fresh(rng));
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ParameterUsage;
    use crate::subject::{ModuleBuilder, Parameter};
    use crate::typetracing::{Operand, ProxyKnowledge};
    use rand::SeedableRng;

    fn module() -> SubjectModule {
        let mut builder = ModuleBuilder::new("shapes");
        let init = builder.code_object("Square.__init__", None);
        let area = builder.code_object("Square.area", None);
        builder.constructor("Square", init, vec![Parameter::typed("side", TypeTag::Int)], |_, args| {
            let side = args[0].unwrap_value().clone();
            Ok(Operand::Value(Value::Object(
                crate::value::ObjectValue::new("Square").with_field("side", side),
            )))
        });
        builder.method("Square", "area", area, vec![], Some(TypeTag::Int), |_, args| {
            let side = args[0].getattr("side")?;
            side.binary(crate::value::BinOp::Mul, &side)
        });
        builder.build().unwrap()
    }

    #[test]
    fn test_random_test_cases_are_valid_and_bounded() {
        let module = module();
        let mut config = Configuration::default();
        config.search.chromosome_length = 6;
        let inference = TypeInference::new();
        let constants = ConstantPool::new(10);
        let factory = TestFactory::new(&module, &config, &inference, &constants);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..50 {
            let test = factory.random_test_case(&mut rng);
            assert!(test.is_valid());
            assert!(test.len() <= 6);
        }
    }

    #[test]
    fn test_method_call_gets_a_receiver() {
        let module = module();
        let mut config = Configuration::default();
        config.test_creation.none_probability = 0.0;
        let inference = TypeInference::new();
        let constants = ConstantPool::new(10);
        let factory = TestFactory::new(&module, &config, &inference, &constants);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut test = TestCase::new();
        let call = factory.append_callable(&mut test, 1, 0, &mut rng).unwrap();
        assert_eq!(call.0, test.len() - 1);
        match test.statement(call.0).unwrap() {
            Statement::Method { callee, .. } => {
                assert_eq!(test.return_type(*callee), Some(TypeTag::Class("Square".into())));
            }
            other => panic!("unexpected statement {:?}", other),
        }
        assert!(test.is_valid());
    }

    #[test]
    fn test_mutated_primitive_keeps_type() {
        let module = module();
        let config = Configuration::default();
        let inference = TypeInference::new();
        let constants = ConstantPool::new(10);
        let factory = TestFactory::new(&module, &config, &inference, &constants);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for value in [Value::Int(3), Value::from("abc"), Value::Bytes(vec![1, 2]), Value::Float(0.5)] {
            let mutated = factory.mutate_primitive(&value, &mut rng);
            assert_eq!(mutated.type_tag(), value.type_tag());
        }
        assert_eq!(factory.mutate_primitive(&Value::Bool(true), &mut rng).type_tag(), TypeTag::Bool);
    }

    #[test]
    fn test_seeded_constants_are_used() {
        let module = module();
        let mut config = Configuration::default();
        config.seeding.seeded_primitives_reuse_probability = 1.0;
        let inference = TypeInference::new();
        let mut constants = ConstantPool::new(10);
        constants.add(Value::from("needle"));
        let factory = TestFactory::new(&module, &config, &inference, &constants);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(factory.random_primitive(&TypeTag::Str, &mut rng), Value::from("needle"));
    }

    #[test]
    fn test_change_follows_inferred_parameter_type() {
        let mut builder = ModuleBuilder::new("greetings");
        let code = builder.code_object("greet", None);
        let greet = builder.function("greet", code, vec![Parameter::untyped("name")], None, |_, _| {
            Ok(Operand::Value(Value::None))
        });
        let module = builder.build().unwrap();
        let mut config = Configuration::default();
        config.type_inference.inferred_type_probability = 1.0;
        config.seeding.seeded_primitives_reuse_probability = 0.0;

        let mut knowledge = ProxyKnowledge::root();
        knowledge.child("startswith").child("__call__").add_arg_type(0, TypeTag::Str);
        let mut inference = TypeInference::new();
        inference.record(&ParameterUsage {
            callable_id: greet,
            parameter: 0,
            knowledge,
        });
        let constants = ConstantPool::new(10);
        let factory = TestFactory::new(&module, &config, &inference, &constants);

        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut test = TestCase::new();
            let number = test.add_statement(Statement::Primitive(Value::Int(3)));
            test.add_statement(Statement::Function {
                callable: greet,
                args: vec![number],
                returns: None,
            });

            assert!(factory.change_statement(&mut test, 1, &mut rng));
            assert_eq!(test.len(), 3);
            assert!(test.is_valid());
            let argument = test.statement(2).unwrap().references()[0];
            assert_eq!(test.return_type(argument), Some(TypeTag::Str));
        }
    }
}
