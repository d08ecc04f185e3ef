//! # Type Tracing Test Suite
//!
//! Behaviour of the recording proxy as seen from target code: nesting bounds,
//! the scoped type-check shim, operator and method recording, and merging of
//! knowledge trees collected from different calls.

use covolve::typetracing::{
    is_shim_active, shim_isinstance, unwrap, ObjectProxy, Operand, ProxyKnowledge, TypeSpec, MAX_PROXY_NESTING,
};
use covolve::value::{BinOp, CompareOp, Fault, ObjectValue, TypeTag, UnaryOp, Value};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn proxy(value: Value) -> Operand {
    Operand::from(ObjectProxy::new(value))
}

fn knowledge(operand: &Operand) -> ProxyKnowledge {
    match operand.as_proxy() {
        Some(proxy) => proxy.knowledge(),
        None => panic!("operand is not a proxy"),
    }
}

fn nested_list(levels: usize) -> Value {
    let mut value = Value::Int(1);
    for _ in 0..levels {
        value = Value::List(vec![value]);
    }
    value
}

fn self_similar_object(levels: usize) -> Value {
    let mut value = Value::Object(ObjectValue::new("Node"));
    for _ in 0..levels {
        value = Value::Object(ObjectValue::new("Node").with_field("foo", value));
    }
    value
}

fn tags(items: &[TypeTag]) -> BTreeSet<TypeTag> {
    items.iter().cloned().collect()
}

#[test]
fn test_item_access_nesting_bound() {
    let mut current = proxy(nested_list(MAX_PROXY_NESTING + 2));
    for _ in 0..MAX_PROXY_NESTING {
        current = current.getitem(&Value::Int(0).into()).unwrap();
    }
    assert!(current.is_proxy());
    let after = current.getitem(&Value::Int(0).into()).unwrap();
    assert!(!after.is_proxy());
}

#[test]
fn test_attribute_access_nesting_bound() {
    let mut current = proxy(self_similar_object(MAX_PROXY_NESTING + 2));
    for _ in 0..MAX_PROXY_NESTING {
        current = current.getattr("foo").unwrap();
    }
    assert!(current.is_proxy());
    assert!(!current.getattr("foo").unwrap().is_proxy());
}

#[test]
fn test_iteration_nesting_bound() {
    let mut current = proxy(nested_list(MAX_PROXY_NESTING + 2));
    for _ in 0..MAX_PROXY_NESTING {
        current = current.iterate().unwrap().remove(0);
    }
    assert!(current.is_proxy());
    assert!(!current.iterate().unwrap().remove(0).is_proxy());
}

#[test]
fn test_shim_scope() {
    assert!(!is_shim_active());
    {
        let _shim = shim_isinstance();
        assert!(is_shim_active());
    }
    assert!(!is_shim_active());
}

#[test]
fn test_non_existing_attribute_is_still_recorded() {
    let operand = proxy(Value::Int(42));
    let err = operand.getattr("foo").unwrap_err();
    assert!(matches!(err, Fault::AttributeError(_)));
    assert!(knowledge(&operand).attr_table.contains_key("foo"));
}

#[test]
fn test_method_call_records_call_node() {
    let mut operand = proxy(Value::from("foo"));
    let result = operand.call_method("startswith", &[Value::from("fo").into()]).unwrap();
    assert_eq!(unwrap(&result), &Value::Bool(true));
    let recorded = knowledge(&operand);
    let call = recorded.find_path(&["startswith", "__call__"]).unwrap();
    assert_eq!(call.arg_types_at(0), tags(&[TypeTag::Str]));
}

#[test]
fn test_loop_over_list_records_element_type_checks() {
    let operand = proxy(Value::List(vec![Value::from("foo"), Value::from("bar")]));
    {
        let _shim = shim_isinstance();
        for element in operand.iterate().unwrap() {
            assert!(element.isinstance(&TypeSpec::Type(TypeTag::Str)).unwrap());
        }
    }
    assert!(knowledge(&operand).attr_table["__iter__"].type_checks.contains(&TypeTag::Str));
}

#[test]
fn test_equality_with_dict_records_dict() {
    let dict = Value::dict_from(vec![(Value::from("foo"), Value::Int(42))]).unwrap();
    let operand = proxy(dict.clone());
    assert!(operand.compare(CompareOp::Eq, &dict.into()).unwrap());
    assert!(knowledge(&operand).attr_table["__eq__"].arg_types_at(0).contains(&TypeTag::Dict));
}

#[test]
fn test_wrapper_type_checks_are_not_recorded() {
    let operand = proxy(Value::Int(42));
    {
        let _shim = shim_isinstance();
        assert!(operand.isinstance(&TypeSpec::ProxyWrapper).unwrap());
        let union = TypeSpec::Union(vec![TypeSpec::ProxyWrapper, TypeSpec::Type(TypeTag::Bytes)]);
        assert!(operand.isinstance(&union).unwrap());
    }
    assert!(knowledge(&operand).type_checks.is_empty());
}

#[test]
fn test_check_against_non_type_raises_and_keeps_shim() {
    let operand = proxy(Value::Int(42));
    {
        let _shim = shim_isinstance();
        let bad = TypeSpec::NotAType("ObjectProxy(int)".into());
        assert!(matches!(operand.isinstance(&bad), Err(Fault::TypeError(_))));
        let bad_union = TypeSpec::Union(vec![bad, TypeSpec::Type(TypeTag::Float)]);
        assert!(matches!(operand.isinstance(&bad_union), Err(Fault::TypeError(_))));
        assert!(is_shim_active());
        assert!(operand.isinstance(&TypeSpec::Type(TypeTag::Int)).unwrap());
    }
    assert!(!is_shim_active());
    assert_eq!(knowledge(&operand).type_checks, tags(&[TypeTag::Int]));
}

#[test]
fn test_type_checks_need_the_shim() {
    let operand = proxy(Value::Int(42));
    assert!(operand.isinstance(&TypeSpec::Type(TypeTag::Int)).unwrap());
    assert!(knowledge(&operand).type_checks.is_empty());
    {
        let _shim = shim_isinstance();
        let union = TypeSpec::union([TypeTag::Int, TypeTag::Float]);
        assert!(operand.isinstance(&union).unwrap());
    }
    assert_eq!(knowledge(&operand).type_checks, tags(&[TypeTag::Int, TypeTag::Float]));
}

#[test]
fn test_setattr_is_recorded() {
    let mut operand = proxy(Value::Object(ObjectValue::new("Foo").with_field("foo", Value::Int(42))));
    operand.setattr("foo", Value::Int(42).into()).unwrap();
    assert!(knowledge(&operand).attr_table.contains_key("foo"));
}

#[test]
fn test_merge_of_two_proxies() {
    let mut first = proxy(Value::Int(42));
    let second = proxy(Value::from("42"));

    let sum = Operand::from(Value::Int(1)).binary(BinOp::Add, &first).unwrap();
    assert_eq!(unwrap(&sum), &Value::Int(43));
    first.inplace(BinOp::Add, &Value::Int(3).into()).unwrap();
    assert_eq!(unwrap(&first), &Value::Int(45));
    let concatenated = second.binary(BinOp::Add, &Value::from("3").into()).unwrap();
    assert_eq!(unwrap(&concatenated), &Value::from("423"));
    {
        let _shim = shim_isinstance();
        assert!(first.isinstance(&TypeSpec::Type(TypeTag::Int)).unwrap());
        assert!(second.isinstance(&TypeSpec::Type(TypeTag::Str)).unwrap());
    }

    let mut merged = knowledge(&first);
    merged.merge(&knowledge(&second));
    assert!(merged.attr_table["__radd__"].arg_types_at(0).contains(&TypeTag::Int));
    assert!(merged.attr_table["__iadd__"].arg_types_at(0).contains(&TypeTag::Int));
    assert!(merged.attr_table["__add__"].arg_types_at(0).contains(&TypeTag::Str));
    assert_eq!(merged.type_checks, tags(&[TypeTag::Int, TypeTag::Str]));
}

#[test]
fn test_comparison_operators() {
    let cases = [
        (CompareOp::Eq, "__eq__"),
        (CompareOp::Ne, "__ne__"),
        (CompareOp::Le, "__le__"),
        (CompareOp::Lt, "__lt__"),
        (CompareOp::Ge, "__ge__"),
        (CompareOp::Gt, "__gt__"),
    ];
    for (op, name) in cases {
        let operand = proxy(Value::Int(42));
        let expected = Value::Int(42).compare(op, &Value::Int(42)).unwrap();
        assert_eq!(operand.compare(op, &Value::Int(42).into()).unwrap(), expected);
        assert!(knowledge(&operand).attr_table[name].arg_types_at(0).contains(&TypeTag::Int), "{}", name);
    }
}

#[test]
fn test_reflected_comparison() {
    let operand = proxy(Value::Int(3));
    assert!(Operand::from(Value::Int(1)).compare(CompareOp::Lt, &operand).unwrap());
    assert!(knowledge(&operand).attr_table["__gt__"].arg_types_at(0).contains(&TypeTag::Int));
}

#[test]
fn test_contains() {
    let operand = proxy(Value::List(vec![Value::Int(42)]));
    assert!(operand.contains(&Value::Int(42).into()).unwrap());
    assert!(knowledge(&operand).attr_table["__contains__"].arg_types_at(0).contains(&TypeTag::Int));
}

#[test]
fn test_contains_proxy_records_no_type() {
    let container = proxy(Value::List(vec![Value::Int(42)]));
    let item = proxy(Value::Int(42));
    assert!(container.contains(&item).unwrap());
    assert!(knowledge(&container).attr_table["__contains__"].arg_types_at(0).is_empty());
}

#[test]
fn test_len_and_truthiness() {
    let operand = proxy(Value::List(vec![Value::from("entry")]));
    assert_eq!(operand.len().unwrap(), 1);
    assert!(operand.is_truthy());
    let recorded = knowledge(&operand);
    assert!(recorded.attr_table.contains_key("__len__"));
    assert!(recorded.attr_table.contains_key("__bool__"));
}

#[test]
fn test_conversions_use_dunder_names() {
    let operand = proxy(Value::Int(4));
    assert_eq!(unwrap(&operand.convert(&TypeTag::Bytes).unwrap()), &Value::Bytes(vec![0; 4]));
    assert_eq!(unwrap(&operand.convert(&TypeTag::Float).unwrap()), &Value::Float(4.0));
    let recorded = knowledge(&operand);
    assert!(recorded.attr_table.contains_key("__bytes__"));
    assert!(recorded.attr_table.contains_key("__float__"));
}

#[test]
fn test_unary_operators() {
    let operand = proxy(Value::Int(4));
    assert_eq!(unwrap(&operand.unary(UnaryOp::Neg).unwrap()), &Value::Int(-4));
    assert!(knowledge(&operand).attr_table.contains_key("__neg__"));
}

#[test]
fn test_operator_results_are_plain_values() {
    let operand = proxy(Value::Object(ObjectValue::new("Box").with_field("size", Value::Int(2))));
    assert!(operand.getattr("size").unwrap().as_proxy().is_some());

    let number = proxy(Value::Int(3));
    let sum = number.binary(BinOp::Add, &Value::Int(1).into()).unwrap();
    assert!(sum.as_proxy().is_none());
    assert_eq!(unwrap(&sum), &Value::Int(4));
    assert!(number.unary(UnaryOp::Neg).unwrap().as_proxy().is_none());
}

#[test]
fn test_hash_is_forwarded_and_unrecorded() {
    let operand = proxy(Value::from("entry"));
    assert_eq!(operand.hash_value().unwrap(), Value::from("entry").hash_value().unwrap());
    assert!(knowledge(&operand).is_empty());
}

#[test]
fn test_unwrap_is_transitive() {
    let inner = ObjectProxy::new(Value::Int(7));
    let outer = Operand::from(ObjectProxy::new(Operand::from(inner)));
    assert_eq!(unwrap(&outer), &Value::Int(7));
}

#[test]
fn test_pretty_output() {
    let mut root = ProxyKnowledge::root();
    root.add_type_check(TypeTag::Str);
    root.child("foo").add_arg_type(0, TypeTag::Int);
    assert_eq!(
        root.pretty(),
        "['ROOT' (type-checks: {str})]\n└──['foo' (arg-types: {0: {int}})]"
    );
}

#[test]
fn test_find_path() {
    let mut operand = proxy(Value::List(vec![Value::Int(1)]));
    operand.call_method("count", &[Value::Int(1).into()]).unwrap();
    let recorded = knowledge(&operand);
    assert!(recorded.find_path(&["count", "__call__"]).is_some());
    assert!(recorded.find_path(&["count", "missing"]).is_none());
}

#[test]
fn test_binary_operators_record_their_names() {
    let cases = [
        (BinOp::Add, Value::Int(1)),
        (BinOp::Sub, Value::Int(1)),
        (BinOp::Mul, Value::Int(2)),
        (BinOp::TrueDiv, Value::Int(2)),
        (BinOp::FloorDiv, Value::Int(2)),
        (BinOp::Mod, Value::Int(3)),
        (BinOp::Pow, Value::Int(2)),
        (BinOp::LShift, Value::Int(3)),
        (BinOp::RShift, Value::Int(3)),
        (BinOp::BitAnd, Value::Int(1)),
        (BinOp::BitOr, Value::Int(1)),
        (BinOp::BitXor, Value::Int(1)),
    ];
    for (op, rhs) in cases {
        let forward = proxy(Value::Int(7));
        let expected = Value::Int(7).binary(op, &rhs).unwrap();
        assert_eq!(unwrap(&forward.binary(op, &rhs.clone().into()).unwrap()), &expected);
        assert!(knowledge(&forward).attr_table[&op.name()].arg_types_at(0).contains(&TypeTag::Int));

        let reflected = proxy(Value::Int(7));
        let expected = rhs.binary(op, &Value::Int(7)).unwrap();
        assert_eq!(unwrap(&Operand::from(rhs).binary(op, &reflected).unwrap()), &expected);
        assert!(knowledge(&reflected).attr_table[&op.reflected_name()]
            .arg_types_at(0)
            .contains(&TypeTag::Int));
    }
}

fn arbitrary_knowledge() -> impl Strategy<Value = ProxyKnowledge> {
    let names = prop::sample::select(vec!["__add__", "__len__", "foo", "startswith"]);
    let types = prop::sample::select(vec![TypeTag::Int, TypeTag::Str, TypeTag::Float, TypeTag::List]);
    prop::collection::vec((names, 0usize..2, types.clone(), types), 0..6).prop_map(|entries| {
        let mut root = ProxyKnowledge::root();
        for (name, position, arg_type, check) in entries {
            root.add_type_check(check);
            root.child(name).add_arg_type(position, arg_type);
        }
        root
    })
}

proptest! {
    #[test]
    fn merge_is_commutative(left in arbitrary_knowledge(), right in arbitrary_knowledge()) {
        prop_assert_eq!(ProxyKnowledge::merged(&left, &right), ProxyKnowledge::merged(&right, &left));
    }

    #[test]
    fn merge_is_associative(
        a in arbitrary_knowledge(),
        b in arbitrary_knowledge(),
        c in arbitrary_knowledge(),
    ) {
        let left = ProxyKnowledge::merged(&ProxyKnowledge::merged(&a, &b), &c);
        let right = ProxyKnowledge::merged(&a, &ProxyKnowledge::merged(&b, &c));
        prop_assert_eq!(left, right);
    }
}
