//! Pool of constants harvested from executions

use crate::value::{TypeTag, Value};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// Primitive constants grouped by type, deduplicated, at most `max_per_type`
/// per type. When a bucket is full the oldest constant is evicted.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    buckets: BTreeMap<TypeTag, Vec<Value>>,
    max_per_type: usize,
}

fn same_constant(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
        _ => left == right,
    }
}

impl ConstantPool {
    pub fn new(max_per_type: usize) -> Self {
        Self {
            buckets: BTreeMap::new(),
            max_per_type,
        }
    }

    /// Add a constant; returns whether the pool changed
    pub fn add(&mut self, value: Value) -> bool {
        let tag = value.type_tag();
        if !tag.is_primitive() || tag == TypeTag::NoneType || self.max_per_type == 0 {
            return false;
        }
        let bucket = self.buckets.entry(tag).or_default();
        if bucket.iter().any(|existing| same_constant(existing, &value)) {
            return false;
        }
        if bucket.len() >= self.max_per_type {
            bucket.remove(0);
        }
        bucket.push(value);
        true
    }

    pub fn extend(&mut self, values: impl IntoIterator<Item = Value>) -> usize {
        values.into_iter().filter(|value| self.add(value.clone())).count()
    }

    pub fn values_for(&self, tag: &TypeTag) -> &[Value] {
        self.buckets.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn random_for(&self, tag: &TypeTag, rng: &mut ChaCha8Rng) -> Option<Value> {
        self.values_for(tag).choose(rng).cloned()
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_pool_deduplicates_and_ignores_non_primitives() {
        let mut pool = ConstantPool::new(10);
        assert!(pool.add(Value::Int(7)));
        assert!(!pool.add(Value::Int(7)));
        assert!(!pool.add(Value::None));
        assert!(!pool.add(Value::List(vec![])));
        assert!(pool.add(Value::Float(7.0)));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_pool_evicts_oldest_when_full() {
        let mut pool = ConstantPool::new(2);
        pool.extend(vec![Value::from("a"), Value::from("b"), Value::from("c")]);
        assert_eq!(pool.values_for(&TypeTag::Str), &[Value::from("b"), Value::from("c")]);
    }

    #[test]
    fn test_random_for_draws_matching_type() {
        let mut pool = ConstantPool::new(5);
        pool.add(Value::from("magic"));
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(pool.random_for(&TypeTag::Str, &mut rng), Some(Value::from("magic")));
        assert_eq!(pool.random_for(&TypeTag::Int, &mut rng), None);
    }
}
