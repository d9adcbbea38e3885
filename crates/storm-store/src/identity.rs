//! Weak identity map keyed by (class, primary-key tuple).
//!
//! The map guarantees at most one live in-memory representation per row
//! while holding only weak references: once the application drops its last
//! handle the entry goes stale and is pruned on the next probe or sweep.
//! Key tuples are value snapshots, so later mutation of the live variables
//! does not perturb the key.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use storm_core::{ClassId, ObjRef, ObjectInfo, Value, VarValue, Variable};

/// Hash one raw value with a variant tag so differently-typed keys with the
/// same bit pattern stay distinct.
fn hash_value(value: &Value, hasher: &mut impl Hasher) {
    match value {
        Value::Null => 0_u8.hash(hasher),
        Value::Bool(b) => {
            1_u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Int(i) => {
            2_u8.hash(hasher);
            i.hash(hasher);
        }
        Value::Float(f) => {
            3_u8.hash(hasher);
            f.to_bits().hash(hasher);
        }
        Value::Text(s) => {
            4_u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Bytes(b) => {
            5_u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Json(j) => {
            6_u8.hash(hasher);
            j.to_string().hash(hasher);
        }
    }
}

/// A snapshot of primary key variable values, usable as a hash key.
#[derive(Debug, Clone, PartialEq)]
pub struct PkTuple(Vec<VarValue>);

// NaN primary keys are unsupported; with that ruled out, VarValue equality
// is reflexive.
impl Eq for PkTuple {}

impl Hash for PkTuple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for value in &self.0 {
            match value {
                VarValue::Unset => 0_u8.hash(state),
                VarValue::Null => 1_u8.hash(state),
                VarValue::Val(v) => {
                    2_u8.hash(state);
                    hash_value(v, state);
                }
            }
        }
    }
}

impl PkTuple {
    /// Snapshot the values of `variables` in order.
    pub fn from_variables(variables: &[Variable]) -> Self {
        Self(variables.iter().map(Variable::get).collect())
    }

    pub fn values(&self) -> &[VarValue] {
        &self.0
    }
}

/// Full identity-map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    cls: ClassId,
    pk: PkTuple,
}

impl CacheKey {
    pub fn new(cls: ClassId, pk: PkTuple) -> Self {
        Self { cls, pk }
    }
}

/// The weak identity map.
#[derive(Default)]
pub struct IdentityMap {
    entries: HashMap<CacheKey, Weak<ObjectInfo>>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `info` under `key`, replacing any previous entry.
    pub fn insert(&mut self, key: CacheKey, info: &ObjRef) {
        self.entries.insert(key, Rc::downgrade(info));
    }

    /// Probe for a live entry; stale entries are evicted on the way.
    pub fn get(&mut self, key: &CacheKey) -> Option<ObjRef> {
        match self.entries.get(key) {
            Some(weak) => match weak.upgrade() {
                Some(info) => Some(info),
                None => {
                    self.entries.remove(key);
                    None
                }
            },
            None => None,
        }
    }

    /// Remove an entry. Returns whether it was present (live or stale).
    pub fn remove(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop stale entries and return the live objects.
    pub fn iter_live(&mut self) -> Vec<ObjRef> {
        self.entries.retain(|_, weak| weak.strong_count() > 0);
        self.entries.values().filter_map(Weak::upgrade).collect()
    }

    /// Number of entries, including potentially stale ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
fn tuple_hash(tuple: &PkTuple) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    tuple.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_core::{ClassInfo, SqlType};

    fn person() -> storm_core::ClassRef {
        ClassInfo::build(
            "Person",
            "person",
            &[("id", SqlType::Int), ("name", SqlType::Text)],
            &["id"],
        )
        .unwrap()
    }

    fn int_tuple(i: i64) -> PkTuple {
        PkTuple(vec![VarValue::Val(Value::Int(i))])
    }

    #[test]
    fn test_equal_tuples_hash_alike() {
        assert_eq!(int_tuple(42), int_tuple(42));
        assert_eq!(tuple_hash(&int_tuple(42)), tuple_hash(&int_tuple(42)));
        assert_ne!(tuple_hash(&int_tuple(42)), tuple_hash(&int_tuple(43)));
    }

    #[test]
    fn test_typed_hash_distinguishes_variants() {
        let int = PkTuple(vec![VarValue::Val(Value::Int(0))]);
        let null = PkTuple(vec![VarValue::Null]);
        assert_ne!(int, null);
        assert_ne!(tuple_hash(&int), tuple_hash(&null));
    }

    #[test]
    fn test_map_holds_weakly() {
        let cls = person();
        let mut map = IdentityMap::new();
        let key = CacheKey::new(cls.id(), int_tuple(1));
        {
            let obj = storm_core::ObjectInfo::new(&cls);
            map.insert(key.clone(), &obj);
            assert!(map.get(&key).is_some());
        }
        // Strong handle dropped: the entry is stale and pruned on probe.
        assert!(map.get(&key).is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn test_iter_live_prunes_stale() {
        let cls = person();
        let mut map = IdentityMap::new();
        let kept = storm_core::ObjectInfo::new(&cls);
        map.insert(CacheKey::new(cls.id(), int_tuple(1)), &kept);
        {
            let dropped = storm_core::ObjectInfo::new(&cls);
            map.insert(CacheKey::new(cls.id(), int_tuple(2)), &dropped);
        }
        let live = map.iter_live();
        assert_eq!(live.len(), 1);
        assert!(Rc::ptr_eq(&live[0], &kept));
        assert_eq!(map.len(), 1);
    }
}
