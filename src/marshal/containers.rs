use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

use super::{FromLua, IntoLua};
use crate::error::Result;
use crate::stack::{Kind, Stack};

/// Sequences become 1-indexed tables
impl<T: IntoLua> IntoLua for Vec<T> {
    fn push_lua(self, stack: &Stack) {
        stack.reserve(3);
        stack.push_table(self.len(), 0);
        for (i, item) in self.into_iter().enumerate() {
            item.push_lua(stack);
            stack.raw_set_index(-2, i as i64 + 1);
        }
    }
}

/// Reads keys `1..=#t`; any element failing fails the whole sequence
impl<T: FromLua> FromLua for Vec<T> {
    fn from_lua(stack: &Stack, index: i32) -> Result<Self> {
        let index = stack.abs_index(index);
        stack.expect(index, Kind::Table)?;

        let len = stack.raw_len(index);
        let mut items = Vec::with_capacity(len);
        let _guard = stack.guard();
        stack.reserve(2);
        for n in 1..=len {
            stack.raw_get_index(index, n as i64);
            items.push(T::from_lua(stack, -1)?);
            stack.pop(1);
        }
        Ok(items)
    }
}

fn push_pairs<K: IntoLua, V: IntoLua>(
    stack: &Stack,
    len: usize,
    pairs: impl Iterator<Item = (K, V)>,
) {
    stack.reserve(4);
    stack.push_table(0, len);
    for (key, value) in pairs {
        key.push_lua(stack);
        value.push_lua(stack);
        stack.raw_set(-3);
    }
}

/// Full `next` traversal; a key or value failing fails the whole map
fn read_pairs<K: FromLua, V: FromLua>(
    stack: &Stack,
    index: i32,
    mut insert: impl FnMut(K, V),
) -> Result<()> {
    let index = stack.abs_index(index);
    stack.expect(index, Kind::Table)?;

    let _guard = stack.guard();
    stack.reserve(3);
    stack.push_nil();
    while stack.next(index) {
        let key = K::from_lua(stack, -2)?;
        let value = V::from_lua(stack, -1)?;
        stack.pop(1);
        insert(key, value);
    }
    Ok(())
}

impl<K, V, S> IntoLua for HashMap<K, V, S>
where
    K: IntoLua,
    V: IntoLua,
{
    fn push_lua(self, stack: &Stack) {
        let len = self.len();
        push_pairs(stack, len, self.into_iter());
    }
}

impl<K, V, S> FromLua for HashMap<K, V, S>
where
    K: FromLua + Eq + Hash,
    V: FromLua,
    S: BuildHasher + Default,
{
    fn from_lua(stack: &Stack, index: i32) -> Result<Self> {
        let mut map = HashMap::with_hasher(S::default());
        read_pairs(stack, index, |key, value| {
            map.insert(key, value);
        })?;
        Ok(map)
    }
}

impl<K: IntoLua, V: IntoLua> IntoLua for BTreeMap<K, V> {
    fn push_lua(self, stack: &Stack) {
        let len = self.len();
        push_pairs(stack, len, self.into_iter());
    }
}

impl<K: FromLua + Ord, V: FromLua> FromLua for BTreeMap<K, V> {
    fn from_lua(stack: &Stack, index: i32) -> Result<Self> {
        let mut map = BTreeMap::new();
        read_pairs(stack, index, |key, value| {
            map.insert(key, value);
        })?;
        Ok(map)
    }
}
