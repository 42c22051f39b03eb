extern crate alloc;

use alloc::boxed::Box;
use core::{borrow::Borrow, fmt, marker::PhantomPinned, mem, pin::Pin, ptr::NonNull};

use cordyceps::Linked;

use crate::{AvlTree, InsertAs, KeyError, Links, Search, TreeNode};

/// An ordered map based on an [AVL tree].
///
/// Inserting a key that is already present overwrites its value in place without rebalancing.
///
/// [AVL tree]: https://en.wikipedia.org/wiki/AVL_tree
pub struct AvlMap<K: Ord + fmt::Debug, V> {
    tree: AvlTree<MapNode<K, V>>,
}

struct MapNode<K, V> {
    links: Links<MapNode<K, V>>,
    key: K,
    value: V,
    _unpin: PhantomPinned,
}

unsafe impl<K, V> Linked<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Handle = Box<Self>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<MapNode<K, V>>> {
        let ptr = ptr.as_ptr();
        // SAFETY: `ptr` is non-null, so is the address of one of its fields.
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*ptr).links)) }
    }
}

impl<K: Ord + fmt::Debug, V> TreeNode<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Key = K;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

impl<K: Ord + fmt::Debug, V> AvlMap<K, V> {
    /// Creates a new, empty `AvlMap`.
    pub const fn new() -> Self {
        Self {
            tree: AvlTree::new(),
        }
    }

    /// Returns `true` if the map contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of elements in the map.
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns `true` if the map contains a value associated with `key`.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.contains_key(key)
    }

    /// Returns a reference to the value associated with `key`.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.get(key).map(|node| &Pin::get_ref(node).value)
    }

    /// Returns a reference to the value associated with `key`, or [`KeyError`] if there is none.
    #[inline]
    pub fn try_get<Q>(&self, key: &Q) -> Result<&V, KeyError>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).ok_or(KeyError)
    }

    /// Returns a mutable reference to the value associated with `key`.
    #[inline]
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree
            .get_mut(key)
            // SAFETY: Pinning is not structural for `node.value`.
            .map(|node| unsafe { &mut node.get_unchecked_mut().value })
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the map already contained `key`, its value is overwritten and the old value returned;
    /// the stored key and the shape of the tree are left untouched.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.entry(key) {
            Entry::Occupied(mut occupied) => Some(occupied.insert(value)),
            Entry::Vacant(vacant) => {
                vacant.insert(value);
                None
            }
        }
    }

    /// Returns the entry for `key`, for in-place insertion or update.
    ///
    /// The tree is searched once; inserting through a vacant entry links the new node at the
    /// position found by that search.
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V> {
        match self.tree.search(&key) {
            Search::Found(node) => Entry::Occupied(OccupiedEntry {
                tree: &mut self.tree,
                node,
            }),
            Search::Vacant(insert_as) => Entry::Vacant(VacantEntry {
                tree: &mut self.tree,
                key,
                insert_as,
            }),
        }
    }

    /// Returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.tree.first().map(|node| {
            let node = Pin::get_ref(node);
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        self.tree.pop_first().map(|node| {
            let MapNode { key, value, .. } = *node;
            (key, value)
        })
    }

    /// Returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.tree.last().map(|node| {
            let node = Pin::get_ref(node);
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        self.tree.pop_last().map(|node| {
            let MapNode { key, value, .. } = *node;
            (key, value)
        })
    }

    /// Removes the value associated with `key` from the map.
    ///
    /// Does nothing and returns `None` if the map does not contain `key`.
    #[inline]
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.remove(key).map(|node| node.value)
    }

    /// Returns an iterator over the key-value pairs of the map, in ascending key order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&K, &V)> + ExactSizeIterator + '_ {
        self.tree.iter().map(|node| (&node.key, &node.value))
    }

    /// Returns the height of the underlying tree.
    pub fn height(&self) -> usize {
        self.tree.height()
    }

    /// Clears the map, removing all elements.
    #[inline]
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        self.tree.assert_invariants();
    }
}

impl<K: Ord + fmt::Debug, V> Default for AvlMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + fmt::Debug, V: fmt::Debug> fmt::Debug for AvlMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Ord + fmt::Debug, V> FromIterator<(K, V)> for AvlMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = AvlMap::new();
        map.extend(iter);
        map
    }
}

impl<K: Ord + fmt::Debug, V> Extend<(K, V)> for AvlMap<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

/// A view into a single entry of an [`AvlMap`], which is either vacant or occupied.
pub enum Entry<'a, K: Ord + fmt::Debug, V> {
    Vacant(VacantEntry<'a, K, V>),
    Occupied(OccupiedEntry<'a, K, V>),
}

/// An entry for a key absent from the map.
pub struct VacantEntry<'a, K: Ord + fmt::Debug, V> {
    tree: &'a mut AvlTree<MapNode<K, V>>,
    key: K,
    insert_as: InsertAs<MapNode<K, V>>,
}

/// An entry for a key present in the map.
pub struct OccupiedEntry<'a, K: Ord + fmt::Debug, V> {
    tree: &'a mut AvlTree<MapNode<K, V>>,
    node: NonNull<MapNode<K, V>>,
}

impl<'a, K: Ord + fmt::Debug, V> Entry<'a, K, V> {
    /// Returns the key of this entry.
    pub fn key(&self) -> &K {
        match self {
            Entry::Vacant(vacant) => vacant.key(),
            Entry::Occupied(occupied) => occupied.key(),
        }
    }

    /// Inserts `default` if the entry is vacant, and returns the value of the entry.
    pub fn or_insert(self, default: V) -> &'a mut V {
        self.or_insert_with(|| default)
    }

    /// Inserts the result of `default` if the entry is vacant, and returns the value of the
    /// entry.
    pub fn or_insert_with<F: FnOnce() -> V>(self, default: F) -> &'a mut V {
        match self {
            Entry::Vacant(vacant) => vacant.insert(default()),
            Entry::Occupied(occupied) => occupied.into_mut(),
        }
    }

    /// Applies `f` to the value if the entry is occupied.
    pub fn and_modify<F: FnOnce(&mut V)>(mut self, f: F) -> Self {
        if let Entry::Occupied(occupied) = &mut self {
            f(occupied.get_mut());
        }

        self
    }
}

impl<'a, K: Ord + fmt::Debug, V> VacantEntry<'a, K, V> {
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Takes back ownership of the key.
    pub fn into_key(self) -> K {
        self.key
    }

    /// Inserts `value` under the entry's key, rebalancing the tree.
    pub fn insert(self, value: V) -> &'a mut V {
        let node = Box::new(MapNode {
            links: Links::new(),
            key: self.key,
            value,
            _unpin: PhantomPinned,
        });

        // SAFETY: `insert_as` came from a search for this key, and the tree has been mutably
        // borrowed ever since.
        let mut node = unsafe { self.tree.insert_at(self.insert_as, node) };

        // SAFETY: The node is owned by the tree, which stays borrowed for `'a`.
        unsafe { &mut node.as_mut().value }
    }
}

impl<'a, K: Ord + fmt::Debug, V> OccupiedEntry<'a, K, V> {
    pub fn key(&self) -> &K {
        unsafe { &self.node.as_ref().key }
    }

    pub fn get(&self) -> &V {
        unsafe { &self.node.as_ref().value }
    }

    pub fn get_mut(&mut self) -> &mut V {
        // SAFETY: Pinning is not structural for `value`.
        unsafe { &mut self.node.as_mut().value }
    }

    /// Converts the entry into a reference to its value, borrowed for as long as the map.
    pub fn into_mut(self) -> &'a mut V {
        let mut node = self.node;
        unsafe { &mut node.as_mut().value }
    }

    /// Overwrites the value of the entry, returning the previous one.
    pub fn insert(&mut self, value: V) -> V {
        mem::replace(self.get_mut(), value)
    }

    pub fn remove(self) -> V {
        self.remove_entry().1
    }

    /// Removes the entry from the map, returning its key and value.
    pub fn remove_entry(self) -> (K, V) {
        // SAFETY: `node` is linked into `tree`.
        let node = unsafe { self.tree.remove_at(self.node) };
        let MapNode { key, value, .. } = *node;
        (key, value)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::{prelude::v1::*, string::String};

    use crate::model;

    use super::*;

    #[test]
    fn insert_overwrites_value() {
        let mut map = AvlMap::new();

        assert_eq!(map.insert(1, "one"), None);
        assert_eq!(map.insert(2, "two"), None);
        assert_eq!(map.insert(1, "uno"), Some("one"));

        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&1), Some(&"uno"));
        map.assert_invariants();
    }

    #[test]
    fn try_get_reports_missing_key() {
        let map: AvlMap<u32, u32> = (0..10).map(|k| (k, k * k)).collect();

        assert_eq!(map.try_get(&3), Ok(&9));
        assert_eq!(map.try_get(&10), Err(KeyError));
        assert_eq!(KeyError.to_string(), "key not found");
    }

    #[test]
    fn remove_missing_is_noop() {
        let mut map: AvlMap<u32, ()> = (0..5).map(|k| (k, ())).collect();

        assert_eq!(map.remove(&7), None);
        assert_eq!(map.len(), 5);

        let mut empty: AvlMap<u32, ()> = AvlMap::new();
        assert_eq!(empty.remove(&0), None);
        assert!(empty.is_empty());
    }

    #[test]
    fn borrowed_keys() {
        let mut map = AvlMap::new();
        map.insert(String::from("beta"), 2);
        map.insert(String::from("alpha"), 1);
        map.insert(String::from("gamma"), 3);

        assert_eq!(map.get("alpha"), Some(&1));
        *map.get_mut("beta").unwrap() += 10;
        assert_eq!(map.remove("beta"), Some(12));
        assert!(!map.contains_key("beta"));

        assert_eq!(map.first_key_value(), Some((&String::from("alpha"), &1)));
        assert_eq!(map.last_key_value(), Some((&String::from("gamma"), &3)));
    }

    #[test]
    fn pop_both_ends() {
        let mut map: AvlMap<u32, u32> = (0..6).map(|k| (k, k + 100)).collect();

        assert_eq!(map.pop_first(), Some((0, 100)));
        assert_eq!(map.pop_last(), Some((5, 105)));
        map.assert_invariants();

        assert_eq!(
            map.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>(),
            [(1, 101), (2, 102), (3, 103), (4, 104)]
        );

        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.pop_first(), None);
    }

    #[test]
    fn debug_output() {
        let map: AvlMap<u32, char> = [(2, 'b'), (1, 'a')].into_iter().collect();
        assert_eq!(format!("{map:?}"), "{1: 'a', 2: 'b'}");
    }

    #[test]
    fn entry_counts_occurrences() {
        let mut counts = AvlMap::new();
        for word in ["b", "a", "c", "a", "b", "a"] {
            *counts.entry(word).or_insert(0) += 1;
        }

        counts.assert_invariants();
        assert_eq!(
            counts.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>(),
            [("a", 3), ("b", 2), ("c", 1)]
        );
    }

    #[test]
    fn entry_and_modify_skips_vacant() {
        let mut map: AvlMap<u32, u32> = (0..4).map(|k| (k, k)).collect();

        map.entry(2).and_modify(|v| *v += 10).or_insert(0);
        map.entry(9).and_modify(|v| *v += 10).or_insert_with(|| 90);

        assert_eq!(map.get(&2), Some(&12));
        assert_eq!(map.get(&9), Some(&90));
        assert_eq!(map.len(), 5);
        map.assert_invariants();
    }

    #[test]
    fn occupied_entry_replace_and_remove() {
        let mut map: AvlMap<u32, char> = [(1, 'a'), (2, 'b'), (3, 'c')].into_iter().collect();

        let Entry::Occupied(mut occupied) = map.entry(2) else {
            panic!("key 2 should be occupied");
        };
        assert_eq!(occupied.key(), &2);
        assert_eq!(occupied.insert('B'), 'b');
        assert_eq!(occupied.get(), &'B');
        assert_eq!(occupied.remove_entry(), (2, 'B'));

        let Entry::Vacant(vacant) = map.entry(2) else {
            panic!("key 2 should be vacant");
        };
        assert_eq!(vacant.into_key(), 2);

        map.assert_invariants();
        assert_eq!(map.len(), 2);
        assert!(!map.contains_key(&2));
    }

    #[test]
    fn iter_from_both_ends() {
        let map: AvlMap<u32, u32> = (0..5).map(|k| (k, k * 2)).collect();

        assert_eq!(map.iter().rev().next(), Some((&4, &8)));
        assert_eq!(map.iter().len(), 5);
    }

    proptest::proptest! {
        #[test]
        fn matches_btree_map(ops in proptest::collection::vec(model::map_op_strategy(), 0..256)) {
            model::run_map_equivalence(ops);
        }
    }
}
