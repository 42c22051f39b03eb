extern crate std;

use std::{
    collections::BTreeMap,
    ops::Bound::{Excluded, Unbounded},
    prelude::v1::*,
    ptr::NonNull,
};

use arbitrary::Arbitrary;
use cordyceps::Linked;
use proptest::{
    arbitrary::any,
    strategy::{Just, Strategy},
};

#[cfg(feature = "alloc")]
use crate::AvlMap;
use crate::{AvlTree, Links, TreeNode};

#[derive(Debug)]
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub key: u32,
    pub value: u32,
}

impl TestNode {
    pub fn new(key: u32) -> Box<TestNode> {
        TestNode::with_value(key, 0)
    }

    pub fn with_value(key: u32, value: u32) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
            value,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::new(Box::into_raw(r)).unwrap()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

/// Asserts that the height of `tree` is within the AVL bound for its length.
pub fn assert_height_bound(tree: &AvlTree<TestNode>) {
    let bound = 1.4405 * ((tree.len() + 2) as f64).log2();
    assert!(
        tree.height() as f64 <= bound,
        "height {} exceeds bound {bound} for {} nodes",
        tree.height(),
        tree.len()
    );
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    Index(usize),
    Random(u32),
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in 0u32..1000,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(ItemValue),
    Get(ItemValue),
    Remove(ItemValue),
    Predecessor(ItemValue),
    Successor(ItemValue),
    First,
    PopFirst,
    Last,
    PopLast,
}

impl Op {
    fn finalize(self, sorted: &[u32]) -> FinalOp {
        fn get_value(v: &[u32], i: ItemValue) -> u32 {
            match i {
                ItemValue::Index(idx) => {
                    if v.is_empty() {
                        idx as u32
                    } else {
                        v[idx % v.len()]
                    }
                }
                ItemValue::Random(v) => v,
            }
        }

        match self {
            Op::Insert(item) => FinalOp::Insert(get_value(sorted, item)),
            Op::Get(item) => FinalOp::Get(get_value(sorted, item)),
            Op::Remove(item) => FinalOp::Remove(get_value(sorted, item)),
            Op::Predecessor(item) => FinalOp::Predecessor(get_value(sorted, item)),
            Op::Successor(item) => FinalOp::Successor(get_value(sorted, item)),
            Op::First => FinalOp::First,
            Op::PopFirst => FinalOp::PopFirst,
            Op::Last => FinalOp::Last,
            Op::PopLast => FinalOp::PopLast,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Insert(u32),
    Get(u32),
    Remove(u32),
    Predecessor(u32),
    Successor(u32),
    First,
    PopFirst,
    Last,
    PopLast,
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        value_strategy().prop_map(Op::Insert),
        value_strategy().prop_map(Op::Get),
        value_strategy().prop_map(Op::Remove),
        value_strategy().prop_map(Op::Predecessor),
        value_strategy().prop_map(Op::Successor),
        Just(Op::First),
        Just(Op::PopFirst),
        Just(Op::Last),
        Just(Op::PopLast),
    ]
}

pub fn run_btree_equivalence(ops: Vec<Op>) {
    let mut sorted_keys = Vec::with_capacity(ops.len());
    let mut btree = BTreeMap::new();
    let mut avl: AvlTree<TestNode> = AvlTree::new();

    fn insert_sorted(v: &mut Vec<u32>, key: u32) {
        if let Err(idx) = v.binary_search(&key) {
            v.insert(idx, key);
        }
    }

    fn remove_sorted(v: &mut Vec<u32>, key: u32) {
        if let Ok(idx) = v.binary_search(&key) {
            v.remove(idx);
        }
    }

    #[inline]
    #[allow(clippy::boxed_local)]
    fn node_entry(node: Box<TestNode>) -> (u32, u32) {
        (node.key, node.value)
    }

    #[inline]
    fn ref_entry(node: &TestNode) -> (&u32, &u32) {
        (&node.key, &node.value)
    }

    for (op_id, op) in ops.into_iter().enumerate() {
        let final_op = op.finalize(&sorted_keys);
        // Each insertion stores a distinct value so that overwrites are observable.
        let value = op_id as u32;

        match final_op {
            FinalOp::Insert(key) => {
                insert_sorted(&mut sorted_keys, key);

                let from_btree = btree.insert(key, value);
                let from_avl = avl
                    .insert(TestNode::with_value(key, value))
                    .map(|node| node.value);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Get(key) => {
                let from_btree = btree.get_key_value(&key);
                let from_avl = avl.get(&key).map(|node| ref_entry(node.get_ref()));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Remove(key) => {
                remove_sorted(&mut sorted_keys, key);

                let from_btree = btree.remove_entry(&key);
                let from_avl = avl.remove(&key).map(node_entry);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Predecessor(key) => {
                let from_btree = btree.range(..key).next_back();
                let from_avl = avl.predecessor(&key).map(|node| ref_entry(node.get_ref()));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Successor(key) => {
                let from_btree = btree.range((Excluded(key), Unbounded)).next();
                let from_avl = avl.successor(&key).map(|node| ref_entry(node.get_ref()));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::First => {
                let from_btree = btree.first_key_value();
                let from_avl = avl.first().map(|node| ref_entry(node.get_ref()));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopFirst => {
                let from_btree = btree.pop_first();
                let from_avl = avl.pop_first().map(node_entry);

                if let Some((key, _)) = from_btree {
                    remove_sorted(&mut sorted_keys, key);
                }

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Last => {
                let from_btree = btree.last_key_value();
                let from_avl = avl.last().map(|node| ref_entry(node.get_ref()));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopLast => {
                let from_btree = btree.pop_last();
                let from_avl = avl.pop_last().map(node_entry);

                if let Some((key, _)) = from_btree {
                    remove_sorted(&mut sorted_keys, key);
                }

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }
        }

        avl.assert_invariants();
        assert_height_bound(&avl);
        assert_eq!(btree.len(), avl.len());
        assert!(btree
            .iter()
            .zip(avl.iter())
            .all(|((&k, &v), node)| k == node.key && v == node.value));
    }
}

/// An operation on an [`AvlMap`], mirrored on a `BTreeMap`.
///
/// Keys are drawn from a small range so that overwrites and removals of present keys are common.
#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum MapOp {
    Insert(u8, u16),
    Remove(u8),
    Get(u8),
    OrInsert(u8, u16),
    Increment(u8),
    PopFirst,
    PopLast,
}

pub fn map_op_strategy() -> impl Strategy<Value = MapOp> {
    let key = || 0u8..64;

    proptest::prop_oneof![
        (key(), any::<u16>()).prop_map(|(k, v)| MapOp::Insert(k, v)),
        key().prop_map(MapOp::Remove),
        key().prop_map(MapOp::Get),
        (key(), any::<u16>()).prop_map(|(k, v)| MapOp::OrInsert(k, v)),
        key().prop_map(MapOp::Increment),
        Just(MapOp::PopFirst),
        Just(MapOp::PopLast),
    ]
}

#[cfg(feature = "alloc")]
pub fn run_map_equivalence(ops: Vec<MapOp>) {
    let mut map = AvlMap::new();
    let mut btree = BTreeMap::new();

    for (op_id, op) in ops.into_iter().enumerate() {
        match op {
            MapOp::Insert(key, value) => {
                let from_map = map.insert(key, value);
                let from_btree = btree.insert(key, value);

                assert_eq!(from_map, from_btree, "MapOp #{op_id}: {op:?}");
            }

            MapOp::Remove(key) => {
                assert_eq!(map.remove(&key), btree.remove(&key), "MapOp #{op_id}: {op:?}");
            }

            MapOp::Get(key) => {
                assert_eq!(map.get(&key), btree.get(&key), "MapOp #{op_id}: {op:?}");
            }

            MapOp::OrInsert(key, value) => {
                let from_map = *map.entry(key).or_insert(value);
                let from_btree = *btree.entry(key).or_insert(value);

                assert_eq!(from_map, from_btree, "MapOp #{op_id}: {op:?}");
            }

            MapOp::Increment(key) => {
                let bump = |v: &mut u16| *v = v.wrapping_add(1);
                map.entry(key).and_modify(bump);
                btree.entry(key).and_modify(bump);
            }

            MapOp::PopFirst => {
                assert_eq!(map.pop_first(), btree.pop_first(), "MapOp #{op_id}: {op:?}");
            }

            MapOp::PopLast => {
                assert_eq!(map.pop_last(), btree.pop_last(), "MapOp #{op_id}: {op:?}");
            }
        }

        map.assert_invariants();
        assert_eq!(map.len(), btree.len());
        assert!(map.iter().eq(btree.iter()), "MapOp #{op_id}: {op:?}");
    }
}
