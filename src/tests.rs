extern crate std;

use std::{ops::Range, prelude::v1::*};

use proptest::prelude::*;

use crate::model::{self, assert_height_bound, TestNode};

use super::*;

// Pre-order listing of `(key, balance, left key, right key)` for every node.
type Shape = Vec<(u32, i8, Option<u32>, Option<u32>)>;

fn shape(tree: &AvlTree<TestNode>) -> Shape {
    fn walk(tree: &AvlTree<TestNode>, node: Link<TestNode>, out: &mut Shape) {
        let Some(node) = node else {
            return;
        };

        unsafe {
            let links = tree.links(node);
            let key_of = |link: Link<TestNode>| link.map(|n| n.as_ref().key);

            out.push((
                node.as_ref().key,
                links.balance(),
                key_of(links.left()),
                key_of(links.right()),
            ));

            walk(tree, links.left(), out);
            walk(tree, links.right(), out);
        }
    }

    let mut out = Vec::new();
    walk(tree, tree.root, &mut out);
    out
}

fn root_key(tree: &AvlTree<TestNode>) -> Option<u32> {
    tree.root.map(|root| unsafe { root.as_ref().key })
}

fn tree_of(keys: &[u32]) -> AvlTree<TestNode> {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for &key in keys {
        assert!(tree.insert(TestNode::new(key)).is_none());
        tree.assert_invariants();
    }
    tree
}

fn insert_find_all(keys: &[u32]) {
    let tree = tree_of(keys);

    for key in keys {
        let node = tree.get_raw(key).expect("item not found");
        assert_eq!(unsafe { node.as_ref().key() }, key);
    }
}

#[test]
fn zero_elems_find() {
    insert_find_all(&[]);
}

#[test]
fn single_elem_find() {
    insert_find_all(&[0]);
}

#[test]
fn two_elems_find() {
    insert_find_all(&[0, 1]);
    insert_find_all(&[1, 0]);
}

#[test]
fn three_elems_find() {
    insert_find_all(&[0, 1, 2]);
    insert_find_all(&[0, 2, 1]);
    insert_find_all(&[1, 0, 2]);
    insert_find_all(&[1, 2, 0]);
    insert_find_all(&[2, 0, 1]);
    insert_find_all(&[2, 1, 0]);
}

// Calls `f` with every permutation of `keys`.
fn for_each_permutation(keys: &mut [u32], k: usize, f: &mut impl FnMut(&[u32])) {
    if k == keys.len() {
        f(keys);
        return;
    }

    for i in k..keys.len() {
        keys.swap(k, i);
        for_each_permutation(keys, k + 1, f);
        keys.swap(k, i);
    }
}

#[test]
fn five_elems_find() {
    for_each_permutation(&mut [0, 1, 2, 3, 4], 0, &mut |keys| insert_find_all(keys));
}

fn insert_remove_all(keys: &[u32]) {
    let mut tree = tree_of(keys);

    for key in keys {
        let node = tree.get_raw(key).expect("item not found");
        unsafe { tree.remove_at(node) };
        tree.assert_invariants();
    }
    assert!(tree.is_empty());

    for &key in keys {
        tree.insert(TestNode::new(key));
        tree.assert_invariants();
    }

    for key in keys.iter().rev() {
        assert_eq!(tree.remove(key).map(|node| node.key), Some(*key));
        tree.assert_invariants();
    }
    assert!(tree.is_empty());
}

#[test]
fn remove_one() {
    insert_remove_all(&[0]);
}

#[test]
fn remove_two() {
    insert_remove_all(&[0, 1]);
    insert_remove_all(&[1, 0]);
}

#[test]
fn remove_three() {
    insert_remove_all(&[0, 1, 2]);
    insert_remove_all(&[0, 2, 1]);
    insert_remove_all(&[1, 0, 2]);
    insert_remove_all(&[1, 2, 0]);
    insert_remove_all(&[2, 0, 1]);
    insert_remove_all(&[2, 1, 0]);
}

#[test]
fn remove_six() {
    for_each_permutation(&mut [0, 1, 2, 3, 4, 5], 0, &mut |keys| insert_remove_all(keys));
}

#[test]
fn ascending_inserts_rotate_once() {
    let tree = tree_of(&[1, 2, 3]);

    assert_eq!(
        shape(&tree),
        [(2, 0, Some(1), Some(3)), (1, 0, None, None), (3, 0, None, None)]
    );
}

#[test]
fn descending_inserts_rotate_once() {
    let tree = tree_of(&[3, 2, 1]);

    assert_eq!(
        shape(&tree),
        [(2, 0, Some(1), Some(3)), (1, 0, None, None), (3, 0, None, None)]
    );

    // The same rotation one level down, below a left-heavy root.
    let tree = tree_of(&[5, 6, 3, 2, 1]);
    assert_eq!(
        shape(&tree),
        [
            (5, -1, Some(2), Some(6)),
            (2, 0, Some(1), Some(3)),
            (1, 0, None, None),
            (3, 0, None, None),
            (6, 0, None, None),
        ]
    );
}

#[test]
fn zig_zag_inserts_rotate_twice() {
    let tree = tree_of(&[3, 1, 2]);
    assert_eq!(shape(&tree), shape(&tree_of(&[1, 2, 3])));

    let tree = tree_of(&[1, 3, 2]);
    assert_eq!(shape(&tree), shape(&tree_of(&[1, 2, 3])));
}

#[test]
fn double_rotation_balances_follow_child() {
    // Inserting 4 below the zig-zag child 3, which then leans right, leaves 2 left-heavy after
    // the double rotation.
    let tree = tree_of(&[5, 2, 8, 1, 3, 4]);
    assert_eq!(
        shape(&tree),
        [
            (3, 0, Some(2), Some(5)),
            (2, -1, Some(1), None),
            (1, 0, None, None),
            (5, 0, Some(4), Some(8)),
            (4, 0, None, None),
            (8, 0, None, None),
        ]
    );

    let mut tree = tree_of(&[10, 5, 15, 3, 7, 17, 6]);
    assert_eq!(root_key(&tree), Some(10));

    // 7 and 6 hang below 5; removing 3 forces a right-left double rotation at 5.
    tree.remove(&3);
    tree.assert_invariants();
    assert_eq!(
        shape(&tree)[..2],
        [(10, 0, Some(6), Some(15)), (6, 0, Some(5), Some(7))]
    );
}

#[test]
fn remove_root_with_two_children() {
    let mut tree = tree_of(&[4, 2, 6, 1, 3, 5, 7]);

    let removed = tree.remove(&4).expect("4 is present");
    assert_eq!(removed.key, 4);
    tree.assert_invariants();

    // The predecessor took the root's place and balance.
    assert_eq!(
        shape(&tree),
        [
            (3, 0, Some(2), Some(6)),
            (2, -1, Some(1), None),
            (1, 0, None, None),
            (6, 0, Some(5), Some(7)),
            (5, 0, None, None),
            (7, 0, None, None),
        ]
    );
}

#[test]
fn remove_adjacent_predecessor() {
    // The predecessor of 2 is its own left child.
    let mut tree = tree_of(&[2, 1, 3]);

    tree.remove(&2);
    tree.assert_invariants();
    assert_eq!(shape(&tree), [(1, 1, None, Some(3)), (3, 0, None, None)]);
}

#[test]
fn remove_missing_key_is_noop() {
    let mut tree = tree_of(&[4, 2, 6, 1, 3, 5, 7]);
    let before = shape(&tree);

    assert!(tree.remove(&8).is_none());
    assert!(tree.remove(&0).is_none());

    assert_eq!(shape(&tree), before);
    assert_eq!(tree.len(), 7);

    let mut empty: AvlTree<TestNode> = AvlTree::new();
    assert!(empty.remove(&1).is_none());
    assert!(empty.is_empty());
}

#[test]
fn reinsert_replaces_without_reshaping() {
    let mut tree = tree_of(&[4, 2, 6, 1, 3]);
    let before = shape(&tree);

    let old = tree.insert(TestNode::with_value(2, 42)).expect("2 is present");
    assert_eq!((old.key, old.value), (2, 0));

    tree.assert_invariants();
    assert_eq!(shape(&tree), before);
    assert_eq!(tree.len(), 5);
    assert_eq!(tree.get(&2).map(|node| node.value), Some(42));

    // Replacing the root works as well.
    tree.insert(TestNode::with_value(4, 7));
    assert_eq!(shape(&tree), before);
    assert_eq!(root_key(&tree), Some(4));
    assert_eq!(tree.try_get(&4).map(|node| node.value), Ok(7));
}

#[test]
fn try_get_missing_key() {
    let tree = tree_of(&[1, 2, 3]);

    assert_eq!(tree.try_get(&2).map(|node| node.key), Ok(2));
    assert_eq!(tree.try_get(&5).map(|node| node.key), Err(KeyError));
}

#[test]
fn ascending_fill_and_drain() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for key in 1..=15 {
        tree.insert(TestNode::new(key));
        tree.assert_invariants();
        assert_height_bound(&tree);
    }

    // A perfect tree.
    assert_eq!(tree.height(), 4);
    assert_eq!(root_key(&tree), Some(8));

    for key in 1..=15 {
        assert_eq!(tree.remove(&key).map(|node| node.key), Some(key));
        tree.assert_invariants();
        assert_height_bound(&tree);
    }

    assert!(tree.is_empty());
    assert_eq!(tree.height(), 0);
}

#[test]
fn removal_rotates_at_several_levels() {
    // A minimal (Fibonacci) AVL tree of height 5: every internal node leans left, so removing
    // the rightmost leaf unbalances the parent and then the root.
    let mut tree = tree_of(&[8, 5, 11, 3, 7, 10, 12, 2, 4, 6, 9, 1]);
    assert_eq!(tree.height(), 5);

    tree.remove(&12);
    tree.assert_invariants();
    assert_eq!(tree.height(), 4);
    assert_eq!(root_key(&tree), Some(5));
}

#[test]
fn rotate_moves_root() {
    let mut tree = tree_of(&[2, 1, 3]);
    let root = tree.root.expect("tree is not empty");

    unsafe { tree.rotate(root, Dir::Right) };
    assert_eq!(root_key(&tree), Some(1));
    assert_eq!(
        shape(&tree).iter().map(|&(k, _, l, r)| (k, l, r)).collect::<Vec<_>>(),
        [(1, None, Some(2)), (2, None, Some(3)), (3, None, None)]
    );

    let root = tree.root.expect("tree is not empty");
    unsafe { tree.rotate(root, Dir::Left) };
    assert_eq!(root_key(&tree), Some(2));

    // A rotation without a child to promote does nothing.
    let leaf = tree.get_raw(&1).expect("1 is present");
    unsafe { tree.rotate(leaf, Dir::Right) };
    assert_eq!(
        shape(&tree),
        [(2, 0, Some(1), Some(3)), (1, 0, None, None), (3, 0, None, None)]
    );
}

#[test]
fn swap_positions_exchanges_balances() {
    let mut tree = tree_of(&[2, 1, 3, 4]);
    let a = tree.get_raw(&2).expect("2 is present");
    let b = tree.get_raw(&4).expect("4 is present");
    let three = tree.get_raw(&3);

    unsafe {
        tree.swap_positions(a, b);

        assert_eq!(tree.root, Some(b));
        assert_eq!(tree.links(b).balance(), 1);
        assert_eq!(tree.links(a).balance(), 0);
        assert_eq!(tree.links(a).parent(), three);

        // Swapping back restores the original tree.
        tree.swap_positions(b, a);
    }

    tree.assert_invariants();
}

#[test]
fn swap_positions_with_own_child() {
    let mut tree = tree_of(&[4, 2, 6, 1, 3]);
    let parent = tree.get_raw(&2).expect("2 is present");
    let child = tree.get_raw(&3).expect("3 is present");
    let root = tree.get_raw(&4).expect("4 is present");

    unsafe {
        // A node swapped with itself stays put.
        tree.swap_positions(parent, parent);
        assert_eq!(tree.links(root).left(), Some(parent));

        tree.swap_positions(parent, child);

        assert_eq!(tree.links(root).left(), Some(child));
        assert_eq!(tree.links(child).right(), Some(parent));
        assert_eq!(tree.links(parent).parent(), Some(child));
        assert_eq!(tree.links(parent).left(), None);
        assert_eq!(tree.links(child).balance(), 0);

        tree.swap_positions(child, parent);
    }

    tree.assert_invariants();
    assert_eq!(shape(&tree), shape(&tree_of(&[4, 2, 6, 1, 3])));
}

#[test]
fn neighbors_of_present_and_absent_keys() {
    let tree = tree_of(&[30, 10, 50, 20, 40]);
    let key = |node: Option<Pin<&TestNode>>| node.map(|node| node.key);

    assert_eq!(key(tree.predecessor(&30)), Some(20));
    assert_eq!(key(tree.successor(&30)), Some(40));
    assert_eq!(key(tree.predecessor(&10)), None);
    assert_eq!(key(tree.successor(&50)), None);

    // Absent keys fall between their neighbors.
    assert_eq!(key(tree.predecessor(&35)), Some(30));
    assert_eq!(key(tree.successor(&35)), Some(40));
    assert_eq!(key(tree.predecessor(&15)), Some(10));
    assert_eq!(key(tree.successor(&15)), Some(20));
    assert_eq!(key(tree.predecessor(&5)), None);
    assert_eq!(key(tree.successor(&5)), Some(10));
    assert_eq!(key(tree.predecessor(&55)), Some(50));
    assert_eq!(key(tree.successor(&55)), None);

    let empty: AvlTree<TestNode> = AvlTree::new();
    assert!(empty.predecessor(&1).is_none());
    assert!(empty.successor(&1).is_none());
}

#[test]
fn first_last_and_pop() {
    let mut tree = tree_of(&[5, 2, 8, 1, 9]);

    assert_eq!(tree.first().map(|node| node.key), Some(1));
    assert_eq!(tree.last().map(|node| node.key), Some(9));

    assert_eq!(tree.pop_first().map(|node| node.key), Some(1));
    assert_eq!(tree.pop_last().map(|node| node.key), Some(9));
    tree.assert_invariants();

    assert_eq!(
        tree.iter().map(|node| node.key).collect::<Vec<_>>(),
        [2, 5, 8]
    );

    tree.clear();
    assert!(tree.is_empty());
    assert!(tree.first().is_none());
    assert!(tree.pop_last().is_none());
}

#[cfg(miri)]
const FUZZ_RANGE: Range<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: Range<usize> = 0..1000;

proptest::proptest! {
    #![proptest_config(ProptestConfig {
        max_shrink_iters: 65536,
        .. ProptestConfig::default()
    })]

    #[test]
    fn btree_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_btree_equivalence(ops);
    }

    #[test]
    fn insert_then_remove_in_any_order(
        keys in proptest::collection::btree_set(any::<u32>(), 0..200)
            .prop_map(|set| set.into_iter().collect::<Vec<_>>())
            .prop_shuffle(),
        removal_order in proptest::collection::vec(any::<prop::sample::Index>(), 0..200),
    ) {
        let mut tree = tree_of(&keys);
        let mut remaining = keys.clone();

        for index in removal_order {
            if remaining.is_empty() {
                break;
            }

            let key = remaining.swap_remove(index.index(remaining.len()));
            prop_assert_eq!(tree.remove(&key).map(|node| node.key), Some(key));
            tree.assert_invariants();
            assert_height_bound(&tree);
        }

        for key in remaining {
            prop_assert!(tree.remove(&key).is_some());
        }

        prop_assert!(tree.is_empty());
        prop_assert!(tree.root.is_none());
    }

    #[test]
    fn duplicate_insert_is_idempotent(keys in proptest::collection::vec(0u32..64, 1..64)) {
        let mut once: AvlTree<TestNode> = AvlTree::new();
        let mut twice: AvlTree<TestNode> = AvlTree::new();

        for &key in &keys {
            once.insert(TestNode::new(key));
            twice.insert(TestNode::new(key));
            twice.insert(TestNode::new(key));
        }

        prop_assert_eq!(shape(&once), shape(&twice));
        twice.assert_invariants();
    }
}
