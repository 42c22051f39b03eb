//! An intrusive AVL tree.
//#![no_std]

// Conventions used in comments:
// - The height of a node `x` is denoted `h(x)`. A missing child has height 0 and a leaf has
//   height 1.
// - The balance of a node `x` is given by `b(x) = h(right(x)) - h(left(x))`.
// - A node is left-heavy if `b(x) < 0` and right-heavy if `b(x) > 0`.
//
// The fundamental invariant of an AVL tree is:
// 1. All balances are -1, 0 or 1.
//
// Corollaries:
// 2. A unary node has balance ±1, and its sole child is a leaf.
//
//    Proof: the missing child has height 0, so by (1) the present child has height 1.
//
// 3. A tree of height `h` has at least `F(h + 2) - 1` nodes, where `F` is the Fibonacci
//    sequence, so `h < 1.4405 * log2(n + 2)`.
//
// Between an insertion or removal and the end of its rebalancing pass, exactly one node may
// transiently have balance ±2. That node is always the pivot of the next rotation.

use core::{
    borrow::Borrow,
    cell::UnsafeCell,
    cmp::Ordering,
    fmt,
    marker::PhantomPinned,
    mem,
    ops::Not,
    pin::Pin,
    ptr::{self, NonNull},
};

use cordyceps::Linked;
use tracing::trace;

mod debug;
mod iter;
#[cfg(feature = "alloc")]
pub mod map;
#[cfg(any(test, feature = "model"))]
pub mod model;
#[cfg(test)]
mod tests;

pub use iter::Iter;
#[cfg(feature = "alloc")]
pub use map::{AvlMap, Entry, OccupiedEntry, VacantEntry};

pub trait TreeNode<L>: Linked<L> {
    type Key: Ord + fmt::Debug;

    fn key(&self) -> &Self::Key;
}

/// The error returned by lookups that did not find the requested key.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, thiserror::Error)]
#[error("key not found")]
pub struct KeyError;

/// An intrusive AVL tree.
///
/// Every element embeds a [`Links`] record holding its parent and child pointers and its balance
/// factor. The tree owns the elements linked into it; elements are handed back to the caller as
/// [`Linked::Handle`]s when they are removed.
pub struct AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    root: Link<T>,
    len: usize,
}

pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Dir {
    /// The change in balance of a node whose `self` subtree grew by one level.
    #[inline]
    fn balance_delta(self) -> i8 {
        match self {
            Dir::Left => -1,
            Dir::Right => 1,
        }
    }
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    balance: i8,
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

pub(crate) enum Search<T: ?Sized> {
    Found(NonNull<T>),
    Vacant(InsertAs<T>),
}

// A vacant position in the tree.
pub(crate) enum InsertAs<T: ?Sized> {
    Root,
    Child { parent: NonNull<T>, dir: Dir },
}

// Node identity is the address alone; metadata of unsized nodes is ignored.
#[inline]
fn same_node<T: ?Sized>(a: NonNull<T>, b: NonNull<T>) -> bool {
    ptr::addr_eq(a.as_ptr(), b.as_ptr())
}

#[inline]
fn same_link<T: ?Sized>(a: Link<T>, b: Link<T>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => same_node(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> AvlTree<T> {
        AvlTree { root: None, len: 0 }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns the number of nodes on the longest path from the root to a leaf.
    ///
    /// An empty tree has height 0.
    pub fn height(&self) -> usize {
        unsafe { self.height_at(self.root) }
    }

    unsafe fn height_at(&self, node: Link<T>) -> usize {
        let Some(node) = node else {
            return 0;
        };

        unsafe {
            let left = self.height_at(self.links(node).left());
            let right = self.height_at(self.links(node).right());

            1 + left.max(right)
        }
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        assert_eq!(self.root.is_none(), self.len == 0);

        if let Some(root) = self.root {
            unsafe {
                assert!(self.links(root).parent().is_none(), "root has a parent pointer");

                let (_, count) = self.assert_invariants_at(root);
                assert_eq!(count, self.len, "length does not match node count");
            }
        }

        // In-order traversal yields strictly increasing keys.
        let mut iter = self.iter();
        if let Some(mut prev) = iter.next() {
            for cur in iter {
                assert!(
                    prev.key() < cur.key(),
                    "keys out of order: {:?} precedes {:?}",
                    prev.key(),
                    cur.key()
                );
                prev = cur;
            }
        }
    }

    // Returns the height and the node count of the subtree rooted at `node`.
    #[allow(clippy::only_used_in_recursion)]
    unsafe fn assert_invariants_at(&self, node: NonNull<T>) -> (usize, usize) {
        unsafe {
            let mut heights = [0_usize; 2];
            let mut count = 1;

            for dir in [Dir::Left, Dir::Right] {
                if let Some(child) = self.links(node).child(dir) {
                    // Ensure child's parent link points to this node.
                    let parent = self
                        .links(child)
                        .parent()
                        .expect("child parent pointer not set");
                    assert!(same_node(node, parent), "child points to the wrong parent");

                    let (height, len) = self.assert_invariants_at(child);
                    heights[dir as usize] = height;
                    count += len;
                }
            }

            // Ensure the stored balance matches the subtree heights and is within bounds.
            let balance = heights[Dir::Right as usize] as isize - heights[Dir::Left as usize] as isize;
            let stored = self.links(node).balance();
            assert_eq!(
                isize::from(stored),
                balance,
                "stale balance at key {:?}",
                node.as_ref().key()
            );
            assert!(
                (-1..=1).contains(&stored),
                "unbalanced node at key {:?}: {stored}",
                node.as_ref().key()
            );

            (1 + heights[0].max(heights[1]), count)
        }
    }

    /// Returns a reference to the node corresponding to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns a pinned mutable reference to the node corresponding to `key`.
    ///
    /// Callers must not modify the node's key in a way that changes its ordering.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<Pin<&mut T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let mut ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_mut())) }
    }

    /// Returns a reference to the node corresponding to `key`, or [`KeyError`] if there is none.
    pub fn try_get<Q>(&self, key: &Q) -> Result<Pin<&T>, KeyError>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.get(key).ok_or(KeyError)
    }

    /// Returns `true` if the tree contains a node corresponding to `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.get_raw(key).is_some()
    }

    fn get_raw<Q>(&self, key: &Q) -> Link<T>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        match self.search(key) {
            Search::Found(node) => Some(node),
            Search::Vacant(_) => None,
        }
    }

    // Descends the tree looking for `key`. If it is absent, returns the position at which a node
    // with that key would be linked.
    pub(crate) fn search<Q>(&self, key: &Q) -> Search<T>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let Some(mut cur) = self.root else {
            return Search::Vacant(InsertAs::Root);
        };

        loop {
            unsafe {
                let dir = match key.cmp(cur.as_ref().key().borrow()) {
                    Ordering::Less => Dir::Left,
                    Ordering::Equal => return Search::Found(cur),
                    Ordering::Greater => Dir::Right,
                };

                match self.links(cur).child(dir) {
                    Some(child) => cur = child,
                    None => return Search::Vacant(InsertAs::Child { parent: cur, dir }),
                }
            }
        }
    }

    /// Returns the minimum element of the tree.
    pub fn first(&self) -> Option<Pin<&T>> {
        self.first_raw()
            .map(|first| unsafe { Pin::new_unchecked(first.as_ref()) })
    }

    /// Returns the maximum element of the tree.
    pub fn last(&self) -> Option<Pin<&T>> {
        self.last_raw()
            .map(|last| unsafe { Pin::new_unchecked(last.as_ref()) })
    }

    /// Removes and returns the minimum element of the tree.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let first = self.first_raw()?;
        unsafe { Some(self.remove_at(first)) }
    }

    /// Removes and returns the maximum element of the tree.
    pub fn pop_last(&mut self) -> Option<T::Handle> {
        let last = self.last_raw()?;
        unsafe { Some(self.remove_at(last)) }
    }

    pub(crate) fn first_raw(&self) -> Link<T> {
        self.root
            .map(|root| unsafe { self.extreme_in_subtree(root, Dir::Left) })
    }

    pub(crate) fn last_raw(&self) -> Link<T> {
        self.root
            .map(|root| unsafe { self.extreme_in_subtree(root, Dir::Right) })
    }

    /// Returns an iterator over the elements of the tree, in ascending key order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    /// Returns the element with the greatest key less than `key`.
    ///
    /// `key` need not be present in the tree.
    pub fn predecessor<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.neighbor_of_key(key, Dir::Left)
            .map(|node| unsafe { Pin::new_unchecked(node.as_ref()) })
    }

    /// Returns the element with the least key greater than `key`.
    ///
    /// `key` need not be present in the tree.
    pub fn successor<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.neighbor_of_key(key, Dir::Right)
            .map(|node| unsafe { Pin::new_unchecked(node.as_ref()) })
    }

    fn neighbor_of_key<Q>(&self, key: &Q, dir: Dir) -> Link<T>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        match self.search(key) {
            Search::Found(node) => unsafe { self.neighbor_raw(node, dir) },
            Search::Vacant(InsertAs::Root) => None,

            // The slot on the `!dir` side of `parent` sits right next to it.
            Search::Vacant(InsertAs::Child { parent, dir: side }) if side == !dir => Some(parent),
            Search::Vacant(InsertAs::Child { parent, .. }) => unsafe {
                self.neighbor_raw(parent, dir)
            },
        }
    }

    /// Inserts an item into the tree.
    ///
    /// If the tree already contains an item with an equal key, `item` takes its place without
    /// changing the shape of the tree, and the previous item is returned.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) -> Option<T::Handle> {
        let ptr = T::into_ptr(item);

        // `ptr` is not linked yet, so borrowing its key cannot alias a node in the tree.
        match self.search(unsafe { ptr.as_ref().key() }) {
            Search::Found(existing) => unsafe { Some(self.replace(existing, ptr)) },
            Search::Vacant(insert_as) => {
                unsafe { self.link_at(insert_as, ptr) };
                None
            }
        }
    }

    // Links `item` at a vacant position previously returned by `search`.
    //
    // # Safety
    //
    // `insert_as` must have been produced by `search` for `item`'s key, and the tree must not have
    // been modified since.
    pub(crate) unsafe fn insert_at(&mut self, insert_as: InsertAs<T>, item: T::Handle) -> NonNull<T> {
        let ptr = T::into_ptr(item);
        unsafe { self.link_at(insert_as, ptr) };
        ptr
    }

    unsafe fn link_at(&mut self, insert_as: InsertAs<T>, ptr: NonNull<T>) {
        unsafe {
            self.links_mut(ptr).clear();

            match insert_as {
                InsertAs::Root => {
                    debug_assert!(self.root.is_none());
                    self.root = Some(ptr);
                    self.len += 1;
                }

                InsertAs::Child { parent, dir } => self.insert_as_child(parent, dir, ptr),
            }
        }
    }

    unsafe fn insert_as_child(&mut self, parent: NonNull<T>, dir: Dir, ptr: NonNull<T>) {
        unsafe {
            debug_assert!(self.links(parent).child(dir).is_none());

            self.links_mut(parent).set_child(dir, Some(ptr));
            self.links_mut(ptr).set_parent(Some(parent));
            self.len += 1;

            // If `parent` is now balanced, the new leaf filled its shorter side and the height of
            // the subtree is unchanged. Otherwise `parent` was a leaf and just grew taller.
            if self.links_mut(parent).adjust_balance(dir) != 0 {
                self.rebalance_inserted(parent, ptr);
            }
        }
    }

    // Performs a bottom-up rebalance of the tree after the subtree rooted at `parent` grew one
    // level taller on the side of `child`.
    //
    // Invariants:
    // - `child` is a child of `parent`.
    // - `parent` has balance ±1, leaning towards `child`.
    unsafe fn rebalance_inserted(&mut self, mut parent: NonNull<T>, mut child: NonNull<T>) {
        unsafe {
            loop {
                let Some(grandparent) = self.links(parent).parent() else {
                    return;
                };

                let parent_dir = self.which_child(grandparent, Some(parent));
                let balance = self.links_mut(grandparent).adjust_balance(parent_dir);

                match balance {
                    // The shorter side caught up; `grandparent` kept its height.
                    0 => return,

                    // `grandparent` grew taller as well. Ascend one level.
                    -1 | 1 => {
                        child = parent;
                        parent = grandparent;
                    }

                    _ => {
                        self.rotate_inserted(grandparent, parent, child, parent_dir);

                        // A single or double rotation restores the height the subtree had before
                        // the insertion.
                        return;
                    }
                }
            }
        }
    }

    // Restores balance at `grandparent`, which is two levels taller on the `parent_dir` side.
    unsafe fn rotate_inserted(
        &mut self,
        grandparent: NonNull<T>,
        parent: NonNull<T>,
        child: NonNull<T>,
        parent_dir: Dir,
    ) {
        unsafe {
            let child_dir = self.which_child(parent, Some(child));

            if child_dir == parent_dir {
                trace!(
                    pivot = ?grandparent.as_ref().key(),
                    ?parent_dir,
                    "insert: single rotation"
                );

                self.rotate(grandparent, !parent_dir);
                self.links_mut(parent).set_balance(0);
                self.links_mut(grandparent).set_balance(0);
            } else {
                let side = parent_dir.balance_delta();
                let child_balance = self.links(child).balance();

                trace!(
                    pivot = ?grandparent.as_ref().key(),
                    ?parent_dir,
                    child_balance,
                    "insert: double rotation"
                );

                self.rotate(parent, parent_dir);
                self.rotate(grandparent, !parent_dir);

                let (parent_balance, grandparent_balance) = match child_balance {
                    b if b == side => (0, -side),
                    b if b == -side => (side, 0),
                    _ => (0, 0),
                };

                self.links_mut(parent).set_balance(parent_balance);
                self.links_mut(grandparent).set_balance(grandparent_balance);
                self.links_mut(child).set_balance(0);
            }
        }
    }

    /// Removes the node corresponding to `key` from the tree and returns it.
    ///
    /// Returns `None`, leaving the tree untouched, if no node corresponds to `key`.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<T::Handle>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let node = self.get_raw(key)?;
        unsafe { Some(self.remove_at(node)) }
    }

    /// Removes an arbitrary node from the tree.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other tree.
    pub unsafe fn remove_at(&mut self, node: NonNull<T>) -> T::Handle {
        // There are three possible cases:
        //
        // 1. `node` has two children.
        //
        //    In this case `node` trades places (and balances) with its predecessor[^1], which by
        //    definition has no right child. This reduces to case 2 or 3.
        //
        // 2. `node` has one child.
        //
        //    By corollary (2) the child is a leaf; it is elevated to replace `node`.
        //
        // 3. `node` is a leaf.
        //
        //    It is unlinked from its parent.
        //
        // In cases 2 and 3 the subtree that contained `node` lost exactly one level of height.
        //
        // [^1]: The predecessor of a node `a` is the greatest node in `a`'s left subtree.
        unsafe {
            if let (Some(left), Some(_)) = (self.links(node).left(), self.links(node).right()) {
                let predecessor = self.extreme_in_subtree(left, Dir::Right);

                trace!(
                    key = ?node.as_ref().key(),
                    predecessor = ?predecessor.as_ref().key(),
                    "remove: swapping with predecessor"
                );

                self.swap_positions(node, predecessor);
            }

            let parent = self.links(node).parent();
            let child = self.links(node).left().or(self.links(node).right());

            // The side of `parent` that gets shorter, taken from `node`'s current position.
            let shorter = parent.map(|p| self.which_child(p, Some(node)));

            self.replace_child_or_set_root(parent, node, child);
            self.maybe_set_parent(child, parent);

            self.links_mut(node).clear();
            self.len -= 1;

            if let (Some(parent), Some(shorter)) = (parent, shorter) {
                self.rebalance_removed(parent, shorter);
            }

            T::from_ptr(node)
        }
    }

    // Performs a bottom-up rebalance of the tree after the `shorter` subtree of `node` lost one
    // level of height.
    unsafe fn rebalance_removed(&mut self, mut node: NonNull<T>, mut shorter: Dir) {
        unsafe {
            loop {
                // Computed before any rotation moves `node` down.
                let up = self
                    .links(node)
                    .parent()
                    .map(|parent| (parent, self.which_child(parent, Some(node))));

                if !self.rebalance_removed_at(node, shorter) {
                    return;
                }

                match up {
                    Some((parent, dir)) => {
                        node = parent;
                        shorter = dir;
                    }
                    None => return,
                }
            }
        }
    }

    // Restores balance at `node` after its `shorter` subtree lost one level.
    //
    // Returns `true` if the subtree formerly rooted at `node` is now one level shorter, in which
    // case the imbalance propagates to its parent.
    unsafe fn rebalance_removed_at(&mut self, node: NonNull<T>, shorter: Dir) -> bool {
        unsafe {
            let taller = !shorter;
            let balance = self.links(node).balance() + taller.balance_delta();

            if balance == taller.balance_delta() {
                // `node` was balanced. It now leans away from `shorter` but keeps its height.
                self.links_mut(node).set_balance(balance);
                return false;
            }

            if balance == 0 {
                // `node` leaned towards `shorter`, which has now caught down.
                self.links_mut(node).set_balance(0);
                return true;
            }

            // `node` is two levels taller on the `taller` side.
            let sibling = self
                .links(node)
                .child(taller)
                .expect("taller side should have a child");
            let sibling_balance = self.links(sibling).balance();

            if sibling_balance == taller.balance_delta() {
                trace!(pivot = ?node.as_ref().key(), ?shorter, "remove: single rotation");

                self.rotate(node, shorter);
                self.links_mut(node).set_balance(0);
                self.links_mut(sibling).set_balance(0);

                true
            } else if sibling_balance == 0 {
                trace!(
                    pivot = ?node.as_ref().key(),
                    ?shorter,
                    "remove: single rotation, height preserved"
                );

                self.rotate(node, shorter);
                self.links_mut(node).set_balance(taller.balance_delta());
                self.links_mut(sibling).set_balance(shorter.balance_delta());

                false
            } else {
                let nephew = self
                    .links(sibling)
                    .child(shorter)
                    .expect("sibling leaning towards `shorter` should have a child there");
                let nephew_balance = self.links(nephew).balance();

                trace!(
                    pivot = ?node.as_ref().key(),
                    ?shorter,
                    nephew_balance,
                    "remove: double rotation"
                );

                self.rotate(sibling, taller);
                self.rotate(node, shorter);

                let (node_balance, sibling_balance) = match nephew_balance {
                    b if b == shorter.balance_delta() => (0, taller.balance_delta()),
                    b if b == taller.balance_delta() => (shorter.balance_delta(), 0),
                    _ => (0, 0),
                };

                self.links_mut(node).set_balance(node_balance);
                self.links_mut(sibling).set_balance(sibling_balance);
                self.links_mut(nephew).set_balance(0);

                true
            }
        }
    }

    // Exchanges the tree positions of `a` and `b`, including their balances.
    //
    // The balance of a node describes the shape of the subtree at its position, so it moves with
    // the position rather than with the node.
    unsafe fn swap_positions(&mut self, a: NonNull<T>, b: NonNull<T>) {
        unsafe {
            self.swap_links(a, b);

            let a_balance = self.links(a).balance();
            let b_balance = self.links_mut(b).set_balance(a_balance);
            self.links_mut(a).set_balance(b_balance);
        }
    }

    // Exchanges the parent and child links of `a` and `b`, and repoints their neighbors.
    //
    // `a` and `b` may be adjacent, and either may be the root.
    unsafe fn swap_links(&mut self, a: NonNull<T>, b: NonNull<T>) {
        if same_node(a, b) {
            return;
        }

        unsafe {
            let a_pos = self.position(a);
            let b_pos = self.position(b);
            let a_children = [self.links(a).left(), self.links(a).right()];
            let b_children = [self.links(b).left(), self.links(b).right()];

            // Links between `a` and `b` themselves must be flipped too.
            let swapped = |link: Link<T>| match link {
                Some(x) if same_node(x, a) => Some(b),
                Some(x) if same_node(x, b) => Some(a),
                other => other,
            };

            for (node, pos, children) in [(a, b_pos, b_children), (b, a_pos, a_children)] {
                let links = self.links_mut(node);
                links.set_parent(swapped(pos.map(|(parent, _)| parent)));
                links.set_left(swapped(children[0]));
                links.set_right(swapped(children[1]));
            }

            for (node, pos) in [(a, b_pos), (b, a_pos)] {
                match pos {
                    None => self.root = Some(node),
                    Some((parent, _)) if same_node(parent, a) || same_node(parent, b) => {}
                    Some((parent, dir)) => {
                        self.links_mut(parent).set_child(dir, Some(node));
                    }
                }

                for child in [self.links(node).left(), self.links(node).right()] {
                    self.maybe_set_parent(child, Some(node));
                }
            }
        }
    }

    // Returns the parent of `node` and the side of the parent it hangs from.
    unsafe fn position(&self, node: NonNull<T>) -> Option<(NonNull<T>, Dir)> {
        unsafe {
            self.links(node)
                .parent()
                .map(|parent| (parent, self.which_child(parent, Some(node))))
        }
    }

    // Performs a rotation at `node`, moving it down towards `dir` and moving its `!dir` child up
    // into its place. `Dir::Right` is a right rotation and `Dir::Left` a left rotation.
    //
    // Does nothing if `node` has no `!dir` child. The balances of the affected nodes are not
    // updated.
    unsafe fn rotate(&mut self, node: NonNull<T>, dir: Dir) {
        unsafe {
            let Some(up) = self.links(node).child(!dir) else {
                return;
            };

            trace!(
                down = ?node.as_ref().key(),
                up = ?up.as_ref().key(),
                ?dir,
                "rotate"
            );

            // `across` goes from the `dir` child of `up` to the `!dir` child of `node`.
            let across = self.links(up).child(dir);
            self.links_mut(node).set_child(!dir, across);
            self.maybe_set_parent(across, Some(node));

            let parent = self.links_mut(node).set_parent(Some(up));
            self.links_mut(up).set_child(dir, Some(node));
            self.links_mut(up).set_parent(parent);

            self.replace_child_or_set_root(parent, node, Some(up));
        }
    }

    // Puts `new` in the place of the linked node `old`, which is unlinked and returned.
    unsafe fn replace(&mut self, old: NonNull<T>, new: NonNull<T>) -> T::Handle {
        unsafe {
            // Read the old node's links.
            let parent = self.links(old).parent();
            let left = self.links(old).left();
            let right = self.links(old).right();
            let balance = self.links(old).balance();

            // Link the new node into the tree.
            self.replace_child_or_set_root(parent, old, Some(new));
            self.maybe_set_parent(left, Some(new));
            self.maybe_set_parent(right, Some(new));

            let links = self.links_mut(new);
            links.set_parent(parent);
            links.set_left(left);
            links.set_right(right);
            links.set_balance(balance);

            // Deinit the old node's links.
            self.links_mut(old).clear();

            T::from_ptr(old)
        }
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                // Descend to the minimum node.
                let cur = self.extreme_in_subtree(cur, Dir::Left);
                let parent = self.links(cur).parent();
                let right = self.links(cur).right();

                // Elevate the node's right child (which may be None).
                self.replace_child_or_set_root(parent, cur, right);
                self.maybe_set_parent(right, parent);

                // Drop the node.
                self.links_mut(cur).clear();
                drop(T::from_ptr(cur));
                self.len -= 1;

                // If the node had no right child, climb to the parent. If the node had no parent,
                // the tree is empty.
                opt_cur = right.or(parent);
            }
        }

        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len(), 0);
    }

    // Support methods ========================================================

    #[inline]
    pub(crate) unsafe fn links<'a>(&self, node: NonNull<T>) -> &'a Links<T> {
        unsafe { T::links(node).as_ref() }
    }

    #[inline]
    pub(crate) unsafe fn links_mut<'a>(&mut self, node: NonNull<T>) -> &'a mut Links<T> {
        unsafe { T::links(node).as_mut() }
    }

    unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { self.links_mut(node).set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    #[inline]
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<T>,
        old_child: NonNull<T>,
        new_child: Option<NonNull<T>>,
    ) {
        unsafe {
            let dir = self.which_child(parent, Some(old_child));

            debug_assert!(
                same_link(self.links(parent).child(dir), Some(old_child)),
                "`old_child` must be a child of `parent`"
            );
            debug_assert!(
                new_child.is_none() || !same_link(self.links(parent).child(!dir), new_child),
                "`new_child` must not be a child of `parent`"
            );

            self.links_mut(parent).set_child(dir, new_child);
        }
    }

    // Returns the node furthest in direction `dir` within the subtree rooted at `root`.
    #[inline]
    unsafe fn extreme_in_subtree(&self, root: NonNull<T>, dir: Dir) -> NonNull<T> {
        let mut cur = root;

        while let Some(next) = unsafe { self.links(cur).child(dir) } {
            cur = next;
        }

        cur
    }

    // Returns the in-order neighbor of `node` in direction `dir`.
    unsafe fn neighbor_raw(&self, node: NonNull<T>, dir: Dir) -> Link<T> {
        unsafe {
            if let Some(child) = self.links(node).child(dir) {
                return Some(self.extreme_in_subtree(child, !dir));
            }

            // Ascend until arriving from the `!dir` side.
            let mut cur = node;
            while let Some(parent) = self.links(cur).parent() {
                if self.which_child(parent, Some(cur)) == !dir {
                    return Some(parent);
                }

                cur = parent;
            }

            None
        }
    }

    pub(crate) unsafe fn predecessor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe { self.neighbor_raw(node, Dir::Left) }
    }

    pub(crate) unsafe fn successor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe { self.neighbor_raw(node, Dir::Right) }
    }

    unsafe fn which_child(&self, parent: NonNull<T>, child: Link<T>) -> Dir {
        if same_link(unsafe { self.links(parent).left() }, child) {
            Dir::Left
        } else {
            Dir::Right
        }
    }
}

impl<T> Default for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AvlTree<T>
where
    T: TreeNode<Links<T>> + fmt::Debug + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T> Drop for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                balance: 0,
                _unpin: PhantomPinned,
            }),
        }
    }

    #[inline]
    fn balance(&self) -> i8 {
        unsafe { (*self.inner.get()).balance }
    }

    #[inline]
    fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_left(&mut self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&mut self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn set_balance(&mut self, balance: i8) -> i8 {
        mem::replace(&mut self.inner.get_mut().balance, balance)
    }

    // Records that the `dir` subtree grew one level taller, returning the new balance.
    #[inline]
    fn adjust_balance(&mut self, dir: Dir) -> i8 {
        let inner = self.inner.get_mut();
        inner.balance += dir.balance_delta();
        debug_assert!((-2..=2).contains(&inner.balance));
        inner.balance
    }

    fn clear(&mut self) {
        let inner = self.inner.get_mut();
        inner.parent = None;
        inner.children = [None; 2];
        inner.balance = 0;
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .field("balance", &self.balance())
            .finish()
    }
}
