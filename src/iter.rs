use core::iter::FusedIterator;

use crate::{AvlTree, Link, Links, TreeNode};

/// An iterator over the elements of an [`AvlTree`], in ascending key order.
///
/// Each step follows the in-order neighbor links, so a full traversal visits every edge at most
/// twice.
pub struct Iter<'tree, T: TreeNode<Links<T>> + ?Sized> {
    tree: &'tree AvlTree<T>,
    front: Link<T>,
    back: Link<T>,
    // Elements not yet yielded from either end.
    remaining: usize,
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iter<'tree, T> {
    pub(crate) fn new(tree: &'tree AvlTree<T>) -> Self {
        Iter {
            tree,
            front: tree.first_raw(),
            back: tree.last_raw(),
            remaining: tree.len(),
        }
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iterator for Iter<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let node = self.front?;
        self.remaining -= 1;
        self.front = unsafe { self.tree.successor_raw(node) };

        Some(unsafe { node.as_ref() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T: TreeNode<Links<T>> + ?Sized> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let node = self.back?;
        self.remaining -= 1;
        self.back = unsafe { self.tree.predecessor_raw(node) };

        Some(unsafe { node.as_ref() })
    }
}

impl<T: TreeNode<Links<T>> + ?Sized> ExactSizeIterator for Iter<'_, T> {}

impl<T: TreeNode<Links<T>> + ?Sized> FusedIterator for Iter<'_, T> {}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> IntoIterator for &'tree AvlTree<T> {
    type Item = &'tree T;
    type IntoIter = Iter<'tree, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::prelude::v1::*;

    use crate::model::TestNode;

    use super::*;

    fn tree_of(keys: impl IntoIterator<Item = u32>) -> AvlTree<TestNode> {
        let mut tree: AvlTree<TestNode> = AvlTree::new();
        for key in keys {
            tree.insert(TestNode::new(key));
        }
        tree
    }

    #[test]
    fn forward_and_reverse() {
        let tree = tree_of([4, 2, 6, 1, 3, 5, 7]);

        assert_eq!(
            tree.iter().map(|node| node.key).collect::<Vec<_>>(),
            [1, 2, 3, 4, 5, 6, 7]
        );
        assert_eq!(
            tree.iter().rev().map(|node| node.key).collect::<Vec<_>>(),
            [7, 6, 5, 4, 3, 2, 1]
        );
    }

    #[test]
    fn ends_meet_in_the_middle() {
        let tree = tree_of(0..5);
        let mut iter = tree.iter();

        assert_eq!(iter.len(), 5);
        assert_eq!(iter.next().map(|node| node.key), Some(0));
        assert_eq!(iter.next_back().map(|node| node.key), Some(4));
        assert_eq!(iter.next_back().map(|node| node.key), Some(3));
        assert_eq!(iter.next().map(|node| node.key), Some(1));
        assert_eq!(iter.len(), 1);
        assert_eq!(iter.next().map(|node| node.key), Some(2));

        assert!(iter.next().is_none());
        assert!(iter.next_back().is_none());
        assert_eq!(iter.size_hint(), (0, Some(0)));
    }

    #[test]
    fn empty_tree() {
        let tree = tree_of([]);

        assert!(tree.iter().next().is_none());
        assert!(tree.iter().next_back().is_none());
        assert_eq!((&tree).into_iter().count(), 0);
    }
}
