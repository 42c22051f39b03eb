use core::{fmt, ptr::NonNull};

use crate::{AvlTree, Dir, Links, TreeNode};

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>>,
{
    /// Writes the tree as a Graphviz `digraph` named `name`.
    ///
    /// Nodes are numbered in pre-order and labelled `key:balance`. Each edge is labelled with the
    /// side of the parent it hangs from, `L` or `R`.
    pub fn dotgraph<W>(&self, name: &str, mut w: W) -> fmt::Result
    where
        W: fmt::Write,
        T::Key: fmt::Display,
    {
        writeln!(w, "digraph \"{name}\" {{")?;

        // Pending nodes with the id and side of their parent.
        let mut stack: Vec<(NonNull<T>, Option<(usize, Dir)>)> =
            self.root.map(|root| (root, None)).into_iter().collect();
        let mut next_id = 0_usize;

        while let Some((node, parent)) = stack.pop() {
            let id = next_id;
            next_id += 1;

            let (key, links) = unsafe { (node.as_ref().key(), self.links(node)) };
            writeln!(w, "    n{id} [label=\"{key}:{}\"];", links.balance())?;

            if let Some((parent, side)) = parent {
                let side = match side {
                    Dir::Left => 'L',
                    Dir::Right => 'R',
                };
                writeln!(w, "    n{parent} -> n{id} [label=\"{side}\"];")?;
            }

            // Right first, so the left subtree is written first.
            for dir in [Dir::Right, Dir::Left] {
                if let Some(child) = links.child(dir) {
                    stack.push((child, Some((id, dir))));
                }
            }
        }

        w.write_str("}\n")
    }
}
