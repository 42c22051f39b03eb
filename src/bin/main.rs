use std::ptr::NonNull;

use cordyceps::Linked;
use cordyceps_avl::{AvlMap, AvlTree, Links, TreeNode};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
#[repr(C)]
struct DemoNode {
    links: Links<DemoNode>,
    key: u32,
}

impl DemoNode {
    fn new(key: u32) -> Box<DemoNode> {
        Box::new(DemoNode {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<DemoNode>> for DemoNode {
    type Handle = Box<DemoNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::new(Box::into_raw(r)).unwrap()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<DemoNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<DemoNode>> for DemoNode {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

// Run with `RUST_LOG=cordyceps_avl=trace` to see every rotation.
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut tree: AvlTree<DemoNode> = AvlTree::new();

    for key in [3, 1, 2, 4, 5, 6, 7] {
        tree.insert(DemoNode::new(key));
        tree.assert_invariants();
        println!(
            "insert {key}: {:?} (height {})",
            tree.iter().map(|node| node.key).collect::<Vec<_>>(),
            tree.height()
        );
    }

    let mut graph = String::new();
    tree.dotgraph("demo", &mut graph).unwrap();
    println!("{graph}");

    for key in [4, 1, 9] {
        let removed = tree.remove(&key).map(|node| node.key);
        tree.assert_invariants();
        println!("remove {key}: {removed:?} (height {})", tree.height());
    }

    // 4 was removed, so its neighbors are now adjacent.
    println!(
        "around 4: {:?} < 4 < {:?}",
        tree.predecessor(&4).map(|node| node.key),
        tree.successor(&4).map(|node| node.key)
    );

    drop(tree);

    let mut map = AvlMap::new();
    map.insert("alpha", 1);
    map.insert("beta", 2);
    map.insert("alpha", 3);
    *map.entry("gamma").or_insert(0) += 10;
    map.entry("beta").and_modify(|value| *value *= 2);
    println!("{map:?}");

    match map.try_get("delta") {
        Ok(value) => println!("delta = {value}"),
        Err(error) => println!("delta: {error}"),
    }
}
