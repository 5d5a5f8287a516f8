use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::ptr;

use linked_avl::{AvlTree, Error};

/// System allocator that returns null while the current thread asks it to.
struct FailingAlloc;

thread_local! {
    static FAIL_ALLOC: Cell<bool> = const { Cell::new(false) };
}

unsafe impl GlobalAlloc for FailingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if FAIL_ALLOC.try_with(Cell::get).unwrap_or(false) {
            return ptr::null_mut();
        }
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: FailingAlloc = FailingAlloc;

struct FailGuard;

impl FailGuard {
    fn new() -> Self {
        FAIL_ALLOC.with(|fail| fail.set(true));
        FailGuard
    }
}

impl Drop for FailGuard {
    fn drop(&mut self) {
        FAIL_ALLOC.with(|fail| fail.set(false));
    }
}

/// Runs `f` with every allocation on this thread failing.
fn without_memory<R>(f: impl FnOnce() -> R) -> R {
    let _guard = FailGuard::new();
    f()
}

fn snapshot(tree: &AvlTree<u32, u32>) -> (usize, usize, Vec<u32>, *const u32) {
    let root = tree.root().unwrap().key() as *const u32;
    (tree.len(), tree.height(), tree.keys().copied().collect(), root)
}

#[test]
fn test_try_put_reports_alloc_failure() {
    let mut tree = AvlTree::new();
    for key in [50, 30, 70, 20, 40, 60, 80, 10] {
        tree.put(key, key * 2);
    }
    let before = snapshot(&tree);

    let result = without_memory(|| tree.try_put(5, 10));
    assert!(matches!(result, Err(Error::Alloc { .. })));
    if let Err(err) = result {
        assert!(err.layout().is_some());
    }

    assert_eq!(snapshot(&tree), before);
    assert!(!tree.contains_key(&5));
    assert_eq!(tree.first_node().map(|n| *n.key()), Some(10));
    assert!(tree.find(&10).unwrap().left().is_none());
    #[cfg(feature = "consistency_check")]
    tree.check_consistency();

    // Updating an existing key allocates nothing
    let result = without_memory(|| tree.try_put(40, 0));
    assert_eq!(result, Ok(Some(80)));
    assert_eq!(snapshot(&tree), before);
    assert_eq!(tree.get(&40), Some(&0));

    // The tree stays usable once memory is available again
    assert_eq!(tree.try_put(5, 10), Ok(None));
    assert_eq!(tree.len(), 9);
    assert_eq!(tree.first_node().map(|n| *n.key()), Some(5));
    #[cfg(feature = "consistency_check")]
    tree.check_consistency();
}

#[test]
fn test_try_put_into_empty_tree_reports_alloc_failure() {
    let mut tree = AvlTree::<u32, u32>::new();
    let result = without_memory(|| tree.try_put(1, 1));
    assert!(matches!(result, Err(Error::Alloc { .. })));
    assert!(tree.is_empty());
    assert!(tree.root().is_none());
    assert_eq!(tree.height(), 0);
}
