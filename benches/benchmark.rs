use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

use linked_avl::AvlTree;

const N: usize = 100_000;

pub fn benchmarks(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let values: Vec<i32> = (1..=N).map(|_| rng.gen()).collect();

    c.bench_function("tree_put", |b| {
        let mut tree = AvlTree::new();
        b.iter(|| {
            for value in &values {
                tree.put(*value, *value);
            }
        })
    });

    c.bench_function("tree_put_ascending", |b| {
        b.iter(|| {
            let mut tree = AvlTree::new();
            for value in 0..N {
                tree.put(value, value);
            }
            black_box(tree.height())
        })
    });

    let mut tree = AvlTree::new();
    for value in &values {
        tree.put(*value, *value);
    }

    c.bench_function("tree_find", |b| {
        b.iter(|| {
            for value in &values {
                black_box(tree.find(value));
            }
        })
    });

    c.bench_function("tree_next_node", |b| {
        b.iter(|| {
            let mut current = tree.first_node();
            while let Some(node) = current {
                black_box(node.value());
                current = tree.next_node(node);
            }
        })
    });

    c.bench_function("tree_delete", |b| {
        b.iter(|| {
            let mut tree = tree.clone();
            for value in &values {
                tree.delete(value);
            }
        })
    });
}

criterion_group!(benches, benchmarks);
criterion_main!(benches);
