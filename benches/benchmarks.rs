use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mcmctree::mcmctree::{read_mcmctree, ReaderOptions};
use mcmctree::priors::{estimate_cauchy, search_scale, CauchyOptions, CladeCalibration, ScaleGrid, ScaleSearch};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random annotated ultrametric tree with `n_tips` tips.
fn random_annotated_tree(n_tips: usize, seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut clades: Vec<(String, f64)> = (0..n_tips).map(|i| (format!("t{i}"), 0.0)).collect();
    while clades.len() > 1 {
        let j = rng.random_range(1..clades.len());
        let i = rng.random_range(0..j);
        let (b, hb) = clades.remove(j);
        let (a, ha) = clades.remove(i);
        let height = ha.max(hb) + rng.random_range(0.05..1.0);
        let text = format!(
            "({a}: {:.6}, {b}: {:.6}) [&95%HPD={{{:.6}, {:.6}}}]",
            height - ha,
            height - hb,
            0.8 * height,
            1.25 * height,
        );
        clades.push((text, height));
    }
    format!("UTREE 1 = {};", clades[0].0)
}

fn bench_read_mcmctree(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_mcmctree");
    group.sample_size(10);

    for n in [100, 1_000, 5_000] {
        let text = random_annotated_tree(n, 42);
        group.bench_function(format!("{n}_tips"), |b| {
            b.iter(|| read_mcmctree(black_box(&text), &ReaderOptions::default()).unwrap());
        });
    }

    group.finish();
}

fn bench_scale_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("scale_search");

    group.bench_function("grid", |b| {
        b.iter(|| {
            search_scale(
                black_box(0.6),
                black_box(1.2),
                0.1,
                1e-8,
                0.975,
                &ScaleGrid::default(),
                ScaleSearch::Grid,
            )
            .unwrap()
        });
    });

    group.bench_function("grid_refined", |b| {
        b.iter(|| {
            search_scale(
                black_box(0.6),
                black_box(1.2),
                0.1,
                1e-8,
                0.975,
                &ScaleGrid::default(),
                ScaleSearch::GridRefined,
            )
            .unwrap()
        });
    });

    group.finish();
}

fn bench_estimate_cauchy(c: &mut Criterion) {
    let mut group = c.benchmark_group("estimate_cauchy");
    group.sample_size(10);

    let tree = read_mcmctree(&random_annotated_tree(1_000, 7), &ReaderOptions::default())
        .unwrap()
        .tree;
    // one calibration per child clade of the root
    let calibrations: Vec<CladeCalibration> = tree
        .children(tree.root())
        .iter()
        .filter(|&&child| !tree.is_tip(child))
        .map(|&child| {
            let sig = &tree.clade_signatures()[child as usize];
            let tips: Vec<String> = (0..tree.num_tips() as u32)
                .filter(|&t| sig.contains(t))
                .filter_map(|t| tree.label(t).map(str::to_string))
                .collect();
            CladeCalibration::new(tips, 1.0, 2.0)
        })
        .collect();

    group.bench_function("1000_tips_root_children", |b| {
        b.iter(|| estimate_cauchy(black_box(&tree), &calibrations, &CauchyOptions::default()).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_read_mcmctree,
    bench_scale_search,
    bench_estimate_cauchy,
);
criterion_main!(benches);
