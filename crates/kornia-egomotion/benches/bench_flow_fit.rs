use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use kornia_egomotion::{
    analyze_linear_flow_field, fit_linear_flow_field, FlowFieldConfig, FlowVector, ImageSize,
    PlaneModel, RansacParams,
};

/// Generate flow vectors on a diverging field with every tenth vector corrupted.
fn generate_flow_data(n: usize) -> Vec<FlowVector> {
    let pu = PlaneModel::new(0.01, 0.001, 2.0);
    let pv = PlaneModel::new(-0.002, 0.012, 1.0);
    (0..n)
        .map(|i| {
            let x = ((i * 37) % 320) as f64 + 0.5;
            let y = ((i * 53) % 240) as f64 + 0.25;
            let mut flow = [pu.evaluate(x, y), pv.evaluate(x, y)];
            if i % 10 == 0 {
                flow[0] += 25.0;
            }
            FlowVector::new([x, y], flow)
        })
        .collect()
}

fn bench_fit_linear_flow_field(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit_linear_flow_field");
    let params = RansacParams {
        random_seed: Some(0),
        ..Default::default()
    };
    for &n in &[25, 50, 200] {
        let vectors = generate_flow_data(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let _ = std::hint::black_box(fit_linear_flow_field(&vectors, &params));
            });
        });
    }
    group.finish();
}

fn bench_analyze_linear_flow_field(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze_linear_flow_field");
    let size = ImageSize {
        width: 320,
        height: 240,
    };
    let config = FlowFieldConfig {
        ransac: RansacParams {
            n_iterations: 100,
            random_seed: Some(0),
            ..Default::default()
        },
        ..Default::default()
    };
    for &n in &[50, 200] {
        let vectors = generate_flow_data(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let _ = std::hint::black_box(analyze_linear_flow_field(
                    &vectors,
                    size,
                    [0.0, 0.0],
                    &config,
                ));
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_fit_linear_flow_field,
    bench_analyze_linear_flow_field
);
criterion_main!(benches);
