use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use gonio_core::{KappaGeometry, NativeCoords};

// Deterministic spread of reachable native positions
fn synth_positions(n: usize, seed: u32) -> Vec<NativeCoords> {
    let mut state = seed.max(1);
    let mut next = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        f64::from(x) / (f64::from(u32::MAX) + 1.0)
    };
    (0..n)
        .map(|_| {
            NativeCoords::new(
                next().mul_add(720.0, -360.0),
                next().mul_add(340.0, -170.0),
                next().mul_add(720.0, -360.0),
            )
        })
        .collect()
}

pub fn bench_kappa_transform(c: &mut Criterion) {
    let mut g = c.benchmark_group("kappa_transform");
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p gonio_core --bench transform
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(1));
        }
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }

    let positions = synth_positions(10_000, 0x00C0_FFEE);

    for &angle in &[24.0f64, 50.0, 60.0] {
        let geometry = match KappaGeometry::new(angle) {
            Ok(g) => g,
            Err(e) => panic!("bench geometry {angle}: {e}"),
        };
        g.bench_function(format!("k_to_e_{angle}"), |b| {
            b.iter(|| {
                for &p in &positions {
                    black_box(geometry.k_to_e(black_box(p)).ok());
                }
            });
        });
        g.bench_function(format!("round_trip_{angle}"), |b| {
            b.iter_batched(
                || positions.clone(),
                |ps| {
                    for p in ps {
                        let back = geometry.k_to_e(p).and_then(|s| geometry.e_to_k(s));
                        black_box(back.ok());
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
    g.finish();
}

criterion_group!(transform, bench_kappa_transform);
criterion_main!(transform);
