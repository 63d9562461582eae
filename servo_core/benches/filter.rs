use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use servo_core::{CoefficientSet, FilterBank, FilterWidths};

// Synthetic error signal: triangle wave with xorshift noise, in ADC counts.
fn synth_samples(n: usize, noise_amp: i32, seed: u32) -> Vec<i32> {
    let mut state = seed.max(1);
    let mut next = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        x
    };
    (0..n)
        .map(|i| {
            let phase = (i % 2000) as i32;
            let tri = if phase < 1000 { phase * 30 } else { (2000 - phase) * 30 } - 15_000;
            let noise = (next() % (2 * noise_amp as u32 + 1)) as i32 - noise_amp;
            tri + noise
        })
        .collect()
}

fn bank() -> FilterBank {
    let mut bank = FilterBank::new(FilterWidths::default(), 8);
    let c = CoefficientSet {
        gain: 3000,
        integrator: 2040,
        zero: -1500,
        offset: 1 << 10,
        ..CoefficientSet::default()
    };
    for ch in 0..8 {
        for p in 0..2 {
            bank.set_coefficients(ch, p, c).expect("bench coefficients");
        }
    }
    bank
}

pub fn bench_compute(c: &mut Criterion) {
    let mut g = c.benchmark_group("iir_compute");
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p servo_core --bench filter
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

    let samples = synth_samples(8 * 4096, 200, 0xC0FFEE);

    for &profile in &[0usize, 1] {
        g.bench_function(format!("eight_channels_profile_{profile}"), |b| {
            b.iter_batched(
                bank,
                |mut bank| {
                    for (i, &s) in samples.iter().enumerate() {
                        let y = bank.compute(i % 8, profile, black_box(s));
                        let _ = black_box(y);
                    }
                },
                BatchSize::SmallInput,
            )
        });
    }
    g.finish();
}

criterion_group!(filter, bench_compute);
criterion_main!(filter);
