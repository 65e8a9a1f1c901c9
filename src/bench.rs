//! Rough floating point throughput measurements, used to estimate how large a network
//! the current machine can evaluate.

use std::{
    hint::black_box,
    time::{Duration, Instant},
};

use rayon::prelude::*;

/// Operations performed between clock checks.
const BATCH: u64 = 1000;

/// Nodes per layer assumed by [`estimate_max_layers`].
pub const NODES_PER_LAYER: u64 = 1000;

/// Operations per second for one precision, single-threaded and across the rayon pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Throughput {
    pub single: u64,
    pub multi: u64,
}

impl Throughput {
    pub fn max_layers(&self) -> (u64, u64) {
        (estimate_max_layers(self.single), estimate_max_layers(self.multi))
    }
}

/// Results of [`run_benchmark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BenchmarkReport {
    pub f32_ops: Throughput,
    pub f64_ops: Throughput,

    /// Number of rayon workers used for the multi-threaded runs.
    pub workers: usize,
}

impl std::fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (name, t) in [("f32", self.f32_ops), ("f64", self.f64_ops)] {
            let (single_layers, multi_layers) = t.max_layers();
            writeln!(
                f,
                "{name}: {} ops/s single, {} ops/s on {} workers (max layers {} / {})",
                format_number(t.single),
                format_number(t.multi),
                self.workers,
                format_number(single_layers),
                format_number(multi_layers),
            )?;
        }

        Ok(())
    }
}

macro_rules! multiply_add {
    ($name:ident, $t:ty) => {
        fn $name(count: u64) -> u64 {
            let (mut a, mut b): ($t, $t) = (1.1, 2.2);
            for _ in 0..count {
                a *= b;
                b += a;
            }
            black_box((a, b));
            count
        }
    };
}

multiply_add!(multiply_add_f32, f32);
multiply_add!(multiply_add_f64, f64);

// counts operations until `duration` has elapsed.
fn spin(duration: Duration, op: fn(u64) -> u64) -> u64 {
    let start = Instant::now();
    let mut ops = 0;

    while start.elapsed() < duration {
        ops += op(BATCH);
    }

    ops
}

fn spin_parallel(duration: Duration, op: fn(u64) -> u64) -> u64 {
    (0..rayon::current_num_threads())
        .into_par_iter()
        .map(|_| spin(duration, op))
        .sum()
}

fn per_second(ops: u64, duration: Duration) -> u64 {
    let secs = duration.as_secs_f64();
    if secs <= 0. {
        return 0;
    }

    (ops as f64 / secs) as u64
}

/// Runs every measurement for `duration` each, so the whole run takes about four times `duration`.
pub fn run_benchmark(duration: Duration) -> BenchmarkReport {
    let measure = |op: fn(u64) -> u64| Throughput {
        single: per_second(spin(duration, op), duration),
        multi: per_second(spin_parallel(duration, op), duration),
    };

    let report = BenchmarkReport {
        f32_ops: measure(multiply_add_f32),
        f64_ops: measure(multiply_add_f64),
        workers: rayon::current_num_threads(),
    };

    log::info!("benchmark finished:\n{report}");
    report
}

/// How many fully connected layers of [`NODES_PER_LAYER`] nodes `ops` operations per second can evaluate.
pub fn estimate_max_layers(ops: u64) -> u64 {
    ops / (NODES_PER_LAYER * NODES_PER_LAYER)
}

/// Formats `n` with a `Thousand`/`Million`/`Billion`/`Trillion` suffix and two decimals.
pub fn format_number(n: u64) -> String {
    const UNITS: [(f64, &str); 4] = [
        (1e12, "Trillion"),
        (1e9, "Billion"),
        (1e6, "Million"),
        (1e3, "Thousand"),
    ];

    let x = n as f64;
    UNITS
        .iter()
        .find(|(scale, _)| x >= *scale)
        .map_or_else(|| n.to_string(), |(scale, unit)| format!("{:.2} {unit}", x / scale))
}
