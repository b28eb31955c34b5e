// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Benchmark of the distributed sort.
//!
//! Generates random multi-column data, sorts it with the in-memory and the
//! disk shuffle store, and reports timings and how evenly rows spread over
//! the output partitions.
//!
//! Usage:
//!   cargo run --release --bin sort_bench -- --help
//!   cargo run --release --bin sort_bench -- --rows 1000000 --partitions 16

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata::arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use strata::prelude::*;
use tempfile::TempDir;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "sort_bench",
    about = "Benchmark of the sampling range-partitioned sort"
)]
struct SortBenchOpt {
    /// Number of rows to generate
    #[arg(short = 'r', long = "rows", default_value_t = 1_000_000)]
    rows: usize,

    /// Number of input partitions
    #[arg(short = 'i', long = "input-partitions", default_value_t = 8)]
    input_partitions: usize,

    /// Number of sort output partitions
    #[arg(short = 'p', long = "partitions", default_value_t = 16)]
    partitions: usize,

    /// Number of sort keys (1 to 3)
    #[arg(short = 'k', long = "keys", default_value_t = 2)]
    keys: usize,

    /// Rows sampled per input partition
    #[arg(short = 's', long = "sample-size", default_value_t = 32)]
    sample_size: usize,

    /// Number of iterations
    #[arg(short = 'n', long = "iterations", default_value_t = 3)]
    iterations: usize,

    /// Only run with the in-memory shuffle store
    #[arg(long = "memory-only")]
    memory_only: bool,

    /// Only run with the disk shuffle store
    #[arg(long = "disk-only")]
    disk_only: bool,
}

const KEY_COLUMNS: [&str; 3] = ["id", "score", "name"];

fn generate_columns(rows: usize, seed: u64) -> Vec<(&'static str, ArrayRef)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let ids: Vec<i64> = (0..rows).map(|_| rng.random_range(0..rows as i64 / 4 + 1)).collect();
    let scores: Vec<Option<f64>> = (0..rows)
        .map(|_| rng.random_bool(0.95).then(|| rng.random_range(0.0..100.0)))
        .collect();
    let names: Vec<String> = (0..rows)
        .map(|_| format!("name_{}", rng.random_range(0..1000)))
        .collect();
    vec![
        ("id", Arc::new(Int64Array::from(ids)) as ArrayRef),
        ("score", Arc::new(Float64Array::from(scores)) as ArrayRef),
        ("name", Arc::new(StringArray::from(names)) as ArrayRef),
    ]
}

struct RunStats {
    elapsed: Duration,
    partitions: usize,
    largest: usize,
}

async fn benchmark_sort(
    opt: &SortBenchOpt,
    config: StrataConfig,
    columns: Vec<(&'static str, ArrayRef)>,
) -> Result<RunStats> {
    let ctx = SessionContext::with_config(
        config
            .with_sort_sample_size(opt.sample_size)?
            .with_sort_target_partitions(opt.partitions)?,
    )?;
    let input = ctx
        .read_columns(columns)?
        .repartition(opt.input_partitions)?
        .collect()
        .await?;

    let keys = &KEY_COLUMNS[..opt.keys.clamp(1, KEY_COLUMNS.len())];
    let descending: Vec<bool> = (0..keys.len()).map(|i| i % 2 == 1).collect();
    let df = ctx.read_dataset(input)?.sort(keys, &descending)?;

    let start = Instant::now();
    let sorted = df.collect().await?;
    let elapsed = start.elapsed();

    let largest = sorted
        .partitions()
        .iter()
        .map(|p| p.num_rows())
        .max()
        .unwrap_or(0);
    Ok(RunStats {
        elapsed,
        partitions: sorted.num_partitions(),
        largest,
    })
}

fn print_results(label: &str, rows: usize, runs: &[RunStats]) {
    let times: Vec<Duration> = runs.iter().map(|r| r.elapsed).collect();
    let avg_time: Duration = times.iter().sum::<Duration>() / times.len().max(1) as u32;
    let min_time = times.iter().min().copied().unwrap_or_default();
    let max_time = times.iter().max().copied().unwrap_or_default();

    println!();
    println!("{label} Results:");
    println!("  Average time: {avg_time:?}");
    println!("  Min time: {min_time:?}");
    println!("  Max time: {max_time:?}");
    if let Some(last) = runs.last() {
        println!("  Output partitions: {}", last.partitions);
        println!(
            "  Largest partition: {} rows ({:.2}x the mean)",
            last.largest,
            last.largest as f64 * last.partitions as f64 / rows.max(1) as f64
        );
    }
    println!(
        "  Throughput: {:.2} Mrows/s",
        rows as f64 / avg_time.as_secs_f64().max(f64::EPSILON) / 1_000_000.0
    );
    println!();
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let opt = SortBenchOpt::parse();

    println!("Sort Benchmark Configuration:");
    println!("  Rows: {}", opt.rows);
    println!("  Input partitions: {}", opt.input_partitions);
    println!("  Output partitions: {}", opt.partitions);
    println!("  Sort keys: {}", opt.keys);
    println!("  Sample size: {}", opt.sample_size);
    println!("  Iterations: {}", opt.iterations);
    println!();

    println!("Generating test data...");
    let columns = generate_columns(opt.rows, 42);

    if !opt.disk_only {
        println!("=== In-Memory Shuffle Store ===");
        let mut runs = Vec::with_capacity(opt.iterations);
        for i in 0..opt.iterations {
            let stats = benchmark_sort(&opt, StrataConfig::default(), columns.clone()).await?;
            println!("  Iteration {}: {:?}", i + 1, stats.elapsed);
            runs.push(stats);
        }
        print_results("In-Memory", opt.rows, &runs);
    }

    if !opt.memory_only {
        println!("=== Disk Shuffle Store ===");
        let mut runs = Vec::with_capacity(opt.iterations);
        for i in 0..opt.iterations {
            let temp_dir = TempDir::new()?;
            let work_dir = temp_dir.path().to_str().ok_or("work dir is not UTF-8")?;
            let config = StrataConfig::default()
                .with_shuffle_store(ShuffleStoreKind::Disk)?
                .with_shuffle_work_dir(work_dir)?;
            let stats = benchmark_sort(&opt, config, columns.clone()).await?;
            println!("  Iteration {}: {:?}", i + 1, stats.elapsed);
            runs.push(stats);
        }
        print_results("Disk", opt.rows, &runs);
    }

    Ok(())
}
