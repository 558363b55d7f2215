//! Benchmarks for membership matching and IP extraction.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ipinformer::config::{ListMethod, ListSourceConfig};
use ipinformer::matcher::match_ip;
use ipinformer::reader::extract_ip;
use ipinformer::registry::{ListSource, Registry};
use std::hint::black_box;

/// Generate distinct IPv4 addresses
fn generate_ips(count: usize, offset: usize) -> Vec<String> {
    (offset..offset + count)
        .map(|i| {
            format!(
                "{}.{}.{}.{}",
                (i >> 24) & 0xff,
                (i >> 16) & 0xff,
                (i >> 8) & 0xff,
                i & 0xff
            )
        })
        .collect()
}

fn build_registry(lists: usize, per_list: usize) -> Registry {
    let sources = (0..lists)
        .map(|l| {
            let short = format!("list{}", l);
            ListSource::from_config(&ListSourceConfig::new(
                &short,
                ListMethod::File,
                "/dev/null",
                &short,
            ))
            .with_members(generate_ips(per_list, l * per_list).into_iter().collect())
        })
        .collect();
    Registry::new(sources).unwrap()
}

fn bench_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_ip");

    for lists in [1, 5, 20] {
        let registry = build_registry(lists, 50_000);
        let hit = "0.0.0.42".to_string();
        let miss = "203.0.113.9".to_string();

        group.bench_with_input(BenchmarkId::new("hit", lists), &registry, |b, registry| {
            b.iter(|| match_ip(black_box(&hit), registry))
        });
        group.bench_with_input(BenchmarkId::new("miss", lists), &registry, |b, registry| {
            b.iter(|| match_ip(black_box(&miss), registry))
        });
    }

    group.finish();
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_ip");

    let lines = [
        ("plain", "192.0.2.17"),
        ("log_line", "Oct 16 10:22:01 gw kernel: DROP IN=eth0 SRC=198.51.100.4 DST=10.0.0.1"),
        ("ipv6", "connection from 2001:db8:85a3::8a2e:370:7334 refused"),
        ("no_ip", "the quick brown fox jumps over the lazy dog"),
    ];
    for (name, line) in lines {
        group.bench_function(name, |b| b.iter(|| extract_ip(black_box(line))));
    }

    group.finish();
}

criterion_group!(benches, bench_match, bench_extract);
criterion_main!(benches);
