//! Benchmark for classification and line parsing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use probestat::engine::{classify, ProbeRecord, StructuredStatus};

const MESSAGES: &[&str] = &[
    "dial tcp 10.0.0.1:443: connect: connection refused",
    "read tcp 10.0.0.1:443: i/o timeout",
    "tls: oversized record received with length 29805",
    "remote error: tls: alert(112)",
    "some message nothing recognises at all",
    "",
];

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");

    for message in MESSAGES {
        let record = ProbeRecord::new(
            "10.0.0.1",
            "example.com",
            *message,
            Some(StructuredStatus::Other),
        );
        let id = if message.is_empty() { "empty" } else { message };
        group.bench_with_input(BenchmarkId::new("message", id), &record, |b, record| {
            b.iter(|| black_box(classify(black_box(record))));
        });
    }

    group.finish();
}

fn bench_parse_line(c: &mut Criterion) {
    let flat = r#"{"ip":"10.0.0.1","domain":"example.com","raw":"EOF","status":"io-error"}"#;
    let zgrab = r#"{"ip":"10.0.0.1","domain":"example.com","data":{"tls":{"status":"application-error","error":"remote error: handshake failure","timestamp":"2021-01-01T00:00:00Z"}}}"#;

    c.bench_function("parse_line_flat", |b| {
        b.iter(|| black_box(ProbeRecord::parse_line(black_box(flat))))
    });
    c.bench_function("parse_line_zgrab", |b| {
        b.iter(|| black_box(ProbeRecord::parse_line(black_box(zgrab))))
    });
}

criterion_group!(benches, bench_classify, bench_parse_line);
criterion_main!(benches);
