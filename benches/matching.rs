use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use midsearch::model::target::TargetIdentifier;
use midsearch::parser::header::HeaderBlock;
use midsearch::search::deep::verify;

fn thread_headers(depth: usize) -> Vec<u8> {
    let references: Vec<String> = (0..depth).map(|i| format!("<r{i}@lists.example>")).collect();
    format!(
        "Message-ID: <reply@lists.example>\r\n\
From: Alice <alice@lists.example>\r\n\
To: list@lists.example\r\n\
Subject: =?UTF-8?Q?Re=3A_caf=C3=A9?=\r\n\
Date: Tue, 13 Feb 2024 21:21:26 +0000\r\n\
In-Reply-To: <r{}@lists.example>\r\n\
References: {}\r\n\r\n",
        depth.saturating_sub(1),
        references.join("\r\n ")
    )
    .into_bytes()
}

fn bench_parse_headers(c: &mut Criterion) {
    let raw = thread_headers(50);
    c.bench_function("parse_header_block", |b| {
        b.iter(|| HeaderBlock::parse(black_box(&raw)))
    });
}

fn bench_verify(c: &mut Criterion) {
    let block = HeaderBlock::parse(&thread_headers(50));
    let deep = TargetIdentifier::parse("r0@lists.example").unwrap();
    let absent = TargetIdentifier::parse("nowhere@lists.example").unwrap();

    c.bench_function("verify_first_reference", |b| {
        b.iter(|| verify(black_box(&block), black_box(&deep)))
    });
    c.bench_function("verify_absent", |b| {
        b.iter(|| verify(black_box(&block), black_box(&absent)))
    });
}

criterion_group!(benches, bench_parse_headers, bench_verify);
criterion_main!(benches);
