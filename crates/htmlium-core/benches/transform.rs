//! Benchmarks for the transform pipeline.

#![allow(clippy::format_push_string)] // Benchmark setup code, performance not critical

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use htmlium_config::Config;
use htmlium_core::{FragmentMap, Processor};

const CARD: &str = r#"<article class="card">
  <h2>{{title}}</h2>
  {{#if subtitle}}<p>{{subtitle}}</p>{{#else}}<p>untitled</p>{{/if}}
  <ul>{{#each tags}}<li>{{@index}}: {{this}}</li>{{/each}}</ul>
</article>"#;

/// Page with `definitions` local components and `sites` usages of them.
fn generate_page(definitions: usize, sites: usize) -> String {
    let mut page = String::with_capacity(definitions * 200 + sites * 120);
    for i in 0..definitions {
        page.push_str(&format!(
            r#"<htmlium-set component="card-{i}">{CARD}</htmlium-set>"#
        ));
    }
    page.push_str("<main>\n");
    for i in 0..sites {
        let name = i % definitions.max(1);
        page.push_str(&format!(
            r#"<htmlium loadcomponent="card-{name}" title="Card {i}" subtitle="Sub" tags="[1,2,3]" />
"#
        ));
    }
    page.push_str("</main>\n");
    page
}

fn bench_transform_simple(c: &mut Criterion) {
    let processor = Processor::default();
    let page = r#"<htmlium-set component="hello">Hello {{name}}</htmlium-set><p><htmlium loadcomponent="hello" name="World"></p>"#;

    c.bench_function("transform_simple", |b| {
        b.iter(|| processor.transform(page));
    });
}

fn bench_transform_by_size(c: &mut Criterion) {
    let processor = Processor::default();
    let mut group = c.benchmark_group("transform_by_size");

    for (definitions, sites) in [(1, 10), (10, 100), (50, 900)] {
        let page = generate_page(definitions, sites);
        group.throughput(Throughput::Bytes(page.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("page", format!("{definitions}d_{sites}s")),
            &page,
            |b, page| b.iter(|| processor.transform(page)),
        );
    }

    group.finish();
}

fn bench_sanitize_toggle(c: &mut Criterion) {
    let page = generate_page(10, 100);

    let sanitized = Processor::default();
    let mut config = Config::default();
    config.security.sanitize_html = false;
    config.interpolation.sanitize = false;
    let raw = Processor::new(config);

    let mut group = c.benchmark_group("sanitize");
    group.bench_function("enabled", |b| b.iter(|| sanitized.transform(&page)));
    group.bench_function("disabled", |b| b.iter(|| raw.transform(&page)));
    group.finish();
}

fn bench_external_components(c: &mut Criterion) {
    let mut processor = Processor::default();
    let external: FragmentMap = (0..50)
        .map(|i| (format!("card-{i}"), CARD.to_owned()))
        .collect();
    processor.set_external_components(external);

    let page = generate_page(0, 100);

    c.bench_function("transform_external_100_sites", |b| {
        b.iter(|| processor.transform(&page));
    });
}

criterion_group!(
    benches,
    bench_transform_simple,
    bench_transform_by_size,
    bench_sanitize_toggle,
    bench_external_components,
);
criterion_main!(benches);
