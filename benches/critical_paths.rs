//! Criterion benchmarks for sitepack critical paths
//!
//! Benchmarks the operations that run on every build and every watch event:
//! - Discovery: pattern set evaluation and tree enumeration
//! - Includes: `@@include` splicing
//! - Styles: lightningcss processing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sitepack::build::PatternSet;
use sitepack::transforms::css::{browsers_from_targets, process_css};
use sitepack::transforms::include::resolve_includes;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =============================================================================
// Test Data Generators
// =============================================================================

/// Create `n` stylesheets spread over nested directories, a third of them partials.
fn make_style_tree(root: &Path, n: usize) {
    for i in 0..n {
        let dir = root.join(format!("src/styles/section_{}", i % 8));
        fs::create_dir_all(&dir).unwrap();
        let name = if i % 3 == 0 { format!("_part_{}.css", i) } else { format!("page_{}.css", i) };
        fs::write(dir.join(name), ".a { color: red }").unwrap();
    }
}

/// A page with `n` includes of a small partial.
fn make_page(root: &Path, n: usize) -> String {
    fs::create_dir_all(root.join("templates")).unwrap();
    fs::write(root.join("templates/card.html"), "<div class=\"card\">@@title</div>").unwrap();
    (0..n)
        .map(|i| format!("@@include('templates/card.html', {{\"title\": \"Card {}\"}})\n", i))
        .collect()
}

/// A stylesheet of `n` nested rules.
fn make_stylesheet(n: usize) -> String {
    (0..n)
        .map(|i| format!(".card-{} {{ display: flex; .title {{ color: #ff0000; }} }}\n", i))
        .collect()
}

fn style_patterns(root: &Path) -> PatternSet {
    PatternSet::new(root, &["src/styles/**/*.css", "!src/styles/**/_*.css", "!src/styles/libs/**/*"])
        .unwrap()
}

// =============================================================================
// Discovery Benchmarks
// =============================================================================

fn bench_discovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("discovery");

    let temp = TempDir::new().unwrap();
    let set = style_patterns(temp.path());
    let paths: Vec<PathBuf> = (0..100)
        .map(|i| temp.path().join(format!("src/styles/section_{}/_page_{}.css", i % 8, i)))
        .collect();

    group.throughput(Throughput::Elements(paths.len() as u64));
    group.bench_function("selects_100", |b| {
        b.iter(|| paths.iter().filter(|p| set.selects(black_box(p))).count())
    });

    for size in [50, 500] {
        let temp = TempDir::new().unwrap();
        make_style_tree(temp.path(), size);
        let set = style_patterns(temp.path());

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("discover", size), &set, |b, set| {
            b.iter(|| set.discover().unwrap())
        });
    }

    group.finish();
}

// =============================================================================
// Include Benchmarks
// =============================================================================

fn bench_includes(c: &mut Criterion) {
    let mut group = c.benchmark_group("includes");

    for count in [10, 100] {
        let temp = TempDir::new().unwrap();
        let page = make_page(temp.path(), count);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("resolve", count), &page, |b, page| {
            b.iter(|| resolve_includes(black_box(page), temp.path(), None).unwrap())
        });
    }

    group.finish();
}

// =============================================================================
// Style Benchmarks
// =============================================================================

fn bench_styles(c: &mut Criterion) {
    let mut group = c.benchmark_group("styles");

    let targets: BTreeMap<String, String> =
        [("chrome", "80"), ("firefox", "72"), ("safari", "13")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
    let browsers = browsers_from_targets(&targets).unwrap();

    for rules in [10, 200] {
        let sheet = make_stylesheet(rules);
        group.throughput(Throughput::Bytes(sheet.len() as u64));
        group.bench_with_input(BenchmarkId::new("process_minified", rules), &sheet, |b, sheet| {
            b.iter(|| process_css(black_box(sheet), "bench.css", browsers, true).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_discovery, bench_includes, bench_styles);
criterion_main!(benches);
