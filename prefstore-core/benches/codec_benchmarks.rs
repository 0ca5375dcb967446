use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use prefstore_core::codec::{parse, write, Style};
use prefstore_core::{Key, Value, ValueMap};

/// A settings document shaped like an editor session: window geometry, a
/// recent-files list and per-file view state
fn session_document(files: usize) -> Value {
    let mut root = ValueMap::new();
    root.insert(
        Key::new("window.geometry").unwrap(),
        Value::List(vec![Value::from(120), Value::from(80), Value::from(1600), Value::from(900)]),
    );
    root.insert(Key::new("window.maximized").unwrap(), Value::from(false));
    root.insert(Key::new("theme").unwrap(), Value::from("solarized-dark"));

    let recent = (0..files)
        .map(|i| Value::from(format!("/home/user/projects/demo/src/module_{i}.rs")))
        .collect();
    root.insert(Key::new("recent.files").unwrap(), Value::List(recent));

    let mut views = ValueMap::new();
    for i in 0..files {
        let mut view = ValueMap::new();
        view.insert(Key::new("line").unwrap(), Value::from(i * 37));
        view.insert(Key::new("column").unwrap(), Value::from(i % 80));
        view.insert(Key::new("folded").unwrap(), Value::from(i % 3 == 0));
        views.insert(Key::new(format!("module_{i}.rs")).unwrap(), Value::Map(view));
    }
    root.insert(Key::new("views").unwrap(), Value::Map(views));
    Value::Map(root)
}

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");
    for files in [10, 100, 1000] {
        let doc = session_document(files);
        group.bench_with_input(BenchmarkId::new("indented", files), &doc, |b, doc| {
            b.iter(|| write(black_box(doc), Style::Indented))
        });
        group.bench_with_input(BenchmarkId::new("compact", files), &doc, |b, doc| {
            b.iter(|| write(black_box(doc), Style::Compact))
        });
    }
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for files in [10, 100, 1000] {
        let text = write(&session_document(files), Style::Indented);
        group.bench_with_input(BenchmarkId::from_parameter(files), &text, |b, text| {
            b.iter(|| parse(black_box(text)).unwrap())
        });
    }

    let commented = "// generated\n{\n  /* block */ \"a\": 1, // trailing\n  \"b\": [true, false,],\n}\n".to_string();
    group.bench_function("comments", |b| b.iter(|| parse(black_box(&commented)).unwrap()));
    group.finish();
}

criterion_group!(benches, bench_write, bench_parse);
criterion_main!(benches);
