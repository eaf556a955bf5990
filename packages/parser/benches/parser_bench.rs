use criterion::{black_box, criterion_group, criterion_main, Criterion};
use idyll_parser::{parse, serialize};

fn document_source(paragraphs: usize) -> String {
    let mut source = String::from(r#"<document id="bench">"#);
    for i in 0..paragraphs {
        source.push_str(&format!(
            r#"<p id="p{i}">Paragraph {i} with <b>bold</b>, <i>italic <u>nested</u></i> and <variable name="v{i}" prompt="Value {i}?"/></p>"#
        ));
        if i % 10 == 0 {
            source.push_str(&format!(
                r#"<fncall id="f{i}" idyll-fn="tools:step"><params><![CDATA[{{"index": {i}, "tags": ["a", "b"]}}]]></params><content>Run step {i}</content></fncall>"#
            ));
        }
    }
    source.push_str("</document>");
    source
}

fn parse_small_document(c: &mut Criterion) {
    let source = document_source(5);
    c.bench_function("parse_small_document", |b| b.iter(|| parse(black_box(&source))));
}

fn parse_large_document(c: &mut Criterion) {
    let source = document_source(500);
    c.bench_function("parse_large_document", |b| b.iter(|| parse(black_box(&source))));
}

fn serialize_large_document(c: &mut Criterion) {
    let doc = parse(&document_source(500)).unwrap();
    c.bench_function("serialize_large_document", |b| b.iter(|| serialize(black_box(&doc))));
}

criterion_group!(benches, parse_small_document, parse_large_document, serialize_large_document);
criterion_main!(benches);
