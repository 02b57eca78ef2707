use criterion::{criterion_group, criterion_main, Criterion};
use rfsnap::host::memory::{MemoryHost, MemoryNode, MemoryRasterizer, MemoryTransport};
use rfsnap::inliner::read_urls;
use rfsnap::style::ComputedStyle;
use rfsnap::RenderOptions;

fn wide_tree(rows: usize) -> MemoryNode {
    let row = |i: usize| {
        MemoryNode::element("li")
            .with_attr("id", &format!("row{}", i))
            .with_style(ComputedStyle::new().with_css_text("color: black; margin: 0px; padding: 2px 4px;"))
            .with_children([
                MemoryNode::text("item"),
                MemoryNode::element("img").with_attr("src", &format!("http://cdn/icon{}.png", i % 8)),
            ])
    };
    MemoryNode::element("ul")
        .with_scroll_size(320.0, rows as f64 * 20.0)
        .with_children((0..rows).map(row))
}

fn bench_to_svg(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime");
    let host = MemoryHost::new().with_transport(MemoryTransport::new().with_prefix_body("http://cdn/", vec![7u8; 256]));
    let tree = wide_tree(200);
    let options = RenderOptions::default();

    c.bench_function("to_svg_200_rows", |b| {
        b.iter(|| {
            let svg = rt.block_on(rfsnap::to_svg(&host, &tree, &options)).unwrap();
            criterion::black_box(svg);
        })
    });
}

fn bench_surface(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime");
    let host = MemoryHost::new()
        .with_transport(MemoryTransport::new().with_prefix_body("http://cdn/", vec![7u8; 256]))
        .with_rasterizer(MemoryRasterizer::new([20, 40, 60, 255]).at_css_size());
    let tree = wide_tree(20);
    let options = RenderOptions {
        scale: 2.0,
        background_color: Some("white".into()),
        ..Default::default()
    };

    let mut group = c.benchmark_group("raster");
    // each conversion waits for the settle delay
    group.sample_size(10);
    group.bench_function("to_png_scaled", |b| {
        b.iter(|| {
            let png = rt.block_on(rfsnap::to_png(&host, &tree, &options)).unwrap();
            criterion::black_box(png);
        })
    });
    group.finish();
}

fn bench_read_urls(c: &mut Criterion) {
    let css: String = (0..100)
        .map(|i| format!("@font-face {{ font-family: F{}; src: url('fonts/f{}.woff2') format('woff2'); }}\n", i, i))
        .collect();
    c.bench_function("read_urls_100_rules", |b| b.iter(|| criterion::black_box(read_urls(&css))));
}

criterion_group!(benches, bench_to_svg, bench_surface, bench_read_urls);
criterion_main!(benches);
