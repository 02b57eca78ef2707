use std::time::{Duration, Instant};

use rfsnap::host::memory::{MemoryHost, MemoryNode, MemoryRasterizer, MemoryTransport};
use rfsnap::host::{CssRule, SourceNode, StyleSheet};
use rfsnap::style::ComputedStyle;
use rfsnap::{Error, RenderOptions};

fn page() -> MemoryNode {
    MemoryNode::element("div")
        .with_attr("id", "root")
        .with_scroll_size(200.0, 100.0)
        .with_style(ComputedStyle::from_properties([
            ("border-left-width", "1px"),
            ("border-right-width", "1px"),
            ("border-top-width", "2px"),
            ("border-bottom-width", "2px"),
        ]))
        .with_children([
            MemoryNode::element("p").with_attr("id", "a").with_child(MemoryNode::text("one")),
            MemoryNode::element("p")
                .with_attr("class", "ad")
                .with_child(MemoryNode::element("img").with_attr("src", "http://ads/x.png")),
            MemoryNode::element("p").with_attr("id", "c").with_child(MemoryNode::text("three")),
        ])
}

#[tokio::test]
async fn filtered_subtrees_vanish_and_order_is_kept() {
    let host = MemoryHost::new();
    let options = RenderOptions::default()
        .with_filter(|n: &dyn SourceNode| n.attribute("class").as_deref() != Some("ad"));
    let svg = rfsnap::to_svg(&host, &page(), &options).await.expect("snapshot failed");

    assert!(svg.contains("<p id=\"a\">one</p><p id=\"c\">three</p>"));
    assert!(!svg.contains("ads"));
    assert!(host.memory_transport().requests().is_empty());
}

#[tokio::test]
async fn container_takes_borders_into_account() {
    let host = MemoryHost::new().with_transport(MemoryTransport::new().with_prefix_body("http://ads/", b"P".to_vec()));
    let svg = rfsnap::to_svg(&host, &page(), &RenderOptions::default()).await.unwrap();
    assert!(svg.starts_with(
        "data:image/svg+xml;charset=utf-8,<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"202\" height=\"104\">"
    ));
}

#[tokio::test]
async fn failed_image_fails_unless_placeholder_is_set() {
    let node = MemoryNode::element("div").with_child(MemoryNode::element("img").with_attr("src", "a.png"));
    let host = MemoryHost::new();

    let err = rfsnap::to_svg(&host, &node, &RenderOptions::default()).await.unwrap_err();
    match err {
        Error::FetchError { url, reason } => {
            assert_eq!(url, "a.png");
            assert_eq!(reason, "status 404");
        }
        other => panic!("unexpected error: {}", other),
    }

    let options = RenderOptions {
        image_placeholder: Some("data:image/png;base64,AAAA".into()),
        ..Default::default()
    };
    let svg = rfsnap::to_svg(&host, &node, &options).await.unwrap();
    assert!(svg.contains("<img src=\"data:image/png;base64,AAAA\" />"));
}

#[tokio::test]
async fn stalled_fetch_times_out_like_a_failed_one() {
    let node = MemoryNode::element("div").with_style(ComputedStyle::from_properties([(
        "background-image",
        "url(http://cdn/slow.gif)",
    )]));
    let host = MemoryHost::new().with_transport(MemoryTransport::new().with_stalled("http://cdn/slow.gif"));
    let options = RenderOptions {
        fetch_timeout_ms: 50,
        ..Default::default()
    };

    let err = rfsnap::to_svg(&host, &node, &options).await.unwrap_err();
    assert!(matches!(err, Error::FetchError { ref reason, .. } if reason.contains("timed out")));

    let options = RenderOptions {
        fetch_timeout_ms: 50,
        image_placeholder: Some("data:image/gif;base64,R0lG".into()),
        ..Default::default()
    };
    let svg = rfsnap::to_svg(&host, &node, &options).await.unwrap();
    assert!(svg.contains("background-image: url(data:image/gif;base64,R0lG);"));
}

#[tokio::test]
async fn fonts_are_embedded_and_blocked_sheets_skipped() {
    let host = MemoryHost::new()
        .with_transport(MemoryTransport::new().with_body("http://site/fonts/a.woff2", b"W".to_vec()))
        .with_blocked_style_sheet("cross-origin sheet")
        .with_style_sheet(StyleSheet {
            href: Some("http://site/css/main.css".into()),
            rules: vec![CssRule::font_face(
                "@font-face { font-family: A; src: url(\"../fonts/a.woff2\") format(\"woff2\"); }",
            )],
        });
    let node = MemoryNode::element("span").with_child(MemoryNode::text("x"));
    let svg = rfsnap::to_svg(&host, &node, &RenderOptions::default()).await.unwrap();

    assert!(svg.contains(
        "<style>@font-face { font-family: A; src: url(\"data:application/font-woff2;base64,Vw==\") format(\"woff2\"); }</style></span>"
    ));
    assert!(!svg.contains("http://site/"));
}

#[tokio::test]
async fn fetch_policy_reaches_the_transport() {
    let node = MemoryNode::element("div").with_child(MemoryNode::element("img").with_attr("src", "http://cdn/i.png"));
    let host = MemoryHost::new().with_transport(MemoryTransport::new().with_prefix_body("http://cdn/i.png", b"I".to_vec()));
    let options = RenderOptions {
        cache_bust: true,
        use_credentials: true,
        ..Default::default()
    };
    let svg = rfsnap::to_svg(&host, &node, &options).await.unwrap();
    assert!(svg.contains("data:image/png;base64,SQ=="));

    let requests = host.memory_transport().requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].with_credentials);
    let (base, stamp) = requests[0].url.split_once('?').expect("cache-bust parameter");
    assert_eq!(base, "http://cdn/i.png");
    assert!(stamp.chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn sibling_images_are_fetched_concurrently() {
    let delay = Duration::from_millis(200);
    let node = MemoryNode::element("div").with_children([
        MemoryNode::element("img").with_attr("src", "one.png"),
        MemoryNode::element("img").with_attr("src", "two.png"),
    ]);
    let host = MemoryHost::new().with_transport(
        MemoryTransport::new()
            .with_delayed_body("one.png", b"1".to_vec(), delay)
            .with_delayed_body("two.png", b"2".to_vec(), delay),
    );

    let t0 = Instant::now();
    let svg = rfsnap::to_svg(&host, &node, &RenderOptions::default()).await.unwrap();
    let elapsed = t0.elapsed();

    assert!(elapsed < delay * 2 - Duration::from_millis(20), "took {:?}", elapsed);
    let first = svg.find("base64,MQ==").unwrap();
    let second = svg.find("base64,Mg==").unwrap();
    assert!(first < second);
}

#[tokio::test]
async fn raster_outputs() {
    let host = MemoryHost::new().with_rasterizer(MemoryRasterizer::new([0, 0, 255, 255]));
    let node = MemoryNode::element("div").with_scroll_size(3.0, 2.0);
    let options = RenderOptions {
        scale: 2.0,
        ..Default::default()
    };

    let pixels = rfsnap::to_pixel_data(&host, &node, &options).await.unwrap();
    assert_eq!(pixels.len(), 6 * 4 * 4);
    assert_eq!(&pixels[0..4], &[0, 0, 255, 255]);

    let png = rfsnap::to_png(&host, &node, &options).await.unwrap();
    assert_eq!(&png[1..4], b"PNG");

    let jpeg = rfsnap::to_jpeg(&host, &node, &options).await.unwrap();
    assert_eq!(&jpeg[0..3], &[0xFF, 0xD8, 0xFF]);
}

#[tokio::test]
async fn invalid_options_fail_before_any_fetch() {
    let host = MemoryHost::new();
    let node = MemoryNode::element("div").with_child(MemoryNode::element("img").with_attr("src", "a.png"));
    let options = RenderOptions {
        scale: -2.0,
        ..Default::default()
    };
    let err = rfsnap::to_svg(&host, &node, &options).await.unwrap_err();
    assert!(matches!(err, Error::ConfigError(_)));
    assert!(host.memory_transport().requests().is_empty());
}
