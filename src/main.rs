use anyhow::{bail, Context};
use clap::{ArgAction, Parser, ValueEnum};
use log::info;
use rfsnap::host::html::HtmlDocument;
use rfsnap::RenderOptions;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rfsnap", version, about = "Snapshot a document node into an SVG or raster image")]
struct Cli {
    /// URL or file path of the page
    input: String,

    /// CSS selector of the node to snapshot
    #[arg(long, default_value = "body")]
    selector: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Svg)]
    format: Format,

    /// Output file (stdout when omitted)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Explicit width in CSS px
    #[arg(long)]
    width: Option<f64>,

    /// Explicit height in CSS px
    #[arg(long)]
    height: Option<f64>,

    /// Background color, any CSS color
    #[arg(long)]
    background_color: Option<String>,

    /// Raster scale factor
    #[arg(long)]
    scale: Option<f64>,

    /// JPEG quality between 0 and 1
    #[arg(long)]
    quality: Option<f64>,

    /// Data URI used for resources that fail to load
    #[arg(long, value_name = "DATAURI")]
    placeholder: Option<String>,

    /// Append a timestamp to every fetched URL
    #[arg(long, action = ArgAction::SetTrue)]
    cache_bust: bool,

    /// Send credentials with fetches
    #[arg(long, action = ArgAction::SetTrue)]
    use_credentials: bool,

    /// Style property patched onto the root (repeatable)
    #[arg(long = "style", value_name = "PROPERTY=VALUE", value_parser = parse_style)]
    style: Vec<(String, String)>,

    /// JSON options file; flags take precedence over it
    #[arg(long, value_name = "FILE")]
    options: Option<PathBuf>,

    /// Per-fetch timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Rasterize with headless Chrome (needed for png, jpeg and raw)
    #[arg(long, action = ArgAction::SetTrue)]
    chrome: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Svg,
    Png,
    Jpeg,
    Raw,
}

fn parse_style(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected PROPERTY=VALUE, got {:?}", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty property name in {:?}", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn render_options(cli: &Cli) -> anyhow::Result<RenderOptions> {
    let mut options: RenderOptions = match &cli.options {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => RenderOptions::default(),
    };

    if cli.width.is_some() {
        options.width = cli.width;
    }
    if cli.height.is_some() {
        options.height = cli.height;
    }
    if cli.background_color.is_some() {
        options.background_color = cli.background_color.clone();
    }
    if let Some(scale) = cli.scale {
        options.scale = scale;
    }
    if cli.quality.is_some() {
        options.quality = cli.quality;
    }
    if cli.placeholder.is_some() {
        options.image_placeholder = cli.placeholder.clone();
    }
    if let Some(ms) = cli.timeout_ms {
        options.fetch_timeout_ms = ms;
    }
    options.cache_bust |= cli.cache_bust;
    options.use_credentials |= cli.use_credentials;
    for (name, value) in &cli.style {
        options.style.insert(name.clone(), value.clone());
    }

    options.validate()?;
    Ok(options)
}

#[cfg(feature = "cdp")]
fn attach_rasterizer(doc: HtmlDocument) -> anyhow::Result<HtmlDocument> {
    let rasterizer = rfsnap::host::cdp::CdpRasterizer::launch().context("launching headless Chrome")?;
    Ok(doc.with_rasterizer(rasterizer))
}

#[cfg(not(feature = "cdp"))]
fn attach_rasterizer(_doc: HtmlDocument) -> anyhow::Result<HtmlDocument> {
    bail!("--chrome needs rfsnap built with the `cdp` feature")
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let options = render_options(&cli)?;
    if cli.format != Format::Svg && !cli.chrome {
        bail!("{:?} output needs a rasterizer; pass --chrome", cli.format);
    }

    let mut doc = HtmlDocument::load(&cli.input)
        .await
        .with_context(|| format!("loading {}", cli.input))?;
    if cli.chrome {
        doc = attach_rasterizer(doc)?;
    }
    let node = doc.select(&cli.selector)?;
    info!("snapshotting {:?} of {}", cli.selector, cli.input);

    let bytes = match cli.format {
        Format::Svg => rfsnap::to_svg(&doc, &node, &options).await?.into_bytes(),
        Format::Png => rfsnap::to_png(&doc, &node, &options).await?,
        Format::Jpeg => rfsnap::to_jpeg(&doc, &node, &options).await?,
        Format::Raw => rfsnap::to_pixel_data(&doc, &node, &options).await?,
    };

    match &cli.output {
        Some(path) => std::fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("rfsnap: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_pairs() {
        assert_eq!(parse_style("color = red").unwrap(), ("color".into(), "red".into()));
        assert!(parse_style("color").is_err());
        assert!(parse_style("=red").is_err());
    }

    #[test]
    fn flags_override_options_file() {
        let path = std::env::temp_dir().join(format!("rfsnap-options-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"width": 50, "scale": 3, "style": {"color": "red"}}"#).unwrap();

        let cli = Cli::try_parse_from([
            "rfsnap",
            "page.html",
            "--options",
            path.to_str().unwrap(),
            "--width",
            "80",
            "--style",
            "color=blue",
            "--cache-bust",
        ])
        .unwrap();
        let options = render_options(&cli).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(options.width, Some(80.0));
        assert_eq!(options.scale, 3.0);
        assert_eq!(options.style.get("color").map(String::as_str), Some("blue"));
        assert!(options.cache_bust);
        assert_eq!(cli.selector, "body");
        assert_eq!(cli.format, Format::Svg);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let cli = Cli::try_parse_from(["rfsnap", "page.html", "--quality", "2"]).unwrap();
        assert!(render_options(&cli).is_err());
    }
}
