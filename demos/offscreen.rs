//! Renders a small page offscreen and writes the texture to `offscreen.png`.
//!
//! Uses the software engine unless `--ultralight <sdk dir>` is given.

use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use webview_bridge::{parse_message, Bridge, BridgeConfig, HtmlView, InputSample};

const PAGE: &str = r#"<html><body style="background:#203040;color:white">
<h1>Offscreen</h1>
<button onclick="bridge.send({clicked: true})">Click</button>
<script>window.bridge.receive = function (msg) { console.log('host says ' + msg.greeting); };</script>
</body></html>"#;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let bridge = match args.iter().position(|a| a == "--ultralight") {
        Some(i) => {
            let dir = args.get(i + 1).context("--ultralight needs the SDK directory")?;
            let config = BridgeConfig::builder().base_dir(dir).debug(true).build()?;
            Bridge::start(config)?
        }
        None => {
            let config = BridgeConfig::builder().settle_interval(Duration::ZERO).build()?;
            Bridge::start_headless(config)?
        }
    };
    let bridge = Arc::new(bridge);

    let (width, height) = (320, 200);
    let mut view = HtmlView::from_html(bridge.clone(), width, height, PAGE)?;
    view.on_message(|msg| match parse_message(msg) {
        Ok(value) => log::info!("page sent {value}"),
        Err(e) => log::warn!("page sent malformed JSON: {e}"),
    });

    let mut input = InputSample { cursor: (40, 90), ..Default::default() };
    for frame in 0..30 {
        input.left = frame == 10;
        if view.update(&input)? {
            log::debug!("frame {frame}: texture updated");
        }
        if frame == 5 {
            view.send(&serde_json::json!({ "greeting": "hello" }))?;
        }
        while let Some(line) = view.handle().and_then(|h| bridge.next_console_message(h)) {
            log::info!("console: {line}");
        }
        std::thread::sleep(Duration::from_millis(16));
    }

    let file = File::create("offscreen.png").context("creating offscreen.png")?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.write_header()?.write_image_data(view.texture())?;
    log::info!("wrote offscreen.png ({width}x{height})");

    view.close()?;
    bridge.shutdown();
    Ok(())
}
