//! Snapshot a live page through the browser driver.
//!
//! The snapshot is what the CLI's `resolve` command and offline tests run the
//! resolver against.

use crate::dom::Snapshot;
use crate::Result;
use eoka::{Browser, Page, StealthConfig};
use tracing::{debug, info};

/// Walks the document and serializes it into the [`Snapshot`] JSON shape.
/// Rects are in document coordinates.
const SNAPSHOT_JS: &str = r#"
(() => {
    const SKIP = new Set(['script', 'style', 'noscript', 'template', 'link', 'meta']);
    const sx = window.scrollX, sy = window.scrollY;

    function walk(el) {
        const tag = el.tagName.toLowerCase();
        const attributes = {};
        for (const a of el.attributes) attributes[a.name] = a.value;

        const node = { tag, attributes, text: '', children: [] };
        // Text runs stay where they are: before the first child, or as the
        // tail of the element they follow. Edge spaces are kept.
        let last = null;
        for (const n of el.childNodes) {
            if (n.nodeType === Node.TEXT_NODE) {
                const t = n.textContent.replace(/\s+/g, ' ');
                if (last) last.tail += t;
                else node.text += t;
            } else if (n.nodeType === Node.ELEMENT_NODE && !SKIP.has(n.tagName.toLowerCase())) {
                last = walk(n);
                node.children.push(last);
            }
        }
        if (tag === 'input' || tag === 'textarea' || tag === 'select') {
            node.value = el.value == null ? '' : String(el.value);
        }
        const r = el.getBoundingClientRect();
        if (r.width > 0 || r.height > 0) {
            node.rect = { x: r.x + sx, y: r.y + sy, width: r.width, height: r.height };
        }
        node.tail = '';
        return node;
    }

    return JSON.stringify({
        url: location.href,
        viewport: {
            scroll_x: sx,
            scroll_y: sy,
            width: window.innerWidth,
            height: window.innerHeight,
        },
        root: walk(document.documentElement),
    });
})()
"#;

/// Browser options for [`capture`].
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Quiet period to wait for before reading the page.
    pub idle_ms: u64,
    pub timeout_ms: u64,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            idle_ms: 500,
            timeout_ms: 10_000,
        }
    }
}

/// Read the current state of an already open page.
pub async fn snapshot_page(page: &Page) -> Result<Snapshot> {
    let json: String = page.evaluate(SNAPSHOT_JS).await?;
    Snapshot::parse(&json)
}

/// Launch a browser, load `url` and snapshot it.
pub async fn capture(url: &str, options: &CaptureOptions) -> Result<Snapshot> {
    let stealth = StealthConfig {
        headless: options.headless,
        viewport_width: options.viewport_width,
        viewport_height: options.viewport_height,
        ..Default::default()
    };
    debug!("Launching browser (headless: {})", options.headless);
    let browser = Browser::launch_with_config(stealth).await?;
    let page = browser.new_page("about:blank").await?;

    info!("Navigating to: {}", url);
    let result = async {
        page.goto(url).await?;
        page.wait_for_network_idle(options.idle_ms, options.timeout_ms)
            .await?;
        snapshot_page(&page).await
    }
    .await;

    browser.close().await?;
    let snapshot = result?;
    debug!("Captured {} ({})", snapshot.url, snapshot.root.tag);
    Ok(snapshot)
}
