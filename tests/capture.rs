//! Capture tests against a real browser.
//!
//! These tests require Chrome to be installed and available.
//! Run with: cargo test --test capture -- --ignored

use eoka::Browser;
use eoka_guide::capture::snapshot_page;
use eoka_guide::resolve::ValidationCache;
use eoka_guide::{
    Action, Document, Interaction, MemoryDocument, Resolver, TieBreak, Validator,
};

/// Check if Chrome is available
fn chrome_available() -> bool {
    eoka::stealth::patcher::find_chrome().is_ok()
}

const PAGE: &str = r##"data:text/html,
    <style>body { margin: 0; padding: 20px; }</style>
    <script>document.title = 'ignored';</script>
    <h1>Settings</h1>
    <form>
        <input id="email" type="email" placeholder="Email" value="a@b.test">
        <button id="save" type="submit">Save changes</button>
    </form>
    <p><a id="billing" href="#billing">Learn <b>more</b> about billing</a></p>
"##;

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_snapshot_populated_page() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser
        .new_page("about:blank")
        .await
        .expect("Failed to create page");
    page.goto(PAGE).await.expect("Failed to navigate");

    let snapshot = snapshot_page(&page).await.expect("Failed to snapshot");
    browser.close().await.expect("Failed to close browser");

    assert_eq!(snapshot.root.tag, "html");
    assert!(snapshot.viewport.width > 0.0);

    let doc = MemoryDocument::from_snapshot(snapshot);
    assert!(doc
        .elements()
        .iter()
        .all(|n| doc.tag(*n).as_deref() != Some("script")));

    let email = doc.find_by_attribute("id", "email").expect("no #email");
    assert_eq!(doc.value(email).as_deref(), Some("a@b.test"));
    assert!(doc.rect(email).is_some());

    let save = doc.find_by_attribute("id", "save").expect("no #save");
    assert_eq!(doc.display_text(save), "Save changes");

    let billing = doc.find_by_attribute("id", "billing").expect("no #billing");
    assert_eq!(doc.text_content(billing), "Learn more about billing");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_resolve_against_captured_page() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser
        .new_page("about:blank")
        .await
        .expect("Failed to create page");
    page.goto(PAGE).await.expect("Failed to navigate");
    let snapshot = snapshot_page(&page).await.expect("Failed to snapshot");
    browser.close().await.expect("Failed to close browser");

    let doc = MemoryDocument::from_snapshot(snapshot);
    let desc = Interaction::new(Action::Click, doc.location().as_str())
        .with_tag("button")
        .with_text("Save changes");

    let candidates = Resolver::new(&doc).find_candidates(&desc);
    let mut cache = ValidationCache::new();
    let selection = Validator::new(&doc)
        .select(&candidates, &desc, &mut cache, TieBreak::ResolverOrder, None)
        .expect("target not found");
    assert_eq!(doc.find_by_attribute("id", "save"), Some(selection.node));
}
