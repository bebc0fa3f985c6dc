//! Lazy List Demo
//!
//! A scrollable feed with a lazily rendered image per row and a sentinel at
//! the end that requests the next page once. Visibility is scripted through
//! `ScriptedBackend` to stand in for the platform monitor.
//!
//! Run with: RUST_LOG=debug cargo run -p blinc_sentinel --example lazy_list

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use blinc_observer::{ElementSpec, NodeTree, ScriptedBackend};
use blinc_sentinel::prelude::*;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let tree = Arc::new(NodeTree::new());
    let backend = Arc::new(ScriptedBackend::new());
    let registry = ObserverRegistry::new(backend.clone(), tree.clone());

    let feed = tree
        .append(tree.root(), ElementSpec::new("ul").id("feed"))
        .expect("document root is attached");

    let row_props = SentinelProps::from_json(
        r##"{ "block": true, "configOptions": { "scrollableArea": "#feed", "threshold": 0.25 } }"##,
    )?;
    for _ in 0..5 {
        tree.append(feed, ElementSpec::new("li").class("row"))
            .expect("feed is attached");
    }
    let rows: Vec<Sentinel> = tree
        .children(feed)
        .into_iter()
        .map(|row| {
            tracing::info!("row {:?} in {:?}", row, tree.parent(row));
            Sentinel::attach(registry.clone(), row, row_props.clone())
        })
        .collect::<Result<_>>()?;

    let end = tree
        .append(feed, ElementSpec::new("div").class("feed-end"))
        .expect("feed is attached");
    let end_props = SentinelProps::from_json(
        r##"{ "once": true, "sentinelClass": "feed-end", "configOptions": { "scrollableArea": "#feed", "viewportTolerance": { "bottom": 200 } } }"##,
    )?;
    let end_sentinel = Sentinel::attach(registry.clone(), end, end_props)?;

    let pages = Arc::new(AtomicUsize::new(0));
    {
        let pages = pages.clone();
        end_sentinel.subscribe(move |event| {
            if let SentinelEvent::Enter(_) = event {
                let page = pages.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::info!("loading page {}", page);
            }
        });
    }

    tracing::info!(
        "{} sentinels on {} monitors",
        registry.observed_count(),
        registry.bucket_count()
    );

    // Scroll: the first two rows come into view, then the end of the feed
    backend.report(IntersectionEntry::new(rows[0].target(), true, 1.0));
    backend.report(IntersectionEntry::new(rows[1].target(), true, 0.3));
    backend.report(IntersectionEntry::new(rows[2].target(), true, 0.1));
    backend.report(IntersectionEntry::new(end, true, 0.05));
    backend.report(IntersectionEntry::new(end, false, 0.0));
    backend.report(IntersectionEntry::new(end, true, 0.5));

    for (i, row) in rows.iter().enumerate() {
        tracing::info!(
            "row {}: render content = {}",
            i,
            row.should_render_content()
        );
    }
    if let Some(container) = end_sentinel.container_attributes() {
        tracing::info!(
            "pages requested: {} ({})",
            pages.load(Ordering::SeqCst),
            container.class
        );
    }

    drop(rows);
    drop(end_sentinel);
    tracing::info!("after teardown: {:?}", registry.stats());
    Ok(())
}
