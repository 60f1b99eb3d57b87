// crates/sync-engine/examples/sync_demo.rs
//! Two participants sharing one list through an in-memory store

use shoplist_config::Config;
use shoplist_core::{Category, NewItem};
use shoplist_sync_engine::{InMemoryStore, ListSyncController, SyncResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main(flavor = "current_thread")]
async fn main() -> SyncResult<()> {
    let config = Config::default();
    env_logger::Builder::new()
        .filter_level(config.app.log_level.as_filter())
        .parse_default_env()
        .init();

    println!("ShopList Sync Engine Demo");
    println!("=========================\n");

    let store = InMemoryStore::new();
    let list = store.create_list("Weekly groceries");
    println!("Created '{}' with share code {}\n", list.name, list.share_code);

    let sam = open(&store, &config, &list.share_code, "Sam").await?;
    let alex = open(&store, &config, &list.share_code, "Alex").await?;
    let _sam_feed = sam.subscribe().await?;
    let _alex_feed = alex.subscribe().await?;
    let mut alex_inbox = alex.notifications();

    println!("1. Adding items");
    println!("---------------");
    let mut ids = Vec::new();
    for (name, category) in [
        ("Milk", Category::Dairy),
        ("Salmon", Category::Seafood),
        ("Bananas", Category::Produce),
        ("Dish soap", Category::Household),
    ] {
        let item = sam.add_item(NewItem::new(list.id.clone(), name, category)).await?;
        println!("  Sam added {}", item.name);
        ids.push(item.id);
    }
    sleep(Duration::from_millis(100)).await;
    println!("  Alex now sees {} items", alex.snapshot().items.len());

    println!("\n2. Checking items off");
    println!("---------------------");
    for id in &ids[..3] {
        sam.toggle_item(id, true);
    }
    println!(
        "  Sam sees {}% done at once, {} write(s) pending",
        sam.stats().completion_percent,
        sam.pending_count()
    );
    println!("  Alex still sees {}% done", alex.stats().completion_percent);

    sleep(Duration::from_millis(1200)).await;
    sam.settle().await;
    alex.settle().await;
    println!("  After the debounce Alex sees {}% done", alex.stats().completion_percent);

    println!("\n3. Finishing the trip");
    println!("---------------------");
    let outcome = sam.report_missing_items().await?;
    println!("  Missing-items report: {:?}", outcome);
    sleep(Duration::from_millis(50)).await;

    while let Ok(notification) = alex_inbox.try_recv() {
        println!("  Alex was told: {}", notification.message);
    }

    println!("\n4. Alex's view");
    println!("--------------");
    let snapshot = alex.snapshot();
    for group in &snapshot.groups {
        let names: Vec<_> = group.items.iter().map(|i| i.name.as_str()).collect();
        println!("  {}: {}", group.category, names.join(", "));
    }
    let done: Vec<_> = snapshot.checked.iter().map(|i| i.name.as_str()).collect();
    println!("  Checked: {}", done.join(", "));

    let report = sam.dispose().await?;
    alex.dispose().await?;
    println!("\nSessions closed ({} toggle(s) flushed on exit)", report.len());

    Ok(())
}

async fn open(
    store: &InMemoryStore,
    config: &Config,
    share_code: &str,
    user: &str,
) -> SyncResult<ListSyncController> {
    let controller = ListSyncController::builder(Arc::new(store.clone()), Arc::new(store.clone()))
        .with_config(config)
        .with_user_name(user)
        .build()?;
    controller.load(share_code).await?;
    Ok(controller)
}
