// crates/sync-engine/tests/sync_tests.rs
//! Integration tests for the list sync engine

use async_trait::async_trait;
use shoplist_config::Config;
use shoplist_core::{
    Category, ItemId, ItemUpdate, ListId, NewItem, ShoppingList, ShoppingListItem, Timestamp,
};
use shoplist_sync_engine::{
    ChangeFeed, CollectingReporter, ErrorSeverity, EventClass, InMemoryStore, ListStore,
    ListSyncController, ListSyncControllerBuilder, LiveNotification, ManualClock,
    NotificationDispatch, NotificationFeed, NotificationThrottler, NotifyOutcome,
    OutgoingNotification, RemoteChangeEvent, StoreResult, SyncError, SyncStatus,
    DEFAULT_THROTTLE_WINDOW,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

struct Fixture {
    store: InMemoryStore,
    list: ShoppingList,
    items: Vec<ShoppingListItem>,
    reporter: CollectingReporter,
    clock: ManualClock,
}

impl Fixture {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let store = InMemoryStore::new();
        let list = store.create_list("Weekly groceries");
        let items = [
            ("Milk", Category::Dairy),
            ("Eggs", Category::Dairy),
            ("Apples", Category::Produce),
        ]
        .into_iter()
        .map(|(name, category)| {
            store.seed_item(ShoppingListItem::new(list.id.clone(), name, category))
        })
        .collect();

        Self {
            store,
            list,
            items,
            reporter: CollectingReporter::new(),
            clock: ManualClock::new(Timestamp::from_millis(1_700_000_000_000)),
        }
    }

    fn builder(&self) -> ListSyncControllerBuilder {
        ListSyncController::builder(Arc::new(self.store.clone()), Arc::new(self.store.clone()))
            .with_clock(Arc::new(self.clock.clone()))
            .with_reporter(Arc::new(self.reporter.clone()))
            .with_throttler(NotificationThrottler::new(
                DEFAULT_THROTTLE_WINDOW,
                Arc::new(self.clock.clone()),
            ))
    }

    async fn open(&self) -> ListSyncController {
        let controller = self.builder().build().unwrap();
        controller.load(&self.list.share_code).await.unwrap();
        controller
    }

    fn id(&self, index: usize) -> ItemId {
        self.items[index].id.clone()
    }

    fn sent(&self, class: EventClass) -> usize {
        self.store
            .sent_notifications()
            .iter()
            .filter(|n| n.class == class)
            .count()
    }
}

/// Lets every timer that is due fire and waits for the work it started
async fn run_for(controller: &ListSyncController, ms: u64) {
    sleep(Duration::from_millis(ms)).await;
    controller.settle().await;
}

#[tokio::test(start_paused = true)]
async fn test_load_populates_local_state() {
    let f = Fixture::new();
    let controller = f.open().await;

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.items.len(), 3);
    assert_eq!(snapshot.stats.remaining, 3);
    assert_eq!(controller.list().unwrap().id, f.list.id);
}

#[tokio::test(start_paused = true)]
async fn test_load_unknown_share_code() {
    let f = Fixture::new();
    let controller = f.builder().build().unwrap();

    let result = controller.load("NOPE42").await;
    assert!(matches!(result, Err(SyncError::NotFound(code)) if code == "NOPE42"));
    assert!(controller.list().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_rapid_toggles_coalesce_into_one_write() {
    let f = Fixture::new();
    let controller = f.open().await;
    let milk = f.id(0);

    // Check, uncheck, check again within the debounce
    controller.toggle_item(&milk, true);
    sleep(Duration::from_millis(100)).await;
    controller.toggle_item(&milk, false);
    sleep(Duration::from_millis(100)).await;
    controller.toggle_item(&milk, true);

    run_for(&controller, 1100).await;

    assert_eq!(f.store.set_checked_calls(), 1);
    assert!(f.store.item(&milk).unwrap().checked);
    assert!(!controller.is_pending(&milk));
}

#[tokio::test(start_paused = true)]
async fn test_burst_across_items_flushes_after_last_toggle() {
    let f = Fixture::new();
    let controller = f.open().await;

    controller.toggle_item(&f.id(0), true);
    sleep(Duration::from_millis(100)).await;
    controller.toggle_item(&f.id(1), true);
    sleep(Duration::from_millis(100)).await;
    controller.toggle_item(&f.id(2), true);

    // Visible at once, written later
    assert_eq!(controller.stats().checked, 3);
    assert_eq!(controller.pending_count(), 3);

    // The last toggle pushed the deadline to 1200ms after the first
    sleep(Duration::from_millis(950)).await;
    assert_eq!(f.store.set_checked_calls(), 0);

    run_for(&controller, 100).await;
    assert_eq!(f.store.set_checked_calls(), 3);
    assert!(f.store.items(&f.list.id).iter().all(|i| i.checked));
    assert_eq!(controller.pending_count(), 0);
    assert_eq!(controller.queued_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stale_remote_snapshot_does_not_clobber_pending_toggle() {
    let f = Fixture::new();
    let controller = f.open().await;
    let _subscription = controller.subscribe().await.unwrap();
    let milk = f.id(0);

    controller.toggle_item(&milk, true);

    // Someone else's write lands carrying the old value
    f.store
        .emit(&f.list.id, RemoteChangeEvent::Upserted(f.items[0].clone()));
    run_for(&controller, 100).await;
    assert!(controller.item(&milk).unwrap().checked);
    assert!(controller.is_pending(&milk));

    // After our write is confirmed the echo converges
    run_for(&controller, 1000).await;
    run_for(&controller, 100).await;
    assert!(!controller.is_pending(&milk));
    assert!(controller.item(&milk).unwrap().checked);
    assert!(f.store.item(&milk).unwrap().checked);
}

#[tokio::test(start_paused = true)]
async fn test_remote_toggle_applies_after_window() {
    let f = Fixture::new();
    let controller = f.open().await;
    let _subscription = controller.subscribe().await.unwrap();
    let eggs = f.id(1);

    f.store.remote_toggle(&eggs, true);
    sleep(Duration::from_millis(10)).await;
    assert!(!controller.item(&eggs).unwrap().checked);

    run_for(&controller, 60).await;
    assert!(controller.item(&eggs).unwrap().checked);
}

#[tokio::test(start_paused = true)]
async fn test_remote_burst_is_one_revision() {
    let f = Fixture::new();
    let controller = f.open().await;
    let _subscription = controller.subscribe().await.unwrap();
    let changes = controller.changes();
    let before = *changes.borrow();

    for n in 0..50 {
        let item = ShoppingListItem::new(f.list.id.clone(), format!("Item {}", n), Category::Snacks);
        f.store.emit(&f.list.id, RemoteChangeEvent::Upserted(item));
    }
    run_for(&controller, 60).await;

    assert_eq!(*changes.borrow(), before + 1);
    assert_eq!(controller.snapshot().items.len(), 53);
}

#[tokio::test(start_paused = true)]
async fn test_remote_delete_beats_late_upsert() {
    let f = Fixture::new();
    let controller = f.open().await;
    let _subscription = controller.subscribe().await.unwrap();
    let apples = f.id(2);

    f.store
        .emit(&f.list.id, RemoteChangeEvent::Deleted(apples.clone()));
    f.store
        .emit(&f.list.id, RemoteChangeEvent::Upserted(f.items[2].clone()));
    run_for(&controller, 100).await;

    assert!(controller.item(&apples).is_none());
    assert_eq!(controller.snapshot().items.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_remote_delete_drops_pending_toggle() {
    let f = Fixture::new();
    let controller = f.open().await;
    let _subscription = controller.subscribe().await.unwrap();
    let milk = f.id(0);

    controller.toggle_item(&milk, true);
    f.store.emit(&f.list.id, RemoteChangeEvent::Deleted(milk.clone()));
    sleep(Duration::from_millis(10)).await;

    assert!(controller.item(&milk).is_none());
    assert!(!controller.is_pending(&milk));
    assert_eq!(controller.queued_count(), 0);

    run_for(&controller, 1100).await;
    assert_eq!(f.store.set_checked_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_upserts_for_other_lists_are_ignored() {
    let f = Fixture::new();
    let controller = f.open().await;
    let _subscription = controller.subscribe().await.unwrap();

    let stray = ShoppingListItem::new(ListId::from_string("elsewhere"), "Stray", Category::Other);
    f.store.emit(&f.list.id, RemoteChangeEvent::Upserted(stray.clone()));
    run_for(&controller, 100).await;

    assert!(controller.item(&stray.id).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_keeps_local_state_and_reports() {
    let f = Fixture::new();
    let controller = f.open().await;
    let eggs = f.id(1);
    f.store.fail_item(&eggs);

    controller.toggle_item(&eggs, true);
    run_for(&controller, 1100).await;

    assert!(controller.item(&eggs).unwrap().checked);
    assert!(!controller.is_pending(&eggs));
    assert!(!f.store.item(&eggs).unwrap().checked);

    let reports = f.reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].severity, ErrorSeverity::Recoverable);
    assert!(reports[0].message.contains(&eggs.to_string()));

    // Not retried on its own
    run_for(&controller, 5000).await;
    assert_eq!(f.store.set_checked_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reload_keeps_pending_local_value() {
    let f = Fixture::new();
    let controller = f.open().await;
    let milk = f.id(0);

    controller.toggle_item(&milk, true);
    controller.load(&f.list.share_code).await.unwrap();
    assert!(controller.item(&milk).unwrap().checked);

    let report = controller.flush_mutations().await;
    assert_eq!(report.confirmed, vec![milk.clone()]);

    controller.load(&f.list.share_code).await.unwrap();
    assert!(controller.item(&milk).unwrap().checked);
}

#[tokio::test(start_paused = true)]
async fn test_checks_notify_once_per_window() {
    let f = Fixture::new();
    let controller = f.open().await;
    controller.set_user_name("Sam");

    controller.toggle_item(&f.id(0), true);
    run_for(&controller, 1100).await;
    assert_eq!(f.sent(EventClass::ItemsChecked), 1);

    controller.toggle_item(&f.id(1), true);
    run_for(&controller, 1100).await;
    assert_eq!(f.sent(EventClass::ItemsChecked), 1);

    // Exactly one window later is still inside it
    f.clock.advance(DEFAULT_THROTTLE_WINDOW);
    controller.toggle_item(&f.id(1), false);
    controller.toggle_item(&f.id(2), true);
    run_for(&controller, 1100).await;
    assert_eq!(f.sent(EventClass::ItemsChecked), 1);

    f.clock.advance(Duration::from_millis(1));
    controller.toggle_item(&f.id(1), true);
    run_for(&controller, 1100).await;
    assert_eq!(f.sent(EventClass::ItemsChecked), 2);

    let message = &f.store.sent_notifications()[1].message;
    assert_eq!(message, "Sam started checking items off Weekly groceries");
}

#[tokio::test(start_paused = true)]
async fn test_unchecking_alone_does_not_notify() {
    let f = Fixture::new();
    let controller = f.open().await;
    controller.set_user_name("Sam");

    controller.toggle_item(&f.id(0), true);
    controller.toggle_item(&f.id(0), false);
    run_for(&controller, 1100).await;

    assert_eq!(f.store.set_checked_calls(), 1);
    assert_eq!(f.sent(EventClass::ItemsChecked), 0);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_survives_reopening_the_list() {
    let f = Fixture::new();
    let clock = Arc::new(f.clock.clone());

    // The default throttler is shared by every controller in the process
    let first = ListSyncController::builder(Arc::new(f.store.clone()), Arc::new(f.store.clone()))
        .with_clock(clock.clone())
        .with_user_name("Sam")
        .build()
        .unwrap();
    first.load(&f.list.share_code).await.unwrap();
    first.toggle_item(&f.id(0), true);
    first.dispose().await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(f.sent(EventClass::ItemsChecked), 1);

    let second = ListSyncController::builder(Arc::new(f.store.clone()), Arc::new(f.store.clone()))
        .with_clock(clock)
        .with_user_name("Sam")
        .build()
        .unwrap();
    second.load(&f.list.share_code).await.unwrap();
    second.toggle_item(&f.id(1), true);
    second.dispose().await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(f.sent(EventClass::ItemsChecked), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shopping_complete_always_sends() {
    let f = Fixture::new();
    let controller = f.open().await;
    controller.set_user_name("Sam");

    for index in 0..3 {
        controller.toggle_item(&f.id(index), true);
    }
    assert_eq!(
        controller.mark_shopping_complete().await.unwrap(),
        NotifyOutcome::Sent
    );
    assert_eq!(
        controller.mark_shopping_complete().await.unwrap(),
        NotifyOutcome::Sent
    );

    let sent = f.store.sent_notifications();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].message.contains("All items purchased"));
    assert_eq!(sent[0].triggered_by, "Sam");
}

#[tokio::test(start_paused = true)]
async fn test_missing_items_report() {
    let f = Fixture::new();
    let controller = f.open().await;
    controller.set_user_name("Sam");
    controller.toggle_item(&f.id(0), true);

    assert_eq!(
        controller.report_missing_items().await.unwrap(),
        NotifyOutcome::Sent
    );
    let sent = f.store.sent_notifications();
    assert_eq!(
        sent[0].message,
        "Sam finished shopping. 2 items still needed in Weekly groceries"
    );

    // Nothing missing, nothing to say
    controller.toggle_item(&f.id(1), true);
    controller.toggle_item(&f.id(2), true);
    assert_eq!(
        controller.report_missing_items().await.unwrap(),
        NotifyOutcome::Skipped
    );
}

#[tokio::test(start_paused = true)]
async fn test_notifications_need_a_display_name() {
    let f = Fixture::new();
    let controller = f.open().await;

    assert_eq!(
        controller.mark_shopping_complete().await.unwrap(),
        NotifyOutcome::Skipped
    );
    controller.toggle_item(&f.id(0), true);
    run_for(&controller, 1100).await;
    assert!(f.store.sent_notifications().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_own_notifications_are_filtered() {
    let f = Fixture::new();
    let controller = f.open().await;
    controller.set_user_name("Sam");
    let _subscription = controller.subscribe().await.unwrap();
    let mut live = controller.notifications();

    // Our own send comes back through the feed
    controller
        .add_item(NewItem::new(f.list.id.clone(), "Bread", Category::Other))
        .await
        .unwrap();
    f.store.push_notification(LiveNotification {
        list_id: f.list.id.clone(),
        message: "Alex added 1 item to Weekly groceries".to_string(),
        class: EventClass::ItemsAdded,
        triggered_by: "Alex".to_string(),
        created_at: Timestamp::now(),
    });
    sleep(Duration::from_millis(10)).await;

    let received = live.try_recv().unwrap();
    assert_eq!(received.triggered_by, "Alex");
    assert!(live.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_add_item_validates_and_notifies() {
    let f = Fixture::new();
    let controller = f.open().await;
    controller.set_user_name("Sam");

    let blank = NewItem::new(f.list.id.clone(), "   ", Category::Other);
    assert!(matches!(
        controller.add_item(blank).await,
        Err(SyncError::InvalidItem(_))
    ));

    let foreign = NewItem::new(ListId::from_string("elsewhere"), "Tea", Category::Drinks);
    assert!(matches!(
        controller.add_item(foreign).await,
        Err(SyncError::InvalidItem(_))
    ));

    let tea = controller
        .add_item(NewItem::new(f.list.id.clone(), "Tea", Category::Drinks))
        .await
        .unwrap();
    assert_eq!(tea.added_by.as_deref(), Some("Sam"));
    assert!(controller.item(&tea.id).is_some());
    assert_eq!(f.store.calls().add_item, 1);

    controller.settle().await;
    assert_eq!(f.sent(EventClass::ItemsAdded), 1);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_groups_and_checked_bucket() {
    let f = Fixture::new();
    let controller = f.open().await;

    controller.toggle_item(&f.id(1), true);
    f.clock.advance(Duration::from_secs(1));
    controller.toggle_item(&f.id(0), true);

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.groups.len(), 1);
    assert_eq!(snapshot.groups[0].category, Category::Produce);

    let checked: Vec<_> = snapshot.checked.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(checked, ["Eggs", "Milk"]);
    assert_eq!(snapshot.stats.completion_percent, 67);
}

#[tokio::test(start_paused = true)]
async fn test_uncheck_all() {
    let f = Fixture::new();
    let controller = f.open().await;
    controller.toggle_item(&f.id(0), true);
    controller.toggle_item(&f.id(2), true);
    controller.flush_mutations().await;

    assert_eq!(controller.uncheck_all(), 2);
    assert_eq!(controller.queued_count(), 2);

    run_for(&controller, 1100).await;
    assert!(f.store.items(&f.list.id).iter().all(|i| !i.checked));
}

#[tokio::test(start_paused = true)]
async fn test_check_all_is_one_flush_and_one_announcement() {
    let f = Fixture::new();
    let controller = f.open().await;
    controller.set_user_name("Sam");

    assert_eq!(controller.check_all(), 3);
    assert_eq!(controller.stats().checked, 3);
    assert_eq!(controller.queued_count(), 3);
    assert_eq!(controller.check_all(), 0);

    run_for(&controller, 1100).await;
    assert_eq!(f.store.set_checked_calls(), 3);
    assert!(f.store.items(&f.list.id).iter().all(|i| i.checked));
    assert_eq!(f.sent(EventClass::ItemsChecked), 1);
}

#[tokio::test(start_paused = true)]
async fn test_partially_failed_flush_is_not_announced() {
    let f = Fixture::new();
    let controller = f.open().await;
    controller.set_user_name("Sam");
    f.store.fail_item(&f.id(1));

    controller.toggle_item(&f.id(0), true);
    controller.toggle_item(&f.id(1), true);
    run_for(&controller, 1100).await;

    assert!(f.store.item(&f.id(0)).unwrap().checked);
    assert_eq!(f.reporter.len(), 1);
    assert_eq!(f.sent(EventClass::ItemsChecked), 0);

    // A clean retry is announced
    f.store.heal_item(&f.id(1));
    controller.toggle_item(&f.id(1), false);
    controller.toggle_item(&f.id(1), true);
    run_for(&controller, 1100).await;
    assert_eq!(f.sent(EventClass::ItemsChecked), 1);
}

#[tokio::test(start_paused = true)]
async fn test_update_item_applies_locally_once() {
    let f = Fixture::new();
    let controller = f.open().await;
    let _subscription = controller.subscribe().await.unwrap();
    let milk = f.id(0);
    let changes = controller.changes();
    let before = *changes.borrow();

    let update = ItemUpdate::default()
        .with_quantity(2)
        .with_unit("L")
        .with_notes("Semi-skimmed");
    let updated = controller.update_item(&milk, update).await.unwrap();
    assert_eq!(updated.quantity, 2);
    assert_eq!(controller.item(&milk).unwrap(), updated);
    assert_eq!(*changes.borrow(), before + 1);

    // The echo matches what we already hold
    run_for(&controller, 100).await;
    assert_eq!(*changes.borrow(), before + 1);
    assert_eq!(f.store.item(&milk).unwrap().unit.as_deref(), Some("L"));
    assert_eq!(f.store.calls().update_item, 1);
}

#[tokio::test(start_paused = true)]
async fn test_update_item_rejects_bad_input() {
    let f = Fixture::new();
    let controller = f.open().await;
    let milk = f.id(0);

    assert!(matches!(
        controller.update_item(&milk, ItemUpdate::default()).await,
        Err(SyncError::InvalidItem(_))
    ));
    assert!(matches!(
        controller
            .update_item(&milk, ItemUpdate::default().with_quantity(0))
            .await,
        Err(SyncError::InvalidItem(_))
    ));
    assert!(matches!(
        controller
            .update_item(&ItemId::from_string("ghost"), ItemUpdate::default().with_name("Tea"))
            .await,
        Err(SyncError::Store(_))
    ));
    assert_eq!(f.store.calls().update_item, 1);
    assert_eq!(controller.item(&milk).unwrap().quantity, 1);
}

#[tokio::test(start_paused = true)]
async fn test_update_item_keeps_pending_toggle() {
    let f = Fixture::new();
    let controller = f.open().await;
    let milk = f.id(0);

    controller.toggle_item(&milk, true);
    controller
        .update_item(&milk, ItemUpdate::default().with_name("Oat milk"))
        .await
        .unwrap();

    let local = controller.item(&milk).unwrap();
    assert_eq!(local.name, "Oat milk");
    assert!(local.checked);
    assert!(controller.is_pending(&milk));
}

#[tokio::test(start_paused = true)]
async fn test_remote_edit_by_another_participant_applies() {
    let f = Fixture::new();
    let controller = f.open().await;
    let _subscription = controller.subscribe().await.unwrap();
    let eggs = f.id(1);

    let mut edited = f.items[1].clone();
    edited.quantity = 12;
    f.store
        .emit(&f.list.id, RemoteChangeEvent::Upserted(edited));
    run_for(&controller, 100).await;

    assert_eq!(controller.item(&eggs).unwrap().quantity, 12);
}

#[tokio::test(start_paused = true)]
async fn test_delete_item_discards_queued_toggle() {
    let f = Fixture::new();
    let controller = f.open().await;
    let milk = f.id(0);

    controller.toggle_item(&milk, true);
    controller.delete_item(&milk).await.unwrap();

    assert!(controller.item(&milk).is_none());
    assert_eq!(controller.queued_count(), 0);
    run_for(&controller, 1100).await;
    assert_eq!(f.store.set_checked_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_clear_items() {
    let f = Fixture::new();
    let controller = f.open().await;
    controller.toggle_item(&f.id(0), true);

    controller.clear_items().await.unwrap();

    assert!(controller.snapshot().items.is_empty());
    assert_eq!(controller.pending_count(), 0);
    assert_eq!(controller.queued_count(), 0);
    assert!(f.store.items(&f.list.id).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_delete_list_ends_session() {
    let f = Fixture::new();
    let controller = f.open().await;

    controller.delete_list().await.unwrap();

    assert!(controller.list().is_none());
    assert!(matches!(
        controller.mark_shopping_complete().await,
        Err(SyncError::Disposed)
    ));
    assert!(matches!(
        controller.load(&f.list.share_code).await,
        Err(SyncError::NotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_twice_and_unsubscribe() {
    let f = Fixture::new();
    let controller = f.open().await;
    let status = controller.status();

    let subscription = controller.subscribe().await.unwrap();
    assert_eq!(*status.borrow(), SyncStatus::Live);
    assert!(matches!(
        controller.subscribe().await,
        Err(SyncError::AlreadySubscribed)
    ));

    subscription.unsubscribe();
    assert_eq!(*status.borrow(), SyncStatus::Idle);
    sleep(Duration::from_millis(1)).await;
    assert_eq!(f.store.subscriber_count(&f.list.id), 0);

    // Dropping the handle closes too
    let again = controller.subscribe().await.unwrap();
    assert_eq!(*status.borrow(), SyncStatus::Live);
    drop(again);
    assert_eq!(*status.borrow(), SyncStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_reload_while_subscribed_keeps_one_feed() {
    let f = Fixture::new();
    let controller = f.open().await;
    let status = controller.status();
    let _subscription = controller.subscribe().await.unwrap();

    controller.load(&f.list.share_code).await.unwrap();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(f.store.subscriber_count(&f.list.id), 1);
    assert_eq!(*status.borrow(), SyncStatus::Live);

    let changes = controller.changes();
    let before = *changes.borrow();
    f.store.remote_toggle(&f.id(2), true);
    run_for(&controller, 100).await;

    assert!(controller.item(&f.id(2)).unwrap().checked);
    assert_eq!(*changes.borrow(), before + 1);
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_needs_loaded_list() {
    let f = Fixture::new();
    let controller = f.builder().build().unwrap();
    assert!(matches!(
        controller.subscribe().await,
        Err(SyncError::NotLoaded)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_feed_degrades_but_edits_continue() {
    let f = Fixture::new();
    let controller = f.open().await;
    let status = controller.status();
    let _subscription = controller.subscribe().await.unwrap();

    f.store.drop_subscribers(&f.list.id);
    sleep(Duration::from_millis(10)).await;

    assert_eq!(*status.borrow(), SyncStatus::Degraded);
    let reports = f.reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].severity, ErrorSeverity::Degraded);

    // Local edits still go out
    controller.toggle_item(&f.id(0), true);
    run_for(&controller, 1100).await;
    assert_eq!(f.store.set_checked_calls(), 1);

    // Reconnecting is allowed once the old feed is gone
    let _resubscribed = controller.subscribe().await.unwrap();
    assert_eq!(*status.borrow(), SyncStatus::Live);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_flushes_queued_toggles() {
    let f = Fixture::new();
    let controller = f.open().await;
    let _subscription = controller.subscribe().await.unwrap();

    controller.toggle_item(&f.id(0), true);
    controller.toggle_item(&f.id(2), true);
    let report = controller.dispose().await.unwrap();

    assert_eq!(report.confirmed.len(), 2);
    assert!(report.is_clean());
    assert!(f.store.item(&f.id(0)).unwrap().checked);
    assert!(f.store.item(&f.id(2)).unwrap().checked);

    // The debounce timer was disarmed
    sleep(Duration::from_secs(2)).await;
    assert_eq!(f.store.set_checked_calls(), 2);
    assert_eq!(f.store.subscriber_count(&f.list.id), 0);
}

/// Store whose checked-flag writes never return in time
struct HangingStore {
    inner: InMemoryStore,
}

#[async_trait]
impl ListStore for HangingStore {
    async fn get_list_by_share_code(&self, share_code: &str) -> StoreResult<Option<ShoppingList>> {
        self.inner.get_list_by_share_code(share_code).await
    }

    async fn get_items(&self, list_id: &ListId) -> StoreResult<Vec<ShoppingListItem>> {
        self.inner.get_items(list_id).await
    }

    async fn set_item_checked(
        &self,
        item_id: &ItemId,
        checked: bool,
    ) -> StoreResult<ShoppingListItem> {
        sleep(Duration::from_secs(60)).await;
        self.inner.set_item_checked(item_id, checked).await
    }

    async fn add_item(&self, item: NewItem) -> StoreResult<ShoppingListItem> {
        self.inner.add_item(item).await
    }

    async fn update_item(
        &self,
        item_id: &ItemId,
        update: ItemUpdate,
    ) -> StoreResult<ShoppingListItem> {
        self.inner.update_item(item_id, update).await
    }

    async fn delete_item(&self, item_id: &ItemId) -> StoreResult<()> {
        self.inner.delete_item(item_id).await
    }

    async fn delete_list(&self, list_id: &ListId) -> StoreResult<()> {
        self.inner.delete_list(list_id).await
    }

    async fn clear_items(&self, list_id: &ListId) -> StoreResult<()> {
        self.inner.clear_items(list_id).await
    }

    async fn subscribe(&self, list_id: &ListId) -> StoreResult<ChangeFeed> {
        self.inner.subscribe(list_id).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_dispose_gives_up_on_a_hung_store() {
    let f = Fixture::new();
    let store = HangingStore {
        inner: f.store.clone(),
    };
    let controller = ListSyncController::builder(Arc::new(store), Arc::new(f.store.clone()))
        .with_reporter(Arc::new(f.reporter.clone()))
        .build()
        .unwrap();
    controller.load(&f.list.share_code).await.unwrap();

    controller.toggle_item(&f.id(0), true);
    let result = controller.dispose().await;

    assert!(matches!(result, Err(SyncError::FlushTimedOut(_))));
    assert_eq!(f.reporter.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_config_drives_timing_and_notifications() {
    let f = Fixture::new();
    let mut config = Config::default();
    config.sync.mutation_debounce_ms = 200;
    config.notifications.items_added = false;
    config.app.user_name = Some("Robin".to_string());

    let controller = f.builder().with_config(&config).build().unwrap();
    controller.load(&f.list.share_code).await.unwrap();
    assert_eq!(controller.user_name().as_deref(), Some("Robin"));

    controller
        .add_item(NewItem::new(f.list.id.clone(), "Rice", Category::Other))
        .await
        .unwrap();
    controller.settle().await;
    assert_eq!(f.sent(EventClass::ItemsAdded), 0);

    controller.toggle_item(&f.id(0), true);
    run_for(&controller, 250).await;
    assert_eq!(f.store.set_checked_calls(), 1);
    assert_eq!(f.sent(EventClass::ItemsChecked), 1);
}

#[tokio::test(start_paused = true)]
async fn test_two_toggles_one_batch_end_to_end() {
    let f = Fixture::new();
    let controller = f.open().await;
    let (milk, eggs) = (f.id(0), f.id(1));

    controller.toggle_item(&milk, true);
    sleep(Duration::from_millis(150)).await;
    controller.toggle_item(&eggs, true);

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.checked.len(), 2);
    assert_eq!(f.store.set_checked_calls(), 0);

    run_for(&controller, 1050).await;

    assert_eq!(f.store.set_checked_calls(), 2);
    assert!(!controller.is_pending(&milk));
    assert!(!controller.is_pending(&eggs));
    assert_eq!(controller.snapshot().checked.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_write_does_not_clear_a_newer_toggle() {
    let f = Fixture::new();
    let controller = f.open().await;
    let _subscription = controller.subscribe().await.unwrap();
    let milk = f.id(0);
    f.store.set_write_latency(Duration::from_millis(1500));

    // First write starts at 1000ms and lands at 2500ms
    controller.toggle_item(&milk, true);
    sleep(Duration::from_millis(1200)).await;

    // Second write starts at 2200ms and lands at 3700ms
    controller.toggle_item(&milk, false);
    sleep(Duration::from_millis(1400)).await;

    // The first echo arrived but the newer toggle still shields the item
    assert!(f.store.item(&milk).unwrap().checked);
    assert!(controller.is_pending(&milk));
    assert!(!controller.item(&milk).unwrap().checked);

    run_for(&controller, 1200).await;
    run_for(&controller, 100).await;
    assert!(!controller.is_pending(&milk));
    assert!(!controller.item(&milk).unwrap().checked);
    assert!(!f.store.item(&milk).unwrap().checked);
}

/// Dispatch whose sends take far longer than any flush bound
struct SlowDispatch {
    inner: InMemoryStore,
}

#[async_trait]
impl NotificationDispatch for SlowDispatch {
    async fn send(&self, notification: OutgoingNotification) -> StoreResult<()> {
        sleep(Duration::from_secs(30)).await;
        self.inner.send(notification).await
    }

    async fn subscribe_notifications(&self, list_id: &ListId) -> StoreResult<NotificationFeed> {
        self.inner.subscribe_notifications(list_id).await
    }
}

fn slow_controller(f: &Fixture) -> ListSyncController {
    let dispatch = SlowDispatch {
        inner: f.store.clone(),
    };
    ListSyncController::builder(Arc::new(f.store.clone()), Arc::new(dispatch))
        .with_clock(Arc::new(f.clock.clone()))
        .with_reporter(Arc::new(f.reporter.clone()))
        .with_throttler(NotificationThrottler::new(
            DEFAULT_THROTTLE_WINDOW,
            Arc::new(f.clock.clone()),
        ))
        .with_user_name("Sam")
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_slow_notification_does_not_hold_up_dispose() {
    let f = Fixture::new();
    let controller = slow_controller(&f);
    controller.load(&f.list.share_code).await.unwrap();

    controller.toggle_item(&f.id(0), true);
    let report = controller.dispose().await.unwrap();

    assert_eq!(report.confirmed.len(), 1);
    assert!(f.store.item(&f.id(0)).unwrap().checked);
    assert!(f.reporter.is_empty());

    // The announcement still goes out on its own
    sleep(Duration::from_secs(31)).await;
    assert_eq!(f.sent(EventClass::ItemsChecked), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_notification_does_not_hold_up_add_item() {
    let f = Fixture::new();
    let controller = slow_controller(&f);
    controller.load(&f.list.share_code).await.unwrap();

    let started = tokio::time::Instant::now();
    controller
        .add_item(NewItem::new(f.list.id.clone(), "Tea", Category::Drinks))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(f.sent(EventClass::ItemsAdded), 0);

    controller.toggle_item(&f.id(0), true);
    let report = controller.flush_mutations().await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(report.newly_checked, 1);

    controller.settle().await;
    assert_eq!(f.sent(EventClass::ItemsAdded), 1);
    assert_eq!(f.sent(EventClass::ItemsChecked), 1);
}
