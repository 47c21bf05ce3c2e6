// tests/subscriptions.rs
//
// Both store implementations must honour the same contract.

use std::collections::HashSet;
use std::sync::Arc;

use inventory_watch_bot::sheet::{MemorySheet, TabularSource};
use inventory_watch_bot::subscriptions::{
    apply_selection, MemorySubscriptionStore, SheetSubscriptionStore, SubscriptionStore, UserId,
    SUBSCRIPTION_HEADER,
};

async fn contract(store: &dyn SubscriptionStore) {
    let alice = UserId::new("111");
    let bob = UserId::new("222");

    store.add_subscription(&alice, "Jugular").await.unwrap();
    store.add_subscription(&alice, "Jugular").await.unwrap();
    store.add_subscription(&alice, "Banshee").await.unwrap();
    store.add_subscription(&bob, "Jugular").await.unwrap();

    assert_eq!(
        store.list_by_user(&alice).await.unwrap(),
        HashSet::from(["Jugular".to_string(), "Banshee".to_string()])
    );
    assert_eq!(
        store.list_by_item("Jugular").await.unwrap(),
        HashSet::from([alice.clone(), bob.clone()])
    );

    // removing something never subscribed is a no-op
    store.remove_subscription(&bob, "Banshee").await.unwrap();
    assert_eq!(store.list_by_user(&bob).await.unwrap().len(), 1);

    store.remove_subscription(&alice, "Jugular").await.unwrap();
    store.remove_subscription(&alice, "Jugular").await.unwrap();
    assert_eq!(
        store.list_by_item("Jugular").await.unwrap(),
        HashSet::from([bob.clone()])
    );
    assert!(store.list_by_item("Nope").await.unwrap().is_empty());
}

#[tokio::test]
async fn memory_store_contract() {
    contract(&MemorySubscriptionStore::new()).await;
}

#[tokio::test]
async fn sheet_store_contract() {
    let sheet = Arc::new(MemorySheet::new("Abonnements"));
    let store = SheetSubscriptionStore::new(sheet.clone());
    contract(&store).await;

    let rows = sheet.read_rows().await.unwrap();
    assert_eq!(rows[0], SUBSCRIPTION_HEADER.map(String::from).to_vec());
    // header + bob/Jugular + alice/Banshee
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn sheet_store_reads_hand_edited_rows() {
    let sheet = Arc::new(MemorySheet::with_rows(
        "Abonnements",
        vec![
            vec!["user_id".into(), "voiture".into()],
            vec![" 42 ".into(), " Jugular ".into()],
            vec!["".into(), "Orphan".into()],
            vec!["43".into()],
        ],
    ));
    let store = SheetSubscriptionStore::new(sheet);
    assert_eq!(
        store.list_by_item("Jugular").await.unwrap(),
        HashSet::from([UserId::new("42")])
    );
    assert!(store.list_by_item("Orphan").await.unwrap().is_empty());
}

#[tokio::test]
async fn selection_only_touches_offered_items() {
    let store = MemorySubscriptionStore::new();
    let u = UserId::new("5");
    store.add_subscription(&u, "Jugular").await.unwrap();
    store.add_subscription(&u, "Hidden").await.unwrap();

    let offered = vec!["Jugular".to_string(), "Banshee".to_string()];
    apply_selection(&store, &u, &offered, &["Banshee".to_string()])
        .await
        .unwrap();

    assert_eq!(
        store.list_by_user(&u).await.unwrap(),
        HashSet::from(["Banshee".to_string(), "Hidden".to_string()])
    );
}
