use std::sync::Arc;
use std::time::Duration;
use tasklist_core::{
    BehaviorConfig, DocumentCollection, InMemoryCollection, RemoteBackend, RemoteError,
    RemoteFailurePolicy, RemoteId, RemoteOperation, RemoteResult, ServiceError, StoredDocument,
    TodoConfig, TodoDocument, TodoService,
};
use tokio::runtime::Handle;

fn surface() -> BehaviorConfig {
    BehaviorConfig {
        remote_failure: RemoteFailurePolicy::Surface,
        ..BehaviorConfig::default()
    }
}

fn mirrored(behavior: BehaviorConfig) -> (TodoService, Arc<InMemoryCollection>) {
    let collection = Arc::new(InMemoryCollection::new());
    let service = TodoService::with_remote(behavior, collection.clone(), Handle::current());
    (service, collection)
}

fn stored(id: &str, title: &str, done: bool, tags: &[&str]) -> StoredDocument {
    StoredDocument {
        id: id.to_string(),
        document: TodoDocument {
            title: title.to_string(),
            done,
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
        },
    }
}

/// Holds back updates that mark a document done.
struct SlowCompletion(InMemoryCollection);

impl DocumentCollection for SlowCompletion {
    fn backend_name(&self) -> &'static str {
        "slow"
    }

    fn list_documents(&self) -> RemoteResult<Vec<StoredDocument>> {
        self.0.list_documents()
    }

    fn create_document(&self, document: &TodoDocument) -> RemoteResult<RemoteId> {
        self.0.create_document(document)
    }

    fn update_document(&self, id: &str, document: &TodoDocument) -> RemoteResult<()> {
        if document.done {
            std::thread::sleep(Duration::from_millis(200));
        }
        self.0.update_document(id, document)
    }

    fn delete_document(&self, id: &str) -> RemoteResult<()> {
        self.0.delete_document(id)
    }
}

/// Panics on every update.
struct PanickingUpdates(InMemoryCollection);

impl DocumentCollection for PanickingUpdates {
    fn backend_name(&self) -> &'static str {
        "panicking"
    }

    fn list_documents(&self) -> RemoteResult<Vec<StoredDocument>> {
        self.0.list_documents()
    }

    fn create_document(&self, document: &TodoDocument) -> RemoteResult<RemoteId> {
        self.0.create_document(document)
    }

    fn update_document(&self, _id: &str, _document: &TodoDocument) -> RemoteResult<()> {
        panic!("update backend exploded");
    }

    fn delete_document(&self, id: &str) -> RemoteResult<()> {
        self.0.delete_document(id)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn add_mirrors_create_and_assigns_remote_id() {
    let (mut service, collection) = mirrored(BehaviorConfig::default());

    let item = service.add("Buy milk", ["House"]).unwrap().unwrap();
    assert!(item.id.is_none());
    assert_eq!(service.in_flight(), 1);

    service.settle().await;

    assert_eq!(service.in_flight(), 0);
    let persisted = service.get(item.key).unwrap();
    let id = persisted.id.clone().unwrap();
    let document = collection.get(&id).unwrap();
    assert_eq!(document.title, "Buy milk");
    assert!(!document.done);
    assert_eq!(document.tags, vec!["House".to_string()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_create_failure_keeps_local_item() {
    let (mut service, collection) = mirrored(BehaviorConfig::default());
    collection.fail(RemoteOperation::Create);

    let item = service.add("offline", Vec::<String>::new()).unwrap().unwrap();
    service.settle().await;

    assert_eq!(service.items().len(), 1);
    assert_eq!(service.items()[0].key, item.key);
    assert!(service.items()[0].id.is_none());
    assert!(collection.is_empty());
    assert!(service.take_failures().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn surface_policy_collects_failures() {
    let (mut service, collection) = mirrored(surface());
    collection.fail(RemoteOperation::Create);

    let item = service.add("offline", Vec::<String>::new()).unwrap().unwrap();
    service.settle().await;

    let failures = service.take_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].operation, RemoteOperation::Create);
    assert_eq!(failures[0].key, Some(item.key));
    assert!(matches!(failures[0].error, RemoteError::Unavailable(_)));
    assert!(service.take_failures().is_empty());
    assert_eq!(service.items().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn remove_before_create_completes_deletes_orphan_document() {
    let (mut service, collection) = mirrored(BehaviorConfig::default());

    let item = service.add("short lived", Vec::<String>::new()).unwrap().unwrap();
    service.remove(item.key).unwrap();
    service.settle().await;

    assert!(service.items().is_empty());
    assert!(collection.is_empty());
    assert_eq!(
        collection.calls(),
        vec![RemoteOperation::Create, RemoteOperation::Delete]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn toggle_during_create_sends_follow_up_update() {
    let (mut service, collection) = mirrored(BehaviorConfig::default());

    let item = service.add("quick", Vec::<String>::new()).unwrap().unwrap();
    service.toggle_done(item.key, true).unwrap();
    service.settle().await;

    let id = service.get(item.key).unwrap().id.clone().unwrap();
    assert!(collection.get(&id).unwrap().done);
    assert_eq!(
        collection.calls(),
        vec![RemoteOperation::Create, RemoteOperation::Update]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn toggle_of_persisted_item_updates_document() {
    let (mut service, collection) = mirrored(BehaviorConfig::default());
    let item = service.add("laundry", ["House"]).unwrap().unwrap();
    service.settle().await;

    service.toggle_done(item.key, true).unwrap();
    service.settle().await;
    let id = service.get(item.key).unwrap().id.clone().unwrap();
    assert!(collection.get(&id).unwrap().done);

    service.toggle_done(item.key, false).unwrap();
    service.settle().await;
    assert!(!collection.get(&id).unwrap().done);
}

#[tokio::test(flavor = "multi_thread")]
async fn clear_completed_cascades_remote_deletes() {
    let (mut service, collection) = mirrored(BehaviorConfig::default());
    let done = service.add("done", Vec::<String>::new()).unwrap().unwrap();
    let open = service.add("open", Vec::<String>::new()).unwrap().unwrap();
    service.settle().await;
    service.toggle_done(done.key, true).unwrap();

    let removed = service.clear_completed();
    service.settle().await;

    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].key, done.key);
    assert_eq!(collection.len(), 1);
    let remaining_id = service.get(open.key).unwrap().id.clone().unwrap();
    assert!(collection.get(&remaining_id).is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn clear_all_empties_remote_collection() {
    let (mut service, collection) = mirrored(BehaviorConfig::default());
    service.add("a", Vec::<String>::new()).unwrap();
    service.add("b", Vec::<String>::new()).unwrap();
    service.settle().await;
    assert_eq!(collection.len(), 2);

    assert_eq!(service.clear_all().len(), 2);
    service.settle().await;

    assert!(service.items().is_empty());
    assert!(collection.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_failure_is_recorded_without_restoring_item() {
    let (mut service, collection) = mirrored(surface());
    let item = service.add("sticky", Vec::<String>::new()).unwrap().unwrap();
    service.settle().await;
    collection.fail(RemoteOperation::Delete);

    service.remove(item.key).unwrap();
    service.settle().await;

    assert!(service.items().is_empty());
    assert_eq!(collection.len(), 1);
    let failures = service.take_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].operation, RemoteOperation::Delete);
    assert!(failures[0].id.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn hydrate_loads_remote_documents_and_skips_blank_titles() {
    let collection = Arc::new(InMemoryCollection::with_documents(vec![
        stored("a", "Homework", false, &["School"]),
        stored("b", "  ", true, &[]),
        stored("c", "Dishes", true, &["House", "Personal"]),
    ]));
    let mut service =
        TodoService::with_remote(BehaviorConfig::default(), collection.clone(), Handle::current());

    assert_eq!(service.hydrate().await.unwrap(), 2);

    let items = service.items();
    assert_eq!(items[0].title, "Homework");
    assert_eq!(items[0].id.as_deref(), Some("a"));
    assert_eq!(items[1].title, "Dishes");
    assert!(items[1].done);
    assert!(items[1].has_tag("House"));
    assert!(items[1].has_tag("Personal"));
    assert_eq!(collection.len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn hydrate_failure_follows_policy() {
    let (mut quiet, quiet_collection) = mirrored(BehaviorConfig::default());
    quiet.add("kept", Vec::<String>::new()).unwrap();
    quiet.settle().await;
    quiet_collection.fail(RemoteOperation::List);
    assert_eq!(quiet.hydrate().await.unwrap(), 1);
    assert!(quiet.take_failures().is_empty());

    let (mut loud, loud_collection) = mirrored(surface());
    loud_collection.fail(RemoteOperation::List);
    let err = loud.hydrate().await.unwrap_err();
    assert!(matches!(err, ServiceError::Remote(RemoteError::Unavailable(_))));
    let failures = loud.take_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].operation, RemoteOperation::List);
}

#[tokio::test(flavor = "multi_thread")]
async fn process_events_applies_completions_without_waiting() {
    let (mut service, _collection) = mirrored(BehaviorConfig::default());
    let item = service.add("poll", Vec::<String>::new()).unwrap().unwrap();

    let mut applied = 0;
    for _ in 0..200 {
        applied += service.process_events();
        if applied > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    assert_eq!(applied, 1);
    assert_eq!(service.in_flight(), 0);
    assert!(service.get(item.key).unwrap().id.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn subscribers_see_remote_id_assignment() {
    let (mut service, _collection) = mirrored(BehaviorConfig::default());
    let mut receiver = service.subscribe();

    service.add("watched", Vec::<String>::new()).unwrap();
    assert!(receiver.has_changed().unwrap());
    assert!(receiver.borrow_and_update().items[0].id.is_none());

    service.settle().await;
    assert!(receiver.has_changed().unwrap());
    assert!(receiver.borrow_and_update().items[0].id.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn from_config_builds_memory_backed_session() {
    let mut config = TodoConfig::default();
    config.remote.backend = RemoteBackend::Memory;
    let mut service = TodoService::from_config(&config, Handle::current()).unwrap();
    assert_eq!(service.backend_name(), Some("memory"));

    service.add("configured", Vec::<String>::new()).unwrap();
    service.settle().await;
    assert_eq!(service.hydrate().await.unwrap(), 1);

    let local = TodoService::from_config(&TodoConfig::default(), Handle::current()).unwrap();
    assert!(!local.has_remote());
}

#[tokio::test(flavor = "multi_thread")]
async fn rapid_toggles_reach_remote_in_order() {
    let collection = Arc::new(SlowCompletion(InMemoryCollection::new()));
    let mut service =
        TodoService::with_remote(surface(), collection.clone(), Handle::current());

    let item = service.add("flip", Vec::<String>::new()).unwrap().unwrap();
    service.settle().await;
    let id = service.get(item.key).unwrap().id.clone().unwrap();

    service.toggle_done(item.key, true).unwrap();
    service.toggle_done(item.key, false).unwrap();
    service.settle().await;

    assert!(!service.get(item.key).unwrap().done);
    assert!(!collection.0.get(&id).unwrap().done);
    assert!(service.take_failures().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn remove_after_slow_update_deletes_document() {
    let collection = Arc::new(SlowCompletion(InMemoryCollection::new()));
    let mut service =
        TodoService::with_remote(surface(), collection.clone(), Handle::current());

    let item = service.add("finish then drop", Vec::<String>::new()).unwrap().unwrap();
    service.settle().await;

    service.toggle_done(item.key, true).unwrap();
    service.remove(item.key).unwrap();
    service.settle().await;

    assert!(collection.0.is_empty());
    assert!(service.take_failures().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn toggle_after_hydrate_keeps_remote_title_and_tags() {
    let collection = Arc::new(InMemoryCollection::with_documents(vec![stored(
        "a",
        "  padded  ",
        false,
        &[" House", "", "School"],
    )]));
    let mut service = TodoService::with_remote(surface(), collection.clone(), Handle::current());

    assert_eq!(service.hydrate().await.unwrap(), 1);
    let key = service.items()[0].key;
    assert_eq!(service.items()[0].title, "  padded  ");

    service.toggle_done(key, true).unwrap();
    service.settle().await;

    let document = collection.get("a").unwrap();
    assert!(document.done);
    assert_eq!(document.title, "  padded  ");
    let mut tags = document.tags.clone();
    tags.sort();
    assert_eq!(
        tags,
        vec!["".to_string(), " House".to_string(), "School".to_string()]
    );
    assert!(service.take_failures().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn hydrate_alone_leaves_no_local_changes() {
    let collection = Arc::new(InMemoryCollection::with_documents(vec![stored(
        "a", "Homework", false, &[],
    )]));
    let mut service =
        TodoService::with_remote(BehaviorConfig::default(), collection, Handle::current());
    assert!(!service.has_local_changes());

    service.hydrate().await.unwrap();
    assert!(!service.has_local_changes());
    service.hydrate().await.unwrap();
    assert!(!service.has_local_changes());

    service.add("local", Vec::<String>::new()).unwrap();
    assert!(service.has_local_changes());
    service.settle().await;
    service.hydrate().await.unwrap();
    assert!(!service.has_local_changes());
    assert_eq!(service.items().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_backend_still_settles() {
    let collection = Arc::new(PanickingUpdates(InMemoryCollection::new()));
    let mut service = TodoService::with_remote(surface(), collection, Handle::current());

    let item = service.add("fragile", Vec::<String>::new()).unwrap().unwrap();
    service.settle().await;
    service.toggle_done(item.key, true).unwrap();

    tokio::time::timeout(Duration::from_secs(5), service.settle())
        .await
        .unwrap();

    assert_eq!(service.in_flight(), 0);
    assert!(service.get(item.key).unwrap().done);
    let failures = service.take_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].operation, RemoteOperation::Update);
    match &failures[0].error {
        RemoteError::Aborted(message) => assert!(message.contains("exploded")),
        other => panic!("unexpected error {other:?}"),
    }
}
