//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose the task list session to Dart via FRB as sync calls.
//! - Own the process-wide tokio runtime that remote operations run on.
//! - Translate core errors into response envelopes.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - One session per process; `init_session` replaces it.
//! - Completed remote operations are folded in at the start of every call.

use log::{info, warn};
use std::sync::{Mutex, OnceLock};
use tasklist_core::{
    core_version as core_version_inner, init_logging as init_logging_inner,
    init_logging_from_config, ping as ping_inner, TaskItem, TaskKey, TodoConfig, TodoService,
};
use tokio::runtime::{Builder, Runtime};
use uuid::Uuid;

const RUNTIME_WORKER_THREADS: usize = 2;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();
static SESSION: OnceLock<Mutex<Option<TodoService>>> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// One task as rendered by the list view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoItemView {
    /// Local key used to address the item in later calls.
    pub key: String,
    /// Remote document id, `None` until the create has completed.
    pub remote_id: Option<String>,
    pub title: String,
    pub done: bool,
    /// Tags in stable (sorted) order.
    pub tags: Vec<String>,
}

/// List response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoListResponse {
    pub items: Vec<TodoItemView>,
    /// Remote operations still running.
    pub pending: u32,
    /// Human-readable response message for diagnostics.
    pub message: String,
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoActionResponse {
    /// Whether operation succeeded.
    pub ok: bool,
    /// Key of the created or changed item, when there is exactly one.
    pub key: Option<String>,
    /// Number of items the action changed.
    pub affected: u32,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl TodoActionResponse {
    fn success(message: impl Into<String>, key: Option<String>, affected: usize) -> Self {
        Self {
            ok: true,
            key,
            affected: saturating_u32(affected),
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            key: None,
            affected: 0,
            message: message.into(),
        }
    }
}

/// Starts a new session from TOML configuration text.
///
/// An empty string selects the defaults: tags on, no remote backend.
///
/// # FFI contract
/// - Sync call; opens the configured backend (may touch disk).
/// - Replaces any existing session; its unfinished remote work keeps running.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn init_session(config_toml: String) -> TodoActionResponse {
    let config = match TodoConfig::from_toml_str(config_toml.as_str()) {
        Ok(config) => config,
        Err(err) => return TodoActionResponse::failure(format!("init_session failed: {err}")),
    };
    if let Err(err) = init_logging_from_config(&config.logging) {
        return TodoActionResponse::failure(format!("init_session failed: {err}"));
    }
    let service = match build_service(&config) {
        Ok(service) => service,
        Err(err) => return TodoActionResponse::failure(format!("init_session failed: {err}")),
    };
    let backend = service.backend_name().unwrap_or("none");

    match session().lock() {
        Ok(mut guard) => {
            *guard = Some(service);
            info!("event=session_init module=ffi status=ok backend={backend}");
            TodoActionResponse::success(format!("Session ready ({backend})."), None, 0)
        }
        Err(_) => TodoActionResponse::failure("init_session failed: session lock poisoned"),
    }
}

/// Replaces the list with the remote collection content.
///
/// # FFI contract
/// - Sync call; blocks until in-flight operations and the fetch complete.
/// - Without a remote backend this only reports the current size.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn todo_hydrate() -> TodoActionResponse {
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(err) => return TodoActionResponse::failure(format!("todo_hydrate failed: {err}")),
    };
    match with_session(|service| {
        runtime
            .block_on(service.hydrate())
            .map_err(|err| err.to_string())
    }) {
        Ok(count) => TodoActionResponse::success(format!("Loaded {count} task(s)."), None, count),
        Err(err) => TodoActionResponse::failure(format!("todo_hydrate failed: {err}")),
    }
}

/// Returns the current list in display order.
#[flutter_rust_bridge::frb(sync)]
pub fn todo_list() -> TodoListResponse {
    match with_session(|service| Ok(list_in(service))) {
        Ok(response) => response,
        Err(err) => TodoListResponse {
            items: Vec::new(),
            pending: 0,
            message: format!("todo_list failed: {err}"),
        },
    }
}

/// Adds a task with optional tags.
///
/// Blank titles are ignored or rejected according to session configuration.
#[flutter_rust_bridge::frb(sync)]
pub fn todo_add(title: String, tags: Vec<String>) -> TodoActionResponse {
    with_session(|service| Ok(add_in(service, title.as_str(), tags)))
        .unwrap_or_else(|err| TodoActionResponse::failure(format!("todo_add failed: {err}")))
}

/// Sets the completion flag of the task addressed by `key`.
#[flutter_rust_bridge::frb(sync)]
pub fn todo_toggle_done(key: String, done: bool) -> TodoActionResponse {
    with_session(|service| Ok(toggle_in(service, key.as_str(), done))).unwrap_or_else(|err| {
        TodoActionResponse::failure(format!("todo_toggle_done failed: {err}"))
    })
}

/// Removes the task addressed by `key`.
#[flutter_rust_bridge::frb(sync)]
pub fn todo_remove(key: String) -> TodoActionResponse {
    with_session(|service| Ok(remove_in(service, key.as_str())))
        .unwrap_or_else(|err| TodoActionResponse::failure(format!("todo_remove failed: {err}")))
}

/// Removes every completed task.
#[flutter_rust_bridge::frb(sync)]
pub fn todo_clear_completed() -> TodoActionResponse {
    with_session(|service| {
        let removed = service.clear_completed();
        Ok(TodoActionResponse::success(
            format!("Cleared {} completed task(s).", removed.len()),
            None,
            removed.len(),
        ))
    })
    .unwrap_or_else(|err| {
        TodoActionResponse::failure(format!("todo_clear_completed failed: {err}"))
    })
}

/// Labels offered by the tag picker; empty when tags are disabled.
#[flutter_rust_bridge::frb(sync)]
pub fn todo_tag_labels() -> Vec<String> {
    with_session(|service| Ok(service.tag_labels().to_vec())).unwrap_or_default()
}

fn list_in(service: &TodoService) -> TodoListResponse {
    let items = service
        .items()
        .iter()
        .map(to_item_view)
        .collect::<Vec<_>>();
    let message = if items.is_empty() {
        "No tasks.".to_string()
    } else {
        format!("{} task(s).", items.len())
    };
    TodoListResponse {
        items,
        pending: saturating_u32(service.in_flight()),
        message,
    }
}

fn add_in(service: &mut TodoService, title: &str, tags: Vec<String>) -> TodoActionResponse {
    match service.add(title, tags) {
        Ok(Some(item)) => {
            TodoActionResponse::success("Task added.", Some(item.key.to_string()), 1)
        }
        Ok(None) => TodoActionResponse::success("Blank title ignored.", None, 0),
        Err(err) => TodoActionResponse::failure(format!("todo_add failed: {err}")),
    }
}

fn toggle_in(service: &mut TodoService, key: &str, done: bool) -> TodoActionResponse {
    let key = match parse_key(key) {
        Ok(key) => key,
        Err(err) => return TodoActionResponse::failure(format!("todo_toggle_done failed: {err}")),
    };
    match service.toggle_done(key, done) {
        Ok(item) => TodoActionResponse::success(
            if item.done {
                "Task completed."
            } else {
                "Task reopened."
            },
            Some(item.key.to_string()),
            1,
        ),
        Err(err) => TodoActionResponse::failure(format!("todo_toggle_done failed: {err}")),
    }
}

fn remove_in(service: &mut TodoService, key: &str) -> TodoActionResponse {
    let key = match parse_key(key) {
        Ok(key) => key,
        Err(err) => return TodoActionResponse::failure(format!("todo_remove failed: {err}")),
    };
    match service.remove(key) {
        Ok(item) => TodoActionResponse::success("Task removed.", Some(item.key.to_string()), 1),
        Err(err) => TodoActionResponse::failure(format!("todo_remove failed: {err}")),
    }
}

fn to_item_view(item: &TaskItem) -> TodoItemView {
    TodoItemView {
        key: item.key.to_string(),
        remote_id: item.id.clone(),
        title: item.title.clone(),
        done: item.done,
        tags: item.tags.iter().cloned().collect(),
    }
}

fn parse_key(raw: &str) -> Result<TaskKey, String> {
    Uuid::parse_str(raw.trim()).map_err(|_| format!("invalid task key `{}`", raw.trim()))
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn runtime() -> Result<&'static Runtime, String> {
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime);
    }
    let built = Builder::new_multi_thread()
        .worker_threads(RUNTIME_WORKER_THREADS)
        .thread_name("tasklist-remote")
        .build()
        .map_err(|err| format!("runtime init failed: {err}"))?;
    // A concurrent caller may have won; its runtime is kept and ours dropped.
    Ok(RUNTIME.get_or_init(|| built))
}

fn session() -> &'static Mutex<Option<TodoService>> {
    SESSION.get_or_init(|| Mutex::new(None))
}

fn build_service(config: &TodoConfig) -> Result<TodoService, String> {
    let runtime = runtime()?;
    TodoService::from_config(config, runtime.handle().clone()).map_err(|err| err.to_string())
}

/// Runs `f` on the process session, creating a default one on first use.
fn with_session<T>(f: impl FnOnce(&mut TodoService) -> Result<T, String>) -> Result<T, String> {
    let mut guard = session()
        .lock()
        .map_err(|_| "session lock poisoned".to_string())?;
    if guard.is_none() {
        warn!("event=session_init module=ffi status=defaulted reason=not_initialized");
        *guard = Some(build_service(&TodoConfig::default())?);
    }
    let Some(service) = guard.as_mut() else {
        return Err("session unavailable".to_string());
    };
    service.process_events();
    f(service)
}
