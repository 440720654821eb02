//! Folder watches
//!
//! One `notify` watcher per protected folder, all feeding a single channel.
//! Events are authorized only when they can be attributed to the agent's own
//! recent writes (see [`RecentPaths`]).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::event::{AccessKind, AccessMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

pub type WatchSender = mpsc::UnboundedSender<Event>;
pub type WatchReceiver = mpsc::UnboundedReceiver<Event>;

/// Start a recursive watch on `folder`, forwarding every event to `tx`.
pub fn start_watch(folder: &Path, tx: WatchSender) -> Result<RecommendedWatcher, notify::Error> {
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(e) => log::warn!("[Vault] Watch error: {}", e),
        },
        Config::default(),
    )?;
    watcher.watch(folder, RecursiveMode::Recursive)?;
    Ok(watcher)
}

/// Short name for an event kind, `None` for events that are not changes
/// (plain opens and reads).
pub fn change_kind(kind: &EventKind) -> Option<&'static str> {
    match kind {
        EventKind::Create(_) => Some("create"),
        EventKind::Modify(_) => Some("modify"),
        EventKind::Remove(_) => Some("remove"),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => Some("write"),
        EventKind::Access(_) => None,
        EventKind::Any | EventKind::Other => Some("other"),
    }
}

/// Paths touched recently, forgotten after `window`.
///
/// Used twice by the vault: the own-write ledger (paths the agent itself
/// just wrote) and the report debounce (paths already reported).
pub struct RecentPaths {
    window: Duration,
    seen: Mutex<HashMap<PathBuf, Instant>>,
}

impl RecentPaths {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn note(&self, path: &Path) {
        let mut seen = self.seen.lock();
        let now = Instant::now();
        seen.retain(|_, at| now.duration_since(*at) <= self.window);
        seen.insert(path.to_path_buf(), now);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.seen
            .lock()
            .get(path)
            .map_or(false, |at| at.elapsed() <= self.window)
    }

    pub fn clear(&self) {
        self.seen.lock().clear();
    }
}
