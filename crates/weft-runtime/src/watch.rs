//! Script source watching for rerun-on-save.

use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::error::EngineError;

const SOURCE_WATCH_DEBOUNCE: Duration = Duration::from_millis(250);

/// Invoked (debounced) whenever the watched source changes.
pub type SourceChanged = Arc<dyn Fn() + Send + Sync>;

/// Watches a script source path and fires a callback on changes.
///
/// Editors save in bursts, so raw notifications are debounced into one
/// callback per quiet period. Dropping the watcher ends the thread.
pub struct SourceWatcher {
    // Held so the OS watch stays registered for the watcher's lifetime.
    _watcher: notify::RecommendedWatcher,
}

impl std::fmt::Debug for SourceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceWatcher").finish_non_exhaustive()
    }
}

impl SourceWatcher {
    /// Start watching `path`, invoking `on_change` after each debounced
    /// burst of modifications.
    pub fn spawn(path: impl Into<PathBuf>, on_change: SourceChanged) -> Result<Self, EngineError> {
        let path = path.into();
        let (tx, rx) = std::sync::mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |result| {
            let _ = tx.send(result);
        })
        .map_err(|err| EngineError::Watch(err.to_string().into()))?;
        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|err| {
                EngineError::Watch(format!("watch {}: {err}", path.display()).into())
            })?;

        thread::Builder::new()
            .name("weft-source-watch".to_string())
            .spawn(move || loop {
                let mut relevant = match rx.recv() {
                    Ok(Ok(event)) => is_change(&event),
                    Ok(Err(err)) => {
                        warn!("source watcher event error: {err}");
                        false
                    }
                    Err(_) => break,
                };

                // Collapse the burst: keep extending the deadline while
                // further changes arrive.
                let mut deadline = Instant::now() + SOURCE_WATCH_DEBOUNCE;
                loop {
                    let now = Instant::now();
                    let Some(timeout) = deadline.checked_duration_since(now) else {
                        break;
                    };
                    match rx.recv_timeout(timeout) {
                        Ok(Ok(event)) => {
                            if is_change(&event) {
                                relevant = true;
                                deadline = Instant::now() + SOURCE_WATCH_DEBOUNCE;
                            }
                        }
                        Ok(Err(err)) => warn!("source watcher event error: {err}"),
                        Err(RecvTimeoutError::Timeout) => break,
                        Err(RecvTimeoutError::Disconnected) => return,
                    }
                }

                if relevant {
                    debug!(path = %path.display(), "source changed");
                    on_change();
                }
            })
            .map_err(|err| EngineError::ThreadSpawn(err.to_string().into()))?;

        Ok(Self { _watcher: watcher })
    }
}

fn is_change(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}
