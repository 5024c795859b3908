// src/sessions.rs
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::analysis::AnalysisPoller;
use crate::errors::{MockupError, Result};
use crate::mockup::MockupEditor;

pub type SharedEditor = Arc<tokio::sync::Mutex<MockupEditor>>;

pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

struct Session {
    editor: SharedEditor,
    poll: Option<JoinHandle<()>>,
    last_seen: Instant,
}

impl Session {
    async fn shut_down(self) {
        if let Some(poll) = self.poll {
            poll.abort();
        }
        self.editor.lock().await.close();
    }
}

/// Open editor sessions, one editor per session id. Sessions nobody has
/// touched within the idle TTL are closed by [`SessionRegistry::evict_idle`].
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Session>>,
    idle_ttl: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_idle_ttl(DEFAULT_IDLE_TTL)
    }
}

impl SessionRegistry {
    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_ttl,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Session>> {
        // A panic while holding the map cannot leave it half-updated.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn open(&self, editor: MockupEditor) -> (Uuid, SharedEditor) {
        let id = Uuid::new_v4();
        let editor = Arc::new(tokio::sync::Mutex::new(editor));
        self.lock().insert(
            id,
            Session {
                editor: editor.clone(),
                poll: None,
                last_seen: Instant::now(),
            },
        );
        info!("Opened mockup session {}", id);
        (id, editor)
    }

    /// Looks up a session and marks it as recently used.
    pub fn get(&self, id: &Uuid) -> Result<SharedEditor> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| MockupError::NotFound(format!("session {}", id)))?;
        session.last_seen = Instant::now();
        Ok(session.editor.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Starts polling the editor's pending analysis in the background, replacing
    /// any earlier poll for the session.
    pub fn start_polling(&self, id: &Uuid, poller: AnalysisPoller, analysis_id: String) -> Result<()> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| MockupError::NotFound(format!("session {}", id)))?;

        if let Some(previous) = session.poll.take() {
            previous.abort();
        }
        session.poll = Some(spawn_analysis_poll(session.editor.clone(), poller, analysis_id));
        Ok(())
    }

    /// Stops polling, closes the editor and forgets the session.
    pub async fn close(&self, id: &Uuid) -> Result<()> {
        let session = self
            .lock()
            .remove(id)
            .ok_or_else(|| MockupError::NotFound(format!("session {}", id)))?;

        session.shut_down().await;
        info!("Closed mockup session {}", id);
        Ok(())
    }

    /// Closes every session idle for longer than the TTL. Returns how many went.
    pub async fn evict_idle(&self) -> usize {
        let expired: Vec<(Uuid, Session)> = {
            let mut sessions = self.lock();
            let now = Instant::now();
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, s)| now.duration_since(s.last_seen) > self.idle_ttl)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|s| (id, s)))
                .collect()
        };

        let count = expired.len();
        for (id, session) in expired {
            session.shut_down().await;
            info!("Evicted idle mockup session {}", id);
        }
        count
    }
}

/// Runs [`SessionRegistry::evict_idle`] every `every` until the registry is dropped.
pub fn spawn_idle_sweeper(registry: &Arc<SessionRegistry>, every: Duration) -> JoinHandle<()> {
    let registry = Arc::downgrade(registry);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(registry) = registry.upgrade() else {
                break;
            };
            let evicted = registry.evict_idle().await;
            if evicted > 0 {
                info!("Idle sweep closed {} session(s), {} open", evicted, registry.len());
            }
        }
    })
}

/// Polls without holding the editor lock, then applies the outcome if the
/// editor is still waiting on the same analysis.
pub fn spawn_analysis_poll(
    editor: SharedEditor,
    poller: AnalysisPoller,
    analysis_id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let progress = editor.clone();
        let result = poller
            .poll(&analysis_id, |status| {
                if let Ok(mut editor) = progress.try_lock() {
                    editor.record_progress(status);
                }
            })
            .await;

        let mut editor = editor.lock().await;
        if editor.pending_analysis_id() != Some(analysis_id.as_str()) {
            return;
        }
        match result {
            Ok(snapshot) => {
                if let Err(e) = editor.resolve_analysis(snapshot).await {
                    warn!("Analysis {} did not open an editable wall: {}", analysis_id, e);
                }
            }
            Err(e) => editor.record_poll_failure(&e),
        }
    })
}
