//! Session lifecycle.
//!
//! A session exclusively owns one VM + debugger pair behind a per-session
//! async mutex; the registry owns the sessions behind a reader-writer map.
//! Sessions never share state: isolation is both the security model and
//! the concurrency model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use armlet::core::Machine;
use armlet::dbg::Debugger;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cfg::Config;
use crate::err::ApiError;
use crate::evt::Envelope;

/// Broadcast queue depth per session; laggards see a `dropped` marker.
pub const EVENT_CAPACITY: usize = 256;

/// The lock-guarded half of a session.
#[derive(Debug)]
pub struct Inner {
    /// The virtual machine.
    pub vm: Machine,
    /// The debugger wrapped around it.
    pub dbg: Debugger,
    /// Configuration captured at creation.
    pub cfg: Config,
}

/// One client's VM + debugger pair.
#[derive(Debug)]
pub struct Session {
    /// Opaque identifier.
    pub id: Uuid,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    pub(crate) state: Mutex<Inner>,
    pub(crate) events: broadcast::Sender<Envelope>,
    /// Cooperative cancellation flag polled between instructions.
    pub(crate) cancel: AtomicBool,
    /// Wakes an executor parked on stdin.
    pub(crate) stdin: Notify,
    /// Whether a run executor task is active.
    pub(crate) running: AtomicBool,
    /// Bumped by load/reset/restart/destroy so a stale executor exits
    /// without touching the fresh state.
    pub(crate) epoch: AtomicU64,
    last: std::sync::Mutex<Instant>,
}

impl Session {
    fn new(cfg: Config, memory_size: Option<u32>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            state: Mutex::new(Inner {
                vm: Machine::new(cfg.layout(memory_size)),
                dbg: Debugger::new(cfg.trace_capacity),
                cfg,
            }),
            events,
            cancel: AtomicBool::new(false),
            stdin: Notify::new(),
            running: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            last: std::sync::Mutex::new(Instant::now()),
        })
    }

    /// Subscribes to the session's event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.events.subscribe()
    }

    /// Marks the session as recently used.
    pub(crate) fn touch(&self) {
        *self.last.lock().expect("activity clock") = Instant::now();
    }

    /// Time since the last request against this session.
    pub(crate) fn idle(&self) -> Duration {
        self.last.lock().expect("activity clock").elapsed()
    }
}

/// Directory of active sessions.
pub struct Registry {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
    /// Configuration applied to new sessions.
    pub cfg: RwLock<Config>,
}

impl Registry {
    /// Constructs an empty registry.
    #[must_use]
    pub fn new(cfg: Config) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            cfg: RwLock::new(cfg),
        })
    }

    /// Creates a session, optionally overriding the data-window size.
    ///
    /// # Errors
    ///
    /// Errors on an out-of-range memory size.
    pub async fn create(&self, memory_size: Option<u32>) -> Result<Arc<Session>, ApiError> {
        if let Some(size) = memory_size {
            if !(0x1_0000..=0x100_0000).contains(&size) {
                return Err(ApiError::invalid(
                    "memorySize must be between 64 KiB and 16 MiB",
                ));
            }
        }
        let cfg = *self.cfg.read().await;
        let session = Session::new(cfg, memory_size);
        self.sessions
            .write()
            .await
            .insert(session.id, Arc::clone(&session));
        info!(session = %session.id, "session created");
        Ok(session)
    }

    /// Looks up a session.
    ///
    /// # Errors
    ///
    /// Errors when the ID is unknown (destroyed sessions included).
    pub async fn get(&self, id: Uuid) -> Result<Arc<Session>, ApiError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::no_session(id))
    }

    /// Snapshot of the active sessions.
    pub async fn list(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Destroys a session: cancels any in-flight run and drops it from
    /// the directory. Event subscribers observe channel closure once the
    /// last reference is gone.
    ///
    /// # Errors
    ///
    /// Errors when the ID is unknown.
    pub async fn destroy(&self, id: Uuid) -> Result<(), ApiError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| ApiError::no_session(id))?;
        session.epoch.fetch_add(1, Ordering::SeqCst);
        session.cancel.store(true, Ordering::SeqCst);
        session.stdin.notify_one();
        info!(session = %id, "session destroyed");
        Ok(())
    }

    /// Spawns the idle-eviction sweep.
    pub fn spawn_sweeper(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(60));
            loop {
                tick.tick().await;
                let timeout =
                    Duration::from_secs(registry.cfg.read().await.session_timeout_secs);
                let stale: Vec<Uuid> = registry
                    .sessions
                    .read()
                    .await
                    .values()
                    .filter(|session| session.idle() > timeout)
                    .map(|session| session.id)
                    .collect();
                for id in stale {
                    debug!(session = %id, "evicting idle session");
                    let _ = registry.destroy(id).await;
                }
            }
        });
    }
}
