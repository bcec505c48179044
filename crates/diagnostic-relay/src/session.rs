// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Session lifecycle.
//!
//! A [`Relay`] is either inactive or running one session. Each activation
//! starts a new session with a fresh id, configuration, queue and loop
//! detector; deactivation tears all of it down and restores the host.
//!
//! Every piece of state that capture paths and background tasks touch lives
//! behind one mutex, held only for short synchronous sections. Work that
//! resumes after an await (a network completion, the delivery timer, a loop
//! re-check) carries the session id it started under and does nothing when
//! that session is no longer current.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{RelayConfig, RelayOptions};
use crate::error::RelayError;
use crate::event::Event;
use crate::flusher::Flusher;
use crate::host::Host;
use crate::intercept::filter::resolve_url;
use crate::intercept::Interceptions;
use crate::loop_detector::{LoopDetector, Recheck, Verdict};
use crate::queue::OutboundQueue;

/// Outcome of [`Relay::activate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    /// The host context does not allow capture; nothing was changed.
    Skipped,
    Started { session: u64 },
}

/// Session data a capture path reads before building an event.
pub(crate) struct Capture {
    pub(crate) session: u64,
    pub(crate) config: Arc<RelayConfig>,
}

struct SessionState {
    active: bool,
    session: u64,
    config: Arc<RelayConfig>,
    detector: LoopDetector,
    queue: OutboundQueue,
    cancel: CancellationToken,
    notify: Arc<Notify>,
    runtime: Option<Handle>,
}

impl SessionState {
    fn is_current(&self, session: u64) -> bool {
        self.active && self.session == session
    }

    fn enqueue(&mut self, event: Event) {
        self.queue.push(event);
        self.notify.notify_one();
    }

    /// Drops everything owned by the current session.
    fn end_session(&mut self) {
        self.cancel.cancel();
        self.queue.clear();
        self.detector.clear();
        self.session += 1;
    }
}

/// State shared between the relay, the installed wrappers and the
/// background tasks.
pub(crate) struct Shared {
    origin: String,
    state: Mutex<SessionState>,
    /// Held across a delivery. Outlives sessions so that a new session never
    /// sends while a previous one is still sending.
    delivery: tokio::sync::Mutex<()>,
}

impl Shared {
    fn new(origin: String) -> Self {
        let config = Arc::new(RelayConfig::default());
        Shared {
            origin,
            state: Mutex::new(SessionState {
                active: false,
                session: 0,
                queue: OutboundQueue::new(config.max_queue_size),
                config,
                detector: LoopDetector::default(),
                cancel: CancellationToken::new(),
                notify: Arc::new(Notify::new()),
                runtime: None,
            }),
            delivery: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn origin(&self) -> &str {
        &self.origin
    }

    /// The current session, or `None` when inactive.
    pub(crate) fn snapshot(&self) -> Option<Capture> {
        let state = self.lock();
        state.active.then(|| Capture {
            session: state.session,
            config: Arc::clone(&state.config),
        })
    }

    /// Runs `event` through the loop detector and queues it if it passes.
    /// Events of a session that is no longer current are dropped.
    pub(crate) fn submit(self: &Arc<Self>, session: u64, event: Event) {
        let mut state = self.lock();
        if !state.is_current(session) {
            debug!("Dropping event from stale session {session}");
            return;
        }
        let config = Arc::clone(&state.config);
        let key = event.identity_key();
        match state.detector.observe(
            &key,
            Instant::now(),
            config.loop_threshold,
            config.loop_window,
        ) {
            Verdict::Pass => state.enqueue(event),
            Verdict::Suppress => {}
            Verdict::LoopDetected { count } => {
                debug!("Loop detected for \"{key}\" ({count} occurrences), suppressing");
                let summary =
                    Event::loop_detected(&key, count, config.loop_window_ms(), &self.origin);
                state.enqueue(summary);
                if let Some(runtime) = &state.runtime {
                    runtime.spawn(recheck_loop(
                        Arc::clone(self),
                        session,
                        key,
                        state.cancel.clone(),
                        config,
                    ));
                }
            }
        }
    }

    fn take_batch(&self, session: u64, max: usize) -> Option<Vec<Event>> {
        let mut state = self.lock();
        state
            .is_current(session)
            .then(|| state.queue.take_batch(max))
    }

    fn has_pending(&self, session: u64) -> Option<bool> {
        let state = self.lock();
        state
            .is_current(session)
            .then(|| !state.queue.is_empty())
    }

    fn recheck(&self, session: u64, key: &str, config: &RelayConfig) -> Option<Recheck> {
        let mut state = self.lock();
        state.is_current(session).then(|| {
            state
                .detector
                .recheck(key, Instant::now(), config.loop_threshold, config.loop_window)
        })
    }
}

/// Periodically re-examines a suppressed key until it calms down.
async fn recheck_loop(
    shared: Arc<Shared>,
    session: u64,
    key: String,
    cancel: CancellationToken,
    config: Arc<RelayConfig>,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = sleep(config.loop_window) => {}
        }
        match shared.recheck(session, &key, &config) {
            Some(Recheck::StillLooping) => {}
            Some(Recheck::Cleared) => {
                debug!("Loop on \"{key}\" ended, no longer suppressed");
                return;
            }
            Some(Recheck::Gone) | None => return,
        }
    }
}

/// Single-flight delivery: at most one batch is in flight at any time,
/// across sessions.
///
/// Waits for an enqueue signal, lets `batch_delay` pass so that bursts
/// coalesce, sends one batch and, if events remain, signals itself again.
/// Cancelling the session abandons a send in progress.
async fn delivery_loop(
    shared: Arc<Shared>,
    session: u64,
    cancel: CancellationToken,
    notify: Arc<Notify>,
    flusher: Flusher,
    config: Arc<RelayConfig>,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = notify.notified() => {}
        }
        tokio::select! {
            () = cancel.cancelled() => break,
            () = sleep(config.batch_delay) => {}
        }
        let _in_flight = tokio::select! {
            () = cancel.cancelled() => break,
            guard = shared.delivery.lock() => guard,
        };
        let Some(batch) = shared.take_batch(session, config.batch_size) else {
            break;
        };
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("Session {session} ended, abandoning delivery in progress");
                break;
            }
            () = flusher.flush(batch) => {}
        }
        match shared.has_pending(session) {
            Some(true) => notify.notify_one(),
            Some(false) => {}
            None => break,
        }
    }
    debug!("Delivery for session {session} stopped");
}

/// Captures host diagnostics and relays them to a collector.
///
/// ```no_run
/// use std::sync::Arc;
/// use diagnostic_relay::{Host, Relay, RelayOptions};
///
/// # async fn run() -> Result<(), diagnostic_relay::RelayError> {
/// let host = Arc::new(Host::builder().origin("http://localhost:3000/").build());
/// let relay = Relay::new(Arc::clone(&host));
/// relay.activate(RelayOptions::from_env())?;
/// # Ok(())
/// # }
/// ```
pub struct Relay {
    host: Arc<Host>,
    shared: Arc<Shared>,
    interceptions: Mutex<Interceptions>,
}

impl Relay {
    #[must_use]
    pub fn new(host: Arc<Host>) -> Self {
        let shared = Arc::new(Shared::new(host.origin().to_string()));
        Relay {
            host,
            shared,
            interceptions: Mutex::new(Interceptions::default()),
        }
    }

    #[must_use]
    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    /// Starts a new session, superseding the current one if any.
    ///
    /// Activating while active reconfigures: wrappers stay installed where
    /// the new configuration still needs them and are removed where it no
    /// longer does. Must be called from within a Tokio runtime.
    pub fn activate(&self, options: RelayOptions) -> Result<Activation, RelayError> {
        let context = self.host.context();
        if !context.development || !context.capture_enabled {
            debug!(
                "Capture not allowed (development: {}, capture enabled: {}), skipping activation",
                context.development, context.capture_enabled
            );
            return Ok(Activation::Skipped);
        }
        let runtime = Handle::try_current().map_err(|_| RelayError::NoRuntime)?;
        let config = Arc::new(RelayConfig::resolve(&options));

        let mut interceptions = self.lock_interceptions();
        let (session, cancel, notify) = {
            let mut state = self.shared.lock();
            state.end_session();
            state.active = true;
            state.config = Arc::clone(&config);
            state.queue.set_max_size(config.max_queue_size);
            state.cancel = CancellationToken::new();
            state.notify = Arc::new(Notify::new());
            state.runtime = Some(runtime.clone());
            (
                state.session,
                state.cancel.clone(),
                Arc::clone(&state.notify),
            )
        };

        interceptions.reconcile(&self.host, &self.shared, &config);

        let endpoint = resolve_url(self.host.origin(), &config.endpoint);
        let flusher = Flusher::new(self.host.fetch_slot().original(), endpoint);
        runtime.spawn(delivery_loop(
            Arc::clone(&self.shared),
            session,
            cancel,
            notify,
            flusher,
            Arc::clone(&config),
        ));

        debug!("Diagnostic relay session {session} started");
        Ok(Activation::Started { session })
    }

    /// Ends the current session and restores the host's primitives.
    ///
    /// Returns `false` when already inactive.
    pub fn deactivate(&self) -> bool {
        let mut interceptions = self.lock_interceptions();
        {
            let mut state = self.shared.lock();
            if !state.active {
                return false;
            }
            state.active = false;
            state.end_session();
            state.runtime = None;
        }
        interceptions.restore_all(&self.host);
        debug!("Diagnostic relay deactivated");
        true
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.lock().active
    }

    /// Id of the current session. Changes on every activation and
    /// deactivation.
    #[must_use]
    pub fn session_id(&self) -> u64 {
        self.shared.lock().session
    }

    /// Number of events waiting for delivery.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    #[must_use]
    pub fn queued_events(&self) -> Vec<Event> {
        self.shared.lock().queue.iter().cloned().collect()
    }

    /// Configuration of the current session.
    #[must_use]
    pub fn config(&self) -> Option<Arc<RelayConfig>> {
        self.shared.snapshot().map(|capture| capture.config)
    }

    /// Number of xhr calls opened but not yet sent.
    #[must_use]
    pub fn tracked_xhr_calls(&self) -> usize {
        self.lock_interceptions().tracked_xhr_calls()
    }

    fn lock_interceptions(&self) -> MutexGuard<'_, Interceptions> {
        self.interceptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if self.deactivate() {
            warn!("Diagnostic relay dropped while active, deactivated");
        }
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("active", &self.is_active())
            .field("session", &self.session_id())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}
