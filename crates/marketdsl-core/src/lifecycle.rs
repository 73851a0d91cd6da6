//! Shared initialize/cleanup handling composed into every actor.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{ActorConfig, DslError, DslResult, ValidationError};

/// Observable actor state.
///
/// `Uninitialized -> Initializing -> Ready -> Closed`, with
/// `Initializing -> Failed` on connection setup error or cancellation. `Failed` and `Closed`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
    Closed,
}

impl ActorState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

impl Display for ActorState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Slot<H> {
    Uninitialized,
    Initializing,
    Ready(Arc<H>),
    Failed(String),
    Closed,
}

impl<H> Slot<H> {
    const fn state(&self) -> ActorState {
        match self {
            Self::Uninitialized => ActorState::Uninitialized,
            Self::Initializing => ActorState::Initializing,
            Self::Ready(_) => ActorState::Ready,
            Self::Failed(_) => ActorState::Failed,
            Self::Closed => ActorState::Closed,
        }
    }
}

/// State machine owning the connection handle.
///
/// The mutex guards only the slot swap and is never held across an await, so
/// concurrent calls only contend on cloning the `Arc`.
pub struct Lifecycle<H> {
    actor: String,
    slot: Mutex<Slot<H>>,
}

impl<H> Lifecycle<H> {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            slot: Mutex::new(Slot::Uninitialized),
        }
    }

    pub fn state(&self) -> ActorState {
        self.lock().state()
    }

    /// Runs `connect` once. Repeated calls after success are no-ops; calls
    /// after a failure or close are rejected without reconnecting.
    ///
    /// Dropping the returned future mid-connect leaves the lifecycle `Failed`.
    pub async fn initialize<F, Fut>(&self, connect: F) -> DslResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DslResult<H>>,
    {
        {
            let mut slot = self.lock();
            match &*slot {
                Slot::Ready(_) => return Ok(()),
                Slot::Initializing => {
                    return Err(DslError::not_ready(format!(
                        "{}: initialization already in progress",
                        self.actor
                    )))
                }
                Slot::Failed(reason) => {
                    return Err(DslError::not_ready(format!(
                        "{}: initialization failed earlier ({reason}); construct a new actor",
                        self.actor
                    )))
                }
                Slot::Closed => {
                    return Err(DslError::not_ready(format!("{}: actor is closed", self.actor)))
                }
                Slot::Uninitialized => *slot = Slot::Initializing,
            }
        }

        let pending = PendingInit {
            lifecycle: self,
            armed: true,
        };
        let outcome = connect().await;
        pending.disarm();

        let mut slot = self.lock();
        match outcome {
            Ok(_) if matches!(*slot, Slot::Closed) => Err(DslError::not_ready(format!(
                "{}: actor was closed during initialization",
                self.actor
            ))),
            Ok(handle) => {
                *slot = Slot::Ready(Arc::new(handle));
                info!(actor = %self.actor, "actor ready");
                Ok(())
            }
            Err(error) => {
                if !matches!(*slot, Slot::Closed) {
                    *slot = Slot::Failed(error.message().to_owned());
                }
                warn!(actor = %self.actor, code = error.code(), "actor initialization failed: {}", error.message());
                Err(error)
            }
        }
    }

    /// Shared handle, or `NotReady` outside the `Ready` state.
    pub fn handle(&self) -> DslResult<Arc<H>> {
        let slot = self.lock();
        match &*slot {
            Slot::Ready(handle) => Ok(Arc::clone(handle)),
            other => Err(DslError::not_ready(format!(
                "{}: actor is {}, expected ready",
                self.actor,
                other.state()
            ))),
        }
    }

    /// Moves to `Closed` from any state and hands back the handle, if any.
    pub fn close(&self) -> Option<Arc<H>> {
        let previous = std::mem::replace(&mut *self.lock(), Slot::Closed);
        match previous {
            Slot::Ready(handle) => {
                info!(actor = %self.actor, "actor closed");
                Some(handle)
            }
            _ => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<H>> {
        // Every critical section is a single assignment; a poisoned slot is still consistent.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Moves a still-`Initializing` slot to `Failed` when the connect future is dropped.
struct PendingInit<'a, H> {
    lifecycle: &'a Lifecycle<H>,
    armed: bool,
}

impl<H> PendingInit<'_, H> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<H> Drop for PendingInit<'_, H> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slot = self.lifecycle.lock();
        if matches!(*slot, Slot::Initializing) {
            *slot = Slot::Failed(String::from("initialization was cancelled"));
            warn!(actor = %self.lifecycle.actor, "actor initialization cancelled");
        }
    }
}

/// Config + lifecycle composed into each concrete actor.
pub struct ActorBase<H> {
    config: ActorConfig,
    lifecycle: Lifecycle<H>,
}

impl<H> ActorBase<H> {
    pub fn new(config: ActorConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        let lifecycle = Lifecycle::new(config.name.clone());
        Ok(Self { config, lifecycle })
    }

    pub const fn config(&self) -> &ActorConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> ActorState {
        self.lifecycle.state()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    /// Initializes the lifecycle with `connect` bounded by the configured timeout.
    pub async fn initialize<Fut>(&self, connect: Fut) -> DslResult<()>
    where
        Fut: Future<Output = DslResult<H>>,
    {
        self.lifecycle
            .initialize(|| self.bounded("initialize", connect))
            .await
    }

    pub fn ready(&self) -> DslResult<Arc<H>> {
        self.lifecycle.handle()
    }

    pub fn close(&self) -> Option<Arc<H>> {
        self.lifecycle.close()
    }

    /// Runs one transport call under the configured timeout.
    ///
    /// Expiry resolves to a retryable `NetworkError`; the inner future is dropped.
    pub async fn bounded<T, Fut>(&self, operation: &str, call: Fut) -> DslResult<T>
    where
        Fut: Future<Output = DslResult<T>>,
    {
        let started = Instant::now();
        if self.config.debug {
            debug!(
                actor = %self.config.name,
                operation,
                timeout_ms = self.config.timeout_ms,
                "transport call started"
            );
        }

        let outcome = match tokio::time::timeout(self.timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(DslError::network(format!(
                "{}: {operation} timed out after {}ms",
                self.config.name, self.config.timeout_ms
            ))),
        };

        if self.config.debug {
            debug!(
                actor = %self.config.name,
                operation,
                elapsed_ms = started.elapsed().as_millis() as u64,
                ok = outcome.is_ok(),
                "transport call finished"
            );
        }

        outcome
    }
}
