//! Single-writer state service.
//!
//! One task owns `AppState`. Writers send `Action`s over an mpsc channel
//! and await the outcome; readers hold a `watch` receiver of immutable
//! `Arc<AppState>` snapshots. Each action is reduced into a scratch copy
//! and published only if it succeeds, so a snapshot is always either
//! fully before or fully after an action.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{reduce, Action, AppState, Outcome, StateError};

/// Pending actions before writers start waiting.
const COMMAND_BUFFER: usize = 256;

struct Command {
    action: Action,
    reply: oneshot::Sender<Result<Outcome, StateError>>,
}

/// Cloneable handle for dispatching actions and reading snapshots.
#[derive(Clone)]
pub struct StateHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Arc<AppState>>,
}

impl StateHandle {
    /// Apply an action and wait for its outcome.
    pub async fn dispatch(&self, action: Action) -> Result<Outcome, StateError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command { action, reply })
            .await
            .map_err(|_| StateError::Closed)?;
        response.await.map_err(|_| StateError::Closed)?
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<AppState> {
        self.snapshots.borrow().clone()
    }

    /// A receiver that wakes on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppState>> {
        self.snapshots.clone()
    }
}

pub struct StateService;

impl StateService {
    /// Start the owning task. It stops once every handle is dropped.
    pub fn spawn(initial: AppState) -> (StateHandle, JoinHandle<()>) {
        let (commands, mut inbox) = mpsc::channel::<Command>(COMMAND_BUFFER);
        let (publisher, snapshots) = watch::channel(Arc::new(initial));

        let task = tokio::spawn(async move {
            let mut current = publisher.borrow().clone();
            while let Some(Command { action, reply }) = inbox.recv().await {
                let mut next = AppState::clone(&current);
                let result = reduce(&mut next, action);
                if let Ok(outcome) = &result {
                    if *outcome != Outcome::Unchanged {
                        next.version = current.version + 1;
                        current = Arc::new(next);
                        publisher.send_replace(current.clone());
                        debug!(version = current.version, "State snapshot published");
                    }
                }
                // The dispatcher may have given up waiting; that's fine.
                let _ = reply.send(result);
            }
            info!(version = current.version, "State service stopped");
        });

        (StateHandle { commands, snapshots }, task)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
