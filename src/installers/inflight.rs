use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use super::InstallOutcome;

type Done = watch::Receiver<Option<InstallOutcome>>;

struct Entry {
    version: String,
    done: Done,
}

/// Installs currently running, keyed by tool name.
///
/// Shared by every pipeline and by overlapping runs. The lock is only held
/// for the synchronous check-and-insert, never across an `.await`.
#[derive(Default)]
pub struct InFlightInstalls {
    entries: Mutex<HashMap<String, Entry>>,
}

/// Result of trying to claim a tool name.
pub enum Claim {
    /// The caller owns the install and must settle the ticket.
    Started(InstallTicket),
    /// Another install of this tool is running.
    Pending { version: String, done: Done },
}

impl InFlightInstalls {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn claim(self: &Arc<Self>, name: &str, version: &str) -> Claim {
        let mut entries = self.lock();
        if let Some(entry) = entries.get(name) {
            return Claim::Pending {
                version: entry.version.clone(),
                done: entry.done.clone(),
            };
        }

        let (tx, rx) = watch::channel(None);
        entries.insert(
            name.to_string(),
            Entry {
                version: version.to_string(),
                done: rx,
            },
        );

        Claim::Started(InstallTicket {
            registry: Arc::clone(self),
            name: name.to_string(),
            tx,
            outcome: None,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Ownership of one in-flight install.
///
/// Dropping the ticket removes the registry entry and wakes waiters, so an
/// install that errors, panics or is cancelled never leaks its entry.
pub struct InstallTicket {
    registry: Arc<InFlightInstalls>,
    name: String,
    tx: watch::Sender<Option<InstallOutcome>>,
    outcome: Option<InstallOutcome>,
}

impl InstallTicket {
    pub fn finish(mut self, outcome: InstallOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for InstallTicket {
    fn drop(&mut self) {
        // Release the name before waking waiters so a deferred install can claim it.
        self.registry.lock().remove(&self.name);
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| InstallOutcome::Failed("install abandoned".to_string()));
        self.tx.send_replace(Some(outcome));
    }
}

/// Wait for a pending install to settle and return its outcome.
pub async fn wait(mut done: Done) -> InstallOutcome {
    match done.wait_for(Option::is_some).await {
        Ok(outcome) => outcome
            .clone()
            .unwrap_or_else(|| InstallOutcome::Failed("install abandoned".to_string())),
        Err(_) => InstallOutcome::Failed("install abandoned".to_string()),
    }
}
