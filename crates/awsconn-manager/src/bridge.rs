//! Bridge from credential source change events into the state machine.

use std::collections::HashSet;
use std::sync::Arc;

use awsconn_core::{CredentialProviderFactory, CredentialsChanged};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What a bridge task observed on a factory's event stream.
#[derive(Debug)]
pub(crate) enum SourceSignal<'a> {
    /// A change event arrived.
    Changed(&'a CredentialsChanged),
    /// Events were dropped because the listener fell behind.
    Lagged(u64),
}

/// One listener task per credential factory.
///
/// Dropping the bridge aborts every listener.
#[derive(Debug)]
pub(crate) struct CredentialChangeBridge {
    tasks: Vec<JoinHandle<()>>,
}

impl CredentialChangeBridge {
    /// Subscribe to every distinct factory and forward its events to
    /// `on_signal`. A listener stops when `on_signal` returns `false` or its
    /// factory closes the stream.
    ///
    /// Subscriptions are taken before this returns, so no event raised after
    /// the call is missed.
    pub(crate) fn spawn<F>(
        runtime: &Handle,
        factories: &[Arc<dyn CredentialProviderFactory>],
        on_signal: F,
    ) -> Self
    where
        F: Fn(SourceSignal<'_>) -> bool + Clone + Send + Sync + 'static,
    {
        let mut seen = HashSet::new();
        let mut tasks = Vec::with_capacity(factories.len());

        for factory in factories {
            let factory_id = factory.factory_id().to_owned();
            if !seen.insert(factory_id.clone()) {
                debug!(factory = %factory_id, "skipping duplicate credential factory");
                continue;
            }

            let mut rx = factory.subscribe();
            let on_signal = on_signal.clone();
            tasks.push(runtime.spawn(async move {
                loop {
                    let keep_going = match rx.recv().await {
                        Ok(event) => {
                            debug!(
                                factory = %factory_id,
                                added = event.added.len(),
                                removed = event.removed.len(),
                                modified = event.modified.len(),
                                "credentials changed"
                            );
                            on_signal(SourceSignal::Changed(&event))
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(factory = %factory_id, skipped, "credential change events lagged");
                            on_signal(SourceSignal::Lagged(skipped))
                        }
                        Err(RecvError::Closed) => {
                            debug!(factory = %factory_id, "credential factory closed its event stream");
                            false
                        }
                    };
                    if !keep_going {
                        break;
                    }
                }
            }));
        }

        Self { tasks }
    }

    /// Number of active listeners.
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Stop every listener.
    pub(crate) fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for CredentialChangeBridge {
    fn drop(&mut self) {
        self.abort();
    }
}
