//! Lifecycle watcher: re-drives installation on namespace mutations
//!
//! The watcher subscribes once and stays subscribed for the lifetime of the
//! namespace, because the target can be defined late and redefined any
//! number of times. Each relevant event triggers a fresh resolve-and-install
//! attempt; the installer's identity check turns the frequent unchanged
//! cases into no-ops.
//!
//! State machine:
//!
//! ```text
//! Unwatched ──watch()──▶ Watching ──install ok──▶ Attached{g}
//!                           ▲                       │   │
//!                           └──member removed───────┘   └─identity changed─▶ Attached{g+1}
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use crate::installer::Installer;
use crate::namespace::{MethodId, Namespace, NamespaceEvent, NamespaceObserver};
use crate::resolver::resolve_owner;
use crate::specifier::TargetSpec;

/// Where the watcher is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Not yet subscribed to any namespace
    Unwatched,
    /// Subscribed, target not resolvable yet
    Watching,
    /// A counting shim is live
    Attached { identity: MethodId, generation: u32 },
}

impl WatchState {
    pub fn is_attached(&self) -> bool {
        matches!(self, WatchState::Attached { .. })
    }
}

/// Observer that keeps the target instrumented as the namespace evolves
#[derive(Debug)]
pub struct LifecycleWatcher {
    spec: TargetSpec,
    installer: Arc<Installer>,
    state: Mutex<WatchState>,
    /// Address of the namespace being watched
    namespace: Mutex<Option<usize>>,
}

impl LifecycleWatcher {
    pub fn new(spec: TargetSpec, installer: Arc<Installer>) -> Self {
        Self {
            spec,
            installer,
            state: Mutex::new(WatchState::Unwatched),
            namespace: Mutex::new(None),
        }
    }

    pub fn spec(&self) -> &TargetSpec {
        &self.spec
    }

    pub fn state(&self) -> WatchState {
        *self.state.lock()
    }

    /// Subscribe for every later mutation and try to attach right away.
    ///
    /// A watcher belongs to the first namespace it watches: installation
    /// records are keyed by [`OwnerId`](crate::namespace::OwnerId), which is
    /// only meaningful inside one namespace. Later calls with the same
    /// namespace just retry the install; calls with another namespace are
    /// ignored.
    pub fn watch(self: &Arc<Self>, ns: &Namespace) -> WatchState {
        let address = ns as *const Namespace as usize;
        let first = {
            let mut bound = self.namespace.lock();
            match *bound {
                None => {
                    *bound = Some(address);
                    *self.state.lock() = WatchState::Watching;
                    true
                }
                Some(existing) if existing == address => false,
                Some(_) => {
                    tracing::warn!(
                        target_spec = %self.spec,
                        "already watching another namespace"
                    );
                    return self.state();
                }
            }
        };
        if first {
            ns.subscribe(Arc::clone(self) as Arc<dyn NamespaceObserver>);
        }
        let state = self.attempt(ns);
        tracing::debug!(target_spec = %self.spec, ?state, "watching namespace");
        state
    }

    /// Resolve the owner and run the installer once
    pub fn attempt(&self, ns: &Namespace) -> WatchState {
        let mut state = self.state.lock();
        let Some(owner) = resolve_owner(ns, self.spec.owner()) else {
            return *state;
        };

        let record = self
            .installer
            .install(ns, &owner, self.spec.kind(), self.spec.member());
        let next = match record.wrapped_identity {
            Some(identity) if record.installed => WatchState::Attached {
                identity,
                generation: record.generation,
            },
            _ => WatchState::Watching,
        };
        let previous = *state;
        if next != previous {
            tracing::debug!(
                target_spec = %self.spec,
                from = ?previous,
                to = ?next,
                "watch state changed"
            );
            *state = next;
        }
        next
    }

    /// Whether `event` could make the target newly resolvable or change
    /// its identity
    pub fn is_relevant(&self, event: &NamespaceEvent) -> bool {
        match event.member_name() {
            Some(name) => name == self.spec.member(),
            None => true,
        }
    }
}

impl NamespaceObserver for LifecycleWatcher {
    fn on_event(&self, ns: &Namespace, event: &NamespaceEvent) {
        if !self.is_relevant(event) {
            tracing::trace!(?event, "ignoring unrelated event");
            return;
        }
        self.attempt(ns);
    }
}
