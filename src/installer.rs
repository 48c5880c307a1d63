//! Counting shim installation
//!
//! The installer keeps one [`InstallationRecord`] per `(owner, kind, member)`
//! triple. A shim is installed only when the currently bound implementation
//! differs from the shim recorded for that triple, so repeated notifications
//! for an unchanged target never wrap a shim around itself.

use std::sync::Arc;

use fnv::FnvHashMap;
use parking_lot::Mutex;

use crate::counter::CounterState;
use crate::namespace::{CallFrame, MemberKind, Method, MethodId, MethodSlot, Namespace, OwnerId};
use crate::resolver::{resolve_member, ResolvedMember, ResolvedOwner};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InstallationKey {
    owner: OwnerId,
    kind: MemberKind,
    member: String,
}

/// Installation state for one concrete triple
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallationRecord {
    pub installed: bool,
    /// Identity of the live shim, if any
    pub wrapped_identity: Option<MethodId>,
    /// Number of shims installed for this triple so far
    pub generation: u32,
}

/// What the shim forwards to after counting
enum Original {
    /// The owner's own implementation, captured at install time
    Captured(Method),
    /// Inherited through a superclass or mixin: resolved past the owner's
    /// own slot on every call
    Inherited(MethodSlot),
}

/// Installs counting shims and tracks what it has installed
#[derive(Debug)]
pub struct Installer {
    counter: Arc<CounterState>,
    records: Mutex<FnvHashMap<InstallationKey, InstallationRecord>>,
}

impl Installer {
    pub fn new(counter: Arc<CounterState>) -> Self {
        Self {
            counter,
            records: Mutex::new(FnvHashMap::default()),
        }
    }

    pub fn counter(&self) -> &Arc<CounterState> {
        &self.counter
    }

    /// Current record for a triple, if one was ever created
    pub fn record(
        &self,
        owner: OwnerId,
        kind: MemberKind,
        member: &str,
    ) -> Option<InstallationRecord> {
        let key = InstallationKey {
            owner,
            kind,
            member: member.to_string(),
        };
        self.records.lock().get(&key).cloned()
    }

    /// Make sure the implementation bound to `member` on `owner` is a live
    /// counting shim
    pub fn install(
        &self,
        ns: &Namespace,
        owner: &ResolvedOwner,
        kind: MemberKind,
        member: &str,
    ) -> InstallationRecord {
        let key = InstallationKey {
            owner: owner.id,
            kind,
            member: member.to_string(),
        };
        let mut records = self.records.lock();

        let Some(resolved) = resolve_member(ns, owner, member, kind) else {
            return match records.get_mut(&key) {
                Some(record) => {
                    if record.installed {
                        tracing::debug!(owner = %owner.path, member, "target member disappeared");
                    }
                    record.installed = false;
                    record.wrapped_identity = None;
                    record.clone()
                }
                None => InstallationRecord::default(),
            };
        };

        self.swap_in(ns, owner, &mut records, key, &resolved)
    }

    /// Replace `resolved` with a fresh shim unless it already is the live
    /// one. A binding that changed since `resolved` was read is left alone.
    fn swap_in(
        &self,
        ns: &Namespace,
        owner: &ResolvedOwner,
        records: &mut FnvHashMap<InstallationKey, InstallationRecord>,
        key: InstallationKey,
        resolved: &ResolvedMember,
    ) -> InstallationRecord {
        let (kind, member) = (resolved.kind, resolved.name.as_str());
        let existing = records.get(&key).cloned().unwrap_or_default();
        if existing.wrapped_identity == Some(resolved.identity()) {
            tracing::trace!(owner = %owner.path, member, "shim already live");
            return existing;
        }

        let expected = resolved.is_own().then(|| resolved.identity());
        let shim = self.shim(resolved);
        let shim_id = shim.id();
        if let Err(conflict) = ns.replace_method(owner.id, kind, member, expected, shim) {
            tracing::debug!(%conflict, "redefinition race, waiting for the next event");
            return existing;
        }

        let record = InstallationRecord {
            installed: true,
            wrapped_identity: Some(shim_id),
            generation: existing.generation + 1,
        };
        tracing::debug!(
            owner = %owner.path,
            member,
            original = %resolved.identity(),
            shim = %shim_id,
            inherited = !resolved.is_own(),
            generation = record.generation,
            "counting shim installed"
        );
        records.insert(key, record.clone());
        record
    }

    fn shim(&self, resolved: &ResolvedMember) -> Method {
        let counter = Arc::clone(&self.counter);
        let original = if resolved.is_own() {
            Original::Captured(resolved.method.clone())
        } else {
            Original::Inherited(resolved.own_slot())
        };
        let body = move |frame: &CallFrame<'_>| {
            counter.increment();
            match &original {
                Original::Captured(method) => method.invoke(frame),
                Original::Inherited(slot) => frame.ns.call_super(*slot, frame),
            }
        };
        if resolved.is_own() {
            Method::new(body)
        } else {
            Method::forwarding(body)
        }
    }
}
