//! Call counting engine: one target, one counter, one watcher

use std::sync::Arc;

use crate::counter::CounterState;
use crate::installer::{InstallationRecord, Installer};
use crate::namespace::Namespace;
use crate::report::Report;
use crate::specifier::TargetSpec;
use crate::watcher::{LifecycleWatcher, WatchState};

/// Counts invocations of the member named by a [`TargetSpec`]
///
/// # Example
/// ```
/// use callcount::engine::CallCounter;
/// use callcount::namespace::{MemberKind, Method, Namespace, Value};
/// use callcount::specifier::TargetSpec;
///
/// let ns = Namespace::new();
/// let counter = CallCounter::new(TargetSpec::parse("Counter#increment").unwrap());
/// counter.attach(&ns);
///
/// // Defined after instrumentation was requested
/// let class = ns.define_class("Counter", None).unwrap();
/// ns.define_method(class, MemberKind::InstanceScoped, "increment", Method::new(|_| Ok(Value::Nil)))
///     .unwrap();
///
/// let obj = ns.instantiate(class).unwrap();
/// for _ in 0..5 {
///     ns.call(&obj, "increment", &[], None).unwrap();
/// }
/// assert_eq!(counter.report().to_string(), "Counter#increment called 5 times.");
/// ```
#[derive(Debug)]
pub struct CallCounter {
    spec: TargetSpec,
    counter: Arc<CounterState>,
    installer: Arc<Installer>,
    watcher: Arc<LifecycleWatcher>,
}

impl CallCounter {
    pub fn new(spec: TargetSpec) -> Self {
        let counter = Arc::new(CounterState::new());
        let installer = Arc::new(Installer::new(Arc::clone(&counter)));
        let watcher = Arc::new(LifecycleWatcher::new(spec.clone(), Arc::clone(&installer)));
        Self {
            spec,
            counter,
            installer,
            watcher,
        }
    }

    pub fn spec(&self) -> &TargetSpec {
        &self.spec
    }

    /// Instrument the target in `ns` now if possible, and keep it
    /// instrumented as `ns` changes. A counter belongs to the first
    /// namespace it is attached to; attaching it to another is ignored.
    pub fn attach(&self, ns: &Namespace) -> WatchState {
        self.watcher.watch(ns)
    }

    pub fn state(&self) -> WatchState {
        self.watcher.state()
    }

    pub fn count(&self) -> u64 {
        self.counter.count()
    }

    /// Installation record for the target's owner in `ns`, if it resolves
    pub fn installation(&self, ns: &Namespace) -> Option<InstallationRecord> {
        let owner = ns.owner_by_path(self.spec.owner())?;
        self.installer
            .record(owner, self.spec.kind(), self.spec.member())
    }

    pub fn report(&self) -> Report {
        Report::new(self.spec.raw(), self.count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::{MemberKind, Method, Value};

    #[test]
    fn test_unresolvable_target_reports_zero() {
        let ns = Namespace::new();
        let counter = CallCounter::new(TargetSpec::parse("Ghost#haunt").unwrap());
        assert_eq!(counter.attach(&ns), WatchState::Watching);
        ns.define_class("Other", None).unwrap();
        assert_eq!(counter.count(), 0);
        assert!(counter.installation(&ns).is_none());
        assert_eq!(counter.report().to_string(), "Ghost#haunt called 0 times.");
    }

    #[test]
    fn test_installation_record_exposed() {
        let ns = Namespace::new();
        let class = ns.define_class("Widget", None).unwrap();
        ns.define_method(
            class,
            MemberKind::OwnerScoped,
            "build",
            Method::new(|_| Ok(Value::Nil)),
        )
        .unwrap();
        let counter = CallCounter::new(TargetSpec::parse("Widget.build").unwrap());
        assert!(counter.attach(&ns).is_attached());
        let record = counter.installation(&ns).unwrap();
        assert!(record.installed);
        assert_eq!(record.generation, 1);
    }
}
