//! Host namespace: classes, modules, method tables and mutation events
//!
//! This is the live, mutable type model that instrumented programs run
//! against. Owners (classes and modules) are registered under `::`-nested
//! paths and each owner carries two method tables: instance-scoped members
//! (invoked on objects) and owner-scoped members (invoked on the owner
//! itself). Classes form a single-inheritance chain; modules are mixed into
//! owners with `include` (instance scope) or `extend` (owner scope).
//!
//! Every structural change is reported to subscribed observers as a
//! [`NamespaceEvent`]. Events are delivered synchronously on the mutating
//! thread after the namespace lock has been released, so observers may
//! freely query and mutate the namespace.

mod value;

pub use value::{Block, CallError, CallFrame, Method, MethodBody, MethodId, Object, Value};

use std::fmt;
use std::sync::Arc;

use fnv::FnvHashMap;
use parking_lot::RwLock;
use thiserror::Error;

/// Handle to a class or module registered in a [`Namespace`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u32);

impl OwnerId {
    pub(crate) fn from_index(index: usize) -> Self {
        OwnerId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Which method table of an owner a member lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// Invoked on instances (`Owner#member`)
    InstanceScoped,
    /// Invoked on the owner itself (`Owner.member`)
    OwnerScoped,
}

impl MemberKind {
    /// Separator used by specifiers for this kind
    pub fn separator(self) -> char {
        match self {
            MemberKind::InstanceScoped => '#',
            MemberKind::OwnerScoped => '.',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    Class,
    Module,
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerKind::Class => write!(f, "class"),
            OwnerKind::Module => write!(f, "module"),
        }
    }
}

/// A single method table: one owner plus one of its two tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodSlot {
    pub owner: OwnerId,
    pub table: MemberKind,
}

/// Result of a method lookup: the implementation and where it was found
#[derive(Debug, Clone)]
pub struct Lookup {
    pub method: Method,
    pub slot: MethodSlot,
}

/// Mutations reported to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceEvent {
    /// A new class or module was registered
    OwnerDefined { owner: OwnerId },
    /// A new class was created as a subclass of `parent`
    Derived { parent: OwnerId, child: OwnerId },
    /// A member was defined or redefined
    MemberDefined {
        owner: OwnerId,
        kind: MemberKind,
        name: String,
    },
    MemberRemoved {
        owner: OwnerId,
        kind: MemberKind,
        name: String,
    },
    /// `module`'s instance members became instance members of `target`
    Included { module: OwnerId, target: OwnerId },
    /// `module`'s instance members became owner-scoped members of `target`
    Extended { module: OwnerId, target: OwnerId },
}

impl NamespaceEvent {
    /// Member name carried by member events
    pub fn member_name(&self) -> Option<&str> {
        match self {
            NamespaceEvent::MemberDefined { name, .. }
            | NamespaceEvent::MemberRemoved { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Subscriber for namespace mutations
pub trait NamespaceObserver: Send + Sync {
    fn on_event(&self, ns: &Namespace, event: &NamespaceEvent);
}

/// Errors from namespace mutations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NamespaceError {
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("uninitialized constant {0}")]
    UnknownOwner(String),

    #[error("owner id {0} does not belong to this namespace")]
    StaleOwner(usize),

    #[error("{0} is not a class")]
    NotAClass(String),

    #[error("{0} is not a module")]
    NotAModule(String),

    #[error("{name} is already defined as a {existing}")]
    KindMismatch { name: String, existing: OwnerKind },

    #[error("superclass mismatch for class {0}")]
    SuperclassMismatch(String),

    #[error("cyclic include detected: {module} into {target}")]
    CyclicInclude { module: String, target: String },
}

/// Compare-and-swap failure from [`Namespace::replace_method`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("method '{name}' changed before it could be replaced (expected {expected:?}, found {found:?})")]
pub struct SwapConflict {
    pub name: String,
    pub expected: Option<MethodId>,
    pub found: Option<MethodId>,
}

#[derive(Debug)]
struct OwnerEntry {
    name: String,
    kind: OwnerKind,
    superclass: Option<OwnerId>,
    /// Modules mixed in at instance scope, in inclusion order
    includes: Vec<OwnerId>,
    /// Modules mixed in at owner scope, in extension order
    extends: Vec<OwnerId>,
    instance_methods: FnvHashMap<String, Method>,
    owner_methods: FnvHashMap<String, Method>,
    constants: FnvHashMap<String, OwnerId>,
}

impl OwnerEntry {
    fn new(name: String, kind: OwnerKind, superclass: Option<OwnerId>) -> Self {
        Self {
            name,
            kind,
            superclass,
            includes: Vec::new(),
            extends: Vec::new(),
            instance_methods: FnvHashMap::default(),
            owner_methods: FnvHashMap::default(),
            constants: FnvHashMap::default(),
        }
    }

    fn table(&self, kind: MemberKind) -> &FnvHashMap<String, Method> {
        match kind {
            MemberKind::InstanceScoped => &self.instance_methods,
            MemberKind::OwnerScoped => &self.owner_methods,
        }
    }

    fn table_mut(&mut self, kind: MemberKind) -> &mut FnvHashMap<String, Method> {
        match kind {
            MemberKind::InstanceScoped => &mut self.instance_methods,
            MemberKind::OwnerScoped => &mut self.owner_methods,
        }
    }
}

#[derive(Debug, Default)]
struct NamespaceState {
    owners: Vec<OwnerEntry>,
    roots: FnvHashMap<String, OwnerId>,
}

impl NamespaceState {
    fn entry(&self, id: OwnerId) -> Result<&OwnerEntry, NamespaceError> {
        self.owners
            .get(id.index())
            .ok_or(NamespaceError::StaleOwner(id.index()))
    }

    fn entry_mut(&mut self, id: OwnerId) -> Result<&mut OwnerEntry, NamespaceError> {
        self.owners
            .get_mut(id.index())
            .ok_or(NamespaceError::StaleOwner(id.index()))
    }

    fn lookup_path(&self, path: &str) -> Option<OwnerId> {
        let mut segments = path.split("::");
        let mut current = *self.roots.get(segments.next()?)?;
        for segment in segments {
            current = *self.owners.get(current.index())?.constants.get(segment)?;
        }
        Some(current)
    }

    /// Instance-level ancestry: the owner, its includes (latest first), then
    /// the superclass chain. First occurrence wins.
    fn ancestors(&self, id: OwnerId, out: &mut Vec<OwnerId>) {
        if out.contains(&id) {
            return;
        }
        let Some(entry) = self.owners.get(id.index()) else {
            return;
        };
        out.push(id);
        for module in entry.includes.iter().rev() {
            self.ancestors(*module, out);
        }
        if let Some(parent) = entry.superclass {
            self.ancestors(parent, out);
        }
    }

    fn method_chain(&self, id: OwnerId, kind: MemberKind) -> Vec<MethodSlot> {
        match kind {
            MemberKind::InstanceScoped => {
                let mut owners = Vec::new();
                self.ancestors(id, &mut owners);
                owners
                    .into_iter()
                    .map(|owner| MethodSlot {
                        owner,
                        table: MemberKind::InstanceScoped,
                    })
                    .collect()
            }
            MemberKind::OwnerScoped => {
                let mut slots = Vec::new();
                self.owner_chain(id, &mut slots);
                slots
            }
        }
    }

    /// Owner-level ancestry: the owner's own table, the instance tables of
    /// extended modules (latest first), then the superclass's owner chain.
    fn owner_chain(&self, id: OwnerId, out: &mut Vec<MethodSlot>) {
        let own = MethodSlot {
            owner: id,
            table: MemberKind::OwnerScoped,
        };
        if out.contains(&own) {
            return;
        }
        let Some(entry) = self.owners.get(id.index()) else {
            return;
        };
        out.push(own);
        for module in entry.extends.iter().rev() {
            let mut mixed = Vec::new();
            self.ancestors(*module, &mut mixed);
            for owner in mixed {
                let slot = MethodSlot {
                    owner,
                    table: MemberKind::InstanceScoped,
                };
                if !out.contains(&slot) {
                    out.push(slot);
                }
            }
        }
        if let Some(parent) = entry.superclass {
            self.owner_chain(parent, out);
        }
    }

    fn find<'a>(
        &self,
        mut slots: impl Iterator<Item = &'a MethodSlot>,
        name: &str,
    ) -> Option<Lookup> {
        slots.find_map(|slot| {
            let entry = self.owners.get(slot.owner.index())?;
            entry.table(slot.table).get(name).map(|method| Lookup {
                method: method.clone(),
                slot: *slot,
            })
        })
    }
}

fn validate_segments(path: &str) -> Result<(), NamespaceError> {
    let valid = path.split("::").all(|segment| {
        !segment.is_empty()
            && !segment
                .chars()
                .any(|c| c.is_whitespace() || c == '#' || c == '.' || c == ':')
    });
    if valid {
        Ok(())
    } else {
        Err(NamespaceError::InvalidName(path.to_string()))
    }
}

fn validate_member(name: &str) -> Result<(), NamespaceError> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == '#' || c == '.') {
        return Err(NamespaceError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// The live namespace of an instrumented program
#[derive(Default)]
pub struct Namespace {
    state: RwLock<NamespaceState>,
    observers: RwLock<Vec<Arc<dyn NamespaceObserver>>>,
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("owners", &self.state.read().owners.len())
            .field("observers", &self.observers.read().len())
            .finish()
    }
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for all future mutation events
    pub fn subscribe(&self, observer: Arc<dyn NamespaceObserver>) {
        self.observers.write().push(observer);
    }

    fn notify(&self, events: Vec<NamespaceEvent>) {
        if events.is_empty() {
            return;
        }
        let observers = self.observers.read().clone();
        for event in &events {
            tracing::trace!(?event, "namespace event");
            for observer in &observers {
                observer.on_event(self, event);
            }
        }
    }

    /// Define a class, or reopen it if it already exists
    pub fn define_class(
        &self,
        path: &str,
        superclass: Option<OwnerId>,
    ) -> Result<OwnerId, NamespaceError> {
        self.define_owner(path, OwnerKind::Class, superclass)
    }

    /// Define a module, or reopen it if it already exists
    pub fn define_module(&self, path: &str) -> Result<OwnerId, NamespaceError> {
        self.define_owner(path, OwnerKind::Module, None)
    }

    fn define_owner(
        &self,
        path: &str,
        kind: OwnerKind,
        superclass: Option<OwnerId>,
    ) -> Result<OwnerId, NamespaceError> {
        validate_segments(path)?;
        let (id, events) = {
            let mut state = self.state.write();

            if let Some(existing) = state.lookup_path(path) {
                let entry = state.entry(existing)?;
                if entry.kind != kind {
                    return Err(NamespaceError::KindMismatch {
                        name: path.to_string(),
                        existing: entry.kind,
                    });
                }
                if superclass.is_some() && entry.superclass != superclass {
                    return Err(NamespaceError::SuperclassMismatch(path.to_string()));
                }
                return Ok(existing);
            }

            if let Some(parent) = superclass {
                let entry = state.entry(parent)?;
                if entry.kind != OwnerKind::Class {
                    return Err(NamespaceError::NotAClass(entry.name.clone()));
                }
            }

            let id = OwnerId::from_index(state.owners.len());
            match path.rsplit_once("::") {
                Some((parent_path, leaf)) => {
                    let parent = state
                        .lookup_path(parent_path)
                        .ok_or_else(|| NamespaceError::UnknownOwner(parent_path.to_string()))?;
                    state.entry_mut(parent)?.constants.insert(leaf.to_string(), id);
                }
                None => {
                    state.roots.insert(path.to_string(), id);
                }
            }
            state
                .owners
                .push(OwnerEntry::new(path.to_string(), kind, superclass));

            let mut events = vec![NamespaceEvent::OwnerDefined { owner: id }];
            if let Some(parent) = superclass {
                events.push(NamespaceEvent::Derived { parent, child: id });
            }
            (id, events)
        };
        self.notify(events);
        Ok(id)
    }

    /// Bind `method` to `name` in one of `owner`'s tables, replacing any
    /// previous definition
    pub fn define_method(
        &self,
        owner: OwnerId,
        kind: MemberKind,
        name: &str,
        method: Method,
    ) -> Result<MethodId, NamespaceError> {
        validate_member(name)?;
        let id = method.id();
        {
            let mut state = self.state.write();
            state
                .entry_mut(owner)?
                .table_mut(kind)
                .insert(name.to_string(), method);
        }
        self.notify(vec![NamespaceEvent::MemberDefined {
            owner,
            kind,
            name: name.to_string(),
        }]);
        Ok(id)
    }

    /// Remove `name` from one of `owner`'s own tables. Returns whether a
    /// definition was removed. A forwarding entry is not a definition of
    /// `owner` and is left in place.
    pub fn remove_method(
        &self,
        owner: OwnerId,
        kind: MemberKind,
        name: &str,
    ) -> Result<bool, NamespaceError> {
        let removed = {
            let mut state = self.state.write();
            let table = state.entry_mut(owner)?.table_mut(kind);
            match table.get(name) {
                Some(method) if !method.is_forwarding() => table.remove(name).is_some(),
                _ => false,
            }
        };
        if removed {
            self.notify(vec![NamespaceEvent::MemberRemoved {
                owner,
                kind,
                name: name.to_string(),
            }]);
        }
        Ok(removed)
    }

    /// Mix `module`'s instance members into `target` at instance scope.
    /// Returns false when it was already included.
    pub fn include(&self, target: OwnerId, module: OwnerId) -> Result<bool, NamespaceError> {
        let added = self.mix(target, module, MemberKind::InstanceScoped)?;
        if added {
            self.notify(vec![NamespaceEvent::Included { module, target }]);
        }
        Ok(added)
    }

    /// Mix `module`'s instance members into `target` at owner scope.
    /// Returns false when it was already extended.
    pub fn extend(&self, target: OwnerId, module: OwnerId) -> Result<bool, NamespaceError> {
        let added = self.mix(target, module, MemberKind::OwnerScoped)?;
        if added {
            self.notify(vec![NamespaceEvent::Extended { module, target }]);
        }
        Ok(added)
    }

    fn mix(
        &self,
        target: OwnerId,
        module: OwnerId,
        scope: MemberKind,
    ) -> Result<bool, NamespaceError> {
        let mut state = self.state.write();
        let module_entry = state.entry(module)?;
        if module_entry.kind != OwnerKind::Module {
            return Err(NamespaceError::NotAModule(module_entry.name.clone()));
        }
        let target_name = state.entry(target)?.name.clone();
        if scope == MemberKind::InstanceScoped {
            let mut reachable = Vec::new();
            state.ancestors(module, &mut reachable);
            if reachable.contains(&target) {
                return Err(NamespaceError::CyclicInclude {
                    module: module_entry.name.clone(),
                    target: target_name,
                });
            }
        }
        let entry = state.entry_mut(target)?;
        let list = match scope {
            MemberKind::InstanceScoped => &mut entry.includes,
            MemberKind::OwnerScoped => &mut entry.extends,
        };
        if list.contains(&module) {
            return Ok(false);
        }
        list.push(module);
        Ok(true)
    }

    /// Create a new object of `class`
    pub fn instantiate(&self, class: OwnerId) -> Result<Value, NamespaceError> {
        let state = self.state.read();
        let entry = state.entry(class)?;
        if entry.kind != OwnerKind::Class {
            return Err(NamespaceError::NotAClass(entry.name.clone()));
        }
        Ok(Value::Object(Arc::new(Object::new(class))))
    }

    /// Find an owner by its `::`-nested path
    pub fn owner_by_path(&self, path: &str) -> Option<OwnerId> {
        self.state.read().lookup_path(path)
    }

    pub fn owner_name(&self, owner: OwnerId) -> Option<String> {
        self.state.read().entry(owner).ok().map(|e| e.name.clone())
    }

    pub fn owner_kind(&self, owner: OwnerId) -> Option<OwnerKind> {
        self.state.read().entry(owner).ok().map(|e| e.kind)
    }

    pub fn superclass(&self, owner: OwnerId) -> Option<OwnerId> {
        self.state.read().entry(owner).ok().and_then(|e| e.superclass)
    }

    /// Ordered list of tables searched for `kind` members of `owner`
    pub fn method_chain(&self, owner: OwnerId, kind: MemberKind) -> Vec<MethodSlot> {
        self.state.read().method_chain(owner, kind)
    }

    /// Resolve the implementation currently bound to `name`
    pub fn lookup(&self, owner: OwnerId, kind: MemberKind, name: &str) -> Option<Lookup> {
        let state = self.state.read();
        let chain = state.method_chain(owner, kind);
        state.find(chain.iter(), name)
    }

    /// Resolve `name` starting after `slot` in the chain rooted at
    /// `slot.owner`
    pub fn lookup_after(&self, slot: MethodSlot, name: &str) -> Option<Lookup> {
        let state = self.state.read();
        let chain = state.method_chain(slot.owner, slot.table);
        let start = chain.iter().position(|s| *s == slot).map_or(0, |i| i + 1);
        state.find(chain[start..].iter(), name)
    }

    /// Swap the implementation bound in `owner`'s own table, provided the
    /// binding is still `expected` (`None` meaning no own binding). Emits no
    /// event.
    pub fn replace_method(
        &self,
        owner: OwnerId,
        kind: MemberKind,
        name: &str,
        expected: Option<MethodId>,
        replacement: Method,
    ) -> Result<(), SwapConflict> {
        let mut state = self.state.write();
        let conflict = |found| SwapConflict {
            name: name.to_string(),
            expected,
            found,
        };
        let table = state
            .entry_mut(owner)
            .map_err(|_| conflict(None))?
            .table_mut(kind);
        let found = table.get(name).map(Method::id);
        if found != expected {
            return Err(conflict(found));
        }
        table.insert(name.to_string(), replacement);
        Ok(())
    }

    /// Dispatch `name` on `receiver`: owner values dispatch owner-scoped
    /// members, objects dispatch instance-scoped members of their class
    pub fn call(
        &self,
        receiver: &Value,
        name: &str,
        args: &[Value],
        block: Option<&Block>,
    ) -> Result<Value, CallError> {
        let (owner, kind) = match receiver {
            Value::Owner(id) => (*id, MemberKind::OwnerScoped),
            Value::Object(obj) => (obj.class(), MemberKind::InstanceScoped),
            _ => return Err(self.no_method(receiver, name)),
        };
        let found = self
            .lookup(owner, kind, name)
            .ok_or_else(|| self.no_method(receiver, name))?;
        found.method.invoke(&CallFrame {
            ns: self,
            receiver,
            name,
            args,
            block,
        })
    }

    /// Forward `frame` to the implementation that follows `slot` in the
    /// receiver's chain. Falls back to the chain rooted at `slot.owner` when
    /// the receiver's chain does not pass through `slot`.
    pub fn call_super(&self, slot: MethodSlot, frame: &CallFrame<'_>) -> Result<Value, CallError> {
        let found = {
            let state = self.state.read();
            let root = match frame.receiver {
                Value::Owner(id) => Some((*id, MemberKind::OwnerScoped)),
                Value::Object(obj) => Some((obj.class(), MemberKind::InstanceScoped)),
                _ => None,
            };
            let chain = root
                .map(|(owner, kind)| state.method_chain(owner, kind))
                .filter(|chain| chain.contains(&slot))
                .unwrap_or_else(|| state.method_chain(slot.owner, slot.table));
            let start = chain.iter().position(|s| *s == slot).map_or(0, |i| i + 1);
            state.find(chain[start..].iter(), frame.name)
        };
        let found = found.ok_or_else(|| self.no_method(frame.receiver, frame.name))?;
        found.method.invoke(frame)
    }

    fn no_method(&self, receiver: &Value, name: &str) -> CallError {
        let receiver = match receiver {
            Value::Owner(id) => self
                .owner_name(*id)
                .unwrap_or_else(|| receiver.to_string()),
            Value::Object(obj) => match self.owner_name(obj.class()) {
                Some(class) => format!("an instance of {}", class),
                None => receiver.to_string(),
            },
            other => other.to_string(),
        };
        CallError::NoMethod {
            receiver,
            name: name.to_string(),
        }
    }
}
