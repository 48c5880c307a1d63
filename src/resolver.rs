//! Read-only resolution of a target against the current namespace state
//!
//! A missing owner or member is the normal state before the program has
//! defined it, so resolution returns `Option` rather than an error. Nothing
//! here mutates the namespace or emits events.

use crate::namespace::{MemberKind, Method, MethodId, MethodSlot, Namespace, OwnerId};
use crate::specifier::TargetSpec;

/// A concrete owner found by path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOwner {
    pub id: OwnerId,
    pub path: String,
}

/// The implementation currently bound to a member name
#[derive(Debug, Clone)]
pub struct ResolvedMember {
    pub owner: OwnerId,
    pub kind: MemberKind,
    pub name: String,
    pub method: Method,
    /// Table the implementation was found in
    pub slot: MethodSlot,
}

impl ResolvedMember {
    pub fn identity(&self) -> MethodId {
        self.method.id()
    }

    /// The owner's own table for this member kind
    pub fn own_slot(&self) -> MethodSlot {
        MethodSlot {
            owner: self.owner,
            table: self.kind,
        }
    }

    /// True when the implementation is bound directly on the owner rather
    /// than inherited through a superclass or mixin
    pub fn is_own(&self) -> bool {
        self.slot == self.own_slot()
    }
}

/// Walk `path` segment by segment from the root
pub fn resolve_owner(ns: &Namespace, path: &str) -> Option<ResolvedOwner> {
    ns.owner_by_path(path).map(|id| ResolvedOwner {
        id,
        path: path.to_string(),
    })
}

/// Look up `member` in the tables appropriate to `kind`
pub fn resolve_member(
    ns: &Namespace,
    owner: &ResolvedOwner,
    member: &str,
    kind: MemberKind,
) -> Option<ResolvedMember> {
    let found = ns.lookup(owner.id, kind, member)?;
    Some(ResolvedMember {
        owner: owner.id,
        kind,
        name: member.to_string(),
        method: found.method,
        slot: found.slot,
    })
}

/// Resolve both halves of a specifier
pub fn resolve(ns: &Namespace, spec: &TargetSpec) -> Option<ResolvedMember> {
    let owner = resolve_owner(ns, spec.owner())?;
    resolve_member(ns, &owner, spec.member(), spec.kind())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Value;

    fn noop() -> Method {
        Method::new(|_| Ok(Value::Nil))
    }

    #[test]
    fn test_resolve_owner_not_found_is_soft() {
        let ns = Namespace::new();
        assert!(resolve_owner(&ns, "Nope").is_none());
        ns.define_module("A").unwrap();
        assert!(resolve_owner(&ns, "A::B").is_none());
    }

    #[test]
    fn test_resolve_nested_owner() {
        let ns = Namespace::new();
        ns.define_module("A").unwrap();
        let b = ns.define_class("A::B", None).unwrap();
        let owner = resolve_owner(&ns, "A::B").unwrap();
        assert_eq!(owner.id, b);
        assert_eq!(owner.path, "A::B");
    }

    #[test]
    fn test_resolve_member_respects_kind() {
        let ns = Namespace::new();
        let class = ns.define_class("Counter", None).unwrap();
        ns.define_method(class, MemberKind::InstanceScoped, "increment", noop())
            .unwrap();
        let owner = resolve_owner(&ns, "Counter").unwrap();

        let member = resolve_member(&ns, &owner, "increment", MemberKind::InstanceScoped).unwrap();
        assert!(member.is_own());
        assert!(resolve_member(&ns, &owner, "increment", MemberKind::OwnerScoped).is_none());
    }

    #[test]
    fn test_resolve_inherited_member_is_not_own() {
        let ns = Namespace::new();
        let base = ns.define_class("Base", None).unwrap();
        ns.define_class("Child", Some(base)).unwrap();
        let id = ns
            .define_method(base, MemberKind::InstanceScoped, "run", noop())
            .unwrap();

        let spec = TargetSpec::parse("Child#run").unwrap();
        let member = resolve(&ns, &spec).unwrap();
        assert_eq!(member.identity(), id);
        assert!(!member.is_own());
        assert_eq!(member.slot.owner, base);
    }

    #[test]
    fn test_identity_changes_on_redefinition() {
        let ns = Namespace::new();
        let class = ns.define_class("Counter", None).unwrap();
        let spec = TargetSpec::parse("Counter#increment").unwrap();
        ns.define_method(class, MemberKind::InstanceScoped, "increment", noop())
            .unwrap();
        let first = resolve(&ns, &spec).unwrap().identity();
        assert_eq!(resolve(&ns, &spec).unwrap().identity(), first);

        ns.define_method(class, MemberKind::InstanceScoped, "increment", noop())
            .unwrap();
        assert_ne!(resolve(&ns, &spec).unwrap().identity(), first);
    }
}
