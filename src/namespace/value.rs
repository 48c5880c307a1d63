//! Dynamic values, method bodies and call frames of the host namespace

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fnv::FnvHashMap;
use parking_lot::Mutex;
use thiserror::Error;

use super::{Namespace, OwnerId};

/// Errors raised while dispatching or running a method
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("undefined method '{name}' for {receiver}")]
    NoMethod { receiver: String, name: String },

    #[error("wrong arguments for '{name}': {reason}")]
    Argument { name: String, reason: String },

    /// A fault raised by a method body itself
    #[error("{0}")]
    Raised(String),
}

/// A dynamic value flowing through method calls
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    /// A class or module used as a receiver (owner-scoped calls)
    Owner(OwnerId),
    Object(Arc<Object>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<Object>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Owner(a), Value::Owner(b)) => a == b,
            // Objects compare by identity
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Owner(id) => write!(f, "<owner {}>", id.index()),
            Value::Object(obj) => write!(f, "<object of {}>", obj.class().index()),
        }
    }
}

/// An instance of a class, carrying mutable named fields
#[derive(Debug)]
pub struct Object {
    class: OwnerId,
    fields: Mutex<FnvHashMap<String, Value>>,
}

impl Object {
    pub(crate) fn new(class: OwnerId) -> Self {
        Self {
            class,
            fields: Mutex::new(FnvHashMap::default()),
        }
    }

    /// The class this object was instantiated from
    pub fn class(&self) -> OwnerId {
        self.class
    }

    pub fn get(&self, field: &str) -> Value {
        self.fields.lock().get(field).cloned().unwrap_or_default()
    }

    pub fn set(&self, field: &str, value: Value) {
        self.fields.lock().insert(field.to_string(), value);
    }
}

/// Trailing callback passed along with a call
pub type Block = Arc<dyn Fn(&[Value]) -> Result<Value, CallError> + Send + Sync>;

/// Signature of every method implementation
pub type MethodBody = dyn Fn(&CallFrame<'_>) -> Result<Value, CallError> + Send + Sync;

/// Everything a method body sees about the call it is serving
pub struct CallFrame<'a> {
    pub ns: &'a Namespace,
    pub receiver: &'a Value,
    /// Name the method was invoked under
    pub name: &'a str,
    pub args: &'a [Value],
    pub block: Option<&'a Block>,
}

impl CallFrame<'_> {
    /// Invoke the trailing block, failing if none was given
    pub fn yield_block(&self, args: &[Value]) -> Result<Value, CallError> {
        match self.block {
            Some(block) => block(args),
            None => Err(CallError::Argument {
                name: self.name.to_string(),
                reason: "no block given".to_string(),
            }),
        }
    }

    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }
}

/// Identity of one concrete method implementation
///
/// Two lookups of the same name yield the same `MethodId` only if the same
/// definition is still bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(u64);

impl MethodId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        MethodId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// A method implementation with a process-unique identity
#[derive(Clone)]
pub struct Method {
    id: MethodId,
    body: Arc<MethodBody>,
    forwarding: bool,
}

impl Method {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&CallFrame<'_>) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self {
            id: MethodId::next(),
            body: Arc::new(body),
            forwarding: false,
        }
    }

    /// A method bound in an owner's own table only to forward to an
    /// inherited implementation. The owner does not define the member: it
    /// cannot be removed from that table.
    pub fn forwarding<F>(body: F) -> Self
    where
        F: Fn(&CallFrame<'_>) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self {
            forwarding: true,
            ..Self::new(body)
        }
    }

    pub fn id(&self) -> MethodId {
        self.id
    }

    pub fn is_forwarding(&self) -> bool {
        self.forwarding
    }

    pub fn invoke(&self, frame: &CallFrame<'_>) -> Result<Value, CallError> {
        (self.body)(frame)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("id", &self.id)
            .field("forwarding", &self.forwarding)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_ids_are_unique() {
        let a = Method::new(|_| Ok(Value::Nil));
        let b = Method::new(|_| Ok(Value::Nil));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn test_forwarding_flag() {
        assert!(!Method::new(|_| Ok(Value::Nil)).is_forwarding());
        let fwd = Method::forwarding(|_| Ok(Value::Nil));
        assert!(fwd.is_forwarding());
        assert!(fwd.clone().is_forwarding());
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Int(3), Value::Int(3));
        assert_ne!(Value::Int(3), Value::Str("3".into()));
        assert_eq!(Value::default(), Value::Nil);

        let obj = Arc::new(Object::new(OwnerId::from_index(0)));
        let same = Value::Object(obj.clone());
        let other = Value::Object(Arc::new(Object::new(OwnerId::from_index(0))));
        assert_eq!(Value::Object(obj), same);
        assert_ne!(same, other);
    }

    #[test]
    fn test_object_fields_default_to_nil() {
        let obj = Object::new(OwnerId::from_index(1));
        assert!(obj.get("missing").is_nil());
        obj.set("count", Value::Int(4));
        assert_eq!(obj.get("count").as_int(), Some(4));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Nil.to_string(), "nil");
        assert_eq!(Value::Int(-2).to_string(), "-2");
        assert_eq!(Value::Str("hi".into()).to_string(), "\"hi\"");
    }
}
