//! Host program scripts run by the `callcount` binary
//!
//! A script is a line-oriented program that builds and exercises a
//! [`Namespace`]. Lines starting with `#` are comments.
//!
//! ```text
//! # classes, subclasses and modules are defined or reopened by path
//! class Counter
//! class Special < Counter
//! module Greeter
//! # `#` defines an instance-scoped method, `.` an owner-scoped one
//! def Counter#increment tally n
//! def Counter.build returns 1
//! undef Counter#increment
//! include Counter Greeter
//! extend Counter Greeter
//! let c = new Counter
//! # call five times, then once with an integer argument
//! call c.increment x5
//! call Counter.build 3
//! ```
//!
//! Comments must take a whole line.
//!
//! Method bodies: none (returns nil), `returns INT`, `raises MESSAGE...`,
//! `tally FIELD`, `recurse`, `super`.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::namespace::{CallError, MemberKind, Method, MethodSlot, Namespace, OwnerId, Value};
use crate::specifier::TargetSpec;

/// What a scripted method does when called
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Nil,
    Returns(i64),
    Raises(String),
    /// Increment an integer field on the receiver and return it
    Tally(String),
    /// Call itself with the first argument minus one while it is positive
    Recurse,
    /// Forward to the next implementation in the ancestry
    Super,
}

impl Body {
    fn parse(tokens: &[&str]) -> Result<Self> {
        match tokens {
            [] => Ok(Body::Nil),
            ["returns", n] => Ok(Body::Returns(
                n.parse().with_context(|| format!("Invalid integer: {}", n))?,
            )),
            ["raises", message @ ..] if !message.is_empty() => Ok(Body::Raises(message.join(" "))),
            ["tally", field] => Ok(Body::Tally(field.to_string())),
            ["recurse"] => Ok(Body::Recurse),
            ["super"] => Ok(Body::Super),
            other => bail!(
                "Invalid method body: {}. Expected returns INT, raises MSG, tally FIELD, recurse or super",
                other.join(" ")
            ),
        }
    }

    fn into_method(self, owner: OwnerId, kind: MemberKind) -> Method {
        match self {
            Body::Nil => Method::new(|_| Ok(Value::Nil)),
            Body::Returns(n) => Method::new(move |_| Ok(Value::Int(n))),
            Body::Raises(message) => Method::new(move |_| Err(CallError::Raised(message.clone()))),
            Body::Tally(field) => Method::new(move |frame| {
                let obj = frame.receiver.as_object().ok_or_else(|| CallError::Argument {
                    name: frame.name.to_string(),
                    reason: "tally needs an object receiver".to_string(),
                })?;
                let next = Value::Int(obj.get(&field).as_int().unwrap_or(0) + 1);
                obj.set(&field, next.clone());
                Ok(next)
            }),
            Body::Recurse => Method::new(|frame| {
                let n = frame.arg(0).as_int().unwrap_or(0);
                if n > 0 {
                    frame
                        .ns
                        .call(frame.receiver, frame.name, &[Value::Int(n - 1)], frame.block)?;
                }
                Ok(Value::Int(n))
            }),
            Body::Super => {
                let slot = MethodSlot { owner, table: kind };
                Method::new(move |frame| frame.ns.call_super(slot, frame))
            }
        }
    }
}

/// A single script statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Class {
        path: String,
        superclass: Option<String>,
    },
    Module {
        path: String,
    },
    Def {
        target: TargetSpec,
        body: Body,
    },
    Undef {
        target: TargetSpec,
    },
    Include {
        target: String,
        module: String,
    },
    Extend {
        target: String,
        module: String,
    },
    Let {
        var: String,
        class: String,
    },
    Call {
        receiver: String,
        member: String,
        args: Vec<i64>,
        times: u64,
    },
}

impl Statement {
    /// Parse one non-comment line
    pub fn parse(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["class", path] => Ok(Statement::Class {
                path: path.to_string(),
                superclass: None,
            }),
            ["class", path, "<", superclass] => Ok(Statement::Class {
                path: path.to_string(),
                superclass: Some(superclass.to_string()),
            }),
            ["module", path] => Ok(Statement::Module {
                path: path.to_string(),
            }),
            ["def", target, body @ ..] => Ok(Statement::Def {
                target: TargetSpec::parse(target)?,
                body: Body::parse(body)?,
            }),
            ["undef", target] => Ok(Statement::Undef {
                target: TargetSpec::parse(target)?,
            }),
            ["include", target, module] => Ok(Statement::Include {
                target: target.to_string(),
                module: module.to_string(),
            }),
            ["extend", target, module] => Ok(Statement::Extend {
                target: target.to_string(),
                module: module.to_string(),
            }),
            ["let", var, "=", "new", class] => Ok(Statement::Let {
                var: var.to_string(),
                class: class.to_string(),
            }),
            ["call", call, rest @ ..] => Self::parse_call(call, rest),
            _ => bail!("Unrecognized statement: {}", line.trim()),
        }
    }

    fn parse_call(call: &str, rest: &[&str]) -> Result<Self> {
        let (receiver, member) = call
            .rsplit_once('.')
            .filter(|(r, m)| !r.is_empty() && !m.is_empty())
            .with_context(|| format!("Invalid call target: {}. Expected RECEIVER.MEMBER", call))?;

        let mut args = Vec::new();
        let mut times = 1;
        for (i, token) in rest.iter().enumerate() {
            if let Some(count) = token.strip_prefix('x') {
                if i + 1 != rest.len() {
                    bail!("Repeat count {} must come last", token);
                }
                times = count
                    .parse()
                    .with_context(|| format!("Invalid repeat count: {}", token))?;
            } else {
                args.push(
                    token
                        .parse()
                        .with_context(|| format!("Invalid integer argument: {}", token))?,
                );
            }
        }

        Ok(Statement::Call {
            receiver: receiver.to_string(),
            member: member.to_string(),
            args,
            times,
        })
    }
}

/// A parsed host program
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Statements with their 1-based line numbers
    statements: Vec<(usize, Statement)>,
}

impl Script {
    pub fn parse(source: &str) -> Result<Self> {
        let mut statements = Vec::new();
        for (index, line) in source.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let statement =
                Statement::parse(trimmed).with_context(|| format!("line {}", index + 1))?;
            statements.push((index + 1, statement));
        }
        Ok(Self { statements })
    }

    /// Load a script from a file, or from stdin when `path` is `-`
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = if path == Path::new("-") {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read script from stdin")?;
            buf
        } else {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read script: {}", path.display()))?
        };
        Self::parse(&source).with_context(|| format!("Failed to parse script: {}", path.display()))
    }

    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.statements.iter().map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Execute every statement against `ns`, stopping at the first error
    pub fn run(&self, ns: &Namespace) -> Result<()> {
        let mut vars = HashMap::new();
        for (line, statement) in &self.statements {
            tracing::trace!(line, ?statement, "executing");
            execute(ns, &mut vars, statement).with_context(|| format!("line {}", line))?;
        }
        Ok(())
    }
}

fn owner(ns: &Namespace, path: &str) -> Result<OwnerId> {
    ns.owner_by_path(path)
        .with_context(|| format!("uninitialized constant {}", path))
}

fn execute(ns: &Namespace, vars: &mut HashMap<String, Value>, statement: &Statement) -> Result<()> {
    match statement {
        Statement::Class { path, superclass } => {
            let parent = superclass.as_deref().map(|s| owner(ns, s)).transpose()?;
            ns.define_class(path, parent)?;
        }
        Statement::Module { path } => {
            ns.define_module(path)?;
        }
        Statement::Def { target, body } => {
            let id = owner(ns, target.owner())?;
            let method = body.clone().into_method(id, target.kind());
            ns.define_method(id, target.kind(), target.member(), method)?;
        }
        Statement::Undef { target } => {
            let id = owner(ns, target.owner())?;
            if !ns.remove_method(id, target.kind(), target.member())? {
                bail!("method '{}' not defined in {}", target.member(), target.owner());
            }
        }
        Statement::Include { target, module } => {
            ns.include(owner(ns, target)?, owner(ns, module)?)?;
        }
        Statement::Extend { target, module } => {
            ns.extend(owner(ns, target)?, owner(ns, module)?)?;
        }
        Statement::Let { var, class } => {
            let value = ns.instantiate(owner(ns, class)?)?;
            vars.insert(var.clone(), value);
        }
        Statement::Call {
            receiver,
            member,
            args,
            times,
        } => {
            let recv = match vars.get(receiver) {
                Some(value) => value.clone(),
                None => Value::Owner(owner(ns, receiver)?),
            };
            let args: Vec<Value> = args.iter().copied().map(Value::Int).collect();
            for _ in 0..*times {
                ns.call(&recv, member, &args, None)?;
            }
        }
    }
    Ok(())
}
