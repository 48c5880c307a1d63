//! callcount - count invocations of one late-bound method in a live namespace
//!
//! This library provides a mutable host namespace (classes, modules, method
//! tables, mixins and mutation events) and an interception engine that keeps
//! a counting shim installed on a single target member, even when that member
//! is defined late, inherited, mixed in or redefined.

pub mod cli;
pub mod config;
pub mod counter;
pub mod engine;
pub mod installer;
pub mod namespace;
pub mod report;
pub mod resolver;
pub mod script;
pub mod specifier;
pub mod watcher;
