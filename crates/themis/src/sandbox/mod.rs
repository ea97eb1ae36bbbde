//! Sandboxed snippet execution.
//!
//! A [`Sandbox`] opens sessions; a session is a [`SnippetExecutor`] bound to
//! one isolated interpreter for the lifetime of a grading batch. Namespaces
//! and objects live inside the interpreter and are referred to by handle.

pub mod denylist;
mod protocol;
mod python;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::GradingError;
use crate::value::Value;

pub use python::{PythonSandbox, PythonSession};

/// Handle to a namespace held by the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NamespaceId(pub u64);

/// Handle to an object instance held by the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns#{}", self.0)
    }
}

/// Result of executing one snippet: the handle of the namespace it ran in and
/// the names it bound, decoded.
///
/// `bindings` holds only the names the snippet itself introduced or rebound;
/// names inherited unchanged from the base namespace are left out. Modules
/// and dunder names are never reported.
#[derive(Debug, Clone, PartialEq)]
pub struct Namespace {
    pub id: NamespaceId,
    pub bindings: BTreeMap<String, Value>,
}

impl Namespace {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

/// Executes snippets inside one isolated interpreter.
///
/// Every call is bounded by the session's time budget and reports failures
/// as values; no snippet error escapes as a panic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnippetExecutor: Send {
    /// Run `code` in a fresh namespace. When `base` is given the new namespace
    /// starts as a shallow copy of it, so objects are shared but new bindings
    /// stay local.
    async fn execute(
        &mut self,
        code: &str,
        base: Option<NamespaceId>,
    ) -> Result<Namespace, GradingError>;

    /// Instantiate `class_name` from `namespace`, passing the bindings of
    /// `init` as keyword arguments.
    async fn instantiate(
        &mut self,
        namespace: NamespaceId,
        class_name: &str,
        init: Option<NamespaceId>,
    ) -> Result<ObjectId, GradingError>;

    /// Call `method` on `object` with the bindings of `kwargs` as keyword
    /// arguments.
    async fn invoke(
        &mut self,
        object: ObjectId,
        method: &str,
        kwargs: NamespaceId,
    ) -> Result<Value, GradingError>;
}

/// Opens executor sessions.
#[async_trait]
pub trait Sandbox: Send + Sync {
    type Session: SnippetExecutor + 'static;

    async fn open(&self) -> Result<Self::Session, GradingError>;
}
