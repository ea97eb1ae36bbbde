//! Admin template interpretation.
//!
//! The admin template is ordinary snippet code that must bind two string
//! names: `CLASS_NAME` (the class the contestant implements) and
//! `METHOD_NAME` (the method every testcase calls). Anything else it binds
//! is fixture state visible to every testcase of the batch.

use std::collections::BTreeMap;

use crate::error::GradingError;
use crate::sandbox::{Namespace, NamespaceId, SnippetExecutor};
use crate::value::Value;

pub const CLASS_NAME_KEY: &str = "CLASS_NAME";
pub const METHOD_NAME_KEY: &str = "METHOD_NAME";

/// Fixture context shared by every testcase of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminContext {
    /// Namespace every testcase snippet is executed on top of
    pub namespace: NamespaceId,
    pub class_name: String,
    pub method_name: String,
    /// Decoded snapshot of the template's bindings
    pub bindings: BTreeMap<String, Value>,
}

/// Execute the admin template and read its conventions.
///
/// A template that fails to run, or that does not bind both convention
/// names to strings, is fatal for the whole batch.
pub async fn load_admin_context<E>(
    executor: &mut E,
    admin_template: &str,
) -> Result<AdminContext, GradingError>
where
    E: SnippetExecutor + ?Sized,
{
    let namespace = executor
        .execute(admin_template, None)
        .await
        .map_err(|e| GradingError::AdminTemplate(Box::new(e)))?;

    let class_name = convention(&namespace, CLASS_NAME_KEY)?;
    let method_name = convention(&namespace, METHOD_NAME_KEY)?;

    tracing::debug!(
        namespace = %namespace.id,
        class_name = %class_name,
        method_name = %method_name,
        fixtures = namespace.bindings.len(),
        "Loaded admin template"
    );

    Ok(AdminContext {
        namespace: namespace.id,
        class_name,
        method_name,
        bindings: namespace.bindings,
    })
}

fn convention(namespace: &Namespace, key: &str) -> Result<String, GradingError> {
    match namespace.get(key) {
        Some(Value::Str(name)) if !name.trim().is_empty() => Ok(name.trim().to_string()),
        Some(Value::Str(_)) => Err(GradingError::MissingConvention(format!(
            "{key} as a non-empty string"
        ))),
        Some(other) => Err(GradingError::MissingConvention(format!(
            "{key} as a string, not {}",
            other.type_name()
        ))),
        None => Err(GradingError::MissingConvention(key.to_string())),
    }
}
