//! Placeholder substitution for generated artifacts.
//!
//! Templates use `{{NAME}}` placeholders and `{{#if NAME}}...{{/if}}`
//! blocks that are kept only when `NAME` resolves to a non-empty value.
//! Blocks do not nest.

use std::collections::BTreeMap;

use crate::error::{HarborComposeError, Result};

const IF_OPEN: &str = "{{#if ";
const IF_CLOSE: &str = "{{/if}}";

/// Values substituted into a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateContext {
    values: BTreeMap<String, String>,
}

impl TemplateContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, returning the context for chaining.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Add or replace a value.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    fn is_set(&self, key: &str) -> bool {
        self.values
            .get(key)
            .map(|value| !value.is_empty())
            .unwrap_or(false)
    }
}

/// Render a template, failing on unknown placeholders or unbalanced blocks.
pub fn render(template: &str, context: &TemplateContext) -> Result<String> {
    let expanded = apply_conditionals(template, context)?;
    apply_placeholders(&expanded, context)
}

fn apply_conditionals(template: &str, context: &TemplateContext) -> Result<String> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find(IF_OPEN) {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + IF_OPEN.len()..];
        let name_end = after_open
            .find("}}")
            .ok_or_else(|| HarborComposeError::Other("unterminated {{#if}} tag".to_string()))?;
        let key = after_open[..name_end].trim();
        let body_and_rest = &after_open[name_end + 2..];
        let body_end = body_and_rest.find(IF_CLOSE).ok_or_else(|| {
            HarborComposeError::Other(format!("missing {{{{/if}}}} for block {key}"))
        })?;
        let body = &body_and_rest[..body_end];
        if body.contains(IF_OPEN) {
            return Err(HarborComposeError::Other(format!(
                "nested block inside {key} is not supported"
            )));
        }
        if context.is_set(key) {
            output.push_str(body);
        }
        rest = &body_and_rest[body_end + IF_CLOSE.len()..];
    }
    output.push_str(rest);
    Ok(output)
}

fn apply_placeholders(template: &str, context: &TemplateContext) -> Result<String> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            HarborComposeError::Other("unterminated placeholder in template".to_string())
        })?;
        let key = after[..end].trim();
        let value = context.values.get(key).ok_or_else(|| {
            HarborComposeError::Other(format!("unresolved template placeholder: {key}"))
        })?;
        output.push_str(value);
        rest = &after[end + 2..];
    }
    output.push_str(rest);
    Ok(output)
}
