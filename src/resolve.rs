use serde_json::Value;

use crate::error::SchleppnetzError;
use crate::filter::{FilterContext, FilterRegistry};
use crate::node::{Node, SELF_SELECTOR};
use crate::schema::{FieldSpec, NOT_APPLICABLE};

/// Resolves one field rule against a scope.
///
/// Candidate locators are tried in order; the first one matching a non-empty
/// node set wins and its index selects among the switch pipelines. Without
/// any match the literal fallback applies, run through the default pipeline
/// like any other value. `Ok(Value::Null)` means the rule resolved to
/// nothing and the field stays at its record default.
pub(crate) fn resolve_field(
    scope: Node<'_>,
    spec: &FieldSpec,
    registry: &FilterRegistry,
    ctx: &FilterContext<'_>,
) -> Result<Value, SchleppnetzError> {
    let mut matched: Option<(usize, Node<'_>)> = None;
    for (index, locator) in spec.selectors.iter().enumerate() {
        if locator == SELF_SELECTOR {
            matched = Some((index, scope));
            break;
        }
        let hits = scope.select(locator)?;
        if let Some(node) = hits.first() {
            matched = Some((index, *node));
            break;
        }
    }

    let (raw, matched_index) = match matched {
        Some((index, node)) => (read_value(node, spec, ctx)?, Some(index)),
        None => match &spec.text {
            Some(text) => (Value::String(text.clone()), None),
            None => return Ok(Value::Null),
        },
    };

    // The not-provided sentinel is a valid result and skips all pipelines.
    if raw.as_str() == Some(NOT_APPLICABLE) {
        return Ok(raw);
    }

    let steps = match matched_index {
        Some(index) if !spec.switch_filters.is_empty() => spec
            .switch_filters
            .get(&index)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => spec.filters.as_slice(),
    };
    registry.apply(steps, raw, ctx)
}

/// Reads the raw value off a matched node: custom handlers when installed,
/// otherwise attribute, then data item, then text.
fn read_value(
    node: Node<'_>,
    spec: &FieldSpec,
    ctx: &FilterContext<'_>,
) -> Result<Value, SchleppnetzError> {
    if !spec.element_process.is_empty() {
        let mut value = Value::Null;
        for (index, handler) in spec.element_process.iter().enumerate() {
            value = handler
                .call(node, value, ctx)
                .map_err(|source| SchleppnetzError::Handler { index, source })?;
        }
        return Ok(value);
    }
    if let Some(attr) = &spec.attr {
        // A declared but absent attribute reads as empty, not as a failure.
        return Ok(Value::String(node.attr(attr).unwrap_or_default()));
    }
    if let Some(data) = &spec.data {
        return Ok(Value::String(node.data(data).unwrap_or_default()));
    }
    Ok(Value::String(node.text()))
}
