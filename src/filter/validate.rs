//! Structural checks on draft trees and on converted wire objects.

use serde_json::{Map, Value as JsonValue};

use super::model::{FilterNode, Operator, PropertyCategory};
use super::wire::TIMESTAMP_PROPERTIES;
use crate::error::FilterError;

/// Checks a draft before it is normalized and converted.
pub fn validate_structure(root: Option<&FilterNode>) -> Result<(), FilterError> {
    match root {
        Some(node) => check_node(node, &mut Vec::new()),
        None => Ok(()),
    }
}

fn check_node(node: &FilterNode, path: &mut Vec<usize>) -> Result<(), FilterError> {
    match node {
        FilterNode::Group(group) => {
            if group.children.is_empty() {
                return Err(FilterError::invalid(format!("empty group at {path:?}")));
            }
            for (index, child) in group.children.iter().enumerate() {
                path.push(index);
                check_node(child, path)?;
                path.pop();
            }
            Ok(())
        }
        FilterNode::Rule(rule) => {
            let complete = rule.as_complete().ok_or_else(|| FilterError::IncompleteRule {
                path: path.clone(),
            })?;
            if !complete.category.supports(complete.operator) {
                return Err(FilterError::invalid(format!(
                    "operator {} is not available for {:?} at {path:?}",
                    complete.operator, complete.category
                )));
            }
            if complete.operator.takes_value() && complete.value.is_missing() {
                return Err(FilterError::invalid(format!(
                    "missing value for {} at {path:?}",
                    complete.operator
                )));
            }
            Ok(())
        }
    }
}

/// Checks a converted filter object before it is sent: only `and`/`or`
/// arrays and property conditions, nested at most `max_depth` group levels
/// below the root group.
pub fn validate_wire_output(value: &JsonValue, max_depth: usize) -> Result<(), FilterError> {
    check_wire(value, 0, max_depth, "$")
}

fn check_wire(
    value: &JsonValue,
    level: usize,
    max_depth: usize,
    at: &str,
) -> Result<(), FilterError> {
    let object = value
        .as_object()
        .ok_or_else(|| FilterError::invalid(format!("{at}: expected an object")))?;

    for key in ["and", "or"] {
        let Some(members) = object.get(key) else {
            continue;
        };
        if object.len() != 1 {
            return Err(FilterError::invalid(format!("{at}: `{key}` must be the only key")));
        }
        if level > max_depth {
            return Err(FilterError::invalid(format!(
                "{at}: group nested {level} levels deep, ceiling is {max_depth}"
            )));
        }
        let members = members
            .as_array()
            .ok_or_else(|| FilterError::invalid(format!("{at}.{key}: expected an array")))?;
        if members.len() < 2 {
            return Err(FilterError::invalid(format!(
                "{at}.{key}: group needs at least two members, found {}",
                members.len()
            )));
        }
        for (index, member) in members.iter().enumerate() {
            check_wire(member, level + 1, max_depth, &format!("{at}.{key}[{index}]"))?;
        }
        return Ok(());
    }

    check_condition(object, at)
}

fn check_condition(object: &Map<String, JsonValue>, at: &str) -> Result<(), FilterError> {
    if object.len() != 2 {
        return Err(FilterError::invalid(format!(
            "{at}: condition must hold a target and one category, found {} keys",
            object.len()
        )));
    }

    let (category, condition) = if let Some(name) = object.get("timestamp") {
        let name = name
            .as_str()
            .filter(|n| TIMESTAMP_PROPERTIES.contains(n))
            .ok_or_else(|| FilterError::invalid(format!("{at}: unknown timestamp {name}")))?;
        let condition = object
            .get(name)
            .ok_or_else(|| FilterError::invalid(format!("{at}: missing `{name}` condition")))?;
        (PropertyCategory::Date, condition)
    } else {
        let property = object
            .get("property")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| FilterError::invalid(format!("{at}: missing `property`")))?;
        if property.is_empty() {
            return Err(FilterError::invalid(format!("{at}: empty property name")));
        }
        let (key, condition) = object
            .iter()
            .find(|(key, _)| key.as_str() != "property")
            .ok_or_else(|| FilterError::invalid(format!("{at}: missing category")))?;
        let category = PropertyCategory::from_wire_key(key)
            .ok_or_else(|| FilterError::invalid(format!("{at}: unknown category `{key}`")))?;
        (category, condition)
    };

    let condition = condition.as_object().filter(|c| c.len() == 1).ok_or_else(|| {
        FilterError::invalid(format!("{at}: condition must hold exactly one operator"))
    })?;
    let Some((name, payload)) = condition.iter().next() else {
        return Err(FilterError::invalid(format!("{at}: empty condition")));
    };
    let operator = Operator::from_name(name)
        .filter(|op| category.supports(*op))
        .ok_or_else(|| {
            FilterError::invalid(format!("{at}: operator `{name}` not valid for {category:?}"))
        })?;

    let payload_ok = if operator.is_relative_window() {
        payload.as_object().is_some_and(Map::is_empty)
    } else if operator.is_emptiness() {
        payload == &JsonValue::Bool(true)
    } else {
        !payload.is_null()
    };
    if !payload_ok {
        return Err(FilterError::invalid(format!(
            "{at}: unexpected payload {payload} for `{name}`"
        )));
    }
    Ok(())
}
