//! Removes negated groups by De Morgan rewriting.
//!
//! The query API has no notion of a negated group, so every `negated` flag
//! is pushed down to the rules, each of which swaps its operator for the
//! complementary one the API exposes.

use std::collections::BTreeSet;

use log::debug;

use super::model::{CompoundFilter, FilterGroup, FilterNode, FilterRule, Operator, PropertyCategory};
use crate::error::FilterError;

/// Complementary operator for `operator` on a property of `category`, if the
/// API exposes one.
pub fn negated_operator(operator: Operator, category: PropertyCategory) -> Option<Operator> {
    use Operator::*;

    let complement = match operator {
        Equals => DoesNotEqual,
        DoesNotEqual => Equals,
        Contains => DoesNotContain,
        DoesNotContain => Contains,
        GreaterThan => LessThanOrEqualTo,
        LessThanOrEqualTo => GreaterThan,
        LessThan => GreaterThanOrEqualTo,
        GreaterThanOrEqualTo => LessThan,
        Before => OnOrAfter,
        OnOrAfter => Before,
        After => OnOrBefore,
        OnOrBefore => After,
        IsEmpty => IsNotEmpty,
        IsNotEmpty => IsEmpty,
        StartsWith | EndsWith => return None,
        PastWeek | PastMonth | PastYear | ThisWeek | NextWeek | NextMonth | NextYear => return None,
    };
    (category.supports(operator) && category.supports(complement)).then_some(complement)
}

/// Operators that would have to be negated but have no complement.
///
/// Only rules under an odd number of negated groups are negated, so a
/// doubly negated rule never needs a complement: `starts_with` inside two
/// negated groups is accepted. Any operator under a single negation is
/// always reported.
pub fn validate_for_negation(root: Option<&FilterNode>) -> BTreeSet<Operator> {
    let mut unsupported = BTreeSet::new();
    if let Some(node) = root {
        collect_unsupported(node, false, &mut unsupported);
    }
    unsupported
}

fn collect_unsupported(node: &FilterNode, negate: bool, out: &mut BTreeSet<Operator>) {
    match node {
        FilterNode::Rule(rule) => {
            if !negate {
                return;
            }
            let (Some(operator), Some(category)) = (rule.operator, rule.property_type) else {
                return;
            };
            if negated_operator(operator, category).is_none() {
                out.insert(operator);
            }
        }
        FilterNode::Group(group) => {
            let negate = negate ^ group.negated;
            for child in &group.children {
                collect_unsupported(child, negate, out);
            }
        }
    }
}

/// Returns an equivalent tree with no negated group. Nothing is rewritten
/// when any operator under a negation lacks a complement.
pub fn normalize(root: Option<&FilterNode>) -> Result<CompoundFilter, FilterError> {
    let unsupported = validate_for_negation(root);
    if !unsupported.is_empty() {
        return Err(FilterError::UnsupportedNegation {
            operators: unsupported,
        });
    }
    let Some(node) = root else {
        return Ok(None);
    };
    let mut path = Vec::new();
    let normalized = rewrite(node, false, &mut path)?;
    if normalized != *node {
        debug!("normalized negated groups, depth {}", normalized.depth());
    }
    Ok(Some(normalized))
}

fn rewrite(
    node: &FilterNode,
    negate: bool,
    path: &mut Vec<usize>,
) -> Result<FilterNode, FilterError> {
    match node {
        FilterNode::Rule(rule) if !negate => Ok(FilterNode::Rule(rule.clone())),
        FilterNode::Rule(rule) => negate_rule(rule, path).map(FilterNode::Rule),
        FilterNode::Group(group) => {
            let negate = negate ^ group.negated;
            let mut children = Vec::with_capacity(group.children.len());
            for (index, child) in group.children.iter().enumerate() {
                path.push(index);
                children.push(rewrite(child, negate, path)?);
                path.pop();
            }
            let operator = if negate {
                group.operator.flip()
            } else {
                group.operator
            };
            Ok(FilterNode::Group(FilterGroup::new(operator, children)))
        }
    }
}

fn negate_rule(rule: &FilterRule, path: &[usize]) -> Result<FilterRule, FilterError> {
    let complete = rule.as_complete().ok_or_else(|| FilterError::IncompleteRule {
        path: path.to_vec(),
    })?;
    let operator = negated_operator(complete.operator, complete.category).ok_or_else(|| {
        FilterError::UnsupportedNegation {
            operators: [complete.operator].into_iter().collect(),
        }
    })?;
    Ok(FilterRule {
        operator: Some(operator),
        ..rule.clone()
    })
}
