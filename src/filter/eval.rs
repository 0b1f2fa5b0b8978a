use chrono::{Datelike, Days, Months, NaiveDate};
use serde_yaml::Value as YamlValue;

use super::model::{FilterNode, GroupOperator, Operator, PropertyCategory};
use super::rewrite::convert_rule;
use super::wire::{Payload, WireFilter, WireLeaf};

#[derive(Debug, Clone, Copy)]
pub struct EvalContext {
    /// Reference date for relative windows such as `past_week`.
    pub today: NaiveDate,
}

impl EvalContext {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }
}

/// Evaluates a draft tree, honouring negated groups. Rules that cannot be
/// converted match nothing.
pub fn matches_node(node: &FilterNode, row: &YamlValue, ctx: &EvalContext) -> bool {
    match node {
        FilterNode::Rule(rule) => convert_rule(rule, &[])
            .map(|filter| matches_wire(&filter, row, ctx))
            .unwrap_or(false),
        FilterNode::Group(group) => {
            let mut children = group.children.iter().map(|c| matches_node(c, row, ctx));
            let result = match group.operator {
                GroupOperator::And => children.all(|m| m),
                GroupOperator::Or => children.any(|m| m),
            };
            result != group.negated
        }
    }
}

pub fn matches_wire(filter: &WireFilter, row: &YamlValue, ctx: &EvalContext) -> bool {
    match filter {
        WireFilter::Leaf(leaf) => eval_leaf(leaf, row, ctx),
        WireFilter::And(members) => members.iter().all(|m| matches_wire(m, row, ctx)),
        WireFilter::Or(members) => members.iter().any(|m| matches_wire(m, row, ctx)),
    }
}

fn get_field_case_insensitive<'a>(row: &'a YamlValue, field: &str) -> Option<&'a YamlValue> {
    let mapping = row.as_mapping()?;
    if let Some(value) = mapping.get(field) {
        return Some(value);
    }
    let field_lower = field.to_lowercase();
    for (key, value) in mapping {
        if let Some(key_str) = key.as_str() {
            if key_str.to_lowercase() == field_lower {
                return Some(value);
            }
        }
    }
    None
}

fn is_empty_value(value: Option<&YamlValue>) -> bool {
    match value {
        None | Some(YamlValue::Null) => true,
        Some(YamlValue::String(s)) => s.is_empty(),
        Some(YamlValue::Sequence(items)) => items.is_empty(),
        Some(_) => false,
    }
}

fn eval_leaf(leaf: &WireLeaf, row: &YamlValue, ctx: &EvalContext) -> bool {
    let field = get_field_case_insensitive(row, &leaf.property);

    match leaf.operator {
        Operator::IsEmpty => return is_empty_value(field),
        Operator::IsNotEmpty => return !is_empty_value(field),
        _ => {}
    }

    // Missing and null properties fail every comparison.
    let field = match field {
        None | Some(YamlValue::Null) => return false,
        Some(value) => value,
    };

    match leaf.category {
        PropertyCategory::Checkbox => {
            let (Some(actual), Payload::Bool(expected)) = (field.as_bool(), &leaf.payload) else {
                return false;
            };
            match leaf.operator {
                Operator::Equals => actual == *expected,
                Operator::DoesNotEqual => actual != *expected,
                _ => false,
            }
        }
        PropertyCategory::Number => {
            let (Some(actual), Payload::Number(expected)) = (yaml_to_number(field), &leaf.payload)
            else {
                return false;
            };
            compare_float(actual, *expected, leaf.operator).unwrap_or(false)
        }
        PropertyCategory::Text | PropertyCategory::Select | PropertyCategory::Status => {
            let (Some(actual), Payload::Text(expected)) = (yaml_to_string(field), &leaf.payload)
            else {
                return false;
            };
            compare_text(&actual, expected, leaf.operator).unwrap_or(false)
        }
        PropertyCategory::MultiSelect => {
            let Payload::Text(needle) = &leaf.payload else {
                return false;
            };
            let found = contains_option(field, needle);
            match leaf.operator {
                Operator::Contains => found,
                Operator::DoesNotContain => !found,
                _ => false,
            }
        }
        PropertyCategory::Date => {
            let Some(actual) = yaml_to_date(field) else {
                return false;
            };
            match &leaf.payload {
                Payload::Date(expected) => {
                    compare_date(actual, *expected, leaf.operator).unwrap_or(false)
                }
                Payload::Empty => in_window(actual, ctx.today, leaf.operator).unwrap_or(false),
                _ => false,
            }
        }
    }
}

fn contains_option(field: &YamlValue, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    match field {
        YamlValue::Sequence(items) => items
            .iter()
            .filter_map(yaml_to_string)
            .any(|item| item.to_lowercase() == needle),
        value => yaml_to_string(value).is_some_and(|s| s.to_lowercase() == needle),
    }
}

fn yaml_to_string(v: &YamlValue) -> Option<String> {
    match v {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn yaml_to_number(v: &YamlValue) -> Option<f64> {
    v.as_f64().or_else(|| v.as_i64().map(|i| i as f64))
}

fn yaml_to_date(v: &YamlValue) -> Option<NaiveDate> {
    let s = v.as_str()?;
    NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()
}

fn compare_text(actual: &str, expected: &str, op: Operator) -> Option<bool> {
    let a = actual.to_lowercase();
    let b = expected.to_lowercase();
    Some(match op {
        Operator::Equals => a == b,
        Operator::DoesNotEqual => a != b,
        Operator::Contains => a.contains(&b),
        Operator::DoesNotContain => !a.contains(&b),
        Operator::StartsWith => a.starts_with(&b),
        Operator::EndsWith => a.ends_with(&b),
        _ => return None,
    })
}

fn compare_float(a: f64, b: f64, op: Operator) -> Option<bool> {
    Some(match op {
        Operator::Equals => (a - b).abs() < f64::EPSILON,
        Operator::DoesNotEqual => (a - b).abs() >= f64::EPSILON,
        Operator::GreaterThan => a > b,
        Operator::LessThan => a < b,
        Operator::GreaterThanOrEqualTo => a >= b,
        Operator::LessThanOrEqualTo => a <= b,
        _ => return None,
    })
}

fn compare_date(a: NaiveDate, b: NaiveDate, op: Operator) -> Option<bool> {
    Some(match op {
        Operator::Equals => a == b,
        Operator::Before => a < b,
        Operator::After => a > b,
        Operator::OnOrBefore => a <= b,
        Operator::OnOrAfter => a >= b,
        _ => return None,
    })
}

fn in_window(date: NaiveDate, today: NaiveDate, op: Operator) -> Option<bool> {
    let (start, end) = match op {
        Operator::PastWeek => (today.checked_sub_days(Days::new(7))?, today),
        Operator::PastMonth => (today.checked_sub_months(Months::new(1))?, today),
        Operator::PastYear => (today.checked_sub_months(Months::new(12))?, today),
        Operator::NextWeek => (today, today.checked_add_days(Days::new(7))?),
        Operator::NextMonth => (today, today.checked_add_months(Months::new(1))?),
        Operator::NextYear => (today, today.checked_add_months(Months::new(12))?),
        Operator::ThisWeek => return Some(date.iso_week() == today.iso_week()),
        _ => return None,
    };
    Some(start <= date && date <= end)
}
