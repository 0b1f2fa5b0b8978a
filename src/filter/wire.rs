use chrono::NaiveDate;
use serde_json::{json, Map, Value as JsonValue};

use super::model::{Operator, PropertyCategory};

/// Timestamp properties are addressed with a `timestamp` key instead of
/// `property`.
pub const TIMESTAMP_PROPERTIES: [&str; 2] = ["created_time", "last_edited_time"];

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Relative date windows: `{}`.
    Empty,
    /// Emptiness checks: `true`.
    Flag,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

impl Payload {
    fn to_json(&self) -> JsonValue {
        match self {
            Payload::Empty => JsonValue::Object(Map::new()),
            Payload::Flag => JsonValue::Bool(true),
            Payload::Bool(b) => JsonValue::Bool(*b),
            Payload::Number(n) => json!(n),
            Payload::Text(s) => JsonValue::String(s.clone()),
            Payload::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WireLeaf {
    pub property: String,
    pub category: PropertyCategory,
    pub operator: Operator,
    pub payload: Payload,
}

impl WireLeaf {
    pub fn is_timestamp(&self) -> bool {
        self.category == PropertyCategory::Date
            && TIMESTAMP_PROPERTIES.contains(&self.property.as_str())
    }

    pub fn to_json(&self) -> JsonValue {
        let mut condition = Map::new();
        condition.insert(self.operator.as_str().to_string(), self.payload.to_json());

        let mut object = Map::new();
        if self.is_timestamp() {
            object.insert("timestamp".to_string(), JsonValue::String(self.property.clone()));
            object.insert(self.property.clone(), JsonValue::Object(condition));
        } else {
            object.insert("property".to_string(), JsonValue::String(self.property.clone()));
            object.insert(
                self.category.wire_key().to_string(),
                JsonValue::Object(condition),
            );
        }
        JsonValue::Object(object)
    }
}

/// Filter in the query API's grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum WireFilter {
    Leaf(WireLeaf),
    And(Vec<WireFilter>),
    Or(Vec<WireFilter>),
}

impl WireFilter {
    /// Group levels from this node down to its deepest leaf.
    pub fn nesting(&self) -> usize {
        match self {
            WireFilter::Leaf(_) => 0,
            WireFilter::And(members) | WireFilter::Or(members) => {
                1 + members.iter().map(WireFilter::nesting).max().unwrap_or(0)
            }
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            WireFilter::Leaf(_) => 1,
            WireFilter::And(members) | WireFilter::Or(members) => {
                members.iter().map(WireFilter::leaf_count).sum()
            }
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            WireFilter::Leaf(leaf) => leaf.to_json(),
            WireFilter::And(members) => json!({ "and": members_json(members) }),
            WireFilter::Or(members) => json!({ "or": members_json(members) }),
        }
    }
}

fn members_json(members: &[WireFilter]) -> Vec<JsonValue> {
    members.iter().map(WireFilter::to_json).collect()
}

/// Nested group levels beneath the root group; 0 for a bare leaf or a flat
/// root group.
pub fn wire_depth(filter: &WireFilter) -> usize {
    filter.nesting().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(
        property: &str,
        category: PropertyCategory,
        operator: Operator,
        payload: Payload,
    ) -> WireFilter {
        WireFilter::Leaf(WireLeaf {
            property: property.to_string(),
            category,
            operator,
            payload,
        })
    }

    #[test]
    fn test_leaf_json() {
        let price =
            leaf("Price", PropertyCategory::Number, Operator::LessThan, Payload::Number(10.0));
        assert_eq!(
            price.to_json(),
            json!({ "property": "Price", "number": { "less_than": 10.0 } })
        );

        let notes = leaf("Notes", PropertyCategory::Text, Operator::IsEmpty, Payload::Flag);
        assert_eq!(
            notes.to_json(),
            json!({ "property": "Notes", "rich_text": { "is_empty": true } })
        );

        let recent = leaf("Due", PropertyCategory::Date, Operator::PastWeek, Payload::Empty);
        assert_eq!(
            recent.to_json(),
            json!({ "property": "Due", "date": { "past_week": {} } })
        );
    }

    #[test]
    fn test_timestamp_leaf_json() {
        let created = leaf(
            "created_time",
            PropertyCategory::Date,
            Operator::OnOrAfter,
            Payload::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()),
        );
        assert_eq!(
            created.to_json(),
            json!({ "timestamp": "created_time", "created_time": { "on_or_after": "2024-01-31" } })
        );
    }

    #[test]
    fn test_group_json_and_depth() {
        let a = leaf("A", PropertyCategory::Checkbox, Operator::Equals, Payload::Bool(true));
        let b = leaf("B", PropertyCategory::Select, Operator::Equals, Payload::Text("x".into()));
        let filter = WireFilter::Or(vec![a.clone(), WireFilter::And(vec![a.clone(), b.clone()])]);
        assert_eq!(filter.nesting(), 2);
        assert_eq!(wire_depth(&filter), 1);
        assert_eq!(wire_depth(&a), 0);
        assert_eq!(filter.leaf_count(), 3);
        assert_eq!(
            filter.to_json(),
            json!({ "or": [
                { "property": "A", "checkbox": { "equals": true } },
                { "and": [
                    { "property": "A", "checkbox": { "equals": true } },
                    { "property": "B", "select": { "equals": "x" } }
                ] }
            ] })
        );
    }
}
