use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Root of a filter tree. `None` means no filter is defined.
pub type CompoundFilter = Option<FilterNode>;

/// Child indices from the root to a node. The empty path is the root.
pub type Path = [usize];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    DateRange(DateRange),
    String(String),
}

impl FilterValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, FilterValue::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyCategory {
    Checkbox,
    Date,
    MultiSelect,
    Number,
    Text,
    Select,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    DoesNotEqual,
    Contains,
    DoesNotContain,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterThanOrEqualTo,
    LessThanOrEqualTo,
    Before,
    After,
    OnOrBefore,
    OnOrAfter,
    IsEmpty,
    IsNotEmpty,
    PastWeek,
    PastMonth,
    PastYear,
    ThisWeek,
    NextWeek,
    NextMonth,
    NextYear,
}

use Operator::*;

const CHECKBOX_OPS: &[Operator] = &[Equals, DoesNotEqual];
const DATE_OPS: &[Operator] = &[
    Equals, Before, After, OnOrBefore, OnOrAfter, IsEmpty, IsNotEmpty, PastWeek, PastMonth,
    PastYear, ThisWeek, NextWeek, NextMonth, NextYear,
];
const MULTI_SELECT_OPS: &[Operator] = &[Contains, DoesNotContain, IsEmpty, IsNotEmpty];
const NUMBER_OPS: &[Operator] = &[
    Equals,
    DoesNotEqual,
    GreaterThan,
    LessThan,
    GreaterThanOrEqualTo,
    LessThanOrEqualTo,
    IsEmpty,
    IsNotEmpty,
];
const TEXT_OPS: &[Operator] = &[
    Equals,
    DoesNotEqual,
    Contains,
    DoesNotContain,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
];
const CHOICE_OPS: &[Operator] = &[Equals, DoesNotEqual, IsEmpty, IsNotEmpty];

impl PropertyCategory {
    pub const ALL: [PropertyCategory; 7] = [
        PropertyCategory::Checkbox,
        PropertyCategory::Date,
        PropertyCategory::MultiSelect,
        PropertyCategory::Number,
        PropertyCategory::Text,
        PropertyCategory::Select,
        PropertyCategory::Status,
    ];

    pub fn operators(self) -> &'static [Operator] {
        match self {
            PropertyCategory::Checkbox => CHECKBOX_OPS,
            PropertyCategory::Date => DATE_OPS,
            PropertyCategory::MultiSelect => MULTI_SELECT_OPS,
            PropertyCategory::Number => NUMBER_OPS,
            PropertyCategory::Text => TEXT_OPS,
            PropertyCategory::Select | PropertyCategory::Status => CHOICE_OPS,
        }
    }

    pub fn supports(self, op: Operator) -> bool {
        self.operators().contains(&op)
    }

    /// Key under which the API expects conditions for this category.
    pub fn wire_key(self) -> &'static str {
        match self {
            PropertyCategory::Checkbox => "checkbox",
            PropertyCategory::Date => "date",
            PropertyCategory::MultiSelect => "multi_select",
            PropertyCategory::Number => "number",
            PropertyCategory::Text => "rich_text",
            PropertyCategory::Select => "select",
            PropertyCategory::Status => "status",
        }
    }

    pub fn from_wire_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.wire_key() == key)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "checkbox" => Some(PropertyCategory::Checkbox),
            "date" | "timestamp" => Some(PropertyCategory::Date),
            "multi_select" | "multiselect" => Some(PropertyCategory::MultiSelect),
            "number" => Some(PropertyCategory::Number),
            "text" | "rich_text" => Some(PropertyCategory::Text),
            "select" => Some(PropertyCategory::Select),
            "status" => Some(PropertyCategory::Status),
            _ => None,
        }
    }
}

impl Operator {
    pub const ALL: [Operator; 23] = [
        Equals,
        DoesNotEqual,
        Contains,
        DoesNotContain,
        StartsWith,
        EndsWith,
        GreaterThan,
        LessThan,
        GreaterThanOrEqualTo,
        LessThanOrEqualTo,
        Before,
        After,
        OnOrBefore,
        OnOrAfter,
        IsEmpty,
        IsNotEmpty,
        PastWeek,
        PastMonth,
        PastYear,
        ThisWeek,
        NextWeek,
        NextMonth,
        NextYear,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Equals => "equals",
            DoesNotEqual => "does_not_equal",
            Contains => "contains",
            DoesNotContain => "does_not_contain",
            StartsWith => "starts_with",
            EndsWith => "ends_with",
            GreaterThan => "greater_than",
            LessThan => "less_than",
            GreaterThanOrEqualTo => "greater_than_or_equal_to",
            LessThanOrEqualTo => "less_than_or_equal_to",
            Before => "before",
            After => "after",
            OnOrBefore => "on_or_before",
            OnOrAfter => "on_or_after",
            IsEmpty => "is_empty",
            IsNotEmpty => "is_not_empty",
            PastWeek => "past_week",
            PastMonth => "past_month",
            PastYear => "past_year",
            ThisWeek => "this_week",
            NextWeek => "next_week",
            NextMonth => "next_month",
            NextYear => "next_year",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }

    /// Relative date windows carry an empty payload.
    pub fn is_relative_window(self) -> bool {
        matches!(
            self,
            PastWeek | PastMonth | PastYear | ThisWeek | NextWeek | NextMonth | NextYear
        )
    }

    pub fn is_emptiness(self) -> bool {
        matches!(self, IsEmpty | IsNotEmpty)
    }

    /// Whether a rule using this operator needs a value.
    pub fn takes_value(self) -> bool {
        !self.is_emptiness() && !self.is_relative_window()
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOperator {
    And,
    Or,
}

impl GroupOperator {
    pub fn flip(self) -> Self {
        match self {
            GroupOperator::And => GroupOperator::Or,
            GroupOperator::Or => GroupOperator::And,
        }
    }
}

/// Leaf predicate. Missing `property` or `property_type` marks a rule the
/// user has not finished filling in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterRule {
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub property_type: Option<PropertyCategory>,
    #[serde(default)]
    pub operator: Option<Operator>,
    #[serde(default)]
    pub value: FilterValue,
}

/// Borrowed view of a rule with every required field present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompleteRule<'a> {
    pub property: &'a str,
    pub category: PropertyCategory,
    pub operator: Operator,
    pub value: &'a FilterValue,
}

impl FilterRule {
    pub fn new(
        property: impl Into<String>,
        category: PropertyCategory,
        operator: Operator,
        value: FilterValue,
    ) -> Self {
        Self {
            property: Some(property.into()),
            property_type: Some(category),
            operator: Some(operator),
            value,
        }
    }

    pub fn incomplete() -> Self {
        Self::default()
    }

    pub fn as_complete(&self) -> Option<CompleteRule<'_>> {
        let property = self.property.as_deref().filter(|p| !p.is_empty())?;
        Some(CompleteRule {
            property,
            category: self.property_type?,
            operator: self.operator?,
            value: &self.value,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub operator: GroupOperator,
    #[serde(default)]
    pub negated: bool,
    pub children: Vec<FilterNode>,
}

impl FilterGroup {
    pub fn new(operator: GroupOperator, children: Vec<FilterNode>) -> Self {
        Self {
            operator,
            negated: false,
            children,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterNode {
    Rule(FilterRule),
    Group(FilterGroup),
}

impl FilterNode {
    pub fn and(children: Vec<FilterNode>) -> Self {
        FilterNode::Group(FilterGroup::new(GroupOperator::And, children))
    }

    pub fn or(children: Vec<FilterNode>) -> Self {
        FilterNode::Group(FilterGroup::new(GroupOperator::Or, children))
    }

    /// Group levels from this node down to its deepest leaf.
    pub fn depth(&self) -> usize {
        match self {
            FilterNode::Rule(_) => 0,
            FilterNode::Group(group) => {
                1 + group.children.iter().map(FilterNode::depth).max().unwrap_or(0)
            }
        }
    }

    pub fn at(&self, path: &Path) -> Option<&FilterNode> {
        let Some((&first, rest)) = path.split_first() else {
            return Some(self);
        };
        match self {
            FilterNode::Group(group) => group.children.get(first)?.at(rest),
            FilterNode::Rule(_) => None,
        }
    }
}

impl From<FilterRule> for FilterNode {
    fn from(rule: FilterRule) -> Self {
        FilterNode::Rule(rule)
    }
}

impl From<FilterGroup> for FilterNode {
    fn from(group: FilterGroup) -> Self {
        FilterNode::Group(group)
    }
}
