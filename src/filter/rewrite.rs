//! Rewrites a negation-free filter tree into the query API's grammar while
//! keeping it within the API's nesting ceiling.
//!
//! Depth is counted in group levels with the root group at level 0. Groups
//! above the boundary level (`max_depth - 1`) are converted structurally,
//! with same-operator children spliced into their parent. A group at the
//! boundary must end up as plain leaves or as groups of leaves. When its
//! members mix leaves with groups, or nest deeper, it is expanded by the
//! distributive law into that two-level normal form.

use chrono::NaiveDate;
use log::debug;

use super::model::{
    DateRange, FilterGroup, FilterNode, FilterRule, FilterValue, GroupOperator, Operator,
    PropertyCategory,
};
use super::wire::{wire_depth, Payload, WireFilter, WireLeaf};
use crate::config::Limits;
use crate::error::FilterError;

pub struct Rewriter {
    max_depth: usize,
    max_clauses: usize,
}

impl Rewriter {
    pub fn new(max_depth: usize, max_clauses: usize) -> Self {
        Self {
            max_depth,
            max_clauses,
        }
    }

    pub fn from_limits(limits: &Limits) -> Self {
        Self::new(limits.wire_depth, limits.max_clauses)
    }

    pub fn convert(&self, root: Option<&FilterNode>) -> Result<Option<WireFilter>, FilterError> {
        if self.max_depth == 0 {
            return Err(FilterError::invalid("wire depth must be at least 1"));
        }
        let Some(node) = root else {
            return Ok(None);
        };

        let mut path = Vec::new();
        let filter = self.convert_node(node, 0, &mut path)?;

        let depth = wire_depth(&filter);
        if depth > self.max_depth {
            return Err(FilterError::invalid(format!(
                "rewritten filter nests {depth} levels, ceiling is {}",
                self.max_depth
            )));
        }
        debug!(
            "rewrote filter of depth {} into {} leaves at wire depth {depth}",
            node.depth(),
            filter.leaf_count()
        );
        Ok(Some(filter))
    }

    fn convert_node(
        &self,
        node: &FilterNode,
        level: usize,
        path: &mut Vec<usize>,
    ) -> Result<WireFilter, FilterError> {
        match node {
            FilterNode::Rule(rule) => convert_rule(rule, path),
            FilterNode::Group(group) => self.convert_group(group, level, path),
        }
    }

    fn convert_group(
        &self,
        group: &FilterGroup,
        level: usize,
        path: &mut Vec<usize>,
    ) -> Result<WireFilter, FilterError> {
        if group.negated {
            return Err(FilterError::invalid(format!(
                "negated group at {path:?} must be normalized before rewriting"
            )));
        }
        if group.children.is_empty() {
            return Err(FilterError::invalid(format!("empty group at {path:?}")));
        }

        let mut members = Vec::with_capacity(group.children.len());
        for (index, child) in group.children.iter().enumerate() {
            path.push(index);
            let converted = self.convert_node(child, level + 1, path)?;
            path.pop();
            splice(group.operator, converted, &mut members);
        }

        if level + 1 == self.max_depth && !is_two_level(&members) {
            return self.distribute(group.operator, members);
        }
        Ok(assemble(group.operator, members))
    }

    /// Expands `operator(members)` into clauses of leaves joined by the
    /// opposite operator, e.g. `a ∧ (b ∨ c)` into `(a ∧ b) ∨ (a ∧ c)`.
    /// Every sibling group of the opposite operator takes part in one
    /// cartesian product, so three or more of them expand together.
    fn distribute(
        &self,
        operator: GroupOperator,
        members: Vec<WireFilter>,
    ) -> Result<WireFilter, FilterError> {
        let clauses = self.clauses(&assemble(operator, members), operator)?;

        let produced: usize = clauses.iter().map(Vec::len).sum();
        if produced > self.max_clauses {
            return Err(FilterError::RewriteTooLarge {
                produced,
                limit: self.max_clauses,
            });
        }
        if clauses.len() > 1 {
            debug!("distributed {operator:?} group into {} clauses", clauses.len());
        }

        let mut clauses: Vec<WireFilter> = clauses
            .into_iter()
            .map(|clause| assemble(operator, clause.into_iter().map(WireFilter::Leaf).collect()))
            .collect();
        if clauses.len() == 1 {
            return Ok(clauses.remove(0));
        }
        Ok(assemble(operator.flip(), clauses))
    }

    /// Normal form of `filter` as a list of clauses. Leaves inside a clause
    /// are joined by `inner`, clauses by its opposite.
    fn clauses(
        &self,
        filter: &WireFilter,
        inner: GroupOperator,
    ) -> Result<Vec<Vec<WireLeaf>>, FilterError> {
        let (operator, members) = match filter {
            WireFilter::Leaf(leaf) => return Ok(vec![vec![leaf.clone()]]),
            WireFilter::And(members) => (GroupOperator::And, members),
            WireFilter::Or(members) => (GroupOperator::Or, members),
        };

        if operator != inner {
            let mut out = Vec::new();
            for member in members {
                out.extend(self.clauses(member, inner)?);
            }
            return Ok(out);
        }

        let mut product: Vec<Vec<WireLeaf>> = vec![Vec::new()];
        for member in members {
            let choices = self.clauses(member, inner)?;
            let prefix_leaves: usize = product.iter().map(Vec::len).sum();
            let choice_leaves: usize = choices.iter().map(Vec::len).sum();
            // Each prefix is repeated once per choice and each choice once per prefix.
            let leaves = prefix_leaves
                .saturating_mul(choices.len())
                .saturating_add(product.len().saturating_mul(choice_leaves));
            if leaves > self.max_clauses {
                return Err(FilterError::RewriteTooLarge {
                    produced: leaves,
                    limit: self.max_clauses,
                });
            }
            let mut next = Vec::with_capacity(product.len() * choices.len());
            for prefix in &product {
                for choice in &choices {
                    let mut clause = prefix.clone();
                    clause.extend(choice.iter().cloned());
                    next.push(clause);
                }
            }
            product = next;
        }
        Ok(product)
    }
}

/// Appends `member` to a group of `operator`, splicing in the members of a
/// group with the same operator.
fn splice(operator: GroupOperator, member: WireFilter, members: &mut Vec<WireFilter>) {
    match (operator, member) {
        (GroupOperator::And, WireFilter::And(inner))
        | (GroupOperator::Or, WireFilter::Or(inner)) => members.extend(inner),
        (_, member) => members.push(member),
    }
}

/// True when `members` are all leaves, or all groups holding only leaves.
fn is_two_level(members: &[WireFilter]) -> bool {
    let is_leaf = |member: &WireFilter| matches!(member, WireFilter::Leaf(_));
    members.iter().all(is_leaf)
        || members.iter().all(|member| match member {
            WireFilter::And(inner) | WireFilter::Or(inner) => inner.iter().all(is_leaf),
            WireFilter::Leaf(_) => false,
        })
}

fn assemble(operator: GroupOperator, mut members: Vec<WireFilter>) -> WireFilter {
    if members.len() == 1 {
        return members.remove(0);
    }
    match operator {
        GroupOperator::And => WireFilter::And(members),
        GroupOperator::Or => WireFilter::Or(members),
    }
}

/// Converts one rule. A date range with an end under `equals` becomes a
/// pair of bounds joined by AND.
pub fn convert_rule(rule: &FilterRule, path: &[usize]) -> Result<WireFilter, FilterError> {
    let complete = rule.as_complete().ok_or_else(|| FilterError::IncompleteRule {
        path: path.to_vec(),
    })?;
    let (property, category, operator) = (complete.property, complete.category, complete.operator);

    if !category.supports(operator) {
        return Err(FilterError::invalid(format!(
            "operator {operator} is not available for {category:?} property {property:?}"
        )));
    }

    let leaf = |operator: Operator, payload: Payload| {
        WireFilter::Leaf(WireLeaf {
            property: property.to_string(),
            category,
            operator,
            payload,
        })
    };

    if operator.is_relative_window() {
        return Ok(leaf(operator, Payload::Empty));
    }
    if operator.is_emptiness() {
        return Ok(leaf(operator, Payload::Flag));
    }

    let mismatch = |expected: &str| {
        FilterError::invalid(format!(
            "{operator} on {property:?} expects a {expected} value, got {:?}",
            complete.value
        ))
    };

    let payload = match (category, complete.value) {
        (_, FilterValue::Null) => {
            return Err(FilterError::invalid(format!(
                "missing value for {operator} on {property:?}"
            )))
        }
        (PropertyCategory::Checkbox, FilterValue::Bool(b)) => Payload::Bool(*b),
        (PropertyCategory::Checkbox, _) => return Err(mismatch("boolean")),
        (PropertyCategory::Number, FilterValue::Number(n)) => Payload::Number(*n),
        (PropertyCategory::Number, _) => return Err(mismatch("number")),
        (PropertyCategory::Date, value) => {
            let range = date_range(value).ok_or_else(|| mismatch("date"))?;
            return Ok(match (operator, range.end) {
                (Operator::Equals, Some(end)) => WireFilter::And(vec![
                    leaf(Operator::OnOrAfter, Payload::Date(range.start)),
                    leaf(Operator::OnOrBefore, Payload::Date(end)),
                ]),
                (Operator::After | Operator::OnOrBefore, Some(end)) => {
                    leaf(operator, Payload::Date(end))
                }
                _ => leaf(operator, Payload::Date(range.start)),
            });
        }
        (_, FilterValue::String(s)) => Payload::Text(s.clone()),
        (_, _) => return Err(mismatch("text")),
    };
    Ok(leaf(operator, payload))
}

fn date_range(value: &FilterValue) -> Option<DateRange> {
    match value {
        FilterValue::DateRange(range) => Some(range.clone()),
        FilterValue::String(s) => {
            let start = NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()?;
            Some(DateRange { start, end: None })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::eval::{matches_node, matches_wire, EvalContext};
    use proptest::prelude::*;
    use serde_json::json;
    use serde_yaml::{Mapping, Value as YamlValue};

    fn flag(property: &str) -> FilterNode {
        FilterNode::Rule(FilterRule::new(
            property,
            PropertyCategory::Checkbox,
            Operator::Equals,
            FilterValue::Bool(true),
        ))
    }

    fn flag_leaf(property: &str) -> WireFilter {
        let rule = FilterRule::new(
            property,
            PropertyCategory::Checkbox,
            Operator::Equals,
            FilterValue::Bool(true),
        );
        convert_rule(&rule, &[]).unwrap()
    }

    #[test]
    fn test_distribution_example() {
        let tree = FilterNode::and(vec![flag("a"), FilterNode::or(vec![flag("b"), flag("c")])]);
        let converted = Rewriter::new(1, 64).convert(Some(&tree)).unwrap();
        assert_eq!(
            converted,
            Some(WireFilter::Or(vec![
                WireFilter::And(vec![flag_leaf("a"), flag_leaf("b")]),
                WireFilter::And(vec![flag_leaf("a"), flag_leaf("c")]),
            ]))
        );
    }

    #[test]
    fn test_or_over_and_distributes_to_and() {
        let tree = FilterNode::or(vec![flag("a"), FilterNode::and(vec![flag("b"), flag("c")])]);
        let converted = Rewriter::new(1, 64).convert(Some(&tree)).unwrap();
        assert_eq!(
            converted,
            Some(WireFilter::And(vec![
                WireFilter::Or(vec![flag_leaf("a"), flag_leaf("b")]),
                WireFilter::Or(vec![flag_leaf("a"), flag_leaf("c")]),
            ]))
        );
    }

    #[test]
    fn test_shallow_tree_is_kept() {
        let tree = FilterNode::and(vec![flag("a"), FilterNode::or(vec![flag("b"), flag("c")])]);
        let converted = Rewriter::new(2, 64).convert(Some(&tree)).unwrap();
        assert_eq!(
            converted,
            Some(WireFilter::And(vec![
                flag_leaf("a"),
                WireFilter::Or(vec![flag_leaf("b"), flag_leaf("c")]),
            ]))
        );
    }

    #[test]
    fn test_or_of_ands_at_boundary_is_kept() {
        let pairs: Vec<FilterNode> = (0..9)
            .map(|i| FilterNode::and(vec![flag(&format!("x{i}")), flag(&format!("y{i}"))]))
            .collect();
        let tree = FilterNode::and(vec![flag("a"), FilterNode::or(pairs)]);
        let converted = Rewriter::new(2, 256).convert(Some(&tree)).unwrap();

        let expected_pairs = (0..9)
            .map(|i| {
                let (x, y) = (format!("x{i}"), format!("y{i}"));
                WireFilter::And(vec![flag_leaf(&x), flag_leaf(&y)])
            })
            .collect();
        assert_eq!(
            converted,
            Some(WireFilter::And(vec![flag_leaf("a"), WireFilter::Or(expected_pairs)]))
        );
    }

    #[test]
    fn test_mixed_boundary_group_distributes() {
        let tree = FilterNode::and(vec![
            flag("a"),
            FilterNode::or(vec![FilterNode::and(vec![flag("b"), flag("c")]), flag("d")]),
        ]);
        let converted = Rewriter::new(2, 64).convert(Some(&tree)).unwrap();
        assert_eq!(
            converted,
            Some(WireFilter::And(vec![
                flag_leaf("a"),
                WireFilter::Or(vec![flag_leaf("b"), flag_leaf("d")]),
                WireFilter::Or(vec![flag_leaf("c"), flag_leaf("d")]),
            ]))
        );
    }

    #[test]
    fn test_same_operator_groups_are_spliced() {
        let tree = FilterNode::or(vec![
            FilterNode::or(vec![flag("a"), FilterNode::or(vec![flag("b"), flag("c")])]),
            flag("d"),
        ]);
        let converted = Rewriter::new(2, 64).convert(Some(&tree)).unwrap();
        assert_eq!(
            converted,
            Some(WireFilter::Or(["a", "b", "c", "d"].map(flag_leaf).to_vec()))
        );
    }

    #[test]
    fn test_multiple_or_groups_cross_multiply() {
        let tree = FilterNode::and(vec![
            flag("z"),
            FilterNode::or(vec![flag("a"), flag("b")]),
            FilterNode::or(vec![flag("c"), flag("d")]),
            FilterNode::or(vec![flag("e"), flag("f")]),
        ]);
        let converted = Rewriter::new(1, 64).convert(Some(&tree)).unwrap().unwrap();
        let WireFilter::Or(clauses) = &converted else {
            panic!("Expected OR of clauses");
        };
        assert_eq!(clauses.len(), 8);
        assert!(clauses.iter().all(|c| matches!(c, WireFilter::And(m) if m.len() == 4)));
        assert_eq!(clauses[0], WireFilter::And(["z", "a", "c", "e"].map(flag_leaf).to_vec()));
    }

    #[test]
    fn test_deep_tree_fits_ceiling() {
        let deep = FilterNode::and(vec![
            flag("a"),
            FilterNode::or(vec![
                flag("b"),
                FilterNode::and(vec![flag("c"), FilterNode::or(vec![flag("d"), flag("e")])]),
            ]),
        ]);
        let converted = Rewriter::new(2, 64).convert(Some(&deep)).unwrap().unwrap();
        assert!(wire_depth(&converted) <= 2);
    }

    #[test]
    fn test_expansion_cap() {
        let mut children = vec![flag("a")];
        children.extend(
            (0..6).map(|i| FilterNode::or(vec![flag(&format!("x{i}")), flag(&format!("y{i}"))])),
        );
        let tree = FilterNode::and(children);
        let err = Rewriter::new(1, 32).convert(Some(&tree)).unwrap_err();
        assert!(matches!(err, FilterError::RewriteTooLarge { limit: 32, .. }));
    }

    #[test]
    fn test_expansion_cap_counts_leaves() {
        let tree = FilterNode::and(vec![
            flag("a"),
            FilterNode::or(vec![flag("b"), flag("c")]),
            FilterNode::or(vec![flag("d"), flag("e")]),
        ]);
        assert_eq!(
            Rewriter::new(1, 11).convert(Some(&tree)),
            Err(FilterError::RewriteTooLarge {
                produced: 12,
                limit: 11
            })
        );
        let converted = Rewriter::new(1, 12).convert(Some(&tree)).unwrap().unwrap();
        assert_eq!(converted.leaf_count(), 12);
    }

    #[test]
    fn test_incomplete_rule_fails() {
        let tree = FilterNode::and(vec![flag("a"), FilterNode::Rule(FilterRule::incomplete())]);
        assert_eq!(
            Rewriter::new(2, 64).convert(Some(&tree)),
            Err(FilterError::IncompleteRule { path: vec![1] })
        );
    }

    #[test]
    fn test_negated_group_is_rejected() {
        let tree = FilterNode::Group(FilterGroup {
            operator: GroupOperator::And,
            negated: true,
            children: vec![flag("a"), flag("b")],
        });
        assert!(matches!(
            Rewriter::new(2, 64).convert(Some(&tree)),
            Err(FilterError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn test_single_leaf_and_empty_root() {
        assert_eq!(Rewriter::new(2, 64).convert(None), Ok(None));
        assert_eq!(
            Rewriter::new(2, 64).convert(Some(&flag("a"))),
            Ok(Some(flag_leaf("a")))
        );
        let single = FilterNode::or(vec![flag("a")]);
        assert_eq!(
            Rewriter::new(1, 64).convert(Some(&single)),
            Ok(Some(flag_leaf("a")))
        );
    }

    #[test]
    fn test_rule_payloads() {
        let due = FilterRule::new(
            "Due",
            PropertyCategory::Date,
            Operator::Equals,
            FilterValue::DateRange(DateRange {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 1, 31),
            }),
        );
        assert_eq!(
            convert_rule(&due, &[]).unwrap().to_json(),
            json!({ "and": [
                { "property": "Due", "date": { "on_or_after": "2024-01-01" } },
                { "property": "Due", "date": { "on_or_before": "2024-01-31" } }
            ] })
        );

        let window =
            FilterRule::new("Due", PropertyCategory::Date, Operator::NextMonth, FilterValue::Null);
        assert_eq!(
            convert_rule(&window, &[]).unwrap().to_json(),
            json!({ "property": "Due", "date": { "next_month": {} } })
        );

        let tags = FilterRule::new(
            "Tags",
            PropertyCategory::MultiSelect,
            Operator::Contains,
            FilterValue::String("urgent".into()),
        );
        assert_eq!(
            convert_rule(&tags, &[]).unwrap().to_json(),
            json!({ "property": "Tags", "multi_select": { "contains": "urgent" } })
        );

        let price =
            |value| FilterRule::new("Price", PropertyCategory::Number, Operator::Equals, value);
        let wrong = price(FilterValue::String("x".into()));
        assert!(matches!(convert_rule(&wrong, &[]), Err(FilterError::InvalidStructure { .. })));

        let missing = price(FilterValue::Null);
        assert!(matches!(convert_rule(&missing, &[]), Err(FilterError::InvalidStructure { .. })));
    }

    fn arb_tree() -> impl Strategy<Value = FilterNode> {
        let leaf = (0usize..4).prop_map(|i| flag(&format!("p{i}")));
        leaf.prop_recursive(5, 16, 3, |inner| {
            (any::<bool>(), prop::collection::vec(inner, 1..4)).prop_map(|(is_and, children)| {
                if is_and {
                    FilterNode::and(children)
                } else {
                    FilterNode::or(children)
                }
            })
        })
    }

    proptest! {
        #[test]
        fn prop_rewrite_is_bounded_and_equivalent(tree in arb_tree(), max_depth in 1usize..4) {
            let rewriter = Rewriter::new(max_depth, 1 << 20);
            let converted = rewriter.convert(Some(&tree)).unwrap().unwrap();
            prop_assert!(wire_depth(&converted) <= max_depth);

            let ctx = EvalContext::new(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
            for assignment in 0..16u32 {
                let mut row = Mapping::new();
                for p in 0..4u32 {
                    row.insert(
                        YamlValue::from(format!("p{p}")),
                        YamlValue::Bool(assignment & (1 << p) != 0),
                    );
                }
                let row = YamlValue::Mapping(row);
                prop_assert_eq!(
                    matches_node(&tree, &row, &ctx),
                    matches_wire(&converted, &row, &ctx)
                );
            }
        }
    }
}
