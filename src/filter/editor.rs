//! Path-addressed edits on a filter tree.
//!
//! Every operation takes the current root and returns a new one. Paths that
//! do not resolve to a suitable node leave the tree unchanged; the only way
//! to clear a tree besides removing the root is [`reset`].

use serde::Deserialize;

use super::model::{
    CompoundFilter, FilterGroup, FilterNode, FilterRule, FilterValue, GroupOperator, Operator,
    Path, PropertyCategory,
};

/// Fields merged into an existing rule by [`update_rule`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RulePatch {
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub property_type: Option<PropertyCategory>,
    #[serde(default)]
    pub operator: Option<Operator>,
    #[serde(default)]
    pub value: Option<FilterValue>,
}

/// One edit issued by an editing front end.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditCommand {
    AddRule { rule: FilterRule },
    RemoveNode { path: Vec<usize> },
    UpdateRule { path: Vec<usize>, patch: RulePatch },
    ToggleGroupOperator { path: Vec<usize> },
    AddGroup { operator: GroupOperator },
    AddGroupAtPath { path: Vec<usize>, operator: GroupOperator },
    AddNodeToGroup { path: Vec<usize>, node: FilterNode },
    DuplicateNode { path: Vec<usize> },
    ToggleGroupNegation { path: Vec<usize> },
    Reset,
}

pub fn apply_edit(
    root: Option<&FilterNode>,
    command: &EditCommand,
    max_depth: usize,
) -> CompoundFilter {
    match command {
        EditCommand::AddRule { rule } => add_rule(root, rule.clone()),
        EditCommand::RemoveNode { path } => remove_node(root, path),
        EditCommand::UpdateRule { path, patch } => update_rule(root, path, patch),
        EditCommand::ToggleGroupOperator { path } => toggle_group_operator(root, path),
        EditCommand::AddGroup { operator } => add_group(root, *operator),
        EditCommand::AddGroupAtPath { path, operator } => {
            add_group_at_path(root, path, *operator, max_depth)
        }
        EditCommand::AddNodeToGroup { path, node } => add_node_to_group(root, path, node.clone()),
        EditCommand::DuplicateNode { path } => duplicate_node(root, path),
        EditCommand::ToggleGroupNegation { path } => toggle_group_negation(root, path),
        EditCommand::Reset => reset(),
    }
}

pub fn reset() -> CompoundFilter {
    None
}

pub fn add_rule(root: Option<&FilterNode>, rule: FilterRule) -> CompoundFilter {
    Some(append_to_root(root, FilterNode::Rule(rule)))
}

pub fn add_group(root: Option<&FilterNode>, operator: GroupOperator) -> CompoundFilter {
    Some(append_to_root(root, seeded_group(operator)))
}

pub fn add_group_at_path(
    root: Option<&FilterNode>,
    path: &Path,
    operator: GroupOperator,
    max_depth: usize,
) -> CompoundFilter {
    match root {
        // The rule gets wrapped together with the new group, two levels deep.
        Some(FilterNode::Rule(_)) if path.is_empty() => {
            if max_depth < 2 {
                return root.cloned();
            }
            add_group(root, operator)
        }
        _ if !can_add_group_at_path(root, path, max_depth) => root.cloned(),
        None => Some(seeded_group(operator)),
        Some(_) => add_node_to_group(root, path, seeded_group(operator)),
    }
}

pub fn add_node_to_group(
    root: Option<&FilterNode>,
    path: &Path,
    node: FilterNode,
) -> CompoundFilter {
    edit_at(root, path, |target| match target {
        FilterNode::Group(group) => {
            let mut children = group.children.clone();
            children.push(node);
            Some(with_children(group, children))
        }
        FilterNode::Rule(_) => None,
    })
}

pub fn update_rule(root: Option<&FilterNode>, path: &Path, patch: &RulePatch) -> CompoundFilter {
    edit_at(root, path, |target| match target {
        FilterNode::Rule(rule) => {
            let mut rule = rule.clone();
            if let Some(property) = &patch.property {
                rule.property = Some(property.clone());
            }
            if let Some(category) = patch.property_type {
                rule.property_type = Some(category);
            }
            if let Some(operator) = patch.operator {
                rule.operator = Some(operator);
            }
            if let Some(value) = &patch.value {
                rule.value = value.clone();
            }
            Some(FilterNode::Rule(rule))
        }
        FilterNode::Group(_) => None,
    })
}

pub fn toggle_group_operator(root: Option<&FilterNode>, path: &Path) -> CompoundFilter {
    edit_at(root, path, |target| match target {
        FilterNode::Group(group) => Some(FilterNode::Group(FilterGroup {
            operator: group.operator.flip(),
            ..group.clone()
        })),
        FilterNode::Rule(_) => None,
    })
}

pub fn toggle_group_negation(root: Option<&FilterNode>, path: &Path) -> CompoundFilter {
    edit_at(root, path, |target| match target {
        FilterNode::Group(group) => Some(FilterNode::Group(FilterGroup {
            negated: !group.negated,
            ..group.clone()
        })),
        FilterNode::Rule(_) => None,
    })
}

pub fn duplicate_node(root: Option<&FilterNode>, path: &Path) -> CompoundFilter {
    let node = root?;
    let Some((&index, parent)) = path.split_last() else {
        return Some(FilterNode::and(vec![node.clone(), node.clone()]));
    };
    edit_at(root, parent, |target| match target {
        FilterNode::Group(group) => {
            let copy = group.children.get(index)?.clone();
            let mut children = group.children.clone();
            children.insert(index + 1, copy);
            Some(with_children(group, children))
        }
        FilterNode::Rule(_) => None,
    })
}

pub fn remove_node(root: Option<&FilterNode>, path: &Path) -> CompoundFilter {
    let node = root?;
    match remove_at(node, path) {
        Removal::Unchanged => Some(node.clone()),
        Removal::Removed => None,
        Removal::Replaced(node) => Some(node),
    }
}

pub fn nesting_depth(root: Option<&FilterNode>) -> usize {
    root.map_or(0, FilterNode::depth)
}

/// Number of groups on the way from the root to the node at `path`,
/// counting the target itself when it is a group. `None` when the path
/// does not resolve.
pub fn depth_at_path(root: Option<&FilterNode>, path: &Path) -> Option<usize> {
    let Some(mut node) = root else {
        return path.is_empty().then_some(0);
    };
    let mut depth = 0;
    for &index in path {
        let FilterNode::Group(group) = node else {
            return None;
        };
        depth += 1;
        node = group.children.get(index)?;
    }
    if matches!(node, FilterNode::Group(_)) {
        depth += 1;
    }
    Some(depth)
}

pub fn can_add_group_at_path(root: Option<&FilterNode>, path: &Path, max_depth: usize) -> bool {
    depth_at_path(root, path).is_some_and(|depth| depth + 1 <= max_depth)
}

fn seeded_group(operator: GroupOperator) -> FilterNode {
    FilterNode::Group(FilterGroup::new(
        operator,
        vec![FilterNode::Rule(FilterRule::incomplete())],
    ))
}

fn append_to_root(root: Option<&FilterNode>, node: FilterNode) -> FilterNode {
    match root {
        None => node,
        Some(rule @ FilterNode::Rule(_)) => FilterNode::and(vec![rule.clone(), node]),
        Some(FilterNode::Group(group)) => {
            let mut children = group.children.clone();
            children.push(node);
            with_children(group, children)
        }
    }
}

fn with_children(group: &FilterGroup, children: Vec<FilterNode>) -> FilterNode {
    FilterNode::Group(FilterGroup {
        operator: group.operator,
        negated: group.negated,
        children,
    })
}

fn edit_at<F>(root: Option<&FilterNode>, path: &Path, edit: F) -> CompoundFilter
where
    F: FnOnce(&FilterNode) -> Option<FilterNode>,
{
    let node = root?;
    Some(replace_at(node, path, edit).unwrap_or_else(|| node.clone()))
}

/// Rebuilds the ancestor chain of `path` around the edited target. `None`
/// when the path does not resolve or the edit declines the target.
fn replace_at<F>(node: &FilterNode, path: &Path, edit: F) -> Option<FilterNode>
where
    F: FnOnce(&FilterNode) -> Option<FilterNode>,
{
    let Some((&index, rest)) = path.split_first() else {
        return edit(node);
    };
    let FilterNode::Group(group) = node else {
        return None;
    };
    let replaced = replace_at(group.children.get(index)?, rest, edit)?;
    let mut children = group.children.clone();
    children[index] = replaced;
    Some(with_children(group, children))
}

enum Removal {
    Unchanged,
    Removed,
    Replaced(FilterNode),
}

fn remove_at(node: &FilterNode, path: &Path) -> Removal {
    let Some((&index, rest)) = path.split_first() else {
        return Removal::Removed;
    };
    let FilterNode::Group(group) = node else {
        return Removal::Unchanged;
    };
    let Some(child) = group.children.get(index) else {
        return Removal::Unchanged;
    };

    let mut children = group.children.clone();
    match remove_at(child, rest) {
        Removal::Unchanged => return Removal::Unchanged,
        Removal::Replaced(child) => {
            children[index] = child;
            return Removal::Replaced(with_children(group, children));
        }
        Removal::Removed => {
            children.remove(index);
        }
    }

    match children.len() {
        0 => Removal::Removed,
        1 => Removal::Replaced(collapse(group, children.remove(0))),
        _ => Removal::Replaced(with_children(group, children)),
    }
}

/// Replaces a group left with one child by that child, carrying a negation
/// over onto a child group. A negated group around a single rule stays.
fn collapse(group: &FilterGroup, child: FilterNode) -> FilterNode {
    if !group.negated {
        return child;
    }
    match child {
        FilterNode::Group(mut inner) => {
            inner.negated = !inner.negated;
            if !inner.negated && inner.children.len() == 1 {
                return inner.children.remove(0);
            }
            FilterNode::Group(inner)
        }
        rule @ FilterNode::Rule(_) => with_children(group, vec![rule]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rule(property: &str, value: &str) -> FilterRule {
        FilterRule::new(
            property,
            PropertyCategory::Status,
            Operator::Equals,
            FilterValue::String(value.to_string()),
        )
    }

    fn group_sizes(node: &FilterNode, out: &mut Vec<usize>) {
        if let FilterNode::Group(group) = node {
            out.push(group.children.len());
            for child in &group.children {
                group_sizes(child, out);
            }
        }
    }

    #[test]
    fn test_incremental_build() {
        let status = rule("Status", "InProgress");
        let assignee = rule("Assignee", "John");

        let root = add_rule(None, status.clone());
        assert_eq!(root, Some(FilterNode::Rule(status.clone())));

        let root = add_rule(root.as_ref(), assignee.clone());
        assert_eq!(
            root,
            Some(FilterNode::and(vec![
                FilterNode::Rule(status),
                FilterNode::Rule(assignee.clone())
            ]))
        );

        let root = remove_node(root.as_ref(), &[0]);
        assert_eq!(root, Some(FilterNode::Rule(assignee)));

        let root = remove_node(root.as_ref(), &[]);
        assert_eq!(root, None);
    }

    #[test]
    fn test_add_then_remove_round_trip() {
        let r1 = rule("A", "1");
        let r2 = rule("B", "2");
        let root = add_rule(add_rule(None, r1.clone()).as_ref(), r2);
        assert_eq!(remove_node(root.as_ref(), &[1]), Some(FilterNode::Rule(r1)));
    }

    #[test]
    fn test_add_rule_appends_to_group() {
        let root = Some(FilterNode::or(vec![rule("A", "1").into(), rule("B", "2").into()]));
        let root = add_rule(root.as_ref(), rule("C", "3"));
        let Some(FilterNode::Group(group)) = root else {
            panic!("Expected group");
        };
        assert_eq!(group.operator, GroupOperator::Or);
        assert_eq!(group.children.len(), 3);
    }

    #[test]
    fn test_remove_out_of_range_is_noop() {
        let root = add_rule(add_rule(None, rule("A", "1")).as_ref(), rule("B", "2"));
        assert_eq!(remove_node(root.as_ref(), &[7]), root);
        assert_eq!(remove_node(root.as_ref(), &[0, 1]), root);
    }

    #[test]
    fn test_remove_propagates_emptiness() {
        let inner = FilterNode::Group(FilterGroup::new(
            GroupOperator::Or,
            vec![rule("B", "2").into()],
        ));
        let root = Some(FilterNode::and(vec![rule("A", "1").into(), inner]));
        let root = remove_node(root.as_ref(), &[1, 0]);
        assert_eq!(root, Some(FilterNode::Rule(rule("A", "1"))));
    }

    #[test]
    fn test_remove_keeps_negation_on_collapse() {
        let inner = FilterNode::or(vec![rule("B", "2").into(), rule("C", "3").into()]);
        let root = Some(FilterNode::Group(FilterGroup {
            operator: GroupOperator::And,
            negated: true,
            children: vec![rule("A", "1").into(), inner],
        }));

        let Some(FilterNode::Group(kept)) = remove_node(root.as_ref(), &[0]) else {
            panic!("Expected group");
        };
        assert_eq!(kept.operator, GroupOperator::Or);
        assert!(kept.negated);

        let Some(FilterNode::Group(wrapper)) = remove_node(root.as_ref(), &[1]) else {
            panic!("Expected group");
        };
        assert!(wrapper.negated);
        assert_eq!(wrapper.children, vec![FilterNode::Rule(rule("A", "1"))]);
    }

    #[test]
    fn test_update_rule_merges_fields() {
        let root = add_group(None, GroupOperator::And);
        let patch = RulePatch {
            property: Some("Price".to_string()),
            property_type: Some(PropertyCategory::Number),
            ..Default::default()
        };
        let root = update_rule(root.as_ref(), &[0], &patch);
        let updated = root.as_ref().and_then(|r| r.at(&[0])).cloned();
        let Some(FilterNode::Rule(updated)) = updated else {
            panic!("Expected rule");
        };
        assert_eq!(updated.property.as_deref(), Some("Price"));
        assert_eq!(updated.property_type, Some(PropertyCategory::Number));
        assert_eq!(updated.operator, None);

        assert_eq!(update_rule(root.as_ref(), &[], &patch), root);
    }

    #[test]
    fn test_toggle_operator_and_negation() {
        let root = add_rule(add_rule(None, rule("A", "1")).as_ref(), rule("B", "2"));
        let toggled = toggle_group_operator(root.as_ref(), &[]);
        assert!(matches!(
            toggled,
            Some(FilterNode::Group(FilterGroup { operator: GroupOperator::Or, .. }))
        ));
        assert_eq!(toggle_group_operator(root.as_ref(), &[0]), root);

        let negated = toggle_group_negation(root.as_ref(), &[]);
        assert!(matches!(negated, Some(FilterNode::Group(FilterGroup { negated: true, .. }))));
        assert_eq!(toggle_group_negation(root.as_ref(), &[1]), root);
    }

    #[test]
    fn test_duplicate_node() {
        let single = add_rule(None, rule("A", "1"));
        let doubled = duplicate_node(single.as_ref(), &[]);
        assert_eq!(
            doubled,
            Some(FilterNode::and(vec![rule("A", "1").into(), rule("A", "1").into()]))
        );

        let root = add_rule(single.as_ref(), rule("B", "2"));
        let root = duplicate_node(root.as_ref(), &[0]);
        let Some(FilterNode::Group(group)) = &root else {
            panic!("Expected group");
        };
        assert_eq!(group.children.len(), 3);
        assert_eq!(group.children[1], FilterNode::Rule(rule("A", "1")));
        assert_eq!(duplicate_node(root.as_ref(), &[9]), root);
    }

    #[test]
    fn test_add_node_to_group() {
        let root = add_group(None, GroupOperator::Or);
        let root = add_node_to_group(root.as_ref(), &[], rule("A", "1").into());
        assert_eq!(nesting_depth(root.as_ref()), 1);
        assert_eq!(add_node_to_group(root.as_ref(), &[1], rule("B", "2").into()), root);
    }

    #[test]
    fn test_depth_guard() {
        let root = add_rule(add_rule(None, rule("A", "1")).as_ref(), rule("B", "2"));
        let root = add_group_at_path(root.as_ref(), &[], GroupOperator::Or, 2);
        assert_eq!(nesting_depth(root.as_ref()), 2);

        let rejected = add_group_at_path(root.as_ref(), &[2], GroupOperator::And, 2);
        assert_eq!(rejected, root);
        assert_eq!(nesting_depth(rejected.as_ref()), 2);

        let sibling = add_group_at_path(root.as_ref(), &[], GroupOperator::And, 2);
        assert_eq!(nesting_depth(sibling.as_ref()), 2);
        assert_ne!(sibling, root);
    }

    #[test]
    fn test_can_add_group_on_empty_root() {
        assert!(can_add_group_at_path(None, &[], 1));
        assert!(!can_add_group_at_path(None, &[0], 3));
        assert!(!can_add_group_at_path(None, &[], 0));
        let root = add_group_at_path(None, &[], GroupOperator::And, 2);
        assert_eq!(nesting_depth(root.as_ref()), 1);
    }

    #[test]
    fn test_nesting_depth() {
        assert_eq!(nesting_depth(None), 0);
        assert_eq!(nesting_depth(Some(&rule("A", "1").into())), 0);
        let root = add_group(add_rule(None, rule("A", "1")).as_ref(), GroupOperator::Or);
        assert_eq!(nesting_depth(root.as_ref()), 2);
    }

    #[test]
    fn test_edit_command_from_yaml() {
        let yaml = r#"
- op: add_rule
  rule: { property: Status, property_type: status, operator: equals, value: Done }
- op: add_group_at_path
  path: []
  operator: or
- op: update_rule
  path: [1, 0]
  patch: { property: Price, property_type: number, operator: less_than, value: 5 }
- op: toggle_group_negation
  path: [1]
"#;
        let commands: Vec<EditCommand> = serde_yaml::from_str(yaml).unwrap();
        let root = commands
            .iter()
            .fold(None, |root, cmd| apply_edit(root.as_ref(), cmd, 3));
        assert_eq!(nesting_depth(root.as_ref()), 2);
        assert!(matches!(
            root.as_ref().and_then(|r| r.at(&[1])),
            Some(FilterNode::Group(FilterGroup { negated: true, .. }))
        ));
    }

    fn arb_command() -> impl Strategy<Value = EditCommand> {
        let path = prop::collection::vec(0usize..4, 0..3);
        prop_oneof![
            (0usize..5).prop_map(|i| EditCommand::AddRule {
                rule: rule(&format!("P{i}"), "x")
            }),
            path.clone().prop_map(|path| EditCommand::RemoveNode { path }),
            path.clone().prop_map(|path| EditCommand::DuplicateNode { path }),
            path.clone().prop_map(|path| EditCommand::ToggleGroupOperator { path }),
            path.prop_map(|path| EditCommand::AddNodeToGroup {
                path,
                node: rule("Q", "y").into()
            }),
        ]
    }

    proptest! {
        #[test]
        fn prop_groups_never_empty_or_singleton(
            commands in prop::collection::vec(arb_command(), 0..40)
        ) {
            let mut root: CompoundFilter = None;
            for command in &commands {
                root = apply_edit(root.as_ref(), command, 5);
                let mut sizes = Vec::new();
                if let Some(node) = &root {
                    group_sizes(node, &mut sizes);
                }
                prop_assert!(sizes.iter().all(|&len| len >= 2));
            }
        }
    }
}
