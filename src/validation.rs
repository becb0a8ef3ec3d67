use crate::{Element, ElementId, TableInfo};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Validation severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValidationSeverity {
    Info,    // informational
    Warning, // works, but probably not what the user wants
    Error,   // collection violates the element model
}

/// Validation issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub message: String,
    pub affected_elements: Vec<ElementId>,
    pub issue_type: ValidationIssueType,
}

/// Types of validation issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationIssueType {
    EmptyId,
    DuplicateId,
    InvalidDimension,
    MissingParent,
    ParentNotContainer,
    MissingChild,
    /// Listed in a container's children but pointing at another parent
    ParentMismatch,
    /// Has a parent but is not listed in that container's children
    UnregisteredChild,
    /// Listed as a child by more than one container
    MultipleParents,
    Cycle,
    UnboundData,
    /// Bound to a table the database does not list
    UnknownTable,
}

/// Complete validation result
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    pub fn add_issue(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    fn error(&mut self, issue_type: ValidationIssueType, message: String, affected: Vec<ElementId>) {
        self.add_issue(ValidationIssue {
            severity: ValidationSeverity::Error,
            message,
            affected_elements: affected,
            issue_type,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == ValidationSeverity::Error)
    }

    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Error)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Warning)
            .collect()
    }

    pub fn info(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Info)
            .collect()
    }

    /// Check if validation passed (no errors)
    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    /// One line per error, for status messages
    pub fn error_summary(&self) -> String {
        self.errors()
            .iter()
            .map(|i| i.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Structural validator for element collections
pub struct Validator;

impl Validator {
    /// Run all validations on a collection
    pub fn validate(elements: &[Element]) -> ValidationResult {
        let mut result = ValidationResult::new();

        let mut index: HashMap<&ElementId, &Element> = HashMap::new();
        for element in elements {
            if element.id.is_empty() {
                result.error(
                    ValidationIssueType::EmptyId,
                    "Element with an empty id".to_string(),
                    vec![],
                );
            }
            if index.insert(&element.id, element).is_some() {
                result.error(
                    ValidationIssueType::DuplicateId,
                    format!("Duplicate element id {}", element.id),
                    vec![element.id.clone()],
                );
            }
            if !element.width.is_valid() || !element.height.is_valid() {
                result.error(
                    ValidationIssueType::InvalidDimension,
                    format!(
                        "Element {} has invalid size {} x {}",
                        element.id, element.width, element.height
                    ),
                    vec![element.id.clone()],
                );
            }
        }

        Self::check_parents(elements, &index, &mut result);
        Self::check_children(elements, &index, &mut result);

        if let Some(cycle) = Self::detect_cycle(elements, &index) {
            result.error(
                ValidationIssueType::Cycle,
                format!(
                    "Containers nest inside themselves through {} element(s)",
                    cycle.len()
                ),
                cycle,
            );
        }

        for element in elements {
            if let Some(binding) = element.binding() {
                if !binding.has_query() {
                    result.add_issue(ValidationIssue {
                        severity: ValidationSeverity::Info,
                        message: format!(
                            "{} {} has no query and will stay empty",
                            element.element_type(),
                            element.id
                        ),
                        affected_elements: vec![element.id.clone()],
                        issue_type: ValidationIssueType::UnboundData,
                    });
                }
            }
        }

        result
    }

    /// Warn about data-bound elements whose table is not in `tables`.
    /// Nothing is reported while the table list is unknown (empty).
    pub fn check_tables(elements: &[Element], tables: &[TableInfo], result: &mut ValidationResult) {
        if tables.is_empty() {
            return;
        }

        for element in elements {
            let Some(binding) = element.binding() else {
                continue;
            };
            if binding.table_name.is_empty() || tables.iter().any(|t| t.name == binding.table_name) {
                continue;
            }
            result.add_issue(ValidationIssue {
                severity: ValidationSeverity::Warning,
                message: format!(
                    "{} {} reads from unknown table '{}'",
                    element.element_type(),
                    element.id,
                    binding.table_name
                ),
                affected_elements: vec![element.id.clone()],
                issue_type: ValidationIssueType::UnknownTable,
            });
        }
    }

    /// Every `parent_id` points at an existing container that lists the element
    fn check_parents(
        elements: &[Element],
        index: &HashMap<&ElementId, &Element>,
        result: &mut ValidationResult,
    ) {
        for element in elements {
            let Some(parent_id) = &element.parent_id else {
                continue;
            };

            match index.get(parent_id) {
                None => result.error(
                    ValidationIssueType::MissingParent,
                    format!("Element {} refers to missing parent {}", element.id, parent_id),
                    vec![element.id.clone()],
                ),
                Some(parent) if !parent.is_container() => result.error(
                    ValidationIssueType::ParentNotContainer,
                    format!(
                        "Element {} is nested in {} {}, which is not a container",
                        element.id,
                        parent.element_type(),
                        parent_id
                    ),
                    vec![element.id.clone(), parent_id.clone()],
                ),
                Some(parent) if !parent.children().contains(&element.id) => result.error(
                    ValidationIssueType::UnregisteredChild,
                    format!(
                        "Element {} is not listed in the children of {}",
                        element.id, parent_id
                    ),
                    vec![element.id.clone(), parent_id.clone()],
                ),
                Some(_) => {}
            }
        }
    }

    /// Every listed child exists, points back, and has exactly one container
    fn check_children(
        elements: &[Element],
        index: &HashMap<&ElementId, &Element>,
        result: &mut ValidationResult,
    ) {
        let mut listed_by: HashMap<&ElementId, &ElementId> = HashMap::new();

        for container in elements.iter().filter(|e| e.is_container()) {
            for child_id in container.children() {
                if let Some(previous) = listed_by.insert(child_id, &container.id) {
                    if previous != &container.id {
                        result.error(
                            ValidationIssueType::MultipleParents,
                            format!(
                                "Element {} is listed by both {} and {}",
                                child_id, previous, container.id
                            ),
                            vec![child_id.clone()],
                        );
                    }
                }

                match index.get(child_id) {
                    None => result.error(
                        ValidationIssueType::MissingChild,
                        format!(
                            "Container {} lists missing child {}",
                            container.id, child_id
                        ),
                        vec![container.id.clone()],
                    ),
                    Some(child) if child.parent_id.as_ref() != Some(&container.id) => result.error(
                        ValidationIssueType::ParentMismatch,
                        format!(
                            "Container {} lists {}, whose parent is {}",
                            container.id,
                            child_id,
                            child
                                .parent_id
                                .as_ref()
                                .map(|p| p.to_string())
                                .unwrap_or_else(|| "the canvas".to_string())
                        ),
                        vec![container.id.clone(), child_id.clone()],
                    ),
                    Some(_) => {}
                }
            }
        }
    }

    /// Find a container that is its own descendant, following `children`
    /// lists with an explicit stack.
    fn detect_cycle(
        elements: &[Element],
        index: &HashMap<&ElementId, &Element>,
    ) -> Option<Vec<ElementId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }

        let mut marks: HashMap<&ElementId, Mark> = HashMap::new();

        for root in elements.iter().filter(|e| e.is_container()) {
            if marks.contains_key(&root.id) {
                continue;
            }

            // (element, index of the next child to visit)
            let mut stack: Vec<(&Element, usize)> = vec![(root, 0)];
            marks.insert(&root.id, Mark::InProgress);

            while let Some(top) = stack.last_mut() {
                let element = top.0;
                let position = top.1;
                top.1 += 1;

                let children = element.children();
                if position >= children.len() {
                    marks.insert(&element.id, Mark::Done);
                    stack.pop();
                    continue;
                }

                let child_id = &children[position];

                match marks.get(child_id) {
                    Some(Mark::InProgress) => {
                        let start = stack
                            .iter()
                            .position(|(e, _)| &e.id == child_id)
                            .unwrap_or(0);
                        return Some(stack[start..].iter().map(|(e, _)| e.id.clone()).collect());
                    }
                    Some(Mark::Done) => {}
                    None => {
                        if let Some(child) = index.get(child_id) {
                            marks.insert(&child.id, Mark::InProgress);
                            stack.push((child, 0));
                        }
                    }
                }
            }
        }

        None
    }
}

/// Extension trait for element collections
pub trait ValidatedElements {
    fn validate(&self) -> ValidationResult;

    /// Highest severity per affected element
    fn elements_with_issues(&self, result: &ValidationResult) -> HashMap<ElementId, ValidationSeverity> {
        let mut elements = HashMap::new();

        for issue in &result.issues {
            for id in &issue.affected_elements {
                elements
                    .entry(id.clone())
                    .and_modify(|severity| {
                        if issue.severity > *severity {
                            *severity = issue.severity;
                        }
                    })
                    .or_insert(issue.severity);
            }
        }

        elements
    }
}

impl ValidatedElements for [Element] {
    fn validate(&self) -> ValidationResult {
        Validator::validate(self)
    }
}

/// IDs of `root` and all of its descendants in depth-first order, root first.
///
/// Uses an explicit stack and skips IDs already visited, so malformed
/// (cyclic) input terminates.
pub fn descendants_of<'a, F>(root: &ElementId, lookup: F) -> Vec<ElementId>
where
    F: Fn(&ElementId) -> Option<&'a Element>,
{
    let mut seen: HashSet<ElementId> = HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![root.clone()];

    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(element) = lookup(&id) {
            stack.extend(element.children().iter().rev().cloned());
        }
        order.push(id);
    }

    order
}
