//! Plan validation rules.
//!
//! The validator is an ordered list of independent rules. Each rule
//! inspects a candidate plan against the original request and reports
//! structured errors; new anti-patterns become new rules without any
//! change to planning or scheduling logic. Rules are pure functions of
//! their inputs, so validating an accepted plan a second time yields
//! the same (empty) result.

use crate::core::dag::{GraphError, PlanGraph};
use crate::core::plan::Plan;
use crate::core::task::TaskId;
use crate::flog_debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One structured rejection, precise enough for the plan generator to
/// correct the offending task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub rule_id: String,
    pub message: String,
    pub offending_task_id: Option<TaskId>,
}

impl ValidationError {
    pub fn new(rule_id: &str, message: impl Into<String>, task: Option<TaskId>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            message: message.into(),
            offending_task_id: task,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.offending_task_id {
            Some(id) => write!(f, "[{}] task '{}': {}", self.rule_id, id, self.message),
            None => write!(f, "[{}] {}", self.rule_id, self.message),
        }
    }
}

/// A single validation rule.
pub trait Rule: Send + Sync {
    /// Stable identifier reported in [`ValidationError::rule_id`].
    fn id(&self) -> &'static str;

    fn check(&self, plan: &Plan, request: &str) -> Vec<ValidationError>;
}

/// Ordered rule set applied to every candidate plan.
pub struct Validator {
    rules: Vec<Box<dyn Rule>>,
}

impl Validator {
    /// Validator with the baseline rule set in its canonical order.
    pub fn baseline() -> Self {
        Self {
            rules: vec![
                Box::new(AcyclicityRule),
                Box::new(ScopeRule::new()),
                Box::new(ConcreteDataRule::new()),
                Box::new(BatchCollapseRule::new()),
            ],
        }
    }

    pub fn with_rules(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    pub fn push_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    /// Run every rule and collect all errors. An empty result means
    /// the plan is accepted.
    pub fn validate(&self, plan: &Plan, request: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for rule in &self.rules {
            let found = rule.check(plan, request);
            if !found.is_empty() {
                flog_debug!("rule '{}' rejected plan: {} errors", rule.id(), found.len());
            }
            errors.extend(found);
        }
        errors
    }

    pub fn is_valid(&self, plan: &Plan, request: &str) -> bool {
        self.validate(plan, request).is_empty()
    }
}

/// Rejects cycles and references to task ids not present in the plan.
pub struct AcyclicityRule;

impl Rule for AcyclicityRule {
    fn id(&self) -> &'static str {
        "acyclicity"
    }

    fn check(&self, plan: &Plan, _request: &str) -> Vec<ValidationError> {
        match PlanGraph::from_plan(plan) {
            Ok(_) => Vec::new(),
            Err(GraphError::DuplicateId { task }) => vec![ValidationError::new(
                self.id(),
                format!("task id '{}' is used more than once", task),
                Some(task),
            )],
            Err(GraphError::UnknownDependency { task, dependency }) => vec![ValidationError::new(
                self.id(),
                format!("depends on unknown task id '{}'", dependency),
                Some(task),
            )],
            Err(GraphError::Cycle { involved }) => {
                let ids: Vec<&str> = involved.iter().map(|id| id.as_str()).collect();
                vec![ValidationError::new(
                    self.id(),
                    format!("dependency cycle involving tasks [{}]", ids.join(", ")),
                    involved.first().cloned(),
                )]
            }
        }
    }
}

/// Rejects bookkeeping tasks the request never asked for.
///
/// Unrequested side-effecting tasks (status updates, progress logging,
/// notifications) are a major source of wasted work and incorrect
/// state mutation, so they are rejected unless the request mentions
/// the corresponding activity.
pub struct ScopeRule {
    patterns: Vec<(Regex, &'static str)>,
}

impl ScopeRule {
    pub fn new() -> Self {
        // Pattern paired with the request keyword that legitimizes it.
        let specs: [(&str, &'static str); 5] = [
            (r"(?i)\bupdate\b.{0,20}\bstatus\b", "status"),
            (r"(?i)\blog\b.{0,20}\b(progress|status|completion)\b", "log"),
            (r"(?i)\b(send|post)\b.{0,20}\b(notification|email|message)\b", "notif"),
            (r"(?i)\bnotify\b", "notif"),
            (r"(?i)\b(create|open|file)\b.{0,20}\bticket\b", "ticket"),
        ];
        let patterns = specs
            .iter()
            .map(|(pattern, keyword)| (Regex::new(pattern).unwrap(), *keyword))
            .collect();
        Self { patterns }
    }
}

impl Default for ScopeRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for ScopeRule {
    fn id(&self) -> &'static str {
        "scope"
    }

    fn check(&self, plan: &Plan, request: &str) -> Vec<ValidationError> {
        let request_lower = request.to_lowercase();
        let mut errors = Vec::new();
        for task in &plan.tasks {
            for (pattern, keyword) in &self.patterns {
                if pattern.is_match(&task.description) && !request_lower.contains(keyword) {
                    errors.push(ValidationError::new(
                        self.id(),
                        format!(
                            "task performs an action the request never asked for: '{}'",
                            task.description
                        ),
                        Some(task.id.clone()),
                    ));
                    break;
                }
            }
        }
        errors
    }
}

/// Rejects descriptions that reference another task's output instead
/// of embedding the literal values.
///
/// Workers are stateless: a description saying "the file from the
/// previous task" cannot be resolved and leads to fabricated values.
pub struct ConcreteDataRule {
    reference_patterns: Vec<Regex>,
    placeholder: Regex,
}

impl ConcreteDataRule {
    pub fn new() -> Self {
        let reference_patterns = [
            r"(?i)\bthe\s+(file|files|result|results|output|outputs|list|data|items?|value|values)\s+(returned|produced|found|generated|created|discovered|obtained)\s+(by|from|in)\b",
            r"(?i)\bfrom\s+(the\s+)?(previous|prior|earlier|above|first|second|third)\s+(task|step)\b",
            r"(?i)\b(its|their)\s+(output|result)s?\b",
            r"(?i)\boutput\s+of\s+task\b",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect();
        // Bare parameter names with no literal value attached.
        let placeholder = Regex::new(r"<[a-z_][a-z_ -]*>|\{\{?[a-z_]+\}?\}|\bTBD\b").unwrap();
        Self {
            reference_patterns,
            placeholder,
        }
    }
}

impl Default for ConcreteDataRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for ConcreteDataRule {
    fn id(&self) -> &'static str {
        "concrete_data"
    }

    fn check(&self, plan: &Plan, _request: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for task in &plan.tasks {
            if self.placeholder.is_match(&task.description) {
                errors.push(ValidationError::new(
                    self.id(),
                    "description contains a placeholder instead of a literal value",
                    Some(task.id.clone()),
                ));
                continue;
            }
            for pattern in &self.reference_patterns {
                if pattern.is_match(&task.description) {
                    errors.push(ValidationError::new(
                        self.id(),
                        "description references another task's output instead of embedding the literal value",
                        Some(task.id.clone()),
                    ));
                    break;
                }
            }
        }
        errors
    }
}

/// Rejects "discover then process each" split across two tasks.
///
/// A variable-length discovered set cannot cross a task boundary, so
/// discovery and iteration must be collapsed into one task unless the
/// iterating task embeds an enumerable literal list.
pub struct BatchCollapseRule {
    discovery: Regex,
    iteration: Regex,
    literal_list: Regex,
}

impl BatchCollapseRule {
    pub fn new() -> Self {
        Self {
            discovery: Regex::new(
                r"(?i)\b(list|enumerate|find|discover|scan|search\s+for)\b.{0,60}\b(files?|items?|entries|records|documents|results|matches)\b",
            )
            .unwrap(),
            iteration: Regex::new(
                r"(?i)\b(process|handle|convert|transform|summarize|delete|upload|apply\s+to)\s+(each|every|all)\b|\bfor\s+each\b",
            )
            .unwrap(),
            // A bracketed list or two or more quoted items counts as
            // an embedded enumerable list.
            literal_list: Regex::new(r#"\[[^\]]*,[^\]]*\]|("[^"]+"|'[^']+')\s*,\s*("[^"]+"|'[^']+')"#)
                .unwrap(),
        }
    }
}

impl Default for BatchCollapseRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for BatchCollapseRule {
    fn id(&self) -> &'static str {
        "batch_collapse"
    }

    fn check(&self, plan: &Plan, _request: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for task in &plan.tasks {
            if !self.iteration.is_match(&task.description)
                || self.literal_list.is_match(&task.description)
            {
                continue;
            }
            let depends_on_discovery = task.depends_on.iter().any(|dep| {
                plan.task(dep)
                    .map(|d| self.discovery.is_match(&d.description))
                    .unwrap_or(false)
            });
            if depends_on_discovery {
                errors.push(ValidationError::new(
                    self.id(),
                    "iterates over a set discovered by another task without an embedded literal list; collapse discovery and iteration into one task",
                    Some(task.id.clone()),
                ));
            }
        }
        errors
    }
}
