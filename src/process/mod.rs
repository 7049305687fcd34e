// Business-process inference
//
// Everything in here works on discovered entities only; no file is read.
// Actors and boundaries are derived first, relationships and use cases are
// synthesized from them.

pub mod actors;
pub mod boundaries;
pub mod relationships;
pub mod use_cases;

pub use relationships::RelationshipMapper;
pub use use_cases::UseCaseBuilder;

use crate::model::{Constraint, Execution, Model, Recurrence, ServiceMethod};

/// Postcondition of any operation that mutates persisted state
pub const PERSISTED_CHANGE: &str = "The system performs a persisted state change";

/// Whether a method changes persisted state
///
/// Explicit markers win; otherwise a recognized persistence mutation in the
/// body is enough.
pub fn is_transactional(method: &ServiceMethod) -> bool {
    method.transactional || !method.persistence_calls.is_empty()
}

/// How a scenario step derived from a method runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTags {
    pub execution: Execution,
    pub recurrence: Recurrence,
    pub retried: bool,
}

impl Default for StepTags {
    fn default() -> Self {
        Self {
            execution: Execution::Awaited,
            recurrence: Recurrence::OneShot,
            retried: false,
        }
    }
}

/// Workflow tags of a method: async, scheduled and retry markers
pub fn step_tags(method: &ServiceMethod) -> StepTags {
    StepTags {
        execution: if method.is_async {
            Execution::FireAndForget
        } else {
            Execution::Awaited
        },
        recurrence: if method.scheduled {
            Recurrence::Recurring
        } else {
            Recurrence::OneShot
        },
        retried: method.retry,
    }
}

/// Human-readable rule for one field constraint
pub fn describe_constraint(model: &str, field: &str, constraint: &Constraint) -> String {
    let subject = format!("{}.{}", model, field);
    match constraint {
        Constraint::NotNull => format!("{} is required", subject),
        Constraint::NotBlank => format!("{} must not be blank", subject),
        Constraint::Unique => format!("{} must be unique", subject),
        Constraint::Email => format!("{} must be a valid email address", subject),
        Constraint::Positive => format!("{} must be positive", subject),
        Constraint::Past => format!("{} must be in the past", subject),
        Constraint::Future => format!("{} must be in the future", subject),
        Constraint::Size {
            min: Some(min),
            max: Some(max),
        } => format!("{} length must be between {} and {}", subject, min, max),
        Constraint::Size { min: Some(min), .. } => {
            format!("{} length must be at least {}", subject, min)
        }
        Constraint::Size { max: Some(max), .. } => {
            format!("{} length must be at most {}", subject, max)
        }
        Constraint::Size { .. } => format!("{} has a length limit", subject),
        Constraint::Min { value } => format!("{} must be at least {}", subject, value),
        Constraint::Max { value } => format!("{} must be at most {}", subject, value),
        Constraint::Pattern { regex } => format!("{} must match the pattern {}", subject, regex),
    }
}

/// Validation rules declared on a model, in field order
pub fn validation_rules(model: &Model) -> Vec<String> {
    model
        .fields
        .iter()
        .flat_map(|field| {
            field
                .constraints
                .iter()
                .map(move |c| describe_constraint(&model.name, &field.name, c))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Field, SourceLocation};

    #[test]
    fn test_transactional_from_marker_or_calls() {
        let mut method = ServiceMethod::new("place", 3);
        assert!(!is_transactional(&method));

        method.persistence_calls.push("save".to_string());
        assert!(is_transactional(&method));

        let mut marked = ServiceMethod::new("refund", 9);
        marked.transactional = true;
        assert!(is_transactional(&marked));
    }

    #[test]
    fn test_step_tags() {
        let mut method = ServiceMethod::new("sync", 1);
        assert_eq!(step_tags(&method), StepTags::default());

        method.is_async = true;
        method.scheduled = true;
        method.retry = true;
        let tags = step_tags(&method);
        assert_eq!(tags.execution, Execution::FireAndForget);
        assert_eq!(tags.recurrence, Recurrence::Recurring);
        assert!(tags.retried);
    }

    #[test]
    fn test_validation_rules() {
        let mut model = Model::new("Customer", SourceLocation::new("models.py", 4));
        let mut email = Field::new("email", None);
        email.add_constraint(Constraint::NotNull);
        email.add_constraint(Constraint::Email);
        model.add_field(email);
        let mut name = Field::new("name", None);
        name.add_constraint(Constraint::Size {
            min: Some(2),
            max: Some(100),
        });
        model.add_field(name);
        model.add_field(Field::new("notes", None));

        assert_eq!(
            validation_rules(&model),
            vec![
                "Customer.email is required",
                "Customer.email must be a valid email address",
                "Customer.name length must be between 2 and 100",
            ]
        );
    }

    #[test]
    fn test_describe_bounds() {
        assert_eq!(
            describe_constraint("Order", "total", &Constraint::Min { value: 0 }),
            "Order.total must be at least 0"
        );
        assert_eq!(
            describe_constraint("User", "name", &Constraint::Size { min: None, max: Some(50) }),
            "User.name length must be at most 50"
        );
        assert_eq!(
            describe_constraint(
                "User",
                "code",
                &Constraint::Pattern {
                    regex: "^[A-Z]+$".to_string()
                }
            ),
            "User.code must match the pattern ^[A-Z]+$"
        );
    }
}
