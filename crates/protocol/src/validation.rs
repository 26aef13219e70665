//! Message validation contract
//!
//! The router delegates field-level checks to a [`Validator`] before applying
//! its own business rules. [`SchemaValidator`] covers the structural
//! constraints the router relies on; deployments with a richer schema plug in
//! their own implementation.

use crate::message::{Content, ContentKind, Message};

/// Result of validating one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    errors: Vec<String>,
}

impl ValidationReport {
    /// A report with no errors
    pub fn valid() -> Self {
        Self::default()
    }

    /// A report with a single error
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
        }
    }

    /// Record an error
    pub fn push(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// True when no errors were recorded
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Recorded errors in check order
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Errors joined into one line
    pub fn summary(&self) -> String {
        self.errors.join("; ")
    }
}

/// Field-level validation of a message against the variant the caller expects
pub trait Validator: Send + Sync {
    /// Validate `message`, which the caller believes carries `expected` content
    fn validate(&self, message: &Message, expected: ContentKind) -> ValidationReport;
}

/// Structural validator for the fields the router depends on
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    /// Create a schema validator
    pub fn new() -> Self {
        Self
    }
}

fn require(report: &mut ValidationReport, field: &str, value: &str) {
    if value.trim().is_empty() {
        report.push(format!("{field} is required"));
    }
}

impl Validator for SchemaValidator {
    fn validate(&self, message: &Message, expected: ContentKind) -> ValidationReport {
        let mut report = ValidationReport::valid();

        require(&mut report, "node_id", &message.node_id);

        let Some(content) = &message.content else {
            report.push(format!("expected {expected} content, found none"));
            return report;
        };
        if content.kind() != expected {
            report.push(format!("expected {expected} content, found {}", content.kind()));
            return report;
        }

        match content {
            Content::Registration(registration) => {
                require(&mut report, "node_type", &registration.node_type);
            }
            Content::RegistrationAck(_) => {}
            Content::StatusReport(status) => {
                require(&mut report, "report_id", &status.report_id);
            }
            Content::DetectionReport(detection) => {
                require(&mut report, "report_id", &detection.report_id);
                require(&mut report, "object_id", &detection.object_id);
                if let Some(confidence) = detection.confidence {
                    if !(0.0..=1.0).contains(&confidence) {
                        report.push(format!("confidence {confidence} outside [0, 1]"));
                    }
                }
            }
            Content::Alert(alert) => {
                require(&mut report, "alert_id", &alert.alert_id);
                require(&mut report, "alert_type", &alert.alert_type);
            }
            Content::AlertAck(ack) => {
                require(&mut report, "alert_id", &ack.alert_id);
            }
            Content::Task(task) => {
                require(&mut report, "task_id", &task.task_id);
                if task.control.is_none() && task.request.is_none() {
                    report.push("task carries neither control nor request");
                }
                require(&mut report, "destination", message.target_id());
            }
            Content::TaskAck(ack) => {
                require(&mut report, "task_id", &ack.task_id);
            }
            Content::Error(error) => {
                if error.errors.is_empty() {
                    report.push("error message carries no error strings");
                }
            }
        }

        report
    }
}
