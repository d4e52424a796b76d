//! Transactional email templates
//!
//! Four template kinds cover the platform's outbound mail: one-time codes,
//! mission status changes, maintenance broadcasts, and feedback receipts.
//! Templates are idempotent statements of current state, so re-sending one
//! is always safe.

use crate::mission::{MissionId, MissionStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Template kind, used for logging and the notification event log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Otp,
    StatusChange,
    Maintenance,
    Feedback,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Otp => "otp",
            TemplateKind::StatusChange => "status_change",
            TemplateKind::Maintenance => "maintenance",
            TemplateKind::Feedback => "feedback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "otp" => Some(TemplateKind::Otp),
            "status_change" => Some(TemplateKind::StatusChange),
            "maintenance" => Some(TemplateKind::Maintenance),
            "feedback" => Some(TemplateKind::Feedback),
            _ => None,
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A template plus its payload fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Template {
    /// One-time verification code
    Otp {
        recipient_name: String,
        code: String,
        /// What the code verifies ("email verification", "password reset")
        purpose: String,
    },

    /// Mission status update for an affected party
    StatusChange {
        recipient_name: String,
        mission_id: MissionId,
        status: MissionStatus,
        items: String,
        delivery_address: String,
        /// Extra context (clinic name, drone name, failure reason)
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    /// Planned-maintenance or incident broadcast
    Maintenance {
        title: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        window: Option<String>,
    },

    /// Receipt for submitted feedback
    Feedback {
        recipient_name: String,
        reference: String,
    },
}

/// A rendered message ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl Template {
    pub fn kind(&self) -> TemplateKind {
        match self {
            Template::Otp { .. } => TemplateKind::Otp,
            Template::StatusChange { .. } => TemplateKind::StatusChange,
            Template::Maintenance { .. } => TemplateKind::Maintenance,
            Template::Feedback { .. } => TemplateKind::Feedback,
        }
    }

    /// One-line human summary (log lines, CLI output)
    pub fn summary(&self) -> String {
        match self {
            Template::Otp { purpose, .. } => format!("otp for {}", purpose),
            Template::StatusChange {
                mission_id, status, ..
            } => format!("mission #{} -> {}", mission_id, status),
            Template::Maintenance { title, .. } => format!("maintenance: {}", title),
            Template::Feedback { reference, .. } => format!("feedback receipt {}", reference),
        }
    }

    /// Render the subject and both body forms
    pub fn render(&self) -> Rendered {
        match self {
            Template::Otp {
                recipient_name,
                code,
                purpose,
            } => {
                let subject = format!("Your Aeromed Verification Code - {}", code);
                let text = format!(
                    "Dear {recipient_name},\n\n\
                     Your verification code for {purpose} is: {code}\n\n\
                     This code expires in 10 minutes. If you did not request it,\n\
                     you can safely ignore this email.\n\n\
                     Aeromed - Emergency Medical Delivery Service\n"
                );
                let html = wrap_html(
                    &subject,
                    &format!(
                        "<p>Dear {recipient_name},</p>\
                         <p>Your verification code for {purpose} is:</p>\
                         <p class=\"code\">{code}</p>\
                         <p>This code expires in 10 minutes. If you did not request it, \
                         you can safely ignore this email.</p>"
                    ),
                );
                Rendered { subject, text, html }
            }

            Template::StatusChange {
                recipient_name,
                mission_id,
                status,
                items,
                delivery_address,
                detail,
            } => {
                let subject = format!("{} - Aeromed #{}", status.headline(), mission_id);
                let detail_line = detail
                    .as_ref()
                    .map(|d| format!("\n{d}\n"))
                    .unwrap_or_default();
                let text = format!(
                    "Dear {recipient_name},\n\n\
                     {headline}.\n\
                     {detail_line}\n\
                     Request ID: #{mission_id}\n\
                     Items: {items}\n\
                     Delivery address: {delivery_address}\n\n\
                     You will receive further updates as your request progresses.\n\n\
                     Aeromed - Emergency Medical Delivery Service\n",
                    headline = status.headline(),
                );
                let detail_html = detail
                    .as_ref()
                    .map(|d| format!("<p>{d}</p>"))
                    .unwrap_or_default();
                let html = wrap_html(
                    &subject,
                    &format!(
                        "<p>Dear {recipient_name},</p>\
                         <p>{}</p>{detail_html}\
                         <div class=\"details\">\
                         <p><strong>Request ID:</strong> #{mission_id}</p>\
                         <p><strong>Items:</strong> {items}</p>\
                         <p><strong>Delivery address:</strong> {delivery_address}</p>\
                         </div>\
                         <p>You will receive further updates as your request progresses.</p>",
                        status.headline()
                    ),
                );
                Rendered { subject, text, html }
            }

            Template::Maintenance {
                title,
                message,
                window,
            } => {
                let subject = format!("Aeromed Service Notice - {}", title);
                let window_line = window
                    .as_ref()
                    .map(|w| format!("Scheduled window: {w}\n"))
                    .unwrap_or_default();
                let text = format!(
                    "{message}\n\n{window_line}\
                     We apologize for any inconvenience.\n\n\
                     Aeromed - Emergency Medical Delivery Service\n"
                );
                let window_html = window
                    .as_ref()
                    .map(|w| format!("<p><strong>Scheduled window:</strong> {w}</p>"))
                    .unwrap_or_default();
                let html = wrap_html(
                    &subject,
                    &format!("<p>{message}</p>{window_html}<p>We apologize for any inconvenience.</p>"),
                );
                Rendered { subject, text, html }
            }

            Template::Feedback {
                recipient_name,
                reference,
            } => {
                let subject = format!("We Received Your Feedback - {}", reference);
                let text = format!(
                    "Dear {recipient_name},\n\n\
                     Thank you for your feedback. Your reference number is {reference}.\n\
                     Our team reviews every submission and will follow up if needed.\n\n\
                     Aeromed - Emergency Medical Delivery Service\n"
                );
                let html = wrap_html(
                    &subject,
                    &format!(
                        "<p>Dear {recipient_name},</p>\
                         <p>Thank you for your feedback. Your reference number is \
                         <strong>{reference}</strong>.</p>\
                         <p>Our team reviews every submission and will follow up if needed.</p>"
                    ),
                );
                Rendered { subject, text, html }
            }
        }
    }
}

fn wrap_html(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"UTF-8\"><title>{title}</title></head>\
         <body style=\"font-family: Arial, sans-serif; color: #333;\">\
         <div style=\"max-width: 600px; margin: 0 auto;\">\
         <h2 style=\"color: #2980B9;\">Aeromed</h2>{body}\
         <p style=\"color: #666; font-size: 13px;\">Aeromed - Emergency Medical Delivery Service</p>\
         </div></body></html>"
    )
}
