//! End-of-session absentee alerts over SMTP.

use crate::config::MailConfig;
use crate::ledger::Ledger;
use crate::sheet::{SheetStore, DATE_FORMAT};
use chrono::NaiveDate;
use lettre::address::AddressError;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("invalid address {address:?}: {source}")]
    Address {
        address: String,
        source: AddressError,
    },
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("smtp: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("transport: {0}")]
    Transport(String),
}

/// Delivers one composed message. One attempt, no retry.
pub trait MailTransport {
    fn deliver(&self, message: &Message) -> Result<(), NotifyError>;
}

/// Authenticated SMTP submission over STARTTLS.
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn from_config(mail: &MailConfig) -> Result<Self, NotifyError> {
        let transport = SmtpTransport::starttls_relay(&mail.smtp_host)?
            .port(mail.smtp_port)
            .credentials(Credentials::new(mail.sender.clone(), mail.password.clone()))
            .build();
        tracing::debug!(host = %mail.smtp_host, port = mail.smtp_port, "SMTP transport configured");
        Ok(Self { transport })
    }
}

impl MailTransport for SmtpMailer {
    fn deliver(&self, message: &Message) -> Result<(), NotifyError> {
        self.transport.send(message)?;
        Ok(())
    }
}

/// Outcome of one notification pass.
#[derive(Debug, Default)]
pub struct NotifyReport {
    pub sent: Vec<String>,
    pub failed: Vec<(String, String)>,
}

pub struct Notifier {
    transport: Box<dyn MailTransport>,
    sender: Mailbox,
}

impl Notifier {
    pub fn new(transport: Box<dyn MailTransport>, sender: &str) -> Result<Self, NotifyError> {
        Ok(Self {
            transport,
            sender: Mailbox::new(Some("Attendance System".to_string()), parse_address(sender)?),
        })
    }

    /// Email every absent student. Failures are logged per recipient and never abort the pass.
    pub fn notify_absentees<S: SheetStore>(&self, ledger: &Ledger<S>) -> NotifyReport {
        let mut report = NotifyReport::default();
        let date = ledger.date();

        println!("\n=== Sending Absent Alerts ===");
        for (name, email) in ledger.absentees() {
            match self.send_alert(name, email, date) {
                Ok(()) => {
                    tracing::info!(name, email, "absence alert sent");
                    println!("Email sent successfully to {name}");
                    report.sent.push(name.to_string());
                }
                Err(e) => {
                    tracing::error!(name, email, error = %e, "error sending absence alert");
                    report.failed.push((name.to_string(), e.to_string()));
                }
            }
        }

        tracing::info!(sent = report.sent.len(), failed = report.failed.len(), "absence alerts finished");
        report
    }

    fn send_alert(&self, name: &str, email: &str, date: NaiveDate) -> Result<(), NotifyError> {
        let message = compose_alert(&self.sender, name, email, date)?;
        self.transport.deliver(&message)
    }
}

fn parse_address(address: &str) -> Result<Address, NotifyError> {
    address.parse().map_err(|source| NotifyError::Address {
        address: address.to_string(),
        source,
    })
}

/// Plain-text absence notice for one student.
pub fn compose_alert(
    from: &Mailbox,
    name: &str,
    email: &str,
    date: NaiveDate,
) -> Result<Message, NotifyError> {
    let to = Mailbox::new(Some(name.to_string()), parse_address(email)?);
    let body = format!(
        "Dear {name},\n\nYou were marked absent today ({}). Please contact the instructor if this is an error.\n\nBest regards,\nAttendance System",
        date.format(DATE_FORMAT)
    );

    Ok(Message::builder()
        .from(from.clone())
        .to(to)
        .subject(format!("Attendance Alert: {name} Absent"))
        .header(ContentType::TEXT_PLAIN)
        .body(body)?)
}
