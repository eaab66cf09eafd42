//! Письма пользователям.
//!
//! Доставка почты вне этого сервиса: `Mailer` получает готовое письмо, а
//! реализация по умолчанию пишет его в лог. Ошибка отправки никогда не
//! отменяет уже зафиксированную операцию.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::{
    models::User,
    services::booking::{BookingReceipt, CancellationReceipt},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

pub trait Mailer: Send + Sync {
    fn deliver(&self, from: &str, mail: &Mail) -> Result<(), MailError>;
}

/// Пишет письма в структурированный лог.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn deliver(&self, from: &str, mail: &Mail) -> Result<(), MailError> {
        info!(from = %from, to = %mail.to, subject = %mail.subject, "outgoing mail\n{}", mail.body);
        Ok(())
    }
}

/// Копит письма в памяти. Нужен тестам и локальной отладке.
#[derive(Default, Clone)]
pub struct MemoryMailer {
    outbox: Arc<Mutex<Vec<Mail>>>,
}

impl MemoryMailer {
    pub fn sent(&self) -> Vec<Mail> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

impl Mailer for MemoryMailer {
    fn deliver(&self, _from: &str, mail: &Mail) -> Result<(), MailError> {
        self.outbox
            .lock()
            .map_err(|_| MailError("outbox poisoned".to_string()))?
            .push(mail.clone());
        Ok(())
    }
}

/// Отправляет письмо, ошибку только логирует.
pub fn send(mailer: &dyn Mailer, from: &str, mail: Mail) {
    if let Err(e) = mailer.deliver(from, &mail) {
        warn!("Failed to send '{}' to {}: {}", mail.subject, mail.to, e);
    }
}

pub fn registration(user: &User, activation_url: &str) -> Mail {
    Mail {
        to: user.email.clone(),
        subject: "Activate your Box Office account".to_string(),
        body: format!(
            "Hello {},\n\nWelcome to Box Office! Confirm your email address to activate \
             your account:\n\n{}\n\nIf you did not sign up, ignore this message.",
            user.display_name(),
            activation_url
        ),
    }
}

pub fn password_reset(user: &User, reset_url: &str) -> Mail {
    Mail {
        to: user.email.clone(),
        subject: "Reset your Box Office password".to_string(),
        body: format!(
            "Hello {},\n\nWe received a request to reset your password. Use the link \
             below to choose a new one:\n\n{}\n\nThe link stops working once the \
             password is changed.",
            user.display_name(),
            reset_url
        ),
    }
}

pub fn booking_confirmation(user: &User, receipt: &BookingReceipt) -> Mail {
    Mail {
        to: user.email.clone(),
        subject: format!("Booking confirmed: {}", receipt.item_title),
        body: format!(
            "Hello {},\n\nYour booking #{} is confirmed.\n\n\
             Title: {}\nDate: {}\nTime: {}\nSeats: {}\nTotal paid: KSH {}\n\
             Remaining balance: KSH {}\n",
            user.display_name(),
            receipt.booking_id,
            receipt.item_title,
            receipt.show_date,
            receipt.show_time,
            receipt.seats,
            receipt.total_cost,
            receipt.new_balance
        ),
    }
}

pub fn booking_cancellation(user: &User, receipt: &CancellationReceipt) -> Mail {
    Mail {
        to: user.email.clone(),
        subject: format!("Booking cancelled: {}", receipt.item_title),
        body: format!(
            "Hello {},\n\nYour booking #{} for {} (seats {}) was cancelled.\n\
             Refund: KSH {}\nBalance: KSH {}\n",
            user.display_name(),
            receipt.booking_id,
            receipt.item_title,
            receipt.seats,
            receipt.refund,
            receipt.new_balance
        ),
    }
}

pub fn account_deletion(user: &User) -> Mail {
    Mail {
        to: user.email.clone(),
        subject: "Your Box Office account was deleted".to_string(),
        body: format!(
            "Hello {},\n\nYour account and all of its bookings have been deleted. \
             We are sorry to see you go.",
            user.display_name()
        ),
    }
}
