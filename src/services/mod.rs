pub mod auth;
pub mod booking;
pub mod mailer;
pub mod reports;
