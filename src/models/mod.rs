pub mod user;
pub mod catalog;
pub mod booking;
pub mod notification;
pub mod chat;

pub use user::User;
pub use catalog::{CatalogItem, Showing};
pub use booking::Booking;
pub use notification::Notification;
pub use chat::ChatMessage;
