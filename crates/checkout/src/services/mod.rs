//! Collaborators invoked after an order commits.

pub mod notification;

pub use notification::{
    InMemoryNotificationService, LoggingNotificationService, NotificationService, OrderPlaced,
};
