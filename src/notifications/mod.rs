pub mod email;
pub mod log;
pub mod service;

pub use email::{AlertEmail, EmailSender};
pub use log::{HistoryEntry, PredictionLog};
pub use service::{AlertType, DeliveryResult, NotificationDecision, NotificationService, NotifyRequest};
