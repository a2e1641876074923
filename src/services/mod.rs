pub mod auth_service;
pub mod charge_service;
pub mod message_composer;
pub mod notification_service;
pub mod recurrence_service;
pub mod sweep_service;
pub mod webhook_service;
pub mod whatsapp_service;

pub use auth_service::AuthService;
pub use charge_service::{ChargeService, TransitionOutcome, TransitionSource};
pub use notification_service::NotificationDispatcher;
pub use recurrence_service::{RecurrenceService, SuccessorOutcome};
pub use sweep_service::{SweepReport, SweepService};
pub use webhook_service::{WebhookEvent, WebhookService};
pub use whatsapp_service::{MessagingTransport, TransportError, WhatsAppService};
