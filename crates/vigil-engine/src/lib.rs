pub mod email;
pub mod engine;
pub mod gateway;
pub mod machine;
pub mod notifier;
pub mod payment;
pub mod processor;
pub mod push;
pub mod scheduler;
pub mod stats;

pub use email::{EmailSender, NoopEmailSender, SmtpEmailSender};
pub use engine::Engine;
pub use gateway::SubmissionGateway;
pub use notifier::{AlertEvent, AlertTransition};
pub use processor::{ProbeResult, ProcessorHandle};
pub use push::{PushChannel, PushHub, PushMessage, PushPayload};
pub use scheduler::SchedulerHandle;
pub use stats::{CurrentStatus, StatsView, TargetStats};
