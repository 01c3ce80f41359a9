//! Out-of-band notifications for finished jobs.
//!
//! - [`Notifier`]: the delivery seam the pipeline depends on.
//! - [`messages`]: the text sent when a job completes.
//! - [`delivery`]: concrete channels (Telegram Bot API).

pub mod delivery;
pub mod messages;
pub mod notifier;

pub use delivery::telegram::{TelegramConfig, TelegramNotifier};
pub use notifier::{Notifier, NotifyError};
