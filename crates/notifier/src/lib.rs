//! Operator-facing alert delivery. Messages are rendered as Telegram HTML by
//! [`format`] and posted by [`TelegramSink`].

pub mod format;
mod telegram;

pub use telegram::TelegramSink;
