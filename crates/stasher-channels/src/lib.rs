//! Operator-facing chat interface for Energy Stasher.
//!
//! Only Telegram is supported. Everything an operator can do here goes
//! through the same task store the poll loop uses.

pub mod dialog;
pub mod operator;
pub mod telegram;

pub use operator::{Operator, Reply, run_operator};
pub use telegram::{Keyboard, TelegramClient};
