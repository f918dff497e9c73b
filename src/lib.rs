//! Relays newly listed governance proposals to a Telegram chat.
//!
//! A run loads the set of already-announced proposal IDs, fetches the current
//! list from Koios, announces anything unseen, and saves the grown set.

pub mod config;
pub mod notifier;
pub mod pipeline;
pub mod proposals;
pub mod store;
