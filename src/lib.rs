//! reeldesk: Telegram helpdesk bot for film/series content requests.
//!
//! A guided button/text flow collects six request fields per user, a
//! formatted ticket card lands in a staff channel, and staff buttons drive
//! the ticket's lifecycle (new → in progress → closed) with requester
//! notifications along the way.
//!
//! ## Design
//! - All mutable state is in-memory and process-lifetime only; one coarse
//!   lock guards it and the poll loop feeds it one update at a time.
//! - Components return outbound [`dispatch::Action`] values instead of
//!   doing I/O inline, so the flow logic is unit-testable without a live
//!   transport.
//! - Collaborator failures (transport edits, the card formatter) are
//!   absorbed at the dispatch layer and never corrupt registry state.
//! - Abuse control: a 24-hour sliding request cap, a spam-streak block,
//!   group-membership restriction and a local-time request window.

pub mod config;
pub mod dispatch;
pub mod formatter;
pub mod gates;
pub mod intake;
pub mod limits;
pub mod telegram;
pub mod tickets;
