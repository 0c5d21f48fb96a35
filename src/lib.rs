//! Inbox viewer — searches a mail backend, enriches each email with an
//! AI category and suggested reply, and shows the result as a table.

pub mod api;
pub mod cli;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod model;
pub mod session;
pub mod view;
