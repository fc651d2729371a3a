//! Access control and event registration for the campus ministry app.
//!
//! Invite codes grant roles and bind them to one device; events enforce a
//! capacity with a FIFO waiting list. All shared state lives in a document
//! store and changes through single-document transactions.

pub mod config;
pub mod models;
pub mod services;
pub mod startup;
