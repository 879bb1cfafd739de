//! Chainflow CLI library half: command implementations shared by the
//! `chainflow` binary and its integration tests.

pub mod commands;
