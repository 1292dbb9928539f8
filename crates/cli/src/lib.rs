//! Command-line front end for the automated messaging client.

pub mod cli;
pub mod commands;
pub mod logging;
