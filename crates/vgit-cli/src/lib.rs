//! virtual-git CLI library.
//!
//! Subcommand definitions and their output formatting, kept out of `main.rs`
//! so they can be unit tested.

pub mod branch_cmd;
