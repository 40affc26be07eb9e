//! Listago - storage core of a list keeping app
//!
//! This crate provides the persistence layer and the archive transfer of
//! the `listago` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (List, Listitem, RowId)
//! - [`storage`] - SQLite connection guard, migrations and repository
//! - [`transfer`] - Archive export and import, settings import, progress
//! - [`prefs`] - Preferences store and the collaborators it drives
//! - [`config`] - File locations and the trash retention policy
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod prefs;
pub mod storage;
pub mod transfer;

pub use error::{Error, Result};
