//! Common utilities and types shared across the live-class room crates.

#![warn(clippy::pedantic)]

/// Module for identifier newtypes (rooms, participants, tracks, surfaces)
pub mod types;

/// Module for shared configuration types
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;
