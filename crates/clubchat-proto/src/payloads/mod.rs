//! JSON payloads.
//!
//! - [`chat`]: bodies of `MESSAGE` and `SEND` frames
//! - [`rest`]: request and response bodies of the chat REST endpoints

pub mod chat;
pub mod rest;
