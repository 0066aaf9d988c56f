//! # MirrorDB Protocol
//!
//! Data contract for the MirrorDB posts mirror.
//!
//! This crate provides:
//! - The `Post` entity and its identifier type
//! - Draft and patch types for create/update requests
//! - Boundary validation for values crossing the sync boundary
//! - JSON wire envelopes matching the external posts API

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod post;
mod wire;

pub use error::{ProtocolError, ProtocolResult};
pub use post::{Post, PostDraft, PostId, PostPatch, DEFAULT_AUTHOR};
pub use wire::{
    CreatePostRequest, DeleteEnvelope, ListEnvelope, PostEnvelope, UpdatePostRequest, WireMessage,
};
