//! HTTP/REST transport.
//!
//! `Handler` (the composition root, [`crate::Handler`]) is shared `Arc`
//! state behind every route; `rest` builds the router and owns request/
//! response shaping.

pub mod rest;
