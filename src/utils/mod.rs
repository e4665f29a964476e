//! Shared helpers for digesting and authenticating relayed requests.

pub mod crypto;
pub mod typed_data;
