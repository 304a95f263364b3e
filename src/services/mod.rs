//! Collaborator services consumed by the websocket handshake.
//!
//! ARCHITECTURE
//! ============
//! The wider product (accounts, storage, spaces) lives elsewhere; these
//! modules are the narrow read-only interfaces the coordination core is
//! allowed to touch: token → identity, picture/space lookup, and the
//! edit-capability predicate.

pub mod access;
pub mod picture;
pub mod session;
