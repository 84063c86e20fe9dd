//! # Carelink Manager
//!
//! The public connection handle: lifecycle, room membership and the
//! outbound message/typing operations.

pub mod manager;

pub use manager::ConnectionManager;
