//! Data Transfer Objects for REST responses.
//!
//! Identifiers and statuses are rendered as plain strings so the OpenAPI
//! document stays independent of the domain types.

pub mod device_dto;
pub mod message_dto;
pub mod session_dto;
pub mod system_dto;

pub use device_dto::*;
pub use message_dto::*;
pub use session_dto::*;
pub use system_dto::*;
