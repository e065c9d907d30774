//! The fixed wire contract of the external query surface.
//!
//! The HTTP/GraphQL server, serverless packaging, and message-bus bindings
//! live outside the core; what is fixed here is the two request/response
//! shapes they exchange with it. Node payloads travel as base64 of the raw
//! canonical bytes next to the text form of their CID, so clients can
//! verify every block they receive.

pub mod error;
pub mod messages;

pub use error::{ApiError, ApiResult};
pub use messages::{
    AddBlockReply, AddBlockRequestWire, BlockRecord, ResolveReply, ResolveRequest,
};
