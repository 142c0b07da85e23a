//! Request and response types exchanged between the handlers, the cache
//! storage and the network.

pub mod request;
pub mod response;

pub use request::{Request, RequestKey, RequestMode};
pub use response::Response;
