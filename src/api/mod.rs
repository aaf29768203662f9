//! HTTP/JSON API.
//!
//! Exposes the schedule and coverage services under `/api/`. Caller identity
//! comes from the upstream proxy headers; permissions from `CoreState`'s
//! access policy.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::{api_router, api_router_with_ctx};
pub use server::{start_api_server, ApiServer, ServerError};
pub use types::ApiContext;
