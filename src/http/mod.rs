//! HTTP surface: admission middleware, routes and server.

pub mod middleware;
pub mod reports;
mod router;
mod server;

pub use middleware::{admission, DENIAL_BODY, UNAVAILABLE_BODY, UNKNOWN_IDENTITY, UNMATCHED_ROUTE};
pub use reports::{Report, ReportError, ReportSource, Row, SnapshotSource};
pub use router::{build_router, AppState};
pub use server::HttpServer;
