mod admin;
mod convert;
mod handler;
mod request;

pub use admin::{serve_admin, AdminClient, AdminReply};
pub use handler::TopologyManagementRequestsHandler;
pub use request::{TopologyChangeResponse, TopologyManagementRequest, TopologyManagementResponse};
