//! Types shared between the DropSync server and client.

pub mod messages;
pub mod models;

pub use messages::*;
pub use models::*;
