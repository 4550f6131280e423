pub mod config;
pub mod error;
pub mod google;
pub mod server;
pub mod share_url;
pub mod tasks;

pub use error::FerryError;
pub use server::router::{FerryState, ferry_router};
