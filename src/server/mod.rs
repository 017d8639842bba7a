//! Server components for the node (handles requests / routes).

pub mod node;
mod router;
mod server;
pub mod settings;

pub use router::*;
pub use server::*;
pub use settings::Settings;
