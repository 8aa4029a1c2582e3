//! Wire types shared by the map server and the browser client.

pub mod filter;
pub mod messages;

pub use filter::*;
pub use messages::*;
