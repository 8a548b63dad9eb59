//! Server process supervision and the console line protocol.

mod builder;
mod bus;
mod error;
mod instance;
mod lines;
mod process;
mod protocol;
mod query;
mod state;
mod waiter;

pub use builder::*;
pub use bus::*;
pub use error::*;
pub use instance::*;
pub use lines::*;
pub use process::*;
pub use protocol::*;
pub use query::*;
pub use state::*;
pub use waiter::{each, when, LineMatch};
