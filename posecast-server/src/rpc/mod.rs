//! Command handling: envelope decoding, parameter validation and dispatch
//! to the job controller.

mod dispatcher;
pub mod error;
pub mod params;

pub use dispatcher::{Dispatcher, Reply};
pub use error::{ErrorKind, RpcError, ValidationError};
