pub mod amount;
pub mod config;
pub mod csv;
pub mod engine;
pub mod model;
pub mod notify;
pub mod store;

pub use amount::Amount;
pub use engine::{Engine, EngineError, ErrorKind};
pub use model::{ClientId, Command, PaymentRequest, Status};
