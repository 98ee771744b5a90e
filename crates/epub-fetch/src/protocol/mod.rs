//! Client for the JSON request/response debugging protocol carried over a websocket.

pub mod evaluate;
pub mod message;
pub mod session;
pub mod shared;

pub use evaluate::{evaluator_for, Evaluator, FetchKind, PerCallEvaluator, SharedEvaluator};
pub use session::ProtocolSession;
pub use shared::SharedSession;
