pub mod api;
pub mod gate;

pub use api::{ApiClient, ApiError};
pub use gate::{AuthGate, AuthSnapshot, GateOptions, GateState, GateView, Navigator, SessionUser};
