pub mod request;
pub mod response;
pub mod routes;

pub use request::{EvaluationRequest, RequestError};
pub use response::{ErrorResponse, EvaluationResponse};
pub use routes::{create_router, AppState};
