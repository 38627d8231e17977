use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lodge_core::CoreError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    Anyhow(anyhow::Error),
}

fn classify(err: &CoreError) -> StatusCode {
    match err {
        CoreError::InvalidDates | CoreError::EmptyRoomList | CoreError::Validation(_) => StatusCode::BAD_REQUEST,
        CoreError::PriceChanged { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::RoomLockAlreadyExist { .. }
        | CoreError::ConflictBookingRooms
        | CoreError::InvalidStatusTransition { .. } => StatusCode::CONFLICT,
        CoreError::BookingNotFound(_)
        | CoreError::BookingRoomNotFound(_)
        | CoreError::RoomLockNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::HoldExpired(_) => StatusCode::GONE,
        CoreError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        CoreError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::InternalServer(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Anyhow(err) => match err.downcast_ref::<CoreError>() {
                Some(core) if classify(core) != StatusCode::INTERNAL_SERVER_ERROR => {
                    (classify(core), core.to_string())
                }
                _ => {
                    tracing::error!("Internal Server Error: {:#}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
                }
            },
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}
