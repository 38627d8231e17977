use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use lodge_booking::{CreateBookingRequest, RoomRequest};
use lodge_shared::pii::Masked;
use lodge_shared::{Booking, BookingFilter, BookingPage, BookingRoomWithLock, BookingStatus, GuestInfoUpdate};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Caller;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u64 = 20;

#[derive(Debug, Deserialize)]
pub struct CreateBookingBody {
    pub hotel_id: Uuid,
    #[serde(deserialize_with = "stay_date")]
    pub check_in: NaiveDate,
    #[serde(deserialize_with = "stay_date")]
    pub check_out: NaiveDate,
    pub guest_name: String,
    #[serde(default)]
    pub guest_email: Option<Masked<String>>,
    #[serde(default)]
    pub guest_phone: Option<Masked<String>>,
    pub currency: String,
    #[serde(default)]
    pub expected_total: Option<Decimal>,
    pub rooms: Vec<RoomRequest>,
}

impl CreateBookingBody {
    fn into_request(self, user_id: i64) -> CreateBookingRequest {
        CreateBookingRequest {
            user_id,
            hotel_id: self.hotel_id,
            check_in: self.check_in,
            check_out: self.check_out,
            guest_name: self.guest_name,
            guest_email: self.guest_email,
            guest_phone: self.guest_phone,
            currency: self.currency,
            expected_total: self.expected_total,
            rooms: self.rooms,
        }
    }
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp; timestamps are truncated
/// to their calendar day in UTC.
fn stay_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: BookingStatus,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub user_id: Option<i64>,
    pub hotel_id: Option<Uuid>,
    pub status: Option<BookingStatus>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking).get(list_bookings))
        .route("/v1/bookings/{id}", get(get_booking).delete(delete_booking))
        .route("/v1/bookings/{id}/status", patch(update_status))
        .route("/v1/bookings/{id}/guest", patch(update_guest))
        .route("/v1/bookings/{id}/rooms", get(get_booking_rooms))
}

async fn create_booking(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<CreateBookingBody>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let cancel = state.shutdown.child_token();
    let booking = state
        .engine
        .create_booking(body.into_request(caller.user_id), &cancel)
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

async fn list_bookings(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<ListParams>,
) -> Result<Json<BookingPage>, AppError> {
    let user_id = if caller.is_admin() {
        params.user_id
    } else {
        if params.user_id.is_some_and(|id| id != caller.user_id) {
            return Err(AppError::AuthorizationError("Cannot list another user's bookings".to_string()));
        }
        Some(caller.user_id)
    };

    let filter = BookingFilter {
        user_id,
        hotel_id: params.hotel_id,
        status: params.status,
    };
    let page = state
        .engine
        .list_bookings(
            &filter,
            params.page.unwrap_or(1),
            params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;

    Ok(Json(page))
}

async fn get_booking(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.engine.get_booking(id).await?;
    caller.ensure_owner(booking.user_id)?;
    Ok(Json(booking))
}

async fn update_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> Result<Json<Booking>, AppError> {
    let current = state.engine.get_booking(id).await?;
    caller.ensure_owner(current.user_id)?;

    let cancel = state.shutdown.child_token();
    let booking = state.engine.update_booking_status(id, body.status, &cancel).await?;
    info!(booking_id = %id, user_id = caller.user_id, status = %booking.status, "status change accepted");
    Ok(Json(booking))
}

async fn update_guest(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(body): Json<GuestInfoUpdate>,
) -> Result<Json<Booking>, AppError> {
    let current = state.engine.get_booking(id).await?;
    caller.ensure_owner(current.user_id)?;

    let booking = state.engine.update_guest_info(id, body).await?;
    Ok(Json(booking))
}

async fn get_booking_rooms(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<BookingRoomWithLock>>, AppError> {
    let booking = state.engine.get_booking(id).await?;
    caller.ensure_owner(booking.user_id)?;

    let rooms = state.engine.get_booking_rooms(id).await?;
    Ok(Json(rooms))
}

async fn delete_booking(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    caller.ensure_admin()?;
    state.engine.delete_booking(id).await?;
    info!(booking_id = %id, admin_id = caller.user_id, "booking deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}
