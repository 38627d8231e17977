use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use lodge_core::{CoreError, CoreResult, ReservationStore, Transaction};
use lodge_shared::pii::Masked;
use lodge_shared::{
    Booking, BookingFilter, BookingPage, BookingRoom, BookingRoomWithLock, BookingStatus,
    GuestInfoUpdate, NewBooking, NewBookingRoom, NewRoomLock, RoomLock, StayRange,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// SQLSTATE raised by the `room_lock_no_overlap` exclusion constraint.
const EXCLUSION_VIOLATION: &str = "23P01";

const BOOKING_COLUMNS: &str = "id, user_id, hotel_id, check_in, check_out, status, guest_name, \
     guest_email, guest_phone, currency, expected_total, final_total, created_at, updated_at";

const ROOM_LOCK_COLUMNS: &str = "id, room_id, booking_id, lower(stay_range) AS stay_start, \
     upper(stay_range) AS stay_end, expires_at, is_active, is_confirmed, created_at";

pub struct PgTransaction {
    inner: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(self) -> CoreResult<()> {
        self.inner.commit().await.map_err(db_error)
    }

    async fn rollback(self) -> CoreResult<()> {
        self.inner.rollback().await.map_err(db_error)
    }
}

pub struct PgReservationStore {
    pool: PgPool,
}

impl PgReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: i64,
    hotel_id: Uuid,
    check_in: NaiveDate,
    check_out: NaiveDate,
    status: String,
    guest_name: String,
    guest_email: Option<String>,
    guest_phone: Option<String>,
    currency: String,
    expected_total: Option<Decimal>,
    final_total: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<BookingStatus>()
            .map_err(|e| CoreError::InternalServer(e.to_string()))?;

        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            hotel_id: row.hotel_id,
            check_in: row.check_in,
            check_out: row.check_out,
            status,
            guest_name: row.guest_name,
            guest_email: row.guest_email.map(Masked),
            guest_phone: row.guest_phone.map(Masked),
            currency: row.currency,
            expected_total: row.expected_total,
            final_total: row.final_total,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRoomRow {
    id: Uuid,
    booking_id: Uuid,
    room_id: Uuid,
    adults: i16,
    children: i16,
    price_per_night: Decimal,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRoomRow> for BookingRoom {
    type Error = CoreError;

    fn try_from(row: BookingRoomRow) -> Result<Self, Self::Error> {
        Ok(BookingRoom {
            id: row.id,
            booking_id: row.booking_id,
            room_id: row.room_id,
            adults: guest_count(row.adults)?,
            children: guest_count(row.children)?,
            price_per_night: row.price_per_night,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RoomLockRow {
    id: Uuid,
    room_id: Uuid,
    booking_id: Uuid,
    stay_start: NaiveDate,
    stay_end: NaiveDate,
    expires_at: DateTime<Utc>,
    is_active: bool,
    is_confirmed: bool,
    created_at: DateTime<Utc>,
}

impl From<RoomLockRow> for RoomLock {
    fn from(row: RoomLockRow) -> Self {
        RoomLock {
            id: row.id,
            room_id: row.room_id,
            booking_id: row.booking_id,
            stay_range: StayRange::new(row.stay_start, row.stay_end),
            expires_at: row.expires_at,
            is_active: row.is_active,
            confirmed: row.is_confirmed,
            created_at: row.created_at,
        }
    }
}

/// `booking_room LEFT JOIN room_lock`; lock columns are null when no lock row matches.
#[derive(sqlx::FromRow)]
struct BookingRoomLockRow {
    id: Uuid,
    booking_id: Uuid,
    room_id: Uuid,
    adults: i16,
    children: i16,
    price_per_night: Decimal,
    created_at: DateTime<Utc>,
    lock_id: Option<Uuid>,
    lock_stay_start: Option<NaiveDate>,
    lock_stay_end: Option<NaiveDate>,
    lock_expires_at: Option<DateTime<Utc>>,
    lock_is_active: Option<bool>,
    lock_is_confirmed: Option<bool>,
    lock_created_at: Option<DateTime<Utc>>,
}

impl TryFrom<BookingRoomLockRow> for BookingRoomWithLock {
    type Error = CoreError;

    fn try_from(row: BookingRoomLockRow) -> Result<Self, Self::Error> {
        let lock = match (
            row.lock_id,
            row.lock_stay_start,
            row.lock_stay_end,
            row.lock_expires_at,
            row.lock_is_active,
            row.lock_is_confirmed,
            row.lock_created_at,
        ) {
            (
                Some(id),
                Some(start),
                Some(end),
                Some(expires_at),
                Some(is_active),
                Some(confirmed),
                Some(created_at),
            ) => Some(RoomLock {
                id,
                room_id: row.room_id,
                booking_id: row.booking_id,
                stay_range: StayRange::new(start, end),
                expires_at,
                is_active,
                confirmed,
                created_at,
            }),
            _ => None,
        };

        let room = BookingRoomRow {
            id: row.id,
            booking_id: row.booking_id,
            room_id: row.room_id,
            adults: row.adults,
            children: row.children,
            price_per_night: row.price_per_night,
            created_at: row.created_at,
        }
        .try_into()?;

        Ok(BookingRoomWithLock { room, lock })
    }
}

fn guest_count(value: i16) -> CoreResult<u8> {
    u8::try_from(value).map_err(|_| CoreError::InternalServer(format!("guest count out of range: {}", value)))
}

fn db_error(e: sqlx::Error) -> CoreError {
    tracing::error!(error = %e, "database operation failed");
    CoreError::InternalServer(e.to_string())
}

fn is_exclusion_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(EXCLUSION_VIOLATION),
        _ => false,
    }
}

/// Exclusion violations on `room_lock` become `RoomLockAlreadyExist`.
fn lock_error(e: sqlx::Error, room_id: Uuid, booking_id: Uuid) -> CoreError {
    if is_exclusion_violation(&e) {
        tracing::info!(room_id = %room_id, booking_id = %booking_id, "room lock conflict");
        CoreError::RoomLockAlreadyExist { room_id }
    } else {
        db_error(e)
    }
}

fn page_bound(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl ReservationStore for PgReservationStore {
    type Tx = PgTransaction;

    async fn begin_tx(&self) -> CoreResult<PgTransaction> {
        let inner = self.pool.begin().await.map_err(db_error)?;
        Ok(PgTransaction { inner })
    }

    async fn create_booking(&self, tx: &mut PgTransaction, booking: &NewBooking) -> CoreResult<Booking> {
        let sql = format!(
            r#"
            INSERT INTO booking (id, user_id, hotel_id, check_in, check_out, status, guest_name,
                                 guest_email, guest_phone, currency, expected_total, final_total)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );

        let row: BookingRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(booking.user_id)
            .bind(booking.hotel_id)
            .bind(booking.check_in)
            .bind(booking.check_out)
            .bind(BookingStatus::Pending.as_str())
            .bind(&booking.guest_name)
            .bind(booking.guest_email.as_ref().map(|m| m.expose().as_str()))
            .bind(booking.guest_phone.as_ref().map(|m| m.expose().as_str()))
            .bind(&booking.currency)
            .bind(booking.expected_total)
            .bind(booking.final_total)
            .fetch_one(&mut *tx.inner)
            .await
            .map_err(db_error)?;

        row.try_into()
    }

    async fn create_booking_room(
        &self,
        tx: &mut PgTransaction,
        room: &NewBookingRoom,
    ) -> CoreResult<BookingRoom> {
        let row: BookingRoomRow = sqlx::query_as(
            r#"
            INSERT INTO booking_room (id, booking_id, room_id, adults, children, price_per_night)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, booking_id, room_id, adults, children, price_per_night, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(room.booking_id)
        .bind(room.room_id)
        .bind(i16::from(room.adults))
        .bind(i16::from(room.children))
        .bind(room.price_per_night)
        .fetch_one(&mut *tx.inner)
        .await
        .map_err(db_error)?;

        row.try_into()
    }

    async fn create_room_lock(&self, tx: &mut PgTransaction, lock: &NewRoomLock) -> CoreResult<RoomLock> {
        // created_at uses clock_timestamp() so the hold window starts at the
        // insert itself, not at the start of the surrounding transaction.
        let sql = format!(
            r#"
            INSERT INTO room_lock (id, room_id, booking_id, stay_range, expires_at, is_active, created_at)
            VALUES ($1, $2, $3, daterange($4::date, $5::date, '[)'), $6, TRUE, clock_timestamp())
            RETURNING {}
            "#,
            ROOM_LOCK_COLUMNS
        );

        let row: RoomLockRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(lock.room_id)
            .bind(lock.booking_id)
            .bind(lock.stay_range.start)
            .bind(lock.stay_range.end)
            .bind(lock.expires_at)
            .fetch_one(&mut *tx.inner)
            .await
            .map_err(|e| lock_error(e, lock.room_id, lock.booking_id))?;

        Ok(row.into())
    }

    async fn deactivate_locks(&self, tx: &mut PgTransaction, booking_id: Uuid) -> CoreResult<u64> {
        let result = sqlx::query("UPDATE room_lock SET is_active = FALSE WHERE booking_id = $1 AND is_active")
            .bind(booking_id)
            .execute(&mut *tx.inner)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    async fn confirm_locks(&self, tx: &mut PgTransaction, booking_id: Uuid) -> CoreResult<u64> {
        let held: Vec<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT id, room_id FROM room_lock WHERE booking_id = $1 AND is_active ORDER BY id FOR UPDATE",
        )
        .bind(booking_id)
        .fetch_all(&mut *tx.inner)
        .await
        .map_err(db_error)?;

        // One row at a time so a conflict names its room
        for (lock_id, room_id) in &held {
            sqlx::query("UPDATE room_lock SET is_active = FALSE, is_confirmed = TRUE WHERE id = $1")
                .bind(lock_id)
                .execute(&mut *tx.inner)
                .await
                .map_err(|e| lock_error(e, *room_id, booking_id))?;
        }

        Ok(held.len() as u64)
    }

    async fn get_booking_for_update(&self, tx: &mut PgTransaction, id: Uuid) -> CoreResult<Booking> {
        let sql = format!("SELECT {} FROM booking WHERE id = $1 FOR UPDATE", BOOKING_COLUMNS);

        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *tx.inner)
            .await
            .map_err(db_error)?;

        row.ok_or(CoreError::BookingNotFound(id))?.try_into()
    }

    async fn count_live_locks(
        &self,
        tx: &mut PgTransaction,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM room_lock WHERE booking_id = $1 AND is_active AND expires_at > $2",
        )
        .bind(booking_id)
        .bind(now)
        .fetch_one(&mut *tx.inner)
        .await
        .map_err(db_error)?;

        Ok(count.max(0) as u64)
    }

    async fn update_booking_status(
        &self,
        tx: &mut PgTransaction,
        id: Uuid,
        status: BookingStatus,
    ) -> CoreResult<DateTime<Utc>> {
        let updated_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            "UPDATE booking SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING updated_at",
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&mut *tx.inner)
        .await
        .map_err(db_error)?;

        updated_at.ok_or(CoreError::BookingNotFound(id))
    }

    async fn update_guest_info(&self, id: Uuid, update: &GuestInfoUpdate) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE booking
            SET guest_name = $2, guest_email = $3, guest_phone = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&update.guest_name)
        .bind(update.guest_email.as_ref().map(|m| m.expose().as_str()))
        .bind(update.guest_phone.as_ref().map(|m| m.expose().as_str()))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::BookingNotFound(id));
        }
        Ok(())
    }

    async fn delete_booking(&self, id: Uuid) -> CoreResult<()> {
        // booking_room and room_lock rows go with it (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM booking WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::BookingNotFound(id));
        }
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> CoreResult<Booking> {
        let sql = format!("SELECT {} FROM booking WHERE id = $1", BOOKING_COLUMNS);

        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.ok_or(CoreError::BookingNotFound(id))?.try_into()
    }

    async fn get_booking_rooms(&self, booking_id: Uuid) -> CoreResult<Vec<BookingRoomWithLock>> {
        let rows: Vec<BookingRoomLockRow> = sqlx::query_as(
            r#"
            SELECT br.id, br.booking_id, br.room_id, br.adults, br.children,
                   br.price_per_night, br.created_at,
                   rl.id AS lock_id,
                   lower(rl.stay_range) AS lock_stay_start,
                   upper(rl.stay_range) AS lock_stay_end,
                   rl.expires_at AS lock_expires_at,
                   rl.is_active AS lock_is_active,
                   rl.is_confirmed AS lock_is_confirmed,
                   rl.created_at AS lock_created_at
            FROM booking_room br
            LEFT JOIN room_lock rl
                   ON rl.booking_id = br.booking_id AND rl.room_id = br.room_id
            WHERE br.booking_id = $1
            ORDER BY br.created_at, br.id
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(BookingRoomWithLock::try_from).collect()
    }

    async fn list_bookings(
        &self,
        filter: &BookingFilter,
        limit: u64,
        offset: u64,
    ) -> CoreResult<BookingPage> {
        const FILTER: &str = "($1::bigint IS NULL OR user_id = $1) \
             AND ($2::uuid IS NULL OR hotel_id = $2) \
             AND ($3::text IS NULL OR status = $3)";

        let status = filter.status.map(|s| s.as_str());

        let sql = format!(
            "SELECT {} FROM booking WHERE {} ORDER BY created_at DESC, id LIMIT $4 OFFSET $5",
            BOOKING_COLUMNS, FILTER
        );
        let rows: Vec<BookingRow> = sqlx::query_as(&sql)
            .bind(filter.user_id)
            .bind(filter.hotel_id)
            .bind(status)
            .bind(page_bound(limit))
            .bind(page_bound(offset))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        let count_sql = format!("SELECT COUNT(*) FROM booking WHERE {}", FILTER);
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(filter.user_id)
            .bind(filter.hotel_id)
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        let bookings = rows
            .into_iter()
            .map(Booking::try_from)
            .collect::<CoreResult<Vec<Booking>>>()?;

        Ok(BookingPage {
            bookings,
            total_count: total.max(0) as u64,
        })
    }

    async fn find_lapsed_pending_bookings(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> CoreResult<Vec<Uuid>> {
        sqlx::query_scalar(
            r#"
            SELECT b.id FROM booking b
            WHERE b.status = 'PENDING'
              AND NOT EXISTS (
                  SELECT 1 FROM room_lock rl
                  WHERE rl.booking_id = b.id AND rl.is_active AND rl.expires_at > $1
              )
            ORDER BY b.created_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(page_bound(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn deactivate_expired_locks(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let result = sqlx::query("UPDATE room_lock SET is_active = FALSE WHERE is_active AND expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected())
    }
}
