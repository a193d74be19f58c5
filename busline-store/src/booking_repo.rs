use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use busline_core::payment::{PaymentMethod, PaymentStatus};
use busline_core::repository::BookingRepository;
use busline_core::{Booking, BookingKind, BookingStatus, StoreError, StoreResult};
use crate::database::db_err;

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const BOOKING_COLUMNS: &str = "id, booking_number, user_id, trip_id, seat_numbers, passenger_count, total_fare, \
    booking_type, status, payment_method, payment_status, is_return_leg, linked_booking_id, \
    cancellation_reason, cancelled_at, booked_at";

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    booking_number: String,
    user_id: String,
    trip_id: Uuid,
    seat_numbers: Vec<i32>,
    passenger_count: i32,
    total_fare: i64,
    booking_type: String,
    status: String,
    payment_method: Option<String>,
    payment_status: String,
    is_return_leg: bool,
    linked_booking_id: Option<Uuid>,
    cancellation_reason: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    booked_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str| StoreError::Backend(format!("Booking {} has invalid {}", row.id, what));

        let kind = BookingKind::from_columns(&row.booking_type, row.linked_booking_id, row.is_return_leg)
            .ok_or_else(|| corrupt("booking_type/link combination"))?;
        let status = BookingStatus::parse(&row.status).ok_or_else(|| corrupt("status"))?;
        let payment_status = PaymentStatus::parse(&row.payment_status).ok_or_else(|| corrupt("payment_status"))?;
        let payment_method = match row.payment_method.as_deref() {
            Some(m) => Some(PaymentMethod::parse(m).ok_or_else(|| corrupt("payment_method"))?),
            None => None,
        };

        Ok(Booking {
            id: row.id,
            booking_number: row.booking_number,
            user_id: row.user_id,
            trip_id: row.trip_id,
            seat_numbers: row.seat_numbers.into_iter().map(|s| s.max(0) as u32).collect(),
            passenger_count: row.passenger_count.max(0) as u32,
            total_fare: row.total_fare,
            kind,
            status,
            payment_method,
            payment_status,
            cancellation_reason: row.cancellation_reason,
            cancelled_at: row.cancelled_at,
            booked_at: row.booked_at,
        })
    }
}

/// Compare-and-decrement of the trip's seat count inside `tx`.
async fn take_seats(
    tx: &mut Transaction<'_, Postgres>,
    trip_id: Uuid,
    requested: u32,
) -> StoreResult<()> {
    let updated: Option<(i32,)> = sqlx::query_as(
        "UPDATE trips SET available_seats = available_seats - $1 WHERE id = $2 AND available_seats >= $1 RETURNING available_seats",
    )
    .bind(requested as i32)
    .bind(trip_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;

    if updated.is_some() {
        return Ok(());
    }

    let current: Option<(i32,)> = sqlx::query_as("SELECT available_seats FROM trips WHERE id = $1")
        .bind(trip_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;

    match current {
        Some((available,)) => Err(StoreError::InsufficientSeats {
            trip_id,
            requested,
            available: available.max(0) as u32,
        }),
        None => Err(StoreError::NotFound(format!("trip {}", trip_id))),
    }
}

async fn insert_row(tx: &mut Transaction<'_, Postgres>, booking: &Booking) -> StoreResult<Booking> {
    let seat_numbers: Vec<i32> = booking.seat_numbers.iter().map(|s| *s as i32).collect();
    let sql = format!(
        r#"
        INSERT INTO bookings ({cols})
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        RETURNING {cols}
        "#,
        cols = BOOKING_COLUMNS
    );

    let row: BookingRow = sqlx::query_as(&sql)
        .bind(booking.id)
        .bind(&booking.booking_number)
        .bind(&booking.user_id)
        .bind(booking.trip_id)
        .bind(seat_numbers)
        .bind(booking.passenger_count as i32)
        .bind(booking.total_fare)
        .bind(booking.booking_type().as_str())
        .bind(booking.status.as_str())
        .bind(booking.payment_method.map(|m| m.as_str()))
        .bind(booking.payment_status.as_str())
        .bind(booking.is_return_leg())
        .bind(booking.linked_booking_id())
        .bind(&booking.cancellation_reason)
        .bind(booking.cancelled_at)
        .bind(booking.booked_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(db_err)?;

    Booking::try_from(row)
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert(&self, booking: &Booking) -> StoreResult<Booking> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        take_seats(&mut tx, booking.trip_id, booking.passenger_count).await?;
        let stored = insert_row(&mut tx, booking).await?;

        tx.commit().await.map_err(db_err)?;
        info!("Booking {} stored for trip {}", stored.booking_number, stored.trip_id);
        Ok(stored)
    }

    async fn insert_linked_pair(
        &self,
        outbound: &Booking,
        inbound: &Booking,
    ) -> StoreResult<(Booking, Booking)> {
        // The self-referencing FK is deferred, so both legs land in one commit.
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        take_seats(&mut tx, outbound.trip_id, outbound.passenger_count).await?;
        take_seats(&mut tx, inbound.trip_id, inbound.passenger_count).await?;
        let first = insert_row(&mut tx, outbound).await?;
        let second = insert_row(&mut tx, inbound).await?;

        tx.commit().await.map_err(db_err)?;
        info!("Linked bookings {} / {} stored", first.booking_number, second.booking_number);
        Ok((first, second))
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Booking::try_from).transpose()
    }

    async fn find_by_number(&self, booking_number: &str) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE booking_number = $1", BOOKING_COLUMNS);
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(booking_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Booking::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY booked_at DESC",
            BOOKING_COLUMNS
        );
        let rows: Vec<BookingRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: BookingStatus,
        reason: Option<String>,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Booking> {
        let allowed_from: Vec<&str> = [BookingStatus::Pending, BookingStatus::Confirmed]
            .into_iter()
            .filter(|from| from.can_transition_to(status))
            .map(|from| from.as_str())
            .collect();

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let sql = format!(
            r#"
            UPDATE bookings
            SET status = $2,
                cancellation_reason = COALESCE($3, cancellation_reason),
                cancelled_at = COALESCE($4, cancelled_at)
            WHERE id = $1 AND status = ANY($5)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );

        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(reason)
            .bind(cancelled_at)
            .bind(&allowed_from)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

        let updated = match row {
            Some(row) => Booking::try_from(row)?,
            None => {
                let current: Option<(String,)> = sqlx::query_as("SELECT status FROM bookings WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_err)?;

                return match current {
                    Some((current,)) => Err(StoreError::InvalidState {
                        booking_id: id,
                        status: BookingStatus::parse(&current)
                            .ok_or_else(|| StoreError::Backend(format!("Booking {} has invalid status", id)))?,
                        requested: status,
                    }),
                    None => Err(StoreError::NotFound(format!("booking {}", id))),
                };
            }
        };

        if status == BookingStatus::Cancelled {
            sqlx::query("UPDATE trips SET available_seats = available_seats + $1 WHERE id = $2")
                .bind(updated.passenger_count as i32)
                .bind(updated.trip_id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(updated)
    }
}
