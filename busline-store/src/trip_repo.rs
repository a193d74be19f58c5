use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;
use sqlx::PgPool;
use busline_core::repository::TripRepository;
use busline_core::{StatusFilter, StoreError, StoreResult, Trip, TripStatus};
use crate::database::db_err;

pub struct PgTripRepository {
    pool: PgPool,
}

impl PgTripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    route_id: Uuid,
    bus_id: Uuid,
    trip_date: NaiveDate,
    departure_time: NaiveTime,
    arrival_time: NaiveTime,
    status: String,
    available_seats: i32,
}

impl TryFrom<TripRow> for Trip {
    type Error = StoreError;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        let status = TripStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Backend(format!("Unknown trip status '{}' on {}", row.status, row.id)))?;

        Ok(Trip {
            id: row.id,
            route_id: row.route_id,
            bus_id: row.bus_id,
            trip_date: row.trip_date,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            status,
            available_seats: row.available_seats.max(0) as u32,
        })
    }
}

#[async_trait]
impl TripRepository for PgTripRepository {
    async fn find_trips(
        &self,
        route_id: Uuid,
        date: NaiveDate,
        status_filter: StatusFilter,
    ) -> StoreResult<Vec<Trip>> {
        let (clause, status) = match status_filter {
            StatusFilter::NotCancelled => ("status <> $3", TripStatus::Cancelled),
            StatusFilter::Only(wanted) => ("status = $3", wanted),
        };

        let sql = format!(
            r#"
            SELECT id, route_id, bus_id, trip_date, departure_time, arrival_time, status, available_seats
            FROM trips
            WHERE route_id = $1 AND trip_date = $2 AND {}
            ORDER BY departure_time
            "#,
            clause
        );

        let rows: Vec<TripRow> = sqlx::query_as(&sql)
            .bind(route_id)
            .bind(date)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(Trip::try_from).collect()
    }
}
