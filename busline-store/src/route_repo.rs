use async_trait::async_trait;
use uuid::Uuid;
use sqlx::PgPool;
use busline_core::repository::RouteRepository;
use busline_core::{Route, StoreResult};
use crate::database::db_err;

pub struct PgRouteRepository {
    pool: PgPool,
}

impl PgRouteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RouteRow {
    id: Uuid,
    origin: String,
    destination: String,
    base_fare: i64,
    distance: f64,
    duration: i32,
    active: bool,
}

impl From<RouteRow> for Route {
    fn from(row: RouteRow) -> Self {
        Route {
            id: row.id,
            origin: row.origin,
            destination: row.destination,
            base_fare: row.base_fare,
            distance: row.distance,
            duration: row.duration.max(0) as u32,
            active: row.active,
        }
    }
}

#[async_trait]
impl RouteRepository for PgRouteRepository {
    async fn get_routes(&self) -> StoreResult<Vec<Route>> {
        let rows: Vec<RouteRow> = sqlx::query_as(
            "SELECT id, origin, destination, base_fare, distance, duration, active FROM routes ORDER BY origin, destination",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(Route::from).collect())
    }

    async fn find_route(&self, origin: &str, destination: &str) -> StoreResult<Option<Route>> {
        // Prefer an active record when duplicates exist
        let row: Option<RouteRow> = sqlx::query_as(
            r#"
            SELECT id, origin, destination, base_fare, distance, duration, active
            FROM routes
            WHERE origin = $1 AND destination = $2
            ORDER BY active DESC
            LIMIT 1
            "#,
        )
        .bind(origin)
        .bind(destination)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(Route::from))
    }
}
