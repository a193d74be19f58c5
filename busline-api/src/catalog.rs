use axum::{extract::State, routing::get, Json, Router};
use busline_core::Route;
use crate::{error::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/routes", get(list_routes))
}

/// Active routes, for the search form.
async fn list_routes(State(state): State<AppState>) -> Result<Json<Vec<Route>>, AppError> {
    let routes = state
        .catalog
        .routes()
        .await
        .map_err(busline_booking::BookingError::from)?;
    Ok(Json(routes))
}
