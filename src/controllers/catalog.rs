use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::{
    cache::seats::SeatsLookup,
    error::{AppError, AppResult},
    models::{Booking, CatalogItem, Showing},
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/catalog", get(catalog))
        .route("/book/{item_id}", get(item_detail))
        .route("/api/booked-seats/{item_id}", get(booked_seats))
}

/// Занятые места на текущем сеансе позиции: сначала кеш, потом БД.
pub async fn load_booked_seats(state: &AppState, item: &CatalogItem) -> AppResult<Vec<String>> {
    let version = match state.cache.get_booked_seats(item.id).await {
        SeatsLookup::Hit(seats) => {
            debug!("Seats cache hit for item {}", item.id);
            return Ok(seats);
        }
        SeatsLookup::Miss { version } => Some(version),
        SeatsLookup::Unavailable => None,
    };

    let seats = Booking::booked_seats(&state.db.pool, item.id, &item.showing()).await?;
    if let Some(version) = version {
        state.cache.cache_booked_seats(item.id, version, &seats).await;
    }
    Ok(seats)
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub movies: Vec<CatalogItem>,
    pub concerts: Vec<CatalogItem>,
    pub plays: Vec<CatalogItem>,
}

// GET /api/catalog
async fn catalog(State(state): State<Arc<AppState>>) -> AppResult<Json<CatalogResponse>> {
    let pool = &state.db.pool;
    let movies = CatalogItem::by_category(pool, "Movie", None).await?;
    let concerts = CatalogItem::by_category(pool, "Concert", None).await?;

    // Старые записи хранят категорию во множественном числе
    let mut plays = CatalogItem::by_category(pool, "Play", None).await?;
    if plays.is_empty() {
        plays = CatalogItem::by_category(pool, "Plays", None).await?;
    }

    Ok(Json(CatalogResponse { movies, concerts, plays }))
}

#[derive(Debug, Serialize)]
pub struct ItemDetailResponse {
    pub item: CatalogItem,
    pub showing: Showing,
    pub booked_seats: Vec<String>,
}

// GET /book/{item_id}
async fn item_detail(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<i64>,
) -> AppResult<Json<ItemDetailResponse>> {
    let item = CatalogItem::find(&state.db.pool, item_id)
        .await?
        .ok_or_else(|| AppError::not_found("Catalog item"))?;
    let booked_seats = load_booked_seats(&state, &item).await?;

    Ok(Json(ItemDetailResponse {
        showing: item.showing(),
        item,
        booked_seats,
    }))
}

#[derive(Debug, Serialize)]
pub struct BookedSeatsResponse {
    pub booked_seats: Vec<String>,
}

// GET /api/booked-seats/{item_id}
async fn booked_seats(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<i64>,
) -> AppResult<Json<BookedSeatsResponse>> {
    let item = CatalogItem::find(&state.db.pool, item_id)
        .await?
        .ok_or_else(|| AppError::not_found("Catalog item"))?;
    let booked_seats = load_booked_seats(&state, &item).await?;
    Ok(Json(BookedSeatsResponse { booked_seats }))
}
