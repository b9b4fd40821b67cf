use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use homefinder_shared::errors::{AppError, AppResult, ErrorCode};
use homefinder_shared::middleware::auth_extractor::OptionalAuthUser;
use homefinder_shared::types::auth::AuthUser;
use homefinder_shared::types::pagination::{Paginated, PaginationParams};
use homefinder_shared::types::ApiResponse;

use crate::models::{
    NewProperty, Property, PropertyChangeset, PROPERTY_TYPES, TRANSACTION_TYPES,
};
use crate::schema::{favorites, properties};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyFilters {
    pub city: Option<String>,
    #[serde(rename = "type")]
    pub property_type: Option<String>,
    pub transaction: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rooms: Option<i32>,
    pub min_surface: Option<f64>,
    // Query-string deserialization cannot flatten PaginationParams, so the
    // fields are repeated here.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PropertyFilters {
    fn pagination(&self) -> PaginationParams {
        let defaults = PaginationParams::default();
        PaginationParams {
            limit: self.limit.unwrap_or(defaults.limit),
            offset: self.offset.unwrap_or(defaults.offset),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRequest {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub property_type: String,
    pub transaction: String,
    pub price: f64,
    pub surface: f64,
    pub rooms: i32,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub address: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AnnotatedProperty {
    #[serde(flatten)]
    pub property: Property,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

fn validate_listing(req: &PropertyRequest) -> AppResult<()> {
    if req.title.trim().is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "title must not be empty"));
    }
    if !PROPERTY_TYPES.contains(&req.property_type.as_str()) {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            format!("type must be one of: {}", PROPERTY_TYPES.join(", ")),
        ));
    }
    if !TRANSACTION_TYPES.contains(&req.transaction.as_str()) {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            format!("transaction must be one of: {}", TRANSACTION_TYPES.join(", ")),
        ));
    }
    if req.price <= 0.0 {
        return Err(AppError::new(ErrorCode::ValidationError, "price must be positive"));
    }
    if req.surface <= 0.0 {
        return Err(AppError::new(ErrorCode::ValidationError, "surface must be positive"));
    }
    if req.rooms < 1 {
        return Err(AppError::new(ErrorCode::ValidationError, "rooms must be at least 1"));
    }
    Ok(())
}

fn load_owned_property(
    conn: &mut PgConnection,
    property_id: Uuid,
    user_id: Uuid,
) -> AppResult<Property> {
    let property: Property = properties::table
        .find(property_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::PropertyNotFound, "property not found"))?;

    if property.owner_id != user_id {
        return Err(AppError::new(ErrorCode::NotPropertyOwner, "you do not own this property"));
    }
    Ok(property)
}

/// GET /api/properties - public listing with filters; authenticated callers
/// additionally get the favorite annotation.
pub async fn list_properties(
    OptionalAuthUser(auth_user): OptionalAuthUser,
    State(state): State<Arc<AppState>>,
    Query(filters): Query<PropertyFilters>,
) -> AppResult<Json<ApiResponse<Paginated<AnnotatedProperty>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let mut query = properties::table.into_boxed();
    let mut count_query = properties::table.into_boxed();

    if let Some(city) = &filters.city {
        query = query.filter(properties::city.eq(city.clone()));
        count_query = count_query.filter(properties::city.eq(city.clone()));
    }
    if let Some(property_type) = &filters.property_type {
        query = query.filter(properties::property_type.eq(property_type.clone()));
        count_query = count_query.filter(properties::property_type.eq(property_type.clone()));
    }
    if let Some(transaction) = &filters.transaction {
        query = query.filter(properties::transaction_type.eq(transaction.clone()));
        count_query = count_query.filter(properties::transaction_type.eq(transaction.clone()));
    }
    if let Some(min_price) = filters.min_price {
        query = query.filter(properties::price.ge(min_price));
        count_query = count_query.filter(properties::price.ge(min_price));
    }
    if let Some(max_price) = filters.max_price {
        query = query.filter(properties::price.le(max_price));
        count_query = count_query.filter(properties::price.le(max_price));
    }
    if let Some(min_rooms) = filters.min_rooms {
        query = query.filter(properties::rooms.ge(min_rooms));
        count_query = count_query.filter(properties::rooms.ge(min_rooms));
    }
    if let Some(min_surface) = filters.min_surface {
        query = query.filter(properties::surface.ge(min_surface));
        count_query = count_query.filter(properties::surface.ge(min_surface));
    }

    let total: i64 = count_query.select(count_star()).first(&mut conn)?;

    let items: Vec<Property> = query
        .order(properties::created_at.desc())
        .offset(filters.pagination().offset())
        .limit(filters.pagination().limit())
        .load(&mut conn)?;

    let favorite_ids: HashSet<Uuid> = match &auth_user {
        Some(user) => favorites::table
            .filter(favorites::user_id.eq(user.id))
            .select(favorites::property_id)
            .load::<Uuid>(&mut conn)?
            .into_iter()
            .collect(),
        None => HashSet::new(),
    };

    let annotated: Vec<AnnotatedProperty> = items
        .into_iter()
        .map(|property| AnnotatedProperty {
            is_favorite: auth_user.as_ref().map(|_| favorite_ids.contains(&property.id)),
            property,
        })
        .collect();

    Ok(Json(ApiResponse::ok(Paginated::new(annotated, total, &filters.pagination()))))
}

/// GET /api/properties/:id
pub async fn get_property(
    OptionalAuthUser(auth_user): OptionalAuthUser,
    State(state): State<Arc<AppState>>,
    Path(property_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<AnnotatedProperty>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let property: Property = properties::table
        .find(property_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::PropertyNotFound, "property not found"))?;

    let is_favorite = match &auth_user {
        Some(user) => {
            let count: i64 = favorites::table
                .filter(favorites::user_id.eq(user.id))
                .filter(favorites::property_id.eq(property_id))
                .select(count_star())
                .first(&mut conn)?;
            Some(count > 0)
        }
        None => None,
    };

    Ok(Json(ApiResponse::ok(AnnotatedProperty { property, is_favorite })))
}

/// POST /api/properties
pub async fn create_property(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<PropertyRequest>,
) -> AppResult<Json<ApiResponse<Property>>> {
    validate_listing(&req)?;

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let property: Property = diesel::insert_into(properties::table)
        .values(NewProperty {
            title: req.title.trim().to_string(),
            description: req.description,
            property_type: req.property_type,
            transaction_type: req.transaction,
            price: req.price,
            surface: req.surface,
            rooms: req.rooms,
            bedrooms: req.bedrooms,
            bathrooms: req.bathrooms,
            address: req.address,
            city: req.city,
            latitude: req.latitude,
            longitude: req.longitude,
            images: req.images,
            owner_id: auth_user.id,
        })
        .get_result(&mut conn)?;

    tracing::info!(property_id = %property.id, owner = %auth_user.id, "property listed");

    Ok(Json(ApiResponse::ok(property)))
}

/// PUT /api/properties/:id - owner only
pub async fn update_property(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(property_id): Path<Uuid>,
    Json(req): Json<PropertyRequest>,
) -> AppResult<Json<ApiResponse<Property>>> {
    validate_listing(&req)?;

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    load_owned_property(&mut conn, property_id, auth_user.id)?;

    let updated: Property = diesel::update(properties::table.find(property_id))
        .set(PropertyChangeset {
            title: req.title.trim().to_string(),
            description: req.description,
            property_type: req.property_type,
            transaction_type: req.transaction,
            price: req.price,
            surface: req.surface,
            rooms: req.rooms,
            bedrooms: req.bedrooms,
            bathrooms: req.bathrooms,
            address: req.address,
            city: req.city,
            latitude: req.latitude,
            longitude: req.longitude,
            updated_at: Utc::now(),
        })
        .get_result(&mut conn)?;

    Ok(Json(ApiResponse::ok(updated)))
}

/// DELETE /api/properties/:id - owner only
pub async fn delete_property(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(property_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    load_owned_property(&mut conn, property_id, auth_user.id)?;

    diesel::delete(properties::table.find(property_id)).execute(&mut conn)?;

    tracing::info!(property_id = %property_id, owner = %auth_user.id, "property removed");

    Ok(Json(ApiResponse::ok_with_message(
        serde_json::json!({ "deleted": true }),
        "property deleted",
    )))
}
