use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::shared::schema::sucursales;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{require_non_empty, with_conn};
use crate::core::shared::ApiError;

const SUCURSAL_NOT_FOUND: &str = "Sucursal no encontrada";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = sucursales, primary_key(id_sucursal))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Sucursal {
    pub id_sucursal: i32,
    pub nombre: String,
    pub direccion: String,
    pub telefono: String,
    pub responsable: String,
    pub activo: bool,
}

#[derive(Debug, Deserialize, Insertable)]
#[diesel(table_name = sucursales)]
pub struct NewSucursal {
    pub nombre: String,
    #[serde(default)]
    pub direccion: String,
    #[serde(default)]
    pub telefono: String,
    #[serde(default)]
    pub responsable: String,
}

#[derive(Debug, Default, PartialEq, Deserialize, AsChangeset)]
#[diesel(table_name = sucursales)]
pub struct SucursalChanges {
    pub nombre: Option<String>,
    pub direccion: Option<String>,
    pub telefono: Option<String>,
    pub responsable: Option<String>,
    pub activo: Option<bool>,
}

pub fn find_sucursal(conn: &mut PgConnection, id: i32) -> Result<Sucursal, ApiError> {
    sucursales::table
        .find(id)
        .select(Sucursal::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found(SUCURSAL_NOT_FOUND))
}

pub async fn list_sucursales(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Sucursal>>, ApiError> {
    let items = with_conn(&state.conn, |conn| {
        Ok(sucursales::table
            .order(sucursales::id_sucursal.asc())
            .select(Sucursal::as_select())
            .load(conn)?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn get_sucursal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<Sucursal>, ApiError> {
    let item = with_conn(&state.conn, move |conn| find_sucursal(conn, id)).await?;
    Ok(Json(item))
}

pub async fn create_sucursal(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSucursal>,
) -> Result<(StatusCode, Json<Sucursal>), ApiError> {
    require_non_empty(&req.nombre, "nombre")?;
    let item = with_conn(&state.conn, move |conn| {
        Ok(diesel::insert_into(sucursales::table)
            .values(&req)
            .returning(Sucursal::as_returning())
            .get_result(conn)?)
    })
    .await?;
    log::info!("Sucursal {} creada", item.id_sucursal);
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_sucursal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(changes): Json<SucursalChanges>,
) -> Result<Json<Sucursal>, ApiError> {
    if let Some(nombre) = &changes.nombre {
        require_non_empty(nombre, "nombre")?;
    }
    let item = with_conn(&state.conn, move |conn| {
        if changes == SucursalChanges::default() {
            return find_sucursal(conn, id);
        }
        diesel::update(sucursales::table.find(id))
            .set(&changes)
            .returning(Sucursal::as_returning())
            .get_result(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found(SUCURSAL_NOT_FOUND))
    })
    .await?;
    Ok(Json(item))
}

pub async fn delete_sucursal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    with_conn(&state.conn, move |conn| {
        let deleted = diesel::delete(sucursales::table.find(id)).execute(conn)?;
        if deleted == 0 {
            return Err(ApiError::not_found(SUCURSAL_NOT_FOUND));
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_branches_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sucursales", get(list_sucursales).post(create_sucursal))
        .route(
            "/api/sucursales/:id",
            get(get_sucursal).put(update_sucursal).delete(delete_sucursal),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sucursal_optional_fields_default_empty() {
        let req: NewSucursal =
            serde_json::from_value(serde_json::json!({ "nombre": "Matriz" })).unwrap();
        assert_eq!(req.nombre, "Matriz");
        assert!(req.direccion.is_empty());
        assert!(req.responsable.is_empty());
    }

    #[test]
    fn test_partial_update_payload() {
        let changes: SucursalChanges =
            serde_json::from_value(serde_json::json!({ "activo": false })).unwrap();
        assert_eq!(changes.activo, Some(false));
        assert_eq!(changes.nombre, None);
        assert_ne!(changes, SucursalChanges::default());
    }
}
