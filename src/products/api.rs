use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use bigdecimal::{BigDecimal, Zero};
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;

use super::{
    load_productos, low_stock, Categoria, NewCategoria, NewProducto, NewUnidadMedida,
    ProductoChanges, ProductoDetalle, ProductoFilter, UnidadMedida,
};
use crate::core::shared::schema::{categorias, productos, unidades_medida};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{money, require_non_empty, with_conn};
use crate::core::shared::ApiError;

const CATEGORIA_NOT_FOUND: &str = "Categoría no encontrada";
const UNIDAD_NOT_FOUND: &str = "Unidad de medida no encontrada";
const PRODUCTO_NOT_FOUND: &str = "Producto no encontrado";

#[derive(Debug, Deserialize)]
pub struct CategoriaRequest {
    pub nombre_categoria: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnidadRequest {
    pub unidad: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductoRequest {
    pub nombre: String,
    pub descripcion: Option<String>,
    pub sku: Option<String>,
    pub precio_venta: f64,
    pub costo: f64,
    pub id_unidad: i32,
    pub id_categoria: i32,
    pub activo: Option<bool>,
    pub stock_minimo: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductoRequest {
    pub nombre: Option<String>,
    pub descripcion: Option<String>,
    pub sku: Option<String>,
    pub precio_venta: Option<f64>,
    pub costo: Option<f64>,
    pub id_unidad: Option<i32>,
    pub id_categoria: Option<i32>,
    pub activo: Option<bool>,
    pub stock_minimo: Option<f64>,
}

impl CreateProductoRequest {
    pub fn into_new(self) -> Result<NewProducto, ApiError> {
        require_non_empty(&self.nombre, "nombre")?;
        Ok(NewProducto {
            nombre: self.nombre.trim().to_string(),
            descripcion: self.descripcion.unwrap_or_default(),
            sku: self.sku.filter(|s| !s.trim().is_empty()),
            precio_venta: money(self.precio_venta, "precio_venta")?,
            costo: money(self.costo, "costo")?,
            id_unidad: self.id_unidad,
            id_categoria: self.id_categoria,
            activo: self.activo.unwrap_or(true),
            stock_minimo: match self.stock_minimo {
                Some(v) => money(v, "stock_minimo")?,
                None => BigDecimal::zero(),
            },
        })
    }
}

impl UpdateProductoRequest {
    pub fn into_changes(self) -> Result<ProductoChanges, ApiError> {
        if let Some(nombre) = &self.nombre {
            require_non_empty(nombre, "nombre")?;
        }
        Ok(ProductoChanges {
            nombre: self.nombre.map(|n| n.trim().to_string()),
            descripcion: self.descripcion,
            sku: self.sku.map(|s| Some(s).filter(|s| !s.trim().is_empty())),
            precio_venta: self
                .precio_venta
                .map(|v| money(v, "precio_venta"))
                .transpose()?,
            costo: self.costo.map(|v| money(v, "costo")).transpose()?,
            id_unidad: self.id_unidad,
            id_categoria: self.id_categoria,
            activo: self.activo,
            stock_minimo: self
                .stock_minimo
                .map(|v| money(v, "stock_minimo"))
                .transpose()?,
        })
    }
}

pub async fn list_categorias(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Categoria>>, ApiError> {
    let items = with_conn(&state.conn, |conn| {
        Ok(categorias::table
            .order(categorias::id_categoria.asc())
            .select(Categoria::as_select())
            .load(conn)?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn get_categoria(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<Categoria>, ApiError> {
    let item = with_conn(&state.conn, move |conn| {
        categorias::table
            .find(id)
            .select(Categoria::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found(CATEGORIA_NOT_FOUND))
    })
    .await?;
    Ok(Json(item))
}

pub async fn create_categoria(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CategoriaRequest>,
) -> Result<(StatusCode, Json<Categoria>), ApiError> {
    let nombre = req.nombre_categoria.unwrap_or_default();
    require_non_empty(&nombre, "nombre_categoria")?;
    let item = with_conn(&state.conn, move |conn| {
        Ok(diesel::insert_into(categorias::table)
            .values(&NewCategoria {
                nombre_categoria: nombre.trim().to_string(),
            })
            .returning(Categoria::as_returning())
            .get_result(conn)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_categoria(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(req): Json<CategoriaRequest>,
) -> Result<Json<Categoria>, ApiError> {
    if let Some(nombre) = &req.nombre_categoria {
        require_non_empty(nombre, "nombre_categoria")?;
    }
    let item = with_conn(&state.conn, move |conn| {
        let current: Categoria = categorias::table
            .find(id)
            .select(Categoria::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found(CATEGORIA_NOT_FOUND))?;
        let Some(nombre) = req.nombre_categoria else {
            return Ok(current);
        };
        Ok(diesel::update(categorias::table.find(id))
            .set(categorias::nombre_categoria.eq(nombre.trim()))
            .returning(Categoria::as_returning())
            .get_result(conn)?)
    })
    .await?;
    Ok(Json(item))
}

pub async fn delete_categoria(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    with_conn(&state.conn, move |conn| {
        let deleted = diesel::delete(categorias::table.find(id)).execute(conn)?;
        if deleted == 0 {
            return Err(ApiError::not_found(CATEGORIA_NOT_FOUND));
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_unidades(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UnidadMedida>>, ApiError> {
    let items = with_conn(&state.conn, |conn| {
        Ok(unidades_medida::table
            .order(unidades_medida::id_unidad.asc())
            .select(UnidadMedida::as_select())
            .load(conn)?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn get_unidad(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<UnidadMedida>, ApiError> {
    let item = with_conn(&state.conn, move |conn| {
        unidades_medida::table
            .find(id)
            .select(UnidadMedida::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found(UNIDAD_NOT_FOUND))
    })
    .await?;
    Ok(Json(item))
}

pub async fn create_unidad(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UnidadRequest>,
) -> Result<(StatusCode, Json<UnidadMedida>), ApiError> {
    let unidad = req.unidad.unwrap_or_default();
    require_non_empty(&unidad, "unidad")?;
    let item = with_conn(&state.conn, move |conn| {
        Ok(diesel::insert_into(unidades_medida::table)
            .values(&NewUnidadMedida {
                unidad: unidad.trim().to_string(),
            })
            .returning(UnidadMedida::as_returning())
            .get_result(conn)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_unidad(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(req): Json<UnidadRequest>,
) -> Result<Json<UnidadMedida>, ApiError> {
    if let Some(unidad) = &req.unidad {
        require_non_empty(unidad, "unidad")?;
    }
    let item = with_conn(&state.conn, move |conn| {
        let current: UnidadMedida = unidades_medida::table
            .find(id)
            .select(UnidadMedida::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found(UNIDAD_NOT_FOUND))?;
        let Some(unidad) = req.unidad else {
            return Ok(current);
        };
        Ok(diesel::update(unidades_medida::table.find(id))
            .set(unidades_medida::unidad.eq(unidad.trim()))
            .returning(UnidadMedida::as_returning())
            .get_result(conn)?)
    })
    .await?;
    Ok(Json(item))
}

pub async fn delete_unidad(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    with_conn(&state.conn, move |conn| {
        let deleted = diesel::delete(unidades_medida::table.find(id)).execute(conn)?;
        if deleted == 0 {
            return Err(ApiError::not_found(UNIDAD_NOT_FOUND));
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn first_producto(
    conn: &mut PgConnection,
    id: i32,
) -> Result<ProductoDetalle, ApiError> {
    load_productos(conn, ProductoFilter::Id(id))?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found(PRODUCTO_NOT_FOUND))
}

pub async fn list_productos(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProductoDetalle>>, ApiError> {
    let items = with_conn(&state.conn, |conn| {
        Ok(load_productos(conn, ProductoFilter::Todos)?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn list_productos_activos(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProductoDetalle>>, ApiError> {
    let items = with_conn(&state.conn, |conn| {
        Ok(load_productos(conn, ProductoFilter::Activos)?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn list_productos_by_categoria(
    State(state): State<Arc<AppState>>,
    Path(categoria_id): Path<i32>,
) -> Result<Json<Vec<ProductoDetalle>>, ApiError> {
    let items = with_conn(&state.conn, move |conn| {
        Ok(load_productos(conn, ProductoFilter::Categoria(categoria_id))?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn list_productos_stock_bajo(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProductoDetalle>>, ApiError> {
    let items = with_conn(&state.conn, |conn| {
        Ok(low_stock(load_productos(conn, ProductoFilter::Activos)?))
    })
    .await?;
    Ok(Json(items))
}

pub async fn get_producto(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ProductoDetalle>, ApiError> {
    let item = with_conn(&state.conn, move |conn| first_producto(conn, id)).await?;
    Ok(Json(item))
}

pub async fn create_producto(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProductoRequest>,
) -> Result<(StatusCode, Json<ProductoDetalle>), ApiError> {
    let new = req.into_new()?;
    let item = with_conn(&state.conn, move |conn| {
        let id: i32 = diesel::insert_into(productos::table)
            .values(&new)
            .returning(productos::id_producto)
            .get_result(conn)?;
        log::info!("Producto {id} creado: {}", new.nombre);
        first_producto(conn, id)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_producto(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(req): Json<UpdateProductoRequest>,
) -> Result<Json<ProductoDetalle>, ApiError> {
    let changes = req.into_changes()?;
    let item = with_conn(&state.conn, move |conn| {
        if !changes.is_empty() {
            let updated = diesel::update(productos::table.find(id))
                .set(&changes)
                .execute(conn)?;
            if updated == 0 {
                return Err(ApiError::not_found(PRODUCTO_NOT_FOUND));
            }
        }
        first_producto(conn, id)
    })
    .await?;
    Ok(Json(item))
}

pub async fn delete_producto(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    with_conn(&state.conn, move |conn| {
        let deleted = diesel::delete(productos::table.find(id)).execute(conn)?;
        if deleted == 0 {
            return Err(ApiError::not_found(PRODUCTO_NOT_FOUND));
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_catalog_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/categorias", get(list_categorias).post(create_categoria))
        .route(
            "/api/categorias/:id",
            get(get_categoria)
                .put(update_categoria)
                .delete(delete_categoria),
        )
        .route("/api/unidades-medida", get(list_unidades).post(create_unidad))
        .route(
            "/api/unidades-medida/:id",
            get(get_unidad).put(update_unidad).delete(delete_unidad),
        )
        .route("/api/productos", get(list_productos).post(create_producto))
        .route("/api/productos/activos", get(list_productos_activos))
        .route("/api/productos/stock-bajo", get(list_productos_stock_bajo))
        .route(
            "/api/productos/categoria/:categoria_id",
            get(list_productos_by_categoria),
        )
        .route(
            "/api/productos/:id",
            get(get_producto).put(update_producto).delete(delete_producto),
        )
}
