use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use salesgate_auth::{Principal, SalesOperation};

use crate::app::{SharedSales, dto, errors};
use crate::authz::authorize_operation;

pub fn router() -> Router {
    Router::new()
        .route("/sales", get(list_sales).post(create_sale))
        .route("/sales/:id", get(get_sale).post(update_sale).delete(delete_sale))
}

fn parse_body(payload: Result<Json<dto::SaleRequest>, JsonRejection>) -> Result<dto::SaleRequest, Response> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", e.body_text()))
}

pub async fn list_sales(
    Extension(sales): Extension<SharedSales>,
    Extension(principal): Extension<Principal>,
) -> Response {
    if let Err(denied) = authorize_operation(&principal, &SalesOperation::List) {
        return denied;
    }

    match sales.list() {
        Ok(all) => Json(all).into_response(),
        Err(e) => errors::sales_error_to_response(e),
    }
}

pub async fn get_sale(
    Extension(sales): Extension<SharedSales>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = authorize_operation(&principal, &SalesOperation::Read) {
        return denied;
    }

    match sales.get(&id) {
        Ok(Some(sale)) => Json(sale).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        Err(e) => errors::sales_error_to_response(e),
    }
}

pub async fn create_sale(
    Extension(sales): Extension<SharedSales>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<dto::SaleRequest>, JsonRejection>,
) -> Response {
    if let Err(denied) = authorize_operation(&principal, &SalesOperation::Create) {
        return denied;
    }
    let body = match parse_body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    match sales.add(body.into_sale()) {
        Ok(sale) => (StatusCode::CREATED, Json(sale)).into_response(),
        Err(e) => errors::sales_error_to_response(e),
    }
}

pub async fn update_sale(
    Extension(sales): Extension<SharedSales>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    payload: Result<Json<dto::SaleRequest>, JsonRejection>,
) -> Response {
    if let Err(denied) = authorize_operation(&principal, &SalesOperation::Update) {
        return denied;
    }
    let body = match parse_body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    match sales.upsert(&id, body.into_sale()) {
        Ok((sale, _created)) => Json(sale).into_response(),
        Err(e) => errors::sales_error_to_response(e),
    }
}

pub async fn delete_sale(
    Extension(sales): Extension<SharedSales>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = authorize_operation(&principal, &SalesOperation::Delete) {
        return denied;
    }

    match sales.delete(&id) {
        Ok(sale) => Json(sale).into_response(),
        Err(e) => errors::sales_error_to_response(e),
    }
}
