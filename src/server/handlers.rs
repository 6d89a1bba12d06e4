//! Route handlers. Each one hands its work to the blocking pool so SQL and
//! scoring never run on the async executor.

use actix_web::{HttpRequest, HttpResponse, error, web};

use super::context::{AppContext, ErrorBody, PredictRequest, UpdateRequest};
use crate::core::errors::PsError;

fn internal_error(err: &PsError) -> HttpResponse {
    log::error!("{err}");
    let body = ErrorBody::new(err.client_message());
    HttpResponse::InternalServerError().json(body)
}

fn blocking_failure(err: &error::BlockingError) -> HttpResponse {
    log::error!("blocking task failed: {err}");
    let body = ErrorBody::new("internal execution failure");
    HttpResponse::InternalServerError().json(body)
}

/// `POST /predict`
pub async fn predict(ctx: web::Data<AppContext>, body: web::Json<PredictRequest>) -> HttpResponse {
    let ctx = ctx.into_inner();
    let request = body.into_inner();
    match web::block(move || ctx.predict(&request)).await {
        Ok(Ok(reply)) => HttpResponse::Ok().json(reply),
        Ok(Err(err)) => internal_error(&err),
        Err(err) => blocking_failure(&err),
    }
}

/// `POST /update`
pub async fn update(ctx: web::Data<AppContext>, body: web::Json<UpdateRequest>) -> HttpResponse {
    let ctx = ctx.into_inner();
    let request = body.into_inner();
    match web::block(move || ctx.update(&request)).await {
        Ok(Ok(reply)) => HttpResponse::Ok().json(reply),
        Ok(Err(err)) => internal_error(&err),
        Err(err) => blocking_failure(&err),
    }
}

/// `GET /list-db-contents`
pub async fn list_db_contents(ctx: web::Data<AppContext>) -> HttpResponse {
    let ctx = ctx.into_inner();
    match web::block(move || ctx.list()).await {
        Ok(Ok(records)) => HttpResponse::Ok().json(records),
        Ok(Err(err)) => internal_error(&err),
        Err(err) => blocking_failure(&err),
    }
}

/// `GET /health`
pub async fn health(ctx: web::Data<AppContext>) -> HttpResponse {
    HttpResponse::Ok().json(ctx.health())
}

/// Fallback for unknown routes.
pub async fn not_found(req: HttpRequest) -> HttpResponse {
    let message = format!("no route for {} {}", req.method(), req.path());
    HttpResponse::NotFound().json(ErrorBody::new(message))
}

/// Render JSON extractor failures as `{"error": ...}` with status 400.
pub fn json_error_handler(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let message = err.to_string();
    log::warn!("rejected request body: {message}");
    let response = HttpResponse::BadRequest().json(ErrorBody::new(message));
    error::InternalError::from_response(err, response).into()
}
