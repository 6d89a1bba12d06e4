//! HTTP endpoint layer on `actix-web`.

pub mod context;
pub mod handlers;

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};

use crate::core::config::ServerConfig;
use crate::core::errors::{PsError, Result};

pub use context::{AppContext, PredictRequest, PredictResponse, UpdateRequest, UpdateResponse};

/// Register every route. Shared by the real server and the test harness.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/predict", web::post().to(handlers::predict))
        .route("/update", web::post().to(handlers::update))
        .route(
            "/list-db-contents",
            web::get().to(handlers::list_db_contents),
        )
        .route("/health", web::get().to(handlers::health))
        .default_service(web::route().to(handlers::not_found));
}

/// JSON extractor settings: body size cap and JSON-shaped 400 replies.
#[must_use]
pub fn json_config(limit_bytes: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit_bytes)
        .error_handler(handlers::json_error_handler)
}

/// Bind and serve until the process is signalled to stop.
///
/// Runs its own actix system, so call it from plain (non-async) code after the
/// store has been opened.
pub fn run(server: &ServerConfig, ctx: AppContext) -> Result<()> {
    let bind_address = server.bind_address();
    let workers = server.workers;
    let json_limit = server.json_limit_bytes;
    let data = web::Data::new(ctx);

    log::info!("listening on http://{bind_address} with {workers} workers");
    log::info!("routes: POST /predict, POST /update, GET /list-db-contents, GET /health");

    actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .wrap(Logger::default())
                .app_data(data.clone())
                .app_data(json_config(json_limit))
                .configure(routes)
        })
        .workers(workers)
        .bind(&bind_address)
        .map_err(|source| PsError::io(&bind_address, source))?
        .run()
        .await
        .map_err(|err| PsError::Runtime {
            details: format!("http server stopped: {err}"),
        })
    })
}
