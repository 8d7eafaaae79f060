#![allow(dead_code)]
#[macro_use]
extern crate diesel;
extern crate dotenvy;

#[macro_use]
extern crate tracing;

pub mod actions;
pub mod broadcast;
pub mod config;
pub mod coordinator;
pub mod elo_worker;
pub mod error;
pub mod exts;
pub mod hoops;
pub mod routing;
pub mod state_manager;

pub use error::AppError;
pub use exts::DepotExt;

use std::time::Duration;

use dotenvy::dotenv;
use salvo::cors::{self, AllowHeaders, Cors};
use salvo::http::Method;
use salvo::logging::Logger;
use salvo::prelude::*;
use tracing_futures::Instrument;
use tracing_subscriber::fmt::format::FmtSpan;

use crate::config::LogFormat;

pub type AppResult<T> = Result<T, AppError>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Err(e) = dotenv() {
        println!("dotenv error: {:?}", e);
    }

    config::init();
    let conf = config::get();

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| conf.rust_log.clone());
    match conf.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .init(),
    }

    decided_data::init(&conf.db);

    let elo_rx = elo_worker::init(conf.elo_queue_cap);
    tokio::spawn(elo_worker::run(elo_rx));

    tokio::spawn(idle_sweep_loop());

    let acceptor = TcpListener::new(conf.listen_addr.as_str()).bind().await;

    let router = routing::router();
    let doc = OpenApi::new("decided-together api", env!("CARGO_PKG_VERSION")).merge_router(&router);
    let router = router
        .unshift(doc.into_router("/api-doc/openapi.json"))
        .unshift(SwaggerUi::new("/api-doc/openapi.json").into_router("/swagger-ui"));

    let service = Service::new(router).hoop(Logger::new()).hoop(
        Cors::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
            .allow_headers(AllowHeaders::list([
                salvo::http::header::ACCEPT,
                salvo::http::header::CONTENT_TYPE,
                salvo::http::header::AUTHORIZATION,
            ]))
            .max_age(Duration::from_secs(86400))
            .into_handler(),
    );

    info!(addr = %conf.listen_addr, "decided-server listening");
    Server::new(acceptor)
        .serve(service)
        .instrument(tracing::info_span!("server.serve"))
        .await;
    Ok(())
}

/// Periodically abandons rooms the coordinator hasn't seen a mutation on
/// for longer than their status-appropriate timeout (spec §4.7).
async fn idle_sweep_loop() {
    let conf = config::get();
    let waiting_timeout = Duration::from_secs(conf.waiting_timeout_secs);
    let inactivity_timeout = Duration::from_secs(conf.inactivity_timeout_secs);
    let mut ticker = tokio::time::interval(Duration::from_secs(60));

    loop {
        ticker.tick().await;
        actions::sweep_idle_rooms(waiting_timeout, inactivity_timeout).await;
    }
}
