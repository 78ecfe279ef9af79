#![allow(dead_code)]

mod client_backend;
mod config;
mod engine;
mod error;
mod hoops;
mod maintainer;
mod routing;
mod state;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use hishtory_data::db::{migrate, DieselPool};
use hishtory_data::{InMemoryAdapter, ObjectStoreAdapter, RelationalAdapter, StorageAdapter};
use salvo::cors::{self, AllowHeaders, Cors};
use salvo::http::Method;
use salvo::logging::Logger;
use salvo::prelude::*;
use tracing_futures::Instrument;
use tracing_subscriber::fmt::format::FmtSpan;

pub use error::AppError;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Err(e) = dotenv() {
        println!("dotenv not loaded: {e:?}");
    }

    let filter = env::var("RUST_LOG").unwrap_or_else(|_| "hishtory_server=info,hishtory_data=info,salvo=warn".to_owned());
    tracing_subscriber::fmt().pretty().with_env_filter(filter).with_span_events(FmtSpan::CLOSE).init();

    if let Err(e) = config::init() {
        eprintln!("it looks like your config is invalid: {e}");
        std::process::exit(1);
    }
    let conf = config::get();

    let adapter: Arc<dyn StorageAdapter> = if conf.test {
        Arc::new(InMemoryAdapter::new())
    } else if let Some(object_store) = &conf.object_store {
        Arc::new(ObjectStoreAdapter::connect(object_store).await?)
    } else {
        let pool = DieselPool::new(&conf.db.url, conf.db.pool_size, conf.db.min_idle, conf.db.connection_timeout_ms)?;
        migrate(&pool)?;
        Arc::new(RelationalAdapter::new(pool))
    };
    state::set_adapter(adapter.clone());

    maintainer::spawn(adapter, conf.prune_interval_secs);

    let router = routing::router(conf.test);
    let service = Service::new(router).hoop(Logger::new()).hoop(
        Cors::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(AllowHeaders::list([
                salvo::http::header::ACCEPT,
                salvo::http::header::CONTENT_TYPE,
            ]))
            .max_age(Duration::from_secs(86400))
            .into_handler(),
    );

    let acceptor = TcpListener::new(conf.listen_addr.as_str()).bind().await;
    tracing::info!(listen_addr = %conf.listen_addr, "hishtory coordinator listening");
    Server::new(acceptor).serve(service).instrument(tracing::info_span!("server.serve")).await;
    Ok(())
}
