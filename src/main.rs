use quickpoll::config::Config;
use quickpoll::db;
use quickpoll::startup::{AppState, build_router, shutdown_signal};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "INFO");
        }
    }
    // initialize tracing
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let pool = match db::init_db(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };
    db::spawn_pool_monitor(pool.clone());

    // The broadcaster exists before the listener accepts any session.
    let app_state = AppState::new(pool, config.realtime);
    let app = build_router(app_state.clone());

    info!("listening on {}", config.bind_addr);
    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Unable to bind {}: {}", config.bind_addr, e);
            std::process::exit(1);
        }
    };

    // Live sessions would hold graceful shutdown open, so close them as
    // soon as the signal arrives.
    let closing = app_state.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            closing.shutdown();
        })
        .await;
    if let Err(e) = served {
        error!("server error: {}", e);
    }

    info!("server stopped");
}
