use crate::{
    api::routes::{
        create_competition, create_user, get_admin_stats, get_competition,
        get_competition_leaderboard, get_competitions, get_prediction, get_user, get_user_rank,
        global_leaderboard, health, submit_results, trigger_scoring, update_competition_status,
        upsert_prediction,
    },
    config::Settings,
    domain::{CompetitionStore, Coordinator, UserInfo, UserStore},
    infra::{
        db::{DBConnection, DatabasePoolConfig},
        file_utils::create_folder,
    },
};
use anyhow::anyhow;
use axum::{
    body::Body,
    extract::{connect_info::IntoMakeServiceWithConnectInfo, ConnectInfo, Request},
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware::{self, AddExtension, Next},
    response::IntoResponse,
    routing::{get, post},
    serve::Serve,
    Router,
};
use log::{error, info};
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub struct Application {
    server: Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    db_connection: DBConnection,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let address = format!(
            "{}:{}",
            config.api_settings.domain, config.api_settings.port
        );
        let listener = SocketAddr::from_str(&address)?;
        let (app_state, db_connection) = build_app(config.clone()).await?;
        let server = build_server(listener, app_state, config.api_settings.origins).await?;
        Ok(Self {
            server,
            db_connection,
        })
    }

    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        info!("Starting server...");
        let result = self.server.with_graceful_shutdown(shutdown_signal()).await;
        self.db_connection.close().await;

        match result {
            Ok(_) => {
                info!("Shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("Server shutdown error: {}", e);
                Err(anyhow!("Error during server shutdown: {}", e))
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub users_info: Arc<UserInfo>,
}

impl AppState {
    pub fn new(db_connection: DBConnection) -> Self {
        let coordinator = Coordinator::new(
            CompetitionStore::new(db_connection.clone()),
            UserStore::new(db_connection.clone()),
        );
        Self {
            coordinator: Arc::new(coordinator),
            users_info: Arc::new(UserInfo::new(UserStore::new(db_connection))),
        }
    }
}

pub async fn build_app(config: Settings) -> Result<(AppState, DBConnection), anyhow::Error> {
    if !config.db_settings.sqlite_config.is_memory() {
        create_folder(&config.db_settings.data_folder).map_err(|e| {
            anyhow!(
                "Error creating data folder {}: {}",
                config.db_settings.data_folder,
                e
            )
        })?;
    }

    let pool_config: DatabasePoolConfig = config.db_settings.clone().into();
    let db_connection = DBConnection::new(
        &config.db_settings.data_folder,
        &config.db_settings.database_name,
        pool_config,
    )
    .await
    .map_err(|e| anyhow!("Error setting up earnings db: {}", e))?;
    info!(
        "Database ready at {} ({:?})",
        db_connection.database_path, config.db_settings.sqlite_config.mode
    );

    let app_state = AppState::new(db_connection.clone());
    info!("Coordinator service configured");

    Ok((app_state, db_connection))
}

pub async fn build_server(
    socket_addr: SocketAddr,
    app_state: AppState,
    origins: Vec<String>,
) -> Result<
    Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    anyhow::Error,
> {
    let listener = TcpListener::bind(socket_addr).await?;

    info!("Setting up service");
    let app = app(app_state, origins);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    info!(
        "Service running @: http://{}:{}",
        socket_addr.ip(),
        socket_addr.port()
    );
    Ok(server)
}

pub fn app(app_state: AppState, origins: Vec<String>) -> Router {
    let origins: Vec<HeaderValue> = origins
        .into_iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .allow_origin(AllowOrigin::list(origins));

    let users_endpoints = Router::new().route("/{user_id}", get(get_user));

    let competition_endpoints = Router::new()
        .route("/{competition_id}", get(get_competition))
        .route(
            "/{competition_id}/predictions/{user_id}",
            get(get_prediction).put(upsert_prediction),
        )
        .route(
            "/{competition_id}/leaderboard",
            get(get_competition_leaderboard),
        )
        .route("/{competition_id}/users/{user_id}/rank", get(get_user_rank));

    // Private routes, not exposed publicly
    let admin_endpoints = Router::new()
        .route("/competitions", post(create_competition))
        .route(
            "/competitions/{competition_id}/status",
            post(update_competition_status),
        )
        .route(
            "/competitions/{competition_id}/results",
            post(submit_results),
        )
        .route(
            "/competitions/{competition_id}/score",
            post(trigger_scoring),
        )
        .route("/stats", get(get_admin_stats));

    Router::new()
        .route("/api/v1/health_check", get(health))
        .route("/api/v1/leaderboard", get(global_leaderboard))
        .route("/api/v1/users", post(create_user))
        .route("/api/v1/competitions", get(get_competitions))
        .nest("/api/v1/users", users_endpoints)
        .nest("/api/v1/competitions", competition_endpoints)
        .nest("/api/v1/admin", admin_endpoints)
        .layer(middleware::from_fn(log_request))
        .with_state(Arc::new(app_state))
        .layer(cors)
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default()
        .to_string();
    info!(target: "http_request","new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_response", "response, code: {}, time: {}", response.status().as_str(), response_time);

    response
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => info!("Received SIGINT signal"),
                    _ = sigterm.recv() => info!("Received SIGTERM signal"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for ctrl-c: {}", e);
                }
            }
        }
    }

    #[cfg(not(unix))]
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {}", e);
    }
}
