use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use clap::Parser;
use qboard::{
    AppState,
    config::Config,
    create_router,
    error::AppError,
    middleware::{RateLimiter, rate_limit},
    routes::user::model::{CreateUserRequest, User},
};
use sqlx::{Executor, PgPool, postgres::PgPoolOptions};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod args;

use args::{Cli, Command};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().expect("Failed to load configuration");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'qboard';").await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(pool, config).await,
        Command::CreateSuperuser {
            email,
            password,
            std_id,
            disp_name,
            institution,
        } => {
            let req = CreateUserRequest {
                email: Some(email),
                password: Some(password),
                std_id: Some(std_id),
                disp_name: Some(disp_name),
                institution: Some(institution),
                is_faculty: false,
            };
            if let Err(e) = create_superuser(&pool, req).await {
                tracing::error!("Could not create superuser: {}", e);
                std::process::exit(1);
            }
        }
    }
}

async fn create_superuser(pool: &PgPool, req: CreateUserRequest) -> Result<(), AppError> {
    let mut new_user = req.validate()?;
    if User::email_taken(pool, &new_user.email).await? {
        return Err(AppError::field(
            "email",
            "User with this email already exists.",
        ));
    }
    new_user.is_staff = true;
    new_user.is_superuser = true;

    let user = User::create(pool, new_user).await?;
    tracing::info!("Superuser {} created", user);
    Ok(())
}

async fn serve(pool: PgPool, config: Config) {
    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");

    let state = AppState {
        pool,
        config: config.clone(),
        redis: Arc::new(redis_client),
    };

    let rate_limiter = Arc::new(RateLimiter::new(state.redis.clone(), config.clone()));

    let router = create_router(state).layer(axum::middleware::from_fn_with_state(
        rate_limiter,
        rate_limit,
    ));

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
