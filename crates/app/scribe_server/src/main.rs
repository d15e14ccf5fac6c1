//! Scribe API server binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use scribe_api::config::ApiConfig;
use scribe_core::auth::jwt::{
    DEFAULT_ACCESS_TOKEN_VALIDITY_SECS, DEFAULT_REFRESH_TOKEN_VALIDITY_SECS, TokenSettings,
};
use scribe_core::auth::password::DEFAULT_BCRYPT_COST;
use scribe_core::db::{self, DbSettings};
use scribe_core::models::auth::Permission;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "scribe_server", about = "Scribe API server")]
struct Args {
    /// Port to listen on (0 = ephemeral). Ignored when `--bind-addr` is set.
    #[arg(long, default_value_t = 3100)]
    port: u16,

    /// Full listen address, e.g. `0.0.0.0:3100`.
    #[arg(long, env = "BIND_ADDR")]
    bind_addr: Option<String>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/scribe"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Upper bound, in seconds, for every storage call.
    #[arg(long, env = "DB_QUERY_TIMEOUT_SEC", default_value_t = 10)]
    query_timeout_sec: u64,

    #[arg(long, env = "RSA_PRIVATE_KEY_PATH", default_value = "keys/private.pem")]
    private_key_path: PathBuf,

    #[arg(long, env = "RSA_PUBLIC_KEY_PATH", default_value = "keys/public.pem")]
    public_key_path: PathBuf,

    #[arg(long, env = "TOKEN_ISSUER", default_value = "api.scribe.dev")]
    token_issuer: String,

    #[arg(long, env = "TOKEN_AUDIENCE", default_value = "scribe.dev")]
    token_audience: String,

    #[arg(
        long,
        env = "ACCESS_TOKEN_VALIDITY_SEC",
        default_value_t = DEFAULT_ACCESS_TOKEN_VALIDITY_SECS
    )]
    access_token_validity_sec: u64,

    #[arg(
        long,
        env = "REFRESH_TOKEN_VALIDITY_SEC",
        default_value_t = DEFAULT_REFRESH_TOKEN_VALIDITY_SECS
    )]
    refresh_token_validity_sec: u64,

    #[arg(long, env = "BCRYPT_COST", default_value_t = DEFAULT_BCRYPT_COST)]
    bcrypt_cost: u32,

    /// API key registered with GENERAL permission on startup if absent.
    #[arg(long, env = "BOOTSTRAP_API_KEY", hide_env_values = true)]
    bootstrap_api_key: Option<String>,
}

impl Args {
    fn api_config(&self) -> ApiConfig {
        let bind_addr = self
            .bind_addr
            .clone()
            .unwrap_or_else(|| format!("127.0.0.1:{}", self.port));
        ApiConfig {
            bind_addr,
            database_url: self.database_url.clone(),
            query_timeout: Duration::from_secs(self.query_timeout_sec),
            private_key_path: self.private_key_path.clone(),
            public_key_path: self.public_key_path.clone(),
            tokens: TokenSettings {
                issuer: self.token_issuer.clone(),
                audience: self.token_audience.clone(),
                access_validity: Duration::from_secs(self.access_token_validity_sec),
                refresh_validity: Duration::from_secs(self.refresh_token_validity_sec),
            },
            bcrypt_cost: self.bcrypt_cost,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,scribe_api=debug,scribe_core=debug".into()),
        )
        .init();

    let args = Args::parse();
    let config = args.api_config();

    info!(bind_addr = %config.bind_addr, "starting scribe_server");

    let pool = db::connect(&DbSettings {
        url: config.database_url.clone(),
        max_connections: args.max_connections,
        query_timeout: config.query_timeout,
    })
    .await?;

    info!("running database migrations");
    scribe_api::migrate(&pool).await?;

    let state = scribe_api::load_state(&config, pool)?;

    if let Some(key) = args.bootstrap_api_key.as_deref().filter(|k| !k.is_empty()) {
        if state.api_keys.find_active(key).await?.is_none() {
            let record = state
                .api_keys
                .create(key, 1, &[Permission::General], &["bootstrap".to_string()])
                .await?;
            info!(api_key_id = %record.id, "registered bootstrap api key");
        }
    } else {
        warn!("no BOOTSTRAP_API_KEY set; requests need a key already in the database");
    }

    let app = scribe_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
