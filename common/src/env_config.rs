use std::{env, sync::Arc};

#[derive(Clone, Debug)]
/// Configuration struct for the server.
///
/// Holds everything the binary needs to come up: database and Redis
/// connection details, JWT configuration, server binding, CORS settings,
/// logging preferences, Stripe credentials, the two recognised subscription
/// prices, and the media storage backend.
pub struct Config {
    // environment
    pub environment: String, // development or production
    /// The URL of the database to connect to.
    pub database_url: String,
    /// Redis connection string. Absent means the rate limiter runs on its
    /// in-memory backend only.
    pub redis_url: Option<String>,
    /// Configuration for JWT (JSON Web Token) authentication.
    pub jwt_config: JwtConfig,
    /// The hostname or IP address the server will bind to.
    pub server_host: String,
    /// The port number the server will listen on.
    pub server_port: u16,
    /// The number of worker threads to spawn for handling requests.
    pub num_workers: usize,
    /// The allowed origin for CORS (Cross-Origin Resource Sharing).
    pub cors_allowed_origin: String,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    /// Stripe secret key
    pub stripe_secret_key: String,
    /// Stripe webhook secret
    pub stripe_webhook_secret: String,
    /// The two price ids that distinguish monthly from yearly plans.
    pub plan_prices: PlanPrices,
    /// Media storage backend settings.
    pub storage: StorageConfig,
}

#[derive(Clone, Debug)]
/// Price ids for the two recognised subscription plans. A stored price id
/// matching neither yields an unknown interval.
pub struct PlanPrices {
    pub monthly_price_id: String,
    pub yearly_price_id: String,
}

#[derive(Clone, Debug)]
/// Media storage backend settings. `provider` selects between "s3",
/// "spaces" and "local"; the remaining fields are read as the provider
/// needs them.
pub struct StorageConfig {
    pub provider: String,
    pub bucket: String,
    pub region: String,
    pub local_base_url: String,
}

#[derive(Clone, Debug)]
/// Configuration for JSON Web Token (JWT) authentication.
///
/// This struct contains the secret key used to sign JWTs and
/// the expiration time in hours for issued tokens.
pub struct JwtConfig {
    /// The secret key used to sign and verify JWTs.
    pub secret: String,
    /// The expiration time for JWTs in hours.
    pub expiration_hours: i64,
}

impl JwtConfig {
    /// Creates a new `JwtConfig` instance from environment variables.
    ///
    /// Reads the JWT configuration from environment variables:
    /// - `JWT_SECRET`: Required. The secret key for JWT signing.
    /// - `JWT_EXPIRATION_HOURS`: Optional. Defaults to 24 hours if not provided.
    ///
    /// # Panics
    ///
    /// This function will panic if:
    /// - `JWT_SECRET` environment variable is not set
    /// - `JWT_EXPIRATION_HOURS` is set but cannot be parsed as a valid number
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        JwtConfig {
            secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .expect("JWT_EXPIRATION_HOURS must be a valid number"),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    ///
    /// # Environment Variables
    ///
    /// Required:
    /// - `ENVIRONMENT`: "development" or "production"
    /// - `DATABASE_URL`: Connection string for the database
    /// - `JWT_SECRET`: Secret key for JWT signing (via `JwtConfig::from_env()`)
    /// - `STRIPE_PRICE_MONTHLY` / `STRIPE_PRICE_YEARLY`: the two plan prices
    ///
    /// Optional (with defaults):
    /// - `REDIS_URL`: absent selects the in-memory rate-limit backend
    /// - `IP`: Server host (default: "127.0.0.1")
    /// - `PORT`: Server port (default: 8080)
    /// - `WORKERS`: Number of worker threads (default: 4)
    /// - `CORS_ALLOWED_ORIGIN`: Allowed CORS origin (default: "http://localhost:3000")
    /// - `ENABLE_CONSOLE_LOGGING`: Whether to enable console logging (default: true)
    /// - `STORAGE_PROVIDER`: "s3", "spaces" or "local" (default: "local")
    /// - `STORAGE_BUCKET`, `STORAGE_REGION`, `STORAGE_LOCAL_BASE_URL`
    ///
    /// # Panics
    ///
    /// This function will panic if required environment variables are missing
    /// or if numeric values cannot be parsed correctly.
    pub fn from_env() -> Arc<Self> {
        dotenvy::dotenv().ok();

        let stripe_secret_key = env::var("STRIPE_SECRET_KEY").unwrap_or_default();
        let stripe_webhook_secret = env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default();

        Arc::new(Config {
            environment: env::var("ENVIRONMENT").expect("ENVIRONMENT must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            redis_url: env::var("REDIS_URL").ok(),
            jwt_config: JwtConfig::from_env(),
            server_host: env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            num_workers: env::var("WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            console_logging_enabled: env::var("ENABLE_CONSOLE_LOGGING")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                == "true",
            stripe_secret_key,
            stripe_webhook_secret,
            plan_prices: PlanPrices {
                monthly_price_id: env::var("STRIPE_PRICE_MONTHLY")
                    .expect("STRIPE_PRICE_MONTHLY must be set"),
                yearly_price_id: env::var("STRIPE_PRICE_YEARLY")
                    .expect("STRIPE_PRICE_YEARLY must be set"),
            },
            storage: StorageConfig {
                provider: env::var("STORAGE_PROVIDER").unwrap_or_else(|_| "local".to_string()),
                bucket: env::var("STORAGE_BUCKET").unwrap_or_default(),
                region: env::var("STORAGE_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                local_base_url: env::var("STORAGE_LOCAL_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:8080/uploads".to_string()),
            },
        })
    }
}
