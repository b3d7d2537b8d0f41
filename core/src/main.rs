mod cors;
mod redis;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{
    App, HttpServer,
    web::{self},
};
use common::env_config::Config;
use limiter::window::FixedWindowLimiter;
use media::resolver::{self, PathResolver, StorageBackend};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = Config::from_env();
    let config_data = config.clone();

    // get info
    let is_production = config.environment == "production";
    let origin = config.cors_allowed_origin.clone();

    // init logger
    if config.console_logging_enabled {
        logger::setup().expect("Failed to set up logger");
    }

    // init db connection
    let pool = db::setup(&config.database_url, is_production)
        .await
        .expect("Failed to set up database");

    // init Redis-backed rate limiting when a URL is configured
    let redis_pool = config
        .redis_url
        .as_deref()
        .and_then(redis::setup_redis);
    let rate_limiter = Arc::new(FixedWindowLimiter::new(redis_pool));
    rate_limiter.spawn_cleanup(Duration::from_secs(5 * 60));

    // media URL resolver
    let path_resolver = Arc::new(PathResolver::new(
        StorageBackend::from_config(&config.storage),
        resolver::DEFAULT_TTL,
    ));

    HttpServer::new(move || {
        let limiter_data = rate_limiter.clone();
        App::new()
            .app_data(web::Data::from(pool.clone()))
            .app_data(web::Data::new(config_data.clone()))
            .app_data(web::Data::new(path_resolver.clone()))
            .wrap(limiter::global_middleware(10)) // max 10 requests per second
            .wrap(logger::middleware()) // 2nd
            .wrap(cors::middleware(&origin)) // 1st
            .service(
                web::scope("/api")
                    .service(api_billing::mount_webhook())
                    .service(media::mount_media())
                    .service(
                        web::scope("/dashboard")
                            .wrap(limiter::fixed_window_middleware(
                                limiter_data.clone(),
                                60,
                                Duration::from_secs(60),
                            ))
                            .wrap(api_auth::auth_middleware(config_data.clone()))
                            .service(api_billing::mount_billing()),
                    )
                    .service(
                        web::scope("/admin")
                            .wrap(limiter::fixed_window_middleware(
                                limiter_data,
                                10,
                                Duration::from_secs(60),
                            ))
                            .wrap(api_auth::auth_middleware(config_data.clone()))
                            .service(api_billing::mount_admin()),
                    ),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await
}
