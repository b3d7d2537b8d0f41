pub fn setup_redis(redis_url: &str) -> Option<deadpool_redis::Pool> {
    let cfg = deadpool_redis::Config::from_url(redis_url);
    match cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => Some(pool),
        Err(e) => {
            log::warn!(
                "Could not create Redis pool ({}), rate limiting stays in-memory",
                e
            );
            None
        }
    }
}
