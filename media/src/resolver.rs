//! Maps stored relative media paths onto full URLs for the configured
//! storage backend, with a TTL cache so page renders with many images do
//! not recompute the same URL over and over.

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::env_config::StorageConfig;
use dashmap::DashMap;

/// Where media files live. Selected once at startup from configuration;
/// the resolver never talks to the backend, it only derives URLs.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    S3 { bucket: String, region: String },
    Spaces { bucket: String, region: String },
    Local { base_url: String },
}

impl StorageBackend {
    /// Picks the backend named by `STORAGE_PROVIDER`. Anything unknown
    /// falls back to local, which keeps development setups working.
    pub fn from_config(config: &StorageConfig) -> Self {
        match config.provider.to_lowercase().as_str() {
            "s3" => StorageBackend::S3 {
                bucket: config.bucket.clone(),
                region: config.region.clone(),
            },
            "spaces" => StorageBackend::Spaces {
                bucket: config.bucket.clone(),
                region: config.region.clone(),
            },
            "local" => StorageBackend::Local {
                base_url: config.local_base_url.clone(),
            },
            other => {
                log::warn!("Unknown storage provider '{}', using local", other);
                StorageBackend::Local {
                    base_url: config.local_base_url.clone(),
                }
            }
        }
    }

    fn url_for(&self, path: &str) -> String {
        match self {
            StorageBackend::S3 { bucket, region } => {
                format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, path)
            }
            StorageBackend::Spaces { bucket, region } => {
                format!(
                    "https://{}.{}.digitaloceanspaces.com/{}",
                    bucket, region, path
                )
            }
            StorageBackend::Local { base_url } => {
                format!("{}/{}", base_url.trim_end_matches('/'), path)
            }
        }
    }
}

struct CachedUrl {
    url: String,
    expires_at: DateTime<Utc>,
}

/// Relative-path to URL resolver with a per-path TTL cache.
pub struct PathResolver {
    backend: StorageBackend,
    cache: DashMap<String, CachedUrl>,
    ttl: chrono::Duration,
}

/// Cache entries outlive a backend switch only until their TTL runs out,
/// so ten minutes is also the staleness bound after a redeploy.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

impl PathResolver {
    pub fn new(backend: StorageBackend, ttl: Duration) -> Self {
        Self {
            backend,
            cache: DashMap::new(),
            ttl: chrono::Duration::milliseconds(ttl.as_millis() as i64),
        }
    }

    /// Resolves a stored media path to a full URL. Inputs that are already
    /// absolute pass through untouched.
    pub fn resolve(&self, path: &str) -> String {
        self.resolve_at(path, Utc::now())
    }

    fn resolve_at(&self, path: &str, now: DateTime<Utc>) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        let key = path.trim_start_matches('/');

        if let Some(cached) = self.cache.get(key) {
            if cached.expires_at > now {
                return cached.url.clone();
            }
        }

        // A miss is rare enough that sweeping here keeps the map bounded
        // without a background task.
        self.purge_expired(now);

        let url = self.backend.url_for(key);
        self.cache.insert(
            key.to_string(),
            CachedUrl {
                url: url.clone(),
                expires_at: now + self.ttl,
            },
        );
        url
    }

    /// Drops cached URLs whose TTL has run out.
    fn purge_expired(&self, now: DateTime<Utc>) {
        self.cache.retain(|_, entry| entry.expires_at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s3_resolver() -> PathResolver {
        PathResolver::new(
            StorageBackend::S3 {
                bucket: "promptexify-media".to_string(),
                region: "eu-west-1".to_string(),
            },
            DEFAULT_TTL,
        )
    }

    #[test]
    fn s3_paths_resolve_to_virtual_hosted_urls() {
        let resolver = s3_resolver();
        assert_eq!(
            resolver.resolve("covers/a.png"),
            "https://promptexify-media.s3.eu-west-1.amazonaws.com/covers/a.png"
        );
    }

    #[test]
    fn spaces_paths_resolve_to_region_endpoint() {
        let resolver = PathResolver::new(
            StorageBackend::Spaces {
                bucket: "promptexify-media".to_string(),
                region: "fra1".to_string(),
            },
            DEFAULT_TTL,
        );
        assert_eq!(
            resolver.resolve("covers/a.png"),
            "https://promptexify-media.fra1.digitaloceanspaces.com/covers/a.png"
        );
    }

    #[test]
    fn local_paths_join_the_base_url_once() {
        let resolver = PathResolver::new(
            StorageBackend::Local {
                base_url: "http://localhost:8080/uploads/".to_string(),
            },
            DEFAULT_TTL,
        );
        assert_eq!(
            resolver.resolve("/covers/a.png"),
            "http://localhost:8080/uploads/covers/a.png"
        );
    }

    #[test]
    fn absolute_urls_pass_through() {
        let resolver = s3_resolver();
        assert_eq!(
            resolver.resolve("https://cdn.example.com/a.png"),
            "https://cdn.example.com/a.png"
        );
    }

    #[test]
    fn expired_cache_entries_are_recomputed() {
        let resolver = s3_resolver();
        let now = Utc::now();

        let first = resolver.resolve_at("covers/a.png", now);
        let after_ttl = now + chrono::Duration::minutes(11);
        let second = resolver.resolve_at("covers/a.png", after_ttl);
        assert_eq!(first, second);

        let entry = resolver.cache.get("covers/a.png").unwrap();
        assert!(entry.expires_at > now + chrono::Duration::minutes(11));
    }

    #[test]
    fn stale_entries_are_purged_on_the_next_miss() {
        let resolver = s3_resolver();
        let now = Utc::now();

        resolver.resolve_at("covers/stale.png", now);
        assert!(resolver.cache.contains_key("covers/stale.png"));

        let after_ttl = now + chrono::Duration::minutes(11);
        resolver.resolve_at("covers/other.png", after_ttl);

        assert!(!resolver.cache.contains_key("covers/stale.png"));
        assert!(resolver.cache.contains_key("covers/other.png"));
    }

    #[test]
    fn unknown_provider_falls_back_to_local() {
        let backend = StorageBackend::from_config(&common::env_config::StorageConfig {
            provider: "gcs".to_string(),
            bucket: "b".to_string(),
            region: "r".to_string(),
            local_base_url: "http://localhost:8080/uploads".to_string(),
        });
        assert_eq!(
            backend,
            StorageBackend::Local {
                base_url: "http://localhost:8080/uploads".to_string()
            }
        );
    }
}
