use std::sync::Arc;

use actix_web::{Responder, get, web};
use common::{error::Res, http::Success};

use crate::dtos::media::MediaUrlResponse;
use crate::resolver::PathResolver;

/// Resolves a stored relative media path to a full URL for the configured
/// storage backend.
///
/// # Input
/// - `path`: Tail path parameter, the stored relative media path
///
/// # Output
/// - Success: JSON object with the resolved `url`
#[get("/url/{path:.*}")]
async fn get_media_url(
    path: web::Path<String>,
    resolver: web::Data<Arc<PathResolver>>,
) -> Res<impl Responder> {
    let url = resolver.resolve(&path.into_inner());
    Success::ok(MediaUrlResponse { url })
}
