use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MediaUrlResponse {
    pub url: String,
}
