use actix_web::web::{self};

pub mod resolver;

pub mod routes {
    pub mod media;
}

mod dtos {
    pub(crate) mod media;
}

pub fn mount_media() -> actix_web::Scope {
    web::scope("/media").service(routes::media::get_media_url)
}
