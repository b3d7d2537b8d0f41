use actix_web::web::{self};

pub mod routes {
    pub mod admin;
    pub mod billing;
    pub mod webhook;
}

mod services {
    pub(crate) mod checkout;
    pub(crate) mod plan;
    pub(crate) mod store;
    pub(crate) mod sweeper;
    pub(crate) mod webhook;
}

mod models {
    pub(crate) mod billing;
}

mod dtos {
    pub(crate) mod billing;
}

#[cfg(test)]
mod testing;

pub fn mount_webhook() -> actix_web::Scope {
    web::scope("/stripe").service(routes::webhook::post_webhook)
}

pub fn mount_billing() -> actix_web::Scope {
    web::scope("/billing")
        .service(routes::billing::get_plan)
        .service(routes::billing::post_checkout)
}

pub fn mount_admin() -> actix_web::Scope {
    web::scope("/subscriptions").service(routes::admin::post_check_expired)
}
