use std::{future::Future, pin::Pin, rc::Rc, sync::Arc, time::Duration};

use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use common::{error::AppError, jwt::JwtClaims};

use crate::window::FixedWindowLimiter;

/// Per-identifier fixed-window guard. Authenticated requests are keyed by
/// the JWT user id, anonymous ones by peer address, so signing in never
/// shares a bucket with the rest of a NAT.
pub struct FixedWindowGuard {
    limiter: Arc<FixedWindowLimiter>,
    limit: u32,
    window: Duration,
}

impl FixedWindowGuard {
    pub fn new(limiter: Arc<FixedWindowLimiter>, limit: u32, window: Duration) -> Self {
        Self {
            limiter,
            limit,
            window,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for FixedWindowGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = FixedWindowGuardService<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(FixedWindowGuardService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            limit: self.limit,
            window: self.window,
        }))
    }
}

pub struct FixedWindowGuardService<S> {
    service: Rc<S>,
    limiter: Arc<FixedWindowLimiter>,
    limit: u32,
    window: Duration,
}

impl<S, B> Service<ServiceRequest> for FixedWindowGuardService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = Rc::clone(&self.service);
        let limiter = self.limiter.clone();
        let limit = self.limit;
        let window = self.window;

        let identifier = match req.extensions().get::<JwtClaims>() {
            Some(claims) => format!("user:{}", claims.user_id),
            None => match req.connection_info().realip_remote_addr() {
                Some(addr) => format!("ip:{}", addr),
                None => "ip:unknown".to_string(),
            },
        };

        Box::pin(async move {
            let decision = limiter.check(&identifier, limit, window).await;
            if decision.allowed {
                srv.call(req).await.map(|res| res.map_into_boxed_body())
            } else {
                log::debug!(
                    "Rate limit hit for {}: {} requests, window resets {}",
                    identifier,
                    decision.count,
                    decision.reset_at
                );
                Ok(req.error_response(AppError::TooManyRequests(
                    "Rate limit exceeded. Please try again later.".to_string(),
                )))
            }
        })
    }
}
