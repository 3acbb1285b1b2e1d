//! Admission middleware - gates every request on the rate limiter.
//!
//! Runs before handler dispatch, attaches the `X-RateLimit-*` quota headers
//! to all responses, and short-circuits denials into a 429 with a
//! `Retry-After` header. This is the only place a limiter decision becomes
//! a protocol-level rejection.

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{Error, HttpMessage, HttpResponse};
use futures::future::{Ready, ready};
use uuid::Uuid;

use studio_core::domain::Role;
use studio_core::{Decision, Identity, LimitError, Limiter, RequestContext};
use studio_shared::{ErrorResponse, RateLimitExceeded};

fn header_limit() -> HeaderName {
    HeaderName::from_static("x-ratelimit-limit")
}

fn header_remaining() -> HeaderName {
    HeaderName::from_static("x-ratelimit-remaining")
}

fn header_reset() -> HeaderName {
    HeaderName::from_static("x-ratelimit-reset")
}

/// Caller identity placed into request extensions by the auth layer before
/// this middleware runs. Absent for anonymous callers, who are tracked by
/// source IP instead.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub user_id: Uuid,
    pub role: Role,
}

/// Rate limiting middleware factory.
pub struct RateLimitMiddleware {
    limiter: Arc<Limiter>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<Limiter>) -> Self {
        Self { limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: Arc<Limiter>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let limiter = self.limiter.clone();
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            let context = request_context(&req);

            let decision = match limiter.check(&context).await {
                Ok(decision) => decision,
                Err(e) => {
                    // Caller contract violation, not a throttle.
                    tracing::error!(error = %e, "rate limit check rejected request input");
                    let response = limit_error_response(&e);
                    let (http_req, _payload) = req.into_parts();
                    return Ok(ServiceResponse::new(http_req, response).map_into_right_body());
                }
            };

            if !decision.allowed {
                let retry_after = decision.retry_after.unwrap_or(0);
                tracing::warn!(
                    method = %context.method,
                    path = %context.path,
                    limit = decision.limit,
                    retry_after,
                    "rate limit exceeded"
                );

                let response = HttpResponse::TooManyRequests()
                    .insert_header((header_limit(), HeaderValue::from(decision.limit)))
                    .insert_header((header_remaining(), HeaderValue::from(decision.remaining)))
                    .insert_header((header_reset(), HeaderValue::from(decision.reset_at)))
                    .insert_header(("Retry-After", HeaderValue::from(retry_after)))
                    .json(RateLimitExceeded::new(decision.limit, retry_after));

                let (http_req, _payload) = req.into_parts();
                return Ok(ServiceResponse::new(http_req, response).map_into_right_body());
            }

            let mut res = service.call(req).await?;
            attach_quota_headers(&mut res, &decision);
            Ok(res.map_into_left_body())
        })
    }
}

/// Assemble the limiter input from the request: user identity when the auth
/// layer attached one, else the peer address.
fn request_context(req: &ServiceRequest) -> RequestContext {
    let identity = req
        .extensions()
        .get::<CallerIdentity>()
        .map(|caller| Identity {
            user_id: caller.user_id,
            role: caller.role,
        });

    let source_ip = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();

    RequestContext {
        method: req.method().to_string(),
        path: req.path().to_string(),
        identity,
        source_ip,
    }
}

/// Map a limiter contract violation to a 500, never a 429, so a
/// misconfigured caller is not mistaken for a throttled one.
fn limit_error_response(error: &LimitError) -> HttpResponse {
    HttpResponse::InternalServerError()
        .json(ErrorResponse::internal_error().with_detail(error.to_string()))
}

fn attach_quota_headers<B>(res: &mut ServiceResponse<B>, decision: &Decision) {
    let headers = res.headers_mut();
    headers.insert(header_limit(), HeaderValue::from(decision.limit));
    headers.insert(header_remaining(), HeaderValue::from(decision.remaining));
    headers.insert(header_reset(), HeaderValue::from(decision.reset_at));
}
