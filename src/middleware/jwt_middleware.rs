/// JWT Authentication Middleware
///
/// Resolves the bearer access token to an active `User` and injects it into
/// request extensions, where handlers pick it up with `web::ReqData<User>`.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::{authenticate, bearer_token, TokenCodec};
use crate::error::{AppError, AuthError};
use crate::store::Store;

/// Guards a scope: every request needs `Authorization: Bearer <access_token>`.
pub struct JwtMiddleware {
    codec: TokenCodec,
    store: Arc<dyn Store>,
}

impl JwtMiddleware {
    pub fn new(codec: TokenCodec, store: Arc<dyn Store>) -> Self {
        Self { codec, store }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            codec: self.codec.clone(),
            store: self.store.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    codec: TokenCodec,
    store: Arc<dyn Store>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(bearer_token)
            .map(str::to_string);

        let service = self.service.clone();
        let codec = self.codec.clone();
        let store = self.store.clone();

        Box::pin(async move {
            let token = match token {
                Some(token) => token,
                None => {
                    tracing::warn!(path = %req.path(), "Missing or malformed Authorization header");
                    return Err(AppError::Auth(AuthError::MissingToken).into());
                }
            };

            let user = authenticate(&codec, store.as_ref(), &token).await?;
            tracing::debug!(user_id = user.id, role = %user.role, "Access token accepted");

            req.extensions_mut().insert(user);
            service.call(req).await
        })
    }
}
