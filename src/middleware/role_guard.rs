use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::require_role;
use crate::domain::{Role, User};
use crate::error::{AppError, AuthError};

/// Role filter for a scope already wrapped by `JwtMiddleware`.
///
/// Register it *before* `JwtMiddleware` (`.wrap(RoleGuard).wrap(JwtMiddleware)`)
/// so that authentication runs first.
pub struct RoleGuard {
    allowed: Rc<[Role]>,
}

impl RoleGuard {
    pub fn new(allowed: &[Role]) -> Self {
        Self {
            allowed: Rc::from(allowed),
        }
    }

    pub fn admin_only() -> Self {
        Self::new(&[Role::Admin])
    }
}

impl<S, B> Transform<S, ServiceRequest> for RoleGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RoleGuardService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RoleGuardService {
            service: Rc::new(service),
            allowed: self.allowed.clone(),
        }))
    }
}

pub struct RoleGuardService<S> {
    service: Rc<S>,
    allowed: Rc<[Role]>,
}

impl<S, B> Service<ServiceRequest> for RoleGuardService<S>
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
        let verdict = match req.extensions().get::<User>() {
            Some(user) => require_role(user, &self.allowed).map(|_| ()),
            None => Err(AppError::Auth(AuthError::MissingToken)),
        };

        let service = self.service.clone();
        Box::pin(async move {
            verdict?;
            service.call(req).await
        })
    }
}
