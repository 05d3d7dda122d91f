use crate::import::ImportError;
use crate::{access, export, import};
use actix::fut::{ready, Ready};
use actix::prelude::*;
use actix_session::Session;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::StatusCode,
    web::{self, Data, Form, FormConfig, Json, JsonConfig, PathConfig, PayloadConfig},
    Either, FromRequest, HttpMessage, HttpRequest, HttpResponse,
};
use anyhow::anyhow;
use derive_more::{Display, Error};
use futures_util::future::LocalBoxFuture;
use ph_types::access::service::UserCredentialsService;
use ph_types::access::{self as access_types, Login, RequestToken, UserCredentials};
use serde::Serialize;
use std::sync::Arc;

pub type Response = Result<HttpResponse, ControllerError>;
pub type InputData<T> = Either<Form<T>, Json<T>>;

pub const REQUEST_TOKEN_HEADER: &str = "X-Request-Token";
pub const MAX_PAYLOAD_SIZE: usize = 32 * 1024 * 1024;

pub fn input<T>(data: InputData<T>) -> T {
    match data {
        Either::Left(Form(t)) => t,
        Either::Right(Json(t)) => t,
    }
}

#[derive(Debug, Display, Error)]
pub enum ControllerError {
    #[display("Not logged in")]
    Unauthorized,
    #[display("Invalid request token")]
    InvalidToken,
    #[display("You do not have permission to manage price history")]
    Forbidden,
    #[error(ignore)]
    #[display("{_0}")]
    NotFound(String),
    #[error(ignore)]
    #[display("{_0}")]
    NoData(String),
    #[error(ignore)]
    #[display("{msg}")]
    InvalidInput { field: String, msg: String },
    #[display("{_0}")]
    Import(ImportError),
    #[error(ignore)]
    #[display("{_0}")]
    InternalServerError(anyhow::Error),
}

impl From<anyhow::Error> for ControllerError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalServerError(err)
    }
}

impl From<actix::MailboxError> for ControllerError {
    fn from(err: actix::MailboxError) -> Self {
        Self::InternalServerError(err.into())
    }
}

impl From<ImportError> for ControllerError {
    fn from(err: ImportError) -> Self {
        Self::Import(err)
    }
}

/// Body shape shared by every JSON endpoint.
#[derive(Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

#[derive(Serialize)]
pub struct Message {
    pub message: String,
}

pub fn success<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope {
        success: true,
        data,
    })
}

impl actix_web::error::ResponseError for ControllerError {
    fn status_code(&self) -> StatusCode {
        use ControllerError::*;
        match self {
            Unauthorized => StatusCode::UNAUTHORIZED,
            InvalidToken | Forbidden => StatusCode::FORBIDDEN,
            NotFound(_) => StatusCode::NOT_FOUND,
            NoData(_) | InvalidInput { .. } => StatusCode::BAD_REQUEST,
            Import(ImportError::TargetNotFound(_)) => StatusCode::NOT_FOUND,
            Import(ImportError::Storage(_)) | InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Import(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        log::warn!("{self:?}");
        if let ControllerError::InvalidInput { field, .. } = self {
            log::debug!("Rejected field {field}");
        }
        HttpResponse::build(self.status_code()).json(Envelope {
            success: false,
            data: Message {
                message: self.to_string(),
            },
        })
    }
}

pub async fn not_found(req: HttpRequest) -> Response {
    Err(ControllerError::NotFound(format!(
        "No route for {} {}",
        req.method(),
        req.path()
    )))
}

#[derive(Clone)]
pub struct Identity {
    pub login: String,
    pub request_token: RequestToken,
}

impl FromRequest for Identity {
    type Error = ControllerError;
    type Future = Ready<Result<Self, Self::Error>>;

    #[inline]
    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Identity>()
                .cloned()
                .ok_or(ControllerError::Unauthorized),
        )
    }
}

/// Logged in user that may run price history exports and imports.
/// The session's request token has to be echoed in [`REQUEST_TOKEN_HEADER`].
pub struct ManageAccess {
    pub user: UserCredentials,
}

impl FromRequest for ManageAccess {
    type Error = ControllerError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    #[inline]
    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let identity = Identity::extract(&req).await?;
            let presented = req
                .headers()
                .get(REQUEST_TOKEN_HEADER)
                .and_then(|h| h.to_str().ok())
                .unwrap_or_default();
            if !identity.request_token.matches(presented) {
                return Err(ControllerError::InvalidToken);
            }
            let service = Data::<Addr<UserCredentialsService>>::extract(&req)
                .await
                .map_err(|_| anyhow!("UserCredentialsService is not registered"))?;
            let user = service
                .send(access_types::service::Get(Login(identity.login)))
                .await??
                .ok_or(ControllerError::Unauthorized)?;
            if user.can_manage_price_history() {
                Ok(Self { user })
            } else {
                Err(ControllerError::Forbidden)
            }
        })
    }
}

pub struct SessionMiddlewareFactory {}

impl<S, B: 'static> Transform<S, ServiceRequest> for SessionMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Transform = SessionMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SessionMiddleware {
            service: Arc::new(service),
        }))
    }
}

/// Puts the [`Identity`] stored in the session into request extensions.
pub struct SessionMiddleware<S> {
    service: Arc<S>,
}

impl<S, B> Service<ServiceRequest> for SessionMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        Box::pin(async move {
            let session = req.extract::<Session>().await?;
            match (
                session.get::<String>("login"),
                session.get::<RequestToken>("request_token"),
            ) {
                (Ok(Some(login)), Ok(request_token)) => {
                    req.extensions_mut().insert(Identity {
                        login,
                        request_token: request_token.unwrap_or_default(),
                    });
                }
                (Err(err), _) | (_, Err(err)) => {
                    log::error!("Unable to read identity from session:\n{err:?}");
                }
                _ => (),
            }
            service.call(req).await
        })
    }
}

/// Maps extractor failures to [`ControllerError::InvalidInput`].
fn rejected(field: &str, err: impl std::fmt::Display) -> actix_web::Error {
    ControllerError::InvalidInput {
        field: field.to_string(),
        msg: err.to_string(),
    }
    .into()
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(PayloadConfig::new(MAX_PAYLOAD_SIZE))
        .app_data(
            FormConfig::default()
                .limit(MAX_PAYLOAD_SIZE)
                .error_handler(|err, _| rejected("body", err)),
        )
        .app_data(
            JsonConfig::default()
                .limit(MAX_PAYLOAD_SIZE)
                .error_handler(|err, _| rejected("body", err)),
        )
        .app_data(PathConfig::default().error_handler(|err, _| rejected("path", err)));
    cfg.service(access::controllers::log_in)
        .service(access::controllers::log_out)
        .service(access::controllers::session_token)
        .service(export::controllers::list_ids)
        .service(export::controllers::fetch_details)
        .service(export::controllers::download_csv)
        .service(import::controllers::import_history)
        .service(import::controllers::target_products)
        .service(import::controllers::download_history)
        .default_service(web::to(not_found));
}
