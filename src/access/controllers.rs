use crate::control::{input, success, ControllerError, Identity, InputData, Message, Response};
use actix::Addr;
use actix_session::Session;
use actix_web::{get, post, web::Data};
use anyhow::Context as AnyhowContext;
use ph_types::access::service::UserCredentialsService;
use ph_types::access::{self, Login, RequestToken};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct LoginDto {
    pub login: Login,
    pub password: String,
}

#[derive(Serialize)]
pub struct SessionDto {
    pub login: Login,
    pub request_token: RequestToken,
}

#[post("/login")]
pub async fn log_in(
    form: InputData<LoginDto>,
    session: Session,
    service: Data<Addr<UserCredentialsService>>,
) -> Response {
    let form = input(form);
    let creds = service
        .send(access::service::Get(form.login.clone()))
        .await
        .context("Unable to send message to UserCredentialsService")??;
    let creds = match creds {
        Some(c) => c,
        None => {
            log::info!("Creds not found for {}", form.login);
            return Err(ControllerError::Unauthorized);
        }
    };
    if !creds
        .password
        .check(&form.password)
        .context("Unable to verify password")?
    {
        log::info!("Wrong password for {}", form.login);
        return Err(ControllerError::Unauthorized);
    }
    let request_token = RequestToken::generate();
    session.renew();
    session
        .insert("login", &creds.login)
        .context("Unable to insert login into session")?;
    session
        .insert("request_token", &request_token)
        .context("Unable to insert request token into session")?;
    Ok(success(SessionDto {
        login: creds.login,
        request_token,
    }))
}

#[get("/logout")]
pub async fn log_out(session: Session) -> Response {
    session.purge();
    Ok(success(Message {
        message: "Logged out".to_string(),
    }))
}

/// Token of the current session, for clients that lost the login response.
#[get("/token")]
pub async fn session_token(identity: Identity) -> Response {
    Ok(success(SessionDto {
        login: Login(identity.login),
        request_token: identity.request_token,
    }))
}
