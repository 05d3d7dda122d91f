use crate::access::{
    generate_salt, repository::UserCredentialsRepository, Access, Login, Password,
    UserCredentials,
};
use actix::prelude::*;
use actix::ResponseActFuture;
use log_error::*;
use rand::{distributions, Rng};
use std::sync::Arc;
use typesafe_repository::IdentityOf;

pub const ADMIN_LOGIN: &str = "admin";

pub struct UserCredentialsService {
    repo: Arc<dyn UserCredentialsRepository>,
    admin_password: Option<String>,
}

impl UserCredentialsService {
    pub fn new(repo: Arc<dyn UserCredentialsRepository>, admin_password: Option<String>) -> Self {
        Self {
            repo,
            admin_password,
        }
    }
}

impl Actor for UserCredentialsService {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let admin_pwd = self.admin_password.take().unwrap_or_else(|| {
            let pwd = rand::thread_rng()
                .sample_iter(distributions::Alphanumeric)
                .take(20)
                .map(char::from)
                .collect::<String>();
            log::warn!("ADMIN_PASSWORD is not set, generated admin password is {pwd}");
            pwd
        });
        let addr = ctx.address();
        ctx.spawn(
            async move {
                let admin_pwd = match Password::generate(admin_pwd, generate_salt()) {
                    Ok(p) => p,
                    Err(err) => {
                        log::error!("Unable to hash admin password: {err}");
                        return;
                    }
                };
                let admin = UserCredentials {
                    login: Login(ADMIN_LOGIN.to_string()),
                    password: admin_pwd,
                    access: [Access::ControlPanel].into_iter().collect(),
                };
                let res = addr
                    .send(Update(admin))
                    .await
                    .log_error("Unable to send admin to UserCredentialsService")
                    .and_then(|r| r.log_error("Unable to save admin"));
                if res.is_some() {
                    log::info!("Admin updated successfully");
                }
            }
            .into_actor(self),
        );
    }
}

#[derive(Message)]
#[rtype(result = "Result<Option<UserCredentials>, anyhow::Error>")]
pub struct Get(pub IdentityOf<UserCredentials>);

#[derive(Message)]
#[rtype(result = "Result<(), anyhow::Error>")]
pub struct Update(pub UserCredentials);

impl Handler<Get> for UserCredentialsService {
    type Result = ResponseActFuture<Self, Result<Option<UserCredentials>, anyhow::Error>>;

    fn handle(&mut self, Get(id): Get, _: &mut Self::Context) -> Self::Result {
        let repo = self.repo.clone();
        Box::pin(async move { repo.get_one(&id).await }.into_actor(self))
    }
}

impl Handler<Update> for UserCredentialsService {
    type Result = ResponseActFuture<Self, Result<(), anyhow::Error>>;

    fn handle(&mut self, Update(creds): Update, _: &mut Self::Context) -> Self::Result {
        let repo = self.repo.clone();
        Box::pin(async move { repo.save(creds).await }.into_actor(self))
    }
}
