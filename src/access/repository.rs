use crate::SqlWrapper;
use async_trait::async_trait;
use itertools::Itertools;
use ph_types::access::repository::UserCredentialsRepository;
use ph_types::access::{Access, Login, Password, Salt, UserCredentials};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::{Get, Save};
use typesafe_repository::{IdentityOf, Repository};

pub struct SqliteUserCredentialsRepository {
    conn: Connection,
}

impl SqliteUserCredentialsRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS user_credentials (
                    login TEXT PRIMARY KEY,
                    password TEXT NOT NULL,
                    salt BLOB NOT NULL,
                    access TEXT NOT NULL DEFAULT ''
                );",
            )?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

impl<'a, 'b> TryFrom<&'a Row<'b>> for SqlWrapper<UserCredentials> {
    type Error = rusqlite::Error;

    fn try_from(row: &'a Row<'b>) -> Result<Self, Self::Error> {
        let conversion = |idx: usize, err: anyhow::Error| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err.into())
        };
        let salt: Vec<u8> = row.get(2)?;
        let salt = Salt::try_from(salt.as_slice()).map_err(|err| conversion(2, err.into()))?;
        let access: String = row.get(3)?;
        Ok(SqlWrapper(UserCredentials {
            login: Login(row.get(0)?),
            password: Password::new(row.get(1)?, salt).map_err(|err| conversion(1, err))?,
            access: access
                .split(',')
                .filter(|a| !a.is_empty())
                .map(|a| Access::try_from(a.to_string()))
                .collect::<Result<_, _>>()
                .map_err(|a| conversion(3, anyhow::anyhow!("Invalid access entry: {a}")))?,
        }))
    }
}

impl Repository<UserCredentials> for SqliteUserCredentialsRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Get<UserCredentials> for SqliteUserCredentialsRepository {
    async fn get_one(
        &self,
        id: &IdentityOf<UserCredentials>,
    ) -> Result<Option<UserCredentials>, Self::Error> {
        let login = id.0.clone();
        Ok(self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT login, password, salt, access FROM user_credentials WHERE login = ?1",
                        [login],
                        |row| SqlWrapper::<UserCredentials>::from_sql(row),
                    )
                    .optional()?)
            })
            .await?)
    }
}

#[async_trait]
impl Save<UserCredentials> for SqliteUserCredentialsRepository {
    async fn save(&self, creds: UserCredentials) -> Result<(), Self::Error> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO user_credentials (login, password, salt, access)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(login) DO UPDATE SET password=?2, salt=?3, access=?4",
                    params![
                        creds.login.0,
                        creds.password.password(),
                        creds.password.salt().as_slice(),
                        creds.access.iter().join(","),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

impl UserCredentialsRepository for SqliteUserCredentialsRepository {}
