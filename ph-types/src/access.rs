use argon2::{Variant, Version};
use derive_more::{Deref, Display};
use rand::rngs::StdRng;
use rand::{distributions, Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use typesafe_repository::macros::Id;
use typesafe_repository::{GetIdentity, Identity, RefIdentity};

pub mod repository;
pub mod service;

pub const PASSWORD_LENGTH: u32 = 64;
pub const MIN_PASSWORD_LENGTH: u32 = 5;
pub const REQUEST_TOKEN_LENGTH: usize = 32;
pub const DEFAULT_ARGON_CONFIG: argon2::Config = argon2::Config {
    variant: Variant::Argon2i,
    version: Version::Version13,
    mem_cost: 65535,
    time_cost: 10,
    lanes: 4,
    secret: &[],
    ad: &[],
    hash_length: PASSWORD_LENGTH,
};

pub fn generate_salt() -> Salt {
    let mut salt = [0; 512];
    StdRng::from_entropy().fill_bytes(&mut salt);
    salt
}

pub type Salt = [u8; 512];

#[derive(
    Deref, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Display,
)]
pub struct Login(pub String);

#[derive(Id, Serialize, Deserialize, Debug, Clone)]
#[Id(ref_id, get_id)]
pub struct UserCredentials {
    #[id]
    pub login: Login,
    pub password: Password,
    pub access: BTreeSet<Access>,
}

impl UserCredentials {
    pub fn can_manage_price_history(&self) -> bool {
        self.access
            .iter()
            .any(|a| matches!(a, Access::ManagePriceHistory | Access::ControlPanel))
    }
}

#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Serialize, Deserialize, Display)]
pub enum Access {
    ManagePriceHistory,
    ControlPanel,
}

impl TryFrom<String> for Access {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s {
            x if x == Self::ManagePriceHistory.to_string() => Ok(Self::ManagePriceHistory),
            x if x == Self::ControlPanel.to_string() => Ok(Self::ControlPanel),
            x => Err(x),
        }
    }
}

#[derive(Clone, Debug, Deref, Serialize, Deserialize, PartialEq)]
pub struct Password {
    #[deref]
    password: String,
    #[serde(with = "serde_arrays")]
    salt: Salt,
}

impl Password {
    pub fn new(password: String, salt: Salt) -> Result<Password, anyhow::Error> {
        if password.len() < MIN_PASSWORD_LENGTH as usize {
            return Err(anyhow::anyhow!(
                "Password cannot be shorter than {MIN_PASSWORD_LENGTH}"
            ));
        }
        Ok(Self { password, salt })
    }
    pub fn check(&self, input: &String) -> Result<bool, anyhow::Error> {
        Ok(argon2::verify_encoded(&self.password, input.as_bytes())?)
    }
    pub fn generate(input: String, salt: Salt) -> Result<Password, anyhow::Error> {
        let password = argon2::hash_encoded(input.as_bytes(), &salt, &DEFAULT_ARGON_CONFIG)?;
        Ok(Self { password, salt })
    }
    pub fn salt(&self) -> &Salt {
        &self.salt
    }
    pub fn password(&self) -> &String {
        &self.password
    }
}

/// Per-session token that must accompany every data request.
#[derive(
    Debug, Default, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct RequestToken(pub String);

impl RequestToken {
    pub fn generate() -> Self {
        let token = StdRng::from_entropy()
            .sample_iter(distributions::Alphanumeric)
            .take(REQUEST_TOKEN_LENGTH)
            .map(char::from)
            .collect::<String>();
        Self(token)
    }

    pub fn matches(&self, presented: &str) -> bool {
        !self.0.is_empty() && self.0 == presented
    }
}

#[cfg(test)]
pub mod test {
    use super::*;

    #[test]
    fn parses_access_entries() {
        assert_eq!(
            Ok(Access::ManagePriceHistory),
            Access::try_from("ManagePriceHistory".to_string())
        );
        assert_eq!(
            Err("manage_woocommerce".to_string()),
            Access::try_from("manage_woocommerce".to_string())
        );
    }

    #[test]
    fn control_panel_implies_price_history_access() {
        let user = |access: &[Access]| UserCredentials {
            login: Login("u".to_string()),
            password: Password::new("secret".to_string(), [0; 512]).unwrap(),
            access: access.iter().cloned().collect(),
        };
        assert!(user(&[Access::ControlPanel]).can_manage_price_history());
        assert!(user(&[Access::ManagePriceHistory]).can_manage_price_history());
        assert!(!user(&[]).can_manage_price_history());
    }

    #[test]
    fn request_tokens_are_random_and_compared_exactly() {
        let a = RequestToken::generate();
        let b = RequestToken::generate();
        assert_eq!(REQUEST_TOKEN_LENGTH, a.0.len());
        assert_ne!(a, b);
        assert!(a.matches(&a.0.clone()));
        assert!(!a.matches(&b.0));
        assert!(!RequestToken(String::new()).matches(""));
    }
}
