use derive_more::Display;
use serde::{Deserialize, Serialize};

pub mod access;
pub mod catalog;
pub mod history;
pub mod record;

/// Number of IDs processed by one detail fetch.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Lookback window of the lowest price column, in days.
pub const LOWEST_PRICE_WINDOW_DAYS: u32 = 30;

pub const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    #[display("publish")]
    Publish,
    #[display("private")]
    Private,
    #[display("draft")]
    Draft,
    #[display("pending")]
    Pending,
    #[display("future")]
    Future,
    #[display("trash")]
    Trash,
}

impl EntityStatus {
    /// Statuses whose entities take part in a full export.
    pub const EXPORTABLE: [EntityStatus; 5] = [
        Self::Publish,
        Self::Private,
        Self::Draft,
        Self::Pending,
        Self::Future,
    ];
}

impl TryFrom<&str> for EntityStatus {
    type Error = anyhow::Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "publish" => Ok(Self::Publish),
            "private" => Ok(Self::Private),
            "draft" => Ok(Self::Draft),
            "pending" => Ok(Self::Pending),
            "future" => Ok(Self::Future),
            "trash" => Ok(Self::Trash),
            s => Err(anyhow::anyhow!("Unknown entity status {s}")),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[display("simple")]
    Simple,
    #[display("variable")]
    Variable,
    #[display("grouped")]
    Grouped,
    #[display("external")]
    External,
    #[display("variation")]
    Variation,
}

impl TryFrom<&str> for EntityKind {
    type Error = anyhow::Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "simple" => Ok(Self::Simple),
            "variable" => Ok(Self::Variable),
            "grouped" => Ok(Self::Grouped),
            "external" => Ok(Self::External),
            "variation" => Ok(Self::Variation),
            s => Err(anyhow::anyhow!("Unknown entity kind {s}")),
        }
    }
}
