//! Lookup catalogs the pipeline resolves ids from. They are maintained by
//! other systems; the receiver only reads them.

use serde::{Deserialize, Serialize};

/// Known signal types, keyed by signal code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SignalType {
    pub id: i64,
    pub signal_code: String,
    pub description: Option<String>,
}

impl SignalType {
    pub const TABLE: &'static str = "signal_types";
    pub const ID: &'static str = "id";
    pub const SIGNAL_CODE: &'static str = "signal_code";
}

/// Monitored installations, keyed by account code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct System {
    pub id: i64,
    pub account_code: String,
    pub name: Option<String>,
}

impl System {
    pub const TABLE: &'static str = "systems";
    pub const ID: &'static str = "id";
    pub const ACCOUNT_CODE: &'static str = "account_code";
}

/// Zones of an installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Zone {
    pub id: i64,
    pub system_id: i64,
    pub zone_number: i64,
    pub description: Option<String>,
}

impl Zone {
    pub const TABLE: &'static str = "zones";
    pub const ID: &'static str = "id";
    pub const SYSTEM_ID: &'static str = "system_id";
    pub const ZONE_NUMBER: &'static str = "zone_number";
}
