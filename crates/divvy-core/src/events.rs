use serde::{Deserialize, Serialize};

use crate::{AccountId, Amount};

/// Observable ledger events, only emitted for non-zero effects.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Distributed { initiator: AccountId, amount: Amount },
    Withdrawn { account: AccountId, amount: Amount },
}

