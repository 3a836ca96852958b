// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, ops::Deref, str::FromStr, sync::Arc};

/// An account on the ledger, identified by its canonical string form and its
/// position within the configured address set.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    value: String,
    index: usize,
}

impl Address {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Hex addresses compare case-insensitively on the ledger, so they are folded
/// to lower case. Anything else is only trimmed.
pub fn canonicalize_address(raw: &str) -> String {
    let trimmed = raw.trim();
    let is_hex = trimmed.len() > 2
        && (trimmed.starts_with("0x") || trimmed.starts_with("0X"))
        && trimmed[2..].chars().all(|c| c.is_ascii_hexdigit());
    if is_hex {
        format!("0x{}", trimmed[2..].to_ascii_lowercase())
    } else {
        trimmed.to_string()
    }
}

/// The immutable set of addresses every node picks its peers from. Cheap to
/// clone; all nodes share one allocation.
#[derive(Clone, Debug)]
pub struct AddressSet {
    addresses: Arc<Vec<Address>>,
}

impl AddressSet {
    pub fn new<I, S>(raw: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut addresses = Vec::new();
        for (index, raw) in raw.into_iter().enumerate() {
            let value = canonicalize_address(raw.as_ref());
            if value.is_empty() {
                return Err(Error::InvalidConfiguration(format!(
                    "address #{} is empty",
                    index
                )));
            }
            if !seen.insert(value.clone()) {
                return Err(Error::InvalidConfiguration(format!(
                    "address {} appears more than once",
                    value
                )));
            }
            addresses.push(Address { value, index });
        }
        if addresses.len() < 2 {
            return Err(Error::InvalidConfiguration(format!(
                "at least 2 addresses are required, got {}",
                addresses.len()
            )));
        }
        Ok(Self {
            addresses: Arc::new(addresses),
        })
    }

    pub fn find(&self, raw: &str) -> Option<&Address> {
        let value = canonicalize_address(raw);
        self.addresses.iter().find(|address| address.value == value)
    }
}

impl Deref for AddressSet {
    type Target = [Address];

    fn deref(&self) -> &Self::Target {
        &self.addresses
    }
}

/// Ledger-assigned transaction identifier. Opaque to the harness.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxnId(String);

impl TxnId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value transfer about to be submitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub gas_limit: u64,
    pub nonce: u64,
}

/// A transaction as reported back by the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerTransaction {
    pub id: TxnId,
    pub from: String,
    pub to: Option<String>,
    pub amount: u128,
    pub nonce: u64,
    /// Set once the transaction is included in a block.
    pub block: Option<BlockId>,
}

impl LedgerTransaction {
    pub fn is_included(&self) -> bool {
        self.block.is_some()
    }
}

/// The account a worker node drives, with the credential needed to unlock it.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    pub address: String,
    pub password: Option<String>,
}

impl AccountIdentity {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

// Keep passwords out of logs.
impl fmt::Debug for AccountIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountIdentity")
            .field("address", &self.address)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl FromStr for AccountIdentity {
    type Err = Error;

    /// Parses `address` or `address:password`.
    fn from_str(s: &str) -> Result<Self> {
        let (address, password) = match s.split_once(':') {
            Some((address, password)) => (address, Some(password)),
            None => (s, None),
        };
        if address.trim().is_empty() {
            return Err(Error::InvalidConfiguration(format!(
                "account identity {:?} has no address",
                s
            )));
        }
        Ok(Self {
            address: address.trim().to_string(),
            password: password.map(str::to_string),
        })
    }
}
