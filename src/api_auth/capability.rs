//! Capabilities and the permission gate.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

/// A single permission a credential can hold.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Deposit,
    Transfer,
    Read,
}

impl Capability {
    pub const ALL: [Capability; 3] = [Capability::Deposit, Capability::Transfer, Capability::Read];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Deposit => "deposit",
            Capability::Transfer => "transfer",
            Capability::Read => "read",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Capability::Deposit => 0x01,
            Capability::Transfer => 0x02,
            Capability::Read => 0x04,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deposit" => Ok(Capability::Deposit),
            "transfer" => Ok(Capability::Transfer),
            "read" => Ok(Capability::Read),
            _ => Err(LedgerError::InvalidRequest(format!(
                "Unknown permission: {}",
                s
            ))),
        }
    }
}

/// Set of capabilities held by a credential (bitmask).
///
/// Persisted as a JSON list of names, e.g. `["deposit","read"]`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// What a bearer token session holds.
    pub fn baseline() -> Self {
        Capability::ALL.into_iter().collect()
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn insert(&mut self, capability: Capability) {
        self.0 |= capability.bit();
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }

    pub fn to_vec(&self) -> Vec<Capability> {
        self.iter().collect()
    }

    /// Parse user-supplied permission names. Empty input is rejected.
    pub fn parse_names<S: AsRef<str>>(names: &[S]) -> Result<Self, LedgerError> {
        let set = names
            .iter()
            .map(|name| name.as_ref().parse::<Capability>())
            .collect::<Result<CapabilitySet, _>>()?;
        if set.is_empty() {
            return Err(LedgerError::invalid_request(
                "At least one permission is required",
            ));
        }
        Ok(set)
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = CapabilitySet::empty();
        for capability in iter {
            set.insert(capability);
        }
        set
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        for capability in self.iter() {
            seq.serialize_element(&capability)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SetVisitor;

        impl<'de> Visitor<'de> for SetVisitor {
            type Value = CapabilitySet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a list of permission names")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut set = CapabilitySet::empty();
                while let Some(name) = seq.next_element::<String>()? {
                    let capability = name.parse::<Capability>().map_err(de::Error::custom)?;
                    set.insert(capability);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_seq(SetVisitor)
    }
}

/// Permission gate: every capability in `required` must be held.
///
/// Reports the first missing capability in `required` order.
pub fn check(required: &[Capability], held: CapabilitySet) -> Result<(), LedgerError> {
    match required.iter().find(|c| !held.contains(**c)) {
        Some(missing) => Err(LedgerError::Forbidden(*missing)),
        None => Ok(()),
    }
}
