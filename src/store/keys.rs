//! Typed keys into a record's key-value store.

use std::fmt;

/// Reserved keys holding selector state. Reads of these fields never go
/// through a selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKey {
    /// Outstanding load per host.
    Load,
    /// Accrued cost per host.
    Cost,
    /// Regions currently active for the record.
    Selected,
    /// Cost bookkeeping kept by the surrounding system.
    RealCost,
}

impl MetaKey {
    /// Every reserved key.
    pub const ALL: [MetaKey; 4] = [Self::Load, Self::Cost, Self::Selected, Self::RealCost];

    /// Name the key is stored under.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "LOAD",
            Self::Cost => "COST",
            Self::Selected => "SELECTED",
            Self::RealCost => "REALCOST",
        }
    }

    /// The reserved key a field name refers to, if any.
    #[must_use]
    pub fn from_field(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

/// Key of a single entry in a record store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Selector state.
    Meta(MetaKey),
    /// A tracked field's latency vector.
    Field(String),
}

impl StoreKey {
    /// Key for a field. Reserved names map to their [`MetaKey`].
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        let name = name.into();
        match MetaKey::from_field(&name) {
            Some(meta) => Self::Meta(meta),
            None => Self::Field(name),
        }
    }

    /// Name the entry is stored under.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Meta(meta) => meta.as_str(),
            Self::Field(name) => name,
        }
    }
}

impl From<MetaKey> for StoreKey {
    fn from(key: MetaKey) -> Self {
        Self::Meta(key)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
