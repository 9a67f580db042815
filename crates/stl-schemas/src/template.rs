//! Template (record type) identities.
//!
//! Short form `Module:Type` is what callers write; the ledger wants the
//! fully qualified `<packageId>:Module:Type`. Qualification is a pure
//! function of the short form and a package id; finding the package id is
//! the resolver's job (`stl-ledger`).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateIdError {
    Empty,
    /// Wrong number of `:`-separated segments, or an empty segment.
    Malformed(String),
}

impl fmt::Display for TemplateIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateIdError::Empty => write!(f, "empty template id"),
            TemplateIdError::Malformed(s) => write!(
                f,
                "malformed template id '{s}': expected Module:Type or <package>:Module:Type"
            ),
        }
    }
}

impl std::error::Error for TemplateIdError {}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TemplateId {
    Short {
        module: String,
        entity: String,
    },
    Qualified {
        package_id: String,
        module: String,
        entity: String,
    },
}

impl TemplateId {
    pub fn parse(raw: &str) -> Result<Self, TemplateIdError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TemplateIdError::Empty);
        }
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(TemplateIdError::Malformed(raw.to_string()));
        }
        match parts.as_slice() {
            [module, entity] => Ok(TemplateId::Short {
                module: module.to_string(),
                entity: entity.to_string(),
            }),
            [package_id, module, entity] => Ok(TemplateId::Qualified {
                package_id: package_id.to_string(),
                module: module.to_string(),
                entity: entity.to_string(),
            }),
            _ => Err(TemplateIdError::Malformed(raw.to_string())),
        }
    }

    pub fn short(module: impl Into<String>, entity: impl Into<String>) -> Self {
        TemplateId::Short {
            module: module.into(),
            entity: entity.into(),
        }
    }

    pub fn module(&self) -> &str {
        match self {
            TemplateId::Short { module, .. } | TemplateId::Qualified { module, .. } => module,
        }
    }

    pub fn entity(&self) -> &str {
        match self {
            TemplateId::Short { entity, .. } | TemplateId::Qualified { entity, .. } => entity,
        }
    }

    pub fn package_id(&self) -> Option<&str> {
        match self {
            TemplateId::Short { .. } => None,
            TemplateId::Qualified { package_id, .. } => Some(package_id),
        }
    }

    pub fn is_qualified(&self) -> bool {
        matches!(self, TemplateId::Qualified { .. })
    }

    /// `Module:Type`, dropping any package id.
    pub fn short_form(&self) -> TemplateId {
        TemplateId::short(self.module(), self.entity())
    }

    /// Attach `package_id`. An already-qualified id is re-pointed at the new package.
    pub fn qualify(&self, package_id: &str) -> TemplateId {
        TemplateId::Qualified {
            package_id: package_id.to_string(),
            module: self.module().to_string(),
            entity: self.entity().to_string(),
        }
    }

    /// Same module and entity, ignoring package ids.
    pub fn same_type(&self, other: &TemplateId) -> bool {
        self.module() == other.module() && self.entity() == other.entity()
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateId::Short { module, entity } => write!(f, "{module}:{entity}"),
            TemplateId::Qualified {
                package_id,
                module,
                entity,
            } => write!(f, "{package_id}:{module}:{entity}"),
        }
    }
}

impl TryFrom<String> for TemplateId {
    type Error = TemplateIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TemplateId::parse(&value)
    }
}

impl From<TemplateId> for String {
    fn from(t: TemplateId) -> Self {
        t.to_string()
    }
}

impl std::str::FromStr for TemplateId {
    type Err = TemplateIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TemplateId::parse(s)
    }
}
