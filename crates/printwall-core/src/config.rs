use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_COLUMN_CAPACITY: usize = 8192;
pub const DEFAULT_GROUP_CAPACITY: usize = 8192;

/// What a server-initiated `close_group` does to a live group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupClosePolicy {
    /// Mark the group finished and leave it to natural eviction.
    #[default]
    Keep,
    /// Remove the group and discard its rows immediately.
    Evict,
}

impl GroupClosePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupClosePolicy::Keep => "keep",
            GroupClosePolicy::Evict => "evict",
        }
    }
}

impl fmt::Display for GroupClosePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupClosePolicy {
    type Err = ConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "keep" | "mark" | "defer" => Ok(GroupClosePolicy::Keep),
            "evict" | "remove" | "close" => Ok(GroupClosePolicy::Evict),
            other => Err(ConfigError::UnknownClosePolicy(other.to_string())),
        }
    }
}

/// Tunables of one viewing session.
///
/// `max_groups` has no default on purpose: deployments disagree on it, so it
/// is always supplied at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewConfig {
    pub column_capacity: usize,
    pub group_capacity: usize,
    pub max_groups: usize,
    pub close_policy: GroupClosePolicy,
}

impl ViewConfig {
    pub fn new(max_groups: usize) -> Result<Self, ConfigError> {
        Self {
            column_capacity: DEFAULT_COLUMN_CAPACITY,
            group_capacity: DEFAULT_GROUP_CAPACITY,
            max_groups,
            close_policy: GroupClosePolicy::default(),
        }
        .validated()
    }

    pub fn with_capacities(
        mut self,
        column_capacity: usize,
        group_capacity: usize,
    ) -> Result<Self, ConfigError> {
        self.column_capacity = column_capacity;
        self.group_capacity = group_capacity;
        self.validated()
    }

    pub fn with_close_policy(mut self, close_policy: GroupClosePolicy) -> Self {
        self.close_policy = close_policy;
        self
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.column_capacity == 0 {
            return Err(ConfigError::ZeroCapacity {
                name: "column_capacity",
            });
        }
        if self.group_capacity == 0 {
            return Err(ConfigError::ZeroCapacity {
                name: "group_capacity",
            });
        }
        if self.max_groups == 0 {
            return Err(ConfigError::ZeroCapacity { name: "max_groups" });
        }
        Ok(self)
    }
}
