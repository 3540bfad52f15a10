use crate::error::ProtocolError;
use std::fmt;
use std::str::FromStr;

pub const TOKEN_HEX_LEN: usize = 32;

/// 128-bit group identifier, rendered as 32 lowercase hex characters.
///
/// The all-zero token is reserved: it addresses the column itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupToken(u128);

impl GroupToken {
    pub const SENTINEL: Self = Self(0);

    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    pub const fn as_u128(self) -> u128 {
        self.0
    }

    pub const fn is_sentinel(self) -> bool {
        self.0 == 0
    }

    /// A fresh random non-sentinel token.
    pub fn random() -> Self {
        loop {
            let value = uuid::Uuid::new_v4().as_u128();
            if value != 0 {
                return Self(value);
            }
        }
    }

    /// Parses an optional wire id. Absent, empty and sentinel ids all mean
    /// "no group".
    pub fn parse_optional(raw: Option<&str>) -> Result<Option<Self>, ProtocolError> {
        match raw {
            None => Ok(None),
            Some(value) if value.is_empty() => Ok(None),
            Some(value) => {
                let token = value.parse::<GroupToken>()?;
                Ok((!token.is_sentinel()).then_some(token))
            }
        }
    }
}

impl fmt::Display for GroupToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for GroupToken {
    type Err = ProtocolError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.len() != TOKEN_HEX_LEN || !input.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(ProtocolError::InvalidToken(input.to_string()));
        }
        u128::from_str_radix(input, 16)
            .map(GroupToken)
            .map_err(|_| ProtocolError::InvalidToken(input.to_string()))
    }
}
