//! Resource key parsing.

use std::{fmt, ops::RangeInclusive};

use super::error::DomainError;

const CHARACTER: &str = "character";

/// Identifier ranges ESI assigns to characters: NPC agents, legacy player characters and
/// current player characters. Anything else is a different entity kind.
const CHARACTER_ID_RANGES: [RangeInclusive<i64>; 3] = [
    3_000_000..=3_999_999,
    90_000_000..=97_999_999,
    100_000_000..=2_147_483_647,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacterId(i64);

impl CharacterId {
    /// Parse a path segment.
    ///
    /// Non-numeric or non-positive input is malformed. A positive number outside the character
    /// ranges names something that cannot be a character, so it is reported as unknown.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::malformed_key(
                CHARACTER,
                raw,
                "expected a positive integer",
            ));
        }

        let value: i64 = trimmed.parse().map_err(|_| {
            DomainError::malformed_key(CHARACTER, raw, "identifier is out of integer range")
        })?;
        if value == 0 {
            return Err(DomainError::malformed_key(
                CHARACTER,
                raw,
                "expected a positive integer",
            ));
        }

        Self::try_from(value)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for CharacterId {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if CHARACTER_ID_RANGES.iter().any(|range| range.contains(&value)) {
            Ok(Self(value))
        } else {
            Err(DomainError::unknown_key(CHARACTER, value))
        }
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
