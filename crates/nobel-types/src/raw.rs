//! Shapes of the public Nobel API dump (`/v1/prize.json`).
//!
//! The API delivers numeric fields as strings and uses `camelCase`. These
//! types mirror that form exactly and convert into the domain model with
//! [`TryFrom`], rejecting values that do not parse rather than zeroing them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::{Laureate, NonBlank, Prize, Share, blank_as_none};

/// Top-level document returned by the Nobel API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NobelResponse {
    /// All prizes in the dump.
    #[serde(default)]
    pub prizes: Vec<RawPrize>,
}

/// A prize as the API delivers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPrize {
    /// Award year.
    pub year: String,
    /// Category name.
    pub category: String,
    /// Laureates; missing for years in which the prize was not awarded.
    #[serde(default)]
    pub laureates: Vec<RawLaureate>,
    /// Collective motivation, if any.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub overall_motivation: Option<NonBlank>,
}

/// A laureate as the API delivers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLaureate {
    /// Identifier, as text.
    pub id: String,
    /// First name or organisation name.
    pub firstname: String,
    /// Surname, if any.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub surname: Option<NonBlank>,
    /// Individual motivation.
    #[serde(default)]
    pub motivation: String,
    /// Share denominator, as text.
    pub share: String,
}

impl TryFrom<RawLaureate> for Laureate {
    type Error = ModelError;

    fn try_from(raw: RawLaureate) -> Result<Self, Self::Error> {
        let id = parse_number::<i32>("id", &raw.id)?;
        let share = Share::new(parse_number::<u8>("share", &raw.share)?)?;
        Ok(Self {
            id,
            firstname: raw.firstname,
            surname: raw.surname,
            motivation: raw.motivation,
            share,
        })
    }
}

impl TryFrom<RawPrize> for Prize {
    type Error = ModelError;

    fn try_from(raw: RawPrize) -> Result<Self, Self::Error> {
        let category = raw.category.parse()?;
        let laureates = raw
            .laureates
            .into_iter()
            .map(Laureate::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            year: raw.year,
            category,
            laureates,
            overall_motivation: raw.overall_motivation,
        })
    }
}

impl NobelResponse {
    /// Convert every raw prize into the domain model.
    ///
    /// Stops at the first prize that fails validation.
    pub fn into_prizes(self) -> Result<Vec<Prize>, ModelError> {
        self.prizes.into_iter().map(Prize::try_from).collect()
    }
}

/// Collect the distinct laureates across `prizes`, keyed by id.
///
/// Laureates appear once per prize they won. Output order follows first
/// appearance; when an id repeats, its latest record replaces the earlier one.
pub fn unique_laureates(prizes: &[Prize]) -> Vec<Laureate> {
    let mut positions: BTreeMap<_, usize> = BTreeMap::new();
    let mut unique: Vec<Laureate> = Vec::new();
    for laureate in prizes.iter().flat_map(|prize| prize.laureates.iter()) {
        match positions.get(&laureate.id).and_then(|&index| unique.get_mut(index)) {
            Some(existing) => existing.clone_from(laureate),
            None => {
                positions.insert(laureate.id, unique.len());
                unique.push(laureate.clone());
            }
        }
    }
    unique
}

fn parse_number<T: core::str::FromStr>(field: &'static str, value: &str) -> Result<T, ModelError> {
    value
        .trim()
        .parse()
        .ok()
        .ok_or_else(|| ModelError::InvalidNumber {
            field,
            value: value.to_owned(),
        })
}
