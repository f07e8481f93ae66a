//! Prize and laureate payloads in their wire form.
//!
//! Field names on the wire are `PascalCase` (`Year`, `Category`,
//! `Laureates`, `OverallMotivation`, `Id`, `Firstname`, `Surname`,
//! `Motivation`, `Share`). Optional text fields are omitted when absent and
//! decode a missing, `null` or empty string as `None`, so producers that
//! write `""` for "no value" interoperate.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ModelError;

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// The fixed set of Nobel prize categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Physics.
    Physics,
    /// Chemistry.
    Chemistry,
    /// Physiology or Medicine.
    Medicine,
    /// Literature.
    Literature,
    /// Peace.
    Peace,
    /// Economic Sciences (Sveriges Riksbank Prize).
    Economics,
}

impl Category {
    /// Every category, in the order the Nobel committee lists them.
    pub const ALL: [Self; 6] = [
        Self::Physics,
        Self::Chemistry,
        Self::Medicine,
        Self::Literature,
        Self::Peace,
        Self::Economics,
    ];

    /// The lowercase name used on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Physics => "physics",
            Self::Chemistry => "chemistry",
            Self::Medicine => "medicine",
            Self::Literature => "literature",
            Self::Peace => "peace",
            Self::Economics => "economics",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ModelError::UnknownCategory(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Share
// ---------------------------------------------------------------------------

/// Denominator of a laureate's fraction of a prize (1 = whole prize, 4 = a quarter).
///
/// Encoded as a bare integer. Values outside `1..=4` are rejected on
/// construction and on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Share(u8);

impl Share {
    /// The laureate received the whole prize.
    pub const WHOLE: Self = Self(1);

    /// Build a share, rejecting denominators outside `1..=4`.
    pub const fn new(denominator: u8) -> Result<Self, ModelError> {
        if matches!(denominator, 1..=4) {
            Ok(Self(denominator))
        } else {
            Err(ModelError::InvalidShare(denominator))
        }
    }

    /// Return the denominator.
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Share {
    type Error = ModelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Share> for u8 {
    fn from(share: Share) -> Self {
        share.0
    }
}

impl fmt::Display for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1/{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// NonBlank
// ---------------------------------------------------------------------------

/// Text that is never empty or whitespace only.
///
/// Optional fields hold `Option<NonBlank>`, so "no value" has exactly one
/// representation and encoding followed by decoding gives back the same value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonBlank(String);

impl NonBlank {
    /// Wrap `value`, or `None` if it is blank.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        (!value.trim().is_empty()).then_some(Self(value))
    }

    /// Borrow the text.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for NonBlank {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(ModelError::BlankText)
    }
}

impl From<NonBlank> for String {
    fn from(text: NonBlank) -> Self {
        text.0
    }
}

impl AsRef<str> for NonBlank {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for NonBlank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Laureate / Prize
// ---------------------------------------------------------------------------

/// A person or organisation awarded (part of) a prize.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Laureate {
    /// Nobel API identifier.
    pub id: i32,
    /// First name, or the full name of an organisation.
    pub firstname: String,
    /// Surname; absent for organisations and mononymous laureates.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "blank_as_none"
    )]
    pub surname: Option<NonBlank>,
    /// Individual motivation text.
    pub motivation: String,
    /// Fraction denominator of the prize this laureate received.
    pub share: Share,
}

impl Laureate {
    /// First name and surname joined by a space (or just the first name).
    pub fn full_name(&self) -> String {
        match &self.surname {
            Some(surname) => format!("{} {surname}", self.firstname),
            None => self.firstname.clone(),
        }
    }
}

/// A prize awarded in one category for one year.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Prize {
    /// Award year exactly as the source gave it (e.g. `"1921"`).
    pub year: String,
    /// Prize category.
    pub category: Category,
    /// Laureates sharing the prize. May be empty (prize not awarded).
    #[serde(default)]
    pub laureates: Vec<Laureate>,
    /// Motivation shared by all laureates, when given collectively.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "blank_as_none"
    )]
    pub overall_motivation: Option<NonBlank>,
}

/// Decode an optional string, folding blank text into `None`.
pub(crate) fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<NonBlank>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(NonBlank::new))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn einstein() -> Laureate {
        Laureate {
            id: 26,
            firstname: "Albert".to_owned(),
            surname: NonBlank::new("Einstein"),
            motivation: "for his services to Theoretical Physics".to_owned(),
            share: Share::WHOLE,
        }
    }

    #[test]
    fn laureate_uses_pascal_case_field_names() {
        let value = serde_json::to_value(einstein()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "Id": 26,
                "Firstname": "Albert",
                "Surname": "Einstein",
                "Motivation": "for his services to Theoretical Physics",
                "Share": 1
            })
        );
    }

    #[test]
    fn absent_surname_is_omitted() {
        let mut laureate = einstein();
        laureate.surname = None;
        let value = serde_json::to_value(&laureate).unwrap();
        assert!(value.get("Surname").is_none());
    }

    #[test]
    fn empty_surname_decodes_as_none() {
        let json = r#"{"Id":482,"Firstname":"Institute of International Law","Surname":"","Motivation":"","Share":1}"#;
        let laureate: Laureate = serde_json::from_str(json).unwrap();
        assert_eq!(laureate.surname, None);
        assert_eq!(laureate.full_name(), "Institute of International Law");
    }

    #[test]
    fn null_optionals_decode_as_none() {
        let json = r#"{"Year":"1914","Category":"physics","Laureates":[],"OverallMotivation":null}"#;
        let prize: Prize = serde_json::from_str(json).unwrap();
        assert_eq!(prize.overall_motivation, None);
        assert!(prize.laureates.is_empty());
    }

    #[test]
    fn prize_round_trips() {
        let prize = Prize {
            year: "1921".to_owned(),
            category: Category::Physics,
            laureates: vec![einstein()],
            overall_motivation: None,
        };
        let bytes = serde_json::to_vec(&prize).unwrap();
        let decoded: Prize = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, prize);
    }

    #[test]
    fn blank_text_has_no_representation() {
        assert_eq!(NonBlank::new(""), None);
        assert_eq!(NonBlank::new("  "), None);
        assert_eq!(NonBlank::new("Curie").map(String::from), Some("Curie".to_owned()));
        assert!(serde_json::from_str::<NonBlank>("\"\"").is_err());
    }

    #[test]
    fn blank_optionals_round_trip() {
        let organisation = Laureate {
            id: 482,
            firstname: "Institute of International Law".to_owned(),
            surname: NonBlank::new(""),
            motivation: String::new(),
            share: Share::WHOLE,
        };
        let bytes = serde_json::to_vec(&organisation).unwrap();
        assert_eq!(serde_json::from_slice::<Laureate>(&bytes).unwrap(), organisation);

        let prize = Prize {
            year: "1904".to_owned(),
            category: Category::Peace,
            laureates: vec![organisation],
            overall_motivation: NonBlank::new(" "),
        };
        let bytes = serde_json::to_vec(&prize).unwrap();
        assert_eq!(serde_json::from_slice::<Prize>(&bytes).unwrap(), prize);

        let with_motivation = Prize {
            overall_motivation: NonBlank::new("collective"),
            ..prize
        };
        let bytes = serde_json::to_vec(&with_motivation).unwrap();
        assert_eq!(serde_json::from_slice::<Prize>(&bytes).unwrap(), with_motivation);
    }

    #[test]
    fn share_rejects_out_of_range() {
        assert_eq!(Share::new(0), Err(ModelError::InvalidShare(0)));
        assert_eq!(Share::new(5), Err(ModelError::InvalidShare(5)));
        assert_eq!(Share::new(4).map(Share::get), Ok(4));
    }

    #[test]
    fn share_out_of_range_fails_decode() {
        let json = r#"{"Id":1,"Firstname":"A","Motivation":"","Share":7}"#;
        assert!(serde_json::from_str::<Laureate>(json).is_err());
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("Peace".parse::<Category>(), Ok(Category::Peace));
        assert_eq!(" economics ".parse::<Category>(), Ok(Category::Economics));
        assert!("alchemy".parse::<Category>().is_err());
    }

    #[test]
    fn category_wire_form_is_lowercase() {
        let value = serde_json::to_value(Category::Medicine).unwrap();
        assert_eq!(value, serde_json::json!("medicine"));
    }
}
