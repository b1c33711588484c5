//! the two stable textual keys that cross the API boundary: slot keys
//! (`"YYYY-M-D-DUTY_ID"`) and person keys (`"Last, First"`).

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{DutyId, Person};

/// `"YYYY-M-D-DUTY_ID"`, non-padded month and day. identity is the
/// concatenated string; equality is string equality, so this type derives
/// `Eq`/`Ord`/`Hash` off its fields rather than any normalized form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub duty: DutyId,
}

impl SlotKey {
    pub fn new(date: NaiveDate, duty: DutyId) -> Self {
        Self { date, duty }
    }

    /// parses the wire-format slot key, mapping a malformed string (bad
    /// date, bad duty-id characters) to [`crate::error::CoreError::InvalidSlotKey`]
    /// -- the typed entry point spec.md §6 calls for at the API boundary.
    pub fn parse(raw: &str) -> Result<Self, crate::error::CoreError> {
        raw.parse::<SlotKey>()
            .map_err(|_| crate::error::CoreError::InvalidSlotKey {
                key: raw.to_string(),
                reason: "expected \"YYYY-M-D-DUTY_ID\" with a valid date and duty id".to_string(),
            })
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.date.format("%Y"),
            self.date.format("%-m"),
            self.date.format("%-d"),
            self.duty
        )
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed slot key")]
pub struct SlotKeyParseError;

impl FromStr for SlotKey {
    type Err = SlotKeyParseError;

    /// parsing splits on the *last* `-` only, so duty ids may not contain
    /// `-` themselves (they are restricted to `[A-Za-z0-9_]+`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let idx = s.rfind('-').ok_or(SlotKeyParseError)?;
        let (date_part, duty_part) = (&s[..idx], &s[idx + 1..]);

        if duty_part.is_empty()
            || !duty_part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(SlotKeyParseError);
        }

        let mut fields = date_part.splitn(3, '-');
        let (y, m, d) = (
            fields.next().ok_or(SlotKeyParseError)?,
            fields.next().ok_or(SlotKeyParseError)?,
            fields.next().ok_or(SlotKeyParseError)?,
        );
        let (y, m, d): (i32, u32, u32) = (
            y.parse().map_err(|_| SlotKeyParseError)?,
            m.parse().map_err(|_| SlotKeyParseError)?,
            d.parse().map_err(|_| SlotKeyParseError)?,
        );
        let date = NaiveDate::from_ymd_opt(y, m, d).ok_or(SlotKeyParseError)?;

        Ok(SlotKey {
            date,
            duty: DutyId(duty_part.to_string()),
        })
    }
}

/// `"Last, First"` exactly. opaque at the type level: this crate never
/// needs to split it back into first/last, only to compare it against
/// `Person::inverted_name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PersonKey(pub String);

impl PersonKey {
    pub fn of(person: &Person) -> Self {
        Self(person.inverted_name())
    }
}

impl fmt::Display for PersonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
