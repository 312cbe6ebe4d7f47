//! Raw update records as yielded by a record source, and their typed
//! classification.

use serde::{Deserialize, Serialize};

use crate::address::{normalize_prefix, AddressRange};
use crate::error::ElementError;
use crate::model::RawFact;

/// Record-level status reported by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStatus {
    Valid,
    FilteredSource,
    EmptySource,
    CorruptedSource,
    CorruptedRecord,
    UnsupportedRecord,
    OutsideInterval,
}

/// Element type tag. Only announcements and withdrawals produce facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementType {
    #[serde(rename = "A")]
    Announcement,
    #[serde(rename = "W")]
    Withdrawal,
    #[serde(rename = "R")]
    Rib,
    #[serde(rename = "S")]
    PeerState,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordElement {
    #[serde(rename = "type")]
    pub elem_type: ElementType,
    #[serde(default)]
    pub prefix: Option<String>,
    /// Whitespace-delimited hop list, announcements only.
    #[serde(default, rename = "as-path")]
    pub as_path: Option<String>,
    pub time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Feed (collector) the record came from.
    #[serde(default)]
    pub feed: String,
    pub time: i64,
    pub status: RecordStatus,
    #[serde(default)]
    pub elements: Vec<RecordElement>,
}

impl RawRecord {
    pub fn is_valid(&self) -> bool {
        self.status == RecordStatus::Valid
    }
}

/// Typed view of one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedElement {
    None,
    Announcement {
        path: Vec<i64>,
        origin: i64,
        range: AddressRange,
        time: i64,
    },
    Withdrawal {
        range: AddressRange,
        time: i64,
    },
}

impl ParsedElement {
    pub fn from_element(elem: &RecordElement) -> Result<Self, ElementError> {
        match elem.elem_type {
            ElementType::Announcement => {
                let prefix = elem.prefix.as_deref().ok_or(ElementError::MissingField("prefix"))?;
                let raw_path = elem.as_path.as_deref().ok_or(ElementError::MissingField("as-path"))?;
                let path = parse_path(raw_path)?;
                let origin = *path.last().ok_or(ElementError::EmptyPath)?;
                Ok(Self::Announcement {
                    path,
                    origin,
                    range: normalize_prefix(prefix)?,
                    time: elem.time,
                })
            }
            ElementType::Withdrawal => {
                let prefix = elem.prefix.as_deref().ok_or(ElementError::MissingField("prefix"))?;
                Ok(Self::Withdrawal {
                    range: normalize_prefix(prefix)?,
                    time: elem.time,
                })
            }
            ElementType::Rib | ElementType::PeerState | ElementType::Other => Ok(Self::None),
        }
    }

    pub fn into_fact(self) -> Option<RawFact> {
        match self {
            Self::None => None,
            Self::Announcement {
                path, range, time, ..
            } => Some(RawFact::announcement(path, range, time)),
            Self::Withdrawal { range, time } => Some(RawFact::withdrawal(range, time)),
        }
    }
}

/// Split a whitespace-delimited hop list. AS sets (`{1,2}`) are rejected.
fn parse_path(raw: &str) -> Result<Vec<i64>, ElementError> {
    let path = raw
        .split_whitespace()
        .map(|hop| {
            hop.parse::<i64>()
                .map_err(|_| ElementError::InvalidHop(hop.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if path.is_empty() {
        return Err(ElementError::EmptyPath);
    }
    Ok(path)
}
