/// Period and category keys for the monthly dedup ledger.
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::fmt;

/// A calendar (year, month) pair scoping deduplicated counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Period {
    pub year: i32,
    /// 1–12.
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Self {
        debug_assert!((1..=12).contains(&month), "month out of range: {month}");
        Self { year, month }
    }

    /// The period containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::new(date.year(), date.month())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Kind of entity counted in the ledger.
///
/// The category namespaces ids within a period, so a user and an app that
/// happen to share a raw id never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    User,
    App,
}

impl Category {
    /// Integer stored in the `idType` column.
    pub fn as_id(self) -> i64 {
        match self {
            Self::User => 1,
            Self::App => 2,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::User),
            2 => Some(Self::App),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::App => "app",
        }
    }
}
