use std::fmt;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(LocationId);
id_newtype!(TechnicianId);
id_newtype!(ClientId);
id_newtype!(AppointmentId);
id_newtype!(ServiceId);
id_newtype!(ProductId);
id_newtype!(LineItemId);
id_newtype!(BlockId);
id_newtype!(SeriesId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    CheckedIn,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 7] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::CheckedIn,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    /// The forward action offered for an appointment in this status, if any.
    pub fn next_action(self) -> Option<AppointmentStatus> {
        match self {
            AppointmentStatus::Pending => Some(AppointmentStatus::Confirmed),
            AppointmentStatus::Confirmed => Some(AppointmentStatus::CheckedIn),
            AppointmentStatus::CheckedIn => Some(AppointmentStatus::InProgress),
            AppointmentStatus::InProgress => Some(AppointmentStatus::Completed),
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }

    /// Still occupies the technician's calendar.
    pub fn is_active(self) -> bool {
        !matches!(
            self,
            AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }

    /// Whether `to` follows the usual front-desk flow from `self`.
    ///
    /// This is advisory only; the API accepts any status.
    pub fn is_conventional_transition(self, to: AppointmentStatus) -> bool {
        if self == to {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match to {
            AppointmentStatus::Cancelled => true,
            AppointmentStatus::NoShow => matches!(
                self,
                AppointmentStatus::Pending | AppointmentStatus::Confirmed
            ),
            _ => self.rank() < to.rank(),
        }
    }

    fn rank(self) -> u8 {
        match self {
            AppointmentStatus::Pending => 0,
            AppointmentStatus::Confirmed => 1,
            AppointmentStatus::CheckedIn => 2,
            AppointmentStatus::InProgress => 3,
            AppointmentStatus::Completed => 4,
            AppointmentStatus::Cancelled | AppointmentStatus::NoShow => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::CheckedIn => "CHECKED_IN",
            AppointmentStatus::InProgress => "IN_PROGRESS",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
            AppointmentStatus::NoShow => "NO_SHOW",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("unknown appointment status '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineItemKind {
    Service,
    Product,
    Discount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn from_chrono(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Mon => Weekday::Monday,
            chrono::Weekday::Tue => Weekday::Tuesday,
            chrono::Weekday::Wed => Weekday::Wednesday,
            chrono::Weekday::Thu => Weekday::Thursday,
            chrono::Weekday::Fri => Weekday::Friday,
            chrono::Weekday::Sat => Weekday::Saturday,
            chrono::Weekday::Sun => Weekday::Sunday,
        }
    }

    pub fn of(date: impl Datelike) -> Self {
        Self::from_chrono(date.weekday())
    }

    pub fn is_weekend(self) -> bool {
        matches!(self, Weekday::Saturday | Weekday::Sunday)
    }
}

/// Which occurrences of a recurring event an edit or delete applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceScope {
    #[default]
    This,
    ThisAndFuture,
    All,
}

impl RecurrenceScope {
    pub fn as_query(self) -> &'static str {
        match self {
            RecurrenceScope::This => "this",
            RecurrenceScope::ThisAndFuture => "this_and_future",
            RecurrenceScope::All => "all",
        }
    }
}

impl std::str::FromStr for RecurrenceScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "this" | "this_only" | "single" => Ok(RecurrenceScope::This),
            "this_and_future" | "future" => Ok(RecurrenceScope::ThisAndFuture),
            "all" | "series" => Ok(RecurrenceScope::All),
            other => Err(format!("unknown recurrence scope '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientFilter {
    #[default]
    All,
    Active,
    Blocked,
    NoShows,
}

impl ClientFilter {
    pub fn as_query(self) -> &'static str {
        match self {
            ClientFilter::All => "all",
            ClientFilter::Active => "active",
            ClientFilter::Blocked => "blocked",
            ClientFilter::NoShows => "no_shows",
        }
    }
}

impl std::str::FromStr for ClientFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "all" => Ok(ClientFilter::All),
            "active" => Ok(ClientFilter::Active),
            "blocked" => Ok(ClientFilter::Blocked),
            "no_shows" | "noshows" => Ok(ClientFilter::NoShows),
            other => Err(format!("unknown client filter '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_wire_names() {
        let json = serde_json::to_string(&AppointmentStatus::CheckedIn).unwrap();
        assert_eq!(json, "\"CHECKED_IN\"");
        let parsed: AppointmentStatus = "in-progress".parse().unwrap();
        assert_eq!(parsed, AppointmentStatus::InProgress);
    }

    #[test]
    fn next_action_walks_front_desk_flow() {
        let mut status = AppointmentStatus::Pending;
        let mut seen = vec![status];
        while let Some(next) = status.next_action() {
            status = next;
            seen.push(status);
        }
        assert_eq!(
            seen,
            vec![
                AppointmentStatus::Pending,
                AppointmentStatus::Confirmed,
                AppointmentStatus::CheckedIn,
                AppointmentStatus::InProgress,
                AppointmentStatus::Completed,
            ]
        );
    }

    #[test]
    fn backwards_moves_are_unconventional() {
        assert!(!AppointmentStatus::Completed.is_conventional_transition(AppointmentStatus::Pending));
        assert!(!AppointmentStatus::InProgress.is_conventional_transition(AppointmentStatus::NoShow));
        assert!(AppointmentStatus::Confirmed.is_conventional_transition(AppointmentStatus::NoShow));
        assert!(AppointmentStatus::Pending.is_conventional_transition(AppointmentStatus::Cancelled));
    }

    #[test]
    fn scope_query_values() {
        assert_eq!(RecurrenceScope::ThisAndFuture.as_query(), "this_and_future");
        assert_eq!("future".parse::<RecurrenceScope>().unwrap(), RecurrenceScope::ThisAndFuture);
        assert!("everything".parse::<RecurrenceScope>().is_err());
    }

    #[test]
    fn weekday_from_date() {
        let date = chrono::NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        assert_eq!(Weekday::of(date), Weekday::Saturday);
        assert!(Weekday::of(date).is_weekend());
    }
}
