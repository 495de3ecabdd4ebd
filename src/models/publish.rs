//! Publish state of an article
//!
//! An article is either a draft or published at a specific moment. The pair
//! `is_published` / `published_at` is derived from [`PublishState`], so the
//! two columns can never disagree once loaded.
//!
//! Incoming dates arrive as a [`PublishedAtInput`] and are normalized to a
//! single UTC timestamp by [`normalize`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Draft or published-at-a-moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishState {
    #[default]
    Draft,
    Published(DateTime<Utc>),
}

/// Stored columns that violate the publish invariant.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("inconsistent publish columns: is_published={is_published}, published_at set={has_date}")]
pub struct InconsistentPublishState {
    pub is_published: bool,
    pub has_date: bool,
}

impl PublishState {
    /// Rebuild the state from the two stored columns.
    pub fn from_columns(
        is_published: bool,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<Self, InconsistentPublishState> {
        match (is_published, published_at) {
            (true, Some(at)) => Ok(Self::Published(at)),
            (false, None) => Ok(Self::Draft),
            (is_published, published_at) => Err(InconsistentPublishState {
                is_published,
                has_date: published_at.is_some(),
            }),
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Published(at) => Some(*at),
            Self::Draft => None,
        }
    }

    /// Apply an update to the publish fields.
    ///
    /// `is_published` is the requested flag (`None` when the update doesn't
    /// touch it) and `published_at` the already-normalized supplied date
    /// (`None` when absent or blank).
    ///
    /// - draft to published: the supplied date, or `now`
    /// - published to draft: always cleared
    /// - published, flag unchanged: re-dated only by a supplied date
    /// - draft, flag unchanged: supplied date is dropped
    pub fn transition(
        self,
        is_published: Option<bool>,
        published_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let wants_published = is_published.unwrap_or(self.is_published());

        match (self, wants_published) {
            (Self::Draft, true) => Self::Published(published_at.unwrap_or(now)),
            (Self::Published(_), false) => Self::Draft,
            (Self::Published(current), true) => Self::Published(published_at.unwrap_or(current)),
            (Self::Draft, false) => Self::Draft,
        }
    }
}

/// A caller-supplied publication date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PublishedAtInput {
    /// A calendar day without a time of day.
    DateOnly(NaiveDate),
    /// A full timestamp.
    DateTime(DateTime<Utc>),
    /// Anything else; parsed by [`normalize`].
    RawString(String),
}

/// A `published_at` value that could not be read as a date.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("could not parse '{input}' as a date or timestamp")]
pub struct ParseError {
    pub input: String,
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Normalize a supplied publication date to one UTC timestamp.
///
/// Returns `Ok(None)` for a blank string. A date without a time of day is
/// combined with the time of day of `now`, so two posts dated the same day
/// still sort by the order they were submitted.
pub fn normalize(
    input: &PublishedAtInput,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ParseError> {
    match input {
        PublishedAtInput::DateOnly(date) => Ok(Some(at_time_of_day(*date, now))),
        PublishedAtInput::DateTime(at) => Ok(Some(*at)),
        PublishedAtInput::RawString(raw) => parse_raw(raw, now),
    }
}

fn parse_raw(raw: &str, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(Some(at.with_timezone(&Utc)));
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(Some(naive.and_utc()));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(Some(at_time_of_day(date, now)));
    }

    Err(ParseError {
        input: raw.to_string(),
    })
}

fn at_time_of_day(date: NaiveDate, now: DateTime<Utc>) -> DateTime<Utc> {
    let time: NaiveTime = now.time();
    date.and_time(time).and_utc()
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
        (0i64..4_000_000_000).prop_map(|secs| Utc.timestamp_opt(secs, 0).unwrap())
    }

    fn state_strategy() -> impl Strategy<Value = PublishState> {
        prop_oneof![
            Just(PublishState::Draft),
            timestamp_strategy().prop_map(PublishState::Published),
        ]
    }

    proptest! {
        /// Whatever the update, the flag and the date agree afterwards.
        #[test]
        fn flag_and_date_always_agree(
            state in state_strategy(),
            flag in proptest::option::of(any::<bool>()),
            supplied in proptest::option::of(timestamp_strategy()),
            now in timestamp_strategy(),
        ) {
            let next = state.transition(flag, supplied, now);
            prop_assert_eq!(next.is_published(), next.published_at().is_some());
            let roundtrip = PublishState::from_columns(next.is_published(), next.published_at());
            prop_assert_eq!(roundtrip, Ok(next));
        }

        /// Unpublishing never leaves a date behind.
        #[test]
        fn unpublishing_always_clears(
            state in state_strategy(),
            supplied in proptest::option::of(timestamp_strategy()),
            now in timestamp_strategy(),
        ) {
            prop_assert_eq!(state.transition(Some(false), supplied, now), PublishState::Draft);
        }

        /// Publishing an already published article without a date keeps its moment.
        #[test]
        fn publishing_twice_is_stable(at in timestamp_strategy(), now in timestamp_strategy()) {
            let once = PublishState::Published(at).transition(Some(true), None, now);
            let twice = once.transition(Some(true), None, now);
            prop_assert_eq!(twice, PublishState::Published(at));
        }
    }
}
