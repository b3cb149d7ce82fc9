//! Counter model: kinds, calendar accrual, and the stored record codec
//!
//! A counter is a named numeric record owned by one chat. Simple counters
//! only move on manual adjustment; daily and weekly counters accrue value
//! lazily based on elapsed calendar time whenever they are reconstructed
//! from storage. All operations here are pure computation over inputs;
//! file and transport I/O live in their own modules.

use crate::error::{TallybotError, ValidationError};
use crate::transport::ChatId;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Accrual rule of a counter
///
/// The kind is fixed at creation and stored as a lowercase token in the
/// record format (`simple`, `daily`, `weekly`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterKind {
    /// Never accrues over time; only manual +1/-1 adjustment
    Simple,
    /// Accrues one step per elapsed calendar day
    Daily,
    /// Accrues one step per Monday boundary crossed
    Weekly,
}

impl CounterKind {
    /// Parse a kind from its stored record token
    ///
    /// # Examples
    ///
    /// ```
    /// use tallybot::counter::CounterKind;
    ///
    /// assert_eq!(CounterKind::parse_token("daily").unwrap(), CounterKind::Daily);
    /// assert!(CounterKind::parse_token("hourly").is_err());
    /// ```
    pub fn parse_token(s: &str) -> Result<Self, TallybotError> {
        match s {
            "simple" => Ok(Self::Simple),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            other => Err(TallybotError::MalformedRecord(format!(
                "unknown counter kind: {}",
                other
            ))),
        }
    }

    /// The token written into stored records
    pub fn as_token(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }

    /// Single uppercase initial used in the short list form
    pub fn initial(&self) -> char {
        match self {
            Self::Simple => 'S',
            Self::Daily => 'D',
            Self::Weekly => 'W',
        }
    }
}

impl fmt::Display for CounterKind {
    // Display matches the record token so logs and detail views agree
    // with what storage writes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_token())
    }
}

/// One tracked quantity for one chat
///
/// Invariants: `name` is non-empty, free of `;`, and unique within the
/// owning chat's counter set; `step >= 1`; `last_accrual` never exceeds
/// the as-of date after an accrual pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    /// Owning conversation, treated as an opaque key
    pub chat: ChatId,
    /// Accrual rule, immutable after creation
    pub kind: CounterKind,
    /// Display name, unique per chat
    pub name: String,
    /// Accrual/adjustment increment, always >= 1
    pub step: i64,
    /// Current count; decreases are unrestricted, so this may go negative
    pub value: i64,
    /// Date up to which time-based accrual has been applied
    pub last_accrual: NaiveDate,
}

impl Counter {
    /// Create a new counter
    ///
    /// A fresh counter starts at `value = step` with accrual applied up to
    /// `today`. Name and step are validated here; textual inputs should go
    /// through [`parse_step`] first.
    ///
    /// # Examples
    ///
    /// ```
    /// use tallybot::counter::{Counter, CounterKind};
    /// use tallybot::transport::ChatId;
    /// use chrono::NaiveDate;
    ///
    /// let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    /// let c = Counter::create(ChatId(42), CounterKind::Daily, "Coffee", 2, today).unwrap();
    /// assert_eq!(c.value, 2);
    /// assert_eq!(c.last_accrual, today);
    /// ```
    pub fn create(
        chat: ChatId,
        kind: CounterKind,
        name: &str,
        step: i64,
        today: NaiveDate,
    ) -> Result<Self, ValidationError> {
        validate_name(name)?;
        if step < 1 {
            return Err(ValidationError::InvalidStep(step.to_string()));
        }

        Ok(Self {
            chat,
            kind,
            name: name.to_string(),
            step,
            value: step,
            last_accrual: today,
        })
    }

    /// Rebuild a counter from its persisted fields, applying pending accrual
    ///
    /// Daily counters gain `elapsed_days * step`. Weekly counters gain one
    /// step per Monday boundary crossed since `last_accrual`, counting
    /// boundary crossings rather than full 7-day periods, so a counter whose
    /// last accrual fell on a Sunday accrues on the very next day. Simple
    /// counters are returned unchanged.
    ///
    /// The returned counter carries `last_accrual = as_of`; persisting that
    /// date is deferred until the counter is next mutated and saved.
    /// A stored date in the future clamps elapsed time to zero.
    pub fn reconstruct(
        chat: ChatId,
        kind: CounterKind,
        name: &str,
        step: i64,
        stored_value: i64,
        last_accrual: NaiveDate,
        as_of: NaiveDate,
    ) -> Self {
        let elapsed_days = as_of.signed_duration_since(last_accrual).num_days().max(0);

        let accrued = match kind {
            CounterKind::Simple => 0,
            CounterKind::Daily => elapsed_days * step,
            CounterKind::Weekly => {
                let weekday = i64::from(last_accrual.weekday().num_days_from_monday());
                (weekday + elapsed_days) / 7 * step
            }
        };

        Self {
            chat,
            kind,
            name: name.to_string(),
            step,
            value: stored_value + accrued,
            last_accrual: as_of,
        }
    }

    /// Apply a manual adjustment
    ///
    /// Any integer delta is accepted; the value may become negative.
    pub fn adjust(&mut self, delta: i64) {
        self.value += delta;
    }

    /// Override the value manually
    ///
    /// Also resets `last_accrual` to `today` so time-based accrual restarts
    /// from the override point. Step and kind are unchanged.
    pub fn set_value(&mut self, new_value: i64, today: NaiveDate) {
        self.value = new_value;
        self.last_accrual = today;
    }

    /// The persisted record row: `kind;name;step;value;YYYY-MM-DD`
    ///
    /// # Examples
    ///
    /// ```
    /// use tallybot::counter::{Counter, CounterKind};
    /// use tallybot::transport::ChatId;
    /// use chrono::NaiveDate;
    ///
    /// let today = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
    /// let c = Counter::create(ChatId(1), CounterKind::Daily, "Coffee", 2, today).unwrap();
    /// assert_eq!(c.to_record(), "daily;Coffee;2;2;2024-01-05");
    /// ```
    pub fn to_record(&self) -> String {
        format!(
            "{};{};{};{};{}",
            self.kind.as_token(),
            self.name,
            self.step,
            self.value,
            self.last_accrual.format("%Y-%m-%d")
        )
    }

    /// Parse a stored record row and apply accrual as of `as_of`
    ///
    /// The inverse of [`to_record`](Self::to_record), composed with
    /// [`reconstruct`](Self::reconstruct). Fields are `;`-delimited with an
    /// ISO calendar date last; any deviation is a malformed record.
    pub fn parse_record(chat: ChatId, line: &str, as_of: NaiveDate) -> Result<Self, TallybotError> {
        let fields: Vec<&str> = line.trim_end().split(';').collect();
        if fields.len() != 5 {
            return Err(TallybotError::MalformedRecord(format!(
                "expected 5 fields, got {}: {}",
                fields.len(),
                line
            )));
        }

        let kind = CounterKind::parse_token(fields[0])?;
        let name = fields[1];
        let step: i64 = fields[2]
            .parse()
            .map_err(|_| TallybotError::MalformedRecord(format!("bad step: {}", fields[2])))?;
        let stored_value: i64 = fields[3]
            .parse()
            .map_err(|_| TallybotError::MalformedRecord(format!("bad value: {}", fields[3])))?;
        let last_accrual = NaiveDate::parse_from_str(fields[4], "%Y-%m-%d")
            .map_err(|_| TallybotError::MalformedRecord(format!("bad date: {}", fields[4])))?;

        Ok(Self::reconstruct(
            chat,
            kind,
            name,
            step,
            stored_value,
            last_accrual,
            as_of,
        ))
    }

    /// Short form used in list views: `"{name} ({K}+{step}): {value}"`
    pub fn format_short(&self) -> String {
        format!(
            "{} ({}+{}): {}",
            self.name,
            self.kind.initial(),
            self.step,
            self.value
        )
    }

    /// Detail form with one field per line
    pub fn format_detail(&self) -> String {
        format!(
            "{}: {}\nType: {}\nIncrease step: +{}",
            self.name, self.value, self.kind, self.step
        )
    }
}

/// Validate a counter name: non-empty and free of the record separator
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.contains(';') {
        return Err(ValidationError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Parse a step from user text: must be an integer >= 1
pub fn parse_step(text: &str) -> Result<i64, ValidationError> {
    let step: i64 = text
        .trim()
        .parse()
        .map_err(|_| ValidationError::InvalidStep(text.trim().to_string()))?;
    if step < 1 {
        return Err(ValidationError::InvalidStep(text.trim().to_string()));
    }
    Ok(step)
}

/// Parse a manual value override from user text: must be an integer >= 0
pub fn parse_value(text: &str) -> Result<i64, ValidationError> {
    let value: i64 = text
        .trim()
        .parse()
        .map_err(|_| ValidationError::InvalidValue(text.trim().to_string()))?;
    if value < 0 {
        return Err(ValidationError::InvalidValue(text.trim().to_string()));
    }
    Ok(value)
}
