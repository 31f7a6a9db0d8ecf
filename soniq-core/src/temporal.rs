//! Temporal atomic types: dateTime, date, time, and the three duration types
//!
//! All types keep the original lexical form for faithful output alongside a
//! normalized representation used for comparison:
//!
//! - `DateTime`, `Date`, `Time` normalize to an instant (UTC), with the
//!   original timezone offset preserved for formatting.
//! - `DayTimeDuration` normalizes to signed total milliseconds.
//! - `YearMonthDuration` normalizes to signed total months.
//! - `Duration` carries both a month and a millisecond component; it is
//!   ordered by a fixed 30-day month normalization (see [`MILLIS_PER_MONTH`]),
//!   which is also the long encoding used for ordering columns.
//!
//! Comparison across `YearMonthDuration` and `DayTimeDuration` is not
//! defined here; callers decide whether mixing the families is an error.

use crate::error::{Error, Result};
use chrono::{
    DateTime as ChronoDateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Timelike, Utc,
};
use std::cmp::Ordering;
use std::fmt;

/// Month length used when a combined duration must reduce to a single
/// magnitude (ordering columns, duration joins): 30 days.
pub const MILLIS_PER_MONTH: i64 = 30 * 86_400_000;

const MILLIS_PER_DAY: i64 = 86_400_000;
const MILLIS_PER_HOUR: i64 = 3_600_000;
const MILLIS_PER_MINUTE: i64 = 60_000;

// ============================================================================
// DateTime
// ============================================================================

/// XSD dateTime with timezone preservation
#[derive(Clone, Debug)]
pub struct DateTime {
    instant: ChronoDateTime<Utc>,
    offset: Option<FixedOffset>,
    original: String,
}

impl DateTime {
    /// Parse an XSD dateTime string.
    ///
    /// Accepts `YYYY-MM-DDTHH:MM:SS`, optionally with fractional seconds and
    /// an offset (`Z`, `+HH:MM`, `-HH:MM`). A value without an offset is
    /// interpreted as UTC for comparison.
    pub fn parse(s: &str) -> Result<Self> {
        if let Ok(dt) = ChronoDateTime::parse_from_rfc3339(s) {
            return Ok(Self {
                instant: dt.with_timezone(&Utc),
                offset: Some(*dt.offset()),
                original: s.to_string(),
            });
        }
        let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|_| Error::invalid_lexical("dateTime", s))?;
        Ok(Self {
            instant: Utc.from_utc_datetime(&naive),
            offset: None,
            original: s.to_string(),
        })
    }

    /// Construct from an epoch-millisecond instant (UTC, no offset).
    ///
    /// Out-of-range instants clamp to the epoch.
    pub fn from_epoch_millis(millis: i64) -> Self {
        let instant =
            ChronoDateTime::from_timestamp_millis(millis).unwrap_or(ChronoDateTime::UNIX_EPOCH);
        let original = instant.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        Self {
            instant,
            offset: None,
            original,
        }
    }

    /// The normalized instant (UTC)
    pub fn instant(&self) -> ChronoDateTime<Utc> {
        self.instant
    }

    /// The preserved timezone offset, if the lexical form had one
    pub fn tz_offset(&self) -> Option<FixedOffset> {
        self.offset
    }

    /// The original lexical form
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Milliseconds since the Unix epoch
    pub fn epoch_millis(&self) -> i64 {
        self.instant.timestamp_millis()
    }

    /// Difference between two dateTimes as a day-time duration
    pub fn since(&self, other: &DateTime) -> DayTimeDuration {
        DayTimeDuration::from_millis(self.epoch_millis() - other.epoch_millis())
    }

    /// Shift by a day-time duration
    pub fn plus_day_time(&self, d: &DayTimeDuration) -> DateTime {
        let instant = self.instant + chrono::Duration::milliseconds(d.millis());
        let original = match self.offset {
            Some(off) => instant
                .with_timezone(&off)
                .format("%Y-%m-%dT%H:%M:%S%.f%:z")
                .to_string(),
            None => instant.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        };
        DateTime {
            instant,
            offset: self.offset,
            original,
        }
    }

    /// Shift by a number of months, clamping the day within the target month
    pub fn plus_months(&self, months: i64) -> DateTime {
        let shifted = shift_months(self.instant.date_naive(), months);
        let naive = shifted.and_time(self.instant.time());
        let instant = Utc.from_utc_datetime(&naive);
        let original = instant.format("%Y-%m-%dT%H:%M:%S%.f").to_string();
        DateTime {
            instant,
            offset: self.offset,
            original,
        }
    }
}

impl PartialEq for DateTime {
    fn eq(&self, other: &Self) -> bool {
        self.instant == other.instant
    }
}

impl Eq for DateTime {}

impl Ord for DateTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant.cmp(&other.instant)
    }
}

impl PartialOrd for DateTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for DateTime {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.instant.hash(state);
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

// ============================================================================
// Date
// ============================================================================

/// XSD date with optional timezone
#[derive(Clone, Debug)]
pub struct Date {
    date: NaiveDate,
    offset: Option<FixedOffset>,
    original: String,
}

impl Date {
    /// Parse an XSD date string (`YYYY-MM-DD`, optional `Z`/`±HH:MM` suffix).
    pub fn parse(s: &str) -> Result<Self> {
        let (body, offset) = split_tz_suffix(s);
        let date = NaiveDate::parse_from_str(body, "%Y-%m-%d")
            .map_err(|_| Error::invalid_lexical("date", s))?;
        Ok(Self {
            date,
            offset,
            original: s.to_string(),
        })
    }

    /// The calendar date
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// The preserved timezone offset, if any
    pub fn tz_offset(&self) -> Option<FixedOffset> {
        self.offset
    }

    /// The original lexical form
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Midnight of this date as milliseconds since the Unix epoch, adjusted
    /// by the offset when one is present.
    pub fn epoch_millis(&self) -> i64 {
        let midnight = self.date.and_time(NaiveTime::MIN);
        let base = Utc.from_utc_datetime(&midnight).timestamp_millis();
        match self.offset {
            Some(off) => base - (off.local_minus_utc() as i64) * 1000,
            None => base,
        }
    }

    /// Shift by a day-time duration (whole days contribute; sub-day parts are
    /// truncated, matching date arithmetic)
    pub fn plus_day_time(&self, d: &DayTimeDuration) -> Date {
        let days = d.millis().div_euclid(MILLIS_PER_DAY);
        let date = self.date + chrono::Duration::days(days);
        Date {
            date,
            offset: self.offset,
            original: date.format("%Y-%m-%d").to_string(),
        }
    }

    /// Shift by a number of months, clamping the day within the target month
    pub fn plus_months(&self, months: i64) -> Date {
        let date = shift_months(self.date, months);
        Date {
            date,
            offset: self.offset,
            original: date.format("%Y-%m-%d").to_string(),
        }
    }
}

impl PartialEq for Date {
    fn eq(&self, other: &Self) -> bool {
        self.epoch_millis() == other.epoch_millis()
    }
}

impl Eq for Date {}

impl Ord for Date {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch_millis().cmp(&other.epoch_millis())
    }
}

impl PartialOrd for Date {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for Date {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.epoch_millis().hash(state);
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

// ============================================================================
// Time
// ============================================================================

/// XSD time with optional timezone
#[derive(Clone, Debug)]
pub struct Time {
    time: NaiveTime,
    offset: Option<FixedOffset>,
    original: String,
}

impl Time {
    /// Parse an XSD time string (`HH:MM:SS` with optional fraction and
    /// `Z`/`±HH:MM` suffix).
    pub fn parse(s: &str) -> Result<Self> {
        let (body, offset) = split_tz_suffix(s);
        let time = NaiveTime::parse_from_str(body, "%H:%M:%S%.f")
            .map_err(|_| Error::invalid_lexical("time", s))?;
        Ok(Self {
            time,
            offset,
            original: s.to_string(),
        })
    }

    /// The time of day
    pub fn time(&self) -> NaiveTime {
        self.time
    }

    /// The preserved timezone offset, if any
    pub fn tz_offset(&self) -> Option<FixedOffset> {
        self.offset
    }

    /// The original lexical form
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Milliseconds since midnight, adjusted by the offset when present.
    pub fn millis_of_day(&self) -> i64 {
        let base = self.time.num_seconds_from_midnight() as i64 * 1000
            + (self.time.nanosecond() / 1_000_000) as i64;
        match self.offset {
            Some(off) => base - (off.local_minus_utc() as i64) * 1000,
            None => base,
        }
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        self.millis_of_day() == other.millis_of_day()
    }
}

impl Eq for Time {}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        self.millis_of_day().cmp(&other.millis_of_day())
    }
}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for Time {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.millis_of_day().hash(state);
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

// ============================================================================
// YearMonthDuration
// ============================================================================

/// XSD yearMonthDuration — totally orderable by total months
#[derive(Clone, Debug)]
pub struct YearMonthDuration {
    months: i64,
    original: String,
}

impl YearMonthDuration {
    /// Parse an XSD yearMonthDuration string (`P2Y6M`, `-P3M`, `P1Y`).
    pub fn parse(s: &str) -> Result<Self> {
        let fields = DurationFields::parse(s, "yearMonthDuration")?;
        if fields.millis != 0 || !fields.saw_year_month {
            return Err(Error::invalid_lexical("yearMonthDuration", s));
        }
        Ok(Self {
            months: fields.months,
            original: s.to_string(),
        })
    }

    /// Construct from total months.
    pub fn from_months(months: i64) -> Self {
        Self {
            months,
            original: Self::make_canonical(months),
        }
    }

    fn make_canonical(months: i64) -> String {
        let negative = months < 0;
        let abs = months.unsigned_abs();
        let years = abs / 12;
        let rem = abs % 12;
        let mut result = String::from(if negative { "-P" } else { "P" });
        if years > 0 {
            result.push_str(&format!("{}Y", years));
        }
        if rem > 0 || years == 0 {
            result.push_str(&format!("{}M", rem));
        }
        result
    }

    /// Canonical string representation
    pub fn to_canonical_string(&self) -> String {
        Self::make_canonical(self.months)
    }

    /// Total signed months
    pub fn months(&self) -> i64 {
        self.months
    }

    /// The original lexical form
    pub fn original(&self) -> &str {
        &self.original
    }

    /// 30-day-month normalization, for ordering columns
    pub fn normalized_millis(&self) -> i64 {
        self.months * MILLIS_PER_MONTH
    }
}

impl PartialEq for YearMonthDuration {
    fn eq(&self, other: &Self) -> bool {
        self.months == other.months
    }
}

impl Eq for YearMonthDuration {}

impl Ord for YearMonthDuration {
    fn cmp(&self, other: &Self) -> Ordering {
        self.months.cmp(&other.months)
    }
}

impl PartialOrd for YearMonthDuration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for YearMonthDuration {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.months.hash(state);
    }
}

impl fmt::Display for YearMonthDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

// ============================================================================
// DayTimeDuration
// ============================================================================

/// XSD dayTimeDuration — totally orderable by total milliseconds
#[derive(Clone, Debug)]
pub struct DayTimeDuration {
    millis: i64,
    original: String,
}

impl DayTimeDuration {
    /// Parse an XSD dayTimeDuration string (`P3DT4H5M6.789S`, `-PT1S`).
    pub fn parse(s: &str) -> Result<Self> {
        let fields = DurationFields::parse(s, "dayTimeDuration")?;
        if fields.months != 0 || fields.saw_year_month {
            return Err(Error::invalid_lexical("dayTimeDuration", s));
        }
        Ok(Self {
            millis: fields.millis,
            original: s.to_string(),
        })
    }

    /// Construct from total milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        Self {
            millis,
            original: Self::make_canonical(millis),
        }
    }

    fn make_canonical(millis: i64) -> String {
        let negative = millis < 0;
        let abs = millis.unsigned_abs() as i64;
        let mut result = String::from(if negative { "-P" } else { "P" });

        let days = abs / MILLIS_PER_DAY;
        let rem = abs % MILLIS_PER_DAY;
        let hours = rem / MILLIS_PER_HOUR;
        let rem = rem % MILLIS_PER_HOUR;
        let minutes = rem / MILLIS_PER_MINUTE;
        let rem = rem % MILLIS_PER_MINUTE;
        let secs = rem / 1000;
        let frac = rem % 1000;

        if days > 0 {
            result.push_str(&format!("{}D", days));
        }
        let has_time = hours > 0 || minutes > 0 || secs > 0 || frac > 0;
        if has_time {
            result.push('T');
            if hours > 0 {
                result.push_str(&format!("{}H", hours));
            }
            if minutes > 0 {
                result.push_str(&format!("{}M", minutes));
            }
            if secs > 0 || frac > 0 {
                if frac > 0 {
                    let frac_str = format!("{:03}", frac);
                    result.push_str(&format!("{}.{}S", secs, frac_str.trim_end_matches('0')));
                } else {
                    result.push_str(&format!("{}S", secs));
                }
            }
        } else if days == 0 {
            result.push_str("T0S");
        }
        result
    }

    /// Canonical string representation
    pub fn to_canonical_string(&self) -> String {
        Self::make_canonical(self.millis)
    }

    /// Total signed milliseconds
    pub fn millis(&self) -> i64 {
        self.millis
    }

    /// The original lexical form
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Alias of [`millis`](Self::millis), for ordering columns
    pub fn normalized_millis(&self) -> i64 {
        self.millis
    }
}

impl PartialEq for DayTimeDuration {
    fn eq(&self, other: &Self) -> bool {
        self.millis == other.millis
    }
}

impl Eq for DayTimeDuration {}

impl Ord for DayTimeDuration {
    fn cmp(&self, other: &Self) -> Ordering {
        self.millis.cmp(&other.millis)
    }
}

impl PartialOrd for DayTimeDuration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for DayTimeDuration {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.millis.hash(state);
    }
}

impl fmt::Display for DayTimeDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

// ============================================================================
// Duration (combined)
// ============================================================================

/// XSD duration — carries both month and millisecond components
///
/// Ordering uses the fixed 30-day month normalization; exact ordering is
/// only guaranteed when comparing values whose month components are equal
/// or whose difference is unambiguous under that normalization.
#[derive(Clone, Debug)]
pub struct Duration {
    months: i64,
    millis: i64,
    original: String,
}

impl Duration {
    /// Parse an XSD duration string (`P1Y2M3DT4H5M6S`, any subset).
    pub fn parse(s: &str) -> Result<Self> {
        let fields = DurationFields::parse(s, "duration")?;
        Ok(Self {
            months: fields.months,
            millis: fields.millis,
            original: s.to_string(),
        })
    }

    /// Construct from month and millisecond components.
    pub fn from_components(months: i64, millis: i64) -> Self {
        let original = Self::make_canonical(months, millis);
        Self {
            months,
            millis,
            original,
        }
    }

    fn make_canonical(months: i64, millis: i64) -> String {
        if months == 0 {
            return DayTimeDuration::make_canonical(millis);
        }
        if millis == 0 {
            return YearMonthDuration::make_canonical(months);
        }
        // Mixed-sign combinations keep component-wise signs
        let ym = YearMonthDuration::make_canonical(months);
        let dt = DayTimeDuration::make_canonical(millis);
        format!("{}{}", ym, dt.trim_start_matches('P').trim_start_matches("-P"))
    }

    /// Canonical string representation
    pub fn to_canonical_string(&self) -> String {
        Self::make_canonical(self.months, self.millis)
    }

    /// Month component
    pub fn months(&self) -> i64 {
        self.months
    }

    /// Millisecond component
    pub fn millis(&self) -> i64 {
        self.millis
    }

    /// The original lexical form
    pub fn original(&self) -> &str {
        &self.original
    }

    /// 30-day-month normalization, for ordering columns
    pub fn normalized_millis(&self) -> i64 {
        self.months * MILLIS_PER_MONTH + self.millis
    }
}

impl PartialEq for Duration {
    fn eq(&self, other: &Self) -> bool {
        self.months == other.months && self.millis == other.millis
    }
}

impl Eq for Duration {}

impl Ord for Duration {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized_millis()
            .cmp(&other.normalized_millis())
            .then_with(|| self.months.cmp(&other.months))
    }
}

impl PartialOrd for Duration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for Duration {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.months.hash(state);
        self.millis.hash(state);
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

// ============================================================================
// Shared lexical parsing
// ============================================================================

struct DurationFields {
    months: i64,
    millis: i64,
    saw_year_month: bool,
}

impl DurationFields {
    /// Parse the full ISO 8601 duration grammar into month and millisecond
    /// components. The caller restricts the permitted fields.
    fn parse(s: &str, type_name: &'static str) -> Result<Self> {
        let err = || Error::invalid_lexical(type_name, s);

        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let body = rest.strip_prefix('P').ok_or_else(err)?;

        let (date_part, time_part) = match body.find('T') {
            Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
            None => (body, None),
        };
        if let Some(tp) = time_part {
            if tp.is_empty() {
                return Err(err());
            }
        }

        let mut months: i64 = 0;
        let mut millis: i64 = 0;
        let mut saw_year_month = false;
        let mut found_any = false;

        let mut remaining = date_part;
        for (marker, scale_months, scale_millis) in [
            ('Y', 12i64, 0i64),
            ('M', 1, 0),
            ('D', 0, MILLIS_PER_DAY),
        ] {
            if let Some(pos) = remaining.find(marker) {
                let value: i64 = remaining[..pos].parse().map_err(|_| err())?;
                months += value * scale_months;
                millis += value * scale_millis;
                if scale_months != 0 {
                    saw_year_month = true;
                }
                found_any = true;
                remaining = &remaining[pos + 1..];
            }
        }
        if !remaining.is_empty() {
            return Err(err());
        }

        if let Some(tp) = time_part {
            let mut remaining = tp;
            for (marker, scale) in [('H', MILLIS_PER_HOUR), ('M', MILLIS_PER_MINUTE)] {
                if let Some(pos) = remaining.find(marker) {
                    let value: i64 = remaining[..pos].parse().map_err(|_| err())?;
                    millis += value * scale;
                    found_any = true;
                    remaining = &remaining[pos + 1..];
                }
            }
            if let Some(pos) = remaining.find('S') {
                millis += parse_seconds_to_millis(&remaining[..pos]).ok_or_else(err)?;
                found_any = true;
                remaining = &remaining[pos + 1..];
            }
            if !remaining.is_empty() {
                return Err(err());
            }
        }

        if !found_any {
            return Err(err());
        }

        if negative {
            months = -months;
            millis = -millis;
        }
        Ok(Self {
            months,
            millis,
            saw_year_month,
        })
    }
}

/// Parse a seconds field (`"6"`, `"6.789"`) into milliseconds.
fn parse_seconds_to_millis(s: &str) -> Option<i64> {
    match s.find('.') {
        None => s.parse::<i64>().ok().map(|secs| secs * 1000),
        Some(pos) => {
            let secs: i64 = s[..pos].parse().ok()?;
            let frac = &s[pos + 1..];
            if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let padded = format!("{:0<3}", frac);
            let frac_millis: i64 = padded[..3].parse().ok()?;
            Some(secs * 1000 + frac_millis)
        }
    }
}

/// Split a trailing timezone suffix (`Z`, `+HH:MM`, `-HH:MM`) from a date or
/// time lexical form.
fn split_tz_suffix(s: &str) -> (&str, Option<FixedOffset>) {
    if let Some(body) = s.strip_suffix('Z') {
        return (body, Some(FixedOffset::east_opt(0).unwrap()));
    }
    // An offset suffix is exactly 6 chars: sign, HH, ':', MM.
    if s.len() > 6 && s.is_char_boundary(s.len() - 6) {
        let tail = &s[s.len() - 6..];
        let bytes = tail.as_bytes();
        if (bytes[0] == b'+' || bytes[0] == b'-') && bytes[3] == b':' {
            if let (Ok(h), Ok(m)) = (tail[1..3].parse::<i32>(), tail[4..6].parse::<i32>()) {
                let secs = h * 3600 + m * 60;
                let secs = if bytes[0] == b'-' { -secs } else { secs };
                if let Some(off) = FixedOffset::east_opt(secs) {
                    return (&s[..s.len() - 6], Some(off));
                }
            }
        }
    }
    (s, None)
}

/// Shift a date by months, clamping the day-of-month to the target month.
fn shift_months(date: NaiveDate, months: i64) -> NaiveDate {
    let total = date.year() as i64 * 12 + date.month0() as i64 + months;
    let year = total.div_euclid(12) as i32;
    let month0 = total.rem_euclid(12) as u32;
    let day = date.day();
    (1..=day)
        .rev()
        .find_map(|d| NaiveDate::from_ymd_opt(year, month0 + 1, d))
        .unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_parse_and_instant() {
        let a = DateTime::parse("2020-03-01T10:30:00Z").unwrap();
        let b = DateTime::parse("2020-03-01T12:30:00+02:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.original(), "2020-03-01T10:30:00Z");

        let naive = DateTime::parse("2020-03-01T10:30:00").unwrap();
        assert_eq!(naive.epoch_millis(), a.epoch_millis());
        assert!(naive.tz_offset().is_none());
    }

    #[test]
    fn test_datetime_ordering() {
        let a = DateTime::parse("2020-01-01T00:00:00").unwrap();
        let b = DateTime::parse("2021-01-01T00:00:00").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_datetime_difference() {
        let a = DateTime::parse("2020-01-02T00:00:00").unwrap();
        let b = DateTime::parse("2020-01-01T00:00:00").unwrap();
        assert_eq!(a.since(&b).millis(), MILLIS_PER_DAY);
    }

    #[test]
    fn test_datetime_plus_months_clamps() {
        let a = DateTime::parse("2020-01-31T08:00:00").unwrap();
        let shifted = a.plus_months(1);
        assert_eq!(shifted.instant().date_naive().to_string(), "2020-02-29");
    }

    #[test]
    fn test_date_parse_with_offset() {
        let d = Date::parse("2020-06-15").unwrap();
        assert_eq!(d.date().to_string(), "2020-06-15");
        assert!(d.tz_offset().is_none());

        let z = Date::parse("2020-06-15Z").unwrap();
        assert_eq!(z.date(), d.date());
        assert!(z.tz_offset().is_some());

        let off = Date::parse("2020-06-15-05:00").unwrap();
        assert_eq!(off.epoch_millis() - d.epoch_millis(), 5 * MILLIS_PER_HOUR);
    }

    #[test]
    fn test_time_parse() {
        let t = Time::parse("10:30:00.250").unwrap();
        assert_eq!(
            t.millis_of_day(),
            10 * MILLIS_PER_HOUR + 30 * MILLIS_PER_MINUTE + 250
        );
        assert!(Time::parse("25:00:00").is_err());
    }

    #[test]
    fn test_year_month_duration() {
        let d = YearMonthDuration::parse("P2Y6M").unwrap();
        assert_eq!(d.months(), 30);
        assert_eq!(d.to_canonical_string(), "P2Y6M");

        let neg = YearMonthDuration::parse("-P3M").unwrap();
        assert_eq!(neg.months(), -3);

        assert!(YearMonthDuration::parse("P1D").is_err());
        assert!(YearMonthDuration::parse("PT1H").is_err());
    }

    #[test]
    fn test_day_time_duration() {
        let d = DayTimeDuration::parse("P3DT4H5M6.789S").unwrap();
        assert_eq!(
            d.millis(),
            3 * MILLIS_PER_DAY + 4 * MILLIS_PER_HOUR + 5 * MILLIS_PER_MINUTE + 6789
        );
        assert_eq!(DayTimeDuration::from_millis(d.millis()), d);

        let neg = DayTimeDuration::parse("-PT1S").unwrap();
        assert_eq!(neg.millis(), -1000);

        assert!(DayTimeDuration::parse("P1Y").is_err());
        assert!(DayTimeDuration::parse("P").is_err());
    }

    #[test]
    fn test_day_time_duration_canonical() {
        assert_eq!(
            DayTimeDuration::from_millis(90_061_000).to_canonical_string(),
            "P1DT1H1M1S"
        );
        assert_eq!(DayTimeDuration::from_millis(0).to_canonical_string(), "PT0S");
        assert_eq!(
            DayTimeDuration::from_millis(-500).to_canonical_string(),
            "-PT0.5S"
        );
    }

    #[test]
    fn test_combined_duration() {
        let d = Duration::parse("P1Y2M3DT4H").unwrap();
        assert_eq!(d.months(), 14);
        assert_eq!(d.millis(), 3 * MILLIS_PER_DAY + 4 * MILLIS_PER_HOUR);
        assert_eq!(
            d.normalized_millis(),
            14 * MILLIS_PER_MONTH + 3 * MILLIS_PER_DAY + 4 * MILLIS_PER_HOUR
        );
    }

    #[test]
    fn test_duration_ordering_within_family() {
        let a = DayTimeDuration::parse("PT1H").unwrap();
        let b = DayTimeDuration::parse("PT90M").unwrap();
        assert!(a < b);

        let c = YearMonthDuration::parse("P1Y").unwrap();
        let d = YearMonthDuration::parse("P13M").unwrap();
        assert!(c < d);
    }
}
