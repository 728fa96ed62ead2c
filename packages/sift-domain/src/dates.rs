use std::sync::LazyLock;

use regex::Regex;
use time::{
	Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time,
	format_description::well_known::{Rfc2822, Rfc3339},
	macros::format_description,
};

use crate::{
	error::DateError,
	filter::{Filter, FilterField, FilterOperator, FilterValue},
};

static ISO_DATE: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").ok());
static RELATIVE: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"(?i)^last\s+(\d+)\s+(day|week|month|year)s?$").ok());

/// An inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
	pub start: OffsetDateTime,
	pub end: OffsetDateTime,
}
impl DateRange {
	/// A `between` filter over unix milliseconds.
	pub fn to_filter(&self, field: FilterField) -> Filter {
		Filter::new(
			field,
			FilterOperator::Between,
			FilterValue::List(vec![self.start.into(), self.end.into()]),
		)
	}
}

/// Parses `YYYY-MM-DD` as midnight UTC, otherwise RFC 3339, RFC 2822 or `YYYY-MM-DD HH:MM:SS`
/// (taken as UTC).
pub fn parse_date(input: &str) -> Result<OffsetDateTime, DateError> {
	let trimmed = input.trim();
	let invalid = || DateError::InvalidDate { input: input.to_string() };

	if ISO_DATE.as_ref().is_some_and(|re| re.is_match(trimmed)) {
		let date = Date::parse(trimmed, format_description!("[year]-[month]-[day]"))
			.map_err(|_| invalid())?;

		return Ok(date.midnight().assume_utc());
	}
	if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
		return Ok(parsed);
	}
	if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc2822) {
		return Ok(parsed);
	}

	PrimitiveDateTime::parse(
		trimmed,
		format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
	)
	.map(PrimitiveDateTime::assume_utc)
	.map_err(|_| invalid())
}

/// Resolves `last N day|week|month|year(s)` against the current time.
pub fn parse_relative_date(input: &str) -> Result<OffsetDateTime, DateError> {
	parse_relative_date_from(input, OffsetDateTime::now_utc())
}

/// Resolves a relative expression against `now`. Months and years step back on the calendar,
/// clamping the day to the end of shorter months.
pub fn parse_relative_date_from(
	input: &str,
	now: OffsetDateTime,
) -> Result<OffsetDateTime, DateError> {
	let invalid = || DateError::InvalidRelative { input: input.to_string() };
	let captures = RELATIVE
		.as_ref()
		.and_then(|re| re.captures(input.trim()))
		.ok_or_else(invalid)?;
	let amount: i64 = captures[1].parse().map_err(|_| invalid())?;
	let unit = captures[2].to_ascii_lowercase();

	match unit.as_str() {
		"day" => now.checked_sub(Duration::days(amount)).ok_or_else(invalid),
		"week" => now.checked_sub(Duration::weeks(amount)).ok_or_else(invalid),
		"month" => months_back(now, amount).ok_or_else(invalid),
		_ => amount.checked_mul(12).and_then(|months| months_back(now, months)).ok_or_else(invalid),
	}
}

/// Parses `<date> to <date>`. Reversed bounds are swapped so the range is always ordered.
pub fn parse_date_range(input: &str) -> Result<DateRange, DateError> {
	let range_error =
		|message: String| DateError::InvalidRange { input: input.to_string(), message };
	let Some((start, end)) = input.split_once(" to ") else {
		return Err(range_error("expected '<start> to <end>'.".to_string()));
	};
	let start = parse_date(start).map_err(|err| range_error(err.to_string()))?;
	let end = parse_date(end).map_err(|err| range_error(err.to_string()))?;

	if end < start {
		return Ok(DateRange { start: end, end: start });
	}

	Ok(DateRange { start, end })
}

fn months_back(now: OffsetDateTime, months: i64) -> Option<OffsetDateTime> {
	let total = i64::from(now.year()) * 12 + i64::from(u8::from(now.month())) - 1 - months;
	let year = i32::try_from(total.div_euclid(12)).ok()?;
	let month = Month::try_from(u8::try_from(total.rem_euclid(12) + 1).ok()?).ok()?;
	let date = (1..=now.day())
		.rev()
		.find_map(|day| Date::from_calendar_date(year, month, day).ok())?;
	let time = Time::from_hms_nano(now.hour(), now.minute(), now.second(), now.nanosecond()).ok()?;

	Some(PrimitiveDateTime::new(date, time).assume_offset(now.offset()))
}
