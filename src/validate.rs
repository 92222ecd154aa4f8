//! Field validators shared by all document parsers.
//!
//! Every validator is a pure function returning a [`FieldError`] describing
//! what is wrong; callers attach the offending line via
//! [`ErrorContext`](crate::error::ErrorContext).

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::FieldError;

//
// External dependencies
//
use chrono::{offset::TimeZone, DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use nom::{
    bytes::complete::{take_till1, take_while_m_n},
    character::complete::{char, digit1, one_of},
    combinator::{all_consuming, opt, recognize, rest},
    multi::separated_list1,
    sequence::{pair, preceded, terminated, tuple},
    IResult,
};
use regex::Regex;

pub(crate) type FieldResult<T> = Result<T, FieldError>;

lazy_static! {
    static ref NICKNAME: Regex = Regex::new(r"^[A-Za-z0-9]{1,19}$").unwrap();
}

/// Linear whitespace inside a line
pub(crate) fn is_ws(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// A single space or tab
fn ws(input: &str) -> IResult<&str, char> {
    one_of(" \t")(input)
}

fn digits(input: &str) -> IResult<&str, &str> {
    digit1(input)
}

fn fixed_digits(n: usize) -> impl Fn(&str) -> IResult<&str, &str> {
    move |input: &str| take_while_m_n(n, n, |c: char| c.is_ascii_digit())(input)
}

/// Exactly 40 hex characters, decoded to 20 bytes
pub(crate) fn hex_digest(s: &str) -> FieldResult<[u8; 20]> {
    if s.len() != 40 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(FieldError::new(format!("'{}' is not a 40-character hex digest", s)));
    }
    let mut out = [0u8; 20];
    hex::decode_to_slice(s, &mut out)
        .map_err(|_| FieldError::new(format!("'{}' is not a hex digest", s)))?;
    Ok(out)
}

/// Unpadded base64 decoding to exactly `len` bytes
pub(crate) fn base64_bytes(s: &str, len: usize) -> FieldResult<Vec<u8>> {
    if s.contains('=') {
        return Err(FieldError::new(format!(
            "base64 value '{}' must not contain padding",
            s
        )));
    }
    let decoded = base64::decode_config(s, base64::STANDARD_NO_PAD)
        .map_err(|_| FieldError::new(format!("'{}' is not valid base64", s)))?;
    if decoded.len() != len {
        return Err(FieldError::new(format!(
            "base64 value '{}' decodes to {} bytes instead of {}",
            s,
            decoded.len(),
            len
        )));
    }
    Ok(decoded)
}

/// Unpadded base64 of a 160-bit digest
pub(crate) fn base64_digest(s: &str) -> FieldResult<[u8; 20]> {
    let decoded = base64_bytes(s, 20)?;
    let mut out = [0u8; 20];
    out.copy_from_slice(&decoded);
    Ok(out)
}

/// Base64 of a 256-bit value, where trailing padding is tolerated
pub(crate) fn base64_key(s: &str) -> FieldResult<String> {
    base64_bytes(s.trim_end_matches('='), 32)?;
    Ok(s.to_string())
}

pub(crate) fn ipv4(s: &str) -> FieldResult<Ipv4Addr> {
    Ipv4Addr::from_str(s).map_err(|_| FieldError::new(format!("'{}' is not an IPv4 address", s)))
}

pub(crate) fn port(s: &str) -> FieldResult<u16> {
    all_consuming(digits)(s)
        .ok()
        .and_then(|(_, d)| d.parse::<u16>().ok())
        .ok_or_else(|| FieldError::new(format!("'{}' is not a port number", s)))
}

pub(crate) fn nickname(s: &str) -> FieldResult<String> {
    if NICKNAME.is_match(s) {
        Ok(s.to_string())
    } else {
        Err(FieldError::new(format!("'{}' is not a valid nickname", s)))
    }
}

/// Unsigned decimal number without sign
pub(crate) fn uint(s: &str) -> FieldResult<u64> {
    all_consuming(digits)(s)
        .ok()
        .and_then(|(_, d)| d.parse::<u64>().ok())
        .ok_or_else(|| FieldError::new(format!("'{}' is not an unsigned integer", s)))
}

/// Unsigned number that fits in 32 bits
pub(crate) fn uint32(s: &str) -> FieldResult<u32> {
    u32::try_from(uint(s)?).map_err(|_| FieldError::new(format!("'{}' is out of range", s)))
}

/// Count that must not be negative, with a dedicated message for negatives
pub(crate) fn non_negative(s: &str) -> FieldResult<u64> {
    if s.starts_with('-') && uint(&s[1..]).is_ok() {
        return Err(FieldError::new(format!("negative value '{}'", s)));
    }
    uint(s)
}

/// `0` or `1`
pub(crate) fn bool_flag(s: &str) -> FieldResult<bool> {
    match s {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(FieldError::new(format!("'{}' is neither 0 nor 1", s))),
    }
}

fn signed_digits(input: &str) -> IResult<&str, &str> {
    recognize(pair(opt(char('-')), digit1))(input)
}

/// Signed 32-bit integer: `-2147483648` ..= `2147483647`
pub(crate) fn int32(s: &str) -> FieldResult<i32> {
    let out_of_range = || FieldError::new(format!("'{}' is not a 32-bit integer", s));
    let (_, digits) = all_consuming(signed_digits)(s).map_err(|_| out_of_range())?;
    let wide = digits.parse::<i64>().map_err(|_| out_of_range())?;
    i32::try_from(wide).map_err(|_| out_of_range())
}

fn two_decimals(input: &str) -> IResult<&str, &str> {
    recognize(tuple((opt(char('-')), digit1, char('.'), fixed_digits(2))))(input)
}

fn any_decimal(input: &str) -> IResult<&str, &str> {
    recognize(tuple((opt(char('-')), digit1, opt(preceded(char('.'), digit1)))))(input)
}

fn percent(input: &str) -> IResult<&str, &str> {
    terminated(
        recognize(pair(digit1, opt(preceded(char('.'), digit1)))),
        char('%'),
    )(input)
}

/// Fixed-point number with exactly two decimals, e.g. `9.91`
pub(crate) fn decimal2(s: &str) -> FieldResult<f64> {
    all_consuming(two_decimals)(s)
        .ok()
        .and_then(|(_, d)| d.parse::<f64>().ok())
        .ok_or_else(|| FieldError::new(format!("'{}' is not a two-decimal number", s)))
}

/// Any decimal number, with optional sign and fraction
pub(crate) fn decimal(s: &str) -> FieldResult<f64> {
    all_consuming(any_decimal)(s)
        .ok()
        .and_then(|(_, d)| d.parse::<f64>().ok())
        .ok_or_else(|| FieldError::new(format!("'{}' is not a decimal number", s)))
}

/// Percentage such as `0.37%`
pub(crate) fn percentage(s: &str) -> FieldResult<f64> {
    all_consuming(percent)(s)
        .ok()
        .and_then(|(_, d)| d.parse::<f64>().ok())
        .ok_or_else(|| FieldError::new(format!("'{}' is not a percentage", s)))
}

fn date(input: &str) -> IResult<&str, (&str, &str, &str)> {
    let (input, (y, _, m, _, d)) = tuple((
        fixed_digits(4),
        char('-'),
        fixed_digits(2),
        char('-'),
        fixed_digits(2),
    ))(input)?;
    Ok((input, (y, m, d)))
}

/// HH:MM:SS with an optional (ignored) fractional part
fn time(input: &str) -> IResult<&str, (&str, &str, &str)> {
    let (input, (h, _, m, _, s, _)) = tuple((
        fixed_digits(2),
        char(':'),
        fixed_digits(2),
        char(':'),
        fixed_digits(2),
        opt(preceded(char('.'), digit1)),
    ))(input)?;
    Ok((input, (h, m, s)))
}

fn datetime(input: &str) -> IResult<&str, ((&str, &str, &str), (&str, &str, &str))> {
    tuple((date, preceded(ws, time)))(input)
}

/// Build a UTC timestamp, rejecting calendar-invalid values
fn utc(d: (&str, &str, &str), t: (&str, &str, &str), raw: &str) -> FieldResult<DateTime<Utc>> {
    let invalid = || FieldError::new(format!("'{}' is not a valid timestamp", raw));
    let num = |s: &str| s.parse::<u32>().map_err(|_| invalid());
    let year = d.0.parse::<i32>().map_err(|_| invalid())?;
    let (month, day) = (num(d.1)?, num(d.2)?);
    let (hour, minute, second) = (num(t.0)?, num(t.1)?, num(t.2)?);
    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(invalid)?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// `YYYY-MM-DD HH:MM:SS[.frac]`, date and time separated by a space or tab
pub(crate) fn timestamp(s: &str) -> FieldResult<DateTime<Utc>> {
    let (_, (d, t)) = all_consuming(datetime)(s)
        .map_err(|_| FieldError::new(format!("'{}' is not a timestamp", s)))?;
    utc(d, t, s)
}

/// Timestamp given as two separate tokens
pub(crate) fn timestamp_parts(date_part: &str, time_part: &str) -> FieldResult<DateTime<Utc>> {
    let raw = format!("{} {}", date_part, time_part);
    let (_, d) = all_consuming(date)(date_part)
        .map_err(|_| FieldError::new(format!("'{}' is not a date", date_part)))?;
    let (_, t) = all_consuming(time)(time_part)
        .map_err(|_| FieldError::new(format!("'{}' is not a time", time_part)))?;
    utc(d, t, &raw)
}

/// `(NNN s)` with optional inner whitespace, returning the interval
fn interval_clause(input: &str) -> IResult<&str, &str> {
    let (input, _) = tuple((char('('), opt(ws)))(input)?;
    let (input, seconds) = digit1(input)?;
    let (input, _) = tuple((ws, char('s'), opt(ws), char(')')))(input)?;
    Ok((input, seconds))
}

/// `YYYY-MM-DD HH:MM:SS (NSEC s)[ rest]`: end timestamp, interval seconds and
/// the (possibly empty) remainder.
pub(crate) fn timestamp_interval(s: &str) -> FieldResult<(DateTime<Utc>, u64, &str)> {
    let parser = tuple((
        datetime,
        preceded(ws, interval_clause),
        opt(preceded(ws, rest)),
    ));
    let (_, ((d, t), seconds, remainder)) = all_consuming(parser)(s)
        .map_err(|_| FieldError::new(format!("'{}' lacks a valid '(N s)' interval", s)))?;
    let end = utc(d, t, s)?;
    let interval = uint(seconds)?;
    if interval == 0 {
        return Err(FieldError::new("interval length must be positive"));
    }
    Ok((end, interval, remainder.unwrap_or("").trim()))
}

fn elements(input: &str) -> IResult<&str, Vec<&str>> {
    separated_list1(char(','), take_till1(|c: char| c == ','))(input)
}

/// Comma-separated, non-empty elements; no empty element anywhere
pub(crate) fn comma_list(s: &str) -> FieldResult<Vec<&str>> {
    all_consuming(elements)(s)
        .map(|(_, list)| list)
        .map_err(|_| FieldError::new(format!("'{}' is not a comma-separated list", s)))
}

/// Comma-separated list of values of one numeric shape. An empty input is an
/// empty list.
pub(crate) fn histogram<T>(s: &str, elem: impl Fn(&str) -> FieldResult<T>) -> FieldResult<Vec<T>> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    comma_list(s)?.into_iter().map(elem).collect()
}

/// Comma-separated `key=value` list. Duplicate keys keep the last value.
pub(crate) fn key_values<V>(
    s: &str,
    key: impl Fn(&str) -> FieldResult<String>,
    value: impl Fn(&str) -> FieldResult<V>,
) -> FieldResult<BTreeMap<String, V>> {
    let mut map = BTreeMap::new();
    if s.is_empty() {
        return Ok(map);
    }
    for entry in comma_list(s)? {
        let (k, v) = split_pair(entry)?;
        map.insert(key(k)?, value(v)?);
    }
    Ok(map)
}

/// Split `key=value`, requiring exactly one `=` and a non-empty key
pub(crate) fn split_pair(entry: &str) -> FieldResult<(&str, &str)> {
    match entry.split_once('=') {
        Some((k, v)) if !k.is_empty() && !v.contains('=') => Ok((k, v)),
        _ => Err(FieldError::new(format!("'{}' is not a key=value pair", entry))),
    }
}

/// Any non-empty key
pub(crate) fn any_key(k: &str) -> FieldResult<String> {
    Ok(k.to_string())
}

/// Two-letter country code or `??`, normalized to lower case
pub(crate) fn country_code(k: &str) -> FieldResult<String> {
    if k == "??" || (k.len() == 2 && k.chars().all(|c| c.is_ascii_alphabetic())) {
        Ok(k.to_ascii_lowercase())
    } else {
        Err(FieldError::new(format!("'{}' is not a country code", k)))
    }
}

/// Port number or `other`
pub(crate) fn port_key(k: &str) -> FieldResult<String> {
    if k == "other" {
        return Ok(k.to_string());
    }
    port(k).map(|p| p.to_string())
}

/// Space-separated `key=value` tokens with 32-bit integer values
pub(crate) fn int32_params<'a>(
    tokens: impl IntoIterator<Item = &'a str>,
) -> FieldResult<BTreeMap<String, i32>> {
    let mut map = BTreeMap::new();
    for token in tokens {
        let (k, v) = split_pair(token)?;
        map.insert(k.to_string(), int32(v)?);
    }
    Ok(map)
}
