use std::{
    convert::TryFrom,
    time::{Duration, SystemTime},
};

use chrono::{NaiveDate, TimeZone, Utc};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till1, take_while, take_while1},
    combinator::{map, map_res, value},
    multi::fold_many0,
    sequence::delimited,
    IResult,
};

use super::char::*;
use crate::{types, Error};

pub(super) fn integrity_string(input: &[u8]) -> IResult<&[u8], types::IntString> {
    // TODO: thirdp support
    map(
        delimited(tag(b"@"), take_while(is_intchar), tag(b"@")),
        |bytes| types::IntString(Vec::from(bytes)),
    )(input)
}

pub(super) fn id(input: &[u8]) -> IResult<&[u8], types::Id> {
    map(take_while(|c| is_idchar(c) || c == b'.'), |bytes| {
        types::Id(Vec::from(bytes))
    })(input)
}

pub(super) fn numlike(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(|c| c == b'.' || (c >= b'0' && c <= b'9'))(input)
}

/// Parses an RCS date, `YY.MM.DD.hh.mm.ss` (or `YYYY.MM.DD.hh.mm.ss` per the
/// RCS 5.7 Y2K fix), as UTC. Two-digit years follow RCS's convention: values
/// below 69 are 20xx, everything else is 19xx.
pub(super) fn date(input: &[u8]) -> IResult<&[u8], SystemTime> {
    map_res(numlike, parse_date)(input)
}

fn parse_date(bytes: &[u8]) -> Result<SystemTime, Error> {
    let s = std::str::from_utf8(bytes)?;
    let parts: Vec<&str> = s.split('.').collect();
    let invalid = || Error::InvalidDate(bytes.to_vec());

    if parts.len() != 6 {
        return Err(invalid());
    }

    let mut year: i32 = parts[0].parse().map_err(|_| invalid())?;
    if year < 100 {
        year += if year < 69 { 2000 } else { 1900 };
    }
    let month: u32 = parts[1].parse().map_err(|_| invalid())?;
    let day: u32 = parts[2].parse().map_err(|_| invalid())?;
    let hour: u32 = parts[3].parse().map_err(|_| invalid())?;
    let minute: u32 = parts[4].parse().map_err(|_| invalid())?;
    let second: u32 = parts[5].parse().map_err(|_| invalid())?;

    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(invalid)?;

    let timestamp = Utc.from_utc_datetime(&naive).timestamp();
    Ok(SystemTime::UNIX_EPOCH + Duration::from_secs(timestamp as u64))
}

pub(super) fn num(input: &[u8]) -> IResult<&[u8], types::Num> {
    map_res(numlike, types::Num::try_from)(input)
}

pub(super) fn string_literal(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_till1(|c| c == b'@')(input)
}

pub(super) fn string_escape(input: &[u8]) -> IResult<&[u8], &[u8]> {
    value(&b"@"[..], tag(b"@@"))(input)
}

pub(super) fn string(input: &[u8]) -> IResult<&[u8], types::VString> {
    map(
        delimited(
            tag(b"@"),
            fold_many0(
                alt((string_literal, string_escape)),
                Vec::new(),
                |mut v, fragment| {
                    v.extend_from_slice(fragment);
                    v
                },
            ),
            tag(b"@"),
        ),
        |bytes| types::VString(bytes),
    )(input)
}

pub(super) fn sym(input: &[u8]) -> IResult<&[u8], types::Sym> {
    map(take_while(is_idchar), |bytes| types::Sym(Vec::from(bytes)))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test() {
        assert_eq!(*integrity_string(b"@@").unwrap().1, b"");
        assert_eq!(*integrity_string(b"@foo@").unwrap().1, b"foo");
        assert_eq!(*integrity_string(b"@foo\x0cbar@").unwrap().1, b"foo\x0cbar");

        assert_eq!(string(b"@foo bar@").unwrap().1 .0, b"foo bar");
        assert_eq!(string(b"@foo@@bar@").unwrap().1 .0, b"foo@bar");
    }
}
