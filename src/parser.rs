//! Small text parsers using nom.
//!
//! Covers the pieces of text the client has to understand itself:
//!
//! ```text
//! 10.0.0.5:10800                       server address (split on first ':')
//! igniteworks://user:pw@host:10800     connection URL
//! 42, 3.5, 'it''s', true, DATE '...'   parameter literals
//! SELECT ... / UPDATE ...              statement kind (row-returning or not)
//! ```
//!
//! Statement text itself is never parsed beyond its leading keyword; the
//! server owns SQL.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_till1, take_until, take_while, take_while1},
    character::complete::{char, digit0, digit1, multispace0, multispace1, none_of, one_of},
    combinator::{all_consuming, eof, map, map_res, opt, peek, recognize, value},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::config::Endpoint;
use crate::error::{IgniteError, IgniteResult};
use crate::value::Value;

/// Parse a `host:port` server address.
///
/// The address is split on the first colon only; everything after it must be
/// a valid port number.
///
/// # Example
///
/// ```
/// use igniteworks::parser::parse_address;
///
/// let endpoint = parse_address("10.0.0.5:10800").unwrap();
/// assert_eq!(endpoint.host, "10.0.0.5");
/// assert_eq!(endpoint.port, 10800);
/// ```
pub fn parse_address(input: &str) -> IgniteResult<Endpoint> {
    let trimmed = input.trim();
    if !trimmed.contains(':') {
        return Err(IgniteError::address(input, "expected host:port"));
    }

    match all_consuming(address)(trimmed) {
        Ok((_, (host, port))) => Ok(Endpoint::new(host, port)),
        Err(_) => Err(IgniteError::address(
            input,
            "host must be non-empty and port must be a number between 0 and 65535",
        )),
    }
}

fn address(input: &str) -> IResult<&str, (&str, u16)> {
    let (input, host) = take_till1(|c| c == ':')(input)?;
    let (input, _) = char(':')(input)?;
    let (input, port) = map_res(digit1, str::parse::<u16>)(input)?;
    Ok((input, (host, port)))
}

/// Components of a connection URL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UrlParts {
    pub scheme: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
}

/// Parse `scheme://[user[:password]@][host[:port]][/database]`.
pub fn parse_url(input: &str) -> IgniteResult<UrlParts> {
    match all_consuming(url)(input.trim()) {
        Ok((_, parts)) => Ok(parts),
        Err(e) => Err(IgniteError::Config(format!(
            "Malformed connection URL '{}': {:?}",
            input, e
        ))),
    }
}

fn url(input: &str) -> IResult<&str, UrlParts> {
    let (input, scheme) = terminated(
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '_'),
        tag("://"),
    )(input)?;
    let (input, userinfo) = opt(terminated(
        pair(
            take_while1(|c: char| c != ':' && c != '@' && c != '/'),
            opt(preceded(char(':'), take_while(|c: char| c != '@'))),
        ),
        char('@'),
    ))(input)?;
    let (input, host) = opt(take_while1(|c: char| c != ':' && c != '/'))(input)?;
    let (input, port) = opt(preceded(char(':'), map_res(digit1, str::parse::<u16>)))(input)?;
    let (input, database) = opt(preceded(char('/'), take_while(|_| true)))(input)?;

    let (username, password) = match userinfo {
        Some((user, pass)) => (Some(user.to_string()), pass.map(str::to_string)),
        None => (None, None),
    };

    Ok((
        input,
        UrlParts {
            scheme: scheme.to_string(),
            username,
            password,
            host: host.map(str::to_string),
            port,
            database: database.filter(|d| !d.is_empty()).map(str::to_string),
        },
    ))
}

/// Parse a comma separated list of parameter literals.
///
/// Supported forms: integers, floats, `'quoted'` strings (with `''` escapes),
/// `true`/`false`/`null`, `DATE '...'`, `TIME '...'`, `TIMESTAMP '...'`.
/// Anything else is taken verbatim as a string.
pub fn parse_literals(input: &str) -> IgniteResult<Vec<Value>> {
    let parsed = all_consuming(delimited(
        multispace0,
        separated_list0(delimited(multispace0, char(','), multispace0), literal),
        multispace0,
    ))(input);

    match parsed {
        Ok((_, values)) => Ok(values),
        Err(e) => Err(IgniteError::Config(format!(
            "Invalid parameter list '{}': {:?}",
            input, e
        ))),
    }
}

fn literal(input: &str) -> IResult<&str, Value> {
    alt((
        typed_literal,
        map(quoted, Value::String),
        keyword,
        number,
        bare_word,
    ))(input)
}

/// Lookahead for the end of one list item.
fn item_end(input: &str) -> IResult<&str, ()> {
    value((), peek(preceded(multispace0, alt((tag(","), eof)))))(input)
}

fn quoted(input: &str) -> IResult<&str, String> {
    map(
        delimited(
            char('\''),
            many0(alt((value('\'', tag("''")), none_of("'")))),
            char('\''),
        ),
        |chars: Vec<char>| chars.into_iter().collect(),
    )(input)
}

fn keyword(input: &str) -> IResult<&str, Value> {
    terminated(
        alt((
            value(Value::Bool(true), tag_no_case("true")),
            value(Value::Bool(false), tag_no_case("false")),
            value(Value::Null, tag_no_case("null")),
        )),
        item_end,
    )(input)
}

fn number(input: &str) -> IResult<&str, Value> {
    let (rest, text) = terminated(
        recognize(tuple((
            opt(one_of("+-")),
            digit1,
            opt(pair(char('.'), digit0)),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        item_end,
    )(input)?;

    let parsed = if text.contains(['.', 'e', 'E']) {
        text.parse::<f64>().ok().map(Value::Float)
    } else {
        text.parse::<i64>().ok().map(Value::Int)
    };

    match parsed {
        Some(v) => Ok((rest, v)),
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        ))),
    }
}

fn typed_literal(input: &str) -> IResult<&str, Value> {
    alt((
        map_res(
            preceded(pair(tag_no_case("TIMESTAMP"), multispace1), quoted),
            |s| {
                NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f").map(Value::Timestamp)
            },
        ),
        map_res(preceded(pair(tag_no_case("DATE"), multispace1), quoted), |s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d").map(Value::Date)
        }),
        map_res(preceded(pair(tag_no_case("TIME"), multispace1), quoted), |s| {
            NaiveTime::parse_from_str(&s, "%H:%M:%S%.f").map(Value::Time)
        }),
    ))(input)
}

fn bare_word(input: &str) -> IResult<&str, Value> {
    map(take_while1(|c: char| c != ','), |s: &str| {
        Value::String(s.trim_end().to_string())
    })(input)
}

/// Whether a statement produces rows or only an update count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// SELECT, WITH, VALUES, SHOW, EXPLAIN and the metadata `GET` commands.
    Query,
    /// Everything else: DML, DDL, SET.
    Update,
}

/// Classify a statement by its first keyword, skipping whitespace and comments.
pub fn statement_kind(sql: &str) -> StatementKind {
    match leading_keyword(sql) {
        Ok((_, word)) => match word.to_ascii_uppercase().as_str() {
            "SELECT" | "WITH" | "VALUES" | "SHOW" | "EXPLAIN" | "GET" | "PRAGMA"
            | "DESCRIBE" | "TABLE" => StatementKind::Query,
            _ => StatementKind::Update,
        },
        Err(_) => StatementKind::Update,
    }
}

fn leading_keyword(input: &str) -> IResult<&str, &str> {
    preceded(
        many0(alt((
            multispace1,
            recognize(pair(tag("--"), take_while(|c| c != '\n'))),
            recognize(tuple((tag("/*"), take_until("*/"), tag("*/")))),
        ))),
        alt((
            take_while1(|c: char| c.is_ascii_alphabetic()),
            // A parenthesized query, e.g. "(SELECT ...) UNION (...)".
            preceded(
                pair(char('('), multispace0),
                take_while1(|c: char| c.is_ascii_alphabetic()),
            ),
        )),
    )(input)
}
