use std::fmt::{Display, Formatter};

use nom::IResult;
use nom::character::complete::digit1;
use nom::combinator::{all_consuming, map_res};
use nom::error::{ErrorKind, FromExternalError, ParseError};

/// Why a parser stopped.
#[derive(Debug)]
pub enum FailureReason {
    /// The input did not match the expected token.
    Expected(ErrorKind),
    /// The token matched but its value was rejected.
    Invalid(String),
}

/// Error of the nom parsers: the unparsed rest of the input and the reason.
#[derive(Debug)]
pub struct ParseFailure<'a> {
    pub remaining: &'a str,
    pub reason: FailureReason,
}

impl Display for ParseFailure<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            FailureReason::Expected(kind) => {
                write!(f, "expected {} at `{}`", kind.description(), self.remaining)
            }
            FailureReason::Invalid(message) => write!(f, "{message} at `{}`", self.remaining),
        }
    }
}

impl<'a> ParseError<&'a str> for ParseFailure<'a> {
    fn from_error_kind(input: &'a str, kind: ErrorKind) -> Self {
        ParseFailure {
            remaining: input,
            reason: FailureReason::Expected(kind),
        }
    }

    fn append(_: &'a str, _: ErrorKind, other: Self) -> Self {
        other
    }
}

impl<'a, E: Display> FromExternalError<&'a str, E> for ParseFailure<'a> {
    fn from_external_error(input: &'a str, _: ErrorKind, error: E) -> Self {
        ParseFailure {
            remaining: input,
            reason: FailureReason::Invalid(error.to_string()),
        }
    }
}

pub type NomResult<'a, T> = IResult<&'a str, T, ParseFailure<'a>>;

/// Runs `parser` on `input` and makes sure that the whole input was consumed.
pub fn consume_all<'a, O, F>(parser: F, input: &'a str) -> anyhow::Result<O>
where
    F: FnMut(&'a str) -> NomResult<'a, O>,
{
    all_consuming(parser)(input)
        .map(|(_, output)| output)
        .map_err(|error| match error {
            nom::Err::Error(failure) | nom::Err::Failure(failure) => {
                anyhow::anyhow!("Cannot parse `{input}`: {failure}")
            }
            nom::Err::Incomplete(_) => anyhow::anyhow!("Cannot parse `{input}`: incomplete input"),
        })
}

/// Plain decimal number, as used in array range definitions.
pub fn p_u32(input: &str) -> NomResult<'_, u32> {
    map_res(digit1, str::parse::<u32>)(input)
}
