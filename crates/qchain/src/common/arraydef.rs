use std::fmt;
use std::str::FromStr;

use nom::character::complete::{char, space0};
use nom::combinator::{map_res, opt};
use nom::multi::separated_list1;
use nom::sequence::{delimited, preceded, tuple};

use crate::common::parser::{NomResult, consume_all, p_u32};

/// Range of array task indices, as printed by batch systems (`n[-end][:step]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntRange {
    pub start: u32,
    pub end: u32,
    pub step: u32,
}

impl IntRange {
    pub fn new(start: u32, end: u32, step: u32) -> IntRange {
        IntRange { start, end, step }
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> {
        (self.start..=self.end).step_by(self.step as usize)
    }

    pub fn id_count(&self) -> u32 {
        (self.end - self.start) / self.step + 1
    }
}

/// Set of array task indices (`1-10:2,15,20-22`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntArray {
    ranges: Vec<IntRange>,
}

impl IntArray {
    pub fn new(ranges: Vec<IntRange>) -> IntArray {
        IntArray { ranges }
    }

    pub fn from_range(start: u32, end: u32) -> IntArray {
        IntArray::new(vec![IntRange::new(start, end, 1)])
    }

    #[inline]
    pub fn id_count(&self) -> u32 {
        self.ranges.iter().map(|range| range.id_count()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|range| range.iter())
    }
}

impl fmt::Display for IntArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, range) in self.ranges.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            if range.start == range.end {
                write!(f, "{}", range.start)?;
            } else if range.step == 1 {
                write!(f, "{}-{}", range.start, range.end)?;
            } else {
                write!(f, "{}-{}:{}", range.start, range.end, range.step)?;
            }
        }
        Ok(())
    }
}

impl FromStr for IntArray {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_array(s)
    }
}

/// Parse integer range in the format n[-end][:step].
fn p_range(input: &str) -> NomResult<IntRange> {
    map_res(
        tuple((p_u32, opt(preceded(char('-'), p_u32)), opt(preceded(char(':'), p_u32)))),
        |(start, end, step)| match (start, end, step) {
            (v, None, _) => Ok(IntRange::new(v, v, 1)),
            (v, Some(w), None) if w >= v => Ok(IntRange::new(v, w, 1)),
            (v, Some(w), Some(x)) if w >= v && x > 0 => Ok(IntRange::new(v, w, x)),
            _ => Err(anyhow::anyhow!("Invalid range")),
        },
    )(input)
}

fn p_ranges(input: &str) -> NomResult<Vec<IntRange>> {
    separated_list1(char(','), delimited(space0, p_range, space0))(input)
}

/// Parses integer ranges separated by commas.
pub fn parse_array(input: &str) -> anyhow::Result<IntArray> {
    consume_all(p_ranges, input).map(IntArray::new)
}
