use std::{
    fmt,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use anyhow::{anyhow, Context, Result};
use nom::{
    character::complete::{char, digit1, hex_digit1, multispace0, multispace1, one_of},
    combinator::{all_consuming, map_res},
    IResult,
};

use crate::addr::Addr;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AccessKind {
    InstructionFetch,
    Load,
    Store,
    /// a load immediately followed by a store to the same address.
    Modify,
}

impl TryFrom<char> for AccessKind {
    type Error = anyhow::Error;

    fn try_from(c: char) -> Result<Self> {
        Ok(match c {
            'I' => Self::InstructionFetch,
            'L' => Self::Load,
            'S' => Self::Store,
            'M' => Self::Modify,
            _ => return Err(anyhow!("unknown access kind {c:?}")),
        })
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Self::InstructionFetch => 'I',
            Self::Load => 'L',
            Self::Store => 'S',
            Self::Modify => 'M',
        };
        write!(f, "{c}")
    }
}

/// one line of a valgrind `--trace-mem` style trace.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AccessRecord {
    pub kind: AccessKind,
    pub address: Addr,
    pub size: u32,
}

impl fmt::Display for AccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:x},{}", self.kind, self.address.inner(), self.size)
    }
}

fn kind(input: &str) -> IResult<&str, AccessKind> {
    map_res(one_of("ILSM"), AccessKind::try_from)(input)
}

fn address(input: &str) -> IResult<&str, Addr> {
    map_res(hex_digit1, |s: &str| u64::from_str_radix(s, 16).map(Addr::new))(input)
}

fn size(input: &str) -> IResult<&str, u32> {
    map_res(digit1, |s: &str| s.parse::<u32>())(input)
}

fn record(input: &str) -> IResult<&str, AccessRecord> {
    let (input, _) = multispace0(input)?;
    let (input, kind) = kind(input)?;
    let (input, _) = multispace1(input)?;
    let (input, address) = address(input)?;
    let (input, _) = char(',')(input)?;
    let (input, size) = size(input)?;
    let (input, _) = multispace0(input)?;
    Ok((
        input,
        AccessRecord {
            kind,
            address,
            size,
        },
    ))
}

impl AccessRecord {
    pub fn parse(line: &str) -> Result<Self> {
        let (_, r) =
            all_consuming(record)(line).map_err(|e| anyhow!("malformed trace line {line:?}: {e}"))?;
        Ok(r)
    }
}

/// lazily decodes a trace, yielding only the records that reach the cache.
///
/// instruction fetches are dropped and counted. malformed lines are logged,
/// counted and skipped; only I/O failures surface as errors.
pub struct TraceReader<R> {
    lines: io::Lines<R>,
    line_no: usize,
    ignored: usize,
    malformed: usize,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            ignored: 0,
            malformed: 0,
        }
    }
    /// # of instruction fetches dropped so far
    pub fn ignored(&self) -> usize {
        self.ignored
    }
    /// # of malformed lines skipped so far
    pub fn malformed(&self) -> usize {
        self.malformed
    }
}

impl TraceReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("failed to open trace {}", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<AccessRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match AccessRecord::parse(&line) {
                Ok(r) if r.kind == AccessKind::InstructionFetch => self.ignored += 1,
                Ok(r) => return Some(Ok(r)),
                Err(e) => {
                    self.malformed += 1;
                    log::warn!("line {}: {e}. skipped.", self.line_no);
                }
            }
        }
    }
}
