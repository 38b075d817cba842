//! Command scripts for the `vm-sim` binary.
//!
//! One command per line:
//!
//! ```text
//! # comment
//! write 0b10001011101101110011 1337
//! read 0x8BB73
//! reset        # root table only
//! full-reset   # RAM and backing store too
//! ```

use std::fs;
use std::path::Path;

use log::warn;

use crate::constants::Word;
use crate::error::{Result, VmError};
use crate::vm_manager::VmManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Read(u64),
    Write(u64, Word),
    Reset,
    FullReset,
}

/// Result of running one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Value(Word),
    Done,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Value(v) => write!(f, "{}", v),
            Outcome::Done => write!(f, "ok"),
            Outcome::Failed => write!(f, "fail"),
        }
    }
}

/// Parse an unsigned literal: decimal, `0x` hex or `0b` binary
pub fn parse_address(token: &str) -> Option<u64> {
    let token = token.replace('_', "");
    if let Some(hex) = token.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = token.strip_prefix("0b") {
        u64::from_str_radix(bin, 2).ok()
    } else {
        token.parse().ok()
    }
}

/// Parse a word, allowing a leading minus sign
pub fn parse_word(token: &str) -> Option<Word> {
    match token.strip_prefix('-') {
        Some(rest) => {
            let magnitude = i64::try_from(parse_address(rest)?).ok()?;
            Word::try_from(-magnitude).ok()
        }
        None => Word::try_from(parse_address(token)?).ok(),
    }
}

pub fn read_script<P: AsRef<Path>>(path: P) -> Result<Vec<Command>> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_script(&content)
}

pub fn parse_script(content: &str) -> Result<Vec<Command>> {
    let mut commands = Vec::new();
    for (i, raw) in content.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        commands.push(parse_line(i + 1, line)?);
    }
    Ok(commands)
}

fn parse_line(line_no: usize, line: &str) -> Result<Command> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let address = |token: &str| {
        parse_address(token).ok_or_else(|| VmError::parse(line_no, format!("invalid address: {}", token)))
    };

    match tokens.as_slice() {
        ["read", addr] => Ok(Command::Read(address(*addr)?)),
        ["write", addr, value] => {
            let value =
                parse_word(value).ok_or_else(|| VmError::parse(line_no, format!("invalid value: {}", value)))?;
            Ok(Command::Write(address(*addr)?, value))
        }
        ["reset"] => Ok(Command::Reset),
        ["full-reset"] => Ok(Command::FullReset),
        [cmd, ..] if matches!(*cmd, "read" | "write" | "reset" | "full-reset") => Err(VmError::parse(
            line_no,
            format!("wrong number of arguments for {}", cmd),
        )),
        [cmd, ..] => Err(VmError::parse(line_no, format!("unknown command: {}", cmd))),
        [] => Err(VmError::parse(line_no, "empty command")),
    }
}

/// Run `commands` in order. Out-of-range addresses become [`Outcome::Failed`];
/// any other error aborts the run.
pub fn run_script(vm: &mut VmManager, commands: &[Command]) -> Result<Vec<Outcome>> {
    let mut outcomes = Vec::with_capacity(commands.len());
    for &command in commands {
        let result = match command {
            Command::Read(addr) => vm.vm_read(addr).map(Outcome::Value),
            Command::Write(addr, value) => vm.vm_write(addr, value).map(|()| Outcome::Done),
            Command::Reset => {
                vm.initialize();
                Ok(Outcome::Done)
            }
            Command::FullReset => {
                vm.fully_initialize();
                Ok(Outcome::Done)
            }
        };
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) if e.is_recoverable() => {
                warn!("{:?}: {}", command, e);
                outcomes.push(Outcome::Failed);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(outcomes)
}

pub fn format_results(outcomes: &[Outcome]) -> String {
    outcomes.iter().map(|o| format!("{}\n", o)).collect()
}

pub fn write_results<P: AsRef<Path>>(path: P, outcomes: &[Outcome]) -> Result<()> {
    fs::write(path.as_ref(), format_results(outcomes))?;
    Ok(())
}
