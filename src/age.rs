//! Age predicate parsing and calendar-accurate birthdate bound translation.

use chrono::{Months, NaiveDate};
use regex::Regex;

use crate::err::CompileError;

/// A parsed comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeOp {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
}

/// A parsed age predicate: `OP NUMBER`, e.g. `>=18`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgePredicate {
    pub op: AgeOp,
    pub years: u32,
}

impl AgePredicate {
    /// Parses a predicate string. `NUMBER` must be a non-negative integer number of years;
    /// the source domain only ever expresses trial ages in whole years.
    pub fn parse(raw: &str) -> Result<Self, CompileError> {
        let re = Regex::new(r"^\s*(>=|<=|==|>|<)\s*(\d+)\s*$").expect("invalid regex in source code");
        let trimmed = raw.trim();
        let captures = re
            .captures(trimmed)
            .ok_or_else(|| CompileError::InvalidAgePredicate(trimmed.to_string()))?;
        let op = match &captures[1] {
            ">=" => AgeOp::Ge,
            "<=" => AgeOp::Le,
            "==" => AgeOp::Eq,
            ">" => AgeOp::Gt,
            "<" => AgeOp::Lt,
            _ => unreachable!("regex only captures the five recognized operators"),
        };
        let years: u32 = captures[2]
            .parse()
            .map_err(|_| CompileError::InvalidAgePredicate(trimmed.to_string()))?;
        Ok(AgePredicate { op, years })
    }

    /// Translates this predicate into a birthdate bound relative to `today`, using
    /// calendar-accurate year subtraction (not a fixed-day-count approximation).
    ///
    /// `age >= a` means "born on or before `today - a years`"; symmetric derivations hold
    /// for the other four operators.
    pub fn to_birth_date_bound(self, today: NaiveDate) -> BirthDateBound {
        let cutoff = today
            .checked_sub_months(Months::new(self.years * 12))
            .expect("birth date cutoff out of range");
        match self.op {
            AgeOp::Ge => BirthDateBound::OnOrBefore(cutoff),
            AgeOp::Gt => BirthDateBound::Before(cutoff),
            AgeOp::Le => BirthDateBound::OnOrAfter(cutoff),
            AgeOp::Lt => BirthDateBound::After(cutoff),
            AgeOp::Eq => BirthDateBound::Exactly(cutoff),
        }
    }
}

/// A translated bound on `birth_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BirthDateBound {
    OnOrBefore(NaiveDate),
    Before(NaiveDate),
    OnOrAfter(NaiveDate),
    After(NaiveDate),
    Exactly(NaiveDate),
}

impl BirthDateBound {
    /// Whether the given birth date satisfies this bound.
    pub fn matches(self, birth_date: NaiveDate) -> bool {
        match self {
            BirthDateBound::OnOrBefore(cutoff) => birth_date <= cutoff,
            BirthDateBound::Before(cutoff) => birth_date < cutoff,
            BirthDateBound::OnOrAfter(cutoff) => birth_date >= cutoff,
            BirthDateBound::After(cutoff) => birth_date > cutoff,
            BirthDateBound::Exactly(cutoff) => birth_date == cutoff,
        }
    }
}
