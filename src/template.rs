//! Token substitution for sequence templates.
//!
//! Before each iteration the serialized template of a sequence goes through
//! [`substitute`], which replaces, in order:
//! * `[$sequence]` with the current counter,
//! * `[$name]` with the counter of the sequence called `name`,
//! * `[#function mask]` with generated data, see [`generate`].

use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;

use std::time::{Duration, Instant};

use crate::error::{Result, SeedlingError};

pub const DEFAULT_COUNTER_TOKEN: &str = "[$sequence]";

const CONSONANTS: &[u8] = b"qwrtpsdfghjklzxcvbnm";
const VOWELS: &[u8] = b"eyuioa";
const DEFAULT_RANDOM_MASK: &str = "10";
const WORD_LENGTHS: std::ops::Range<usize> = 5..12;

lazy_static! {
    static ref FUNCTION_TOKEN: Regex =
        Regex::new(r"\[#(?P<name>[a-zA-Z_]+)(?P<mask>[0-9#]*(\.[0-9#]+)?)\]").unwrap();
}

pub fn substitute<R: Rng + ?Sized>(
    template: &str,
    sequence_name: &str,
    counter: i64,
    rng: &mut R,
) -> Result<String> {
    let counter = counter.to_string();
    let text = template
        .replace(DEFAULT_COUNTER_TOKEN, &counter)
        .replace(&format!("[${sequence_name}]"), &counter);
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for captures in FUNCTION_TOKEN.captures_iter(&text) {
        let Some(token) = captures.get(0) else { continue };
        out.push_str(&text[last..token.start()]);
        let name = captures.name("name").map_or("", |m| m.as_str());
        let mask = captures.name("mask").map_or("", |m| m.as_str());
        out.push_str(&generate(name, mask, rng)?);
        last = token.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// Evaluates one template function.
///
/// * `random` / `Random`: with `#` in the mask every `#` becomes a random
///   digit; otherwise the mask is an upper bound `N` and the result lies in
///   `[1, N)`. The default mask is `10`.
/// * `randomword`: a pronounceable lowercase word, the mask being its length
///   (random between 5 and 11 when absent).
/// * `RandomWord` / `Randomword`: the same, capitalized.
pub fn generate<R: Rng + ?Sized>(name: &str, mask: &str, rng: &mut R) -> Result<String> {
    match name {
        "random" | "Random" => random_number(name, mask, rng),
        "randomword" => random_word(name, mask, rng),
        "RandomWord" | "Randomword" => {
            let word = random_word(name, mask, rng)?;
            let mut chars = word.chars();
            Ok(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => word,
            })
        }
        _ => Err(SeedlingError::UnknownTemplateFunction {
            function: name.to_string(),
        }),
    }
}

fn bad_argument(function: &str, argument: &str) -> SeedlingError {
    SeedlingError::TemplateArgument {
        function: function.to_string(),
        argument: argument.to_string(),
    }
}

fn random_number<R: Rng + ?Sized>(name: &str, mask: &str, rng: &mut R) -> Result<String> {
    let mask = if mask.is_empty() { DEFAULT_RANDOM_MASK } else { mask };
    if mask.contains('#') {
        return Ok(mask
            .chars()
            .map(|c| match c {
                '#' => char::from(b'0' + rng.random_range(0..10u8)),
                other => other,
            })
            .collect());
    }
    match mask.parse::<u64>() {
        Ok(bound) if bound > 1 => Ok(rng.random_range(1..bound).to_string()),
        _ => Err(bad_argument(name, mask)),
    }
}

fn random_word<R: Rng + ?Sized>(name: &str, mask: &str, rng: &mut R) -> Result<String> {
    let length = if mask.is_empty() {
        rng.random_range(WORD_LENGTHS)
    } else {
        mask.parse::<usize>().map_err(|_| bad_argument(name, mask))?
    };
    Ok((0..length)
        .map(|position| {
            let class = if position % 2 == 0 { CONSONANTS } else { VOWELS };
            char::from(class[rng.random_range(0..class.len())])
        })
        .collect())
}

/// Decides when a sequence reports its progress.
#[derive(Debug)]
pub struct ProgressTracker {
    interval: Duration,
    last_percent: Option<i64>,
    last_emit: Instant,
}

impl ProgressTracker {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_percent: None,
            last_emit: now,
        }
    }
    pub fn percent_done(counter: i64, max: i64) -> i64 {
        if max <= 0 {
            100
        } else {
            counter.saturating_mul(100).div_euclid(max)
        }
    }
    /// Returns the percentage to report for `counter`, if any. A report is
    /// due on every multiple of ten or once the interval has elapsed, and
    /// never twice for the same percentage.
    pub fn observe(&mut self, counter: i64, max: i64, now: Instant) -> Option<i64> {
        let percent = Self::percent_done(counter, max);
        if self.last_percent == Some(percent) {
            return None;
        }
        if percent % 10 == 0 || now.duration_since(self.last_emit) >= self.interval {
            self.last_percent = Some(percent);
            self.last_emit = now;
            Some(percent)
        } else {
            None
        }
    }
}
