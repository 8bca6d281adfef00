//! Compiles strftime-style formats into regular expressions.
//!
//! The compiled pattern is anchored at the start only: a value conforms when
//! a prefix of it matches the format. Matching is case-insensitive so month
//! and weekday names are accepted in any case.

use regex::{Regex, RegexBuilder};

use crate::error::VeritasError;
use crate::Result;

const MONTH_NAMES: &str = "january|february|march|april|may|june|july|august|september|october|november|december";
const MONTH_ABBREVIATIONS: &str = "jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec";
const WEEKDAY_NAMES: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday";
const WEEKDAY_ABBREVIATIONS: &str = "mon|tue|wed|thu|fri|sat|sun";

/// Regular expression fragment for one strftime directive.
fn directive_pattern(directive: char) -> Option<String> {
    let pattern = match directive {
        'Y' => r"\d\d\d\d",
        'y' => r"\d\d",
        'C' => r"\d\d",
        'm' => r"1[0-2]|0[1-9]|[1-9]",
        'd' => r"3[01]|[12]\d|0[1-9]|[1-9]| [1-9]",
        'e' => r"3[01]|[12]\d|0[1-9]|[1-9]| [1-9]",
        'j' => r"36[0-6]|3[0-5]\d|[12]\d\d|0[1-9]\d|00[1-9]|[1-9]\d|0[1-9]|[1-9]",
        'H' => r"2[0-3]|[0-1]\d|\d",
        'I' => r"1[0-2]|0[1-9]|[1-9]",
        'M' => r"[0-5]\d|\d",
        'S' => r"6[0-1]|[0-5]\d|\d",
        'f' => r"[0-9]{1,6}",
        'p' => r"am|pm",
        'w' => r"[0-6]",
        'u' => r"[1-7]",
        'U' | 'W' => r"5[0-3]|[0-4]\d|\d",
        'V' => r"5[0-3]|0[1-9]|[1-4]\d|\d",
        'G' => r"\d\d\d\d",
        'z' => r"[+-]\d\d:?[0-5]\d(?::?[0-5]\d(?:\.\d{1,6})?)?|(?-i:Z)",
        'Z' => r"[a-z]{2,5}",
        'B' => MONTH_NAMES,
        'b' | 'h' => MONTH_ABBREVIATIONS,
        'A' => WEEKDAY_NAMES,
        'a' => WEEKDAY_ABBREVIATIONS,
        _ => return None,
    };
    Some(format!("(?:{})", pattern))
}

/// Translates a strftime format into a regular expression source string.
///
/// # Errors
/// Returns a `Configuration` error for unknown directives or a trailing `%`.
pub fn format_pattern(format: &str) -> Result<String> {
    let mut pattern = String::from("^");
    let mut chars = format.chars().peekable();
    let mut in_whitespace = false;

    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            if !in_whitespace {
                pattern.push_str(r"\s+");
                in_whitespace = true;
            }
            continue;
        }
        in_whitespace = false;

        if c != '%' {
            pattern.push_str(&regex::escape(&c.to_string()));
            continue;
        }

        let Some(directive) = chars.next() else {
            return Err(VeritasError::configuration(format!(
                "Format '{}' ends with a stray '%'",
                format
            )));
        };
        if directive == '%' {
            pattern.push('%');
            continue;
        }
        let fragment = directive_pattern(directive).ok_or_else(|| {
            VeritasError::configuration(format!(
                "Format '{}' uses unsupported directive '%{}'",
                format, directive
            ))
        })?;
        pattern.push_str(&fragment);
    }
    Ok(pattern)
}

/// Compiles a strftime format into a prefix-anchored, case-insensitive regex.
pub fn compile_format(format: &str) -> Result<Regex> {
    let pattern = format_pattern(format)?;
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| {
            VeritasError::configuration(format!("Format '{}' does not compile: {}", format, e))
        })
}
