//! Typed command-line flags.
//!
//! A flag is looked up by scanning the raw argument vector for any of its
//! aliases and handing the token that follows to the flag's value parser.
//! Parsers are plain functions picked when the flag is defined, so a flag's
//! value type and its parsing rules never drift apart.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Result of running a value parser over one raw token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<T> {
    Value(T),
    /// Nothing usable in the token; the occurrence is ignored.
    Absent,
    /// The token was rejected; the occurrence resolves to the flag's default.
    Default,
}

pub type ValueParser<T> = fn(&str) -> Parsed<T>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("argument '{name}' was not given")]
    Missing { name: &'static str },
}

/// Object-safe view of a flag, used for help output and presence checks.
pub trait Flag {
    fn names(&self) -> &[&'static str];
    fn description(&self) -> &str;
    fn is_required(&self) -> bool;
    fn default_as_string(&self) -> Option<String>;

    fn primary_name(&self) -> &'static str {
        self.names().first().copied().unwrap_or_default()
    }
}

/// Reports whether any alias of `flag` appears in `args`, regardless of the
/// value that follows it.
pub fn exists(flag: &dyn Flag, args: &[String]) -> bool {
    args.iter().any(|a| flag.names().contains(&a.trim()))
}

#[derive(Debug, Clone)]
pub struct Argument<T> {
    names: Vec<&'static str>,
    description: &'static str,
    required: bool,
    default: Option<T>,
    parser: ValueParser<T>,
}

impl<T: Clone> Argument<T> {
    /// `name` is the canonical name used in messages; `aliases` follow it.
    pub fn new(parser: ValueParser<T>, name: &'static str, aliases: &[&'static str]) -> Self {
        let mut names = Vec::with_capacity(1 + aliases.len());
        names.push(name);
        names.extend_from_slice(aliases);
        Self {
            names,
            description: "",
            required: false,
            default: None,
            parser,
        }
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn default_value(mut self, value: T) -> Self {
        self.default = Some(value);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default(&self) -> Option<&T> {
        self.default.as_ref()
    }

    pub fn parse(&self, raw: &str) -> Option<T> {
        match (self.parser)(raw) {
            Parsed::Value(v) => Some(v),
            Parsed::Absent => None,
            Parsed::Default => self.default.clone(),
        }
    }

    fn matches(&self, token: &str) -> bool {
        self.names.contains(&token.trim())
    }

    /// Every successfully parsed occurrence, in the order they appear.
    pub fn get_array(&self, args: &[String]) -> Vec<T> {
        let mut values = Vec::new();
        for (i, token) in args.iter().enumerate() {
            if !self.matches(token) {
                continue;
            }
            let next = args.get(i + 1).map(String::as_str).unwrap_or("");
            if let Some(v) = self.parse(next) {
                values.push(v);
            }
        }
        values
    }

    pub fn get_or_default(&self, args: &[String]) -> Option<T> {
        self.get_array(args)
            .into_iter()
            .next()
            .or_else(|| self.default.clone())
    }

    /// Resolves a required flag, failing when its name never appears or no
    /// occurrence yields a value.
    pub fn require(&self, args: &[String]) -> Result<T, ArgumentError> {
        let missing = ArgumentError::Missing {
            name: self.names[0],
        };
        if !args.iter().any(|a| self.matches(a)) {
            return Err(missing);
        }
        self.get_array(args).into_iter().next().ok_or(missing)
    }

    pub fn try_get(&self, args: &[String]) -> Result<Option<T>, ArgumentError> {
        if !self.required {
            return Ok(self.get_or_default(args));
        }
        self.require(args).map(Some)
    }
}

impl<T: Clone + fmt::Display> Flag for Argument<T> {
    fn names(&self) -> &[&'static str] {
        &self.names
    }

    fn description(&self) -> &str {
        self.description
    }

    fn is_required(&self) -> bool {
        self.required
    }

    fn default_as_string(&self) -> Option<String> {
        self.default.as_ref().map(|d| d.to_string())
    }
}

impl Argument<String> {
    pub fn string(name: &'static str, aliases: &[&'static str]) -> Self {
        Self::new(parse_string, name, aliases)
    }
}

impl Argument<bool> {
    /// A switch is true when present, even without a value.
    pub fn switch(name: &'static str, aliases: &[&'static str]) -> Self {
        Self::new(parse_bool, name, aliases).default_value(false)
    }
}

impl<T: Clone + FromStr> Argument<T> {
    pub fn integer(name: &'static str, aliases: &[&'static str]) -> Self {
        Self::new(parse_integer::<T>, name, aliases)
    }
}

impl Argument<Bytes> {
    pub fn bytes(name: &'static str, aliases: &[&'static str]) -> Self {
        Self::new(parse_bytes, name, aliases)
    }
}

fn looks_like_flag(raw: &str) -> bool {
    raw.starts_with('-')
}

pub fn parse_string(raw: &str) -> Parsed<String> {
    if raw.is_empty() || looks_like_flag(raw) {
        return Parsed::Absent;
    }
    Parsed::Value(raw.to_string())
}

pub fn parse_bool(raw: &str) -> Parsed<bool> {
    if raw.is_empty() || looks_like_flag(raw) {
        return Parsed::Value(true);
    }
    let v = raw.trim();
    if v.eq_ignore_ascii_case("true") {
        Parsed::Value(true)
    } else if v.eq_ignore_ascii_case("false") {
        Parsed::Value(false)
    } else {
        Parsed::Default
    }
}

pub fn parse_integer<T: FromStr>(raw: &str) -> Parsed<T> {
    if looks_like_flag(raw) {
        return Parsed::Absent;
    }
    match raw.trim().parse() {
        Ok(v) => Parsed::Value(v),
        Err(_) => Parsed::Absent,
    }
}

pub fn parse_bytes(raw: &str) -> Parsed<Bytes> {
    match raw.parse() {
        Ok(v) => Parsed::Value(v),
        Err(_) => Parsed::Absent,
    }
}

/// A byte count written the way people type it: `512`, `64k`, `1M`, `2g`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bytes {
    literal: String,
    value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseBytesError {
    #[error("no digits in byte size {0:?}")]
    NoDigits(String),
    #[error("unknown unit in byte size {0:?} (expected b, k, m or g)")]
    BadUnit(String),
    #[error("byte size {0:?} is too large")]
    Overflow(String),
}

impl Bytes {
    pub fn new(literal: impl Into<String>, value: u64) -> Self {
        Self {
            literal: literal.into(),
            value,
        }
    }

    pub fn literal(&self) -> &str {
        &self.literal
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal)
    }
}

impl FromStr for Bytes {
    type Err = ParseBytesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(split);
        if digits.is_empty() {
            return Err(ParseBytesError::NoDigits(s.to_string()));
        }
        let multiplier: u64 = match unit.to_ascii_lowercase().as_str() {
            "" | "b" => 1,
            "k" => 1_000,
            "m" => 1_000_000,
            "g" => 1_000_000_000,
            _ => return Err(ParseBytesError::BadUnit(s.to_string())),
        };
        let value = digits
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(multiplier))
            .ok_or_else(|| ParseBytesError::Overflow(s.to_string()))?;
        Ok(Self::new(trimmed, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn string_values_reject_empty_and_flag_like_tokens() {
        let arg = Argument::string("unnamed", &[]);
        assert_eq!(arg.parse("--cowabunga"), None);
        assert_eq!(arg.parse(""), None);
        assert_eq!(arg.parse("bunga"), Some("bunga".to_string()));
    }

    #[test]
    fn switches_are_true_when_bare() {
        let arg = Argument::switch("unnamed", &[]);
        assert_eq!(arg.parse("--cowabunga"), Some(true));
        assert_eq!(arg.parse(""), Some(true));
        assert_eq!(arg.parse("true"), Some(true));
        assert_eq!(arg.parse("False"), Some(false));
        // unparseable falls back to the default
        assert_eq!(arg.parse("maybe"), Some(false));
    }

    #[test]
    fn integers_reject_flag_like_and_garbage() {
        let arg: Argument<i32> = Argument::integer("unnamed", &[]);
        assert_eq!(arg.parse("-5"), None);
        assert_eq!(arg.parse(""), None);
        assert_eq!(arg.parse("abc"), None);
        assert_eq!(arg.parse("42"), Some(42));
    }

    #[test]
    fn resolves_values_from_args() {
        let args = argv(&["--yee", "--boi", "--cowabunga", "420"]);
        let x = Argument::switch("--yee", &[]);
        let y: Argument<i32> = Argument::integer("--cowabunga", &[]);
        let z = Argument::switch("--hello", &[]);

        assert_eq!(x.get_or_default(&args), Some(true));
        assert_eq!(y.get_or_default(&args), Some(420));
        assert_eq!(z.get_or_default(&args), Some(false));
    }

    #[test]
    fn flag_followed_by_flag_does_not_consume_it() {
        let args = argv(&["-o", "--schema-only"]);
        let out = Argument::string("-o", &["--output-file"]).default_value("dump.sql".into());
        let schema_only = Argument::switch("--schema-only", &[]);

        assert_eq!(out.get_or_default(&args), Some("dump.sql".to_string()));
        assert_eq!(schema_only.get_or_default(&args), Some(true));
    }

    #[test]
    fn get_array_preserves_order_and_aliases() {
        let args = argv(&["--x", "1", "-y", "3", " --x ", "2"]);
        let arg: Argument<i32> = Argument::integer("--x", &["-y"]);
        assert_eq!(arg.get_array(&args), vec![1, 3, 2]);
    }

    #[test]
    fn trailing_flag_parses_empty_value() {
        let args = argv(&["--exclude-table"]);
        let arg = Argument::string("--exclude-table", &[]);
        assert!(arg.get_array(&args).is_empty());
        assert!(exists(&arg, &args));
    }

    #[test]
    fn parses_byte_sizes() {
        let arg = Argument::bytes("--bytes", &[]);
        for (raw, want) in [
            ("1", 1),
            ("1b", 1),
            ("1B", 1),
            ("1K", 1_000),
            ("1M", 1_000_000),
            ("1G", 1_000_000_000),
            ("64k", 64_000),
        ] {
            let parsed = arg.parse(raw).unwrap_or_else(|| panic!("{raw} should parse"));
            assert_eq!(parsed.value(), want, "{raw}");
            assert_eq!(parsed.to_string(), raw);
        }
        assert_eq!(arg.parse("M"), None);
        assert_eq!(arg.parse(""), None);
        assert_eq!(arg.parse("12x"), None);
    }

    #[test]
    fn byte_size_errors_name_the_problem() {
        assert_eq!(
            "k".parse::<Bytes>(),
            Err(ParseBytesError::NoDigits("k".into()))
        );
        assert_eq!(
            "99999999999999999999g".parse::<Bytes>(),
            Err(ParseBytesError::Overflow("99999999999999999999g".into()))
        );
    }

    #[test]
    fn try_get_requires_presence() {
        let arg = Argument::string("-i", &["--input-file"]).required();
        assert_eq!(
            arg.try_get(&argv(&["-d", "db"])),
            Err(ArgumentError::Missing { name: "-i" })
        );
        assert_eq!(
            arg.try_get(&argv(&["--input-file", "-d"])),
            Err(ArgumentError::Missing { name: "-i" })
        );
        assert_eq!(
            arg.try_get(&argv(&["--input-file", "x.sql"])),
            Ok(Some("x.sql".to_string()))
        );
    }

    #[test]
    fn explicit_value_equal_to_default_is_accepted() {
        let arg = Argument::string("-U", &["--user-name"])
            .default_value("sa".into())
            .required();
        assert_eq!(arg.try_get(&argv(&["-U", "sa"])), Ok(Some("sa".into())));
    }

    #[test]
    fn optional_flags_resolve_to_default() {
        let arg = Argument::string("-S", &[]).default_value("localhost".into());
        assert_eq!(arg.try_get(&[]), Ok(Some("localhost".into())));
        assert_eq!(arg.default_as_string().as_deref(), Some("localhost"));
        assert_eq!(Argument::string("-o", &[]).default_as_string(), None);
    }
}
