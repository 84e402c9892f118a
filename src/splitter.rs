//! Splits a script into batches on sqlcmd-style `GO` lines.
//!
//! A separator is a line holding only `GO`, optionally followed by a repeat
//! count and a `--` comment. Lines inside quoted literals, bracketed
//! identifiers and block comments are never separators.

use std::iter::Enumerate;
use std::str::SplitInclusive;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub text: String,
    /// How many times the batch should run (`GO 3`).
    pub repeat_count: u32,
    /// 1-based line the batch starts on.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("line {line}: invalid batch separator {text:?}, batch skipped")]
    BadSeparator { line: usize, text: String },
    #[error("line {line}: unterminated {what} at end of script, batch skipped")]
    Unterminated { line: usize, what: &'static str },
}

pub fn split(text: &str) -> Splitter<'_> {
    Splitter {
        lines: text.split_inclusive('\n').enumerate(),
        buf: String::new(),
        start_line: 0,
        state: Lex::Code,
        done: false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    Code,
    Quoted(char),
    Comment(u32),
}

#[derive(Debug)]
pub struct Splitter<'a> {
    lines: Enumerate<SplitInclusive<'a, char>>,
    buf: String,
    start_line: usize,
    state: Lex,
    done: bool,
}

enum Separator {
    Go(u32),
    Invalid,
}

impl Splitter<'_> {
    fn take_batch(&mut self, repeat_count: u32) -> Option<Statement> {
        let mut text = std::mem::take(&mut self.buf);
        // The break before the separator belongs to the separator.
        let body = strip_line_ending(&text).len();
        text.truncate(body);
        if text.trim().is_empty() {
            return None;
        }
        Some(Statement {
            text,
            repeat_count,
            line: self.start_line,
        })
    }

    /// Appends `line` with its original line ending.
    fn push_line(&mut self, idx: usize, line: &str) {
        if self.buf.is_empty() {
            if line.trim().is_empty() {
                return;
            }
            self.start_line = idx + 1;
        }
        self.buf.push_str(line);
        self.state = scan(self.state, line);
    }
}

impl Iterator for Splitter<'_> {
    type Item = Result<Statement, SplitError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        while let Some((idx, line)) = self.lines.next() {
            let separator = if self.state == Lex::Code {
                separator(strip_line_ending(line))
            } else {
                None
            };
            match separator {
                None => self.push_line(idx, line),
                Some(Separator::Go(count)) => {
                    if let Some(stmt) = self.take_batch(count) {
                        return Some(Ok(stmt));
                    }
                }
                Some(Separator::Invalid) => {
                    self.buf.clear();
                    return Some(Err(SplitError::BadSeparator {
                        line: idx + 1,
                        text: line.trim().to_string(),
                    }));
                }
            }
        }

        self.done = true;
        let state = self.state;
        let stmt = self.take_batch(1)?;
        match state {
            Lex::Code => Some(Ok(stmt)),
            Lex::Quoted(_) => Some(Err(SplitError::Unterminated {
                line: stmt.line,
                what: "quoted literal",
            })),
            Lex::Comment(_) => Some(Err(SplitError::Unterminated {
                line: stmt.line,
                what: "block comment",
            })),
        }
    }
}

fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn separator(line: &str) -> Option<Separator> {
    let code = line.split("--").next().unwrap_or_default();
    let mut tokens = code.split_whitespace();
    let first = tokens.next()?;
    if !first.eq_ignore_ascii_case("go") {
        return None;
    }
    let count = match tokens.next() {
        None => 1,
        Some(tok) => match tok.parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => return Some(Separator::Invalid),
        },
    };
    if tokens.next().is_some() {
        return Some(Separator::Invalid);
    }
    Some(Separator::Go(count))
}

/// Carries the lexer state across one line.
fn scan(mut state: Lex, line: &str) -> Lex {
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        state = match state {
            Lex::Code => match c {
                '-' if chars.peek() == Some(&'-') => return Lex::Code,
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    Lex::Comment(1)
                }
                '\'' => Lex::Quoted('\''),
                '"' => Lex::Quoted('"'),
                '[' => Lex::Quoted(']'),
                _ => Lex::Code,
            },
            Lex::Quoted(close) if c == close => {
                if chars.peek() == Some(&close) {
                    chars.next();
                    Lex::Quoted(close)
                } else {
                    Lex::Code
                }
            }
            Lex::Quoted(close) => Lex::Quoted(close),
            Lex::Comment(depth) => match c {
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    Lex::Comment(depth + 1)
                }
                '*' if chars.peek() == Some(&'/') => {
                    chars.next();
                    if depth == 1 {
                        Lex::Code
                    } else {
                        Lex::Comment(depth - 1)
                    }
                }
                _ => Lex::Comment(depth),
            },
        };
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(script: &str) -> Vec<String> {
        split(script)
            .map(|r| r.expect("no split errors").text)
            .collect()
    }

    #[test]
    fn splits_on_go_lines() {
        let script = "CREATE TABLE [Boat] (\n  [Name] NVARCHAR(MAX)\n)\nGO\nINSERT INTO [Boat] VALUES ('x')\ngo\n";
        let stmts: Vec<Statement> = split(script).map(Result::unwrap).collect();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].text, "CREATE TABLE [Boat] (\n  [Name] NVARCHAR(MAX)\n)");
        assert_eq!(stmts[0].line, 1);
        assert_eq!(stmts[1].text, "INSERT INTO [Boat] VALUES ('x')");
        assert_eq!(stmts[1].line, 5);
        assert_eq!(stmts[1].repeat_count, 1);
    }

    #[test]
    fn handles_crlf_and_trailing_batch() {
        assert_eq!(
            texts("SELECT 1\r\nGO\r\n\r\nSELECT 2\r\n"),
            vec!["SELECT 1".to_string(), "SELECT 2".to_string()]
        );
    }

    #[test]
    fn keeps_line_endings_inside_batches() {
        let script = "INSERT INTO t VALUES ('a\r\nb')\r\nGO\r\nSELECT 1\r\nFROM t\nGO";
        assert_eq!(
            texts(script),
            vec![
                "INSERT INTO t VALUES ('a\r\nb')".to_string(),
                "SELECT 1\r\nFROM t".to_string(),
            ]
        );
    }

    #[test]
    fn skips_empty_batches() {
        assert_eq!(texts("GO\nGO\n  \nGO\nSELECT 1\nGO\nGO"), vec!["SELECT 1"]);
        assert!(texts("").is_empty());
    }

    #[test]
    fn reads_repeat_count_and_comments() {
        let stmts: Vec<Statement> = split("INSERT INTO t DEFAULT VALUES\nGO 3 -- thrice\nSELECT 1\n  GO   -- done")
            .map(Result::unwrap)
            .collect();
        assert_eq!(stmts[0].repeat_count, 3);
        assert_eq!(stmts[1].repeat_count, 1);
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn ignores_go_inside_literals_and_comments() {
        let script = "INSERT INTO t VALUES ('a\nGO\nb')\nGO\n/* note\nGO\n*/ SELECT 1\nGO\nSELECT [odd\nGO\nname] FROM t";
        let got = texts(script);
        assert_eq!(got.len(), 3);
        assert_eq!(got[0], "INSERT INTO t VALUES ('a\nGO\nb')");
        assert_eq!(got[1], "/* note\nGO\n*/ SELECT 1");
        assert_eq!(got[2], "SELECT [odd\nGO\nname] FROM t");
    }

    #[test]
    fn escaped_quotes_stay_inside_literal() {
        assert_eq!(
            texts("SELECT 'it''s'\nGO\nSELECT 2"),
            vec!["SELECT 'it''s'".to_string(), "SELECT 2".to_string()]
        );
    }

    #[test]
    fn bad_separator_is_reported_and_splitting_continues() {
        let results: Vec<_> = split("SELECT 1\nGO twice\nSELECT 2\nGO").collect();
        assert_eq!(
            results[0],
            Err(SplitError::BadSeparator {
                line: 2,
                text: "GO twice".into()
            })
        );
        assert_eq!(results[1].as_ref().unwrap().text, "SELECT 2");
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn words_starting_with_go_are_not_separators() {
        assert_eq!(texts("SELECT 1\ngoto\nGO"), vec!["SELECT 1\ngoto"]);
    }

    #[test]
    fn unterminated_literal_is_an_error() {
        let results: Vec<_> = split("SELECT 1\nGO\nSELECT 'oops\nGO").collect();
        assert!(results[0].is_ok());
        assert_eq!(
            results[1],
            Err(SplitError::Unterminated {
                line: 3,
                what: "quoted literal"
            })
        );
    }
}
