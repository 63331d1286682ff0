//! Lexer and parser for the operator console.
//!
//! The lexer uses `regal` to produce a bounded token stream. The parser walks
//! those tokens by hand and decodes numeric and duration literals with `winnow`
//! combinators, so the whole pipeline stays `no_std` and allocation free.

use core::fmt;
use core::ops::Range;
use core::time::Duration;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
use winnow::ascii::{dec_uint, hex_uint};
use winnow::combinator::{alt, preceded};
use winnow::error::ModalResult;
use winnow::prelude::*;

/// Maximum number of tokens produced per console line.
pub const MAX_TOKENS: usize = 16;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;

/// Lexical token kinds recognized by the console grammar.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// Duration literal ending in `ms` or `s`.
    #[regex(r"[0-9]+(?:ms|s)", priority = 2)]
    Duration,
    /// Hexadecimal literal with a `0x` prefix.
    #[regex(r"0[xX][0-9A-Fa-f]+", priority = 3)]
    Hex,
    /// Unsuffixed decimal literal.
    #[regex(r"[0-9]+")]
    Integer,
    /// Identifier or keyword. Keywords match case-insensitively.
    #[regex(r"[A-Za-z][A-Za-z0-9_-]*")]
    Ident,
    #[token("=")]
    Equals,
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Anything the grammar does not know.
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Token with its byte span in the source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// Input produced more tokens than the static buffer allows.
    TooManyTokens { processed: usize },
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "token buffer exhausted after {processed} items")
            }
            LexError::Engine => f.write_str("lexer engine error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarErrorKind<'a> {
    UnexpectedToken {
        expected: &'static str,
        found: TokenKind,
        span: Range<usize>,
    },
    UnexpectedEnd {
        expected: &'static str,
    },
    UnknownCommand {
        lexeme: &'a str,
    },
    InvalidNumber {
        span: Range<usize>,
    },
    InvalidDuration {
        span: Range<usize>,
    },
    InvalidToken {
        span: Range<usize>,
        lexeme: &'a str,
    },
}

impl fmt::Display for GrammarErrorKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarErrorKind::UnexpectedToken {
                expected,
                found,
                span,
            } => write!(f, "expected {expected}, found {found:?} at {span:?}"),
            GrammarErrorKind::UnexpectedEnd { expected } => {
                write!(f, "unexpected end of input, expected {expected}")
            }
            GrammarErrorKind::UnknownCommand { lexeme } => write!(f, "unknown command `{lexeme}`"),
            GrammarErrorKind::InvalidNumber { span } => {
                write!(f, "invalid number literal at {span:?}")
            }
            GrammarErrorKind::InvalidDuration { span } => {
                write!(f, "invalid duration literal at {span:?}")
            }
            GrammarErrorKind::InvalidToken { span, lexeme } => {
                write!(f, "unsupported token `{lexeme}` at {span:?}")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrammarError<'a> {
    pub kind: GrammarErrorKind<'a>,
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl<'a> GrammarError<'a> {
    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        GrammarError {
            kind: match token {
                Some(tok) => GrammarErrorKind::UnexpectedToken {
                    expected,
                    found: tok.kind,
                    span: tok.span.clone(),
                },
                None => GrammarErrorKind::UnexpectedEnd { expected },
            },
        }
    }

    fn invalid_number(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidNumber {
                span: token.span.clone(),
            },
        }
    }

    fn invalid_duration(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidDuration {
                span: token.span.clone(),
            },
        }
    }
}

/// Combined lex/parse error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

/// Console commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    /// Print the integration status.
    Status,
    /// Apply the named configuration preset.
    Config(&'a str),
    Route(RouteCommand),
    Node(NodeCommand),
    /// Make the next init attempts fail.
    FailInit { count: Option<u8> },
    /// Deliver a frame of the given length on the receive path.
    Rx { len: u16 },
    /// Advance the simulated clock.
    Advance(Duration),
    Help(HelpCommand<'a>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteCommand {
    pub id: u16,
    pub active: bool,
}

/// Announces a node as available or gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeCommand {
    pub address: u16,
    pub available: bool,
    pub scripts: Option<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

type Input<'src, 'slice> = &'slice [Token<'src>];

/// Tokenize the provided line.
///
/// # Errors
///
/// Returns [`LexError`] when the line holds more than [`MAX_TOKENS`] tokens or
/// the lexer engine fails.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = TokenBuffer::new();

    for record in cache.tokens() {
        if record.skipped {
            continue;
        }
        let span = record.start..record.end;
        let lexeme = &line[span.clone()];
        push_token(&mut buffer, record.token, lexeme, span)?;
    }

    if let Some(partial) = partial.filter(|partial| !partial.fragment.is_empty()) {
        let start = partial.start;
        let span = start..start + partial.fragment.len();
        push_token(&mut buffer, TokenKind::Error, partial.fragment, span)?;
    }

    Ok(buffer)
}

fn push_token<'a>(
    buffer: &mut TokenBuffer<'a>,
    kind: TokenKind,
    lexeme: &'a str,
    span: Range<usize>,
) -> Result<(), LexError> {
    buffer
        .push(Token { kind, lexeme, span })
        .map_err(|_| LexError::TooManyTokens {
            processed: buffer.len() + 1,
        })
}

fn map_incremental_error(error: IncrementalError) -> LexError {
    match error {
        IncrementalError::TokenOverflow => LexError::TooManyTokens {
            processed: MAX_TOKENS,
        },
        _ => LexError::Engine,
    }
}

/// Parse a console command from the provided line.
///
/// # Errors
///
/// Returns [`ParseError`] for lexer failures, unknown commands and malformed
/// arguments.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    if let Some(token) = tokens.iter().find(|token| token.kind == TokenKind::Error) {
        return Err(ParseError::Grammar(GrammarError {
            kind: GrammarErrorKind::InvalidToken {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }));
    }

    let mut input: Input<'_, '_> = tokens.as_slice();
    let command = command(&mut input).map_err(ParseError::Grammar)?;
    finish(input).map_err(ParseError::Grammar)?;
    Ok(command)
}

fn command<'src>(input: &mut Input<'src, '_>) -> Result<Command<'src>, GrammarError<'src>> {
    let keyword = expect_kind(input, TokenKind::Ident, "command keyword")?;
    let name = keyword.lexeme;

    if name.eq_ignore_ascii_case("status") {
        Ok(Command::Status)
    } else if name.eq_ignore_ascii_case("config") {
        let preset = expect_kind(input, TokenKind::Ident, "configuration name")?;
        Ok(Command::Config(preset.lexeme))
    } else if name.eq_ignore_ascii_case("route") {
        let id = number(input, "route id")?;
        let active = switch(input, ("on", "off"))?;
        Ok(Command::Route(RouteCommand { id, active }))
    } else if name.eq_ignore_ascii_case("node") {
        let address = number(input, "node address")?;
        let available = switch(input, ("up", "down"))?;
        let scripts = assignment(input, "scripts")?;
        Ok(Command::Node(NodeCommand {
            address,
            available,
            scripts,
        }))
    } else if name.eq_ignore_ascii_case("fail") {
        let _ = keyword_of(input, &["init"])?;
        let count = assignment(input, "count")?;
        Ok(Command::FailInit { count })
    } else if name.eq_ignore_ascii_case("rx") {
        let len = number(input, "frame length")?;
        Ok(Command::Rx { len })
    } else if name.eq_ignore_ascii_case("advance") {
        let token = expect_kind(input, TokenKind::Duration, "duration")?;
        decode(&token, duration_literal)
            .map(Command::Advance)
            .map_err(|()| GrammarError::invalid_duration(&token))
    } else if name.eq_ignore_ascii_case("help") {
        let topic = match input.split_first() {
            Some((token, rest)) if token.kind == TokenKind::Ident => {
                *input = rest;
                Some(token.lexeme)
            }
            _ => None,
        };
        Ok(Command::Help(HelpCommand { topic }))
    } else {
        Err(GrammarError {
            kind: GrammarErrorKind::UnknownCommand { lexeme: name },
        })
    }
}

fn finish<'src>(mut rest: Input<'src, '_>) -> Result<(), GrammarError<'src>> {
    while let Some((token, remaining)) = rest.split_first() {
        if token.kind != TokenKind::Eol {
            return Err(GrammarError::unexpected("end of command", Some(token)));
        }
        rest = remaining;
    }
    Ok(())
}

fn expect_kind<'src>(
    input: &mut Input<'src, '_>,
    kind: TokenKind,
    label: &'static str,
) -> Result<Token<'src>, GrammarError<'src>> {
    match input.split_first() {
        Some((token, rest)) if token.kind == kind => {
            *input = rest;
            Ok(token.clone())
        }
        other => Err(GrammarError::unexpected(label, other.map(|(token, _)| token))),
    }
}

/// Consumes one of `keywords` and returns its index.
fn keyword_of<'src>(
    input: &mut Input<'src, '_>,
    keywords: &[&'static str],
) -> Result<usize, GrammarError<'src>> {
    let expected = keywords.first().copied().unwrap_or("keyword");
    let token = expect_kind(input, TokenKind::Ident, expected)?;
    keywords
        .iter()
        .position(|keyword| keyword.eq_ignore_ascii_case(token.lexeme))
        .ok_or_else(|| GrammarError::unexpected(expected, Some(&token)))
}

/// Parses an `on`/`off` style pair; the first keyword means `true`.
fn switch<'src>(
    input: &mut Input<'src, '_>,
    (yes, no): (&'static str, &'static str),
) -> Result<bool, GrammarError<'src>> {
    keyword_of(input, &[yes, no]).map(|index| index == 0)
}

fn number<'src>(
    input: &mut Input<'src, '_>,
    label: &'static str,
) -> Result<u16, GrammarError<'src>> {
    match input.split_first() {
        Some((token, rest)) if matches!(token.kind, TokenKind::Integer | TokenKind::Hex) => {
            *input = rest;
            decode(token, number_literal).map_err(|()| GrammarError::invalid_number(token))
        }
        other => Err(GrammarError::unexpected(label, other.map(|(token, _)| token))),
    }
}

/// Parses an optional trailing `key=<n>` assignment.
fn assignment<'src>(
    input: &mut Input<'src, '_>,
    key: &'static str,
) -> Result<Option<u8>, GrammarError<'src>> {
    match input.split_first() {
        Some((token, rest))
            if token.kind == TokenKind::Ident && token.lexeme.eq_ignore_ascii_case(key) =>
        {
            *input = rest;
        }
        _ => return Ok(None),
    }
    let _ = expect_kind(input, TokenKind::Equals, "=")?;
    let value = expect_kind(input, TokenKind::Integer, "integer")?;
    decode(&value, dec_uint::<_, u8, _>)
        .map(Some)
        .map_err(|()| GrammarError::invalid_number(&value))
}

/// Runs `parser` over the whole lexeme of `token`.
fn decode<'a, T>(
    token: &Token<'a>,
    mut parser: impl FnMut(&mut &'a str) -> ModalResult<T>,
) -> Result<T, ()> {
    let mut text = token.lexeme;
    match parser(&mut text) {
        Ok(value) if text.is_empty() => Ok(value),
        _ => Err(()),
    }
}

fn number_literal(input: &mut &str) -> ModalResult<u16> {
    alt((preceded(alt(("0x", "0X")), hex_uint), dec_uint)).parse_next(input)
}

fn duration_literal(input: &mut &str) -> ModalResult<Duration> {
    (dec_uint, alt(("ms", "s")))
        .map(|(value, unit): (u64, &str)| {
            if unit == "ms" {
                Duration::from_millis(value)
            } else {
                Duration::from_secs(value)
            }
        })
        .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Command<'_> {
        parse(input).expect("command should parse")
    }

    #[test]
    fn parses_status_and_config() {
        assert_eq!(parse_ok("status"), Command::Status);
        assert_eq!(parse_ok("config preset-b"), Command::Config("preset-b"));
    }

    #[test]
    fn parses_route_switches() {
        assert_eq!(
            parse_ok("route 0x10 on"),
            Command::Route(RouteCommand {
                id: 0x10,
                active: true,
            })
        );
        assert_eq!(
            parse_ok("route 7 OFF"),
            Command::Route(RouteCommand {
                id: 7,
                active: false,
            })
        );
    }

    #[test]
    fn parses_node_with_scripts() {
        match parse_ok("node 0x200 up scripts=2") {
            Command::Node(NodeCommand {
                address: 0x200,
                available: true,
                scripts: Some(2),
            }) => {}
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(
            parse_ok("node 0x201 down"),
            Command::Node(NodeCommand {
                address: 0x201,
                available: false,
                scripts: None,
            })
        );
    }

    #[test]
    fn parses_fail_init() {
        assert_eq!(parse_ok("fail init"), Command::FailInit { count: None });
        assert_eq!(
            parse_ok("fail init count=3"),
            Command::FailInit { count: Some(3) }
        );
    }

    #[test]
    fn parses_rx_and_advance() {
        assert_eq!(parse_ok("rx 24"), Command::Rx { len: 24 });
        assert_eq!(
            parse_ok("advance 150ms"),
            Command::Advance(Duration::from_millis(150))
        );
        assert_eq!(
            parse_ok("advance 2s\n"),
            Command::Advance(Duration::from_secs(2))
        );
    }

    #[test]
    fn parses_help_topic() {
        assert_eq!(
            parse_ok("help route"),
            Command::Help(HelpCommand {
                topic: Some("route"),
            })
        );
        assert_eq!(parse_ok("help"), Command::Help(HelpCommand { topic: None }));
    }

    #[test]
    fn rejects_unknown_command() {
        match parse("reboot now") {
            Err(ParseError::Grammar(err)) => assert_eq!(
                err.kind,
                GrammarErrorKind::UnknownCommand { lexeme: "reboot" }
            ),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_trailing_tokens() {
        match parse("status now") {
            Err(ParseError::Grammar(err)) => assert!(matches!(
                err.kind,
                GrammarErrorKind::UnexpectedToken {
                    expected: "end of command",
                    ..
                }
            )),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_range_numbers() {
        match parse("rx 70000") {
            Err(ParseError::Grammar(err)) => {
                assert!(matches!(err.kind, GrammarErrorKind::InvalidNumber { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_token() {
        match parse("route 1 on$") {
            Err(ParseError::Grammar(err)) => {
                assert!(matches!(err.kind, GrammarErrorKind::InvalidToken { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn lexer_emits_error_token_for_unknown_symbol() {
        let tokens = lex("status$").expect("lexing should succeed");
        let last = tokens.last().expect("expected at least one token");
        assert_eq!(last.kind, TokenKind::Error);
        assert_eq!(last.lexeme, "$");
    }
}
