//! Lexical building blocks of the component dialect.
//!
//! The grammar is scannerless: markup text is whitespace-sensitive and would
//! be mangled by a separate tokenizer, so every token parser here works on
//! characters directly and consumes the whitespace and comments that follow
//! it. Parsers that must not touch trailing whitespace (markup) use the raw
//! variants.

use super::{Extra, ParseError};
use chumsky::prelude::*;

/// Words that can never be used as binding names.
const RESERVED_WORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "export", "extends", "false", "finally", "for", "function", "if",
    "import", "in", "instanceof", "let", "new", "null", "return", "super", "switch", "this",
    "throw", "true", "try", "typeof", "undefined", "var", "void", "while", "with", "yield",
];

pub fn is_reserved(word: &str) -> bool {
    RESERVED_WORDS.contains(&word)
}

pub fn is_identifier_start(character: char) -> bool {
    character.is_ascii_alphabetic() || character == '_' || character == '$'
}

pub fn is_identifier_continue(character: char) -> bool {
    character.is_ascii_alphanumeric() || character == '_' || character == '$'
}

/// Whether `name` can be written as a bare identifier (binding or property key).
pub fn is_identifier_name(name: &str) -> bool {
    let mut characters = name.chars();
    characters.next().is_some_and(is_identifier_start) && characters.all(is_identifier_continue)
}

/// Whitespace, line comments and block comments, possibly empty.
pub fn whitespace<'src>() -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    let line_comment = just("//").then(none_of("\r\n").repeated()).ignored();

    let block_comment = just("/*")
        .then(any().and_is(just("*/").not()).repeated())
        .then(just("*/"))
        .ignored();

    choice((
        any().filter(|character: &char| character.is_whitespace()).ignored(),
        line_comment,
        block_comment,
    ))
    .repeated()
}

/// Punctuation that is never a prefix of a longer token.
pub fn symbol<'src>(symbol: &'static str) -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    just(symbol).ignored().then_ignore(whitespace())
}

/// Punctuation that must not be directly followed by any of `not_followed_by`
/// (`=` is not the start of `==` or `=>`, `<` is not the start of `<=`).
pub fn operator<'src>(
    operator: &'static str,
    not_followed_by: &'static str,
) -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    just(operator)
        .then_ignore(one_of(not_followed_by).not())
        .ignored()
        .then_ignore(whitespace())
}

/// Raw identifier-shaped word, reserved words included, no trailing whitespace.
pub fn identifier_name<'src>() -> impl Parser<'src, &'src str, &'src str, Extra<'src>> + Clone {
    any()
        .filter(|character: &char| is_identifier_start(*character))
        .then(
            any()
                .filter(|character: &char| is_identifier_continue(*character))
                .repeated(),
        )
        .to_slice()
}

/// Binding name: an identifier that is not a reserved word.
pub fn identifier<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    identifier_name()
        .try_map(|name: &str, span| {
            if is_reserved(name) {
                Err(ParseError::custom(
                    span,
                    format!("Unexpected keyword '{name}'"),
                ))
            } else {
                Ok(name.to_string())
            }
        })
        .then_ignore(whitespace())
}

/// Property name after `.` or as an object key; reserved words are allowed.
pub fn property_name<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    identifier_name()
        .map(ToString::to_string)
        .then_ignore(whitespace())
}

pub fn keyword<'src>(word: &'static str) -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    identifier_name()
        .filter(move |name: &&str| *name == word)
        .ignored()
        .then_ignore(whitespace())
}

/// Decimal (`42`, `3.25`, `.5`, `1e3`, `2.5E-4`) or hex (`0xff`) number.
pub fn number<'src>() -> impl Parser<'src, &'src str, f64, Extra<'src>> + Clone {
    let hex = choice((just("0x"), just("0X")))
        .ignore_then(
            any()
                .filter(char::is_ascii_hexdigit)
                .repeated()
                .at_least(1)
                .to_slice(),
        )
        .map(|digits: &str| {
            digits.chars().fold(0.0, |value, digit| {
                value * 16.0 + f64::from(digit.to_digit(16).unwrap_or(0))
            })
        });

    let exponent = one_of("eE")
        .then(one_of("+-").or_not())
        .then(text::digits(10));

    let decimal = choice((
        text::int(10)
            .then(just('.').then(text::digits(10)).or_not())
            .ignored(),
        just('.').then(text::digits(10)).ignored(),
    ))
    .then(exponent.or_not())
    .to_slice()
    .try_map(|digits: &str, span| {
        digits
            .parse::<f64>()
            .map_err(|_| ParseError::custom(span, format!("Invalid number '{digits}'")))
    });

    choice((hex, decimal)).then_ignore(whitespace())
}

/// Backslash escape inside string and template literals.
pub fn escape<'src>() -> impl Parser<'src, &'src str, char, Extra<'src>> + Clone {
    let unicode = just('u').ignore_then(
        any()
            .filter(char::is_ascii_hexdigit)
            .repeated()
            .exactly(4)
            .to_slice()
            .try_map(|digits: &str, span| {
                u32::from_str_radix(digits, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| ParseError::custom(span, "Invalid unicode escape"))
            }),
    );

    just('\\').ignore_then(choice((
        just('n').to('\n'),
        just('t').to('\t'),
        just('r').to('\r'),
        just('0').to('\0'),
        just('b').to('\u{8}'),
        just('f').to('\u{c}'),
        just('v').to('\u{b}'),
        unicode,
        // \\ \' \" \` \$ and every other character stand for themselves
        none_of("\r\n"),
    )))
}

pub fn string_literal<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    let double_quoted = just('"')
        .ignore_then(
            choice((escape(), none_of("\"\\\r\n")))
                .repeated()
                .collect::<String>(),
        )
        .then_ignore(just('"'));

    let single_quoted = just('\'')
        .ignore_then(
            choice((escape(), none_of("'\\\r\n")))
                .repeated()
                .collect::<String>(),
        )
        .then_ignore(just('\''));

    choice((double_quoted, single_quoted)).then_ignore(whitespace())
}

/// A run of literal characters inside a template literal.
pub fn template_text<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    choice((
        escape(),
        none_of("`\\$"),
        just('$').then_ignore(just('{').not()),
    ))
    .repeated()
    .at_least(1)
    .collect::<String>()
}
