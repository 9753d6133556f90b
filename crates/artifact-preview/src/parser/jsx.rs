//! Markup grammar: elements, fragments, attributes and text children.

use super::lexer::{is_identifier_continue, is_identifier_start, symbol, whitespace};
use super::nesting::nested;
use super::{Expression, ExpressionParser, Extra, Markup, MarkupAttribute, MarkupChild, MarkupName, ParseError};
use chumsky::prelude::*;

/// Element or fragment, without trailing whitespace.
pub(super) fn markup<'src>(
    expression: ExpressionParser<'src>,
) -> impl Parser<'src, &'src str, Markup, Extra<'src>> + Clone {
    recursive(|markup| {
        let tag_name = any()
            .filter(|character: &char| is_identifier_start(*character))
            .then(
                any()
                    .filter(|character: &char| {
                        is_identifier_continue(*character) || matches!(character, '-' | '.')
                    })
                    .repeated(),
            )
            .to_slice();

        let attribute_name = any()
            .filter(|character: &char| is_identifier_start(*character))
            .then(
                any()
                    .filter(|character: &char| {
                        is_identifier_continue(*character) || matches!(character, '-' | ':')
                    })
                    .repeated(),
            )
            .to_slice()
            .map(ToString::to_string)
            .then_ignore(whitespace());

        let quoted = choice((
            just('"')
                .ignore_then(none_of('"').repeated().to_slice())
                .then_ignore(just('"')),
            just('\'')
                .ignore_then(none_of('\'').repeated().to_slice())
                .then_ignore(just('\'')),
        ))
        .map(|raw: &str| Expression::string(decode_entities(raw)));

        let attribute_value = choice((
            quoted,
            expression
                .clone()
                .delimited_by(just('{').then(whitespace()), just('}')),
            markup
                .clone()
                .map(|markup| Expression::Markup(Box::new(markup))),
        ))
        .then_ignore(whitespace());

        let attribute = choice((
            symbol("{")
                .ignore_then(symbol("..."))
                .ignore_then(expression.clone())
                .then_ignore(symbol("}"))
                .map(MarkupAttribute::Spread),
            attribute_name
                .then(symbol("=").ignore_then(attribute_value).or_not())
                .map(|(name, value)| MarkupAttribute::Named { name, value }),
        ));

        let text = none_of("{<}")
            .repeated()
            .at_least(1)
            .to_slice()
            .map(|raw: &str| clean_text(raw).map(MarkupChild::Text));

        let container = just('{')
            .ignore_then(whitespace())
            .ignore_then(expression.clone().or_not())
            .then_ignore(just('}'))
            .map(|expression| expression.map(MarkupChild::Expression));

        let children = choice((
            markup.clone().map(|markup| Some(MarkupChild::Markup(markup))),
            container,
            text,
        ))
        .repeated()
        .collect::<Vec<_>>()
        .map(|children| children.into_iter().flatten().collect::<Vec<_>>());

        let fragment = just('<')
            .then(whitespace())
            .then(just('>'))
            .ignore_then(children.clone())
            .then_ignore(just("</").then(whitespace()).then(just('>')))
            .map(|children| Markup {
                name: MarkupName::Fragment,
                attributes: Vec::new(),
                children,
            });

        let closing_tag = just("</")
            .ignore_then(whitespace())
            .ignore_then(tag_name)
            .then_ignore(whitespace())
            .then_ignore(just('>'));

        let element = just('<')
            .ignore_then(whitespace())
            .ignore_then(tag_name)
            .then_ignore(whitespace())
            .then(attribute.repeated().collect::<Vec<_>>())
            .then(choice((
                just("/>").to(None),
                just('>')
                    .ignore_then(children)
                    .then(closing_tag)
                    .map(Some),
            )))
            .try_map(|((name, attributes), body), span| {
                let children = match body {
                    None => Vec::new(),
                    Some((_, closing)) if closing != name => {
                        return Err(ParseError::custom(
                            span,
                            format!("Expected corresponding closing tag for <{name}>, found </{closing}>"),
                        ));
                    }
                    Some((children, _)) => children,
                };
                Ok(Markup {
                    name: markup_name(name),
                    attributes,
                    children,
                })
            });

        nested(choice((fragment, element)))
    })
}

fn markup_name(raw: &str) -> MarkupName {
    if raw.contains('.') {
        MarkupName::Component(raw.split('.').map(ToString::to_string).collect())
    } else if raw.starts_with(|character: char| character.is_ascii_lowercase())
        || raw.contains('-')
    {
        MarkupName::Intrinsic(raw.to_string())
    } else {
        MarkupName::Component(vec![raw.to_string()])
    }
}

/// Collapse whitespace in a text child the way markup compilers do.
///
/// Each line is trimmed where it meets a line break, lines that are only
/// whitespace are dropped and the remaining lines are joined by one space.
/// Whitespace within a single line is kept. Returns `None` when nothing is left.
pub fn clean_text(raw: &str) -> Option<String> {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();
    let last_non_empty = lines
        .iter()
        .rposition(|line| line.chars().any(|character| character != ' ' && character != '\t'));

    let mut text = String::new();
    for (index, line) in lines.iter().enumerate() {
        let mut trimmed = line.replace('\t', " ");
        if index != 0 {
            trimmed = trimmed.trim_start_matches(' ').to_string();
        }
        if index != lines.len() - 1 {
            trimmed = trimmed.trim_end_matches(' ').to_string();
        }
        if trimmed.is_empty() {
            continue;
        }
        text.push_str(&trimmed);
        if Some(index) != last_non_empty {
            text.push(' ');
        }
    }

    if text.is_empty() {
        None
    } else {
        Some(decode_entities(&text))
    }
}

/// Replace HTML character references (`&amp;`, `&#169;`, `&#x1F600;`).
/// Unknown references are left as written.
pub fn decode_entities(raw: &str) -> String {
    let mut decoded = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        decoded.push_str(&rest[..start]);
        rest = &rest[start..];
        let replacement = rest[1..]
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| entity(&rest[1..=end]).map(|character| (character, end + 2)));
        match replacement {
            Some((character, consumed)) => {
                decoded.push(character);
                rest = &rest[consumed..];
            }
            None => {
                decoded.push('&');
                rest = &rest[1..];
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

fn entity(name: &str) -> Option<char> {
    if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    if let Some(decimal) = name.strip_prefix('#') {
        return decimal.parse::<u32>().ok().and_then(char::from_u32);
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        "copy" => Some('©'),
        "hellip" => Some('…'),
        "mdash" => Some('—'),
        "ndash" => Some('–'),
        "times" => Some('×'),
        "middot" => Some('·'),
        "bull" => Some('•'),
        "rarr" => Some('→'),
        "larr" => Some('←'),
        _ => None,
    }
}
