//! Bound on how deeply component source may nest.
//!
//! Every recursive grammar rule enters through [`nested`] and every operator
//! that extends a chain (`a.b.c`, `a + b + c`, `!!a`) goes through [`counted`],
//! so the syntax tree handed to later passes is never deeper than the limit.
//! The depth lives in the parser state and is rewound on backtracking.

use super::{Extra, ParseError};
use chumsky::input::{Checkpoint, Cursor, Input, InputRef};
use chumsky::inspector::Inspector;
use chumsky::prelude::*;

pub const DEFAULT_MAX_NESTING: usize = 64;

/// Parser state: current depth and the configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nesting {
    depth: usize,
    limit: usize,
}

impl Nesting {
    pub fn new(limit: usize) -> Self {
        Self { depth: 0, limit }
    }
}

impl Default for Nesting {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NESTING)
    }
}

// Backtracking restores the depth that was current at the checkpoint.
impl<'src, I: Input<'src>> Inspector<'src, I> for Nesting {
    type Checkpoint = usize;

    fn on_token(&mut self, _: &I::Token) {}

    fn on_save<'parse>(&self, _: &Cursor<'src, 'parse, I>) -> usize {
        self.depth
    }

    fn on_rewind<'parse>(&mut self, marker: &Checkpoint<'src, 'parse, I, usize>) {
        self.depth = *marker.inspector();
    }
}

fn too_deep<'src>(span: SimpleSpan, limit: usize) -> ParseError<'src> {
    ParseError::custom(span, format!("Source nesting exceeds the limit of {limit} levels"))
}

/// Run `parser` one level deeper.
///
/// Success restores the depth from before the level, releasing the links
/// [`counted`] inside it. On failure the alternative that backtracks rewinds
/// the depth along with the input.
pub(super) fn nested<'src, O, P>(parser: P) -> impl Parser<'src, &'src str, O, Extra<'src>> + Clone
where
    P: Parser<'src, &'src str, O, Extra<'src>> + Clone,
{
    let enter = custom(|input: &mut InputRef<'src, '_, &'src str, Extra<'src>>| {
        let before = input.cursor();
        let Nesting { depth, limit } = *input.state();
        if depth >= limit {
            return Err(too_deep(input.span_since(&before), limit));
        }
        input.state().depth = depth + 1;
        Ok(depth)
    });
    enter.then(parser).map_with(|(depth, output), extra| {
        let state: &mut Nesting = extra.state();
        state.depth = depth;
        output
    })
}

/// Count one more link of an operator chain after `parser` succeeds.
pub(super) fn counted<'src, O, P>(parser: P) -> impl Parser<'src, &'src str, O, Extra<'src>> + Clone
where
    P: Parser<'src, &'src str, O, Extra<'src>> + Clone,
{
    let tick = custom(|input: &mut InputRef<'src, '_, &'src str, Extra<'src>>| {
        let before = input.cursor();
        let Nesting { depth, limit } = *input.state();
        if depth >= limit {
            return Err(too_deep(input.span_since(&before), limit));
        }
        input.state().depth = depth + 1;
        Ok(())
    });
    parser.then_ignore(tick)
}
