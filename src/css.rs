//! CSS syntax on top of `cssparser`: stylesheets split into rules, rule
//! blocks and declaration lists.

use crate::host::{CssRule, CssRuleKind};
use crate::style::Declaration;
use cssparser::{
    AtRuleParser, BasicParseError, CowRcStr, DeclarationParser, ParseError, Parser, ParserInput, ParserState,
    QualifiedRuleParser, RuleBodyItemParser, RuleBodyParser, SourcePosition, StyleSheetParser, Token,
};
use log::debug;

/// Parsed contents of a single rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleBlock {
    pub kind: CssRuleKind,
    /// Selector list of a style rule, one raw entry per comma-separated selector
    pub selectors: Vec<String>,
    pub declarations: Vec<Declaration>,
}

struct ParsedRule {
    block: RuleBlock,
    start: SourcePosition,
}

impl ParsedRule {
    fn new(kind: CssRuleKind, selectors: Vec<String>, declarations: Vec<Declaration>, start: &ParserState) -> Self {
        Self {
            block: RuleBlock {
                kind,
                selectors,
                declarations,
            },
            start: start.position(),
        }
    }
}

/// Split a stylesheet into top-level rules. `@font-face` rules become
/// `FontFace`, qualified rules `Style`, every other at-rule `Other`.
/// Invalid rules are dropped.
pub fn parse_stylesheet(css: &str) -> Vec<CssRule> {
    parse_all(css)
        .into_iter()
        .map(|(block, text)| CssRule::new(block.kind, text))
        .collect()
}

/// Parse the text of a single rule
pub fn parse_rule(css_text: &str) -> Option<RuleBlock> {
    parse_all(css_text).into_iter().next().map(|(block, _)| block)
}

/// Parse a declaration list (a rule body or a `style` attribute)
pub fn parse_declarations(text: &str) -> Vec<Declaration> {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);
    declarations_in(&mut parser)
}

fn parse_all(css: &str) -> Vec<(RuleBlock, String)> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut rule_parser = RuleParser;
    let mut sheet = StyleSheetParser::new(&mut parser, &mut rule_parser);
    let mut rules = Vec::new();
    while let Some(item) = sheet.next() {
        match item {
            Ok(rule) => {
                let text = sheet.input.slice_from(rule.start).trim().to_string();
                rules.push((rule.block, text));
            }
            Err((err, text)) => debug!("dropping invalid rule {:?}: {:?}", text, err),
        }
    }
    rules
}

fn declarations_in(input: &mut Parser<'_, '_>) -> Vec<Declaration> {
    RuleBodyParser::new(input, &mut DeclarationListParser)
        .flatten()
        .collect()
}

fn consume_all(input: &mut Parser<'_, '_>) {
    while input.next_including_whitespace_and_comments().is_ok() {}
}

fn important_tail<'i>(input: &mut Parser<'i, '_>) -> std::result::Result<(), BasicParseError<'i>> {
    cssparser::parse_important(input)?;
    input.expect_exhausted()
}

/// Raw text of a declaration value without comments at its edges, and
/// whether it ends in `!important`
fn declaration_value<'i>(input: &mut Parser<'i, '_>) -> (&'i str, bool) {
    let start = input.position();
    let mut end = start;
    let mut important = false;
    loop {
        if input.try_parse(important_tail).is_ok() {
            important = true;
            break;
        }
        let token = match input.next_including_whitespace() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        match token {
            Token::WhiteSpace(_) => {}
            Token::Function(_) | Token::ParenthesisBlock | Token::SquareBracketBlock | Token::CurlyBracketBlock => {
                let _ = input.parse_nested_block(|block| -> std::result::Result<(), ParseError<'i, ()>> {
                    consume_all(block);
                    Ok(())
                });
                end = input.position();
            }
            _ => end = input.position(),
        }
    }
    (input.slice(start..end).trim(), important)
}

struct DeclarationListParser;

impl<'i> DeclarationParser<'i> for DeclarationListParser {
    type Declaration = Declaration;
    type Error = ();

    fn parse_value<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
        _declaration_start: &ParserState,
    ) -> std::result::Result<Declaration, ParseError<'i, ()>> {
        let (value, important) = declaration_value(input);
        if value.is_empty() {
            return Err(input.new_custom_error(()));
        }
        Ok(Declaration::new(&*name, value, important))
    }
}

impl<'i> AtRuleParser<'i> for DeclarationListParser {
    type Prelude = ();
    type AtRule = Declaration;
    type Error = ();
}

impl<'i> QualifiedRuleParser<'i> for DeclarationListParser {
    type Prelude = ();
    type QualifiedRule = Declaration;
    type Error = ();
}

impl<'i> RuleBodyItemParser<'i, Declaration, ()> for DeclarationListParser {
    fn parse_declarations(&self) -> bool {
        true
    }

    fn parse_qualified(&self) -> bool {
        false
    }
}

struct RuleParser;

impl<'i> AtRuleParser<'i> for RuleParser {
    type Prelude = CssRuleKind;
    type AtRule = ParsedRule;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> std::result::Result<CssRuleKind, ParseError<'i, ()>> {
        consume_all(input);
        if name.eq_ignore_ascii_case("font-face") {
            Ok(CssRuleKind::FontFace)
        } else {
            Ok(CssRuleKind::Other)
        }
    }

    fn rule_without_block(&mut self, _kind: CssRuleKind, start: &ParserState) -> std::result::Result<ParsedRule, ()> {
        Ok(ParsedRule::new(CssRuleKind::Other, Vec::new(), Vec::new(), start))
    }

    fn parse_block<'t>(
        &mut self,
        kind: CssRuleKind,
        start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> std::result::Result<ParsedRule, ParseError<'i, ()>> {
        let declarations = match kind {
            CssRuleKind::FontFace => declarations_in(input),
            _ => {
                consume_all(input);
                Vec::new()
            }
        };
        Ok(ParsedRule::new(kind, Vec::new(), declarations, start))
    }
}

impl<'i> QualifiedRuleParser<'i> for RuleParser {
    type Prelude = Vec<String>;
    type QualifiedRule = ParsedRule;
    type Error = ();

    fn parse_prelude<'t>(&mut self, input: &mut Parser<'i, 't>) -> std::result::Result<Vec<String>, ParseError<'i, ()>> {
        let selectors = input.parse_comma_separated(|selector| {
            let start = selector.position();
            consume_all(selector);
            Ok::<_, ParseError<'i, ()>>(selector.slice_from(start).trim().to_string())
        })?;
        Ok(selectors.into_iter().filter(|s| !s.is_empty()).collect())
    }

    fn parse_block<'t>(
        &mut self,
        selectors: Vec<String>,
        start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> std::result::Result<ParsedRule, ParseError<'i, ()>> {
        Ok(ParsedRule::new(CssRuleKind::Style, selectors, declarations_in(input), start))
    }
}
