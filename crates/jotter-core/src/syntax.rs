//! Glue between cell languages and the oxc front end.

use std::ops::Range;

use oxc::allocator::Allocator;
use oxc::diagnostics::OxcDiagnostic;
use oxc::parser::{Parser, ParserReturn};
use oxc::span::{SourceType, Span};

use crate::cell::LanguageTag;
use crate::error::{Error, Result};

/// Parser dialect for a cell language. Cells are always parsed as modules.
pub(crate) fn source_type(language: LanguageTag) -> SourceType {
    match language {
        LanguageTag::Plain | LanguageTag::Prose => SourceType::mjs(),
        LanguageTag::Typed => SourceType::ts(),
        LanguageTag::MarkupPlain => SourceType::jsx(),
        LanguageTag::MarkupTyped => SourceType::tsx(),
    }
}

/// Parse `source`, failing on any syntax error.
pub(crate) fn parse<'a>(
    allocator: &'a Allocator,
    source: &'a str,
    language: LanguageTag,
) -> Result<ParserReturn<'a>> {
    let parsed = Parser::new(allocator, source, source_type(language)).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        let message = if parsed.errors.is_empty() {
            "unrecoverable syntax error".to_string()
        } else {
            join_diagnostics(&parsed.errors)
        };
        return Err(Error::Parse { message });
    }
    Ok(parsed)
}

pub(crate) fn diagnostic_messages(errors: &[OxcDiagnostic]) -> Vec<String> {
    errors.iter().map(|error| error.to_string()).collect()
}

fn join_diagnostics(errors: &[OxcDiagnostic]) -> String {
    diagnostic_messages(errors).join("; ")
}

pub(crate) fn span_range(span: Span) -> Range<usize> {
    span.start as usize..span.end as usize
}
