//! Cell source formatting.

use oxc::allocator::Allocator;
use oxc::codegen::Codegen;

use crate::cell::LanguageTag;
use crate::error::Result;
use crate::syntax;

/// Reformat cell source by parsing and regenerating it.
///
/// Prose is returned unchanged. Invalid source fails with
/// [`Error::Parse`](crate::Error::Parse) and leaves the caller's text alone.
pub fn format_source(source: &str, language: LanguageTag) -> Result<String> {
    if !language.is_executable() {
        return Ok(source.to_string());
    }
    let allocator = Allocator::default();
    let parsed = syntax::parse(&allocator, source, language)?;
    Ok(Codegen::new().build(&parsed.program).code)
}
