//! Code transformer: turns a raw cell body into an executable unit.
//!
//! The transformer:
//! - hoists top-level imports verbatim to the top of the unit
//! - appends a publication statement (`sharedNamespace.x = x;`) for every
//!   top-level declaration the author did not publish already
//! - wraps the body in an awaited async IIFE when the cell ends in a bare
//!   expression, so its value becomes the module's default export
//!
//! ```text
//! const a = 3;          export default await (async function () {
//! a + 2;          ==>   const a = 3;
//!                       sharedNamespace.a = a;
//!                       return (a + 2);
//!                       })();
//! ```

use crate::cell::LanguageTag;
use crate::config::DEFAULT_NAMESPACE_BINDING;
use crate::extract::{DeclarationExtractor, FinalStatement, SourceAnalysis};

/// Output of the transformer. Lives for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedUnit {
    /// Import statements, in source order.
    pub preserved_imports: Vec<String>,
    /// Body with publications, possibly wrapped for value capture.
    pub executable_body: String,
    /// Whether the final expression is captured as the default export.
    pub wrapped: bool,
}

impl TransformedUnit {
    /// Imports followed by the executable body.
    pub fn source(&self) -> String {
        if self.preserved_imports.is_empty() {
            return self.executable_body.clone();
        }
        let imports = self.preserved_imports.join("\n");
        if self.executable_body.is_empty() {
            imports
        } else {
            format!("{}\n{}", imports, self.executable_body)
        }
    }
}

/// Final expression pulled out of the body for value capture.
struct Capture {
    prefix: String,
    expression: String,
}

/// Rewrites cell source into a [`TransformedUnit`].
#[derive(Debug, Clone)]
pub struct CodeTransformer {
    extractor: DeclarationExtractor,
    namespace_binding: String,
}

impl Default for CodeTransformer {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE_BINDING)
    }
}

impl CodeTransformer {
    pub fn new(namespace_binding: impl Into<String>) -> Self {
        let namespace_binding = namespace_binding.into();
        Self {
            extractor: DeclarationExtractor::new(namespace_binding.clone()),
            namespace_binding,
        }
    }

    /// Transform `source`. Never fails: unparseable fragments get the
    /// line-based fallback and surface their syntax error during lowering.
    pub fn transform(&self, source: &str, language: LanguageTag) -> TransformedUnit {
        let (preserved_imports, body_lines) = self.partition(source, language);
        let body = body_lines.join("\n");
        let body = body.trim_end();

        if body.trim().is_empty() {
            return TransformedUnit {
                preserved_imports,
                executable_body: String::new(),
                wrapped: false,
            };
        }

        let analysis = match self.extractor.analyze(body, language) {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                tracing::warn!("Treating cell body as declaring nothing: {}", e);
                None
            }
        };

        let publications = analysis
            .as_ref()
            .map(|analysis| self.publications(analysis))
            .unwrap_or_default();

        let capture = match &analysis {
            Some(analysis) => capture_final_statement(body, analysis),
            None => self.capture_final_line(body, language),
        };

        let wrapped = capture.is_some();
        let executable_body = match capture {
            Some(capture) => wrap(&capture, &publications),
            None => append_lines(body, &publications),
        };

        tracing::debug!(
            "Transformed cell: {} imports, {} publications, wrapped={}",
            preserved_imports.len(),
            publications.len(),
            wrapped
        );

        TransformedUnit {
            preserved_imports,
            executable_body,
            wrapped,
        }
    }

    /// Split source lines into import lines and body lines.
    fn partition<'s>(&self, source: &'s str, language: LanguageTag) -> (Vec<String>, Vec<&'s str>) {
        let import_spans = self
            .extractor
            .analyze(source, language)
            .ok()
            .map(|analysis| analysis.imports);

        let mut imports = Vec::new();
        let mut body = Vec::new();
        let mut offset = 0;
        for line in source.split('\n') {
            let range = offset..offset + line.len();
            offset = range.end + 1;

            let is_import = match &import_spans {
                Some(spans) => spans
                    .iter()
                    .any(|span| span.start < range.end && span.end > range.start),
                None => looks_like_import(line),
            };
            if is_import {
                imports.push(line.to_string());
            } else {
                body.push(line);
            }
        }
        (imports, body)
    }

    fn publications(&self, analysis: &SourceAnalysis) -> Vec<String> {
        analysis
            .bindings
            .declared
            .iter()
            .filter(|name| !analysis.bindings.published.contains(name))
            .map(|name| format!("{}.{name} = {name};", self.namespace_binding))
            .collect()
    }

    /// Fallback for bodies that do not parse: inspect the last line alone.
    fn capture_final_line(&self, body: &str, language: LanguageTag) -> Option<Capture> {
        let (prefix, last) = match body.rsplit_once('\n') {
            Some((prefix, last)) => (prefix, last),
            None => ("", body),
        };
        let trimmed = last.trim();
        if trimmed.is_empty() || trimmed.starts_with('}') || trimmed.starts_with("display(") {
            return None;
        }
        let is_declaration = matches!(
            self.extractor.analyze(trimmed, language).map(|a| a.final_statement),
            Ok(FinalStatement::Declaration)
        );
        if is_declaration {
            return None;
        }
        let expression = trimmed.strip_suffix(';').unwrap_or(trimmed);
        Some(Capture {
            prefix: prefix.trim_end().to_string(),
            expression: expression.to_string(),
        })
    }
}

/// Capture the final expression statement located by the parser.
///
/// Bodies with `export` items stay unwrapped: exports cannot move into a
/// function.
fn capture_final_statement(body: &str, analysis: &SourceAnalysis) -> Option<Capture> {
    let FinalStatement::Expression {
        statement,
        expression,
    } = &analysis.final_statement
    else {
        return None;
    };
    if analysis.has_exports {
        return None;
    }
    let expression_text = body[expression.clone()].trim();
    if expression_text.starts_with('}') {
        return None;
    }

    let mut prefix = body[..statement.start].trim_end().to_string();
    let trailing = body[statement.end..].trim();
    if !trailing.is_empty() {
        if !prefix.is_empty() {
            prefix.push('\n');
        }
        prefix.push_str(trailing);
    }
    Some(Capture {
        prefix,
        expression: expression_text.to_string(),
    })
}

fn wrap(capture: &Capture, publications: &[String]) -> String {
    let mut out = String::from("export default await (async function () {\n");
    if !capture.prefix.is_empty() {
        out.push_str(&capture.prefix);
        out.push('\n');
    }
    for publication in publications {
        out.push_str(publication);
        out.push('\n');
    }
    out.push_str(&format!("return ({});\n", capture.expression));
    out.push_str("})();");
    out
}

fn append_lines(body: &str, publications: &[String]) -> String {
    let mut out = body.to_string();
    for publication in publications {
        out.push('\n');
        out.push_str(publication);
    }
    out
}

/// Textual import detection, used only when the source does not parse.
fn looks_like_import(line: &str) -> bool {
    let Some(rest) = line.trim_start().strip_prefix("import") else {
        return false;
    };
    rest.chars()
        .next()
        .is_some_and(|c| c.is_whitespace() || matches!(c, '{' | '*' | '"' | '\''))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform(source: &str) -> TransformedUnit {
        CodeTransformer::default().transform(source, LanguageTag::Plain)
    }

    #[test]
    fn test_wraps_trailing_expression_with_publications() {
        let unit = transform("const a = 3;\na + 2;");
        assert!(unit.wrapped);
        assert_eq!(
            unit.executable_body,
            "export default await (async function () {\nconst a = 3;\nsharedNamespace.a = a;\nreturn (a + 2);\n})();"
        );
    }

    #[test]
    fn test_trailing_declaration_not_wrapped() {
        let unit = transform("const a = 3;");
        assert!(!unit.wrapped);
        assert_eq!(unit.executable_body, "const a = 3;\nsharedNamespace.a = a;");
    }

    #[test]
    fn test_display_call_not_wrapped() {
        let unit = transform("const a = 1;\ndisplay(a);");
        assert!(!unit.wrapped);
        assert!(unit.executable_body.ends_with("sharedNamespace.a = a;"));
    }

    #[test]
    fn test_block_ending_not_wrapped() {
        let unit = transform("for (const i of [1, 2]) {\n  display(i);\n}");
        assert!(!unit.wrapped);
    }

    #[test]
    fn test_multi_line_final_expression_captured_whole() {
        let unit = transform("[1, 2, 3]\n  .map((n) => n * 2)\n  .join(',');");
        assert!(unit.wrapped);
        assert!(unit
            .executable_body
            .contains("return ([1, 2, 3]\n  .map((n) => n * 2)\n  .join(','));"));
    }

    #[test]
    fn test_imports_hoisted() {
        let source = "const a = 1;\nimport { b } from './b.js';\nimport {\n  c,\n} from './c.js';\na + b + c;";
        let unit = transform(source);
        assert_eq!(
            unit.preserved_imports,
            vec!["import { b } from './b.js';", "import {", "  c,", "} from './c.js';"]
        );
        assert!(!unit.executable_body.contains("import"));
        assert!(unit.source().starts_with("import { b } from './b.js';\nimport {"));
    }

    #[test]
    fn test_existing_publication_not_duplicated() {
        let unit = transform("const a = 1;\nsharedNamespace.a = a * 2;");
        assert_eq!(unit.executable_body.matches("sharedNamespace.a =").count(), 1);
    }

    #[test]
    fn test_trailing_blank_lines_stripped() {
        let unit = transform("1 + 1;\n\n   \n");
        assert!(unit.wrapped);
        assert!(unit.executable_body.contains("return (1 + 1);"));
    }

    #[test]
    fn test_empty_body() {
        let unit = transform("import x from './x.js';\n\n");
        assert!(!unit.wrapped);
        assert!(unit.executable_body.is_empty());
        assert_eq!(unit.source(), "import x from './x.js';");
    }

    #[test]
    fn test_unparseable_body_falls_back_to_last_line() {
        let unit = transform("const a = ;\na + 1;");
        assert!(unit.wrapped);
        assert!(unit.executable_body.contains("return (a + 1);"));
        assert!(!unit.executable_body.contains("sharedNamespace."));
    }

    #[test]
    fn test_unparseable_body_ending_in_declaration() {
        let unit = transform("foo(;\nlet b = 2;");
        assert!(!unit.wrapped);
    }

    #[test]
    fn test_unparseable_import_heuristic() {
        let unit = transform("import { a } from './a.js';\nconst = ;");
        assert_eq!(unit.preserved_imports, vec!["import { a } from './a.js';"]);
    }

    #[test]
    fn test_body_with_exports_not_wrapped() {
        let unit = transform("export const a = 1;\na;");
        assert!(!unit.wrapped);
    }

    #[test]
    fn test_trailing_comment_kept_inside_wrapper() {
        let unit = transform("const a = 1;\na // the answer");
        assert!(unit.wrapped);
        assert!(unit.executable_body.contains("// the answer\nsharedNamespace.a = a;"));
        assert!(unit.executable_body.contains("return (a);"));
    }

    #[test]
    fn test_typed_cell() {
        let unit = CodeTransformer::default().transform(
            "const n: number = 2;\nn * 2",
            LanguageTag::Typed,
        );
        assert!(unit.wrapped);
        assert!(unit.executable_body.contains("sharedNamespace.n = n;"));
    }

    #[test]
    fn test_custom_binding() {
        let unit = CodeTransformer::new("ctx").transform("let v = 1;", LanguageTag::Plain);
        assert_eq!(unit.executable_body, "let v = 1;\nctx.v = v;");
    }
}
