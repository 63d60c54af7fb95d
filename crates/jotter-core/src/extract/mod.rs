//! Declaration extractor built on the oxc parser.
//!
//! Looks only at top-level statements of a cell body:
//!
//! - names bound by `var` / `let` / `const` (destructuring included),
//!   `function` and `class` declarations
//! - names the author already publishes by hand
//!   (`sharedNamespace.x = ...` or `sharedNamespace["x"] = ...`)
//! - byte spans of `import` declarations
//! - the kind of the final statement, which drives value capture

use std::ops::Range;

use oxc::allocator::Allocator;
use oxc::ast::ast::{
    AssignmentPattern, AssignmentTarget, BindingIdentifier, Expression, Statement,
    TSTypeAnnotation,
};
use oxc::ast_visit::Visit;
use oxc::span::GetSpan;

use crate::cell::LanguageTag;
use crate::config::DEFAULT_NAMESPACE_BINDING;
use crate::error::Result;
use crate::syntax::{self, span_range};

/// Top-level names found in a fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopLevelBindings {
    /// Declared names, distinct, in declaration order.
    pub declared: Vec<String>,
    /// Names already assigned onto the namespace binding.
    pub published: Vec<String>,
}

/// Classification of the last top-level statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalStatement {
    /// No statements at all.
    Empty,
    /// An expression statement whose value can be captured.
    Expression {
        /// Byte range of the whole statement, terminator included.
        statement: Range<usize>,
        /// Byte range of the expression alone.
        expression: Range<usize>,
    },
    /// A call to the display primitive.
    DisplayCall,
    /// A declaration or module item.
    Declaration,
    /// Any other statement (blocks, loops, `if`, ...).
    Other,
}

/// Everything the code transformer needs to know about a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAnalysis {
    pub bindings: TopLevelBindings,
    /// Byte ranges of top-level `import` declarations.
    pub imports: Vec<Range<usize>>,
    pub final_statement: FinalStatement,
    /// Whether the fragment has top-level `export` items.
    pub has_exports: bool,
}

/// Extracts top-level bindings from cell source.
#[derive(Debug, Clone)]
pub struct DeclarationExtractor {
    namespace_binding: String,
}

impl Default for DeclarationExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE_BINDING)
    }
}

impl DeclarationExtractor {
    pub fn new(namespace_binding: impl Into<String>) -> Self {
        Self {
            namespace_binding: namespace_binding.into(),
        }
    }

    /// Names bound at the top level of `source`.
    pub fn extract(&self, source: &str, language: LanguageTag) -> Result<Vec<String>> {
        Ok(self.analyze(source, language)?.bindings.declared)
    }

    /// Full top-level analysis of `source`.
    pub fn analyze(&self, source: &str, language: LanguageTag) -> Result<SourceAnalysis> {
        let allocator = Allocator::default();
        let parsed = syntax::parse(&allocator, source, language)?;
        let body = &parsed.program.body;

        let mut bindings = TopLevelBindings::default();
        let mut imports = Vec::new();
        let mut has_exports = false;

        for statement in body {
            match statement {
                Statement::VariableDeclaration(declaration) => {
                    let mut collector = BindingCollector {
                        names: &mut bindings.declared,
                    };
                    for declarator in &declaration.declarations {
                        collector.visit_binding_pattern(&declarator.id);
                    }
                }
                Statement::FunctionDeclaration(function) => {
                    if let Some(id) = &function.id {
                        push_distinct(&mut bindings.declared, id.name.as_str());
                    }
                }
                Statement::ClassDeclaration(class) => {
                    if let Some(id) = &class.id {
                        push_distinct(&mut bindings.declared, id.name.as_str());
                    }
                }
                Statement::ImportDeclaration(import) => {
                    imports.push(span_range(import.span));
                }
                Statement::ExpressionStatement(expression) => {
                    if let Some(name) = self.published_name(&expression.expression) {
                        push_distinct(&mut bindings.published, &name);
                    }
                }
                other if other.is_module_declaration() => has_exports = true,
                _ => {}
            }
        }

        let final_statement = body
            .last()
            .map_or(FinalStatement::Empty, |statement| self.classify(statement));

        Ok(SourceAnalysis {
            bindings,
            imports,
            final_statement,
            has_exports,
        })
    }

    fn classify(&self, statement: &Statement<'_>) -> FinalStatement {
        match statement {
            Statement::ExpressionStatement(expression) => {
                if is_display_call(&expression.expression) {
                    FinalStatement::DisplayCall
                } else {
                    FinalStatement::Expression {
                        statement: span_range(expression.span),
                        expression: span_range(expression.expression.span()),
                    }
                }
            }
            other if other.is_declaration() || other.is_module_declaration() => {
                FinalStatement::Declaration
            }
            _ => FinalStatement::Other,
        }
    }

    /// Name published by `<ns>.name = ...` or `<ns>["name"] = ...`.
    fn published_name(&self, expression: &Expression<'_>) -> Option<String> {
        let Expression::AssignmentExpression(assignment) = expression else {
            return None;
        };
        match &assignment.left {
            AssignmentTarget::StaticMemberExpression(member)
                if self.is_namespace(&member.object) =>
            {
                Some(member.property.name.as_str().to_string())
            }
            AssignmentTarget::ComputedMemberExpression(member)
                if self.is_namespace(&member.object) =>
            {
                match &member.expression {
                    Expression::StringLiteral(literal) => Some(literal.value.as_str().to_string()),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn is_namespace(&self, expression: &Expression<'_>) -> bool {
        matches!(expression, Expression::Identifier(ident) if ident.name.as_str() == self.namespace_binding)
    }
}

fn is_display_call(expression: &Expression<'_>) -> bool {
    matches!(
        expression,
        Expression::CallExpression(call)
            if matches!(&call.callee, Expression::Identifier(ident) if ident.name.as_str() == "display")
    )
}

fn push_distinct(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|existing| existing == name) {
        names.push(name.to_string());
    }
}

/// Collects the identifiers a binding pattern introduces.
struct BindingCollector<'n> {
    names: &'n mut Vec<String>,
}

impl<'a> Visit<'a> for BindingCollector<'_> {
    fn visit_binding_identifier(&mut self, it: &BindingIdentifier<'a>) {
        push_distinct(self.names, it.name.as_str());
    }

    // Default values are expressions; only the target binds.
    fn visit_assignment_pattern(&mut self, it: &AssignmentPattern<'a>) {
        self.visit_binding_pattern(&it.left);
    }

    fn visit_ts_type_annotation(&mut self, _it: &TSTypeAnnotation<'a>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> Vec<String> {
        DeclarationExtractor::default()
            .extract(source, LanguageTag::Plain)
            .unwrap()
    }

    #[test]
    fn test_extract_simple_declarations() {
        let names = extract("const a = 1;\nlet b = 2;\nvar c = 3;\nfunction f() {}\nclass K {}");
        assert_eq!(names, vec!["a", "b", "c", "f", "K"]);
    }

    #[test]
    fn test_extract_multi_line_destructuring() {
        let source = "const {\n  x,\n  y: renamed,\n  ...rest\n} = obj;\nconst [first, , third = 3] = list;";
        assert_eq!(
            extract(source),
            vec!["x", "renamed", "rest", "first", "third"]
        );
    }

    #[test]
    fn test_default_values_do_not_bind() {
        let names = extract("const { a = (b) => b } = {};");
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn test_nested_scopes_ignored() {
        let source = r#"
            function outer() {
                const inner = 1;
                return inner;
            }
            if (true) {
                let blockScoped = 2;
            }
            class Widget {
                field = 3;
                method() { const local = 4; }
            }
        "#;
        assert_eq!(extract(source), vec!["outer", "Widget"]);
    }

    #[test]
    fn test_distinct_names() {
        assert_eq!(extract("var a = 1;\nvar a = 2;"), vec!["a"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(extract("").is_empty());
        assert!(extract("console.log(1);").is_empty());
    }

    #[test]
    fn test_parse_error() {
        let result = DeclarationExtractor::default().extract("const = ;", LanguageTag::Plain);
        assert!(matches!(result, Err(crate::Error::Parse { .. })));
    }

    #[test]
    fn test_typed_annotations_do_not_leak() {
        let names = DeclarationExtractor::default()
            .extract(
                "const handler: (event: string) => void = () => {};\ninterface Shape { side: number }",
                LanguageTag::Typed,
            )
            .unwrap();
        assert_eq!(names, vec!["handler"]);
    }

    #[test]
    fn test_published_names() {
        let analysis = DeclarationExtractor::default()
            .analyze(
                "const a = 1;\nsharedNamespace.a = a;\nsharedNamespace[\"b\"] = 2;\nother.c = 3;",
                LanguageTag::Plain,
            )
            .unwrap();
        assert_eq!(analysis.bindings.published, vec!["a", "b"]);
    }

    #[test]
    fn test_final_statement_classification() {
        let extractor = DeclarationExtractor::default();
        let classify = |source: &str| {
            extractor
                .analyze(source, LanguageTag::Plain)
                .unwrap()
                .final_statement
        };

        assert_eq!(classify(""), FinalStatement::Empty);
        assert_eq!(classify("const a = 1;"), FinalStatement::Declaration);
        assert_eq!(classify("display(1);"), FinalStatement::DisplayCall);
        assert_eq!(classify("if (x) { y; }"), FinalStatement::Other);
        assert_eq!(
            classify("const a = 1;\na + 2;"),
            FinalStatement::Expression {
                statement: 13..19,
                expression: 13..18,
            }
        );
    }

    #[test]
    fn test_import_spans() {
        let source = "import {\n  a,\n} from './a.js';\nconst b = a;";
        let analysis = DeclarationExtractor::default()
            .analyze(source, LanguageTag::Plain)
            .unwrap();
        assert_eq!(analysis.imports.len(), 1);
        assert_eq!(&source[analysis.imports[0].clone()], "import {\n  a,\n} from './a.js';");
        assert_eq!(analysis.bindings.declared, vec!["b"]);
        assert!(!analysis.has_exports);
    }

    #[test]
    fn test_exports_detected() {
        let analysis = DeclarationExtractor::default()
            .analyze("export const a = 1;\na;", LanguageTag::Plain)
            .unwrap();
        assert!(analysis.has_exports);
    }

    #[test]
    fn test_custom_namespace_binding() {
        let analysis = DeclarationExtractor::new("ctx")
            .analyze("ctx.value = 1;\nsharedNamespace.other = 2;", LanguageTag::Plain)
            .unwrap();
        assert_eq!(analysis.bindings.published, vec!["value"]);
    }
}
