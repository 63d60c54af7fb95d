//! Lowering stage: compile typed and markup dialects to plain JavaScript.
//!
//! Plain units pass through unchanged after a syntax check. Typed and markup
//! units run through the oxc pipeline:
//!
//! ```text
//! source ──▶ Parser ──▶ SemanticBuilder ──▶ Transformer ──▶ Codegen ──▶ module text
//!                                           │
//!                                           ├─ TypeScript: strip types, keep value imports
//!                                           └─ JSX: classic runtime, React.createElement
//! ```
//!
//! Module syntax survives lowering untouched, and so do the publication
//! statements the transformer inserted.

use std::path::Path;

use oxc::allocator::Allocator;
use oxc::codegen::Codegen;
use oxc::semantic::SemanticBuilder;
use oxc::transformer::{JsxOptions, JsxRuntime, TransformOptions, Transformer};

use crate::cell::LanguageTag;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::syntax;
use crate::transform::TransformedUnit;

/// Directly loadable module text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweredUnit {
    pub code: String,
    /// Language the unit was lowered from.
    pub language: LanguageTag,
}

/// Compiles transformed units to plain JavaScript.
#[derive(Debug, Clone)]
pub struct Lowerer {
    target: String,
    jsx_factory: String,
    jsx_fragment: String,
}

impl Default for Lowerer {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl Lowerer {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            target: config.target.clone(),
            jsx_factory: config.jsx_factory.clone(),
            jsx_fragment: config.jsx_fragment.clone(),
        }
    }

    /// Lower a transformed unit.
    pub fn lower(&self, unit: &TransformedUnit, language: LanguageTag) -> Result<LoweredUnit> {
        self.lower_source(&unit.source(), language)
    }

    /// Lower raw module text.
    pub fn lower_source(&self, source: &str, language: LanguageTag) -> Result<LoweredUnit> {
        let code = match language {
            LanguageTag::Prose => {
                return Err(Error::InvalidOperation(
                    "prose cells are not executable".to_string(),
                ));
            }
            LanguageTag::Plain => {
                let allocator = Allocator::default();
                syntax::parse(&allocator, source, language)?;
                source.to_string()
            }
            LanguageTag::Typed | LanguageTag::MarkupPlain | LanguageTag::MarkupTyped => {
                self.compile(source, language)?
            }
        };
        tracing::debug!("Lowered {} unit ({} bytes)", language, code.len());
        Ok(LoweredUnit { code, language })
    }

    fn compile(&self, source: &str, language: LanguageTag) -> Result<String> {
        let allocator = Allocator::default();
        let parsed = syntax::parse(&allocator, source, language)?;
        let mut program = parsed.program;

        let scoping = SemanticBuilder::new()
            .build(&program)
            .semantic
            .into_scoping();

        let options = self.transform_options(language)?;
        let file_name = format!("cell.{}", language.fence());
        let transformed = Transformer::new(&allocator, Path::new(&file_name), &options)
            .build_with_scoping(scoping, &mut program);
        if !transformed.errors.is_empty() {
            return Err(Error::Compile {
                diagnostics: syntax::diagnostic_messages(&transformed.errors),
            });
        }

        Ok(Codegen::new().build(&program).code)
    }

    fn transform_options(&self, language: LanguageTag) -> Result<TransformOptions> {
        let mut options = TransformOptions::from_target(&self.target).map_err(|e| {
            Error::Config(format!("unsupported target `{}`: {:?}", self.target, e))
        })?;
        // Keep imports whose bindings this unit never references.
        options.typescript.only_remove_type_imports = true;
        if language.is_markup() {
            options.jsx = JsxOptions {
                runtime: JsxRuntime::Classic,
                pragma: Some(self.jsx_factory.clone()),
                pragma_frag: Some(self.jsx_fragment.clone()),
                ..JsxOptions::default()
            };
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::CodeTransformer;

    fn lower(source: &str, language: LanguageTag) -> Result<LoweredUnit> {
        let unit = CodeTransformer::default().transform(source, language);
        Lowerer::default().lower(&unit, language)
    }

    #[test]
    fn test_plain_is_identity() {
        let unit = CodeTransformer::default().transform("const a = 3;\na + 2;", LanguageTag::Plain);
        let lowered = Lowerer::default().lower(&unit, LanguageTag::Plain).unwrap();
        assert_eq!(lowered.code, unit.source());
    }

    #[test]
    fn test_plain_syntax_error() {
        let result = Lowerer::default().lower_source("const = ;", LanguageTag::Plain);
        assert!(matches!(result, Err(Error::Parse { .. })));
    }

    #[test]
    fn test_typed_strips_annotations_keeps_publication() {
        let lowered = lower(
            "interface Point { x: number }\nconst p: Point = { x: 1 };\np.x",
            LanguageTag::Typed,
        )
        .unwrap();
        assert!(!lowered.code.contains("interface"));
        assert!(!lowered.code.contains(": Point"));
        assert!(lowered.code.contains("sharedNamespace.p = p"));
        assert!(lowered.code.contains("export default await"));
    }

    #[test]
    fn test_typed_keeps_value_imports() {
        let lowered = Lowerer::default()
            .lower_source(
                "import { helper } from './helper.js';\nconst n: number = 1;",
                LanguageTag::Typed,
            )
            .unwrap();
        assert!(lowered.code.contains("./helper.js"));
    }

    #[test]
    fn test_typed_compile_error_is_parse_error() {
        let result = lower("const n: = 1;", LanguageTag::Typed);
        assert!(matches!(result, Err(Error::Parse { .. })));
    }

    #[test]
    fn test_markup_uses_classic_factory() {
        let lowered = lower("<div className=\"x\">hi</div>", LanguageTag::MarkupPlain).unwrap();
        assert!(lowered.code.contains("React.createElement"));
        assert!(!lowered.code.contains("<div"));
    }

    #[test]
    fn test_markup_fragment() {
        let lowered = lower("<><b>a</b></>", LanguageTag::MarkupTyped).unwrap();
        assert!(lowered.code.contains("React.Fragment"));
    }

    #[test]
    fn test_custom_factory() {
        let config = EngineConfig {
            jsx_factory: "h".to_string(),
            jsx_fragment: "Frag".to_string(),
            ..EngineConfig::default()
        };
        let lowered = Lowerer::from_config(&config)
            .lower_source("const el = <p />;", LanguageTag::MarkupPlain)
            .unwrap();
        assert!(lowered.code.contains("h(\"p\""));
    }

    #[test]
    fn test_prose_rejected() {
        let result = Lowerer::default().lower_source("# Title", LanguageTag::Prose);
        assert!(matches!(result, Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_invalid_target() {
        let config = EngineConfig {
            target: "es1999".to_string(),
            ..EngineConfig::default()
        };
        let result = Lowerer::from_config(&config).lower_source("const a: number = 1;", LanguageTag::Typed);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
