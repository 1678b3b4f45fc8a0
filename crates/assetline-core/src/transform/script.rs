//! JavaScript transpilation and minification with SWC.
//!
//! Sources are parsed as either module or classic script (whichever the
//! parser detects), lowered to the configured language level with the compat
//! passes, minified with compression and name mangling, and printed together
//! with a v3 source map.

use serde::{Deserialize, Serialize};
use std::fmt;
use swc_common::{
    comments::{Comments, SingleThreadedComments},
    sync::Lrc,
    FileName, Globals, Mark, SourceMap, Span, Spanned, GLOBALS,
};
use swc_ecma_ast::{EsVersion, Program};
use swc_ecma_codegen::{text_writer::JsWriter, Emitter};
use swc_ecma_minifier::option::{
    terser::{TerserCompressorOptions, TerserEcmaVersion},
    ExtraOptions, MangleOptions, MinifyOptions,
};
use swc_ecma_parser::{lexer::Lexer, EsSyntax, Parser, StringInput, Syntax};
use swc_ecma_transforms_base::{
    fixer::fixer,
    helpers::{inject_helpers, Helpers, HELPERS},
    hygiene::hygiene,
    resolver,
};
use swc_ecma_transforms_compat::{es2016, es2017, es2018, es2019, es2020, es2021, es2022};
use swc_ecma_visit::FoldWith;

/// ECMAScript level scripts are lowered to.
///
/// Variants are ordered oldest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum EsTarget {
    /// ECMAScript 2015 (ES6).
    #[default]
    #[serde(rename = "es2015")]
    ES2015,
    #[serde(rename = "es2016")]
    ES2016,
    #[serde(rename = "es2017")]
    ES2017,
    #[serde(rename = "es2018")]
    ES2018,
    #[serde(rename = "es2019")]
    ES2019,
    #[serde(rename = "es2020")]
    ES2020,
    #[serde(rename = "es2021")]
    ES2021,
    #[serde(rename = "es2022")]
    ES2022,
    /// Latest ECMAScript features.
    #[serde(rename = "esnext")]
    ESNext,
}

impl EsTarget {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ES2015 => "es2015",
            Self::ES2016 => "es2016",
            Self::ES2017 => "es2017",
            Self::ES2018 => "es2018",
            Self::ES2019 => "es2019",
            Self::ES2020 => "es2020",
            Self::ES2021 => "es2021",
            Self::ES2022 => "es2022",
            Self::ESNext => "esnext",
        }
    }

    fn es_version(self) -> EsVersion {
        match self {
            Self::ES2015 => EsVersion::Es2015,
            Self::ES2016 => EsVersion::Es2016,
            Self::ES2017 => EsVersion::Es2017,
            Self::ES2018 => EsVersion::Es2018,
            Self::ES2019 => EsVersion::Es2019,
            Self::ES2020 => EsVersion::Es2020,
            Self::ES2021 => EsVersion::Es2021,
            Self::ES2022 => EsVersion::Es2022,
            Self::ESNext => EsVersion::EsNext,
        }
    }

    /// Compressor `ecma` level: never emit syntax newer than the target.
    fn terser_ecma(self) -> usize {
        match self {
            Self::ES2015 => 2015,
            Self::ES2016 => 2016,
            Self::ES2017 => 2017,
            Self::ES2018 => 2018,
            Self::ES2019 => 2019,
            Self::ES2020 => 2020,
            Self::ES2021 => 2021,
            Self::ES2022 | Self::ESNext => 2022,
        }
    }
}

/// Run every compat pass for syntax newer than `target`, newest first.
///
/// Must run inside `GLOBALS` and `HELPERS`.
fn lower(
    mut program: Program,
    target: EsTarget,
    unresolved_mark: Mark,
    comments: &SingleThreadedComments,
) -> Program {
    if target < EsTarget::ES2022 {
        program = program.fold_with(&mut es2022(
            Some(comments),
            es2022::Config::default(),
            unresolved_mark,
        ));
    }
    if target < EsTarget::ES2021 {
        program = program.fold_with(&mut es2021());
    }
    if target < EsTarget::ES2020 {
        program = program.fold_with(&mut es2020(es2020::Config::default(), unresolved_mark));
    }
    if target < EsTarget::ES2019 {
        program = program.fold_with(&mut es2019());
    }
    if target < EsTarget::ES2018 {
        program = program.fold_with(&mut es2018(es2018::Config::default()));
    }
    if target < EsTarget::ES2017 {
        program = program.fold_with(&mut es2017(
            es2017::Config::default(),
            Some(comments),
            unresolved_mark,
        ));
    }
    if target < EsTarget::ES2016 {
        program = program.fold_with(&mut es2016());
    }
    program.fold_with(&mut inject_helpers(unresolved_mark))
}

impl fmt::Display for EsTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of [`ScriptCompiler::compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    pub code: String,
    /// Source map JSON, if requested.
    pub map: Option<String>,
}

/// Script pipeline settings.
#[derive(Debug, Clone, Copy)]
pub struct ScriptCompiler {
    pub target: EsTarget,
    pub minify: bool,
    pub source_map: bool,
}

impl Default for ScriptCompiler {
    fn default() -> Self {
        Self {
            target: EsTarget::default(),
            minify: true,
            source_map: true,
        }
    }
}

impl ScriptCompiler {
    #[must_use]
    pub fn new(target: EsTarget) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }

    /// Parse, lower, minify and print one script.
    ///
    /// `filename` names the source in errors and in the source map.
    pub fn compile(&self, filename: &str, source: &str) -> Result<ScriptOutput, CompilerError> {
        let cm: Lrc<SourceMap> = Lrc::default();
        let fm = cm.new_source_file(
            Lrc::new(FileName::Custom(filename.to_string())),
            source.to_string(),
        );
        let comments = SingleThreadedComments::default();

        let lexer = Lexer::new(
            Syntax::Es(EsSyntax::default()),
            EsVersion::EsNext,
            StringInput::from(&*fm),
            Some(&comments),
        );
        let mut parser = Parser::new_from(lexer);

        let locate = |span: Span| {
            let loc = cm.lookup_char_pos(span.lo);
            format!("{filename}:{}:{}", loc.line, loc.col.0 + 1)
        };

        let program = parser.parse_program().map_err(|e| {
            CompilerError::parse_error(format!("{:?} at {}", e.kind(), locate(e.span())))
        })?;

        let errors: Vec<String> = parser
            .take_errors()
            .into_iter()
            .map(|e| format!("{:?} at {}", e.kind(), locate(e.span())))
            .collect();
        if !errors.is_empty() {
            return Err(CompilerError::parse_error(errors.join(", ")));
        }

        let compress = if self.minify {
            let mut terser: TerserCompressorOptions = serde_json::from_str("{}")
                .map_err(|e| CompilerError::transform_error(format!("compress options: {e}")))?;
            terser.ecma = TerserEcmaVersion::Num(self.target.terser_ecma());
            Some(terser.into_config(cm.clone()))
        } else {
            None
        };

        let program = GLOBALS.set(&Globals::default(), || {
            let unresolved_mark = Mark::new();
            let top_level_mark = Mark::new();

            let program =
                program.fold_with(&mut resolver(unresolved_mark, top_level_mark, false));
            let mut program = HELPERS.set(&Helpers::new(false), || {
                lower(program, self.target, unresolved_mark, &comments)
            });

            if let Some(compress) = compress {
                program = swc_ecma_minifier::optimize(
                    program,
                    cm.clone(),
                    Some(&comments),
                    None,
                    &MinifyOptions {
                        compress: Some(compress),
                        mangle: Some(MangleOptions::default()),
                        ..Default::default()
                    },
                    &ExtraOptions {
                        unresolved_mark,
                        top_level_mark,
                        mangle_name_cache: None,
                    },
                );
            } else {
                program = program.fold_with(&mut hygiene());
            }

            program.fold_with(&mut fixer(Some(&comments)))
        });

        let kept_comments: Option<&dyn Comments> = if self.minify {
            None
        } else {
            Some(&comments)
        };

        let mut buf = Vec::new();
        let mut src_map_buf = Vec::new();
        {
            let writer = JsWriter::new(cm.clone(), "\n", &mut buf, Some(&mut src_map_buf));
            let mut emitter = Emitter {
                cfg: swc_ecma_codegen::Config::default()
                    .with_minify(self.minify)
                    .with_target(self.target.es_version()),
                cm: cm.clone(),
                comments: kept_comments,
                wr: writer,
            };

            let emitted = match &program {
                Program::Module(module) => emitter.emit_module(module),
                Program::Script(script) => emitter.emit_script(script),
            };
            emitted.map_err(|e| CompilerError::transform_error(format!("Failed to emit: {e}")))?;
        }

        let code = String::from_utf8(buf)
            .map_err(|e| CompilerError::transform_error(format!("Invalid UTF-8 output: {e}")))?;

        let map = if self.source_map {
            let srcmap = cm.build_source_map(&src_map_buf);
            let mut map_buf = Vec::new();
            srcmap.to_writer(&mut map_buf).map_err(|e| {
                CompilerError::transform_error(format!("Failed to write source map: {e}"))
            })?;
            Some(String::from_utf8(map_buf).map_err(|e| {
                CompilerError::transform_error(format!("Invalid UTF-8 source map: {e}"))
            })?)
        } else {
            None
        };

        Ok(ScriptOutput { code, map })
    }
}

/// Script compilation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerError {
    /// Error code.
    pub code: &'static str,
    /// Human-readable error message.
    pub message: String,
}

impl CompilerError {
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new("SCRIPT_PARSE_ERROR", message)
    }

    #[must_use]
    pub fn transform_error(message: impl Into<String>) -> Self {
        Self::new("SCRIPT_TRANSFORM_ERROR", message)
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CompilerError {}

#[cfg(test)]
mod tests {
    use super::*;

    const APP: &str = r"
        function greet(personName) {
            const greeting = 'Hello, ' + personName;
            console.log(greeting);
        }
        greet('world');
    ";

    #[test]
    fn test_minify_shrinks_and_keeps_behavior() {
        let out = ScriptCompiler::default().compile("app.js", APP).unwrap();
        assert!(out.code.len() < APP.len());
        assert!(out.code.contains("console.log"));
        assert!(!out.code.contains("personName"));
        assert!(!out.code.trim_end().contains('\n'));
    }

    #[test]
    fn test_source_map_names_the_source() {
        let out = ScriptCompiler::default().compile("app.js", APP).unwrap();
        let map: serde_json::Value = serde_json::from_str(&out.map.unwrap()).unwrap();
        assert_eq!(map["version"], 3);
        assert!(map["sources"][0].as_str().unwrap().contains("app.js"));
    }

    #[test]
    fn test_module_syntax_is_accepted() {
        let src = "import { a } from './a.js';\nexport const b = a?.c ?? 1;\n";
        let out = ScriptCompiler::new(EsTarget::ES2020).compile("mod.js", src).unwrap();
        assert!(out.code.contains("./a.js"));
        assert!(out.code.contains("export"));
    }

    #[test]
    fn test_without_minify_keeps_names() {
        let compiler = ScriptCompiler {
            minify: false,
            source_map: false,
            ..ScriptCompiler::default()
        };
        let out = compiler.compile("app.js", APP).unwrap();
        assert!(out.code.contains("personName"));
        assert!(out.map.is_none());
    }

    #[test]
    fn test_parse_error_has_location() {
        let err = ScriptCompiler::default()
            .compile("broken.js", "let a = ;\n")
            .unwrap_err();
        assert_eq!(err.code, "SCRIPT_PARSE_ERROR");
        assert!(err.message.contains("broken.js:1:"));
    }

    #[test]
    fn test_newer_syntax_is_lowered_for_default_target() {
        let src = "const f = (o) => o?.a ?? 1;\nconsole.log(f({}));\n";
        let out = ScriptCompiler::default().compile("a.js", src).unwrap();
        assert!(!out.code.contains("?."), "{}", out.code);
        assert!(!out.code.contains("??"), "{}", out.code);
        assert!(out.code.contains("console.log"));
    }

    #[test]
    fn test_class_fields_are_lowered_without_minify() {
        let compiler = ScriptCompiler {
            minify: false,
            source_map: false,
            ..ScriptCompiler::default()
        };
        let out = compiler
            .compile("a.js", "class Counter { count = 0; }\nnew Counter();\n")
            .unwrap();
        assert!(out.code.contains("constructor"), "{}", out.code);
        assert!(!out.code.contains("count = 0"), "{}", out.code);
    }

    #[test]
    fn test_esnext_keeps_modern_syntax() {
        let compiler = ScriptCompiler {
            minify: false,
            source_map: false,
            ..ScriptCompiler::new(EsTarget::ESNext)
        };
        let out = compiler.compile("a.js", "export const x = a?.b ?? 1;\n").unwrap();
        assert!(out.code.contains("?."));
        assert!(out.code.contains("??"));
    }

    #[test]
    fn test_targets_are_ordered() {
        assert!(EsTarget::ES2015 < EsTarget::ES2020);
        assert!(EsTarget::ES2022 < EsTarget::ESNext);
    }

    #[test]
    fn test_empty_source() {
        let out = ScriptCompiler::default().compile("empty.js", "").unwrap();
        assert_eq!(out.code.trim(), "");
    }

    #[test]
    fn test_target_serde_names() {
        let target: EsTarget = serde_json::from_str("\"es2017\"").unwrap();
        assert_eq!(target, EsTarget::ES2017);
        assert_eq!(EsTarget::default().to_string(), "es2015");
    }
}
