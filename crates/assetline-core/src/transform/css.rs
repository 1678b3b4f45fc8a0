//! CSS processing using lightningcss.
//!
//! Provides vendor prefixing for the default browser targets, minification
//! and an optional v3 source map of the printed stylesheet.

use lightningcss::printer::PrinterOptions;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;

/// CSS processing options.
#[derive(Debug, Clone, Default)]
pub struct CssOptions {
    /// Enable minification.
    pub minify: bool,
    /// Enable vendor prefixing with browser targets.
    pub autoprefixer: bool,
    /// Emit a source map.
    pub source_map: bool,
    /// Source name (for error messages and the source map).
    pub filename: Option<String>,
    /// Browser targets (defaults to reasonable coverage).
    pub targets: Option<Browsers>,
}

/// Result of CSS processing.
#[derive(Debug, Clone)]
pub struct CssResult {
    /// The transformed CSS code.
    pub code: String,
    /// Source map JSON, if requested.
    pub map: Option<String>,
}

/// Process CSS with lightningcss.
///
/// # Example
/// ```ignore
/// let options = CssOptions {
///     minify: true,
///     autoprefixer: true,
///     source_map: true,
///     ..Default::default()
/// };
/// let result = process_css(".foo { user-select: none; }", &options)?;
/// ```
pub fn process_css(source: &str, options: &CssOptions) -> Result<CssResult, CssError> {
    let filename = options.filename.as_deref().unwrap_or("input.css");

    let parser_options = ParserOptions {
        filename: filename.to_string(),
        ..ParserOptions::default()
    };
    let mut stylesheet = StyleSheet::parse(source, parser_options)
        .map_err(|e| CssError::Parse(format!("CSS parse error in {filename}: {e}")))?;

    let targets = if options.autoprefixer {
        options.targets.unwrap_or_else(default_browser_targets)
    } else {
        Browsers::default()
    };

    if options.minify || options.autoprefixer {
        stylesheet
            .minify(MinifyOptions {
                targets: Targets::from(targets),
                ..Default::default()
            })
            .map_err(|e| CssError::Transform(format!("CSS minify error: {e}")))?;
    }

    let mut source_map = if options.source_map {
        let mut sm = SourceMap::new("/");
        sm.add_source(filename);
        sm.set_source_content(0, source)
            .map_err(|e| CssError::Print(format!("CSS source map error: {e}")))?;
        Some(sm)
    } else {
        None
    };

    let printer_options = PrinterOptions {
        minify: options.minify,
        source_map: source_map.as_mut(),
        targets: Targets::from(targets),
        ..Default::default()
    };

    let output = stylesheet
        .to_css(printer_options)
        .map_err(|e| CssError::Print(format!("CSS print error: {e}")))?;

    let map = match source_map.as_mut() {
        Some(sm) => Some(
            sm.to_json(None)
                .map_err(|e| CssError::Print(format!("CSS source map error: {e}")))?,
        ),
        None => None,
    };

    Ok(CssResult {
        code: output.code,
        map,
    })
}

/// Default browser targets for prefixing.
///
/// Chrome 80+, Firefox 75+, Safari 13+, Edge 80+.
fn default_browser_targets() -> Browsers {
    Browsers {
        chrome: Some(80 << 16),
        firefox: Some(75 << 16),
        safari: Some(13 << 16),
        edge: Some(80 << 16),
        ..Default::default()
    }
}

/// CSS processing error.
#[derive(Debug)]
pub enum CssError {
    /// Parse error.
    Parse(String),
    /// Transform error.
    Transform(String),
    /// Print error.
    Print(String),
}

impl std::fmt::Display for CssError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CssError::Parse(msg) | CssError::Transform(msg) | CssError::Print(msg) => {
                write!(f, "{msg}")
            }
        }
    }
}

impl std::error::Error for CssError {}
