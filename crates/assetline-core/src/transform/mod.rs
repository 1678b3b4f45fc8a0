//! Content transformations applied by the transform tasks.
//!
//! Each submodule wraps one external collaborator (or a small in-tree pass)
//! behind a `content in, content out or error` function:
//!
//! - [`include`]: `//= path` include directives
//! - [`html`]: HTML minification (minify-html)
//! - [`sass`]: Sass/SCSS compilation (grass)
//! - [`css`]: vendor prefixing, minification and source maps (lightningcss)
//! - [`script`]: JS transpilation, minification and source maps (SWC)
//! - [`image`]: PNG/JPEG/GIF/SVG optimization (imagequant, oxipng, image, quick-xml)

pub mod css;
pub mod html;
pub mod image;
pub mod include;
pub mod sass;
pub mod script;

pub use css::{process_css, CssOptions, CssResult};
pub use html::collapse_whitespace;
pub use image::{clean_svg, optimize_image, ImageKind, ImageSettings};
pub use include::expand_includes;
pub use sass::{compile_sass, is_partial, SassOptions};
pub use script::{EsTarget, ScriptCompiler, ScriptOutput};
