//! HTML minification.
//!
//! Whitespace is collapsed with `minify-html`, which knows which elements
//! treat whitespace as content. Comments, closing tags and the `<html>` and
//! `<head>` opening tags are kept; inline `<script>` and `<style>` bodies are
//! left alone since they are not part of the scripts or styles categories.

use super::include::{expand_includes, IncludeError};
use minify_html::{minify, Cfg};
use std::path::Path;

/// Expand includes in `path` and minify the result.
pub fn build_html(path: &Path) -> Result<String, IncludeError> {
    let expanded = expand_includes(path)?;
    Ok(collapse_whitespace(&expanded))
}

fn minify_cfg() -> Cfg {
    Cfg {
        keep_closing_tags: true,
        keep_comments: true,
        keep_html_and_head_opening_tags: true,
        keep_input_type_text_attr: true,
        keep_ssi_comments: true,
        minify_css: false,
        minify_js: false,
        ..Cfg::default()
    }
}

/// Collapse insignificant whitespace in an HTML document.
#[must_use]
pub fn collapse_whitespace(input: &str) -> String {
    let out = minify(input.as_bytes(), &minify_cfg());
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_collapse_document() {
        let input = "<!DOCTYPE html>\n<html>\n  <head>\n    <title>  My   Site </title>\n  </head>\n  <body>\n    <p>Hello   <em>there</em>   friend</p>\n  </body>\n</html>\n";
        let out = collapse_whitespace(input);
        assert!(out.starts_with("<!doctype html><html><head><title>"));
        assert!(out.contains("My Site"));
        assert!(out.contains("</title></head><body>"));
        assert!(out.contains("<p>Hello <em>there</em> friend</p>"));
        assert!(out.ends_with("</body></html>"));
    }

    #[test]
    fn test_raw_text_elements_are_kept() {
        let input = "<div>\n<pre>\n  keep   this\n</pre>\n<script>\n  if (a  <  b) {}\n</script>\n</div>";
        let out = collapse_whitespace(input);
        assert!(out.contains("  keep   this\n</pre>"));
        assert!(out.contains("if (a  <  b) {}"));
    }

    #[test]
    fn test_whitespace_between_inline_tags_is_kept() {
        assert_eq!(
            collapse_whitespace("<p><b>a</b>\n\n<i>b</i></p>"),
            "<p><b>a</b> <i>b</i></p>"
        );
        assert_eq!(
            collapse_whitespace("<ul>\n  <li>a</li>\n  <li>b</li>\n</ul>"),
            "<ul><li>a</li><li>b</li></ul>"
        );
    }

    #[test]
    fn test_space_around_comment_between_inline_tags() {
        let out = collapse_whitespace("<p><span>a</span> <!-- c --> <span>b</span></p>");
        assert!(out.contains("<!-- c -->"));
        assert!(out.contains("</span> "));
        assert!(out.contains(" <span>b"));
    }

    #[test]
    fn test_attribute_values_survive() {
        let out = collapse_whitespace("<a  href=\"x  y\"\n   class='c' >link</a >");
        assert!(out.starts_with("<a "));
        assert!(out.contains("x  y"));
        assert!(out.contains("class=c"));
        assert!(out.ends_with(">link</a>"));
    }

    #[test]
    fn test_comments_are_kept() {
        let out = collapse_whitespace("<div>\n  <!-- keep  me -->\n  <p>1 &lt; 2</p>\n</div>");
        assert!(out.contains("<!-- keep  me -->"));
        assert!(out.contains("<p>1 &lt; 2</p>"));
        assert!(!out.contains('\n'));
    }

    #[test]
    fn test_no_collapsible_runs_remain() {
        let input = "<section>\n\t<h1>Title\n\n</h1>\n   <p> one \t two </p>\n</section>\n";
        let out = collapse_whitespace(input);
        assert!(!out.contains("  "));
        assert!(!out.contains('\n'));
        assert!(!out.contains('\t'));
    }

    #[test]
    fn test_build_html_inlines_partials() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("partials")).unwrap();
        fs::write(
            dir.path().join("partials/header.html"),
            "<header>\n  <h1>Site</h1>\n</header>\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("index.html"),
            "<html>\n  <body>\n    //= partials/header.html\n    <main>Hi</main>\n  </body>\n</html>\n",
        )
        .unwrap();

        let out = build_html(&dir.path().join("index.html")).unwrap();
        assert_eq!(
            out,
            "<html><body><header><h1>Site</h1></header><main>Hi</main></body></html>"
        );
    }
}
