//! The path registry: which files belong to which asset category, where their
//! outputs go, and which changes re-trigger them.
//!
//! Patterns are written relative to the project root using `/` separators.
//! A leading `!` turns a source pattern into an exclusion. Brace alternatives
//! (`*.{png,jpg}`) and `**` are supported.

use crate::error::Error;
use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One class of asset with its own paths and transform chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ServerConfig,
    Html,
    Styles,
    Scripts,
    Images,
    Fonts,
}

/// What a finished task asks the dev server to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadKind {
    /// Reload the whole page.
    Full,
    /// Re-fetch stylesheets in place.
    Styles,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 6] = [
        Category::ServerConfig,
        Category::Html,
        Category::Styles,
        Category::Scripts,
        Category::Images,
        Category::Fonts,
    ];

    /// Stable machine name (also the key in `assetline.json`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServerConfig => "server_config",
            Self::Html => "html",
            Self::Styles => "styles",
            Self::Scripts => "scripts",
            Self::Images => "images",
            Self::Fonts => "fonts",
        }
    }

    /// Human title used in progress output.
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::ServerConfig => "Server config",
            Self::Html => "HTML files",
            Self::Styles => "CSS files",
            Self::Scripts => "JS files",
            Self::Images => "Images",
            Self::Fonts => "Fonts",
        }
    }

    /// The reload a completed run of this category triggers, if any.
    #[must_use]
    pub fn reload_kind(&self) -> Option<ReloadKind> {
        match self {
            Self::Html | Self::Scripts | Self::Images => Some(ReloadKind::Full),
            Self::Styles => Some(ReloadKind::Styles),
            Self::ServerConfig | Self::Fonts => None,
        }
    }

    /// Position in [`Category::ALL`].
    #[must_use]
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source, destination and watch patterns of one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPaths {
    /// Source patterns; `!`-prefixed entries exclude.
    pub src: Vec<String>,
    /// Output directory, relative to the project root.
    pub dist: String,
    /// Patterns whose changes re-run the category. Empty means not watched.
    #[serde(default)]
    pub watch: Vec<String>,
}

impl CategoryPaths {
    fn new(src: &[&str], dist: &str, watch: &[&str]) -> Self {
        Self {
            src: src.iter().map(ToString::to_string).collect(),
            dist: dist.to_string(),
            watch: watch.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Immutable mapping from category to its paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    categories: BTreeMap<Category, CategoryPaths>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut categories = BTreeMap::new();
        categories.insert(
            Category::Html,
            CategoryPaths::new(&["src/html/index.html"], "dist", &["src/**/*.html"]),
        );
        categories.insert(
            Category::Styles,
            CategoryPaths::new(
                &["src/styles/**/*.{sass,scss,css}"],
                "dist/styles",
                &["src/styles/**/*.{sass,scss,css}"],
            ),
        );
        categories.insert(
            Category::Scripts,
            CategoryPaths::new(&["src/js/**/*.js"], "dist/js", &["src/js/**/*.js"]),
        );
        categories.insert(
            Category::Images,
            CategoryPaths::new(
                &[
                    "src/img/**/*.{jpg,jpeg,png,gif,svg}",
                    "!src/img/svg/*.svg",
                    "!src/img/favicon.{jpg,jpeg,png,gif}",
                ],
                "dist/img",
                &["src/img/**/*.{jpg,jpeg,png,gif,svg}"],
            ),
        );
        categories.insert(
            Category::Fonts,
            CategoryPaths::new(
                &["src/fonts/**/*.{ttf,otf,woff,woff2}"],
                "dist/fonts",
                &["src/fonts/**/*.{ttf,otf,woff,woff2}"],
            ),
        );
        categories.insert(
            Category::ServerConfig,
            CategoryPaths::new(&["src/.htaccess"], "dist", &[]),
        );
        Self { categories }
    }
}

impl Registry {
    /// Replace the paths of one category.
    #[must_use]
    pub fn with(mut self, category: Category, paths: CategoryPaths) -> Self {
        self.categories.insert(category, paths);
        self
    }

    /// Paths of a category.
    #[must_use]
    pub fn get(&self, category: Category) -> &CategoryPaths {
        // Every constructor fills all six categories.
        &self.categories[&category]
    }

    /// Compile all patterns against a project root.
    pub fn compile(&self, root: &Path) -> Result<CompiledRegistry, Error> {
        let categories = Category::ALL
            .iter()
            .map(|&category| CompiledCategory::compile(category, self.get(category), root))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompiledRegistry { categories })
    }
}

/// A registry with globs compiled for one project root.
#[derive(Debug, Clone)]
pub struct CompiledRegistry {
    categories: Vec<CompiledCategory>,
}

impl CompiledRegistry {
    /// The compiled category.
    #[must_use]
    pub fn get(&self, category: Category) -> &CompiledCategory {
        &self.categories[category.index()]
    }

    /// All compiled categories in [`Category::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledCategory> {
        self.categories.iter()
    }
}

/// A source file selected by a category's patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Path relative to the matching pattern's base directory.
    pub relative: PathBuf,
}

#[derive(Debug, Clone)]
struct SourceGlob {
    base: PathBuf,
    literal: bool,
    matcher: GlobMatcher,
}

/// One category with compiled matchers and absolute directories.
#[derive(Debug, Clone)]
pub struct CompiledCategory {
    category: Category,
    root: PathBuf,
    dist: PathBuf,
    sources: Vec<SourceGlob>,
    excludes: GlobSet,
    watch: GlobSet,
    watched: bool,
}

impl CompiledCategory {
    fn compile(category: Category, paths: &CategoryPaths, root: &Path) -> Result<Self, Error> {
        let build = |pattern: &str| {
            GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|source| Error::Glob {
                    category: category.as_str(),
                    pattern: pattern.to_string(),
                    source,
                })
        };

        let mut sources = Vec::new();
        let mut excludes = GlobSetBuilder::new();
        for raw in &paths.src {
            if let Some(negated) = raw.strip_prefix('!') {
                excludes.add(build(normalize(negated))?);
            } else {
                let pattern = normalize(raw);
                let (base, literal) = glob_base(pattern);
                sources.push(SourceGlob {
                    base,
                    literal,
                    matcher: build(pattern)?.compile_matcher(),
                });
            }
        }

        let mut watch = GlobSetBuilder::new();
        for raw in &paths.watch {
            watch.add(build(normalize(raw))?);
        }

        let set_error = |source| Error::Glob {
            category: category.as_str(),
            pattern: paths.src.join(", "),
            source,
        };

        Ok(Self {
            category,
            root: root.to_path_buf(),
            dist: root.join(normalize(&paths.dist)),
            sources,
            excludes: excludes.build().map_err(set_error)?,
            watch: watch.build().map_err(set_error)?,
            watched: !paths.watch.is_empty(),
        })
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    /// Project root the patterns are relative to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute output directory.
    #[must_use]
    pub fn dist(&self) -> &Path {
        &self.dist
    }

    /// Whether any watch pattern is registered.
    #[must_use]
    pub fn is_watched(&self) -> bool {
        self.watched
    }

    /// Files currently matching the source patterns, sorted, without duplicates.
    ///
    /// Missing base directories yield nothing.
    #[must_use]
    pub fn collect_sources(&self) -> Vec<SourceFile> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for glob in &self.sources {
            let base = self.root.join(&glob.base);
            let candidates: Vec<PathBuf> = if glob.literal {
                vec![self.root.join(glob.matcher.glob().glob())]
            } else {
                WalkDir::new(&base)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|entry| entry.file_type().is_file())
                    .map(walkdir::DirEntry::into_path)
                    .collect()
            };

            for path in candidates {
                if !path.is_file() {
                    continue;
                }
                let Ok(rel) = path.strip_prefix(&self.root) else {
                    continue;
                };
                if !glob.matcher.is_match(rel) || self.excludes.is_match(rel) {
                    continue;
                }
                if !seen.insert(path.clone()) {
                    continue;
                }
                let relative = path.strip_prefix(&base).unwrap_or(rel).to_path_buf();
                files.push(SourceFile { path, relative });
            }
        }

        files
    }

    /// Output path for a source's base-relative path.
    #[must_use]
    pub fn output_path(&self, relative: &Path) -> PathBuf {
        self.dist.join(relative)
    }

    /// Whether a changed path (absolute or root-relative) hits a watch pattern.
    #[must_use]
    pub fn matches_watch(&self, path: &Path) -> bool {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        self.watch.is_match(rel)
    }
}

fn normalize(pattern: &str) -> &str {
    pattern.strip_prefix("./").unwrap_or(pattern)
}

/// Static prefix of a pattern and whether the pattern is a plain path.
///
/// For a plain path the base is its parent directory, so the output keeps
/// just the file name.
fn glob_base(pattern: &str) -> (PathBuf, bool) {
    let is_magic = |segment: &str| segment.contains(['*', '?', '[', '{']);
    let segments: Vec<&str> = pattern.split('/').collect();

    match segments.iter().position(|s| is_magic(*s)) {
        Some(idx) => (segments[..idx].iter().collect(), false),
        None => {
            let base = Path::new(pattern)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            (base, true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_glob_base() {
        assert_eq!(
            glob_base("src/styles/**/*.{sass,scss,css}"),
            (PathBuf::from("src/styles"), false)
        );
        assert_eq!(
            glob_base("src/html/index.html"),
            (PathBuf::from("src/html"), true)
        );
        assert_eq!(glob_base("src/.htaccess"), (PathBuf::from("src"), true));
    }

    #[test]
    fn test_default_registry_covers_all_categories() {
        let registry = Registry::default();
        for category in Category::ALL {
            assert!(!registry.get(category).src.is_empty());
        }
        assert!(registry.get(Category::ServerConfig).watch.is_empty());
        assert_eq!(registry.get(Category::Scripts).dist, "dist/js");
    }

    #[test]
    fn test_collect_sources_with_exclusions() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(root, "src/img/logo.png");
        touch(root, "src/img/photos/cat.jpg");
        touch(root, "src/img/svg/sprite.svg");
        touch(root, "src/img/favicon.png");
        touch(root, "src/img/notes.txt");

        let compiled = Registry::default().compile(root).unwrap();
        let images = compiled.get(Category::Images);
        let rels: Vec<_> = images
            .collect_sources()
            .into_iter()
            .map(|f| f.relative)
            .collect();

        assert_eq!(
            rels,
            vec![PathBuf::from("logo.png"), PathBuf::from("photos/cat.jpg")]
        );
        assert_eq!(
            images.output_path(Path::new("photos/cat.jpg")),
            root.join("dist/img/photos/cat.jpg")
        );
    }

    #[test]
    fn test_collect_literal_source() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(root, "src/.htaccess");
        touch(root, "src/html/index.html");
        touch(root, "src/html/partials/header.html");

        let compiled = Registry::default().compile(root).unwrap();

        let config = compiled.get(Category::ServerConfig).collect_sources();
        assert_eq!(config.len(), 1);
        assert_eq!(config[0].relative, PathBuf::from(".htaccess"));

        let html = compiled.get(Category::Html).collect_sources();
        assert_eq!(html.len(), 1);
        assert_eq!(html[0].relative, PathBuf::from("index.html"));
    }

    #[test]
    fn test_missing_source_dir_yields_nothing() {
        let dir = tempdir().unwrap();
        let compiled = Registry::default().compile(dir.path()).unwrap();
        for category in compiled.iter() {
            assert!(category.collect_sources().is_empty());
        }
    }

    #[test]
    fn test_matches_watch() {
        let root = Path::new("/project");
        let compiled = Registry::default().compile(root).unwrap();

        let scripts = compiled.get(Category::Scripts);
        assert!(scripts.matches_watch(Path::new("/project/src/js/app.js")));
        assert!(scripts.matches_watch(Path::new("/project/src/js/vendor/lib.js")));
        assert!(!scripts.matches_watch(Path::new("/project/src/styles/main.scss")));

        let html = compiled.get(Category::Html);
        assert!(html.matches_watch(Path::new("/project/src/html/partials/header.html")));
        assert!(!compiled.get(Category::ServerConfig).is_watched());
    }

    #[test]
    fn test_invalid_glob_is_reported() {
        let registry = Registry::default().with(
            Category::Fonts,
            CategoryPaths {
                src: vec!["src/fonts/[".to_string()],
                dist: "dist/fonts".to_string(),
                watch: vec![],
            },
        );
        let err = registry.compile(Path::new("/project")).unwrap_err();
        assert!(err.to_string().contains("fonts"));
    }
}
