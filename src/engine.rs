use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::config::ExpansionConfig;
use crate::errors::{CmacroError, Result};
use crate::macros::{read_unit, ExpansionDriver, ImportResolver, MacroExpansionStep, MacroTable, SourceUnit};
use crate::syntax::printer::{render_faithful, render_plain};
use crate::syntax::Fragment;

/// File extensions `expand_tree` picks up.
pub const SOURCE_EXTENSIONS: &[&str] = &["c", "h"];

// ============================================================================
// EXPANDED UNIT
// ============================================================================

/// The result of expanding one source unit.
#[derive(Debug, Clone)]
pub struct ExpandedUnit {
    pub name: String,
    /// The unit's original text, used by the faithful printer.
    pub source: String,
    pub fragments: Vec<Fragment>,
    /// Empty unless tracing was enabled.
    pub trace: Vec<MacroExpansionStep>,
    pub steps: usize,
}

impl ExpandedUnit {
    /// Prints the expanded unit, keeping the original layout around untouched
    /// code when `preserve_layout` is set.
    pub fn render(&self, preserve_layout: bool) -> String {
        if preserve_layout {
            render_faithful(&self.fragments, &self.source)
        } else {
            render_plain(&self.fragments)
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Expansion entry point: a configuration plus the macros every unit sees.
///
/// The base table is never mutated once files are being expanded; each unit
/// gets its own copy extended with its own definitions and imports, and its
/// own driver with its own gensym counter.
#[derive(Debug, Clone)]
pub struct Engine {
    config: ExpansionConfig,
    base: MacroTable,
    cancel: Arc<AtomicBool>,
    trace: bool,
}

impl Engine {
    pub fn new(config: ExpansionConfig) -> Self {
        Self {
            config,
            base: MacroTable::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            trace: false,
        }
    }

    /// Loads definition files (and their imports) into the base table.
    pub fn with_macro_files<P: AsRef<Path>>(mut self, paths: &[P]) -> Result<Self> {
        let mut resolver = ImportResolver::new(&self.config.include_dirs);
        for path in paths {
            resolver.load_file(path.as_ref(), &mut self.base)?;
        }
        tracing::info!(macros = self.base.len(), "loaded macro definitions");
        Ok(self)
    }

    /// Records a step-by-step trace for every unit.
    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.trace = enabled;
        self
    }

    pub fn config(&self) -> &ExpansionConfig {
        &self.config
    }

    pub fn table(&self) -> &MacroTable {
        &self.base
    }

    /// Setting this flag makes every running and future expansion fail with
    /// `Cancelled` before its next step.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Reads a unit and builds the table it expands against.
    pub fn load_unit(&self, name: &str, text: String, path: Option<&Path>) -> Result<(SourceUnit, MacroTable)> {
        let unit = read_unit(name, text)?;
        let mut table = self.base.clone();
        ImportResolver::new(&self.config.include_dirs).load_unit(&unit, path, &mut table)?;
        Ok((unit, table))
    }

    /// Expands source text that has no file behind it. Relative imports are
    /// resolved against the working directory.
    pub fn expand_source(&self, name: &str, text: impl Into<String>) -> Result<ExpandedUnit> {
        let (unit, table) = self.load_unit(name, text.into(), None)?;
        self.expand_unit(unit, &table)
    }

    pub fn expand_file(&self, path: &Path) -> Result<ExpandedUnit> {
        let text = std::fs::read_to_string(path).map_err(|e| CmacroError::io("read", path, e))?;
        let name = path.display().to_string();
        let (unit, table) = self.load_unit(&name, text, Some(path))?;
        self.expand_unit(unit, &table)
    }

    /// Expands every `.c` and `.h` file under `dir` in parallel.
    ///
    /// Results are sorted by path. A failing file never affects the others;
    /// only a failure to walk the directory itself is returned as `Err`.
    /// Gensyms always carry the unit tag here, so the expanded files can be
    /// linked together.
    pub fn expand_tree(&self, dir: &Path) -> Result<Vec<(PathBuf, Result<ExpandedUnit>)>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(dir).to_path_buf();
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop"));
                CmacroError::io("walk", &path, source)
            })?;
            if entry.file_type().is_file() && is_source_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
        tracing::info!(dir = %dir.display(), files = files.len(), "expanding tree");

        let engine = Engine {
            config: ExpansionConfig {
                unit_tags: true,
                ..self.config.clone()
            },
            ..self.clone()
        };
        Ok(files
            .into_par_iter()
            .map(|path| {
                let result = engine.expand_file(&path);
                if let Err(e) = &result {
                    tracing::debug!(file = %path.display(), error = %e, "expansion failed");
                }
                (path, result)
            })
            .collect())
    }

    fn expand_unit(&self, unit: SourceUnit, table: &MacroTable) -> Result<ExpandedUnit> {
        tracing::info!(unit = %unit.name, macros = table.len(), "expanding unit");
        let mut driver = ExpansionDriver::new(table, &unit.name, &unit.src, &self.config)
            .with_cancel_flag(Arc::clone(&self.cancel));
        if self.trace {
            driver = driver.with_trace();
        }
        let fragments = driver.expand(unit.program)?;
        Ok(ExpandedUnit {
            name: unit.name,
            source: unit.text,
            fragments,
            trace: driver.take_trace(),
            steps: driver.steps(),
        })
    }
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::macros::hygiene::unit_tag;

    const FORCE: &str = "macro force { case { match { $(expr) } template { $(expr)() } } }\n";

    #[test]
    fn expand_source_renders_faithfully() {
        let engine = Engine::new(ExpansionConfig::default());
        let unit = engine
            .expand_source("u.c", format!("{FORCE}int main() {{\n    return force thunk;\n}}\n"))
            .unwrap();
        assert_eq!(unit.steps, 1);
        assert!(unit.render(true).contains("return thunk();"));
        assert!(unit.render(false).starts_with("int main() {\n"));
    }

    #[test]
    fn macro_files_feed_every_unit() {
        let dir = tempfile::tempdir().unwrap();
        let defs = dir.path().join("force.c");
        fs::write(&defs, FORCE).unwrap();
        let engine = Engine::new(ExpansionConfig::default())
            .with_macro_files(&[&defs])
            .unwrap();
        assert!(engine.table().contains("force"));
        let unit = engine.expand_source("u.c", "x = force t;").unwrap();
        assert_eq!(render_plain(&unit.fragments), "x = t();\n");
    }

    #[test]
    fn tree_expansion_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("good.c"), format!("{FORCE}x = force t;")).unwrap();
        fs::write(dir.path().join("bad.c"), format!("{FORCE}x = force")).unwrap();
        fs::write(dir.path().join("notes.txt"), "force").unwrap();
        let results = Engine::new(ExpansionConfig::default())
            .expand_tree(dir.path())
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].0.ends_with("bad.c"));
        assert!(matches!(results[0].1, Err(CmacroError::NoMatchingCase { .. })));
        assert!(results[1].1.is_ok());
    }

    #[test]
    fn tree_expansion_tags_gensyms_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let lambda = "macro lambda { case { match { $(args) -> $(ret) $(body) } \
            template { $(@getsym lambda 0) } toplevel { $(ret) $(@gensym lambda) $(args) $(body) } } }\n\
            int (*f)(void) = lambda () -> int { return 1; };";
        fs::write(dir.path().join("a.c"), lambda).unwrap();
        fs::write(dir.path().join("b.c"), lambda).unwrap();
        let results = Engine::new(ExpansionConfig::default())
            .expand_tree(dir.path())
            .unwrap();
        let names: Vec<String> = results
            .iter()
            .map(|(path, result)| {
                let tag = unit_tag(&path.display().to_string());
                let name = format!("cmacro_lambda_{tag}_0");
                let text = render_plain(&result.as_ref().unwrap().fragments);
                assert!(text.contains(&format!("= {name};")), "{text}");
                name
            })
            .collect();
        assert_eq!(names.len(), 2);
        assert_ne!(names[0], names[1]);
    }

    #[test]
    fn cancelled_engine_stops_expanding() {
        let engine = Engine::new(ExpansionConfig::default());
        engine.cancel_flag().store(true, std::sync::atomic::Ordering::Relaxed);
        let err = engine.expand_source("u.c", "int x;").unwrap_err();
        assert!(matches!(err, CmacroError::Cancelled { .. }));
    }
}
