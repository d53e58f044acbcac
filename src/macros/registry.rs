//! The macro table and import resolution.
//!
//! [`MacroTable`] maps macro names to definitions. It is a persistent map
//! (`im::HashMap`), so deriving a per-unit table from the shared one is a
//! cheap clone and the shared table is never mutated while files are being
//! expanded.
//!
//! [`ImportResolver`] follows `cmacro_import` forms depth first. Paths are
//! resolved against the importing file's directory, then against the
//! configured include directories. A file is loaded at most once per table,
//! even when it is reached along several import paths.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{to_source_span, CmacroError, Result};
use crate::macros::loader::{read_unit, SourceUnit};
use crate::macros::types::MacroDefinition;

// ============================================================================
// MACRO TABLE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    macros: im::HashMap<String, Arc<MacroDefinition>>,
    /// Canonical paths of every definition file merged into this table.
    files: im::HashSet<PathBuf>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<MacroDefinition>> {
        self.macros.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Macro names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.macros.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Definitions in name order.
    pub fn definitions(&self) -> Vec<&Arc<MacroDefinition>> {
        self.names()
            .into_iter()
            .filter_map(|name| self.macros.get(name))
            .collect()
    }

    pub fn has_file(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    /// Adds every definition of `unit`.
    ///
    /// Fails with `DuplicateMacro` when a name is already taken by a
    /// definition from another file.
    pub fn insert_unit(&mut self, unit: &SourceUnit) -> Result<()> {
        for def in &unit.definitions {
            if let Some(existing) = self.macros.get(&def.name) {
                if existing.origin == def.origin {
                    if existing.as_ref() == def {
                        continue;
                    }
                    return Err(CmacroError::DuplicateMacro {
                        name: def.name.clone(),
                        src: unit.src.clone(),
                        span: to_source_span(def.span.unwrap_or_default()),
                        help: Some("a file may define each macro only once".into()),
                    });
                }
                return Err(CmacroError::DuplicateMacro {
                    name: def.name.clone(),
                    src: unit.src.clone(),
                    span: to_source_span(def.span.unwrap_or_default()),
                    help: Some(format!("`{}` is already defined in {}", def.name, existing.origin)),
                });
            }
            tracing::trace!(name = %def.name, cases = def.cases.len(), "registered macro");
            self.macros.insert(def.name.clone(), Arc::new(def.clone()));
        }
        Ok(())
    }

    fn mark_file(&mut self, path: PathBuf) {
        self.files.insert(path);
    }
}

// ============================================================================
// IMPORTS
// ============================================================================

/// Loads definition files into a table, following their imports.
pub struct ImportResolver<'c> {
    include_dirs: &'c [PathBuf],
    /// Files whose imports are being resolved, outermost first.
    stack: Vec<PathBuf>,
}

impl<'c> ImportResolver<'c> {
    pub fn new(include_dirs: &'c [PathBuf]) -> Self {
        Self {
            include_dirs,
            stack: Vec::new(),
        }
    }

    /// Loads the definition file at `path` (and everything it imports) into
    /// `table`. The file's program text, if any, is ignored.
    pub fn load_file(&mut self, path: &Path, table: &mut MacroTable) -> Result<()> {
        let canonical = canonicalize(path)?;
        if table.has_file(&canonical) {
            return Ok(());
        }
        let unit = read_file(&canonical)?;
        if !unit.program.is_empty() {
            tracing::debug!(file = %canonical.display(), "ignoring program text in definition file");
        }
        self.stack.push(canonical.clone());
        let resolved = self.resolve(&unit, canonical.parent(), table);
        self.stack.pop();
        resolved?;
        table.insert_unit(&unit)?;
        table.mark_file(canonical);
        Ok(())
    }

    /// Resolves the imports of `unit`, then adds its own definitions.
    ///
    /// `path` is the unit's own file, if it has one; it anchors relative
    /// imports and takes part in cycle detection.
    pub fn load_unit(&mut self, unit: &SourceUnit, path: Option<&Path>, table: &mut MacroTable) -> Result<()> {
        let canonical = path.map(canonicalize).transpose()?;
        let dir = canonical.as_deref().and_then(Path::parent).map(Path::to_path_buf);
        if let Some(c) = &canonical {
            self.stack.push(c.clone());
        }
        let resolved = self.resolve(unit, dir.as_deref(), table);
        if canonical.is_some() {
            self.stack.pop();
        }
        resolved?;
        match canonical {
            // Already merged, e.g. the unit is also one of the definition files.
            Some(c) if table.has_file(&c) => Ok(()),
            _ => table.insert_unit(unit),
        }
    }

    fn resolve(&mut self, unit: &SourceUnit, dir: Option<&Path>, table: &mut MacroTable) -> Result<()> {
        for import in &unit.imports {
            let span = to_source_span(import.span.unwrap_or_default());
            let Some(found) = self.find(&import.path, dir) else {
                return Err(CmacroError::ImportNotFound {
                    path: import.path.clone(),
                    src: unit.src.clone(),
                    span,
                    help: Some(self.searched(dir)),
                });
            };
            let canonical = canonicalize(&found)?;
            if let Some(pos) = self.stack.iter().position(|p| *p == canonical) {
                let chain = self.stack[pos..]
                    .iter()
                    .chain(std::iter::once(&canonical))
                    .map(|p| display_name(p))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(CmacroError::ImportCycle {
                    chain,
                    src: unit.src.clone(),
                    span,
                });
            }
            tracing::debug!(import = %import.path, file = %canonical.display(), "resolving import");
            self.load_file(&canonical, table)?;
        }
        Ok(())
    }

    fn find(&self, relative: &str, dir: Option<&Path>) -> Option<PathBuf> {
        let relative = Path::new(relative);
        if relative.is_absolute() {
            return relative.is_file().then(|| relative.to_path_buf());
        }
        let base = dir.map(Path::to_path_buf).unwrap_or_default();
        std::iter::once(base)
            .chain(self.include_dirs.iter().cloned())
            .map(|d| d.join(relative))
            .find(|candidate| candidate.is_file())
    }

    fn searched(&self, dir: Option<&Path>) -> String {
        let mut dirs: Vec<String> = Vec::new();
        dirs.push(match dir {
            Some(d) => d.display().to_string(),
            None => ".".to_string(),
        });
        dirs.extend(self.include_dirs.iter().map(|d| d.display().to_string()));
        format!("searched: {}", dirs.join(", "))
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .map_err(|e| CmacroError::io("resolve", path, e))
}

fn read_file(path: &Path) -> Result<SourceUnit> {
    let text = std::fs::read_to_string(path).map_err(|e| CmacroError::io("read", path, e))?;
    tracing::info!(file = %path.display(), "loading definitions");
    read_unit(&path.display().to_string(), text)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
