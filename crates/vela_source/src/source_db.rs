//! Registry of the files a design was read from.

use crate::file_id::FileId;
use crate::span::Span;
use std::path::{Path, PathBuf};

/// Maps [`FileId`]s to file names for location strings.
///
/// Elaboration never reads source text; only the names are needed to render
/// `file:line.col-line.col` locations.
#[derive(Debug, Default)]
pub struct SourceDb {
    files: Vec<PathBuf>,
}

impl SourceDb {
    /// Creates an empty source database.
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    /// Registers a file name and returns its [`FileId`].
    ///
    /// Registering the same name twice returns the first id.
    pub fn add_file(&mut self, name: impl Into<PathBuf>) -> FileId {
        let name = name.into();
        if let Some(pos) = self.files.iter().position(|f| *f == name) {
            return FileId::from_raw(pos as u32);
        }
        self.files.push(name);
        FileId::from_raw(self.files.len() as u32 - 1)
    }

    /// Returns the file name for `id`, or `None` for the dummy id.
    pub fn path(&self, id: FileId) -> Option<&Path> {
        self.files.get(id.as_raw() as usize).map(PathBuf::as_path)
    }

    /// Number of registered files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True if no file has been registered.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Renders `file:first_line.first_col-last_line.last_col`.
    ///
    /// Spans without location render as `<internal>`.
    pub fn loc_string(&self, span: Span) -> String {
        let name = match self.path(span.file) {
            Some(p) => p.display().to_string(),
            None => return "<internal>".to_string(),
        };
        format!(
            "{name}:{}.{}-{}.{}",
            span.first_line, span.first_column, span.last_line, span.last_column
        )
    }

    /// Renders `file:line`, the short form used in netlist `src` attributes
    /// and promotion notes.
    pub fn line_string(&self, span: Span) -> String {
        match self.path(span.file) {
            Some(p) => format!("{}:{}", p.display(), span.first_line),
            None => "<internal>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let mut db = SourceDb::new();
        let a = db.add_file("top.v");
        let b = db.add_file("sub.v");
        assert_ne!(a, b);
        assert_eq!(db.add_file("top.v"), a);
        assert_eq!(db.len(), 2);
        assert_eq!(db.path(b), Some(Path::new("sub.v")));
    }

    #[test]
    fn loc_strings() {
        let mut db = SourceDb::new();
        let f = db.add_file("top.v");
        let span = Span::new(f, 3, 5, 4, 12);
        assert_eq!(db.loc_string(span), "top.v:3.5-4.12");
        assert_eq!(db.line_string(span), "top.v:3");
        assert_eq!(db.loc_string(Span::DUMMY), "<internal>");
    }
}
