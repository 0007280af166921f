//! Minimal Typst `World` for compiling a single in-memory expression.
//!
//! The typesetting backend only ever compiles one virtual document (the
//! wrapped engine output), so the world is deliberately small:
//! - a single in-memory main source, no file imports, no packages
//! - fonts discovered via `fontdb` (system fonts), with the `typst-assets`
//!   embedded set as a fallback so minimal systems/containers still render
//!
//! Implementation constraints (typst 0.14):
//! - `library: LazyHash<Library>`, `book: LazyHash<FontBook>`
//! - `font(index)` indexing must stay consistent with the `FontBook`
//! - `typst::text::Font` holds `Bytes` that must be `'static`, so the owned
//!   font data is kept alive in `font_data` for the lifetime of the world.

use std::{fs, path::PathBuf, sync::Arc};

use ecow::EcoString;
use fontdb::{Database, Source as FontSource};
use typst::{
    Library, LibraryExt,
    diag::{FileError, FileResult},
    foundations::{Bytes, Datetime},
    syntax::{FileId, Source as TypstSource, VirtualPath},
    text::{Font, FontBook},
    utils::LazyHash,
};

/// The single in-memory Typst source compiled per render.
#[derive(Debug, Clone)]
pub struct ExprDoc {
    /// Virtual file path for diagnostics.
    pub path: EcoString,
    /// Typst source contents (already wrapped in math delimiters).
    pub source: EcoString,
}

impl ExprDoc {
    pub fn new(path: impl Into<EcoString>, source: impl Into<EcoString>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }
}

/// A Typst world backed by one in-memory source and discovered fonts.
pub struct TypesetWorld {
    doc: Arc<ExprDoc>,
    main: FileId,

    library: LazyHash<Library>,
    book: LazyHash<FontBook>,

    /// Loaded fonts in the exact order used by `font(index)`.
    fonts: Vec<Font>,

    /// Owned font bytes backing `fonts` (`Bytes::new` needs `'static` storage).
    #[allow(dead_code)]
    font_data: Vec<Arc<[u8]>>,
}

impl TypesetWorld {
    /// Create a world for one in-memory source.
    pub fn new(doc: ExprDoc) -> anyhow::Result<Self> {
        // typst-syntax 0.14: FileId::new(Option<PackageSpec>, VirtualPath).
        let main = FileId::new(None, VirtualPath::new(doc.path.as_str()));

        let library = LazyHash::new(Library::default());
        let (fonts, font_data, book) = load_fonts()?;

        Ok(Self {
            doc: Arc::new(doc),
            main,
            library,
            book: LazyHash::new(book),
            fonts,
            font_data,
        })
    }

    /// Number of loaded font faces (for startup logging).
    pub fn font_count(&self) -> usize {
        self.fonts.len()
    }
}

/// Discover fonts via `fontdb`, parse into `typst::text::Font`, build a `FontBook`.
///
/// Only file-backed system faces are loaded; parse failures are skipped. The
/// embedded `typst-assets` fonts always load as a supplement after the
/// system faces: hosts without a math font could otherwise never typeset an
/// expression, and the embedded set keeps rendering deterministic.
fn load_fonts() -> anyhow::Result<(Vec<Font>, Vec<Arc<[u8]>>, FontBook)> {
    let mut db = Database::new();
    db.load_system_fonts();

    let mut fonts: Vec<Font> = Vec::new();
    let mut font_data: Vec<Arc<[u8]>> = Vec::new();

    for face in db.faces() {
        let (path, index) = match &face.source {
            FontSource::File(p) => (p.clone(), face.index),
            _ => continue,
        };

        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(_) => continue,
        };

        let owned: Arc<[u8]> = Arc::from(bytes);
        if let Some(font) = Font::new(Bytes::new(owned.clone()), index) {
            font_data.push(owned);
            fonts.push(font);
        }
    }

    for data in typst_assets::fonts() {
        let owned: Arc<[u8]> = Arc::from(data);
        if let Some(font) = Font::new(Bytes::new(owned.clone()), 0) {
            font_data.push(owned);
            fonts.push(font);
        }
    }

    if fonts.is_empty() {
        anyhow::bail!("no fonts could be loaded (system fonts + embedded set)");
    }

    // Book order must match the `fonts` vector so `font(index)` stays aligned.
    let book = FontBook::from_fonts(fonts.iter());

    Ok((fonts, font_data, book))
}

impl typst::World for TypesetWorld {
    fn library(&self) -> &LazyHash<Library> {
        &self.library
    }

    fn book(&self) -> &LazyHash<FontBook> {
        &self.book
    }

    fn main(&self) -> FileId {
        self.main
    }

    fn source(&self, id: FileId) -> FileResult<TypstSource> {
        if id == self.main {
            Ok(TypstSource::new(id, self.doc.source.to_string()))
        } else {
            Err(FileError::NotFound(PathBuf::from("<memory>")))
        }
    }

    fn file(&self, _id: FileId) -> FileResult<Bytes> {
        // No external assets.
        Err(FileError::NotFound(PathBuf::from("<memory>")))
    }

    fn font(&self, index: usize) -> Option<Font> {
        self.fonts.get(index).cloned()
    }

    fn today(&self, _offset: Option<i64>) -> Option<Datetime> {
        // Deterministic compilation; no date access.
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_fonts_load_even_alongside_system_fonts() {
        // The embedded set (which includes a math font) must always be in
        // the book, regardless of what the host provides.
        let world = TypesetWorld::new(ExprDoc::new("t.typ", "$ x $")).unwrap();
        let embedded_count = typst_assets::fonts().count();
        assert!(world.font_count() >= embedded_count);
        assert!(embedded_count > 0);
    }
}
