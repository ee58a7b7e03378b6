//! Uniform read-only view over comic archives.
//!
//! The backend is chosen once, from the file extension, when the archive is
//! opened. ZIP containers are read in process; RAR and 7z containers go
//! through their command line tools.

mod cbz;
mod external;
pub mod natural_sort;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

use cbz::CbzBackend;
use external::{ExternalBackend, ExternalTool};

pub use natural_sort::{natural_cmp, natural_sort};

/// Extensions accepted as comic pages.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff"];

/// Basenames that never count as pages.
const IGNORED_NAMES: &[&str] = &["thumbs.db", ".ds_store", "comicinfo.xml"];

/// Extensions that never count as pages.
const IGNORED_EXTENSIONS: &[&str] = &["nfo", "sfv", "txt", "xml", "db", "ini"];

/// Container formats with a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Cbz,
    Cbr,
    Cb7,
}

impl ArchiveFormat {
    /// Detects the format from a path's extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "cbz" | "zip" => Some(ArchiveFormat::Cbz),
            "cbr" | "rar" => Some(ArchiveFormat::Cbr),
            "cb7" | "7z" => Some(ArchiveFormat::Cb7),
            _ => None,
        }
    }
}

/// Locations of the external decompression tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub unrar: PathBuf,
    pub sevenzip: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            unrar: PathBuf::from("unrar"),
            sevenzip: PathBuf::from("7z"),
        }
    }
}

enum Backend {
    Cbz(CbzBackend),
    Rar(ExternalBackend),
    SevenZip(ExternalBackend),
}

/// An open comic archive. Backend resources are released on drop.
pub struct ComicArchive {
    path: PathBuf,
    format: ArchiveFormat,
    backend: Backend,
}

impl std::fmt::Debug for ComicArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComicArchive")
            .field("path", &self.path)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl ComicArchive {
    /// Opens an archive, selecting the backend from its extension.
    pub fn open(path: &Path, tools: &ToolPaths) -> Result<Self, ArchiveError> {
        let format = ArchiveFormat::from_path(path).ok_or_else(|| {
            ArchiveError::UnsupportedFormat(
                path.extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
            )
        })?;

        if !path.is_file() {
            return Err(ArchiveError::FileMissing(path.to_path_buf()));
        }

        let backend = match format {
            ArchiveFormat::Cbz => Backend::Cbz(CbzBackend::open(path)?),
            ArchiveFormat::Cbr => {
                Backend::Rar(ExternalBackend::open(ExternalTool::Unrar, &tools.unrar, path)?)
            }
            ArchiveFormat::Cb7 => Backend::SevenZip(ExternalBackend::open(
                ExternalTool::SevenZip,
                &tools.sevenzip,
                path,
            )?),
        };

        log::trace!("Opened {:?} archive {}", format, path.display());

        Ok(Self {
            path: path.to_path_buf(),
            format,
            backend,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Every member name in the container's native order, directories omitted.
    pub fn list_files(&self) -> &[String] {
        match &self.backend {
            Backend::Cbz(b) => b.names(),
            Backend::Rar(b) | Backend::SevenZip(b) => b.names(),
        }
    }

    /// Image members in natural reading order.
    pub fn list_pages(&self) -> Vec<String> {
        let mut pages: Vec<String> = self
            .list_files()
            .iter()
            .filter(|name| is_page(name))
            .cloned()
            .collect();
        natural_sort(&mut pages);
        pages
    }

    /// Reads one member's bytes.
    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        match &mut self.backend {
            Backend::Cbz(b) => b.read(name),
            Backend::Rar(b) | Backend::SevenZip(b) => b.read(name),
        }
    }

    /// Raw bytes of the embedded `ComicInfo.xml`, if any.
    ///
    /// Matching is case-insensitive; a copy at the archive root wins over
    /// nested ones.
    pub fn comic_info(&mut self) -> Result<Option<Vec<u8>>, ArchiveError> {
        let mut candidates: Vec<&String> = self
            .list_files()
            .iter()
            .filter(|name| basename(name).eq_ignore_ascii_case("comicinfo.xml"))
            .collect();
        candidates.sort_by_key(|name| name.matches(['/', '\\']).count());

        match candidates.first().map(|name| name.to_string()) {
            Some(name) => self.read_file(&name).map(Some),
            None => Ok(None),
        }
    }

    /// Bytes of the page at `index` in reading order.
    pub fn page(&mut self, index: usize) -> Result<Vec<u8>, ArchiveError> {
        let pages = self.list_pages();
        let name = pages.get(index).ok_or_else(|| {
            ArchiveError::MemberNotFound(format!("page {} of {}", index, pages.len()))
        })?;
        let name = name.clone();
        self.read_file(&name)
    }

    /// Bytes of the first page.
    pub fn cover(&mut self) -> Result<Vec<u8>, ArchiveError> {
        self.page(0)
    }

    /// Releases the backend now rather than at end of scope.
    pub fn close(self) {}
}

impl Drop for ComicArchive {
    fn drop(&mut self) {
        log::trace!("Closed archive {}", self.path.display());
    }
}

fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Whether a member name is a page image.
pub fn is_page(name: &str) -> bool {
    if name.ends_with('/') || name.ends_with('\\') {
        return false;
    }
    if name
        .split(['/', '\\'])
        .any(|part| part.eq_ignore_ascii_case("__macosx"))
    {
        return false;
    }

    let base = basename(name).to_ascii_lowercase();
    if base.starts_with("._") || IGNORED_NAMES.contains(&base.as_str()) {
        return false;
    }

    match base.rsplit_once('.') {
        Some((_, ext)) => {
            !IGNORED_EXTENSIONS.contains(&ext) && IMAGE_EXTENSIONS.contains(&ext)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_cbz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, bytes) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(bytes).unwrap();
            }
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ArchiveFormat::from_path(Path::new("a/Batman.CBZ")),
            Some(ArchiveFormat::Cbz)
        );
        assert_eq!(
            ArchiveFormat::from_path(Path::new("x.rar")),
            Some(ArchiveFormat::Cbr)
        );
        assert_eq!(
            ArchiveFormat::from_path(Path::new("x.cb7")),
            Some(ArchiveFormat::Cb7)
        );
        assert_eq!(ArchiveFormat::from_path(Path::new("x.pdf")), None);
        assert_eq!(ArchiveFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_is_page_filters_ignored_members() {
        assert!(is_page("01.jpg"));
        assert!(is_page("Chapter 1/Page 02.PNG"));
        assert!(!is_page("ComicInfo.xml"));
        assert!(!is_page("Thumbs.db"));
        assert!(!is_page("__MACOSX/01.jpg"));
        assert!(!is_page("._01.jpg"));
        assert!(!is_page("release.nfo"));
        assert!(!is_page("scans/"));
        assert!(!is_page("README"));
    }

    #[test]
    fn test_open_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.pdf");
        std::fs::write(&path, b"%PDF").unwrap();
        let err = ComicArchive::open(&path, &ToolPaths::default()).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ComicArchive::open(&dir.path().join("gone.cbz"), &ToolPaths::default())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::FileMissing(_)));
    }

    #[test]
    fn test_open_corrupt_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.cbz");
        std::fs::write(&path, b"definitely not a zip").unwrap();
        let err = ComicArchive::open(&path, &ToolPaths::default()).unwrap_err();
        assert!(matches!(err, ArchiveError::Open { .. }));
    }

    #[test]
    fn test_cbz_pages_in_natural_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.cbz");
        write_cbz(
            &path,
            &[
                ("pages/", b""),
                ("pages/page10.jpg", b"ten"),
                ("pages/page2.jpg", b"two"),
                ("pages/page1.jpg", b"one"),
                ("ComicInfo.xml", b"<ComicInfo/>"),
                ("__MACOSX/pages/._page1.jpg", b"junk"),
            ],
        );

        let mut archive = ComicArchive::open(&path, &ToolPaths::default()).unwrap();
        assert_eq!(archive.format(), ArchiveFormat::Cbz);
        assert_eq!(archive.list_files().len(), 5);
        assert_eq!(
            archive.list_pages(),
            vec!["pages/page1.jpg", "pages/page2.jpg", "pages/page10.jpg"]
        );
        assert_eq!(archive.cover().unwrap(), b"one");
        assert_eq!(archive.page(2).unwrap(), b"ten");
        assert!(matches!(
            archive.page(3),
            Err(ArchiveError::MemberNotFound(_))
        ));
        archive.close();
    }

    #[test]
    fn test_read_missing_member() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.cbz");
        write_cbz(&path, &[("01.jpg", b"x")]);

        let mut archive = ComicArchive::open(&path, &ToolPaths::default()).unwrap();
        assert!(matches!(
            archive.read_file("02.jpg"),
            Err(ArchiveError::MemberNotFound(_))
        ));
    }

    #[test]
    fn test_comic_info_prefers_root_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.cbz");
        write_cbz(
            &path,
            &[
                ("extras/ComicInfo.xml", b"nested"),
                ("comicinfo.XML", b"root"),
                ("01.jpg", b"x"),
            ],
        );

        let mut archive = ComicArchive::open(&path, &ToolPaths::default()).unwrap();
        assert_eq!(archive.comic_info().unwrap().unwrap(), b"root");
    }

    #[test]
    fn test_comic_info_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.cbz");
        write_cbz(&path, &[("01.jpg", b"x")]);

        let mut archive = ComicArchive::open(&path, &ToolPaths::default()).unwrap();
        assert!(archive.comic_info().unwrap().is_none());
    }

    #[test]
    fn test_cbr_with_missing_tool_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.cbr");
        std::fs::write(&path, b"Rar!").unwrap();
        let tools = ToolPaths {
            unrar: PathBuf::from("/nonexistent/unrar"),
            sevenzip: PathBuf::from("/nonexistent/7z"),
        };
        let err = ComicArchive::open(&path, &tools).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedFormat(_)));
    }
}
