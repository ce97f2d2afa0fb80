//! Document and collection assembly.
//!
//! Both modes share one pipeline skeleton: list → filter → read → validate
//! → normalize path → emit. Concatenated mode produces a single
//! multi-document string with a manifest header block per file; collection
//! mode produces a lazy sequence of [`YamlFile`] records, optionally led by
//! a generated `manifest.yaml` record. Either way an assembly is
//! all-or-nothing: the first read or parse failure aborts it.

use crate::error::AssemblyError;
use crate::listing::filter_listing;
use crate::models::{FilePathIdentifier, Source, YamlFile};
use crate::reader::SourceReader;
use crate::yaml;

/// Name of the generated collection-mode manifest record.
pub const MANIFEST_FILENAME: &str = "manifest.yaml";

/// Wrap one payload in the fixed YAML document delimiters.
fn frame(payload: &str) -> String {
    format!("---\n{payload}\n...")
}

/// Collection-mode manifest body: one `- <path>` line per path, empty for
/// an empty selection.
pub fn manifest_content(paths: &[String]) -> String {
    paths
        .iter()
        .map(|path| format!("- {path}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Concatenated-stream mode over already-assembled file records: per file,
/// a framed identifier block (path + content hash) followed by a framed
/// block of the trimmed content, all joined with newlines.
pub fn concatenate(files: &[YamlFile]) -> String {
    let mut blocks = Vec::with_capacity(files.len() * 2);
    for file in files {
        let identifier = FilePathIdentifier::for_content(&file.path, &file.content);
        blocks.push(frame(&identifier.to_string()));
        blocks.push(frame(file.content.trim()));
    }
    blocks.join("\n")
}

/// List, filter, read, and validate one source's files, emitting them as a
/// single concatenated multi-document string.
pub fn assemble_documents(
    reader: &dyn SourceReader,
    source: &Source,
    extensions: &[String],
) -> Result<String, AssemblyError> {
    let base = reader.base_path(source);
    let listing = reader.list(source)?;
    let paths = filter_listing(&listing, &base, extensions);
    let files = YamlFileStream::new(reader, base, paths, None)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(concatenate(&files))
}

/// Lazy collection-mode sequence of validated [`YamlFile`] records.
///
/// When constructed with manifest paths, the manifest record is yielded
/// before any file, even for an empty path list. A failed read or parse
/// is yielded as the error item and ends the sequence; consumers observe
/// the failure mid-iteration instead of a clean end.
pub struct YamlFileStream<'a> {
    reader: &'a dyn SourceReader,
    base: String,
    paths: std::vec::IntoIter<String>,
    manifest: Option<Vec<String>>,
    halted: bool,
}

impl<'a> YamlFileStream<'a> {
    pub fn new(
        reader: &'a dyn SourceReader,
        base: impl Into<String>,
        paths: Vec<String>,
        manifest: Option<Vec<String>>,
    ) -> Self {
        Self {
            reader,
            base: base.into(),
            paths: paths.into_iter(),
            manifest,
            halted: false,
        }
    }

    fn next_file(&mut self, relative: &str) -> Result<YamlFile, AssemblyError> {
        let content = self.reader.read(&join_under(&self.base, relative))?;
        yaml::validate(relative, &content)?;
        Ok(YamlFile {
            path: relative.to_string(),
            content,
        })
    }
}

impl Iterator for YamlFileStream<'_> {
    type Item = Result<YamlFile, AssemblyError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.halted {
            return None;
        }

        if let Some(paths) = self.manifest.take() {
            return Some(Ok(YamlFile {
                path: MANIFEST_FILENAME.to_string(),
                content: manifest_content(&paths),
            }));
        }

        let relative = self.paths.next()?;
        let item = self.next_file(&relative);
        if item.is_err() {
            self.halted = true;
        }
        Some(item)
    }
}

/// Resolve a source-relative path back to a store path. Paths the filter
/// passed through unchanged (absolute, outside the base) are used as-is.
fn join_under(base: &str, relative: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.is_empty() || relative.starts_with('/') {
        relative.to_string()
    } else {
        format!("{trimmed}/{relative}")
    }
}
