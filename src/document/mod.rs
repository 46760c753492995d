//! Markdown document sink.
//!
//! Sections are appended as tables complete, in whatever order that is, so
//! the file on disk always holds every table written so far. The table of
//! contents is only known at the end: [`DocumentSink::finalize`] rewrites the
//! document with a sorted index and the sections in the same order, then
//! swaps the rewritten file in.
//!
//! # Layout
//!
//! ```text
//! # Database Schema Reference        ┐
//! *Generated: ...*                   │ header
//! ## Tables                          │
//!   (empty until finalize)           ┘
//! ## Table Details                   ← detail marker
//! <section HR.EMP>                   ┐
//! <section HR.DEPT>                  │ completion order while streaming,
//! ...                                ┘ index order after finalize
//! ```
//!
//! # Locking
//!
//! The index map and the output file sit behind separate mutexes. Each is
//! held only while recording or appending one table.
//!
//! # Retention
//!
//! With [`ContentRetention::Stream`] only each section's byte span is kept
//! and finalize copies the spans back out of the streamed file. With
//! [`ContentRetention::InMemory`] rendered sections are kept and the
//! streamed file is never re-read.

mod error;
pub mod render;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Local;
use tracing::{debug, info, warn};

pub use error::{DocumentError, DocumentResult};

use crate::metadata::TableMetadata;

/// How section content is kept until finalize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContentRetention {
    /// Keep byte spans; re-read the streamed file at finalize.
    #[default]
    Stream,
    /// Keep rendered sections in memory.
    InMemory,
}

impl ContentRetention {
    pub fn from_flag(retain: bool) -> Self {
        if retain {
            ContentRetention::InMemory
        } else {
            ContentRetention::Stream
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Span {
    offset: u64,
    len: u64,
}

#[derive(Debug)]
struct IndexEntry {
    toc_line: String,
    span: Span,
    content: Option<String>,
}

#[derive(Debug)]
struct Output {
    writer: Option<BufWriter<File>>,
    offset: u64,
    finalized: bool,
    failed: bool,
}

impl Output {
    /// Drop the writer after an I/O error. Bytes may have reached the file
    /// past `offset`, so no later span would line up.
    fn fail(&mut self, error: io::Error) -> DocumentError {
        warn!(error = %error, "document write failed; output disabled");
        self.writer = None;
        self.failed = true;
        DocumentError::Write(error)
    }
}

/// Concurrent writer of the schema document.
#[derive(Debug)]
pub struct DocumentSink {
    path: PathBuf,
    retention: ContentRetention,
    index: Mutex<BTreeMap<(String, String), IndexEntry>>,
    output: Mutex<Output>,
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DocumentSink {
    /// Create (or truncate) the document and write the header with an
    /// empty table of contents.
    pub fn open<P: AsRef<Path>>(path: P, retention: ContentRetention) -> DocumentResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| DocumentError::Create {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);

        let preamble = format!(
            "{}{}",
            render::header("Generated", &timestamp()),
            render::detail_marker()
        );
        writer.write_all(preamble.as_bytes())?;
        writer.flush()?;

        info!(path = %path.display(), ?retention, "document opened");

        Ok(Self {
            path,
            retention,
            index: Mutex::new(BTreeMap::new()),
            output: Mutex::new(Output {
                writer: Some(writer),
                offset: preamble.len() as u64,
                finalized: false,
                failed: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one table's section and record it in the index.
    ///
    /// Safe to call from several threads at once. Writing the same table
    /// twice keeps only the later section in the finalized document.
    pub fn write_table(&self, metadata: &TableMetadata) -> DocumentResult<()> {
        let content = render::section(metadata);

        let span = {
            let mut output = lock(&self.output);
            if output.finalized {
                return Err(DocumentError::Finalized);
            }
            if output.failed {
                return Err(DocumentError::Failed);
            }
            let offset = output.offset;
            let writer = output.writer.as_mut().ok_or(DocumentError::Closed)?;
            let written = writer
                .write_all(content.as_bytes())
                .and_then(|()| writer.flush());
            if let Err(e) = written {
                return Err(output.fail(e));
            }
            output.offset += content.len() as u64;
            Span {
                offset,
                len: content.len() as u64,
            }
        };

        let entry = IndexEntry {
            toc_line: render::toc_entry(&metadata.descriptor),
            span,
            content: match self.retention {
                ContentRetention::InMemory => Some(content),
                ContentRetention::Stream => None,
            },
        };

        let key = metadata.descriptor.sort_key();
        if lock(&self.index).insert(key, entry).is_some() {
            warn!(table = %metadata.descriptor, "table written twice; keeping the latest section");
        }
        debug!(table = %metadata.descriptor, "section written");
        Ok(())
    }

    /// Number of distinct tables recorded so far.
    pub fn table_count(&self) -> usize {
        lock(&self.index).len()
    }

    /// Rewrite the document with a sorted table of contents and sections in
    /// the same order, then replace the original file.
    ///
    /// The rewrite goes to `<path>.final`. If the final rename fails that
    /// file is left in place next to the original and the error names it.
    pub fn finalize(&self) -> DocumentResult<PathBuf> {
        let mut output = lock(&self.output);
        if output.finalized {
            return Err(DocumentError::Finalized);
        }
        if output.failed {
            return Err(DocumentError::Failed);
        }
        let mut writer = output.writer.take().ok_or(DocumentError::Closed)?;
        if let Err(e) = writer.flush() {
            return Err(output.fail(e));
        }
        drop(writer);
        output.finalized = true;

        let index = lock(&self.index);
        let final_path = final_path(&self.path);

        self.write_final(&final_path, &index)
            .map_err(|source| DocumentError::Rewrite {
                path: final_path.clone(),
                source,
            })?;

        if let Err(source) = fs::rename(&final_path, &self.path) {
            warn!(
                final_path = %final_path.display(),
                "could not replace document; rewritten copy left in place"
            );
            return Err(DocumentError::Replace {
                from: final_path,
                to: self.path.clone(),
                source,
            });
        }

        info!(path = %self.path.display(), tables = index.len(), "document finalized");
        Ok(self.path.clone())
    }

    fn write_final(
        &self,
        final_path: &Path,
        index: &BTreeMap<(String, String), IndexEntry>,
    ) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(final_path)?);

        out.write_all(render::header("Updated", &timestamp()).as_bytes())?;
        for entry in index.values() {
            out.write_all(entry.toc_line.as_bytes())?;
        }
        out.write_all(render::detail_marker().as_bytes())?;

        match self.retention {
            ContentRetention::InMemory => {
                for entry in index.values() {
                    if let Some(content) = &entry.content {
                        out.write_all(content.as_bytes())?;
                    }
                }
            }
            ContentRetention::Stream => {
                let mut streamed = File::open(&self.path)?;
                for entry in index.values() {
                    streamed.seek(SeekFrom::Start(entry.span.offset))?;
                    let copied = io::copy(&mut (&mut streamed).take(entry.span.len), &mut out)?;
                    if copied != entry.span.len {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "streamed document is shorter than recorded",
                        ));
                    }
                }
            }
        }

        out.flush()?;
        Ok(())
    }

    /// Flush and release the output file without finalizing.
    ///
    /// The streamed file stays on disk with an empty table of contents.
    pub fn close(&self) -> DocumentResult<()> {
        let mut output = lock(&self.output);
        if let Some(mut writer) = output.writer.take() {
            writer.flush()?;
            debug!(path = %self.path.display(), "document closed");
        }
        Ok(())
    }
}

fn final_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".final");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ColumnDescriptor, TableDescriptor};

    fn table(owner: &str, name: &str) -> TableMetadata {
        let mut metadata = TableMetadata::new(TableDescriptor::new(owner, name));
        metadata.columns = vec![ColumnDescriptor::from_catalog(
            "ID", "INTEGER", None, None, None, false, None, None, 1,
        )];
        metadata
    }

    #[test]
    fn test_final_path() {
        assert_eq!(
            final_path(Path::new("/tmp/schema.md")),
            PathBuf::from("/tmp/schema.md.final")
        );
    }

    #[test]
    fn test_retention_flag() {
        assert_eq!(ContentRetention::from_flag(true), ContentRetention::InMemory);
        assert_eq!(ContentRetention::from_flag(false), ContentRetention::Stream);
        assert_eq!(ContentRetention::default(), ContentRetention::Stream);
    }

    #[test]
    fn test_write_after_finalize_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DocumentSink::open(dir.path().join("doc.md"), ContentRetention::Stream).unwrap();
        sink.write_table(&table("HR", "EMP")).unwrap();
        sink.finalize().unwrap();

        assert!(matches!(
            sink.write_table(&table("HR", "DEPT")),
            Err(DocumentError::Finalized)
        ));
        assert!(matches!(sink.finalize(), Err(DocumentError::Finalized)));
    }

    #[test]
    fn test_duplicate_table_kept_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        let sink = DocumentSink::open(&path, ContentRetention::Stream).unwrap();
        sink.write_table(&table("HR", "EMP")).unwrap();
        sink.write_table(&table("HR", "EMP")).unwrap();
        assert_eq!(sink.table_count(), 1);
        sink.finalize().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("### HR.EMP").count(), 1);
        assert_eq!(text.matches("- [HR.EMP]").count(), 1);
    }

    #[test]
    fn test_write_error_disables_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        let sink = DocumentSink::open(&path, ContentRetention::Stream).unwrap();
        sink.write_table(&table("HR", "DEPT")).unwrap();

        // A read-only handle makes the next flush fail.
        lock(&sink.output).writer = Some(BufWriter::new(File::open(&path).unwrap()));

        assert!(matches!(
            sink.write_table(&table("HR", "EMP")),
            Err(DocumentError::Write(_))
        ));
        assert!(matches!(
            sink.write_table(&table("HR", "JOB")),
            Err(DocumentError::Failed)
        ));
        assert!(matches!(sink.finalize(), Err(DocumentError::Failed)));
        assert_eq!(sink.table_count(), 1);
        assert!(!final_path(&path).exists());
        sink.close().unwrap();
    }

    #[test]
    fn test_close_leaves_streamed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        let sink = DocumentSink::open(&path, ContentRetention::Stream).unwrap();
        sink.write_table(&table("HR", "EMP")).unwrap();
        sink.close().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("*Generated: "));
        assert!(text.contains("### HR.EMP"));
        assert!(!text.contains("- [HR.EMP]"));
        assert!(matches!(sink.finalize(), Err(DocumentError::Closed)));
        assert!(!final_path(&path).exists());
    }
}
