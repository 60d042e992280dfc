//! Nested source inclusion.
//!
//! Only one file is open at a time. Including a file closes its parent and
//! remembers the line to resume at; when the include runs dry the parent is
//! opened again from the top and read forward to that line. No seek offsets
//! are kept.
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines};
use std::path::PathBuf;

use super::error::{AsmError, AsmResult, ErrorKind};

/// Opens sources by name. Names are resolved against whatever root the
/// implementation carries.
pub trait SourceLoader {
    fn open(&self, name: &str) -> io::Result<Box<dyn BufRead>>;
}

/// Loads sources from disk relative to a fixed root directory.
#[derive(Clone, Debug)]
pub struct FileLoader {
    root: PathBuf,
}

impl FileLoader {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        FileLoader { root: root.into() }
    }
}

impl SourceLoader for FileLoader {
    fn open(&self, name: &str) -> io::Result<Box<dyn BufRead>> {
        let file = File::open(self.root.join(name))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Serves sources out of a name -> text map.
#[derive(Clone, Debug, Default)]
pub struct MemoryLoader {
    files: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with(mut self, name: &str, text: &str) -> Self {
        self.files.insert(name.to_owned(), text.to_owned());
        self
    }
}

impl SourceLoader for MemoryLoader {
    fn open(&self, name: &str) -> io::Result<Box<dyn BufRead>> {
        match self.files.get(name) {
            Some(text) => Ok(Box::new(io::Cursor::new(text.clone().into_bytes()))),
            None => Err(io::Error::new(io::ErrorKind::NotFound, format!("no source named `{}`", name))),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FileStackEntry {
    pub filename: String,
    /// Index of the including file; `None` for the root.
    pub parent: Option<usize>,
    /// Zero-based line to resume at once the file being included returns.
    pub start_line: usize,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SourceLine {
    pub file: String,
    /// One-based.
    pub number: usize,
    pub text: String,
}

pub struct IncludeStack<'a> {
    loader: &'a dyn SourceLoader,
    entries: Vec<FileStackEntry>,
    top: Option<usize>,
    reader: Option<Lines<Box<dyn BufRead>>>,
    // Zero-based index of the next line the reader will yield.
    next_index: usize,
}

impl<'a> IncludeStack<'a> {
    pub fn new(loader: &'a dyn SourceLoader) -> Self {
        IncludeStack { loader, entries: Vec::new(), top: None, reader: None, next_index: 0 }
    }

    pub fn entries(&self) -> &[FileStackEntry] {
        &self.entries
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = self.top;
        while let Some(idx) = cursor {
            depth += 1;
            cursor = self.entries[idx].parent;
        }
        depth
    }

    fn on_active_chain(&self, filename: &str) -> bool {
        let mut cursor = self.top;
        while let Some(idx) = cursor {
            if self.entries[idx].filename == filename {
                return true;
            }
            cursor = self.entries[idx].parent;
        }
        false
    }

    /// Switches reading to `filename`. The current file resumes at the line
    /// after the one most recently returned.
    pub fn push(&mut self, filename: &str) -> AsmResult<()> {
        if self.on_active_chain(filename) {
            return Err(AsmError::syntax(format!("`{}` includes itself", filename)));
        }

        let reader = self.open(filename)?;
        if let Some(top) = self.top {
            self.entries[top].start_line = self.next_index;
        }
        self.entries.push(FileStackEntry { filename: filename.to_owned(), parent: self.top, start_line: 0 });
        self.top = Some(self.entries.len() - 1);
        // dropping the old reader closes the parent
        self.reader = Some(reader);
        self.next_index = 0;
        Ok(())
    }

    fn open(&self, filename: &str) -> AsmResult<Lines<Box<dyn BufRead>>> {
        self.loader
            .open(filename)
            .map(|r| r.lines())
            .map_err(|e| AsmError::from(e).in_file(filename))
    }

    /// Reopens the file at `top` and skips forward to its resume line.
    fn resume(&mut self, top: usize) -> AsmResult<()> {
        let entry = &self.entries[top];
        let (filename, start_line) = (entry.filename.clone(), entry.start_line);
        let mut reader = self.open(&filename)?;
        for skipped in 0..start_line {
            match reader.next() {
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(AsmError::from(e).at(skipped + 1, "resume").in_file(&filename)),
                None => break,
            }
        }
        trace!("resuming `{}` at line {}", filename, start_line + 1);
        self.reader = Some(reader);
        self.top = Some(top);
        self.next_index = start_line;
        Ok(())
    }

    /// Returns the next line across the include chain, or `None` once the
    /// root file is exhausted.
    pub fn next_line(&mut self) -> AsmResult<Option<SourceLine>> {
        loop {
            let top = match self.top {
                Some(t) => t,
                None => return Ok(None),
            };

            let next = match self.reader.as_mut() {
                Some(reader) => reader.next(),
                None => None,
            };
            match next {
                Some(Ok(text)) => {
                    self.next_index += 1;
                    return Ok(Some(SourceLine {
                        file: self.entries[top].filename.clone(),
                        number: self.next_index,
                        text,
                    }));
                }
                Some(Err(e)) => {
                    let err = AsmError::new(ErrorKind::Io(e));
                    return Err(err.at(self.next_index + 1, "read").in_file(&self.entries[top].filename));
                }
                None => {
                    self.reader = None;
                    match self.entries[top].parent {
                        Some(parent) => self.resume(parent)?,
                        None => self.top = None,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn drain(stack: &mut IncludeStack) -> Vec<(String, usize, String)> {
        let mut seen = Vec::new();
        while let Some(line) = stack.next_line().unwrap() {
            if let Some(name) = line.text.strip_prefix("include ") {
                seen.push((line.file.clone(), line.number, line.text.clone()));
                stack.push(name).unwrap();
                continue;
            }
            seen.push((line.file, line.number, line.text));
        }
        seen
    }

    #[test]
    fn test_three_level_chain_resumes_once() {
        let loader = MemoryLoader::new()
            .with("a", "a1\ninclude b\na2\na3")
            .with("b", "b1\ninclude c\nb2")
            .with("c", "c1\nc2\nc3\nc4\nc5");
        let mut stack = IncludeStack::new(&loader);
        stack.push("a").unwrap();

        let seen = drain(&mut stack);
        let text: Vec<&str> = seen.iter().map(|(_, _, t)| t.as_str()).collect();
        assert_eq!(
            text,
            vec!["a1", "include b", "b1", "include c", "c1", "c2", "c3", "c4", "c5", "b2", "a2", "a3"]
        );

        // resumed lines keep their own numbering
        assert_eq!(seen[9], ("b".to_owned(), 3, "b2".to_owned()));
        assert_eq!(seen[10], ("a".to_owned(), 3, "a2".to_owned()));

        let entries = stack.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].parent, None);
        assert_eq!(entries[0].start_line, 2);
        assert_eq!(entries[1].parent, Some(0));
        assert_eq!(entries[1].start_line, 2);
        assert_eq!(entries[2].parent, Some(1));
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_include_on_last_line() {
        let loader = MemoryLoader::new().with("a", "a1\ninclude b").with("b", "b1");
        let mut stack = IncludeStack::new(&loader);
        stack.push("a").unwrap();
        let text: Vec<String> = drain(&mut stack).into_iter().map(|(_, _, t)| t).collect();
        assert_eq!(text, vec!["a1", "include b", "b1"]);
    }

    #[test]
    fn test_same_file_twice_and_depth() {
        let loader = MemoryLoader::new().with("a", "include b\ninclude b\nend").with("b", "b1");
        let mut stack = IncludeStack::new(&loader);
        stack.push("a").unwrap();
        assert_eq!(stack.depth(), 1);
        let text: Vec<String> = drain(&mut stack).into_iter().map(|(_, _, t)| t).collect();
        assert_eq!(text, vec!["include b", "b1", "include b", "b1", "end"]);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_recursive_include_rejected() {
        let loader = MemoryLoader::new().with("a", "include b").with("b", "include a");
        let mut stack = IncludeStack::new(&loader);
        stack.push("a").unwrap();
        stack.next_line().unwrap();
        stack.push("b").unwrap();
        stack.next_line().unwrap();
        let err = stack.push("a").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Syntax(_)));
    }

    #[test]
    fn test_missing_file() {
        let loader = MemoryLoader::new();
        let mut stack = IncludeStack::new(&loader);
        let err = stack.push("nope.asm").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Io(_)));
        assert_eq!(err.file.as_deref(), Some("nope.asm"));
    }

    #[test]
    fn test_file_loader() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.asm"), "one\ninclude lib.asm\nthree\n").unwrap();
        fs::write(dir.path().join("lib.asm"), "two\n").unwrap();

        let loader = FileLoader::new(dir.path());
        let mut stack = IncludeStack::new(&loader);
        stack.push("main.asm").unwrap();
        let text: Vec<String> = drain(&mut stack).into_iter().map(|(_, _, t)| t).collect();
        assert_eq!(text, vec!["one", "include lib.asm", "two", "three"]);
    }
}
