//! Directory line iteration.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::error::SourceError;

/// Iterates the lines of all files below a directory.
///
/// Files are selected by name: when accept patterns are present a file must
/// match at least one, and it must match none of the refuse patterns. Files
/// are visited in path order and read lazily, one at a time.
#[derive(Debug, Clone)]
pub struct DirLineSource {
    root: PathBuf,
    max_depth: Option<usize>,
    accept: Vec<Regex>,
    refuse: Vec<Regex>,
}

impl DirLineSource {
    /// Creates a source over every file below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_depth: None,
            accept: Vec::new(),
            refuse: Vec::new(),
        }
    }

    /// Limits how deep below the root files are collected (1 = direct children).
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Adds a file name pattern that selects files.
    pub fn accept(mut self, pattern: &str) -> Result<Self, SourceError> {
        self.accept.push(Regex::new(pattern)?);
        Ok(self)
    }

    /// Adds a file name pattern that excludes files.
    pub fn refuse(mut self, pattern: &str) -> Result<Self, SourceError> {
        self.refuse.push(Regex::new(pattern)?);
        Ok(self)
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists the selected files in path order.
    pub fn files(&self) -> Result<Vec<PathBuf>, SourceError> {
        let mut walker = WalkDir::new(&self.root).sort_by_file_name();
        if let Some(depth) = self.max_depth {
            walker = walker.max_depth(depth);
        }

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let selected = self.is_selected(&entry.file_name().to_string_lossy());
            if selected {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    /// Returns a lazy iterator over every line of the selected files.
    pub fn lines(&self) -> Result<DirLines, SourceError> {
        let files = self.files()?;
        tracing::debug!(
            root = %self.root.display(),
            files = files.len(),
            "Collected files for line iteration"
        );
        Ok(DirLines {
            files: files.into(),
            current: None,
        })
    }

    /// Returns a lazy iterator of records parsed from every line.
    ///
    /// Lines the parser rejects are skipped. I/O errors are yielded.
    pub fn records<T, F>(
        &self,
        mut parse: F,
    ) -> Result<impl Iterator<Item = Result<T, SourceError>>, SourceError>
    where
        F: FnMut(&str) -> Option<T>,
    {
        let lines = self.lines()?;
        Ok(lines.filter_map(move |line| match line {
            Ok(line) => {
                let record = parse(&line);
                if record.is_none() {
                    tracing::trace!(line = %line, "Skipping unparseable line");
                }
                record.map(Ok)
            }
            Err(e) => Some(Err(e)),
        }))
    }

    fn is_selected(&self, name: &str) -> bool {
        let accepted = self.accept.is_empty() || self.accept.iter().any(|p| p.is_match(name));
        accepted && !self.refuse.iter().any(|p| p.is_match(name))
    }
}

/// Lazy line iterator returned by [`DirLineSource::lines`].
pub struct DirLines {
    files: VecDeque<PathBuf>,
    current: Option<Lines<BufReader<File>>>,
}

impl Iterator for DirLines {
    type Item = Result<String, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(lines) = self.current.as_mut() {
                match lines.next() {
                    Some(line) => return Some(line.map_err(SourceError::from)),
                    None => self.current = None,
                }
            }

            let path = self.files.pop_front()?;
            match File::open(&path) {
                Ok(file) => self.current = Some(BufReader::new(file).lines()),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
