use serde::Serialize;

use crate::error::{Error, Result};

/// One produced workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub file_name: String,
    /// Sheet the file was extracted from.
    pub sheet: String,
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

/// What to do when two sheets sanitize to the same file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Append `_2`, `_3`, ... to the stem of the later file.
    #[default]
    Suffix,
    /// Fail the sheet with [`Error::DuplicateOutputName`].
    Error,
    /// Replace the earlier file, keeping its position.
    Overwrite,
}

/// Produced files keyed by file name, in insertion order.
///
/// File names are compared case-insensitively since the archive and most file systems the
/// outputs land on are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSet {
    files: Vec<OutputFile>,
}

impl OutputSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputFile> {
        self.files.iter()
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|file| file.file_name.as_str())
    }

    pub fn get(&self, file_name: &str) -> Option<&OutputFile> {
        self.position(file_name).map(|idx| &self.files[idx])
    }

    fn position(&self, file_name: &str) -> Option<usize> {
        let wanted = file_name.to_lowercase();
        self.files
            .iter()
            .position(|file| file.file_name.to_lowercase() == wanted)
    }

    /// Add `file`, resolving a name clash according to `policy`. Returns the stored entry, whose
    /// name may differ from the requested one under [`CollisionPolicy::Suffix`].
    pub fn insert(&mut self, mut file: OutputFile, policy: CollisionPolicy) -> Result<&OutputFile> {
        let Some(existing) = self.position(&file.file_name) else {
            self.files.push(file);
            return Ok(&self.files[self.files.len() - 1]);
        };

        match policy {
            CollisionPolicy::Error => Err(Error::DuplicateOutputName {
                file_name: file.file_name,
            }),
            CollisionPolicy::Overwrite => {
                log::debug!(
                    "{} from sheet {:?} replaces the file from sheet {:?}",
                    file.file_name,
                    file.sheet,
                    self.files[existing].sheet
                );
                self.files[existing] = file;
                Ok(&self.files[existing])
            }
            CollisionPolicy::Suffix => {
                let (stem, ext) = match file.file_name.rsplit_once('.') {
                    Some((stem, ext)) => (stem.to_string(), format!(".{ext}")),
                    None => (file.file_name.clone(), String::new()),
                };
                let mut n = 2usize;
                let renamed = loop {
                    let candidate = format!("{stem}_{n}{ext}");
                    if self.position(&candidate).is_none() {
                        break candidate;
                    }
                    n += 1;
                };
                log::debug!("{} is taken, writing sheet {:?} as {renamed}", file.file_name, file.sheet);
                file.file_name = renamed;
                self.files.push(file);
                Ok(&self.files[self.files.len() - 1])
            }
        }
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }
}

impl<'a> IntoIterator for &'a OutputSet {
    type Item = &'a OutputFile;
    type IntoIter = std::slice::Iter<'a, OutputFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}
