use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Class names, indexed in the same order as the model's output scores.
#[derive(Debug, Clone)]
pub struct Labels {
    names: Vec<String>,
}

impl Labels {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::LabelsIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let names: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();

        if names.is_empty() {
            return Err(Error::Labels);
        }

        Ok(Self { names })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_trims_and_skips_blank_lines() {
        let labels = Labels::parse("Salmon \r\n\n  Trout\nRed Mullet\n\n").unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.get(0), Some("Salmon"));
        assert_eq!(labels.get(1), Some("Trout"));
        assert_eq!(labels.get(2), Some("Red Mullet"));
        assert_eq!(labels.get(3), None);
    }

    #[test]
    fn empty_labels_are_rejected() {
        assert!(matches!(Labels::parse("\n  \n"), Err(Error::Labels)));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Black Sea Sprat\nGilt-Head Bream").unwrap();

        let labels = Labels::load(file.path()).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get(1), Some("Gilt-Head Bream"));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("classes.txt");
        assert!(matches!(
            Labels::load(&missing),
            Err(Error::LabelsIo { path, .. }) if path == missing
        ));
    }
}
