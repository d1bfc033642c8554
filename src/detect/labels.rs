use std::path::Path;

use anyhow::{anyhow, Context, Result};

/// Class label list of a detection model, one label per line (e.g. `coco.names`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Labels {
    names: Vec<String>,
}

impl Labels {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(anyhow!("label list is empty"));
        }
        Ok(Self { names })
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let names = raw
            .trim()
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();
        Self::new(names)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read label list {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid label list {}", path.display()))
    }

    /// Position of `name` in the label list.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|label| label == name)
            .ok_or_else(|| anyhow!("label '{}' not found in label list", name))
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_person_index() -> Result<()> {
        let labels = Labels::parse("person\nbicycle\ncar\n")?;
        assert_eq!(labels.index_of("person")?, 0);
        assert_eq!(labels.index_of("car")?, 2);
        assert_eq!(labels.name(1), Some("bicycle"));
        assert_eq!(labels.len(), 3);
        Ok(())
    }

    #[test]
    fn missing_label_is_an_error() -> Result<()> {
        let labels = Labels::parse("cat\ndog")?;
        assert!(labels.index_of("person").is_err());
        Ok(())
    }

    #[test]
    fn empty_list_is_rejected() {
        assert!(Labels::parse("\n \n").is_err());
    }
}
