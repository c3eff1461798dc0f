//! Quality ladder
//!
//! Static ordered list of renditions for one logical media item, lowest
//! quality first. Upgrades move to `index + 1`, downgrades to `index - 1`.

use crate::config::QualitySource;
use crate::error::{Error, Result};
use panomp_common::QualityDescriptor;
use std::collections::HashSet;

/// Immutable rendition list
#[derive(Debug, Clone)]
pub struct QualityLadder {
    qualities: Vec<QualityDescriptor>,
}

impl QualityLadder {
    /// Build from descriptors, lowest first
    ///
    /// Fails with `InvalidConfiguration` on an empty list or duplicate ids.
    pub fn new(qualities: Vec<QualityDescriptor>) -> Result<Self> {
        if qualities.is_empty() {
            return Err(Error::InvalidConfiguration(
                "quality ladder is empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for q in &qualities {
            if !seen.insert(q.id.as_str()) {
                return Err(Error::InvalidConfiguration(format!(
                    "duplicate quality id '{}'",
                    q.id
                )));
            }
        }

        Ok(Self { qualities })
    }

    /// Build from a configuration source
    pub fn from_source(source: QualitySource) -> Result<Self> {
        Self::new(source.into_descriptors())
    }

    /// Build from bare URLs
    pub fn from_urls<I, S>(urls: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            urls.into_iter()
                .enumerate()
                .map(|(i, url)| QualityDescriptor::from_url(i, url))
                .collect(),
        )
    }

    /// Number of renditions (always >= 1)
    pub fn count(&self) -> usize {
        self.qualities.len()
    }

    /// Descriptor at `index`
    pub fn get(&self, index: usize) -> Option<&QualityDescriptor> {
        self.qualities.get(index)
    }

    /// Ladder position of `descriptor`, matched by id
    pub fn index_of(&self, descriptor: &QualityDescriptor) -> Option<usize> {
        self.qualities.iter().position(|q| q.id == descriptor.id)
    }

    /// Check a manual index against the ladder
    pub fn check_index(&self, index: usize) -> Result<()> {
        if index < self.qualities.len() {
            Ok(())
        } else {
            Err(Error::QualityOutOfBounds {
                index,
                count: self.qualities.len(),
            })
        }
    }

    pub fn highest_index(&self) -> usize {
        self.qualities.len() - 1
    }

    pub fn iter(&self) -> impl Iterator<Item = &QualityDescriptor> {
        self.qualities.iter()
    }

    pub fn to_vec(&self) -> Vec<QualityDescriptor> {
        self.qualities.clone()
    }
}
