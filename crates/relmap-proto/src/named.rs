//! Named query descriptors.

use serde::{Deserialize, Serialize};

use crate::criteria::Criteria;
use crate::lock::LockOptions;
use crate::options::CacheMode;

/// A query registered under a name, with execution defaults.
///
/// Settings left as `None` keep whatever the stored criteria carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedQueryDescriptor {
    pub name: String,
    pub query: Criteria,
    #[serde(default)]
    pub cacheable: Option<bool>,
    #[serde(default)]
    pub cache_region: Option<String>,
    #[serde(default)]
    pub cache_mode: Option<CacheMode>,
    #[serde(default)]
    pub read_only: Option<bool>,
    #[serde(default)]
    pub lock_options: Option<LockOptions>,
    #[serde(default)]
    pub timeout_secs: Option<u32>,
    #[serde(default)]
    pub fetch_size: Option<u32>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl NamedQueryDescriptor {
    /// Register `query` under `name` with no overrides.
    pub fn new(name: impl Into<String>, query: Criteria) -> Self {
        Self {
            name: name.into(),
            query,
            cacheable: None,
            cache_region: None,
            cache_mode: None,
            read_only: None,
            lock_options: None,
            timeout_secs: None,
            fetch_size: None,
            comment: None,
        }
    }

    /// Mark the query cacheable.
    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = Some(cacheable);
        self
    }

    /// Use a named results cache region.
    pub fn with_cache_region(mut self, region: impl Into<String>) -> Self {
        self.cache_region = Some(region.into());
        self
    }

    /// Set the cache mode.
    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = Some(mode);
        self
    }

    /// Set the lock options.
    pub fn with_lock_options(mut self, lock_options: LockOptions) -> Self {
        self.lock_options = Some(lock_options);
        self
    }

    /// Set the statement timeout.
    pub fn with_timeout_secs(mut self, secs: u32) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Set the fetch size hint.
    pub fn with_fetch_size(mut self, fetch_size: u32) -> Self {
        self.fetch_size = Some(fetch_size);
        self
    }

    /// Set the SQL comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// A copy of this descriptor registered under another name.
    pub fn make_copy(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// The stored criteria with this descriptor's settings applied.
    pub fn to_criteria(&self) -> Criteria {
        let mut criteria = self.query.clone();
        let options = &mut criteria.options;
        if let Some(cacheable) = self.cacheable {
            options.cacheable = cacheable;
        }
        if let Some(region) = &self.cache_region {
            options.result_cache_region = Some(region.clone());
        }
        if let Some(mode) = self.cache_mode {
            options.cache_mode = Some(mode);
        }
        if let Some(lock_options) = &self.lock_options {
            options.lock_options = lock_options.clone();
        }
        if let Some(timeout) = self.timeout_secs {
            options.timeout_secs = Some(timeout);
        }
        if let Some(fetch_size) = self.fetch_size {
            options.fetch_size = Some(fetch_size);
        }
        if let Some(comment) = &self.comment {
            options.comment = Some(comment.clone());
        }
        criteria
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Restriction;
    use crate::lock::LockMode;

    #[test]
    fn test_descriptor_overrides_apply() {
        let descriptor = NamedQueryDescriptor::new(
            "activeCustomers",
            Criteria::new("Customer").add(Restriction::is_true("active")),
        )
        .with_cacheable(true)
        .with_cache_region("customers")
        .with_lock_options(LockOptions::new(LockMode::Read))
        .with_comment("active customers");

        let criteria = descriptor.to_criteria();
        assert!(criteria.options.cacheable);
        assert_eq!(criteria.options.result_cache_region.as_deref(), Some("customers"));
        assert_eq!(criteria.options.lock_options.lock_mode, LockMode::Read);
        assert_eq!(criteria.options.comment.as_deref(), Some("active customers"));
        assert_eq!(criteria.restrictions.len(), 1);
    }

    #[test]
    fn test_make_copy_keeps_settings() {
        let descriptor = NamedQueryDescriptor::new("a", Criteria::new("Customer")).with_fetch_size(50);
        let copy = descriptor.make_copy("b");
        assert_eq!(copy.name, "b");
        assert_eq!(copy.fetch_size, Some(50));
        assert_eq!(copy.query, descriptor.query);
    }
}
