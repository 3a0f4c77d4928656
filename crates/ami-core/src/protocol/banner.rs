//! The one-line greeting sent by the server on connect,
//! e.g. `Asterisk Call Manager/6.0.0`.

use std::fmt;

/// A parsed greeting line: `<product>/<version>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerBanner {
    product: String,
    version: Option<String>,
}

impl ManagerBanner {
    /// Parses `line`, returning `None` unless it contains `marker`.
    ///
    /// The version is whatever follows the last `/`; a greeting without one
    /// is still accepted.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ami_core::protocol::ManagerBanner;
    ///
    /// let banner = ManagerBanner::parse("Asterisk Call Manager/6.0.0", "Asterisk").unwrap();
    /// assert_eq!(banner.product(), "Asterisk Call Manager");
    /// assert_eq!(banner.version(), Some("6.0.0"));
    /// assert!(ManagerBanner::parse("SSH-2.0-OpenSSH_9.6", "Asterisk").is_none());
    /// ```
    pub fn parse(line: &str, marker: &str) -> Option<Self> {
        let line = line.trim();
        if !line.contains(marker) {
            return None;
        }
        let (product, version) = match line.rsplit_once('/') {
            Some((product, version)) if !version.is_empty() => {
                (product.trim(), Some(version.trim().to_string()))
            }
            _ => (line, None),
        };
        Some(Self {
            product: product.to_string(),
            version,
        })
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

impl fmt::Display for ManagerBanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}/{}", self.product, version),
            None => f.write_str(&self.product),
        }
    }
}
