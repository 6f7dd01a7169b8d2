//! Cache key derivation.
//!
//! Keys are plain concatenations: prefix + raw request target. No hashing and
//! no normalization, so two targets that differ only in query order or a
//! trailing slash are separate entries.

/// Appended to a value key to get the key holding its content type.
pub const TYPE_SUFFIX: &str = ":type";
/// Inserted after the prefix to form the backup tier namespace.
pub const DUMP_INFIX: &str = "_dump_";

/// The value key and content-type key of one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierKeys {
    pub value: String,
    pub content_type: String,
}

impl TierKeys {
    fn new(prefix: &str, uri: &str) -> Self {
        let value = format!("{prefix}{uri}");
        let content_type = format!("{value}{TYPE_SUFFIX}");
        Self {
            value,
            content_type,
        }
    }
}

/// Keys of every enabled tier for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    pub primary: TierKeys,
    pub dump: Option<TierKeys>,
}

impl CacheKeys {
    /// Derives keys for `uri` (path plus query string, verbatim).
    ///
    /// # Examples
    ///
    /// ```
    /// use rttp_cache::cache::CacheKeys;
    ///
    /// let keys = CacheKeys::derive("rc:", "/a?x=1", true);
    /// assert_eq!(keys.primary.value, "rc:/a?x=1");
    /// assert_eq!(keys.primary.content_type, "rc:/a?x=1:type");
    /// assert_eq!(keys.dump.unwrap().value, "rc:_dump_/a?x=1");
    /// ```
    pub fn derive(prefix: &str, uri: &str, with_dump: bool) -> Self {
        Self {
            primary: TierKeys::new(prefix, uri),
            dump: with_dump.then(|| TierKeys::new(&format!("{prefix}{DUMP_INFIX}"), uri)),
        }
    }

    /// The tier to read from: the backup tier in dump mode, when it exists.
    pub fn read_tier(&self, dump_mode: bool) -> &TierKeys {
        match (&self.dump, dump_mode) {
            (Some(dump), true) => dump,
            _ => &self.primary,
        }
    }
}
