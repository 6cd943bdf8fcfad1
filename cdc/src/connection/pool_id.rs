use std::collections::BTreeMap;
use std::fmt;

/// Identifies one physical connection target.
///
/// Used as the key of [`crate::connection::KeyedConnectionPools`]: two ids are equal when
/// they name the same engine, the same set of hosts, the same user and the same
/// connection-shaping options (TLS mode, read preference, database, ...).
///
/// Hosts are trimmed, lower-cased, sorted and deduplicated on construction, so the order
/// in which a user listed replica set members does not create a second pool. Options
/// live in a sorted map for the same reason. Building an id never performs I/O.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionPoolId {
    engine: &'static str,
    hosts: Vec<String>,
    username: Option<String>,
    options: BTreeMap<String, String>,
}

impl ConnectionPoolId {
    /// Creates an id for `hosts` on `engine`, authenticated as `username`.
    pub fn new<I, S>(engine: &'static str, hosts: I, username: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hosts: Vec<String> = hosts
            .into_iter()
            .map(|host| host.as_ref().trim().to_lowercase())
            .filter(|host| !host.is_empty())
            .collect();
        hosts.sort();
        hosts.dedup();

        Self {
            engine,
            hosts,
            username: username.filter(|username| !username.is_empty()),
            options: BTreeMap::new(),
        }
    }

    /// Adds an option that changes how the underlying client is built.
    ///
    /// A later value for the same key replaces the earlier one.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Adds every `(key, value)` pair of `options`.
    pub fn with_options<I, K, V>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.options
            .extend(options.into_iter().map(|(key, value)| (key.into(), value.into())));
        self
    }

    pub fn engine(&self) -> &'static str {
        self.engine
    }

    /// Returns the normalized host list.
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }
}

impl fmt::Display for ConnectionPoolId {
    /// Renders `engine://[user@]host1,host2[?key=value&...]`. Never includes secrets.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.engine)?;

        if let Some(username) = &self.username {
            write!(f, "{username}@")?;
        }

        f.write_str(&self.hosts.join(","))?;

        for (index, (key, value)) in self.options.iter().enumerate() {
            let separator = if index == 0 { '?' } else { '&' };
            write!(f, "{separator}{key}={value}")?;
        }

        Ok(())
    }
}
