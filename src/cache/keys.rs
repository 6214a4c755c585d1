//! Cache key definitions.
//!
//! Every key lives under a configurable namespace:
//!
//! - `{ns}:{collection}:g{generation}:{route}[?{query}]` for listings,
//! - `{ns}:generation:{collection}` for the collection generation counter.
//!
//! The generation counter sits outside the collection prefix, so deleting
//! everything under the prefix never resets it.

use std::fmt;

use url::form_urlencoded;

/// A cached collection. Any mutation of a member invalidates every listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Items,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Items => "items",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical identity of a cacheable read: route plus effective parameters.
///
/// Parameters are kept sorted by name then value, so insertion order never
/// changes the derived key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    route: String,
    params: Vec<(String, String)>,
}

impl RequestKey {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            params: Vec::new(),
        }
    }

    /// Builds a key from a raw `a=1&b=2` query string.
    pub fn from_query(route: impl Into<String>, raw_query: &str) -> Self {
        form_urlencoded::parse(raw_query.as_bytes())
            .fold(Self::new(route), |key, (name, value)| {
                key.with_param(name.as_ref(), value.as_ref())
            })
    }

    pub fn with_param(mut self, name: &str, value: impl ToString) -> Self {
        let pair = (name.to_string(), value.to_string());
        let position = self
            .params
            .binary_search(&pair)
            .unwrap_or_else(|position| position);
        self.params.insert(position, pair);
        self
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// `route` or `route?name=value&...` with form-url-encoded parameters.
    pub fn canonical(&self) -> String {
        if self.params.is_empty() {
            return self.route.clone();
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish();
        format!("{}?{}", self.route, query)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    namespace: String,
}

impl KeySpace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Prefix shared by every listing of `collection`, across generations.
    pub fn collection_prefix(&self, collection: Collection) -> String {
        format!("{}:{}:", self.namespace, collection.as_str())
    }

    pub fn generation_key(&self, collection: Collection) -> String {
        format!("{}:generation:{}", self.namespace, collection.as_str())
    }

    pub fn listing_key(
        &self,
        collection: Collection,
        generation: u64,
        request: &RequestKey,
    ) -> String {
        format!(
            "{}g{generation}:{}",
            self.collection_prefix(collection),
            request.canonical()
        )
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("cache")
    }
}
