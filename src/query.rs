use url::{Url, form_urlencoded};

/// Decoded query parameters of a page URL.
///
/// Lookup is exact, case-sensitive, and first-occurrence; values are
/// percent-decoded with `+` treated as a space.
#[derive(Clone, Debug, Default)]
pub struct PageQuery {
    pairs: Vec<(String, String)>,
}

impl PageQuery {
    pub fn from_url(url: &Url) -> Self {
        Self::from_query(url.query().unwrap_or(""))
    }

    /// Parses a raw query string (without the leading `?`).
    pub fn from_query(query: &str) -> Self {
        Self {
            pairs: form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    /// Parses the query portion out of a full page URL. An unparseable URL
    /// reads as an empty query.
    pub fn from_page_url(url: &str) -> Self {
        match Url::parse(url) {
            Ok(url) => Self::from_url(&url),
            Err(_) => Self::default(),
        }
    }

    /// First value for `name`, decoded. `None` when the parameter is absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether `name` appears at all, even with an empty value.
    pub fn has(&self, name: &str) -> bool {
        self.pairs.iter().any(|(key, _)| key == name)
    }

    pub(crate) fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|value| !value.is_empty())
    }

    /// First non-empty value among `names`; the alias resolution used for
    /// click identifiers.
    pub(crate) fn first_of(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.get_non_empty(name))
    }
}
