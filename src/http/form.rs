//! Name/value pairs decoded from a POST body or a query string.

use crate::error::WebError;
use std::net::Ipv4Addr;

/// Ordered form fields. Lookups scan linearly and the last match wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    pairs: Vec<(String, String)>,
}

impl Form {
    /// Decodes `application/x-www-form-urlencoded` bytes.
    ///
    /// Pairs are kept in encounter order. More than `max_params` pairs is a
    /// `BadParam` error rather than a silent truncation.
    pub fn parse(raw: &[u8], max_params: usize) -> Result<Self, WebError> {
        let mut pairs = Vec::new();
        for (name, value) in url::form_urlencoded::parse(raw) {
            if pairs.len() == max_params {
                return Err(WebError::BadParam("too many form parameters"));
            }
            pairs.push((name.into_owned(), value.into_owned()));
        }
        Ok(Self { pairs })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// `Ok(None)` when absent, `Err(Format)` when present but not an integer.
    pub fn int(&self, name: &str) -> Result<Option<i64>, WebError> {
        self.value(name)
            .map(|v| {
                v.trim()
                    .parse::<i64>()
                    .map_err(|_| WebError::Format("form value is not an integer"))
            })
            .transpose()
    }

    /// Checkbox semantics: an absent field is `false`.
    pub fn bool(&self, name: &str) -> Result<bool, WebError> {
        let Some(value) = self.value(name) else {
            return Ok(false);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "on" | "true" | "yes" | "1" => Ok(true),
            "off" | "false" | "no" | "0" | "" => Ok(false),
            _ => Err(WebError::Format("form value is not a boolean")),
        }
    }

    /// `Ok(None)` when absent, `Err(Format)` when not a dotted IPv4 address.
    pub fn ipaddr(&self, name: &str) -> Result<Option<Ipv4Addr>, WebError> {
        self.value(name)
            .map(|v| {
                v.trim()
                    .parse::<Ipv4Addr>()
                    .map_err(|_| WebError::Format("form value is not an IPv4 address"))
            })
            .transpose()
    }
}
