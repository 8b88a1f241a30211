//! Package URL (PURL) parsing for the two ecosystems this workspace cares
//! about: `npm` and `pypi`.
//!
//! PURLs are opaque identifiers of the form
//! `pkg:<ecosystem>/<name>@<version>[?<qualifiers>]`. For `npm`, a scoped
//! package's scope is folded into `name` as a single `@scope/name` segment
//! rather than modeled as a separate PURL namespace component (the on-disk
//! `@scope/name` directory layout is recovered via [`Purl::npm_scope_and_name`]).
//! For `pypi`, qualifiers (e.g. `?artifact_id=...`) refine a distribution but
//! are stripped before matching against the filesystem.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;
use std::sync::OnceLock;

const QUALIFIER_ENCODE_SET: &AsciiSet = &CONTROLS.add(b'&').add(b'=').add(b'?').add(b'#');

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ecosystem {
    Npm,
    Pypi,
}

impl Ecosystem {
    fn as_str(self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::Pypi => "pypi",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PurlError {
    #[error("not a purl: missing \"pkg:\" scheme in {0:?}")]
    MissingScheme(String),
    #[error("unsupported ecosystem {0:?}, expected npm or pypi")]
    UnsupportedEcosystem(String),
    #[error("purl {0:?} is missing a name")]
    MissingName(String),
    #[error("purl {0:?} is missing a version (expected name@version)")]
    MissingVersion(String),
    #[error("purl {0:?} has a malformed qualifier segment")]
    MalformedQualifier(String),
}

/// A parsed Package URL: `pkg:<ecosystem>/<name>@<version>[?<qualifiers>]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Purl {
    ecosystem: Ecosystem,
    name: String,
    version: String,
    qualifiers: BTreeMap<String, String>,
}

impl Purl {
    pub fn new(
        ecosystem: Ecosystem,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            ecosystem,
            name: name.into(),
            version: version.into(),
            qualifiers: BTreeMap::new(),
        }
    }

    pub fn with_qualifiers(mut self, qualifiers: BTreeMap<String, String>) -> Self {
        self.qualifiers = qualifiers;
        self
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.ecosystem
    }

    /// The name segment as it appears in the PURL. For npm, this may include
    /// a leading `@scope/` component.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn qualifiers(&self) -> &BTreeMap<String, String> {
        &self.qualifiers
    }

    /// Returns `true` if this PURL carries qualifiers.
    pub fn is_qualified(&self) -> bool {
        !self.qualifiers.is_empty()
    }

    /// The base PURL: identical but with qualifiers stripped. Multiple
    /// qualified variants (PyPI) share one base PURL.
    pub fn base(&self) -> Purl {
        Purl {
            ecosystem: self.ecosystem,
            name: self.name.clone(),
            version: self.version.clone(),
            qualifiers: BTreeMap::new(),
        }
    }

    /// Split an npm `name` into its scope (without the leading `@`) and bare
    /// package name. Unscoped packages return `(None, name)`.
    pub fn npm_scope_and_name(&self) -> (Option<&str>, &str) {
        debug_assert_eq!(self.ecosystem, Ecosystem::Npm);
        if let Some(rest) = self.name.strip_prefix('@') {
            if let Some((scope, name)) = rest.split_once('/') {
                return (Some(scope), name);
            }
        }
        (None, self.name.as_str())
    }
}

impl fmt::Display for Purl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pkg:{}/{}@{}", self.ecosystem, self.name, self.version)?;
        if !self.qualifiers.is_empty() {
            f.write_str("?")?;
            for (i, (key, value)) in self.qualifiers.iter().enumerate() {
                if i > 0 {
                    f.write_str("&")?;
                }
                write!(
                    f,
                    "{key}={}",
                    utf8_percent_encode(value, QUALIFIER_ENCODE_SET)
                )?;
            }
        }
        Ok(())
    }
}

impl FromStr for Purl {
    type Err = PurlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(rest) = s.strip_prefix("pkg:") else {
            return Err(PurlError::MissingScheme(s.to_string()));
        };
        let Some((ecosystem_str, rest)) = rest.split_once('/') else {
            return Err(PurlError::UnsupportedEcosystem(String::new()));
        };
        let ecosystem = match ecosystem_str {
            "npm" => Ecosystem::Npm,
            "pypi" => Ecosystem::Pypi,
            other => return Err(PurlError::UnsupportedEcosystem(other.to_string())),
        };

        let (body, qualifier_str) = match rest.split_once('?') {
            Some((body, q)) => (body, Some(q)),
            None => (rest, None),
        };

        if body.is_empty() {
            return Err(PurlError::MissingName(s.to_string()));
        }

        let Some((name, version)) = body.rsplit_once('@') else {
            return Err(PurlError::MissingVersion(s.to_string()));
        };
        if name.is_empty() {
            return Err(PurlError::MissingName(s.to_string()));
        }
        if version.is_empty() {
            return Err(PurlError::MissingVersion(s.to_string()));
        }

        let mut qualifiers = BTreeMap::new();
        if let Some(qualifier_str) = qualifier_str {
            for pair in qualifier_str.split('&') {
                if pair.is_empty() {
                    continue;
                }
                let Some((key, value)) = pair.split_once('=') else {
                    return Err(PurlError::MalformedQualifier(s.to_string()));
                };
                let value = percent_decode_str(value)
                    .decode_utf8()
                    .map_err(|_| PurlError::MalformedQualifier(s.to_string()))?
                    .into_owned();
                qualifiers.insert(key.to_string(), value);
            }
        }

        Ok(Purl {
            ecosystem,
            name: name.to_string(),
            version: version.to_string(),
            qualifiers,
        })
    }
}

impl serde::Serialize for Purl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Purl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Purl::from_str(&s).map_err(serde::de::Error::custom)
    }
}

fn pep503_collapse_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-_.]+").unwrap())
}

/// PEP 503 name canonicalization: lowercase, collapse runs of `-`, `_`, `.`
/// into a single `-`. Idempotent and invariant under substitution of those
/// three separator characters.
pub fn canonicalize_pypi_name(name: &str) -> String {
    pep503_collapse_re()
        .replace_all(name.trim(), "-")
        .to_lowercase()
}

/// Returns `true` if `candidate` is an identifier (as opposed to a PURL):
/// the selector convention used by the rollback driver is "starts with
/// `pkg:` is a PURL, otherwise a UUID".
pub fn looks_like_purl(candidate: &str) -> bool {
    candidate.starts_with("pkg:")
}
