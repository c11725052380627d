//! Node addressing.
//!
//! A node address has the textual form
//! `[scheme://][language@]path/name[.ext][#revision]`, e.g.
//! `i18n://sv-se@page/title.md#draft`. Parsing keeps absent parts absent;
//! [`Uri::resolve`] fills scheme and language from [`UriDefaults`]. The
//! extension is a content-type discriminator carried by each node and is not
//! part of the node family identity.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use super::error::UriError;

pub const DEFAULT_SCHEME: &str = "i18n";
pub const DEFAULT_LANGUAGE: &str = "sv-se";
pub const DEFAULT_EXTENSION: &str = "txt";

const SCHEME_SEPARATOR: &str = "://";
const DRAFT_FRAGMENT: &str = "draft";

/// Revision selector of a node address.
///
/// Published revisions order numerically; `Draft` sorts after every
/// published revision and never equals one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Revision {
    Published(NonZeroU32),
    Draft,
}

impl Revision {
    pub fn published(number: u32) -> Option<Self> {
        NonZeroU32::new(number).map(Self::Published)
    }

    pub fn number(self) -> Option<u32> {
        match self {
            Self::Published(number) => Some(number.get()),
            Self::Draft => None,
        }
    }

    /// The revision following `latest`, or revision 1 when nothing is published.
    pub fn next_after(latest: Option<u32>) -> Self {
        Self::Published(NonZeroU32::MIN.saturating_add(latest.unwrap_or(0)))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Published(number) => write!(f, "{number}"),
            Self::Draft => f.write_str(DRAFT_FRAGMENT),
        }
    }
}

impl FromStr for Revision {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == DRAFT_FRAGMENT {
            return Ok(Self::Draft);
        }
        value
            .parse::<u32>()
            .ok()
            .and_then(Self::published)
            .ok_or("revision must be `draft` or a positive integer")
    }
}

/// Values applied to parts a caller left out of an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriDefaults {
    pub scheme: String,
    pub language: String,
    pub extension: String,
}

impl Default for UriDefaults {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri {
    scheme: Option<String>,
    language: Option<String>,
    path: String,
    name: String,
    extension: Option<String>,
    revision: Option<Revision>,
}

impl Uri {
    /// Build an address from its mandatory parts.
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Result<Self, UriError> {
        let path = path.into();
        let name = name.into();
        if path.is_empty() {
            return Err(UriError::malformed(format!("{path}/{name}"), "missing path"));
        }
        if name.is_empty() || name.contains(['/', '.', '#']) {
            return Err(UriError::malformed(format!("{path}/{name}"), "invalid name"));
        }
        Ok(Self {
            scheme: None,
            language: None,
            path,
            name,
            extension: None,
            revision: None,
        })
    }

    pub fn parse(value: &str) -> Result<Self, UriError> {
        let raw = value.trim();
        if raw.is_empty() {
            return Err(UriError::malformed(value, "empty uri"));
        }

        let (rest, revision) = match raw.split_once('#') {
            Some((head, fragment)) => {
                let revision = fragment
                    .parse::<Revision>()
                    .map_err(|reason| UriError::malformed(value, reason))?;
                (head, Some(revision))
            }
            None => (raw, None),
        };

        let (scheme, rest) = match rest.split_once(SCHEME_SEPARATOR) {
            Some(("", _)) => return Err(UriError::malformed(value, "missing scheme")),
            Some((scheme, tail)) => (Some(scheme.to_string()), tail),
            None => (None, rest),
        };

        // `@` separates the language only ahead of the path.
        let path_start = rest.find('/').unwrap_or(rest.len());
        let (language, rest) = match rest.find('@').filter(|&at| at < path_start) {
            Some(0) => return Err(UriError::malformed(value, "invalid language")),
            Some(at) => (Some(rest[..at].to_string()), &rest[at + 1..]),
            None => (None, rest),
        };

        let (path, leaf) = rest
            .rsplit_once('/')
            .ok_or_else(|| UriError::malformed(value, "missing path"))?;
        if path.is_empty() {
            return Err(UriError::malformed(value, "missing path"));
        }

        let (name, extension) = match leaf.split_once('.') {
            Some((_, extension)) if extension.is_empty() => {
                return Err(UriError::malformed(value, "empty extension"));
            }
            Some((name, extension)) => (name, Some(extension.to_string())),
            None => (leaf, None),
        };
        if name.is_empty() {
            return Err(UriError::malformed(value, "missing name"));
        }

        Ok(Self {
            scheme,
            language,
            path: path.to_string(),
            name: name.to_string(),
            extension,
            revision,
        })
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    pub fn revision(&self) -> Option<Revision> {
        self.revision
    }

    pub fn with_scheme(&self, scheme: Option<&str>) -> Self {
        Self {
            scheme: scheme.map(str::to_string),
            ..self.clone()
        }
    }

    pub fn with_language(&self, language: Option<&str>) -> Self {
        Self {
            language: language.map(str::to_string),
            ..self.clone()
        }
    }

    pub fn with_extension(&self, extension: Option<&str>) -> Self {
        Self {
            extension: extension.map(str::to_string),
            ..self.clone()
        }
    }

    pub fn with_revision(&self, revision: Option<Revision>) -> Self {
        Self {
            revision,
            ..self.clone()
        }
    }

    /// Keep an explicit extension, otherwise apply `extension`.
    pub fn with_default_extension(&self, extension: &str) -> Self {
        match self.extension {
            Some(_) => self.clone(),
            None => self.with_extension(Some(extension)),
        }
    }

    /// Fill the scheme and language a caller left out.
    pub fn resolve(&self, defaults: &UriDefaults) -> Self {
        Self {
            scheme: Some(
                self.scheme
                    .clone()
                    .unwrap_or_else(|| defaults.scheme.clone()),
            ),
            language: Some(
                self.language
                    .clone()
                    .unwrap_or_else(|| defaults.language.clone()),
            ),
            ..self.clone()
        }
    }

    /// Identity shared by the draft and every published revision of a node.
    pub fn family_key(&self) -> String {
        let mut key = String::new();
        if let Some(scheme) = &self.scheme {
            key.push_str(scheme);
            key.push_str(SCHEME_SEPARATOR);
        }
        if let Some(language) = &self.language {
            key.push_str(language);
            key.push('@');
        }
        key.push_str(&self.path);
        key.push('/');
        key.push_str(&self.name);
        key
    }

    /// Cache key: the family key bound to this address's revision selector.
    pub fn cache_key(&self) -> String {
        match self.revision {
            Some(revision) => format!("{}#{revision}", self.family_key()),
            None => self.family_key(),
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.family_key())?;
        if let Some(extension) = &self.extension {
            write!(f, ".{extension}")?;
        }
        if let Some(revision) = self.revision {
            write!(f, "#{revision}")?;
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = UriError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fully_qualified_uri() {
        let uri = Uri::parse("i18n://sv-se@page/title.md#draft").expect("uri");
        assert_eq!(uri.scheme(), Some("i18n"));
        assert_eq!(uri.language(), Some("sv-se"));
        assert_eq!(uri.path(), "page");
        assert_eq!(uri.name(), "title");
        assert_eq!(uri.extension(), Some("md"));
        assert_eq!(uri.revision(), Some(Revision::Draft));
    }

    #[test]
    fn parses_partial_uri_and_keeps_missing_parts_absent() {
        let uri = Uri::parse("sv-se@rest/label/email").expect("uri");
        assert_eq!(uri.scheme(), None);
        assert_eq!(uri.language(), Some("sv-se"));
        assert_eq!(uri.path(), "rest/label");
        assert_eq!(uri.name(), "email");
        assert_eq!(uri.extension(), None);
        assert_eq!(uri.revision(), None);
    }

    #[test]
    fn at_sign_after_path_belongs_to_name() {
        let uri = Uri::parse("page/a@b").expect("uri");
        assert_eq!(uri.language(), None);
        assert_eq!(uri.path(), "page");
        assert_eq!(uri.name(), "a@b");

        let uri = Uri::parse("sv-se@page/a@b").expect("uri");
        assert_eq!(uri.language(), Some("sv-se"));
        assert_eq!(uri.name(), "a@b");
    }

    #[test]
    fn display_round_trips_parse() {
        for raw in [
            "i18n://sv-se@page/title.md#draft",
            "i18n://sv-se@page/title.txt#12",
            "sv-se@page/title",
            "l10n://page/sub/title.img",
            "page/title#3",
            "page/a@b",
            "sv-se@page/a@b.txt#1",
        ] {
            let uri = Uri::parse(raw).expect("uri");
            assert_eq!(uri.to_string(), raw);
            assert_eq!(Uri::parse(&uri.to_string()).expect("reparse"), uri);
        }
    }

    #[test]
    fn rejects_missing_mandatory_segments() {
        for raw in [
            "",
            "title",
            "://page/title",
            "@page/title",
            "page/",
            "/title",
            "page/.md",
            "page/title.",
            "page/title#0",
            "page/title#latest",
        ] {
            let err = Uri::parse(raw).expect_err(raw);
            assert!(matches!(err, UriError::Malformed { .. }), "{raw}");
        }
    }

    #[test]
    fn resolve_fills_scheme_and_language_only() {
        let defaults = UriDefaults::default();
        let uri = Uri::parse("page/title").expect("uri").resolve(&defaults);
        assert_eq!(uri.to_string(), "i18n://sv-se@page/title");

        let explicit = Uri::parse("l10n://en-us@page/title.md#2")
            .expect("uri")
            .resolve(&defaults);
        assert_eq!(explicit.to_string(), "l10n://en-us@page/title.md#2");
    }

    #[test]
    fn with_revision_returns_new_value() {
        let uri = Uri::parse("i18n://sv-se@page/title.md").expect("uri");
        let draft = uri.with_revision(Some(Revision::Draft));
        assert_eq!(uri.revision(), None);
        assert_eq!(draft.to_string(), "i18n://sv-se@page/title.md#draft");
    }

    #[test]
    fn cache_key_ignores_extension() {
        let md = Uri::parse("i18n://sv-se@page/title.md#draft").expect("uri");
        let bare = Uri::parse("i18n://sv-se@page/title#draft").expect("uri");
        assert_eq!(md.cache_key(), bare.cache_key());
        assert_eq!(md.cache_key(), "i18n://sv-se@page/title#draft");
        assert_eq!(md.family_key(), bare.family_key());
    }

    #[test]
    fn revisions_order_numerically_with_draft_last() {
        let one = Revision::published(1).expect("rev");
        let two = Revision::published(2).expect("rev");
        let ten = Revision::published(10).expect("rev");
        let mut revisions = vec![Revision::Draft, ten, one, two];
        revisions.sort();
        assert_eq!(revisions, vec![one, two, ten, Revision::Draft]);
        assert_ne!(Revision::Draft, one);
    }

    #[test]
    fn next_revision_starts_at_one() {
        assert_eq!(Revision::next_after(None), Revision::published(1).expect("rev"));
        assert_eq!(Revision::next_after(Some(4)), Revision::published(5).expect("rev"));
    }

    #[test]
    fn new_validates_parts() {
        assert!(Uri::new("page", "title").is_ok());
        assert!(Uri::new("", "title").is_err());
        assert!(Uri::new("page", "ti.tle").is_err());
    }
}
