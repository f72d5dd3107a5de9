//! Read-only view over decoded (textual) `AndroidManifest.xml`.
//!
//! The manifest is never rebuilt from a tree; every field here is derived
//! from anchored patterns over the original text so edits elsewhere keep
//! the exact bytes the rebuild tool expects.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::ops::Range;

static ACTIVITY_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<activity(?:\s[^>]*)?>").expect("valid regex"));
static SERVICE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<service(?:\s[^>]*)?>").expect("valid regex"));
static RECEIVER_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<receiver(?:\s[^>]*)?>").expect("valid regex"));
static ACTIVITY_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</activity\s*>").expect("valid regex"));
static SERVICE_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</service\s*>").expect("valid regex"));
static RECEIVER_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</receiver\s*>").expect("valid regex"));

pub(crate) static USES_SDK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<uses-sdk(?:\s[^>]*?)?(?:/>|>.*?</uses-sdk\s*>)").expect("valid regex")
});
pub(crate) static APPLICATION_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<application(?:\s[^>]*)?>").expect("valid regex"));
static MANIFEST_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<manifest(?:\s[^>]*)?>").expect("valid regex"));

pub(crate) const INTENT_FILTER: &str = "<intent-filter";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Activity,
    Service,
    Receiver,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 3] = [
        ComponentKind::Activity,
        ComponentKind::Service,
        ComponentKind::Receiver,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            ComponentKind::Activity => "activity",
            ComponentKind::Service => "service",
            ComponentKind::Receiver => "receiver",
        }
    }

    fn open_pattern(self) -> &'static Regex {
        match self {
            ComponentKind::Activity => &*ACTIVITY_OPEN,
            ComponentKind::Service => &*SERVICE_OPEN,
            ComponentKind::Receiver => &*RECEIVER_OPEN,
        }
    }

    fn close_pattern(self) -> &'static Regex {
        match self {
            ComponentKind::Activity => &*ACTIVITY_CLOSE,
            ComponentKind::Service => &*SERVICE_CLOSE,
            ComponentKind::Receiver => &*RECEIVER_CLOSE,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Byte ranges of one component element inside the manifest text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ComponentSpan {
    pub kind: ComponentKind,
    /// The opening tag, `<` through `>`.
    pub open: Range<usize>,
    /// Content between the opening tag and its closing tag. `None` for
    /// self-closing elements or when no closing tag follows.
    pub body: Option<Range<usize>>,
}

impl ComponentSpan {
    pub fn open_tag<'a>(&self, text: &'a str) -> &'a str {
        &text[self.open.clone()]
    }

    pub fn has_intent_filter(&self, text: &str) -> bool {
        self.body
            .as_ref()
            .is_some_and(|body| text[body.clone()].contains(INTENT_FILTER))
    }
}

/// Every element of `kind`, in document order. Each opening tag is paired with
/// the first closing tag of the same kind that follows it; components never
/// nest inside a component of the same kind.
pub(crate) fn component_spans(text: &str, kind: ComponentKind) -> Vec<ComponentSpan> {
    kind.open_pattern()
        .find_iter(text)
        .map(|open| {
            let body = if open.as_str().ends_with("/>") {
                None
            } else {
                kind.close_pattern()
                    .find_at(text, open.end())
                    .map(|close| open.end()..close.start())
            };
            ComponentSpan {
                kind,
                open: open.range(),
                body,
            }
        })
        .collect()
}

/// Value of `attr` inside a single opening tag.
pub(crate) fn attribute_value(tag: &str, attr: &str) -> Option<String> {
    let pattern = format!(r#"\b{}\s*=\s*(?:"([^"]*)"|'([^']*)')"#, regex::escape(attr));
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(tag)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    pub name: String,
    pub kind: ComponentKind,
    pub has_intent_filter: bool,
    /// Raw value of an explicit `android:exported`, if present.
    pub exported: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDocument {
    text: String,
    pub package: Option<String>,
    pub min_sdk: Option<u32>,
    pub target_sdk: Option<u32>,
    pub sdk_declarations: usize,
    pub components: Vec<Component>,
}

impl ManifestDocument {
    pub fn parse(text: impl Into<String>) -> Self {
        let text = text.into();

        let package = MANIFEST_OPEN
            .find(&text)
            .and_then(|tag| attribute_value(tag.as_str(), "package"));

        let sdk_matches: Vec<_> = USES_SDK.find_iter(&text).collect();
        let sdk_tag = sdk_matches.first().map(|m| m.as_str());
        let min_sdk = sdk_tag
            .and_then(|tag| attribute_value(tag, "android:minSdkVersion"))
            .and_then(|v| v.parse().ok());
        let target_sdk = sdk_tag
            .and_then(|tag| attribute_value(tag, "android:targetSdkVersion"))
            .and_then(|v| v.parse().ok());

        let mut spans: Vec<ComponentSpan> = ComponentKind::ALL
            .iter()
            .flat_map(|kind| component_spans(&text, *kind))
            .collect();
        spans.sort_by_key(|span| span.open.start);

        let components = spans
            .iter()
            .map(|span| {
                let tag = span.open_tag(&text);
                Component {
                    name: attribute_value(tag, "android:name").unwrap_or_default(),
                    kind: span.kind,
                    has_intent_filter: span.has_intent_filter(&text),
                    exported: attribute_value(tag, "android:exported"),
                }
            })
            .collect();

        Self {
            package,
            min_sdk,
            target_sdk,
            sdk_declarations: sdk_matches.len(),
            components,
            text,
        }
    }

    pub fn has_application(&self) -> bool {
        APPLICATION_OPEN.is_match(&self.text)
    }

    /// Fully qualified class name for a manifest component name.
    pub fn qualify(&self, name: &str) -> String {
        match (name.strip_prefix('.'), &self.package) {
            (Some(relative), Some(package)) => format!("{package}.{relative}"),
            (Some(relative), None) => relative.to_string(),
            (None, Some(package)) if !name.contains('.') => format!("{package}.{name}"),
            (None, _) => name.to_string(),
        }
    }

    /// Whether any component already names `name`, comparing qualified forms.
    pub fn references_component(&self, name: &str) -> bool {
        let wanted = self.qualify(name);
        self.components
            .iter()
            .any(|c| c.name == name || self.qualify(&c.name) == wanted)
    }

    /// Components that declare an intent-filter but carry no explicit export flag.
    pub fn unexported_intent_components(&self) -> Vec<&Component> {
        self.components
            .iter()
            .filter(|c| c.has_intent_filter && c.exported.is_none())
            .collect()
    }
}
