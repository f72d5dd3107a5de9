use crate::manifest::document::{
    attribute_value, component_spans, ComponentKind, APPLICATION_OPEN, USES_SDK,
};
use crate::pipeline::error::{RepackError, Result};
use std::ops::Range;

const EXPORTED_TRUE: &str = r#" android:exported="true""#;

pub fn sdk_declaration(min_sdk: u32, target_sdk: u32) -> String {
    format!(
        r#"<uses-sdk android:minSdkVersion="{min_sdk}" android:targetSdkVersion="{target_sdk}"/>"#
    )
}

/// Set the API-level declaration to exactly `min_sdk`/`target_sdk`.
///
/// An existing `<uses-sdk>` element is replaced wholesale, so any other
/// attributes it carried (e.g. `maxSdkVersion`) are dropped. Extra
/// declarations after the first are removed. Without one, a declaration is
/// inserted on its own line right before the first `<application` tag.
pub fn patch_sdk_levels(text: &str, min_sdk: u32, target_sdk: u32) -> Result<String> {
    let declaration = sdk_declaration(min_sdk, target_sdk);
    let existing: Vec<Range<usize>> = USES_SDK.find_iter(text).map(|m| m.range()).collect();

    if let Some((first, duplicates)) = existing.split_first() {
        let mut out = String::with_capacity(text.len());
        out.push_str(&text[..first.start]);
        out.push_str(&declaration);
        let mut cursor = first.end;
        for duplicate in duplicates {
            let removal = whole_line(text, duplicate.clone());
            out.push_str(&text[cursor..removal.start]);
            cursor = removal.end;
        }
        out.push_str(&text[cursor..]);
        return Ok(out);
    }

    let application = APPLICATION_OPEN
        .find(text)
        .ok_or_else(|| RepackError::ManifestPatch {
            reason: "no <uses-sdk> element and no <application> element to anchor one".to_string(),
        })?;

    let anchor = application.start();
    let line_start = text[..anchor].rfind('\n').map_or(0, |i| i + 1);
    let indent = &text[line_start..anchor];

    let mut out = String::with_capacity(text.len() + declaration.len() + indent.len() + 1);
    out.push_str(&text[..anchor]);
    out.push_str(&declaration);
    if indent.chars().all(char::is_whitespace) {
        out.push('\n');
        out.push_str(indent);
    }
    out.push_str(&text[anchor..]);
    Ok(out)
}

/// Add `android:exported="true"` to every activity, service and receiver that
/// declares an intent-filter without an explicit export flag. Explicit values
/// are left alone and components without an intent-filter are not touched.
pub fn ensure_exported(text: &str) -> String {
    let mut insert_at: Vec<usize> = ComponentKind::ALL
        .iter()
        .flat_map(|kind| component_spans(text, *kind))
        .filter(|span| span.has_intent_filter(text))
        .filter(|span| attribute_value(span.open_tag(text), "android:exported").is_none())
        .map(|span| span.open.end - 1)
        .collect();

    if insert_at.is_empty() {
        return text.to_string();
    }
    insert_at.sort_unstable();

    let mut out = String::with_capacity(text.len() + insert_at.len() * EXPORTED_TRUE.len());
    let mut cursor = 0;
    for position in insert_at {
        out.push_str(&text[cursor..position]);
        out.push_str(EXPORTED_TRUE);
        cursor = position;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Widen `range` to its full line when nothing else shares that line.
fn whole_line(text: &str, range: Range<usize>) -> Range<usize> {
    let line_start = text[..range.start].rfind('\n').map_or(0, |i| i + 1);
    let line_end = text[range.end..]
        .find('\n')
        .map_or(text.len(), |i| range.end + i + 1);

    let before = &text[line_start..range.start];
    let after = &text[range.end..line_end];
    if before.trim().is_empty() && after.trim().is_empty() {
        line_start..line_end
    } else {
        range
    }
}
