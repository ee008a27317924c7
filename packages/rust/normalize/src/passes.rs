//! Individual normalization passes.
//!
//! Each pass is a function `&str -> String`. [`crate::normalize`] applies
//! them in a fixed order; none of them is ever written back to a note.

use std::sync::LazyLock;

use regex::{Captures, Regex};

// ---------------------------------------------------------------------------
// Pass 1: Strip HTML, keeping media file names
// ---------------------------------------------------------------------------

/// Remove markup while keeping the text and the names of referenced media.
///
/// `<img src="cat.jpg">` and `[sound:meow.mp3]` become ` cat.jpg ` and
/// ` meow.mp3 `, so two fields that differ only by an attached file still
/// compare as different.
pub(crate) fn strip_html(s: &str) -> String {
    static STYLE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").expect("valid regex"));
    static SCRIPT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("valid regex"));
    static COMMENT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
    static IMG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?i)<img\b[^>]*?\bsrc\s*=\s*["']?([^"'\s>]+)["']?[^>]*>"#)
            .expect("valid regex")
    });
    static SOUND_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[sound:([^\]]+)\]").expect("valid regex"));
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

    let s = STYLE_RE.replace_all(s, "");
    let s = SCRIPT_RE.replace_all(&s, "");
    let s = COMMENT_RE.replace_all(&s, "");
    let s = IMG_RE.replace_all(&s, " ${1} ");
    let s = SOUND_RE.replace_all(&s, " ${1} ");
    let s = TAG_RE.replace_all(&s, "");

    decode_entities(&s)
}

/// Decode the named entities editors commonly emit, plus numeric ones.
/// Unknown entities are left as they are.
fn decode_entities(s: &str) -> String {
    static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+);").expect("valid regex")
    });

    ENTITY_RE
        .replace_all(s, |caps: &Captures| {
            let body = &caps[1];
            let decoded = match body {
                "nbsp" => Some(' '),
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => numeric_entity(body),
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn numeric_entity(body: &str) -> Option<char> {
    let digits = body.strip_prefix('#')?;
    let code = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    char::from_u32(code)
}

// ---------------------------------------------------------------------------
// Pass 2: Strip furigana
// ---------------------------------------------------------------------------

/// Drop ruby readings written as `漢字[かんじ]`, keeping the base text.
pub(crate) fn strip_furigana(s: &str) -> String {
    static FURIGANA_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r" ?([^ >\[\]]+?)\[([^\]]+)\]").expect("valid regex"));

    FURIGANA_RE
        .replace_all(s, |caps: &Captures| {
            // `[sound:x]` is a media reference, not a reading.
            if caps[2].starts_with("sound:") {
                caps[0].to_string()
            } else {
                caps[1].to_string()
            }
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Pass 3: Strip punctuation
// ---------------------------------------------------------------------------

/// Remove every character that appears in `punctuation`.
pub(crate) fn strip_punctuation(s: &str, punctuation: &str) -> String {
    if punctuation.is_empty() {
        return s.to_string();
    }
    s.chars().filter(|c| !punctuation.contains(*c)).collect()
}

// ---------------------------------------------------------------------------
// Pass 4: Fold full-width digits
// ---------------------------------------------------------------------------

/// Map `０`..`９` to `0`..`9`.
pub(crate) fn fold_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            _ => c,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_removes_tags() {
        assert_eq!(strip_html("<b>Hello</b> <i>world</i>"), "Hello world");
        assert_eq!(strip_html("<div class=\"x\">a<br/>b</div>"), "ab");
    }

    #[test]
    fn strip_html_keeps_media_names() {
        let result = strip_html(r#"dog<img src="dog.jpg">"#);
        assert_eq!(result, "dog dog.jpg ");
        let result = strip_html("[sound:bark.mp3]");
        assert_eq!(result, " bark.mp3 ");
    }

    #[test]
    fn strip_html_drops_style_and_comments() {
        let input = "<style>.a { color: red }</style>text<!-- hidden -->";
        assert_eq!(strip_html(input), "text");
    }

    #[test]
    fn strip_html_decodes_entities() {
        assert_eq!(strip_html("a&nbsp;&amp;&nbsp;b"), "a & b");
        assert_eq!(strip_html("&lt;tag&gt;"), "<tag>");
        assert_eq!(strip_html("&#65;&#x42;"), "AB");
        assert_eq!(strip_html("&unknown;"), "&unknown;");
    }

    #[test]
    fn strip_furigana_keeps_base_text() {
        assert_eq!(strip_furigana("漢字[かんじ]"), "漢字");
        assert_eq!(strip_furigana("日本[にほん] 語[ご]"), "日本語");
        assert_eq!(strip_furigana("no ruby here"), "no ruby here");
    }

    #[test]
    fn strip_furigana_leaves_sound_references() {
        assert_eq!(strip_furigana("cat[sound:cat.mp3]"), "cat[sound:cat.mp3]");
        assert_eq!(strip_furigana("猫[ねこ] [sound:neko.mp3]"), "猫 [sound:neko.mp3]");
        assert_ne!(
            strip_furigana("cat[sound:cat.mp3]"),
            strip_furigana("cat[sound:dog.mp3]")
        );
    }

    #[test]
    fn strip_punctuation_removes_set() {
        assert_eq!(strip_punctuation("Hello, world!", ",!"), "Hello world");
        assert_eq!(strip_punctuation("「本」。", "「」。"), "本");
        assert_eq!(strip_punctuation("a.b", ""), "a.b");
    }

    #[test]
    fn fold_digits_maps_full_width() {
        assert_eq!(fold_digits("第１２３課"), "第123課");
        assert_eq!(fold_digits("０９"), "09");
        assert_eq!(fold_digits("42"), "42");
    }
}
