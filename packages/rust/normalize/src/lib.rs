//! Comparison normalizer for note fields.
//!
//! Turns a field's raw text into a canonical form used only to decide whether
//! two values are "the same". Stored text is never replaced by its normalized
//! form.

mod passes;

use notemerge_shared::NormalizeOptions;

/// Normalize `raw` for comparison.
///
/// Passes run in a fixed order: strip HTML, strip furigana, strip
/// punctuation, fold full-width digits, then trim surrounding whitespace.
pub fn normalize(raw: &str, opts: &NormalizeOptions) -> String {
    let mut s = raw.to_string();

    if opts.strip_html {
        s = passes::strip_html(&s);
    }
    if opts.strip_furigana {
        s = passes::strip_furigana(&s);
    }
    if opts.strip_punctuation {
        s = passes::strip_punctuation(&s, &opts.punctuation);
    }
    if opts.fold_full_width_digits {
        s = passes::fold_digits(&s);
    }

    s.trim().to_string()
}

/// Two values are equal iff their normalized forms are identical
/// (two values that normalize to nothing are equal).
pub fn values_equal(a: &str, b: &str, opts: &NormalizeOptions) -> bool {
    normalize(a, opts) == normalize(b, opts)
}

/// Raw blank check used for "empty field" decisions.
pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// Turn the literal escapes `\n`, `\t` and `\r` into the characters they name.
pub fn interpret_special_chars(s: &str) -> String {
    s.replace(r"\n", "\n")
        .replace(r"\t", "\t")
        .replace(r"\r", "\r")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_on() -> NormalizeOptions {
        NormalizeOptions {
            strip_html: true,
            strip_furigana: true,
            strip_punctuation: true,
            punctuation: ",.!?、。".into(),
            fold_full_width_digits: true,
        }
    }

    #[test]
    fn no_switches_only_trims() {
        let opts = NormalizeOptions::default();
        assert_eq!(normalize("  <b>Hi</b>, １ ", &opts), "<b>Hi</b>, １");
    }

    #[test]
    fn all_switches_apply_in_order() {
        let opts = all_on();
        assert_eq!(normalize(" <b>漢字[かんじ]</b>、１０! ", &opts), "漢字10");
    }

    #[test]
    fn html_is_stripped_before_punctuation() {
        // The `.` inside the attribute must not survive into the result.
        let opts = all_on();
        assert_eq!(normalize(r#"<span class="a.b">x</span>"#, &opts), "x");
    }

    #[test]
    fn equality_uses_normalized_forms() {
        let opts = NormalizeOptions::html_only();
        assert!(values_equal("Hello", "<b>Hello</b>", &opts));
        assert!(!values_equal("Hello", "World", &opts));
        assert!(values_equal("", "<br>", &opts));
    }

    #[test]
    fn different_audio_is_not_equal_without_html_stripping() {
        let opts = NormalizeOptions {
            strip_furigana: true,
            ..NormalizeOptions::default()
        };
        assert!(!values_equal("cat[sound:cat.mp3]", "cat[sound:dog.mp3]", &opts));
        assert!(values_equal("cat[sound:cat.mp3]", " cat[sound:cat.mp3]", &opts));
    }

    #[test]
    fn blank_check_is_raw() {
        assert!(is_blank("  \n"));
        assert!(!is_blank("<br>"));
    }

    #[test]
    fn separator_escapes_are_interpreted() {
        assert_eq!(interpret_special_chars(r"a\nb\tc"), "a\nb\tc");
        assert_eq!(interpret_special_chars("<br>"), "<br>");
    }
}
