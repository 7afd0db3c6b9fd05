use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonical form used for every key comparison: accents transliterated to
/// ASCII, lower-cased, surrounding whitespace trimmed. Internal whitespace is
/// left untouched.
pub fn normalize(text: &str) -> String {
    transliterate(text).to_lowercase().trim().to_string()
}

/// Same as [`normalize`], with a missing value mapping to the empty string.
pub fn normalize_field(text: Option<&str>) -> String {
    text.map(normalize).unwrap_or_default()
}

fn transliterate(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.nfkd().filter(|c| !is_combining_mark(*c)) {
        match fold_letter(c) {
            Some(ascii) => out.push_str(ascii),
            None => out.push(c),
        }
    }
    out
}

// Latin letters with no canonical decomposition.
fn fold_letter(c: char) -> Option<&'static str> {
    let folded = match c {
        'ß' => "ss",
        'æ' => "ae",
        'Æ' => "AE",
        'œ' => "oe",
        'Œ' => "OE",
        'ø' => "o",
        'Ø' => "O",
        'đ' | 'ð' => "d",
        'Đ' | 'Ð' => "D",
        'ł' => "l",
        'Ł' => "L",
        'þ' => "th",
        'Þ' => "TH",
        'ı' => "i",
        _ => return None,
    };
    Some(folded)
}
