//! Display-width tables.
//!
//! Only the CJK ranges listed here render double-width; everything else
//! is one column. The ranges ship as data so the editor's column math
//! never depends on the platform's wcwidth.

const DOUBLE_WIDTH_RANGES: &[(u32, u32)] = &[
    (0x1100, 0x11FF),   // Hangul Jamo
    (0x2E80, 0xA4CF),   // CJK Radicals .. Yi Radicals (0x303F excepted below)
    (0xAC00, 0xD7AF),   // Hangul Syllables
    (0xF900, 0xFAFF),   // CJK Compatibility Ideographs
    (0xFE10, 0xFE1F),   // Vertical Forms
    (0xFE30, 0xFE6F),   // CJK Compatibility Forms, Small Form Variants
    (0xFF00, 0xFF60),   // Fullwidth Forms
    (0xFFE0, 0xFFE6),   // Fullwidth Signs
    (0x1D300, 0x1D35F), // Tai Xuan Jing Symbols
    (0x20000, 0x2B81F), // CJK Unified Ideographs Extensions B, C, D
    (0x2F800, 0x2FA1F), // CJK Compatibility Ideographs Supplement
];

/// Half-width space inside an otherwise double-width block.
const HALFWIDTH_EXCEPTION: u32 = 0x303F;

pub fn char_width(c: char) -> usize {
    let sym = c as u32;
    if sym < 0x1100 {
        return 1;
    }
    if sym == HALFWIDTH_EXCEPTION {
        return 1;
    }
    for (lo, hi) in DOUBLE_WIDTH_RANGES {
        if sym >= *lo && sym <= *hi {
            return 2;
        }
    }
    1
}

/// Display columns occupied by a whole string.
pub fn str_width(s: &str) -> usize {
    s.chars().map(char_width).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_single_width() {
        assert_eq!(char_width('a'), 1);
        assert_eq!(str_width("hello"), 5);
    }

    #[test]
    fn cjk_is_double_width() {
        assert_eq!(char_width('世'), 2); // U+4E16
        assert_eq!(char_width('界'), 2); // U+754C
        assert_eq!(str_width("世界"), 4);
        assert_eq!(str_width("a世b"), 4);
    }

    #[test]
    fn halfwidth_exception_inside_cjk_block() {
        assert_eq!(char_width('\u{303F}'), 1);
        assert_eq!(char_width('\u{303E}'), 2);
    }

    #[test]
    fn non_cjk_multibyte_is_single_width() {
        assert_eq!(char_width('é'), 1);
        assert_eq!(char_width('ю'), 1);
    }
}
