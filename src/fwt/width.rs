// Terminal display width: East Asian wide/fullwidth chars take two columns, combining marks none.

const ZERO_WIDTH: &[(u32, u32)] = &[
    (0x0000, 0x001F),
    (0x007F, 0x009F),
    (0x0300, 0x036F),
    (0x0483, 0x0489),
    (0x0591, 0x05BD),
    (0x0610, 0x061A),
    (0x064B, 0x065F),
    (0x0E31, 0x0E31),
    (0x0E34, 0x0E3A),
    (0x0E47, 0x0E4E),
    (0x1AB0, 0x1AFF),
    (0x1DC0, 0x1DFF),
    (0x200B, 0x200F),
    (0x202A, 0x202E),
    (0x2060, 0x2064),
    (0x20D0, 0x20FF),
    (0x302A, 0x302D),
    (0x3099, 0x309A),
    (0xFE00, 0xFE0F),
    (0xFE20, 0xFE2F),
    (0xFEFF, 0xFEFF),
];

// Emoji entries cover the default-emoji-presentation code points only; text-style
// symbols in the same blocks stay narrow.
const WIDE: &[(u32, u32)] = &[
    (0x1100, 0x115F),
    (0x231A, 0x231B),
    (0x2329, 0x232A),
    (0x23E9, 0x23EC),
    (0x23F0, 0x23F0),
    (0x23F3, 0x23F3),
    (0x25FD, 0x25FE),
    (0x2614, 0x2615),
    (0x2648, 0x2653),
    (0x267F, 0x267F),
    (0x2693, 0x2693),
    (0x26A1, 0x26A1),
    (0x26AA, 0x26AB),
    (0x26BD, 0x26BE),
    (0x26C4, 0x26C5),
    (0x26CE, 0x26CE),
    (0x26D4, 0x26D4),
    (0x26EA, 0x26EA),
    (0x26F2, 0x26F3),
    (0x26F5, 0x26F5),
    (0x26FA, 0x26FA),
    (0x26FD, 0x26FD),
    (0x2705, 0x2705),
    (0x270A, 0x270B),
    (0x2728, 0x2728),
    (0x274C, 0x274C),
    (0x274E, 0x274E),
    (0x2753, 0x2755),
    (0x2757, 0x2757),
    (0x2795, 0x2797),
    (0x27B0, 0x27B0),
    (0x27BF, 0x27BF),
    (0x2B1B, 0x2B1C),
    (0x2B50, 0x2B50),
    (0x2B55, 0x2B55),
    (0x2E80, 0x303E),
    (0x3041, 0x33FF),
    (0x3400, 0x4DBF),
    (0x4E00, 0x9FFF),
    (0xA000, 0xA4CF),
    (0xA960, 0xA97F),
    (0xAC00, 0xD7A3),
    (0xF900, 0xFAFF),
    (0xFE10, 0xFE19),
    (0xFE30, 0xFE6F),
    (0xFF00, 0xFF60),
    (0xFFE0, 0xFFE6),
    (0x1F300, 0x1F64F),
    (0x1F680, 0x1F6C5),
    (0x1F6CC, 0x1F6CC),
    (0x1F6D0, 0x1F6D2),
    (0x1F6D5, 0x1F6D7),
    (0x1F6DC, 0x1F6DF),
    (0x1F6EB, 0x1F6EC),
    (0x1F6F4, 0x1F6FC),
    (0x1F7E0, 0x1F7EB),
    (0x1F900, 0x1F9FF),
    (0x1FA70, 0x1FAFF),
    (0x20000, 0x2FFFD),
    (0x30000, 0x3FFFD),
];

fn in_table(table: &[(u32, u32)], cp: u32) -> bool {
    table
        .binary_search_by(|&(lo, hi)| {
            if hi < cp {
                std::cmp::Ordering::Less
            } else if lo > cp {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        })
        .is_ok()
}

pub fn char_width(c: char) -> usize {
    let cp = c as u32;
    if (0x20..0x7F).contains(&cp) {
        return 1;
    }
    if in_table(ZERO_WIDTH, cp) {
        0
    } else if in_table(WIDE, cp) {
        2
    } else {
        1
    }
}

pub fn display_width(text: &str) -> usize {
    text.chars().map(char_width).sum()
}

/// Longest prefix of `text` that fits in `width` columns. Trailing zero-width
/// marks stay attached to the last kept character.
pub fn truncate_to_width(text: &str, width: usize) -> &str {
    let mut used = 0;
    for (idx, c) in text.char_indices() {
        let w = char_width(c);
        if used + w > width {
            return &text[..idx];
        }
        used += w;
    }
    text
}

#[cfg(test)]
mod tests {
    use super::{char_width, display_width, truncate_to_width};

    #[test]
    fn ascii_is_one_column_per_char() {
        assert_eq!(display_width("Bob"), 3);
        assert_eq!(display_width(""), 0);
    }

    #[test]
    fn wide_and_combining_chars() {
        assert_eq!(char_width('漢'), 2);
        assert_eq!(char_width('Ａ'), 2);
        assert_eq!(char_width('\u{0301}'), 0);
        assert_eq!(display_width("日本"), 4);
        assert_eq!(display_width("e\u{0301}"), 1);
        assert_eq!(display_width("한국어"), 6);
    }

    #[test]
    fn emoji_presentation_chars_are_wide() {
        assert_eq!(char_width('🚀'), 2);
        assert_eq!(char_width('☔'), 2);
        assert_eq!(char_width('🪐'), 2);
        assert_eq!(char_width('✅'), 2);
        assert_eq!(display_width("go 🚀"), 5);
        assert_eq!(char_width('✓'), 1);
        assert_eq!(char_width('☺'), 1);
    }

    #[test]
    fn truncation_never_splits_a_wide_char() {
        assert_eq!(truncate_to_width("日本語", 3), "日");
        assert_eq!(truncate_to_width("abcdef", 4), "abcd");
        assert_eq!(truncate_to_width("e\u{0301}x", 1), "e\u{0301}");
        assert_eq!(truncate_to_width("abc", 10), "abc");
        assert_eq!(truncate_to_width("abc", 0), "");
    }
}
