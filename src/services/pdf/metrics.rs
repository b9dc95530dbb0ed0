//! Helvetica glyph widths and WinAnsi encoding for laying out text with the
//! standard Type1 fonts, which need no embedding.

/// Widths of the printable ASCII range (0x20..=0x7E) in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
];

const FALLBACK_WIDTH: u16 = 556;

fn glyph_width(c: char) -> u16 {
    match c {
        ' '..='~' => HELVETICA_WIDTHS[c as usize - 0x20],
        '\t' => HELVETICA_WIDTHS[0] * 4,
        _ => FALLBACK_WIDTH,
    }
}

/// Rendered width of `text` in points at `font_size`.
pub fn text_width(text: &str, font_size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| glyph_width(c) as u32).sum();
    units as f32 * font_size / 1000.0
}

/// Greedy word wrap against `max_width` points. Runs of whitespace collapse
/// to one space; a word wider than the line is broken between characters.
pub fn wrap_line(text: &str, font_size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };

        if text_width(&candidate, font_size) <= max_width {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }

        if text_width(word, font_size) <= max_width {
            current = word.to_string();
            continue;
        }

        for c in word.chars() {
            current.push(c);
            if text_width(&current, font_size) > max_width && current.chars().count() > 1 {
                current.pop();
                lines.push(std::mem::replace(&mut current, c.to_string()));
            }
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Encodes `text` as WinAnsi bytes. Characters without a code point become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            '\t' => b' ',
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            _ => b'?',
        })
        .collect()
}

const CP1252_HIGH: [char; 32] = [
    '€', '\u{FFFD}', '‚', 'ƒ', '„', '…', '†', '‡', 'ˆ', '‰', 'Š', '‹', 'Œ', '\u{FFFD}', 'Ž', '\u{FFFD}',
    '\u{FFFD}', '‘', '’', '“', '”', '•', '–', '—', '˜', '™', 'š', '›', 'œ', '\u{FFFD}', 'ž', 'Ÿ',
];

/// Decodes one WinAnsi (cp1252) byte. Unassigned bytes become U+FFFD.
pub fn decode_win_ansi(byte: u8) -> char {
    match byte {
        0x80..=0x9F => CP1252_HIGH[(byte - 0x80) as usize],
        _ => byte as char,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_win_ansi() {
        assert_eq!(decode_win_ansi(b'A'), 'A');
        assert_eq!(decode_win_ansi(0xE9), 'é');
        assert_eq!(decode_win_ansi(0x80), '€');
        assert_eq!(decode_win_ansi(0x93), '“');
        assert_eq!(decode_win_ansi(0x81), '\u{FFFD}');
        for c in ['€', '’', '—', '™'] {
            assert_eq!(decode_win_ansi(encode_win_ansi(&c.to_string())[0]), c);
        }
    }

    #[test]
    fn test_text_width() {
        // "Hi" = 722 + 222
        assert!((text_width("Hi", 10.0) - 9.44).abs() < 1e-4);
        assert_eq!(text_width("", 12.0), 0.0);
    }

    #[test]
    fn test_wrap_line_breaks_on_words() {
        let width = text_width("alpha beta gamma", 12.0) - 1.0;
        let lines = wrap_line("alpha beta gamma delta", 12.0, width);
        assert_eq!(lines, vec!["alpha beta", "gamma delta"]);
    }

    #[test]
    fn test_wrap_line_collapses_whitespace() {
        let lines = wrap_line("  one \t two  ", 12.0, 500.0);
        assert_eq!(lines, vec!["one two"]);
        assert!(wrap_line("   ", 12.0, 500.0).is_empty());
    }

    #[test]
    fn test_wrap_line_splits_overlong_word() {
        let word = "x".repeat(100);
        let max = text_width("xxxxxxxxxx", 12.0);
        let lines = wrap_line(&word, 12.0, max);
        assert_eq!(lines.len(), 10);
        assert!(lines.iter().all(|l| text_width(l, 12.0) <= max));
        assert_eq!(lines.concat(), word);
    }

    #[test]
    fn test_encode_win_ansi() {
        assert_eq!(encode_win_ansi("Abc"), b"Abc".to_vec());
        assert_eq!(encode_win_ansi("café"), vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(encode_win_ansi("€ “x”"), vec![0x80, b' ', 0x93, b'x', 0x94]);
        assert_eq!(encode_win_ansi("日"), b"?".to_vec());
    }
}
