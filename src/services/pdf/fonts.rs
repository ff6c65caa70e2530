use lopdf::{Dictionary, dictionary};

/// The standard 14 fonts used by generated documents. None of them are embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Font {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    Courier,
}

/// Glyph widths of Helvetica for ASCII 32..=126, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

impl Font {
    pub const ALL: [Font; 4] = [
        Font::Helvetica,
        Font::HelveticaBold,
        Font::HelveticaOblique,
        Font::Courier,
    ];

    pub fn base_font(self) -> &'static str {
        match self {
            Font::Helvetica => "Helvetica",
            Font::HelveticaBold => "Helvetica-Bold",
            Font::HelveticaOblique => "Helvetica-Oblique",
            Font::Courier => "Courier",
        }
    }

    /// Resource name inside a page's `/Font` dictionary.
    pub fn resource_name(self) -> &'static str {
        match self {
            Font::Helvetica => "F1",
            Font::HelveticaBold => "F2",
            Font::HelveticaOblique => "F3",
            Font::Courier => "F4",
        }
    }

    pub fn dictionary(self) -> Dictionary {
        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => self.base_font(),
            "Encoding" => "WinAnsiEncoding",
        }
    }

    /// Approximate advance width of `text` at `size` points.
    ///
    /// Bold and oblique reuse the regular Helvetica metrics.
    pub fn text_width(self, text: &str, size: f32) -> f32 {
        let units: u32 = text
            .chars()
            .map(|c| match self {
                Font::Courier => 600,
                _ => match c as u32 {
                    code @ 32..=126 => HELVETICA_WIDTHS[(code - 32) as usize] as u32,
                    _ => 556,
                },
            })
            .sum();
        units as f32 * size / 1000.0
    }
}

/// Encodes text for a WinAnsi simple font; characters outside Latin-1 become `?`.
pub fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\t' => b' ',
            c if (c as u32) < 0x20 => b' ',
            c if (c as u32) <= 0xFF => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_table_covers_printable_ascii() {
        assert_eq!(HELVETICA_WIDTHS.len(), ('~' as usize) - (' ' as usize) + 1);
        assert_eq!(Font::Helvetica.text_width("A", 1000.0), 667.0);
        assert_eq!(Font::Helvetica.text_width("z", 1000.0), 500.0);
        assert_eq!(Font::Helvetica.text_width("~", 1000.0), 584.0);
    }

    #[test]
    fn test_courier_is_monospaced() {
        assert_eq!(Font::Courier.text_width("iiii", 10.0), 24.0);
        assert_eq!(Font::Courier.text_width("WWWW", 10.0), 24.0);
    }

    #[test]
    fn test_encode_text() {
        assert_eq!(encode_text("Hello"), b"Hello".to_vec());
        assert_eq!(encode_text("café"), vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(encode_text("a\tb"), b"a b".to_vec());
        assert_eq!(encode_text("日本"), b"??".to_vec());
    }
}
