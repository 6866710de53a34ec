//! CSS Value canonicalization
//!
//! Recognizes color values and rewrites them to their shortest equivalent
//! spelling. Anything not understood here is left for the caller to echo
//! unchanged.

use crate::tokenizer::Token;

/// Color value (RGBA)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse a hex color string (without #)
    pub fn from_hex(hex: &str) -> Option<Self> {
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|n| n * 17);
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match hex.len() {
            3 => Some(Color::rgb(nibble(0)?, nibble(1)?, nibble(2)?)),
            4 => Some(Color::rgba(nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?)),
            6 => Some(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Color::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        }
    }

    /// Look up a named color (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        NAMED_COLORS
            .binary_search_by(|(n, _)| n.cmp(&lower.as_str()))
            .ok()
            .map(|i| {
                let [r, g, b] = NAMED_COLORS[i].1;
                Color::rgb(r, g, b)
            })
    }

    /// Shortest hex spelling, e.g. `#fff`, `#1a2b3c`, `#f008`
    pub fn to_hex(&self) -> String {
        let channels: &[u8] = if self.a == 255 {
            &[self.r, self.g, self.b]
        } else {
            &[self.r, self.g, self.b, self.a]
        };
        let collapsible = channels.iter().all(|c| c >> 4 == c & 0x0f);
        let mut out = String::from("#");
        for c in channels {
            if collapsible {
                out.push_str(&format!("{:x}", c & 0x0f));
            } else {
                out.push_str(&format!("{:02x}", c));
            }
        }
        out
    }

    /// Shortest keyword naming this exact color, if any
    pub fn shortest_name(&self) -> Option<&'static str> {
        if self.a != 255 {
            return None;
        }
        NAMED_COLORS
            .iter()
            .filter(|(_, [r, g, b])| (*r, *g, *b) == (self.r, self.g, self.b))
            .map(|(name, _)| *name)
            .min_by_key(|name| name.len())
    }

    /// Shortest CSS spelling of this color; ties go to hex
    pub fn to_css(&self) -> String {
        let hex = self.to_hex();
        match self.shortest_name() {
            Some(name) if name.len() < hex.len() => name.to_string(),
            _ => hex,
        }
    }
}

/// Properties whose values the minifier knows may hold colors
pub fn is_color_property(name: &str) -> bool {
    matches!(
        name,
        "color"
            | "background"
            | "background-color"
            | "border"
            | "border-color"
            | "border-top"
            | "border-right"
            | "border-bottom"
            | "border-left"
            | "border-top-color"
            | "border-right-color"
            | "border-bottom-color"
            | "border-left-color"
            | "outline"
            | "outline-color"
            | "column-rule"
            | "column-rule-color"
            | "text-decoration"
            | "text-decoration-color"
            | "text-emphasis-color"
            | "caret-color"
            | "accent-color"
            | "box-shadow"
            | "text-shadow"
            | "fill"
            | "stroke"
            | "stop-color"
            | "flood-color"
            | "lighting-color"
    )
}

/// Value parser for turning color-bearing tokens into canonical text
pub struct ValueParser;

impl ValueParser {
    /// Canonical spelling of a color keyword, if it is one and can shrink
    pub fn canonical_ident(ident: &str) -> Option<String> {
        let color = Color::from_name(ident)?;
        let css = color.to_css();
        (css.len() < ident.len()).then_some(css)
    }

    /// Canonical spelling of a `#hex` literal (without the `#`)
    pub fn canonical_hash(hex: &str) -> Option<String> {
        Color::from_hex(hex).map(|color| color.to_css())
    }

    /// Parse `rgb()`/`rgba()` arguments with plain integer channels
    pub fn parse_rgb(args: &[Token]) -> Option<Color> {
        let mut values = Vec::new();
        for token in args {
            match token {
                Token::Whitespace | Token::Comma => {}
                Token::Number(_) | Token::Percentage(_) => values.push(token),
                _ => return None,
            }
        }

        if values.len() != 3 && values.len() != 4 {
            return None;
        }

        let r = Self::parse_color_component(values[0])?;
        let g = Self::parse_color_component(values[1])?;
        let b = Self::parse_color_component(values[2])?;

        if values.len() == 4 && !Self::is_opaque_alpha(values[3]) {
            return None;
        }

        Some(Color::rgb(r, g, b))
    }

    /// An integral channel in 0..=255
    fn parse_color_component(token: &Token) -> Option<u8> {
        match token {
            Token::Number(n) if n.fract() == 0.0 && (0.0..=255.0).contains(n) => Some(*n as u8),
            _ => None,
        }
    }

    fn is_opaque_alpha(token: &Token) -> bool {
        match token {
            Token::Number(n) => *n == 1.0,
            Token::Percentage(p) => *p == 100.0,
            _ => false,
        }
    }
}

/// CSS named colors, sorted by name
static NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("aliceblue", [0xf0, 0xf8, 0xff]),
    ("antiquewhite", [0xfa, 0xeb, 0xd7]),
    ("aqua", [0x00, 0xff, 0xff]),
    ("aquamarine", [0x7f, 0xff, 0xd4]),
    ("azure", [0xf0, 0xff, 0xff]),
    ("beige", [0xf5, 0xf5, 0xdc]),
    ("bisque", [0xff, 0xe4, 0xc4]),
    ("black", [0x00, 0x00, 0x00]),
    ("blanchedalmond", [0xff, 0xeb, 0xcd]),
    ("blue", [0x00, 0x00, 0xff]),
    ("blueviolet", [0x8a, 0x2b, 0xe2]),
    ("brown", [0xa5, 0x2a, 0x2a]),
    ("burlywood", [0xde, 0xb8, 0x87]),
    ("cadetblue", [0x5f, 0x9e, 0xa0]),
    ("chartreuse", [0x7f, 0xff, 0x00]),
    ("chocolate", [0xd2, 0x69, 0x1e]),
    ("coral", [0xff, 0x7f, 0x50]),
    ("cornflowerblue", [0x64, 0x95, 0xed]),
    ("cornsilk", [0xff, 0xf8, 0xdc]),
    ("crimson", [0xdc, 0x14, 0x3c]),
    ("cyan", [0x00, 0xff, 0xff]),
    ("darkblue", [0x00, 0x00, 0x8b]),
    ("darkcyan", [0x00, 0x8b, 0x8b]),
    ("darkgoldenrod", [0xb8, 0x86, 0x0b]),
    ("darkgray", [0xa9, 0xa9, 0xa9]),
    ("darkgreen", [0x00, 0x64, 0x00]),
    ("darkgrey", [0xa9, 0xa9, 0xa9]),
    ("darkkhaki", [0xbd, 0xb7, 0x6b]),
    ("darkmagenta", [0x8b, 0x00, 0x8b]),
    ("darkolivegreen", [0x55, 0x6b, 0x2f]),
    ("darkorange", [0xff, 0x8c, 0x00]),
    ("darkorchid", [0x99, 0x32, 0xcc]),
    ("darkred", [0x8b, 0x00, 0x00]),
    ("darksalmon", [0xe9, 0x96, 0x7a]),
    ("darkseagreen", [0x8f, 0xbc, 0x8f]),
    ("darkslateblue", [0x48, 0x3d, 0x8b]),
    ("darkslategray", [0x2f, 0x4f, 0x4f]),
    ("darkslategrey", [0x2f, 0x4f, 0x4f]),
    ("darkturquoise", [0x00, 0xce, 0xd1]),
    ("darkviolet", [0x94, 0x00, 0xd3]),
    ("deeppink", [0xff, 0x14, 0x93]),
    ("deepskyblue", [0x00, 0xbf, 0xff]),
    ("dimgray", [0x69, 0x69, 0x69]),
    ("dimgrey", [0x69, 0x69, 0x69]),
    ("dodgerblue", [0x1e, 0x90, 0xff]),
    ("firebrick", [0xb2, 0x22, 0x22]),
    ("floralwhite", [0xff, 0xfa, 0xf0]),
    ("forestgreen", [0x22, 0x8b, 0x22]),
    ("fuchsia", [0xff, 0x00, 0xff]),
    ("gainsboro", [0xdc, 0xdc, 0xdc]),
    ("ghostwhite", [0xf8, 0xf8, 0xff]),
    ("gold", [0xff, 0xd7, 0x00]),
    ("goldenrod", [0xda, 0xa5, 0x20]),
    ("gray", [0x80, 0x80, 0x80]),
    ("green", [0x00, 0x80, 0x00]),
    ("greenyellow", [0xad, 0xff, 0x2f]),
    ("grey", [0x80, 0x80, 0x80]),
    ("honeydew", [0xf0, 0xff, 0xf0]),
    ("hotpink", [0xff, 0x69, 0xb4]),
    ("indianred", [0xcd, 0x5c, 0x5c]),
    ("indigo", [0x4b, 0x00, 0x82]),
    ("ivory", [0xff, 0xff, 0xf0]),
    ("khaki", [0xf0, 0xe6, 0x8c]),
    ("lavender", [0xe6, 0xe6, 0xfa]),
    ("lavenderblush", [0xff, 0xf0, 0xf5]),
    ("lawngreen", [0x7c, 0xfc, 0x00]),
    ("lemonchiffon", [0xff, 0xfa, 0xcd]),
    ("lightblue", [0xad, 0xd8, 0xe6]),
    ("lightcoral", [0xf0, 0x80, 0x80]),
    ("lightcyan", [0xe0, 0xff, 0xff]),
    ("lightgoldenrodyellow", [0xfa, 0xfa, 0xd2]),
    ("lightgray", [0xd3, 0xd3, 0xd3]),
    ("lightgreen", [0x90, 0xee, 0x90]),
    ("lightgrey", [0xd3, 0xd3, 0xd3]),
    ("lightpink", [0xff, 0xb6, 0xc1]),
    ("lightsalmon", [0xff, 0xa0, 0x7a]),
    ("lightseagreen", [0x20, 0xb2, 0xaa]),
    ("lightskyblue", [0x87, 0xce, 0xfa]),
    ("lightslategray", [0x77, 0x88, 0x99]),
    ("lightslategrey", [0x77, 0x88, 0x99]),
    ("lightsteelblue", [0xb0, 0xc4, 0xde]),
    ("lightyellow", [0xff, 0xff, 0xe0]),
    ("lime", [0x00, 0xff, 0x00]),
    ("limegreen", [0x32, 0xcd, 0x32]),
    ("linen", [0xfa, 0xf0, 0xe6]),
    ("magenta", [0xff, 0x00, 0xff]),
    ("maroon", [0x80, 0x00, 0x00]),
    ("mediumaquamarine", [0x66, 0xcd, 0xaa]),
    ("mediumblue", [0x00, 0x00, 0xcd]),
    ("mediumorchid", [0xba, 0x55, 0xd3]),
    ("mediumpurple", [0x93, 0x70, 0xdb]),
    ("mediumseagreen", [0x3c, 0xb3, 0x71]),
    ("mediumslateblue", [0x7b, 0x68, 0xee]),
    ("mediumspringgreen", [0x00, 0xfa, 0x9a]),
    ("mediumturquoise", [0x48, 0xd1, 0xcc]),
    ("mediumvioletred", [0xc7, 0x15, 0x85]),
    ("midnightblue", [0x19, 0x19, 0x70]),
    ("mintcream", [0xf5, 0xff, 0xfa]),
    ("mistyrose", [0xff, 0xe4, 0xe1]),
    ("moccasin", [0xff, 0xe4, 0xb5]),
    ("navajowhite", [0xff, 0xde, 0xad]),
    ("navy", [0x00, 0x00, 0x80]),
    ("oldlace", [0xfd, 0xf5, 0xe6]),
    ("olive", [0x80, 0x80, 0x00]),
    ("olivedrab", [0x6b, 0x8e, 0x23]),
    ("orange", [0xff, 0xa5, 0x00]),
    ("orangered", [0xff, 0x45, 0x00]),
    ("orchid", [0xda, 0x70, 0xd6]),
    ("palegoldenrod", [0xee, 0xe8, 0xaa]),
    ("palegreen", [0x98, 0xfb, 0x98]),
    ("paleturquoise", [0xaf, 0xee, 0xee]),
    ("palevioletred", [0xdb, 0x70, 0x93]),
    ("papayawhip", [0xff, 0xef, 0xd5]),
    ("peachpuff", [0xff, 0xda, 0xb9]),
    ("peru", [0xcd, 0x85, 0x3f]),
    ("pink", [0xff, 0xc0, 0xcb]),
    ("plum", [0xdd, 0xa0, 0xdd]),
    ("powderblue", [0xb0, 0xe0, 0xe6]),
    ("purple", [0x80, 0x00, 0x80]),
    ("rebeccapurple", [0x66, 0x33, 0x99]),
    ("red", [0xff, 0x00, 0x00]),
    ("rosybrown", [0xbc, 0x8f, 0x8f]),
    ("royalblue", [0x41, 0x69, 0xe1]),
    ("saddlebrown", [0x8b, 0x45, 0x13]),
    ("salmon", [0xfa, 0x80, 0x72]),
    ("sandybrown", [0xf4, 0xa4, 0x60]),
    ("seagreen", [0x2e, 0x8b, 0x57]),
    ("seashell", [0xff, 0xf5, 0xee]),
    ("sienna", [0xa0, 0x52, 0x2d]),
    ("silver", [0xc0, 0xc0, 0xc0]),
    ("skyblue", [0x87, 0xce, 0xeb]),
    ("slateblue", [0x6a, 0x5a, 0xcd]),
    ("slategray", [0x70, 0x80, 0x90]),
    ("slategrey", [0x70, 0x80, 0x90]),
    ("snow", [0xff, 0xfa, 0xfa]),
    ("springgreen", [0x00, 0xff, 0x7f]),
    ("steelblue", [0x46, 0x82, 0xb4]),
    ("tan", [0xd2, 0xb4, 0x8c]),
    ("teal", [0x00, 0x80, 0x80]),
    ("thistle", [0xd8, 0xbf, 0xd8]),
    ("tomato", [0xff, 0x63, 0x47]),
    ("turquoise", [0x40, 0xe0, 0xd0]),
    ("violet", [0xee, 0x82, 0xee]),
    ("wheat", [0xf5, 0xde, 0xb3]),
    ("white", [0xff, 0xff, 0xff]),
    ("whitesmoke", [0xf5, 0xf5, 0xf5]),
    ("yellow", [0xff, 0xff, 0x00]),
    ("yellowgreen", [0x9a, 0xcd, 0x32]),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;

    fn args(input: &str) -> Vec<Token> {
        Tokenizer::new(input).tokenize_all().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_named_colors_sorted() {
        assert!(NAMED_COLORS.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_hex_color_3() {
        let color = Color::from_hex("fff").unwrap();
        assert_eq!(color, Color::rgb(255, 255, 255));
    }

    #[test]
    fn test_hex_color_8() {
        let color = Color::from_hex("ff000080").unwrap();
        assert_eq!(color, Color::rgba(255, 0, 0, 128));
    }

    #[test]
    fn test_bad_hex() {
        assert_eq!(Color::from_hex("ggg"), None);
        assert_eq!(Color::from_hex("12345"), None);
    }

    #[test]
    fn test_named_color() {
        assert_eq!(Color::from_name("red"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(Color::from_name("RED"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(Color::from_name("notacolor"), None);
    }

    #[test]
    fn test_to_hex_collapses() {
        assert_eq!(Color::rgb(255, 255, 255).to_hex(), "#fff");
        assert_eq!(Color::rgb(0x12, 0x34, 0x56).to_hex(), "#123456");
        assert_eq!(Color::rgba(255, 0, 0, 0x88).to_hex(), "#f008");
    }

    #[test]
    fn test_shortest_spelling() {
        assert_eq!(ValueParser::canonical_ident("white"), Some("#fff".to_string()));
        // "red" is already shorter than "#f00"
        assert_eq!(ValueParser::canonical_ident("red"), None);
        assert_eq!(ValueParser::canonical_ident("inherit"), None);
        assert_eq!(ValueParser::canonical_hash("FF0000"), Some("red".to_string()));
        assert_eq!(ValueParser::canonical_hash("000080"), Some("navy".to_string()));
        assert_eq!(ValueParser::canonical_hash("00FFFF"), Some("#0ff".to_string()));
        assert_eq!(ValueParser::canonical_hash("zzz"), None);
    }

    #[test]
    fn test_parse_rgb() {
        assert_eq!(ValueParser::parse_rgb(&args("255, 255, 255")), Some(Color::rgb(255, 255, 255)));
        assert_eq!(ValueParser::parse_rgb(&args("0,128,0,1")), Some(Color::rgb(0, 128, 0)));
        assert_eq!(ValueParser::parse_rgb(&args("0,0,0,0.5")), None);
        assert_eq!(ValueParser::parse_rgb(&args("10%, 0, 0")), None);
        assert_eq!(ValueParser::parse_rgb(&args("1 2 3 / 50%")), None);
    }

    #[test]
    fn test_color_properties() {
        assert!(is_color_property("background"));
        assert!(is_color_property("border-left-color"));
        assert!(!is_color_property("font-family"));
    }
}
