//! Purpose: Translate between readable identifiers and packed MSI stream names.
//! Exports: `encode`, `decode`, `TABLE_PREFIX`.
//! Role: Name resolution for every stream lookup the decoder performs.
//! Invariants: `decode(&encode(s)) == s` for any `s` over `[0-9A-Za-z._$]`.
//! Invariants: Code points outside the packed ranges pass through unchanged.

/// Code point that stands for a literal `$`; table streams start with it.
pub const TABLE_PREFIX: char = '\u{4840}';

const PAIR_BASE: u32 = 0x3800;
const SINGLE_BASE: u32 = 0x4800;
const PREFIX_CODE: u32 = 0x4840;

fn to_symbol(ch: char) -> Option<u32> {
    match ch {
        '0'..='9' => Some(ch as u32 - '0' as u32),
        'A'..='Z' => Some(ch as u32 - 'A' as u32 + 10),
        'a'..='z' => Some(ch as u32 - 'a' as u32 + 36),
        '.' => Some(62),
        '_' => Some(63),
        _ => None,
    }
}

fn from_symbol(value: u32) -> char {
    let value = value & 0x3f;
    let ch = match value {
        0..=9 => '0' as u32 + value,
        10..=35 => 'A' as u32 + value - 10,
        36..=61 => 'a' as u32 + value - 36,
        62 => '.' as u32,
        _ => '_' as u32,
    };
    char::from_u32(ch).unwrap_or('_')
}

pub fn encode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '$' {
            out.push(TABLE_PREFIX);
            continue;
        }
        let Some(low) = to_symbol(ch) else {
            out.push(ch);
            continue;
        };
        let high = chars.peek().copied().and_then(to_symbol);
        let code = match high {
            Some(high) => {
                chars.next();
                PAIR_BASE + (high << 6) + low
            }
            None => SINGLE_BASE + low,
        };
        // Packed codes live in the BMP below the surrogate range.
        out.push(char::from_u32(code).unwrap_or(ch));
    }
    out
}

pub fn decode(packed: &str) -> String {
    let mut out = String::with_capacity(packed.len() * 2);
    for ch in packed.chars() {
        let code = ch as u32;
        if code == PREFIX_CODE {
            out.push('$');
        } else if (PAIR_BASE..SINGLE_BASE).contains(&code) {
            let value = code - PAIR_BASE;
            out.push(from_symbol(value));
            out.push(from_symbol(value >> 6));
        } else if (SINGLE_BASE..PREFIX_CODE).contains(&code) {
            out.push(from_symbol(code - SINGLE_BASE));
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{TABLE_PREFIX, decode, encode};

    #[test]
    fn dollar_maps_to_table_prefix() {
        let packed = encode("$");
        assert_eq!(packed.chars().collect::<Vec<_>>(), vec![TABLE_PREFIX]);
        assert_eq!(decode(&packed), "$");
    }

    #[test]
    fn pairs_pack_second_symbol_high() {
        // 'A' = 10, 'B' = 11 -> 0x3800 + (11 << 6) + 10
        let packed = encode("AB");
        assert_eq!(packed.chars().map(|c| c as u32).collect::<Vec<_>>(), vec![0x3aca]);
    }

    #[test]
    fn lone_trailing_symbol_uses_single_range() {
        let packed = encode("abc");
        let codes = packed.chars().map(|c| c as u32).collect::<Vec<_>>();
        assert_eq!(codes.len(), 2);
        assert!((0x3800..0x4800).contains(&codes[0]));
        assert_eq!(codes[1], 0x4800 + 38);
    }

    #[test]
    fn symbol_before_foreign_char_packs_alone() {
        let packed = encode("a-b");
        let codes = packed.chars().map(|c| c as u32).collect::<Vec<_>>();
        assert_eq!(codes, vec![0x4800 + 36, '-' as u32, 0x4800 + 37]);
        assert_eq!(decode(&packed), "a-b");
    }

    #[test]
    fn non_ascii_passes_through() {
        assert_eq!(encode("é"), "é");
        assert_eq!(decode("\u{0005}SummaryInformation"), "\u{0005}SummaryInformation");
    }

    #[test]
    fn control_stream_names_round_trip() {
        for name in ["$_StringPool", "$_StringData", "$_Tables", "$_Columns", "$Property"] {
            let packed = encode(name);
            assert!(packed.chars().count() < name.len());
            assert_eq!(decode(&packed), name);
        }
    }

    #[test]
    fn round_trip_over_full_alphabet() {
        let alphabet: Vec<char> = ('0'..='9')
            .chain('A'..='Z')
            .chain('a'..='z')
            .chain(['.', '_', '$'])
            .collect();
        // Deterministic walk over lengths 0..=9 and varied symbol offsets.
        for len in 0..10usize {
            for start in 0..alphabet.len() {
                let s: String = (0..len)
                    .map(|i| alphabet[(start + i * 7) % alphabet.len()])
                    .collect();
                assert_eq!(decode(&encode(&s)), s, "round trip failed for {s:?}");
            }
        }
    }
}
