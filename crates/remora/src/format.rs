//! Parsing and formatting for command-line values.

use remora_core::{Address, Protection};

/// Parse `0x`-prefixed hex or plain decimal
pub fn parse_number(s: &str) -> Result<u64, String>
{
    let s = s.trim().replace('_', "");
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

pub fn parse_address(s: &str) -> Result<Address, String>
{
    parse_number(s).map(Address::from)
}

pub fn parse_length(s: &str) -> Result<usize, String>
{
    let value = parse_number(s)?;
    usize::try_from(value).map_err(|_| format!("length {value} does not fit in this platform's address space"))
}

/// Bytes given on the command line as one hex string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

/// Parse a hex byte string such as `90 90 c3`, `9090c3` or `0x90,0x90`
pub fn parse_hex_bytes(s: &str) -> Result<HexBytes, String>
{
    let digits: String = s
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|token| token.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();

    if digits.is_empty() {
        return Err("no bytes given".to_string());
    }
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{s}'"));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex byte near position {i} in '{s}'"))
        })
        .collect::<Result<Vec<u8>, String>>()
        .map(HexBytes)
}

/// Formats bytes into a traditional hex + ASCII view.
pub fn format_hexdump(base: Address, bytes: &[u8], width: usize) -> String
{
    let width = width.clamp(8, 32);
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(width).enumerate() {
        let addr = base.saturating_add((row * width) as u64);
        out.push_str(&format!("{:016x}: ", addr.value()));

        for i in 0..width {
            match chunk.get(i) {
                Some(byte) => out.push_str(&format!("{byte:02x} ")),
                None => out.push_str("   "),
            }
        }

        out.push(' ');
        out.extend(chunk.iter().map(|&byte| {
            if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '.'
            }
        }));
        out.push('\n');
    }
    out
}

/// `rwx` text plus the raw native value
pub fn describe_protection(protection: Protection) -> String
{
    format!("{protection} (0x{:x})", protection.raw())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_number()
    {
        assert_eq!(parse_number("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_number("0XfF").unwrap(), 0xff);
        assert_eq!(parse_number("4096").unwrap(), 4096);
        assert_eq!(parse_number("0x7fff_0000").unwrap(), 0x7fff_0000);
        assert!(parse_number("0xzz").is_err());
        assert!(parse_number("ten").is_err());
    }

    #[test]
    fn test_parse_hex_bytes()
    {
        assert_eq!(parse_hex_bytes("90 90 c3").unwrap().0, vec![0x90, 0x90, 0xc3]);
        assert_eq!(parse_hex_bytes("9090C3").unwrap().0, vec![0x90, 0x90, 0xc3]);
        assert_eq!(parse_hex_bytes("0x48,0x8b").unwrap().0, vec![0x48, 0x8b]);
        assert!(parse_hex_bytes("909").is_err());
        assert!(parse_hex_bytes("zz").is_err());
        assert!(parse_hex_bytes("  ").is_err());
    }

    #[test]
    fn test_hexdump_layout()
    {
        let dump = format_hexdump(Address::from(0x1000u64), b"Hello, remora!\x00\x01\xff", 16);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0000000000001000: 48 65 6c 6c 6f"));
        assert!(lines[0].ends_with("Hello, remora!.."));
        assert!(lines[1].starts_with("0000000000001010: ff "));
        assert!(lines[1].ends_with(" ."));
    }
}
