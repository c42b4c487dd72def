/// Clean a hex string by removing "0x" prefix and whitespace
pub fn clean_hex(s: &str) -> &str {
    let s = s.trim();
    if let Some(stripped) = s.strip_prefix("0x") {
        stripped
    } else {
        s
    }
}

/// Parse a block number given as decimal or 0x-prefixed hexadecimal text.
pub fn parse_block_number(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }

    if s.chars().all(|c| c.is_ascii_digit()) {
        return s.parse::<u64>().ok();
    }

    None
}

/// Format a block number as the 0x-prefixed hex tag JSON-RPC expects.
pub fn block_tag(block_number: u64) -> String {
    format!("0x{block_number:x}")
}
