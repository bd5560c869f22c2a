use sha2::{Digest, Sha256};

/// Converts a 1-based column number to its letter name (`1` is `A`, `27` is `AA`).
pub fn column_number_to_name(column: u32) -> String {
    let mut column = column;
    let mut name = String::new();
    while column > 0 {
        let rem = ((column - 1) % 26) as u8;
        name.insert(0, (b'A' + rem) as char);
        column = (column - 1) / 26;
    }
    name
}

/// A1-style address from 1-based column and row.
pub fn cell_address(column: u32, row: u32) -> String {
    format!("{}{}", column_number_to_name(column), row)
}

/// Parses an A1-style reference (absolute markers allowed) into 1-based (column, row).
pub fn parse_cell_reference(reference: &str) -> Option<(u32, u32)> {
    let reference = reference.trim().replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let column = letters
        .chars()
        .try_fold(0u32, |acc, c| {
            acc.checked_mul(26)?
                .checked_add(c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)
        })?;
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((column, row))
}

/// Parses `A1:C3` (or a single cell) into 1-based ((first col, first row), (last col, last row)).
pub fn parse_range(range: &str) -> Option<((u32, u32), (u32, u32))> {
    let mut parts = range.split(':');
    let start = parse_cell_reference(parts.next()?)?;
    let end = match parts.next() {
        Some(end) => parse_cell_reference(end)?,
        None => start,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((
        (start.0.min(end.0), start.1.min(end.1)),
        (start.0.max(end.0), start.1.max(end.1)),
    ))
}

/// Short hex digest used to identify an input in logs.
pub fn short_fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let hex = format!("{digest:x}");
    hex.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_names_roll_over() {
        assert_eq!(column_number_to_name(1), "A");
        assert_eq!(column_number_to_name(26), "Z");
        assert_eq!(column_number_to_name(27), "AA");
        assert_eq!(column_number_to_name(703), "AAA");
        assert_eq!(cell_address(3, 12), "C12");
    }

    #[test]
    fn parses_references_and_ranges() {
        assert_eq!(parse_cell_reference("$B$7"), Some((2, 7)));
        assert_eq!(parse_cell_reference("aa10"), Some((27, 10)));
        assert_eq!(parse_cell_reference("A0"), None);
        assert_eq!(parse_cell_reference("12"), None);
        assert_eq!(parse_range("C3:A1"), Some(((1, 1), (3, 3))));
        assert_eq!(parse_range("D4"), Some(((4, 4), (4, 4))));
        assert_eq!(parse_range("A1:B2:C3"), None);
    }

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(short_fingerprint(b"aoi"), short_fingerprint(b"aoi"));
        assert_eq!(short_fingerprint(b"aoi").len(), 12);
        assert_ne!(short_fingerprint(b"aoi"), short_fingerprint(b"aoj"));
    }
}
