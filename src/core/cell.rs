/// A1-style cell reference parsing.
///
/// Column letters are base-26 with no zero digit: A=0, Z=25, AA=26.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut index: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_uppercase() {
            return None;
        }
        index = index.checked_mul(26)?.checked_add(c as u32 - 'A' as u32 + 1)?;
    }
    Some(index - 1)
}

/// Parse a reference like `"AB12"` into 0-based `(row, column)`.
pub fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    let column = column_index(letters)?;
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, column))
}
