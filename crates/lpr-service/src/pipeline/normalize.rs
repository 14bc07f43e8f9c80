//! Cleanup and letter/digit correction of recognized plate text

/// Leading characters treated as the alphabetic location code
const PREFIX_LEN: usize = 2;

/// Letters commonly misread in place of digits
const DIGIT_LOOKALIKES: [(char, char); 5] =
    [('O', '0'), ('I', '1'), ('S', '5'), ('Z', '2'), ('B', '8')];

/// Normalize raw recognizer output into a plate number.
///
/// Whitespace is removed, letters are uppercased and anything outside
/// `A-Z`, `0-9` and `-` is dropped. Strings longer than three characters keep
/// their first two characters and have digit lookalikes in the rest replaced
/// by the digit. This assumes a two-letter prefix grammar and will rewrite
/// genuine trailing letters from the substitution table.
pub fn normalize_plate_text(raw: &str) -> String {
    let cleaned: Vec<char> = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '-')
        .collect();

    if cleaned.len() <= 3 {
        return cleaned.into_iter().collect();
    }

    cleaned
        .iter()
        .enumerate()
        .map(|(i, &c)| if i < PREFIX_LEN { c } else { to_digit_lookalike(c) })
        .collect()
}

fn to_digit_lookalike(c: char) -> char {
    DIGIT_LOOKALIKES
        .iter()
        .find(|(letter, _)| *letter == c)
        .map(|(_, digit)| *digit)
        .unwrap_or(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stays_empty() {
        assert_eq!(normalize_plate_text(""), "");
        assert_eq!(normalize_plate_text("  \t "), "");
        assert_eq!(normalize_plate_text("!@#"), "");
    }

    #[test]
    fn test_short_strings_skip_substitution() {
        assert_eq!(normalize_plate_text("AB1"), "AB1");
        assert_eq!(normalize_plate_text("OIS"), "OIS");
        assert_eq!(normalize_plate_text("b o"), "BO");
    }

    #[test]
    fn test_suffix_substitution() {
        assert_eq!(normalize_plate_text("AOB5"), "AO85");
        assert_eq!(normalize_plate_text("AB1234"), "AB1234");
        assert_eq!(normalize_plate_text("OIOISZB"), "OI01528");
    }

    #[test]
    fn test_cleanup_before_substitution() {
        assert_eq!(normalize_plate_text("ab 12-34!"), "AB12-34");
        assert_eq!(normalize_plate_text("29 a1 234.56"), "29A123456");
        // Non-ASCII letters are dropped
        assert_eq!(normalize_plate_text("ÄB12"), "B12");
    }

    #[test]
    fn test_length_counted_after_cleanup() {
        // Four raw characters, three after cleanup
        assert_eq!(normalize_plate_text("A.BS"), "ABS");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "", "AB1", "AOB5", "ab 12-34!", "OIOISZB", "zz ss oo", "ÄB12", "--", "Ab-Cd-Ef",
        ];
        for s in samples {
            let once = normalize_plate_text(s);
            assert_eq!(normalize_plate_text(&once), once, "input {:?}", s);
        }
    }
}
