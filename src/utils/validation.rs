// Input validation helpers
// CPF validation implements the official check-digit algorithm; inputs are
// normalized to bare digits first.

/// Strip everything but digits from a CPF-like input
pub fn normalize_cpf(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Validate a CPF by its two check digits. Accepts formatted or bare
/// input; repeated-digit sequences are invalid by definition.
pub fn is_valid_cpf(input: &str) -> bool {
    let cpf = normalize_cpf(input);
    if cpf.len() != 11 {
        return false;
    }

    let digits: Vec<u32> = cpf.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 11 {
        return false;
    }
    if digits.iter().all(|&d| d == digits[0]) {
        return false;
    }

    let check = |len: usize| -> u32 {
        let sum: u32 = digits[..len]
            .iter()
            .enumerate()
            .map(|(i, &d)| d * (len as u32 + 1 - i as u32))
            .sum();
        let rem = (sum * 10) % 11;
        if rem == 10 { 0 } else { rem }
    };

    check(9) == digits[9] && check(10) == digits[10]
}

/// Trim and reject empty strings
pub fn non_empty_trimmed(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_cpf() {
        assert!(is_valid_cpf("52998224725"));
        assert!(is_valid_cpf("529.982.247-25"));
    }

    #[test]
    fn test_invalid_cpf() {
        assert!(!is_valid_cpf("52998224724")); // wrong check digit
        assert!(!is_valid_cpf("11111111111")); // repeated digits
        assert!(!is_valid_cpf("5299822472")); // too short
        assert!(!is_valid_cpf(""));
        assert!(!is_valid_cpf("not a cpf"));
    }

    #[test]
    fn test_normalize_cpf() {
        assert_eq!(normalize_cpf("529.982.247-25"), "52998224725");
        assert_eq!(normalize_cpf("abc123"), "123");
    }

    #[test]
    fn test_non_empty_trimmed() {
        assert_eq!(non_empty_trimmed("  hello "), Some("hello"));
        assert_eq!(non_empty_trimmed("   "), None);
    }
}
