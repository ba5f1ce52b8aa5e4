//! Credential masking.
//!
//! Every surface that renders configuration or auth state (config view,
//! key listings, provider Debug impls) goes through this one helper, so
//! key material is scrubbed in a single place.

/// Masks a credential for display, keeping just enough to identify it.
///
/// Values of eight characters or fewer are fully masked.
pub fn mask_secret(value: &str) -> String {
    if value.len() <= 8 {
        return "••••".to_string();
    }
    let tail: String = value
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("••••{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_values_are_fully_masked() {
        assert_eq!(mask_secret("short"), "••••");
        assert_eq!(mask_secret(""), "••••");
    }

    #[test]
    fn long_values_keep_a_four_char_tail() {
        assert_eq!(mask_secret("sk-abcdef1234"), "••••1234");
    }

    #[test]
    fn multibyte_values_do_not_split_chars() {
        let masked = mask_secret("ключ-секретный");
        assert!(masked.starts_with("••••"));
        assert!(!masked.contains("секретн"));
    }
}
