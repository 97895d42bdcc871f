/// Strip characters that are unsafe in the per-security directory names.
/// Only `*` is disallowed (ST stocks carry it as a prefix); everything else,
/// CJK included, passes through untouched.
pub fn sanitize_filename(name: &str) -> String {
    name.chars().filter(|ch| *ch != '*').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_only_asterisks() {
        assert_eq!(sanitize_filename("*ST金泰"), "ST金泰");
        assert_eq!(sanitize_filename("平安银行"), "平安银行");
        assert_eq!(sanitize_filename("a*b*c"), "abc");
    }

    #[test]
    fn preserves_other_punctuation() {
        assert_eq!(sanitize_filename("TCL-科技 (A)"), "TCL-科技 (A)");
    }

    #[test]
    fn all_asterisks_sanitize_to_empty() {
        assert_eq!(sanitize_filename("**"), "");
    }
}
