use itertools::Itertools;


// If a string consists of a single character, returns the character. Otherwise returns none.
pub fn as_single_char(s: &str) -> Option<char> {
    s.chars().collect_tuple().map(|(single_char,)| single_char)
}

// Strips check and mate markers so that "Qxf7#" and "Qxf7" compare equal.
pub fn strip_check_suffix(notation: &str) -> &str { notation.trim_end_matches(['+', '#']) }
