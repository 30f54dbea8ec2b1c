//! Tool flag groups (`-asmflags`, `-gccgoflags`, `-gcflags`)

use std::fmt;

/// Ordered, de-duplicating set of `name[=value]` tokens for one flag group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSet {
    flag: String,
    tokens: Vec<String>,
}

impl FlagSet {
    /// Create an empty set rendered as `-<flag>="..."`
    pub fn new(flag: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            tokens: Vec::new(),
        }
    }

    /// Add a token. Values are joined by spaces after `=`.
    ///
    /// Returns `false` when an identical token is already present.
    pub fn add(&mut self, name: &str, values: &[&str]) -> bool {
        let token = if values.is_empty() {
            name.to_string()
        } else {
            format!("{}={}", name, values.join(" "))
        };

        if self.tokens.contains(&token) {
            return false;
        }
        self.tokens.push(token);
        true
    }

    pub fn size(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn flag(&self) -> &str {
        &self.flag
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Render as a single shell-style flag: `-<flag>="<tok1> <tok2>"`
    pub fn render(&self) -> String {
        format!("-{}=\"{}\"", self.flag, self.tokens.join(" "))
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_render_preserves_insertion_order() {
        let mut set = FlagSet::new("gccgoflags");
        set.add("-s", &[]);
        set.add("-w", &[]);
        insta::assert_snapshot!(set.render(), @r#"-gccgoflags="-s -w""#);
    }

    #[test]
    fn test_values_joined_by_space() {
        let mut set = FlagSet::new("gcflags");
        set.add("all", &["-N", "-l"]);
        assert_eq!(set.tokens(), &["all=-N -l".to_string()]);
    }

    #[test]
    fn test_dedup_is_case_sensitive() {
        let mut set = FlagSet::new("asmflags");
        assert!(set.add("-trimpath", &[]));
        assert!(!set.add("-trimpath", &[]));
        assert!(set.add("-TRIMPATH", &[]));
        assert_eq!(set.size(), 2);
    }

    #[test]
    fn test_empty_set() {
        let set = FlagSet::new("asmflags");
        assert!(set.is_empty());
        assert_eq!(set.render(), "-asmflags=\"\"");
    }

    proptest! {
        #[test]
        fn prop_adding_twice_keeps_one(name in "[-a-z]{1,12}", values in prop::collection::vec("[a-z0-9]{1,6}", 0..3)) {
            let values: Vec<&str> = values.iter().map(String::as_str).collect();
            let mut set = FlagSet::new("gcflags");
            set.add(&name, &values);
            set.add(&name, &values);
            prop_assert_eq!(set.size(), 1);
        }
    }
}
