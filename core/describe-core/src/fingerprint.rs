//! Content fingerprints for change detection between polls.

use std::fmt;

/// Hex MD5 digest of rendered describe output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(content: &str) -> Self {
        Fingerprint(format!("{:x}", md5::compute(content)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_has_identical_fingerprint() {
        assert_eq!(Fingerprint::of("Name: web-0"), Fingerprint::of("Name: web-0"));
    }

    #[test]
    fn different_content_has_different_fingerprint() {
        assert_ne!(Fingerprint::of("Status: Running"), Fingerprint::of("Status: Pending"));
    }

    #[test]
    fn empty_content_is_fingerprinted() {
        assert_eq!(
            Fingerprint::of("").as_str(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }
}
