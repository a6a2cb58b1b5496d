//! Observer tag generation.

use thiserror::Error;

/// Symbols a generated tag is drawn from.
pub const TAG_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Tag lengths fall in `[TAG_MIN_LEN, TAG_MAX_LEN)`.
pub const TAG_MIN_LEN: usize = 10;
pub const TAG_MAX_LEN: usize = 20;

/// Consecutive failed attempts before registration gives up.
pub const MAX_TAG_ATTEMPTS: usize = 5;

#[derive(Error, Debug)]
#[error("tag generation failed: {reason}")]
pub struct TagError {
    pub reason: String,
}

/// Source of candidate observer tags.
pub trait TagGenerator: Send + Sync {
    fn generate(&self) -> Result<String, TagError>;
}

/// Uniform random alphanumeric tags.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomTags;

impl TagGenerator for RandomTags {
    fn generate(&self) -> Result<String, TagError> {
        let len = rand::random_range(TAG_MIN_LEN..TAG_MAX_LEN);
        let tag = (0..len)
            .map(|_| char::from(TAG_ALPHABET[rand::random_range(0..TAG_ALPHABET.len())]))
            .collect();
        Ok(tag)
    }
}

impl<F> TagGenerator for F
where
    F: Fn() -> Result<String, TagError> + Send + Sync,
{
    fn generate(&self) -> Result<String, TagError> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_tag_shape() {
        for _ in 0..200 {
            let tag = RandomTags.generate().unwrap();
            assert!((TAG_MIN_LEN..TAG_MAX_LEN).contains(&tag.len()), "bad length: {tag}");
            assert!(tag.bytes().all(|b| TAG_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_random_tags_vary() {
        let tags: HashSet<String> = (0..50).map(|_| RandomTags.generate().unwrap()).collect();
        assert!(tags.len() > 45);
    }

    #[test]
    fn test_closure_generator() {
        let generator = || Ok("fixed-tag".to_string());
        assert_eq!(generator.generate().unwrap(), "fixed-tag");
    }
}
