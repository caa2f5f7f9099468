use crate::error::ImageError;
use rand::Rng;

/// Symbols drawn for identifiers: digits, ASCII letters and underscore
pub const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_";

/// Default identifier length for stored images
pub const DEFAULT_ID_LENGTH: usize = 16;

/// Random identifier generator for object naming
///
/// Each character is drawn independently and uniformly from [`ID_ALPHABET`]
/// using the thread-local generator, which is seeded from the OS and never
/// shared between threads. Not suitable for security tokens: collisions are
/// unlikely at the default length but are never checked.
#[derive(Debug, Clone, Copy)]
pub struct IdGenerator {
    length: usize,
}

impl IdGenerator {
    /// Create a generator producing identifiers of `length` characters
    pub fn new(length: usize) -> Result<Self, ImageError> {
        if length == 0 {
            return Err(ImageError::Validation(
                "identifier length must be positive".to_string(),
            ));
        }

        Ok(Self { length })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();

        (0..self.length)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self {
            length: DEFAULT_ID_LENGTH,
        }
    }
}
