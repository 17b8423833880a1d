//! Run identifier generation and validation.

use anyhow::{Result, anyhow};
use rand::Rng;

pub const RUN_ID_LEN: usize = 8;

const RUN_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a fresh run id from the supplied random source.
///
/// Callers pass the RNG so tests can seed it.
pub fn generate_run_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..RUN_ID_LEN)
        .map(|_| RUN_ID_ALPHABET[rng.gen_range(0..RUN_ID_ALPHABET.len())] as char)
        .collect()
}

/// Validate that a run id is safe to use as a directory name under `agents/`.
pub fn validate_run_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(anyhow!("run id must not be empty"));
    }
    if id == "." || id == ".." {
        return Err(anyhow!("run id must not be '{id}'"));
    }
    if id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(anyhow!("run id must be [A-Za-z0-9._-] only (got '{id}')"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn generated_ids_are_lowercase_alphanumeric() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let id = generate_run_id(&mut rng);
            assert_eq!(id.len(), RUN_ID_LEN);
            assert!(
                id.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            );
            validate_run_id(&id).expect("generated id is valid");
        }
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let a = generate_run_id(&mut StdRng::seed_from_u64(1));
        let b = generate_run_id(&mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_path_like_ids() {
        assert!(validate_run_id("").is_err());
        assert!(validate_run_id("..").is_err());
        assert!(validate_run_id("a/b").is_err());
        assert!(validate_run_id("run id").is_err());
        assert!(validate_run_id("abc-123_x.y").is_ok());
    }
}
