//! Stable hashing of reference-install provisioning arguments, used to key
//! the on-disk install cache so repeated runs with the same inputs skip
//! provisioning entirely.

use std::path::Path;

use anyhow::{Context, Result};
use fn_error_context::context;
use openssl::hash::{Hasher, MessageDigest};

use crate::error::PruneError;

/// The 16-hex-digit prefix of the SHA-256 of, for each positional
/// (non-dash-prefixed) argument in order: the argument's file contents if
/// it names an existing file, otherwise its literal bytes. Dash-prefixed
/// arguments do not participate, so `--index-url foo` keys identically
/// regardless of whether `foo` happens to exist as a file in the cwd.
#[context("computing reference-install fingerprint")]
pub fn fingerprint<S: AsRef<str>>(args: &[S]) -> Result<String> {
    let mut hasher = Hasher::new(MessageDigest::sha256()).context("creating SHA-256 hasher")?;
    for arg in args {
        let arg = arg.as_ref();
        if arg.starts_with('-') {
            continue;
        }
        let path = Path::new(arg);
        if path.is_file() {
            let bytes = std::fs::read(path).map_err(PruneError::FingerprintIo)?;
            hasher.update(&bytes)?;
        } else {
            hasher.update(arg.as_bytes())?;
        }
    }
    let digest = hasher.finish().context("finalizing fingerprint digest")?;
    let hex = hex::encode(digest);
    Ok(hex[..16].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_input() {
        let a = fingerprint(&["requests==2.31.0", "flask"]).unwrap();
        let b = fingerprint(&["requests==2.31.0", "flask"]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn order_sensitive_for_literal_args() {
        let a = fingerprint(&["requests", "flask"]).unwrap();
        let b = fingerprint(&["flask", "requests"]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn dash_prefixed_args_excluded() {
        let a = fingerprint(&["requests"]).unwrap();
        let b = fingerprint(&["requests", "--no-deps"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn existing_file_hashed_by_content_not_name() {
        let dir = tempfile::tempdir().unwrap();
        let f1 = dir.path().join("one.txt");
        let f2 = dir.path().join("two.txt");
        std::fs::write(&f1, b"same contents").unwrap();
        std::fs::write(&f2, b"same contents").unwrap();
        let a = fingerprint(&[f1.to_str().unwrap()]).unwrap();
        let b = fingerprint(&[f2.to_str().unwrap()]).unwrap();
        assert_eq!(a, b);
    }
}
