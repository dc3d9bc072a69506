//! Random identifier minting.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::SysRng;
use rand::TryRng;
use smol_str::SmolStr;

const ID_BYTES: usize = 12;

/// Mint a URL-safe random identifier with a distinguishing prefix.
pub(crate) fn fresh_id(prefix: &str) -> SmolStr {
    let mut bytes = [0_u8; ID_BYTES];
    SysRng
        .try_fill_bytes(&mut bytes)
        .expect("OS random number generator unavailable");
    SmolStr::new(format!("{prefix}-{}", URL_SAFE_NO_PAD.encode(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_prefixed() {
        let a = fresh_id("run");
        let b = fresh_id("run");
        assert_ne!(a, b);
        assert!(a.starts_with("run-"));
    }
}
