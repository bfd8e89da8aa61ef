//! Archive encryption through the `openssl` command line tool
//!
//! `openssl enc -aes-256-cbc -pbkdf2` with the passphrase read by openssl
//! itself from the named environment variable, so the key never appears in
//! process arguments.

use std::path::Path;
use tokio::process::Command;

use crate::errors::DrpError;
use crate::logger::{self, LogTag};

/// Whether `key_env` holds a non-empty passphrase
pub fn key_configured(key_env: &str) -> bool {
    std::env::var(key_env)
        .map(|v| !v.is_empty())
        .unwrap_or(false)
}

pub async fn encrypt_file(input: &Path, output: &Path, key_env: &str) -> Result<(), DrpError> {
    run_openssl(input, output, key_env, false).await
}

pub async fn decrypt_file(input: &Path, output: &Path, key_env: &str) -> Result<(), DrpError> {
    run_openssl(input, output, key_env, true).await
}

async fn run_openssl(input: &Path, output: &Path, key_env: &str, decrypt: bool) -> Result<(), DrpError> {
    if !key_configured(key_env) {
        return Err(DrpError::Crypto(format!("{} is not set", key_env)));
    }

    let mut cmd = Command::new("openssl");
    cmd.arg("enc");
    if decrypt {
        cmd.arg("-d");
    }
    cmd.args(["-aes-256-cbc", "-pbkdf2", "-salt"])
        .arg("-in")
        .arg(input)
        .arg("-out")
        .arg(output)
        .arg("-pass")
        .arg(format!("env:{}", key_env));

    let out = cmd
        .output()
        .await
        .map_err(|e| DrpError::Crypto(format!("failed to run openssl: {}", e)))?;
    if !out.status.success() {
        return Err(DrpError::Crypto(format!(
            "openssl {} failed ({}): {}",
            if decrypt { "decrypt" } else { "encrypt" },
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    logger::debug(
        LogTag::Drp,
        &format!(
            "openssl {} {} -> {}",
            if decrypt { "decrypted" } else { "encrypted" },
            input.display(),
            output.display()
        ),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn openssl_available() -> bool {
        std::process::Command::new("openssl")
            .arg("version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_missing_key_is_crypto_error() {
        std::env::remove_var("TG_CRYPTO_TEST_UNSET");
        let dir = TempDir::new().unwrap();
        let err = encrypt_file(
            &dir.path().join("a"),
            &dir.path().join("b"),
            "TG_CRYPTO_TEST_UNSET",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DrpError::Crypto(_)));
    }

    #[tokio::test]
    async fn test_encrypt_decrypt_roundtrip() {
        if !openssl_available() {
            return;
        }
        std::env::set_var("TG_CRYPTO_TEST_KEY", "correct horse");
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("plain.bin");
        let enc = dir.path().join("plain.bin.enc");
        let back = dir.path().join("back.bin");
        std::fs::write(&plain, b"snapshot bytes").unwrap();

        encrypt_file(&plain, &enc, "TG_CRYPTO_TEST_KEY").await.unwrap();
        assert_ne!(std::fs::read(&enc).unwrap(), b"snapshot bytes");
        decrypt_file(&enc, &back, "TG_CRYPTO_TEST_KEY").await.unwrap();
        assert_eq!(std::fs::read(&back).unwrap(), b"snapshot bytes");
    }
}
