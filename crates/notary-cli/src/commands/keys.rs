use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use notary_auth::{Notary, SigningAlgorithm, generate_pem_pair, key_fingerprint};
use rand::RngCore;
use rand::rngs::OsRng;
use serde_json::json;

use crate::cli::{CipherKeyArgs, KeygenArgs, OutputFormat};
use crate::output::{print_secret, print_success, print_value};

pub fn keygen(args: &KeygenArgs, format: OutputFormat) -> Result<()> {
    let algorithm: SigningAlgorithm = args.algorithm.parse()?;
    let private_path = args.out.join("private.pem");
    let public_path = args.out.join("public.pem");

    if !args.force {
        for path in [&private_path, &public_path] {
            if path.exists() {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
        }
    }

    let pair = generate_pem_pair(algorithm)?;
    fs::create_dir_all(&args.out)
        .with_context(|| format!("Failed to create directory: {}", args.out.display()))?;
    write_private(&private_path, &pair.private_pem)?;
    fs::write(&public_path, &pair.public_pem)
        .with_context(|| format!("Failed to write {}", public_path.display()))?;

    let kid = key_fingerprint(&pair.public_pem);
    tracing::info!(%algorithm, kid = %kid, "signing key pair generated");
    print_success(&format!("Wrote {} key pair to {}", algorithm, args.out.display()));
    print_value(
        &json!({
            "algorithm": algorithm.as_str(),
            "kid": kid,
            "private_key_file": private_path,
            "public_key_file": public_path,
        }),
        format,
    )
}

#[cfg(unix)]
fn write_private(path: &Path, pem: &str) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.write_all(pem.as_bytes())?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, pem: &str) -> Result<()> {
    fs::write(path, pem).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn generate_cipher_key(byte_len: usize) -> String {
    let mut key = vec![0u8; byte_len];
    OsRng.fill_bytes(&mut key);
    hex::encode(key)
}

pub fn cipher_key(args: &CipherKeyArgs, format: OutputFormat) -> Result<()> {
    print_secret("cipher_key", &generate_cipher_key(args.bits.byte_len()), format)
}

pub fn jwks(notary: &Notary) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&notary.jwks())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notary_auth::AuthorizationCodec;

    #[test]
    fn test_cipher_key_is_usable() {
        for len in [16, 24, 32] {
            let key = generate_cipher_key(len);
            assert_eq!(key.len(), len * 2);
            assert!(AuthorizationCodec::from_hex(&key).is_ok());
        }
        assert_ne!(generate_cipher_key(32), generate_cipher_key(32));
    }

    #[test]
    fn test_keygen_writes_loadable_pair() {
        let dir = tempfile::tempdir().unwrap();
        let args = KeygenArgs {
            algorithm: "es384".to_string(),
            out: dir.path().join("keys"),
            force: false,
        };
        keygen(&args, OutputFormat::Json).unwrap();

        let private_pem = fs::read_to_string(args.out.join("private.pem")).unwrap();
        let public_pem = fs::read_to_string(args.out.join("public.pem")).unwrap();
        let pair = notary_auth::SigningKeyPair::from_pem(
            "k1",
            SigningAlgorithm::ES384,
            &private_pem,
            &public_pem,
        );
        assert!(pair.is_ok());

        // Refuses to clobber without --force
        assert!(keygen(&args, OutputFormat::Json).is_err());
        let forced = KeygenArgs { force: true, ..args };
        assert!(keygen(&forced, OutputFormat::Json).is_ok());
    }

    #[test]
    fn test_keygen_rejects_unknown_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        let args = KeygenArgs {
            algorithm: "HS256".to_string(),
            out: dir.path().to_path_buf(),
            force: false,
        };
        assert!(keygen(&args, OutputFormat::Text).is_err());
    }
}
