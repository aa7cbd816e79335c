//! Decode command implementation

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use xpcspy_shared::plist;
use xpcspy_shared::types::payload::PlistFormat;

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Binary property list to decode
    pub file: PathBuf,
}

/// Description of a `bplist00` file, as the agent would splice it.
pub fn decode_file(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    match PlistFormat::sniff(&bytes) {
        Some(PlistFormat::Binary00) => {
            let value = plist::from_bytes(&bytes)
                .with_context(|| format!("Malformed bplist00 document: {}", path.display()))?;
            Ok(value.description())
        }
        Some(PlistFormat::Binary15) => anyhow::bail!(
            "{} is a bplist15 document, which can only be decoded inside a target process",
            path.display()
        ),
        None => anyhow::bail!("{} is not a binary property list", path.display()),
    }
}

pub async fn run(args: DecodeArgs) -> Result<()> {
    println!("{}", decode_file(&args.file)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xpcspy_shared::utils::hex_to_bytes;

    const NAME_COUNT: &str = "62706c6973743030d20102030455636f756e74546e616d6510035473796e63080d13181a000000000000010100000000000000050000000000000000000000000000001f";

    #[test]
    fn test_decode_bplist00_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bplist");
        std::fs::write(&path, hex_to_bytes(NAME_COUNT).unwrap()).unwrap();

        assert_eq!(
            decode_file(&path).unwrap(),
            "{\n    count = 3;\n    name = sync;\n}"
        );
    }

    #[test]
    fn test_rejects_other_formats() {
        let dir = tempfile::tempdir().unwrap();

        let v15 = dir.path().join("v15.bplist");
        std::fs::write(&v15, b"bplist15\x00\x00").unwrap();
        assert!(decode_file(&v15).unwrap_err().to_string().contains("bplist15"));

        let xml = dir.path().join("plain.plist");
        std::fs::write(&xml, b"<?xml version=\"1.0\"?>").unwrap();
        assert!(decode_file(&xml).is_err());

        let broken = dir.path().join("broken.bplist");
        std::fs::write(&broken, b"bplist00 but nothing else").unwrap();
        assert!(decode_file(&broken).is_err());
    }
}
