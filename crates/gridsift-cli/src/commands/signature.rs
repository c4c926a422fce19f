//! Signature command implementation

use anyhow::Context;
use gridsift_core::config::Config;
use gridsift_core::sanitize_text;
use gridsift_core::signature::{SignatureGenerator, signature_hash};
use std::io::Read;
use std::path::Path;

pub fn run(file: &Path, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = match config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let signatures =
        SignatureGenerator::new(&config.signature).context("invalid signature pattern")?;

    let data = if file == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        buf
    } else {
        std::fs::read(file).with_context(|| format!("Unable to read {:?}", file))?
    };

    let signature = signatures.signature(&sanitize_text(&data));
    if signature.is_empty() {
        println!("(no error lines)");
    } else {
        println!("{}", signature);
        println!("\nsha256: {}", signature_hash(&signature));
    }
    Ok(())
}
