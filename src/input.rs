// ==============================================================================
// input.rs - Input File Access
// ==============================================================================
// Description: Opens plain or gzip-compressed text inputs and fingerprints them
// Author: Matt Barham
// Created: 2026-09-14
// Modified: 2026-09-21
// Version: 1.0.0
// ==============================================================================

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// Gzip magic number (member header)
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Open a text input, decompressing transparently when it starts with the
/// gzip magic number.
pub fn open_text(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let is_gzip = {
        let head = reader.fill_buf()?;
        head.len() >= GZIP_MAGIC.len() && head[..GZIP_MAGIC.len()] == GZIP_MAGIC
    };

    if is_gzip {
        let decoder = flate2::bufread::MultiGzDecoder::new(reader);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        Ok(Box::new(reader))
    }
}

/// SHA-256 of the raw file bytes, lowercase hex
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
