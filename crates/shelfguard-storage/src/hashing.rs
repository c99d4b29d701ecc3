use sha2::{Digest, Sha256};
use shelfguard_core::constants::HASH_BUFFER_SIZE;
use shelfguard_core::ContentHash;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash::from_digest(&Sha256::digest(bytes))
}

/// Hash a file without loading it into memory. Blocking.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(ContentHash::from_digest(&hasher.finalize()))
}
