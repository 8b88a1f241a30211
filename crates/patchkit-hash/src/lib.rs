//! Git-compatible blob hashing: `SHA-256("blob " || ASCII(len) || "\0" || content)`.
//!
//! Two entry points, matching the contract in the patch engine spec: one over
//! an in-memory buffer, one streaming over an `AsyncRead` of known length
//! without buffering the whole file.

use sha2::{Digest, Sha256};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Same buffer size the teacher's `copy_and_hash` uses for streaming reads.
const BUF_SIZE: usize = 8 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("i/o error while hashing")]
    Io(#[from] io::Error),
}

/// A 64-character lowercase hex Git-SHA-256 digest.
pub type Hash = String;

/// Hash an in-memory buffer.
pub fn hash_bytes(content: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Hash a stream of known length without buffering the whole content.
///
/// `len` must equal the number of bytes `reader` will yield; it is part of
/// the Git blob header and is not re-derived from the stream.
pub async fn hash_reader<R>(mut reader: R, len: u64) -> Result<Hash, HashError>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = Sha256::new();
    hasher.update(format!("blob {len}\0").as_bytes());

    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let read = reader.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash the file at `path`, streaming its content.
pub async fn hash_file(path: impl AsRef<std::path::Path>) -> Result<Hash, HashError> {
    let file = fs_err::tokio::File::open(path.as_ref()).await?;
    let len = file.metadata().await?.len();
    hash_reader(file, len).await
}

/// Returns `true` if `candidate` is syntactically a valid hash: 64 lowercase
/// hex characters.
pub fn is_valid_hash(candidate: &str) -> bool {
    candidate.len() == 64 && candidate.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
