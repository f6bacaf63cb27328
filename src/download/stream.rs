//! Chunked decryption of a content byte stream.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::DownloadParams;
use crate::crypto::StreamDecryptor;
use crate::error::{MegaError, Result};
use crate::fs::chunks::plan;

/// Regroups an arbitrary byte stream into exact chunk sizes.
pub struct ChunkReader<S> {
    stream: S,
    buffer: BytesMut,
}

impl<S, E> ChunkReader<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    MegaError: From<E>,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::new(),
        }
    }

    /// Next `size` bytes; shorter only when the stream ends first.
    pub async fn read_chunk(&mut self, size: usize) -> Result<BytesMut> {
        while self.buffer.len() < size {
            match self.stream.next().await {
                Some(item) => self.buffer.extend_from_slice(&item?),
                None => break,
            }
        }
        let take = size.min(self.buffer.len());
        Ok(self.buffer.split_to(take))
    }
}

/// What happened while streaming one file.
#[derive(Debug)]
pub struct StreamReport {
    /// Plaintext bytes written
    pub written: u64,
    /// Stopped early by the abort flag
    pub aborted: bool,
    /// Meta MAC check; skipped (`Ok`) when the stream was cut short
    pub integrity: Result<()>,
}

/// Decrypt `stream` chunk by chunk into `writer`.
///
/// The abort flag is polled before every chunk. `on_chunk` receives the
/// running byte count.
pub async fn decrypt_stream<S, E, W, F>(
    stream: S,
    params: &DownloadParams,
    writer: &mut W,
    abort: &AtomicBool,
    mut on_chunk: F,
) -> Result<StreamReport>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    MegaError: From<E>,
    W: AsyncWrite + Unpin,
    F: FnMut(u64),
{
    let mut reader = ChunkReader::new(stream);
    let mut decryptor = StreamDecryptor::new(&params.cipher_key, &params.iv, &params.meta_mac);
    let mut written = 0u64;

    for (i, chunk) in plan(params.file_size).enumerate() {
        if abort.load(Ordering::SeqCst) {
            decryptor.abort();
            writer.flush().await?;
            return Ok(StreamReport {
                written,
                aborted: true,
                integrity: Ok(()),
            });
        }

        let mut data = reader.read_chunk(chunk.size as usize).await?;
        let short = (data.len() as u64) < chunk.size;
        decryptor.feed_in_place(&mut data);
        writer.write_all(&data).await?;
        written += data.len() as u64;
        debug!(
            "[{}] chunk {}: +{} ({} / {} bytes)",
            params.index + 1,
            i + 1,
            data.len(),
            written,
            params.file_size
        );
        on_chunk(written);

        if short {
            decryptor.abort();
            writer.flush().await?;
            return Ok(StreamReport {
                written,
                aborted: false,
                integrity: Ok(()),
            });
        }
    }

    writer.flush().await?;
    Ok(StreamReport {
        written,
        aborted: false,
        integrity: decryptor.finish(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::crypto::aes::aes128_ctr_decrypt;
    use crate::crypto::keys::key_bytes;

    const KEY: [u32; 4] = [0xa, 0xb, 0xc, 0xd];
    const IV: [u32; 4] = [0x1234, 0x5678, 0, 0];

    fn params(size: u64, meta_mac: [u32; 2]) -> DownloadParams {
        DownloadParams {
            index: 0,
            direct_url: String::new(),
            output_path: PathBuf::from("x"),
            file_size: size,
            iv: IV,
            meta_mac,
            cipher_key: KEY,
        }
    }

    fn encrypt(plain: &[u8]) -> Vec<u8> {
        let mut nonce = [0u8; 8];
        nonce[..4].copy_from_slice(&IV[0].to_be_bytes());
        nonce[4..].copy_from_slice(&IV[1].to_be_bytes());
        aes128_ctr_decrypt(plain, &key_bytes(&KEY), &nonce, 0)
    }

    /// Reference MAC computed with the planner's boundaries.
    fn reference_mac(plain: &[u8]) -> [u32; 2] {
        let mut dec = StreamDecryptor::new(&KEY, &IV, &[0, 0]);
        let cipher = encrypt(plain);
        for chunk in plan(plain.len() as u64) {
            let start = chunk.offset as usize;
            dec.feed(&cipher[start..start + chunk.size as usize]);
        }
        dec.condensed_mac()
    }

    fn pieces(data: &[u8], size: usize) -> impl Stream<Item = std::result::Result<Bytes, MegaError>> + Unpin {
        let parts: Vec<_> = data
            .chunks(size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        futures::stream::iter(parts)
    }

    #[tokio::test]
    async fn test_chunk_reader_regroups() {
        let data: Vec<u8> = (0..100u8).collect();
        let mut reader = ChunkReader::new(pieces(&data, 7));
        assert_eq!(&reader.read_chunk(30).await.unwrap()[..], &data[..30]);
        assert_eq!(&reader.read_chunk(50).await.unwrap()[..], &data[30..80]);
        assert_eq!(reader.read_chunk(50).await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_decrypt_stream_verifies() {
        let plain: Vec<u8> = (0..400_000u32).map(|i| (i * 7 % 256) as u8).collect();
        let mac = reference_mac(&plain);
        let cipher = encrypt(&plain);

        let mut out = Vec::new();
        let abort = AtomicBool::new(false);
        let mut calls = 0;
        let report = decrypt_stream(
            pieces(&cipher, 65536),
            &params(plain.len() as u64, mac),
            &mut out,
            &abort,
            |_| calls += 1,
        )
        .await
        .unwrap();

        assert_eq!(out, plain);
        assert_eq!(report.written, plain.len() as u64);
        assert!(!report.aborted);
        assert!(report.integrity.is_ok());
        // 128K + 256K, then the remainder
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_wrong_mac_is_reported() {
        let plain = vec![1u8; 5000];
        let cipher = encrypt(&plain);
        let mut out = Vec::new();
        let abort = AtomicBool::new(false);
        let report = decrypt_stream(pieces(&cipher, 1000), &params(5000, [1, 1]), &mut out, &abort, |_| {})
            .await
            .unwrap();
        assert!(matches!(report.integrity, Err(MegaError::Integrity { .. })));
    }

    #[tokio::test]
    async fn test_abort_stops_before_first_chunk() {
        let cipher = encrypt(&[0u8; 10]);
        let mut out = Vec::new();
        let abort = AtomicBool::new(true);
        let report = decrypt_stream(pieces(&cipher, 4), &params(10, [0, 0]), &mut out, &abort, |_| {})
            .await
            .unwrap();
        assert!(report.aborted);
        assert_eq!(report.written, 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_short_stream_is_truncated() {
        let cipher = encrypt(&[0u8; 10]);
        let mut out = Vec::new();
        let abort = AtomicBool::new(false);
        let report = decrypt_stream(pieces(&cipher[..6], 4), &params(10, [0, 0]), &mut out, &abort, |_| {})
            .await
            .unwrap();
        assert_eq!(report.written, 6);
        assert!(report.integrity.is_ok());
    }

    #[tokio::test]
    async fn test_empty_file_still_checks_mac() {
        let mut out = Vec::new();
        let abort = AtomicBool::new(false);
        let mut calls = 0;
        let report = decrypt_stream(pieces(&[], 4), &params(0, [0, 0]), &mut out, &abort, |_| calls += 1)
            .await
            .unwrap();
        assert_eq!(report.written, 0);
        assert_eq!(calls, 1);
        assert!(matches!(report.integrity, Err(MegaError::Integrity { .. })));

        let report = decrypt_stream(pieces(&[], 4), &params(0, reference_mac(&[])), &mut out, &abort, |_| {})
            .await
            .unwrap();
        assert!(report.integrity.is_ok());
    }
}
