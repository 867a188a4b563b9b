//! Payloads for the `send` command.

use std::path::Path;

use anyhow::Context;
use bytes::Bytes;

use crate::config::PayloadSource;

/// Load or generate the bytes to upload.
pub async fn load(source: &PayloadSource) -> anyhow::Result<Bytes> {
    match source {
        PayloadSource::Pattern(len) => Ok(pattern(*len)),
        PayloadSource::File(path) => read_file(path).await,
    }
}

/// `len` bytes alternating `0x42` and `0x69`, starting with `0x42`.
pub fn pattern(len: usize) -> Bytes {
    let mut buf = Vec::with_capacity(len);
    buf.extend([0x42u8, 0x69].iter().copied().cycle().take(len));
    Bytes::from(buf)
}

async fn read_file(path: &Path) -> anyhow::Result<Bytes> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Bytes::from(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_alternates() {
        assert_eq!(&pattern(5)[..], &[0x42, 0x69, 0x42, 0x69, 0x42]);
        assert!(pattern(0).is_empty());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = load(&PayloadSource::File("/nonexistent/payload.bin".into()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/payload.bin"));
    }
}
