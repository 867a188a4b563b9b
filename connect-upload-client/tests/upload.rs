//! End-to-end uploads against the axum service on a loopback port.

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::time::Duration;

use bytes::Bytes;
use connect_upload::{MessageLimits, UploadService};
use connect_upload_client::{
    Chunker, ClientBuilder, Code, FrameSink, UploadClient, UploadError, UploadRequest,
    UploadResponse, UploadTransport,
};
use tokio::net::TcpListener;

async fn serve(service: UploadService) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, service.router()).await.unwrap();
    });
    addr
}

fn nz(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

fn builder(addr: SocketAddr) -> ClientBuilder {
    UploadClient::builder(format!("http://{addr}"))
}

fn pattern(len: usize) -> Bytes {
    (0..len)
        .map(|i| if i % 2 == 0 { 0x42 } else { 0x69 })
        .collect::<Vec<u8>>()
        .into()
}

#[tokio::test]
async fn test_fifty_bytes_in_frames_of_twenty() {
    let addr = serve(UploadService::new()).await;
    let client = builder(addr).frame_size(nz(20)).build().unwrap();

    let response = client.upload("test", pattern(50)).await.unwrap();
    assert_eq!(
        response,
        UploadResponse {
            name: "test".into(),
            size: 50
        }
    );
}

#[tokio::test]
async fn test_empty_upload() {
    let addr = serve(UploadService::new()).await;
    let client = builder(addr).build().unwrap();

    let response = client.upload("empty", Bytes::new()).await.unwrap();
    assert_eq!(response.size, 0);
    // No frame carried the name.
    assert_eq!(response.name, "");
}

#[tokio::test]
async fn test_many_frames() {
    let addr = serve(UploadService::new()).await;
    let client = builder(addr).frame_size(nz(64 * 1024)).build().unwrap();

    let response = client
        .upload("bulk", pattern(5 * 1024 * 1024 + 3))
        .await
        .unwrap();
    assert_eq!(response.size, 5 * 1024 * 1024 + 3);
}

#[tokio::test]
async fn test_json_encoding() {
    let addr = serve(UploadService::new()).await;
    let client = builder(addr).use_json().frame_size(nz(7)).build().unwrap();

    let response = client.upload("json", pattern(30)).await.unwrap();
    assert_eq!(
        response,
        UploadResponse {
            name: "json".into(),
            size: 30
        }
    );
}

#[cfg(feature = "compression-gzip")]
#[tokio::test]
async fn test_gzip_frames() {
    use connect_upload_client::CompressionEncoding;

    let addr = serve(UploadService::new()).await;
    let client = builder(addr)
        .compression(CompressionEncoding::Gzip)
        .frame_size(nz(1024))
        .build()
        .unwrap();

    // Size is counted on the uncompressed data.
    let response = client.upload("gz", pattern(10_000)).await.unwrap();
    assert_eq!(response.size, 10_000);
}

#[tokio::test]
async fn test_http2_prior_knowledge() {
    let addr = serve(UploadService::new()).await;
    let client = builder(addr)
        .http2_prior_knowledge()
        .frame_size(nz(20))
        .build()
        .unwrap();

    let response = client.upload("h2c", pattern(50)).await.unwrap();
    assert_eq!(response.size, 50);
}

#[tokio::test]
async fn test_oversize_frame_is_rejected() {
    let addr = serve(UploadService::new().limits(MessageLimits::new(1024))).await;
    let client = builder(addr)
        .http2_prior_knowledge()
        .frame_size(nz(4096))
        .build()
        .unwrap();

    let err = client.upload("big", pattern(4096)).await.unwrap_err();
    assert_eq!(err.code(), Code::ResourceExhausted, "{err}");
    assert!(!err.is_canceled());
}

#[tokio::test]
async fn test_client_deadline() {
    let addr = serve(UploadService::new()).await;
    let client = builder(addr)
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();

    let mut sink = client.open_upload().await.unwrap();
    sink.send(UploadRequest {
        name: "slow".into(),
        data: pattern(10),
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let err = sink.close_and_receive().await.unwrap_err();
    assert!(err.is_canceled(), "{err}");
    assert_eq!(err.code(), Code::DeadlineExceeded);
}

#[tokio::test]
async fn test_server_deadline() {
    let addr = serve(UploadService::new().timeout(Duration::from_millis(100))).await;
    let client = builder(addr).build().unwrap();

    let mut sink = client.open_upload().await.unwrap();
    sink.send(UploadRequest {
        name: "slow".into(),
        data: pattern(10),
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let err = sink.close_and_receive().await.unwrap_err();
    assert!(matches!(err, UploadError::Canceled(_)), "{err}");
    assert_eq!(err.code(), Code::DeadlineExceeded);
}

#[tokio::test]
async fn test_unreachable_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = builder(addr).build().unwrap();
    let err = client.upload("test", pattern(50)).await.unwrap_err();
    assert!(matches!(err, UploadError::Send(_)), "{err}");
    assert_eq!(err.code(), Code::Unavailable);
}

#[tokio::test]
async fn test_cancel_mid_upload() {
    let addr = serve(UploadService::new()).await;
    let client = builder(addr).build().unwrap();

    let sink = client.open_upload().await.unwrap();
    let interrupt = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        connect_upload_client::Status::cancelled("stop")
    };
    let stalled = StallingSink { inner: Some(sink) };

    let err = Chunker::new(nz(10))
        .upload_until(stalled, "test", pattern(100), interrupt)
        .await
        .unwrap_err();
    assert!(err.is_canceled());
    assert_eq!(err.code(), Code::Canceled);
}

/// Forwards the first frame, then blocks forever on the second.
struct StallingSink<S> {
    inner: Option<S>,
}

impl<S: FrameSink> FrameSink for StallingSink<S> {
    async fn send(&mut self, frame: UploadRequest) -> Result<(), UploadError> {
        match self.inner.as_mut() {
            Some(inner) => {
                inner.send(frame).await?;
                self.inner = None;
                Ok(())
            }
            None => std::future::pending().await,
        }
    }

    async fn close_and_receive(self) -> Result<UploadResponse, UploadError> {
        std::future::pending().await
    }
}
