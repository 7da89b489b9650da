/// HttpPageFetcher against a loopback listener speaking just enough HTTP/1.1.
use sourdough_scout::verify::{FetchError, HttpPageFetcher, PageFetcher};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

/// Serve exactly one connection with a canned response; returns the base URL.
async fn serve_once(response: String) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    Url::parse(&format!("http://{}/", addr)).unwrap()
}

fn fetcher() -> HttpPageFetcher {
    // Loopback must not be routed through an ambient HTTP_PROXY.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .connect_timeout(Duration::from_secs(2))
        .redirect(reqwest::redirect::Policy::limited(5))
        .no_proxy()
        .build()
        .unwrap();
    HttpPageFetcher::from_client(client)
}

#[test]
fn test_default_fetcher_builds() {
    assert!(HttpPageFetcher::new(Duration::from_secs(10), Duration::from_secs(5), 5).is_ok());
}

#[tokio::test]
async fn test_404_is_a_status_error() {
    let url = serve_once(
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    )
    .await;

    match fetcher().fetch_html(&url).await {
        Err(FetchError::Status(404)) => {}
        other => panic!("expected 404, got {:?}", other.map(|s| s.len())),
    }
}

#[tokio::test]
async fn test_html_body_is_returned() {
    let body = "<html><body><p>Naturally leavened since 2009</p></body></html>";
    let url = serve_once(format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    ))
    .await;

    let html = fetcher().fetch_html(&url).await.unwrap();
    assert!(html.contains("Naturally leavened"));
}

#[tokio::test]
async fn test_binary_content_is_refused() {
    let url = serve_once(
        "HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: 4\r\nConnection: close\r\n\r\n%PDF"
            .to_string(),
    )
    .await;

    assert!(matches!(
        fetcher().fetch_html(&url).await,
        Err(FetchError::UnsupportedContent(_))
    ));
}

#[tokio::test]
async fn test_connection_refused_is_a_network_error() {
    // Bind then drop to get a port nothing listens on.
    let addr = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap()
    };
    let url = Url::parse(&format!("http://{}/", addr)).unwrap();

    assert!(matches!(
        fetcher().fetch_html(&url).await,
        Err(FetchError::Network(_))
    ));
}
